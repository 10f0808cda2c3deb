use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq)]
#[error("Unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Differentiates content so each kind can be displayed its own way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    Article,
    Banner,
    Audio,
    Video,
    Page,
    Event,
    ArticleSeries,
    Research,
    Photoreport,
}

impl ContentType {
    pub const ALL: [ContentType; 9] = [
        ContentType::Article,
        ContentType::Banner,
        ContentType::Audio,
        ContentType::Video,
        ContentType::Page,
        ContentType::Event,
        ContentType::ArticleSeries,
        ContentType::Research,
        ContentType::Photoreport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Article => "Article",
            ContentType::Banner => "Banner",
            ContentType::Audio => "Audio",
            ContentType::Video => "Video",
            ContentType::Page => "Page",
            ContentType::Event => "Event",
            ContentType::ArticleSeries => "ArticleSeries",
            ContentType::Research => "Research",
            ContentType::Photoreport => "Photoreport",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant { kind: "content type", value: s.to_string() })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Administrator,
    Author,
    Visitor,
    Expert,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Administrator, Role::Author, Role::Visitor, Role::Expert];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "Administrator",
            Role::Author => "Author",
            Role::Visitor => "Visitor",
            Role::Expert => "Expert",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant { kind: "role", value: s.to_string() })
    }
}

/// Locales the text index cannot tokenize are indexed under another language.
pub fn language_override_for(language: &str) -> Option<&'static str> {
    match language {
        "be" => Some("ru"),
        _ => None,
    }
}

/// The effective publication time: never earlier than a set schedule.
pub fn published_time(created: DateTime<Utc>, scheduled: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match scheduled {
        Some(scheduled) => created.max(scheduled),
        None => created,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InlineImage {
    pub url: String,
    pub caption: String,
    pub link_to: String,
    pub credits: String,
}

/// A single publishable item. Stored as JSON in the `content` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: Uuid,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_override: Option<String>,
    pub content_type: ContentType,
    pub weight: i32,
    pub public: bool,
    pub promoted: bool,
    pub slug: String,

    pub created: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
    pub scheduled: Option<DateTime<Utc>>,
    pub published: DateTime<Utc>,

    pub page_slug: String,
    pub page_title: String,
    pub page_description: String,

    pub parent_id: Option<Uuid>,
    pub topic_ids: Vec<Uuid>,
    pub author_ids: Vec<Uuid>,

    pub title: String,
    pub lede: String,
    pub body: String,

    pub cover_external: Option<String>,
    pub cover_internal: Option<String>,
    pub images: Vec<InlineImage>,

    pub event_start: Option<DateTime<Utc>>,
    pub location: String,
    pub link_to: String,

    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl Content {
    /// A blank item owned by the server: fresh id and creation time.
    pub fn new(language: &str, content_type: ContentType, title: &str) -> Self {
        let created = Utc::now();
        Content {
            id: Uuid::new_v4(),
            language: language.to_string(),
            language_override: language_override_for(language).map(str::to_string),
            content_type,
            weight: 0,
            public: false,
            promoted: false,
            slug: String::new(),
            created,
            updated: None,
            scheduled: None,
            published: created,
            page_slug: String::new(),
            page_title: String::new(),
            page_description: String::new(),
            parent_id: None,
            topic_ids: Vec::new(),
            author_ids: Vec::new(),
            title: title.to_string(),
            lede: String::new(),
            body: String::new(),
            cover_external: None,
            cover_internal: None,
            images: Vec::new(),
            event_start: None,
            location: String::new(),
            link_to: String::new(),
            payload: serde_json::Map::new(),
        }
    }

    pub fn refresh_published(&mut self) {
        self.published = published_time(self.created, self.scheduled);
    }

    pub fn apply_language_override(&mut self) {
        self.language_override = language_override_for(&self.language).map(str::to_string);
    }

    /// True when the item may be shown to the public at `now`.
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        self.public && self.scheduled.map_or(true, |s| s < now)
    }

    pub fn effective_page_title(&self) -> &str {
        if self.page_title.is_empty() { &self.title } else { &self.page_title }
    }

    pub fn effective_page_description(&self) -> &str {
        if self.page_description.is_empty() { &self.lede } else { &self.page_description }
    }
}

/// Content plus the related records resolved for display. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct HydratedContent {
    #[serde(flatten)]
    pub content: Content,
    pub topics: Vec<Topic>,
    pub authors: Vec<User>,
    pub children: Vec<HydratedContent>,
    pub image_files: Vec<FileRecord>,
}

impl HydratedContent {
    pub fn bare(content: Content) -> Self {
        HydratedContent {
            content,
            topics: Vec::new(),
            authors: Vec::new(),
            children: Vec::new(),
            image_files: Vec::new(),
        }
    }
}

/// A section of content grouped by a theme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_override: Option<String>,
    pub weight: i32,
    pub public: bool,
    pub page: bool,
}

#[derive(Debug, Serialize)]
pub struct TopicWithCount {
    #[serde(flatten)]
    pub topic: Topic,
    pub content_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub roles: Vec<Role>,
    pub active: bool,
    pub created: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        self.roles.iter().any(|r| roles.contains(r))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    File,
    Image,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedImage {
    pub url: String,
    pub size: u64,
}

/// An uploaded file. Stored as JSON in the `files` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub title: String,
    pub credits: String,
    pub kind: FileKind,
    pub url: String,
    pub size: u64,
    pub created: DateTime<Utc>,
    pub optimized: Vec<OptimizedImage>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub message: String,
    pub r#type: String, // 'success' or 'error'
}

pub mod db_operations;
