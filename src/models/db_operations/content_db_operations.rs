use crate::models::db_operations::{files_db_operations, paginate, parse_id, topics_db_operations, users_db_operations, DbError, PageSlice};
use crate::models::{language_override_for, Content, ContentType, HydratedContent};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use rusqlite::Connection;
use std::collections::HashMap;
use uuid::Uuid;

pub const CONTENT: TableDefinition<&[u8; 16], &str> = TableDefinition::new("content");
// Text index: (token, content id) -> token weight within that item
pub const CONTENT_TEXT_INDEX: TableDefinition<(&str, &[u8; 16]), u32> = TableDefinition::new("content_text_index");

const TITLE_WEIGHT: u32 = 3;
const DESCRIPTION_WEIGHT: u32 = 2;
const BODY_WEIGHT: u32 = 1;

// --- Filtering ---

/// A conjunction of conditions over content. Unset parts match everything.
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    pub language: Option<String>,
    pub public_only: bool,
    /// Schedule guard: `scheduled` must be unset or before this instant.
    pub visible_at: Option<DateTime<Utc>>,
    pub topic_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub types: Vec<ContentType>,
    /// Articles, banners and photoreports that are not part of a series.
    pub main_thread: bool,
    pub event_from: Option<DateTime<Utc>>,
}

impl ContentFilter {
    /// Public content whose schedule has passed.
    pub fn visible(now: DateTime<Utc>) -> Self {
        ContentFilter { public_only: true, visible_at: Some(now), ..Default::default() }
    }

    /// Visible content of one language, the base of every public listing.
    pub fn published(language: &str, now: DateTime<Utc>) -> Self {
        ContentFilter { language: Some(language.to_string()), ..Self::visible(now) }
    }

    pub fn topic(self, topic_id: &str) -> Result<Self, DbError> {
        Ok(self.topic_uuid(parse_id(topic_id)?))
    }

    pub fn topic_uuid(mut self, topic_id: Uuid) -> Self {
        self.topic_id = Some(topic_id);
        self
    }

    pub fn children_of(self, parent_id: &str) -> Result<Self, DbError> {
        Ok(self.parent_uuid(parse_id(parent_id)?))
    }

    pub fn parent_uuid(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn author_uuid(mut self, author_id: Uuid) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn types(mut self, types: &[ContentType]) -> Self {
        self.types = types.to_vec();
        self
    }

    pub fn main_thread(mut self) -> Self {
        self.main_thread = true;
        self
    }

    pub fn events_from(mut self, from: DateTime<Utc>) -> Self {
        self.event_from = Some(from);
        self.types(&[ContentType::Event])
    }

    pub fn matches(&self, c: &Content) -> bool {
        if let Some(language) = &self.language {
            if &c.language != language {
                return false;
            }
        }
        if self.public_only && !c.public {
            return false;
        }
        if let Some(now) = self.visible_at {
            if c.scheduled.map_or(false, |s| s >= now) {
                return false;
            }
        }
        if let Some(topic_id) = &self.topic_id {
            if !c.topic_ids.contains(topic_id) {
                return false;
            }
        }
        if let Some(parent_id) = &self.parent_id {
            if c.parent_id.as_ref() != Some(parent_id) {
                return false;
            }
        }
        if let Some(author_id) = &self.author_id {
            if !c.author_ids.contains(author_id) {
                return false;
            }
        }
        if !self.types.is_empty() && !self.types.contains(&c.content_type) {
            return false;
        }
        if self.main_thread {
            let in_thread = match c.content_type {
                ContentType::Article | ContentType::Banner => true,
                ContentType::Photoreport => c.parent_id.is_none(),
                _ => false,
            };
            if !in_thread {
                return false;
            }
        }
        if let Some(from) = self.event_from {
            if c.event_start.map_or(true, |start| start < from) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentOrder {
    /// Heaviest first, then newest published.
    WeightPublished,
    /// Soonest event first.
    EventStart,
}

fn sort_contents(items: &mut [Content], order: ContentOrder) {
    match order {
        ContentOrder::WeightPublished => items.sort_by(|a, b| {
            b.weight
                .cmp(&a.weight)
                .then_with(|| b.published.cmp(&a.published))
                .then_with(|| a.id.cmp(&b.id))
        }),
        ContentOrder::EventStart => items.sort_by(|a, b| {
            a.event_start
                .cmp(&b.event_start)
                .then_with(|| a.id.cmp(&b.id))
        }),
    }
}

fn scan(db: &Database, filter: &ContentFilter) -> Result<Vec<Content>, DbError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(CONTENT)?;
    let mut items = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        let content: Content = serde_json::from_str(value.value())?;
        if filter.matches(&content) {
            items.push(content);
        }
    }
    Ok(items)
}

// --- Text index ---

/// Languages the tokenizer knows stop words for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextLanguage {
    English,
    Russian,
    None,
}

impl TextLanguage {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "en" => Some(TextLanguage::English),
            "ru" => Some(TextLanguage::Russian),
            "none" => Some(TextLanguage::None),
            _ => None,
        }
    }

    fn stop_words(&self) -> &'static [&'static str] {
        match self {
            TextLanguage::English => &["the", "and", "of", "to", "in", "is", "it", "on", "for", "an", "at", "by", "with"],
            TextLanguage::Russian => &["и", "в", "на", "не", "что", "по", "с", "из", "за", "от", "до", "как", "это"],
            TextLanguage::None => &[],
        }
    }
}

/// Resolves the tokenizer language of an item, honouring the override field.
pub fn text_language(language: &str, language_override: Option<&str>) -> Result<TextLanguage, DbError> {
    let effective = language_override.unwrap_or(language);
    TextLanguage::from_code(effective).ok_or_else(|| DbError::UnsupportedTextLanguage(effective.to_string()))
}

pub fn tokenize(text: &str, language: TextLanguage) -> Vec<String> {
    let stop_words = language.stop_words();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .filter(|t| !stop_words.contains(&t.as_str()))
        .collect()
}

fn index_terms(content: &Content) -> Result<HashMap<String, u32>, DbError> {
    let language = text_language(&content.language, content.language_override.as_deref())?;
    let mut terms: HashMap<String, u32> = HashMap::new();
    let fields = [
        (content.title.as_str(), TITLE_WEIGHT),
        (content.page_description.as_str(), DESCRIPTION_WEIGHT),
        (content.lede.as_str(), DESCRIPTION_WEIGHT),
        (content.body.as_str(), BODY_WEIGHT),
    ];
    for (text, weight) in fields {
        for token in tokenize(text, language) {
            *terms.entry(token).or_insert(0) += weight;
        }
    }
    Ok(terms)
}

fn remove_from_index(write_txn: &WriteTransaction, content: &Content) -> Result<(), DbError> {
    // Items that failed to index never made it in, so unknown languages have nothing to remove.
    let terms = match index_terms(content) {
        Ok(terms) => terms,
        Err(DbError::UnsupportedTextLanguage(_)) => return Ok(()),
        Err(e) => return Err(e),
    };
    let id_bytes = content.id.into_bytes();
    let mut index = write_txn.open_table(CONTENT_TEXT_INDEX)?;
    for term in terms.keys() {
        index.remove((term.as_str(), &id_bytes))?;
    }
    Ok(())
}

fn add_to_index(write_txn: &WriteTransaction, content: &Content, terms: &HashMap<String, u32>) -> Result<(), DbError> {
    let id_bytes = content.id.into_bytes();
    let mut index = write_txn.open_table(CONTENT_TEXT_INDEX)?;
    for (term, weight) in terms {
        index.insert((term.as_str(), &id_bytes), *weight)?;
    }
    Ok(())
}

fn relevance_scores(db: &Database, terms: &[String]) -> Result<HashMap<Uuid, u32>, DbError> {
    let read_txn = db.begin_read()?;
    let index = read_txn.open_table(CONTENT_TEXT_INDEX)?;
    let mut scores: HashMap<Uuid, u32> = HashMap::new();
    for term in terms {
        let lower = (term.as_str(), &[0u8; 16]);
        let upper = (term.as_str(), &[u8::MAX; 16]);
        for entry in index.range(lower..=upper)? {
            let (key, weight) = entry?;
            let (_, id_bytes) = key.value();
            *scores.entry(Uuid::from_bytes(*id_bytes)).or_insert(0) += weight.value();
        }
    }
    Ok(scores)
}

// --- Reads ---

pub fn get_content(db: &Database, id: &str) -> Result<Content, DbError> {
    get_content_by_uuid(db, &parse_id(id)?)
}

pub fn get_content_by_uuid(db: &Database, id: &Uuid) -> Result<Content, DbError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(CONTENT)?;
    let guard = table
        .get(id.as_bytes())?
        .ok_or_else(|| DbError::NotFound(format!("content {}", id)))?;
    Ok(serde_json::from_str(guard.value())?)
}

/// The visible item with `slug` inside the given topic.
pub fn get_content_by_slug(db: &Database, topic_id: Uuid, slug: &str, now: DateTime<Utc>) -> Result<Content, DbError> {
    let filter = ContentFilter::visible(now).topic_uuid(topic_id);
    scan(db, &filter)?
        .into_iter()
        .find(|c| c.slug == slug)
        .ok_or_else(|| DbError::NotFound(format!("content '{}'", slug)))
}

/// Resolves topics and authors of an item with one lookup per reference.
/// References to records that no longer exist are skipped.
pub fn hydrate(db: &Database, conn: &Connection, content: Content) -> Result<HydratedContent, DbError> {
    let mut hydrated = HydratedContent::bare(content);

    for topic_id in &hydrated.content.topic_ids {
        match topics_db_operations::find_topic(db, topic_id)? {
            Some(topic) => hydrated.topics.push(topic),
            None => log::warn!("Content {} references missing topic {}", hydrated.content.id, topic_id),
        }
    }
    for author_id in &hydrated.content.author_ids {
        match users_db_operations::find_user(conn, author_id)? {
            Some(author) => hydrated.authors.push(author),
            None => log::warn!("Content {} references missing author {}", hydrated.content.id, author_id),
        }
    }
    Ok(hydrated)
}

/// Hydrates an item together with its visible children and the file
/// records behind its inline images.
pub fn hydrate_full(
    db: &Database,
    conn: &Connection,
    content: Content,
    now: DateTime<Utc>,
    children_limit: Option<usize>,
) -> Result<HydratedContent, DbError> {
    let parent_id = content.id;
    let image_urls: Vec<String> = content.images.iter().map(|i| i.url.clone()).collect();
    let mut hydrated = hydrate(db, conn, content)?;
    hydrated.children = children(db, conn, parent_id, now, children_limit)?;
    hydrated.image_files = files_db_operations::find_files_by_urls(db, &image_urls)?;
    Ok(hydrated)
}

pub fn list_by_page(
    db: &Database,
    conn: &Connection,
    filter: &ContentFilter,
    per_page: u32,
    page: u32,
) -> Result<PageSlice<HydratedContent>, DbError> {
    let mut items = scan(db, filter)?;
    sort_contents(&mut items, ContentOrder::WeightPublished);
    let PageSlice { items, current, prev, next, total } = paginate(items, per_page, page);

    let items = items
        .into_iter()
        .map(|c| hydrate(db, conn, c))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PageSlice { items, current, prev, next, total })
}

/// Matching items in `order`, not hydrated.
pub fn list_contents(db: &Database, filter: &ContentFilter, order: ContentOrder) -> Result<Vec<Content>, DbError> {
    let mut items = scan(db, filter)?;
    sort_contents(&mut items, order);
    Ok(items)
}

pub fn list_limited(
    db: &Database,
    conn: &Connection,
    filter: &ContentFilter,
    order: ContentOrder,
    limit: Option<usize>,
) -> Result<Vec<HydratedContent>, DbError> {
    let mut items = list_contents(db, filter, order)?;
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    items.into_iter().map(|c| hydrate(db, conn, c)).collect()
}

/// Visible children of a parent, ordered like any other listing.
pub fn children(
    db: &Database,
    conn: &Connection,
    parent_id: Uuid,
    now: DateTime<Utc>,
    limit: Option<usize>,
) -> Result<Vec<HydratedContent>, DbError> {
    let filter = ContentFilter::visible(now).parent_uuid(parent_id);
    list_limited(db, conn, &filter, ContentOrder::WeightPublished, limit)
}

/// Article series of a language, each with up to `children_limit` children.
pub fn list_series(
    db: &Database,
    conn: &Connection,
    language: &str,
    now: DateTime<Utc>,
    children_limit: usize,
) -> Result<Vec<HydratedContent>, DbError> {
    let filter = ContentFilter::published(language, now).types(&[ContentType::ArticleSeries]);
    let mut series = list_limited(db, conn, &filter, ContentOrder::WeightPublished, None)?;
    for item in series.iter_mut() {
        item.children = children(db, conn, item.content.id, now, Some(children_limit))?;
    }
    Ok(series)
}

/// Full-text search ranked by relevance, newest first among equal scores.
pub fn search(
    db: &Database,
    conn: &Connection,
    filter: &ContentFilter,
    query: &str,
    limit: Option<usize>,
) -> Result<Vec<HydratedContent>, DbError> {
    let query_language = filter
        .language
        .as_deref()
        .map(|l| language_override_for(l).unwrap_or(l))
        .and_then(TextLanguage::from_code)
        .unwrap_or(TextLanguage::None);
    let mut terms = tokenize(query, query_language);
    terms.sort();
    terms.dedup();
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let scores = relevance_scores(db, &terms)?;
    let mut ranked: Vec<(u32, Content)> = Vec::new();
    for (id, score) in scores {
        let content = match get_content_by_uuid(db, &id) {
            Ok(content) => content,
            Err(DbError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        };
        if filter.matches(&content) {
            ranked.push((score, content));
        }
    }
    ranked.sort_by(|(sa, a), (sb, b)| {
        sb.cmp(sa)
            .then_with(|| b.published.cmp(&a.published))
            .then_with(|| a.id.cmp(&b.id))
    });
    if let Some(limit) = limit {
        ranked.truncate(limit);
    }
    ranked.into_iter().map(|(_, c)| hydrate(db, conn, c)).collect()
}

pub fn count_by_topic(db: &Database, topic_id: Uuid) -> Result<usize, DbError> {
    Ok(scan(db, &ContentFilter::default().topic_uuid(topic_id))?.len())
}

pub fn count_by_author(db: &Database, author_id: Uuid) -> Result<usize, DbError> {
    Ok(scan(db, &ContentFilter::default().author_uuid(author_id))?.len())
}

// --- Writes ---

/// Stores a new item and indexes its text. Fails before writing anything
/// when the item's language cannot be indexed.
pub fn create_content(db: &Database, content: &Content) -> Result<(), DbError> {
    let terms = index_terms(content)?;
    let json = serde_json::to_string(content)?;
    let id_bytes = content.id.into_bytes();

    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(CONTENT)?;
        if table.get(&id_bytes)?.is_some() {
            return Err(DbError::Duplicate(format!("content {}", content.id)));
        }
        table.insert(&id_bytes, json.as_str())?;
    }
    add_to_index(&write_txn, content, &terms)?;
    write_txn.commit()?;
    Ok(())
}

/// Replaces an existing item and rebuilds its index entries.
pub fn update_content(db: &Database, content: &Content) -> Result<(), DbError> {
    let terms = index_terms(content)?;
    let json = serde_json::to_string(content)?;
    let id_bytes = content.id.into_bytes();

    let write_txn = db.begin_write()?;
    let previous: Content = {
        let table = write_txn.open_table(CONTENT)?;
        let guard = table
            .get(&id_bytes)?
            .ok_or_else(|| DbError::NotFound(format!("content {}", content.id)))?;
        let previous = serde_json::from_str(guard.value())?;
        previous
    };
    remove_from_index(&write_txn, &previous)?;
    {
        let mut table = write_txn.open_table(CONTENT)?;
        table.insert(&id_bytes, json.as_str())?;
    }
    add_to_index(&write_txn, content, &terms)?;
    write_txn.commit()?;
    Ok(())
}

pub fn delete_content(db: &Database, id: &str) -> Result<(), DbError> {
    let id_bytes = parse_id(id)?.into_bytes();

    let write_txn = db.begin_write()?;
    let removed: Content = {
        let mut table = write_txn.open_table(CONTENT)?;
        let removed = match table.remove(&id_bytes)? {
            Some(guard) => serde_json::from_str(guard.value())?,
            None => return Err(DbError::NotFound(format!("content {}", id))),
        };
        removed
    };
    remove_from_index(&write_txn, &removed)?;
    write_txn.commit()?;
    Ok(())
}
