//! Admin form handling: flash notifications and the mapping from submitted
//! fields onto topics, content and users.

use crate::errors::AppError;
use crate::helper::auth_helpers::{confirm_password, new_user, normalize_email, AuthError};
use crate::helper::form_helpers::{FormError, FormFields};
use crate::helper::language::Locale;
use crate::helper::slug_helpers::slugify;
use crate::models::db_operations::{parse_id, DbError};
use crate::models::{language_override_for, Content, ContentType, InlineImage, Notification, Role, Topic, User};
use actix_session::Session;
use chrono::{FixedOffset, Utc};
use uuid::Uuid;

const NOTIFICATION_KEY: &str = "notification";

pub fn set_notification(session: &Session, message: &str, r#type: &str) {
    let notification = Notification { message: message.to_string(), r#type: r#type.to_string() };
    if let Err(e) = session.insert(NOTIFICATION_KEY, &notification) {
        log::error!("Could not store notification '{}': {}", message, e);
    }
}

/// Reads and clears the pending notification.
pub fn take_notification(session: &Session) -> Option<Notification> {
    match session.remove_as::<Notification>(NOTIFICATION_KEY) {
        Some(Ok(notification)) => Some(notification),
        Some(Err(raw)) => {
            log::warn!("Discarding unreadable notification: {}", raw);
            None
        }
        None => None,
    }
}

fn parse_ids(values: Vec<&str>) -> Result<Vec<Uuid>, DbError> {
    let mut ids: Vec<Uuid> = Vec::with_capacity(values.len());
    for value in values {
        let id = parse_id(value)?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

fn language_field(fields: &FormFields) -> Result<String, AppError> {
    Ok(fields.required("language")?.parse::<Locale>()?.code().to_string())
}

/// Titles made only of characters without a Latin spelling (CJK, emoji,
/// punctuation) give no slug and would leave the page unreachable.
fn slug_for(title: &str) -> Result<String, FormError> {
    let slug = slugify(title);
    if slug.is_empty() {
        return Err(FormError::Invalid { field: "title".to_string(), value: title.to_string() });
    }
    Ok(slug)
}

// --- Topics ---

/// Builds the topic to save. A form without an `id` creates a new topic.
pub fn topic_from_form(fields: &FormFields) -> Result<Topic, AppError> {
    let id = match fields.get("id").map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => parse_id(id)?,
        None => Uuid::new_v4(),
    };
    let title = fields.required("title")?;
    let language = language_field(fields)?;
    Ok(Topic {
        id,
        slug: slug_for(&title)?,
        title,
        language_override: language_override_for(&language).map(str::to_string),
        language,
        weight: fields.parse_value("weight")?.unwrap_or(0),
        public: fields.checkbox("public"),
        page: fields.checkbox("page"),
    })
}

// --- Content ---

fn images_from_form(fields: &FormFields) -> Vec<InlineImage> {
    let urls = fields.values("image_url");
    let captions = fields.values("image_caption");
    let links = fields.values("image_link_to");
    let credits = fields.values("image_credits");
    let at = |values: &[&str], i: usize| values.get(i).copied().unwrap_or_default().to_string();

    urls.iter()
        .enumerate()
        .filter(|(_, url)| !url.is_empty())
        .map(|(i, url)| InlineImage {
            url: url.to_string(),
            caption: at(&captions, i),
            link_to: at(&links, i),
            credits: at(&credits, i),
        })
        .collect()
}

fn payload_from_form(fields: &FormFields) -> Result<serde_json::Map<String, serde_json::Value>, FormError> {
    let raw = fields.text("payload");
    if raw.is_empty() {
        return Ok(serde_json::Map::new());
    }
    serde_json::from_str(&raw).map_err(|_| FormError::Invalid { field: "payload".to_string(), value: raw })
}

fn optional_text(fields: &FormFields, name: &str) -> Option<String> {
    Some(fields.text(name)).filter(|s| !s.is_empty())
}

/// Copies the submitted fields onto `content` and recomputes everything
/// derived from them: slug, language override, published time, page
/// metadata defaults.
pub fn apply_content_form(content: &mut Content, fields: &FormFields, offset: FixedOffset) -> Result<(), AppError> {
    let title = fields.required("title")?;
    let slug = slug_for(&title)?;

    content.language = language_field(fields)?;
    content.content_type = fields.required("content_type")?.parse::<ContentType>()?;
    content.weight = fields.parse_value("weight")?.unwrap_or(0);
    content.public = fields.checkbox("public");
    content.promoted = fields.checkbox("promoted");
    if let Some(created) = fields.datetime("created", offset)? {
        content.created = created;
    }
    content.scheduled = fields.datetime("scheduled", offset)?;

    content.parent_id = match fields.get("parent_id").map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => Some(parse_id(id)?),
        None => None,
    };
    content.topic_ids = parse_ids(fields.get_all("topic_ids"))?;
    content.author_ids = parse_ids(fields.get_all("author_ids"))?;

    content.lede = fields.text("lede");
    content.body = fields.get("body").unwrap_or_default().to_string();
    content.cover_external = optional_text(fields, "cover_external");
    content.cover_internal = optional_text(fields, "cover_internal");
    content.images = images_from_form(fields);
    content.event_start = fields.datetime("event_start", offset)?;
    content.location = fields.text("location");
    content.link_to = fields.text("link_to");
    content.payload = payload_from_form(fields)?;

    content.slug = slug;
    content.page_slug = fields.text("page_slug");
    content.page_title = optional_text(fields, "page_title").unwrap_or_else(|| title.clone());
    content.page_description = optional_text(fields, "page_description").unwrap_or_else(|| content.lede.clone());
    content.title = title;

    content.apply_language_override();
    content.refresh_published();
    Ok(())
}

/// A new item built entirely from the form; id and creation time are the server's.
pub fn content_from_form(fields: &FormFields, offset: FixedOffset) -> Result<Content, AppError> {
    let mut content = Content::new("en", ContentType::Article, "");
    let created = content.created;
    apply_content_form(&mut content, fields, offset)?;
    content.created = created;
    content.refresh_published();
    Ok(content)
}

// --- Users ---

fn roles_from_form(fields: &FormFields) -> Result<Vec<Role>, AppError> {
    let mut roles = Vec::new();
    for value in fields.get_all("roles") {
        roles.push(value.parse::<Role>()?);
    }
    Ok(roles)
}

pub fn user_from_form(fields: &FormFields, secret: &[u8]) -> Result<User, AppError> {
    let password = fields.get("password").unwrap_or_default();
    confirm_password(password, fields.get("password_confirm").unwrap_or_default())?;
    Ok(new_user(
        password,
        &fields.text("email"),
        &fields.text("first_name"),
        &fields.text("last_name"),
        &roles_from_form(fields)?,
        secret,
    )?)
}

/// Profile, roles and activity; passwords change through their own form.
pub fn apply_user_form(user: &mut User, fields: &FormFields) -> Result<(), AppError> {
    let roles = roles_from_form(fields)?;
    if roles.is_empty() {
        return Err(AuthError::NoRoles.into());
    }
    user.email = normalize_email(&fields.text("email"))?;
    user.first_name = fields.text("first_name");
    user.last_name = fields.text("last_name");
    user.roles = roles;
    user.active = fields.checkbox("active");
    Ok(())
}

/// Stamps an edit.
pub fn touch(content: &mut Content) {
    content.updated = Some(Utc::now());
}
