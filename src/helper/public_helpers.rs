use crate::helper::auth_helpers::{normalize_email, verify_password};
use crate::models::db_operations::content_db_operations::{self, ContentFilter, ContentOrder};
use crate::models::db_operations::{topics_db_operations, users_db_operations, DbError, PageSlice};
use crate::models::{ContentType, HydratedContent, Topic, User};
use chrono::{DateTime, Utc};
use redb::Database;
use rusqlite::Connection;
use serde::Serialize;

/// Series on the front pages show only their latest children.
pub const SERIES_CHILDREN: usize = 3;

/// Site navigation: public topics and standalone pages of one language.
#[derive(Debug, Default, Serialize)]
pub struct Navigation {
    pub topics: Vec<Topic>,
    pub pages: Vec<HydratedContent>,
}

pub fn navigation(db: &Database, conn: &Connection, language: &str, now: DateTime<Utc>) -> Result<Navigation, DbError> {
    let pages_filter = ContentFilter::published(language, now).types(&[ContentType::Page]);
    Ok(Navigation {
        topics: topics_db_operations::list_public_topics(db, language)?,
        pages: content_db_operations::list_limited(db, conn, &pages_filter, ContentOrder::WeightPublished, None)?,
    })
}

/// The columns beside the main thread.
#[derive(Debug, Default, Serialize)]
pub struct SideLists {
    pub events: Vec<HydratedContent>,
    pub audio: Vec<HydratedContent>,
    pub series: Vec<HydratedContent>,
    pub research: Vec<HydratedContent>,
}

pub fn side_lists(db: &Database, conn: &Connection, language: &str, now: DateTime<Utc>) -> Result<SideLists, DbError> {
    let base = ContentFilter::published(language, now);
    let of_type = |t: ContentType| {
        content_db_operations::list_limited(db, conn, &base.clone().types(&[t]), ContentOrder::WeightPublished, None)
    };
    Ok(SideLists {
        events: content_db_operations::list_limited(
            db,
            conn,
            &base.clone().events_from(now),
            ContentOrder::EventStart,
            None,
        )?,
        audio: of_type(ContentType::Audio)?,
        series: content_db_operations::list_series(db, conn, language, now, SERIES_CHILDREN)?,
        research: of_type(ContentType::Research)?,
    })
}

/// Everything the index, topic and search pages render.
#[derive(Debug, Serialize)]
pub struct Listing {
    #[serde(flatten)]
    pub navigation: Navigation,
    #[serde(flatten)]
    pub side: SideLists,
    pub topic: Option<Topic>,
    pub main_thread: Vec<HydratedContent>,
    pub current_page: u32,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
    pub search_query: Option<String>,
}

impl Listing {
    pub fn paged(navigation: Navigation, side: SideLists, topic: Option<Topic>, slice: PageSlice<HydratedContent>) -> Self {
        Listing {
            navigation,
            side,
            topic,
            main_thread: slice.items,
            current_page: slice.current,
            prev_page: slice.prev,
            next_page: slice.next,
            search_query: None,
        }
    }

    /// Splits search hits into the page's columns. Pages found by the query
    /// are listed after the navigation pages.
    pub fn search_results(mut navigation: Navigation, query: &str, results: Vec<HydratedContent>) -> Self {
        let mut side = SideLists::default();
        let mut main_thread = Vec::new();
        for item in results {
            match item.content.content_type {
                ContentType::Event => side.events.push(item),
                ContentType::Audio => side.audio.push(item),
                ContentType::Page => navigation.pages.push(item),
                _ => main_thread.push(item),
            }
        }
        Listing {
            navigation,
            side,
            topic: None,
            main_thread,
            current_page: 1,
            prev_page: None,
            next_page: None,
            search_query: Some(query.to_string()),
        }
    }
}

/// The active user with this email and password, if any. Unknown emails,
/// wrong passwords and deactivated accounts all yield `None`.
pub fn verify_credentials(
    conn: &Connection,
    email: &str,
    password: &str,
    secret: &[u8],
) -> Result<Option<User>, DbError> {
    let Ok(email) = normalize_email(email) else {
        return Ok(None);
    };
    let user = users_db_operations::find_user_by_email(conn, &email)?;
    Ok(user.filter(|u| u.active && verify_password(password, &u.password_hash, secret)))
}
