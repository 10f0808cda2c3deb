use redb::{CommitError, DatabaseError, StorageError, TableError, TransactionError};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub mod content_db_operations;
pub mod files_db_operations;
pub mod topics_db_operations;
pub mod users_db_operations;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Redb database error: {0}")]
    RedbDatabase(#[from] DatabaseError),
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Invalid identifier: '{0}'")]
    InvalidId(String),
    #[error("Item not found in database: {0}")]
    NotFound(String),
    #[error("Duplicate value: {0}")]
    Duplicate(String),
    #[error("Cannot delete {0}: dependent content exists")]
    DependentContentExists(String),
    #[error("Language '{0}' is not supported by the text index; set a language override")]
    UnsupportedTextLanguage(String),
    #[error("Corrupt record: {0}")]
    InvalidRecord(String),
}

/// Parses a textual identifier, keeping the malformed input for the error.
pub fn parse_id(id: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(id.trim()).map_err(|_| DbError::InvalidId(id.to_string()))
}

/// One page of a sorted listing plus its neighbours.
#[derive(Debug, Clone, Serialize)]
pub struct PageSlice<T> {
    pub items: Vec<T>,
    pub current: u32,
    pub prev: Option<u32>,
    pub next: Option<u32>,
    pub total: usize,
}

/// Cuts an already sorted listing. Page numbers start at 1; smaller values
/// are read as 1. Pages past the end yield an empty slice.
pub fn paginate<T>(sorted: Vec<T>, per_page: u32, page: u32) -> PageSlice<T> {
    let page = page.max(1);
    let per_page = per_page.max(1) as usize;
    let total = sorted.len();
    let skip = (page as usize - 1).saturating_mul(per_page);

    let next = (total > skip.saturating_add(per_page)).then(|| page + 1);
    let prev = (page > 1).then(|| page - 1);
    let items = sorted.into_iter().skip(skip).take(per_page).collect();

    PageSlice { items, current: page, prev, next, total }
}
