use crate::models::db_operations::content_db_operations::{CONTENT, CONTENT_TEXT_INDEX};
use crate::models::db_operations::files_db_operations::FILES;
use crate::models::db_operations::topics_db_operations::{TOPICS, TOPIC_TITLES};
use redb::{CommitError, Database, DatabaseError, StorageError, TableError, TransactionError};
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
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
}

/// Creates the users table and its unique email index if they are missing.
pub fn ensure_users_schema(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;
    tx.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            roles TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created TEXT NOT NULL
        )",
        [],
    )?;
    tx.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS users_email_idx ON users (email COLLATE NOCASE)",
        [],
    )?;
    tx.commit()?;
    log::info!("Users schema is in place.");
    Ok(())
}

/// Opens every content table once inside a write transaction; redb creates
/// the ones that do not exist and leaves the rest untouched.
pub fn ensure_content_tables(db: &Database) -> Result<(), SetupError> {
    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(CONTENT)?;
        write_txn.open_table(CONTENT_TEXT_INDEX)?;
        write_txn.open_table(TOPICS)?;
        write_txn.open_table(TOPIC_TITLES)?;
        write_txn.open_table(FILES)?;
    }
    write_txn.commit()?;
    log::info!("Content tables and indexes are in place.");
    Ok(())
}

/// Idempotent: safe to run on every start.
pub fn ensure_indexes(db: &Database, conn: &mut Connection) -> Result<(), SetupError> {
    ensure_content_tables(db)?;
    ensure_users_schema(conn)?;
    Ok(())
}

/// Opens the content database, creating the file and its folder on first use.
pub fn open_content_db(path: &Path) -> Result<Database, SetupError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(Database::create(path)?)
}
