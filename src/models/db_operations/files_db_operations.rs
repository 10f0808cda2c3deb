use crate::models::db_operations::{paginate, parse_id, DbError, PageSlice};
use crate::models::FileRecord;
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

pub const FILES: TableDefinition<&[u8; 16], &str> = TableDefinition::new("files");

fn all_files(db: &Database) -> Result<Vec<FileRecord>, DbError> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(FILES)?;
    let mut files = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        files.push(serde_json::from_str::<FileRecord>(value.value())?);
    }
    Ok(files)
}

pub fn insert_file(db: &Database, file: &FileRecord) -> Result<(), DbError> {
    let json = serde_json::to_string(file)?;
    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(FILES)?;
        table.insert(&file.id.into_bytes(), json.as_str())?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn get_file(db: &Database, id: &str) -> Result<FileRecord, DbError> {
    let id = parse_id(id)?;
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(FILES)?;
    let guard = table
        .get(id.as_bytes())?
        .ok_or_else(|| DbError::NotFound(format!("file {}", id)))?;
    Ok(serde_json::from_str(guard.value())?)
}

pub fn update_file_meta(db: &Database, id: &str, title: &str, credits: &str) -> Result<FileRecord, DbError> {
    let mut file = get_file(db, id)?;
    file.title = title.to_string();
    file.credits = credits.to_string();
    insert_file(db, &file)?;
    Ok(file)
}

/// Removes the record and hands it back so the caller can clean up disk.
pub fn remove_file_record(db: &Database, id: &Uuid) -> Result<FileRecord, DbError> {
    let write_txn = db.begin_write()?;
    let removed: FileRecord = {
        let mut table = write_txn.open_table(FILES)?;
        let removed = match table.remove(id.as_bytes())? {
            Some(guard) => serde_json::from_str(guard.value())?,
            None => return Err(DbError::NotFound(format!("file {}", id))),
        };
        removed
    };
    write_txn.commit()?;
    Ok(removed)
}

/// Newest uploads first.
pub fn list_files_by_page(db: &Database, per_page: u32, page: u32) -> Result<PageSlice<FileRecord>, DbError> {
    let mut files = all_files(db)?;
    files.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.id.cmp(&b.id)));
    Ok(paginate(files, per_page, page))
}

/// Records whose original or optimized URL is one of `urls`, in `urls` order.
pub fn find_files_by_urls(db: &Database, urls: &[String]) -> Result<Vec<FileRecord>, DbError> {
    if urls.is_empty() {
        return Ok(Vec::new());
    }
    let files = all_files(db)?;
    let mut found = Vec::new();
    for url in urls {
        let hit = files
            .iter()
            .find(|f| &f.url == url || f.optimized.iter().any(|o| &o.url == url));
        if let Some(file) = hit {
            if !found.iter().any(|f: &FileRecord| f.id == file.id) {
                found.push(file.clone());
            }
        }
    }
    Ok(found)
}
