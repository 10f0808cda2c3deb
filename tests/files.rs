mod common;

use common::{FailingOptimizer, HalfwayOptimizer, Harness, PhantomOptimizer, StubOptimizer};
use magazine_backend::helper::file_helpers::{delete_file, upload, FileError, UploadedFile};
use magazine_backend::models::db_operations::files_db_operations::{get_file, list_files_by_page};
use magazine_backend::models::db_operations::DbError;
use magazine_backend::models::FileKind;
use redb::{Database, TableDefinition};
use std::fs;
use std::path::Path;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn pdf() -> UploadedFile {
    UploadedFile {
        filename: "minutes.pdf".into(),
        content_type: Some("application/pdf".into()),
        bytes: b"%PDF-1.4 minutes".to_vec(),
        title: "Minutes".into(),
        credits: "Board".into(),
        optimize: true,
    }
}

fn leftovers(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).unwrap().flatten() {
        if entry.path().is_dir() {
            names.extend(leftovers(&entry.path()));
        } else {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names
}

fn png(optimize: bool) -> UploadedFile {
    UploadedFile {
        filename: "cover.png".into(),
        content_type: Some("image/png".into()),
        bytes: PNG_MAGIC.to_vec(),
        title: "Cover".into(),
        credits: String::new(),
        optimize,
    }
}

#[test]
fn empty_and_oversized_uploads_are_rejected() {
    let h = Harness::new();
    let dir = h.state.config.files_dir();

    let empty = UploadedFile { bytes: Vec::new(), ..pdf() };
    assert!(matches!(upload(&h.db, &empty, &dir, &StubOptimizer, 1024), Err(FileError::EmptyUpload)));
    assert!(matches!(upload(&h.db, &pdf(), &dir, &StubOptimizer, 4), Err(FileError::TooLarge { max: 4 })));
    assert_eq!(list_files_by_page(&h.db, 100, 1).unwrap().total, 0);
}

#[test]
fn plain_files_skip_the_optimizer_and_get_a_missing_leaf_dir() {
    let h = Harness::new();
    let dir = h.state.config.files_dir().join("2024");

    let record = upload(&h.db, &pdf(), &dir, &FailingOptimizer, 1024).unwrap();
    assert_eq!(record.kind, FileKind::File);
    assert_eq!(record.url, format!("/files/{}.pdf", record.id));
    assert!(record.optimized.is_empty());
    assert_eq!(fs::read(dir.join(format!("{}.pdf", record.id))).unwrap(), b"%PDF-1.4 minutes");
    assert_eq!(get_file(&h.db, &record.id.to_string()).unwrap(), record);
}

#[test]
fn missing_ancestors_fail_without_a_record() {
    let h = Harness::new();
    let dir = h.dir.path().join("nowhere").join("files");

    assert!(matches!(upload(&h.db, &pdf(), &dir, &StubOptimizer, 1024), Err(FileError::Io(_))));
    assert_eq!(list_files_by_page(&h.db, 100, 1).unwrap().total, 0);
}

#[test]
fn optimized_images_are_recorded_and_deleted_together() {
    let h = Harness::new();
    let dir = h.state.config.files_dir();

    let record = upload(&h.db, &png(true), &dir, &StubOptimizer, 1024).unwrap();
    assert_eq!(record.kind, FileKind::Image);
    assert_eq!(record.optimized.len(), 1);
    assert_eq!(record.optimized[0].url, format!("/files/optimized/{}_1x.jpg", record.id));
    assert_eq!(record.optimized[0].size, b"variant".len() as u64);

    let original = dir.join(format!("{}.png", record.id));
    let variant = dir.join("optimized").join(format!("{}_1x.jpg", record.id));
    assert!(original.exists() && variant.exists());

    let id = record.id.to_string();
    assert_eq!(delete_file(&h.db, &id, &dir).unwrap(), record);
    assert!(!original.exists());
    assert!(!variant.exists());
    assert!(matches!(get_file(&h.db, &id), Err(DbError::NotFound(_))));
    assert!(matches!(delete_file(&h.db, &id, &dir), Err(FileError::Db(DbError::NotFound(_)))));
}

#[test]
fn unoptimized_images_keep_only_the_original() {
    let h = Harness::new();
    let dir = h.state.config.files_dir();

    let record = upload(&h.db, &png(false), &dir, &FailingOptimizer, 1024).unwrap();
    assert!(record.optimized.is_empty());
    assert!(!dir.join("optimized").exists());
}

#[test]
fn failed_optimization_removes_the_original() {
    let h = Harness::new();
    let dir = h.state.config.files_dir();

    let result = upload(&h.db, &png(true), &dir, &FailingOptimizer, 1024);
    assert!(matches!(result, Err(FileError::Optimizer(_))));
    assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    assert_eq!(list_files_by_page(&h.db, 100, 1).unwrap().total, 0);
}

#[test]
fn optimizer_failing_midway_leaves_no_variants() {
    let h = Harness::new();
    let dir = h.state.config.files_dir();

    let result = upload(&h.db, &png(true), &dir, &HalfwayOptimizer, 1024);
    assert!(matches!(result, Err(FileError::Optimizer(_))));
    assert!(leftovers(&dir).is_empty());
    assert_eq!(list_files_by_page(&h.db, 100, 1).unwrap().total, 0);
}

#[test]
fn missing_variant_rolls_back_the_written_ones() {
    let h = Harness::new();
    let dir = h.state.config.files_dir();

    let result = upload(&h.db, &png(true), &dir, &PhantomOptimizer, 1024);
    assert!(matches!(result, Err(FileError::Io(_))));
    assert!(leftovers(&dir).is_empty());
    assert_eq!(list_files_by_page(&h.db, 100, 1).unwrap().total, 0);
}

#[test]
fn failed_insert_removes_everything_written() {
    let h = Harness::new();
    let dir = h.state.config.files_dir();

    // A `files` table with the wrong schema makes every insert fail.
    let broken = Database::create(h.dir.path().join("broken.redb")).unwrap();
    let txn = broken.begin_write().unwrap();
    txn.open_table(TableDefinition::<&str, u64>::new("files")).unwrap();
    txn.commit().unwrap();

    let result = upload(&broken, &png(true), &dir, &StubOptimizer, 1024);
    assert!(matches!(result, Err(FileError::Db(_))));
    assert!(leftovers(&dir).is_empty());

    assert!(matches!(upload(&broken, &pdf(), &dir, &StubOptimizer, 1024), Err(FileError::Db(_))));
    assert!(leftovers(&dir).is_empty());
}
