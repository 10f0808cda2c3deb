//! Uploaded files on disk and their records in the `files` table.

use crate::models::db_operations::{files_db_operations, parse_id, DbError};
use crate::models::{FileKind, FileRecord, OptimizedImage};
use actix_multipart::Multipart;
use actix_web::web::BytesMut;
use chrono::Utc;
use futures_util::StreamExt;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use redb::Database;
use std::fs;
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

pub const OPTIMIZED_DIR: &str = "optimized";
const MAX_EXTENSION_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("Uploaded file is empty")]
    EmptyUpload,
    #[error("Uploaded file exceeds the limit of {max} bytes")]
    TooLarge { max: u64 },
    #[error("No file was uploaded")]
    MissingFile,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("Image optimization failed: {0}")]
    Optimizer(String),
    #[error("Multipart error: {0}")]
    Multipart(String),
    #[error("File record {id} was deleted but cleanup failed: {}", .failures.join("; "))]
    Cleanup { id: Uuid, failures: Vec<String> },
}

/// Produces alternate renditions of an uploaded image.
pub trait ImageOptimizer: Send + Sync {
    /// Writes variants of `source` into `out_dir`, each file name starting
    /// with `id`, and returns their paths.
    fn optimize(&self, source: &Path, out_dir: &Path, id: Uuid) -> Result<Vec<PathBuf>, FileError>;
}

/// 1x and 2x renditions in JPEG and WebP, built with the `image` crate.
#[derive(Debug, Clone)]
pub struct ImageCrateOptimizer {
    pub base_width: u32,
    pub jpeg_quality: u8,
}

impl Default for ImageCrateOptimizer {
    fn default() -> Self {
        ImageCrateOptimizer { base_width: 960, jpeg_quality: 82 }
    }
}

impl ImageCrateOptimizer {
    /// Never upscales: small originals are re-encoded at their own width.
    fn scaled(img: &DynamicImage, max_width: u32) -> DynamicImage {
        if img.width() <= max_width {
            return img.clone();
        }
        let height = (img.height() as u64 * max_width as u64 / img.width() as u64).max(1) as u32;
        img.resize_exact(max_width, height, FilterType::Lanczos3)
    }

    fn save_jpeg(&self, img: &DynamicImage, path: &Path) -> Result<(), FileError> {
        let writer = BufWriter::new(fs::File::create(path)?);
        let encoder = JpegEncoder::new_with_quality(writer, self.jpeg_quality);
        DynamicImage::ImageRgb8(img.to_rgb8())
            .write_with_encoder(encoder)
            .map_err(|e| FileError::Optimizer(format!("JPEG encode failed for {}: {}", path.display(), e)))
    }

    fn save_webp(&self, img: &DynamicImage, path: &Path) -> Result<(), FileError> {
        let writer = BufWriter::new(fs::File::create(path)?);
        let encoder = WebPEncoder::new_lossless(writer);
        DynamicImage::ImageRgba8(img.to_rgba8())
            .write_with_encoder(encoder)
            .map_err(|e| FileError::Optimizer(format!("WebP encode failed for {}: {}", path.display(), e)))
    }
}

impl ImageOptimizer for ImageCrateOptimizer {
    fn optimize(&self, source: &Path, out_dir: &Path, id: Uuid) -> Result<Vec<PathBuf>, FileError> {
        let img = image::open(source)
            .map_err(|e| FileError::Optimizer(format!("Failed to decode {}: {}", source.display(), e)))?;
        fs::create_dir_all(out_dir)?;

        let mut written = Vec::with_capacity(4);
        for (density, factor) in [("1x", 1), ("2x", 2)] {
            let scaled = Self::scaled(&img, self.base_width.saturating_mul(factor));

            let jpg = out_dir.join(format!("{}_{}.jpg", id, density));
            self.save_jpeg(&scaled, &jpg)?;
            written.push(jpg);

            let webp = out_dir.join(format!("{}_{}.webp", id, density));
            self.save_webp(&scaled, &webp)?;
            written.push(webp);
        }
        Ok(written)
    }
}

/// An upload as read from the multipart form, before anything touches disk.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub title: String,
    pub credits: String,
    pub optimize: bool,
}

impl UploadedFile {
    /// Declared type mentions `image`, or the bytes sniff as a known format.
    pub fn kind(&self) -> FileKind {
        let declared = self.content_type.as_deref().map_or(false, |t| t.contains("image"));
        if declared || image::guess_format(&self.bytes).is_ok() {
            FileKind::Image
        } else {
            FileKind::File
        }
    }

    /// A safe extension with its leading dot, or empty.
    pub fn extension(&self) -> String {
        let from_name = Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .filter(|e| !e.is_empty() && e.len() <= MAX_EXTENSION_LEN && e.chars().all(|c| c.is_ascii_alphanumeric()));
        let sniffed = || {
            image::guess_format(&self.bytes)
                .ok()
                .and_then(|f: ImageFormat| f.extensions_str().first().map(|e| e.to_string()))
        };
        from_name
            .or_else(sniffed)
            .map(|e| format!(".{}", e))
            .unwrap_or_default()
    }
}

/// Reads the upload form: a `file` part plus `title`, `credits` and the
/// `optimize` checkbox. The size limit is enforced while streaming.
pub async fn read_upload(mut payload: Multipart, max_bytes: u64) -> Result<UploadedFile, FileError> {
    let mut upload = UploadedFile::default();
    let mut has_file = false;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| FileError::Multipart(e.to_string()))?;
        let field_name = field.content_disposition().get_name().unwrap_or_default().to_string();

        let mut data = BytesMut::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| FileError::Multipart(e.to_string()))?;
            if (data.len() + chunk.len()) as u64 > max_bytes {
                return Err(FileError::TooLarge { max: max_bytes });
            }
            data.extend_from_slice(&chunk);
        }

        match field_name.as_str() {
            "file" => {
                has_file = true;
                upload.filename = field
                    .content_disposition()
                    .get_filename()
                    .unwrap_or("upload")
                    .to_string();
                upload.content_type = field.content_type().map(|m| m.to_string());
                upload.bytes = data.to_vec();
            }
            "title" | "credits" | "optimize" => {
                let value = String::from_utf8(data.to_vec())
                    .map_err(|_| FileError::Multipart(format!("Invalid UTF-8 in field '{}'", field_name)))?;
                match field_name.as_str() {
                    "title" => upload.title = value.trim().to_string(),
                    "credits" => upload.credits = value.trim().to_string(),
                    _ => upload.optimize = !value.is_empty() && value != "false",
                }
            }
            _ => (),
        }
    }

    if !has_file {
        return Err(FileError::MissingFile);
    }
    Ok(upload)
}

/// Writes `bytes` to `path`. A missing parent is created once; missing
/// ancestors above it are reported as the I/O error.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<(), FileError> {
    match fs::write(path, bytes) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                fs::create_dir(parent)?;
            }
            fs::write(path, bytes)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn optimized_url(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    Some(format!("/files/{}/{}", OPTIMIZED_DIR, name))
}

/// Stores an upload under `dest_dir` and records it. Blocking; call from
/// `web::block` inside handlers. On any failure after the first write, the
/// original and every `optimized/{id}*` variant are removed again.
pub fn upload(
    db: &Database,
    upload: &UploadedFile,
    dest_dir: &Path,
    optimizer: &dyn ImageOptimizer,
    max_bytes: u64,
) -> Result<FileRecord, FileError> {
    if upload.bytes.is_empty() {
        return Err(FileError::EmptyUpload);
    }
    if upload.bytes.len() as u64 > max_bytes {
        return Err(FileError::TooLarge { max: max_bytes });
    }

    let id = Uuid::new_v4();
    let name = format!("{}{}", id, upload.extension());
    let path = dest_dir.join(&name);
    match store(db, upload, dest_dir, optimizer, id, &name) {
        Ok(record) => {
            log::info!("Stored upload '{}' as {} ({} bytes)", upload.filename, record.url, record.size);
            Ok(record)
        }
        Err(e) => {
            discard(dest_dir, &path, id);
            Err(e)
        }
    }
}

fn store(
    db: &Database,
    upload: &UploadedFile,
    dest_dir: &Path,
    optimizer: &dyn ImageOptimizer,
    id: Uuid,
    name: &str,
) -> Result<FileRecord, FileError> {
    let kind = upload.kind();
    let path = dest_dir.join(name);
    write_file(&path, &upload.bytes)?;

    let mut optimized = Vec::new();
    if kind == FileKind::Image && upload.optimize {
        for variant in optimizer.optimize(&path, &dest_dir.join(OPTIMIZED_DIR), id)? {
            let size = fs::metadata(&variant)?.len();
            let url = optimized_url(&variant)
                .ok_or_else(|| FileError::Optimizer(format!("Unusable variant path {}", variant.display())))?;
            optimized.push(OptimizedImage { url, size });
        }
    }

    let record = FileRecord {
        id,
        title: upload.title.clone(),
        credits: upload.credits.clone(),
        kind,
        url: format!("/files/{}", name),
        size: upload.bytes.len() as u64,
        created: Utc::now(),
        optimized,
    };
    files_db_operations::insert_file(db, &record)?;
    Ok(record)
}

/// Every file belonging to `id` under `files_dir`: the original, if known,
/// and the variants in `optimized/` named after it.
fn files_of(files_dir: &Path, original: Option<PathBuf>, id: Uuid) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = original.into_iter().collect();
    let prefix = id.to_string();
    match fs::read_dir(files_dir.join(OPTIMIZED_DIR)) {
        Ok(entries) => {
            for entry in entries.flatten() {
                if entry.file_name().to_string_lossy().starts_with(&prefix) {
                    paths.push(entry.path());
                }
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => (),
        Err(e) => return Err(e),
    }
    Ok(paths)
}

fn discard(files_dir: &Path, original: &Path, id: Uuid) {
    let paths = match files_of(files_dir, Some(original.to_path_buf()), id) {
        Ok(paths) => paths,
        Err(e) => {
            log::warn!("Could not list variants of failed upload {}: {}", id, e);
            vec![original.to_path_buf()]
        }
    };
    for path in paths {
        match fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                log::warn!("Could not remove '{}' after failed upload: {}", path.display(), e)
            }
            _ => (),
        }
    }
}

/// Deletes the record first, then the original and every optimized variant.
/// Disk failures come back as [`FileError::Cleanup`]; the record stays deleted.
pub fn delete_file(db: &Database, id: &str, files_dir: &Path) -> Result<FileRecord, FileError> {
    let id = parse_id(id)?;
    let record = files_db_operations::remove_file_record(db, &id)?;

    let original = Path::new(&record.url).file_name().map(|name| files_dir.join(name));
    let paths = files_of(files_dir, original, id)
        .map_err(|e| FileError::Cleanup { id, failures: vec![format!("optimized dir: {}", e)] })?;

    let failures: Vec<String> = paths
        .iter()
        .filter_map(|p| fs::remove_file(p).err().map(|e| format!("{}: {}", p.display(), e)))
        .collect();
    if !failures.is_empty() {
        log::error!("File {} deleted with leftovers: {:?}", id, failures);
        return Err(FileError::Cleanup { id, failures });
    }
    Ok(record)
}
