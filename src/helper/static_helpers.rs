//! Static and uploaded files with cheap validators: the ETag is built from
//! modification time and size, never from the file's bytes.

use actix_files::NamedFile;
use actix_web::http::header::{self, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use rand::Rng;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36_DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Strong ETag: `"` + base36(mtime seconds) + base36(size) + `"`.
pub fn etag(modified: SystemTime, size: u64) -> String {
    let secs = modified.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    format!("\"{}{}\"", base36(secs), base36(size))
}

/// True when an `If-None-Match` header value names `etag` (or is `*`).
pub fn if_none_match_hits(header_value: &str, etag: &str) -> bool {
    header_value
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate.trim_start_matches("W/") == etag)
}

/// Joins a request path under `root`, refusing anything that could leave it.
pub fn safe_join(root: &Path, requested: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    let mut segments = 0;
    for component in Path::new(requested).components() {
        match component {
            Component::Normal(segment) => {
                path.push(segment);
                segments += 1;
            }
            Component::CurDir => (),
            _ => return None,
        }
    }
    (segments > 0).then_some(path)
}

pub fn status_for_io_error(e: &io::Error) -> StatusCode {
    match e.kind() {
        io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_response(status: StatusCode) -> HttpResponse {
    let mut builder = HttpResponse::build(status);
    if status == StatusCode::SERVICE_UNAVAILABLE {
        // 3 to 5 seconds, so clients do not come back all at once
        let backoff: u8 = rand::thread_rng().gen_range(3..=5);
        builder.insert_header((header::RETRY_AFTER, backoff.to_string()));
    }
    builder
        .content_type("text/plain; charset=utf-8")
        .body(status.canonical_reason().unwrap_or("Error"))
}

pub async fn serve(req: &HttpRequest, root: &Path, requested: &str, max_age: u32) -> HttpResponse {
    let Some(path) = safe_join(root, requested) else {
        log::warn!("Rejected static path '{}'", requested);
        return error_response(StatusCode::BAD_REQUEST);
    };

    let opened = web::block(move || -> io::Result<(NamedFile, String)> {
        let meta = fs::metadata(&path)?;
        if meta.is_dir() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "is a directory"));
        }
        let tag = etag(meta.modified()?, meta.len());
        Ok((NamedFile::open(&path)?, tag))
    })
    .await;

    let (file, tag) = match opened {
        Ok(Ok(opened)) => opened,
        Ok(Err(e)) => {
            let status = status_for_io_error(&e);
            if status == StatusCode::SERVICE_UNAVAILABLE {
                log::error!("Could not open static file '{}': {}", requested, e);
            }
            return error_response(status);
        }
        Err(e) => {
            log::error!("Static file task failed for '{}': {}", requested, e);
            return error_response(StatusCode::SERVICE_UNAVAILABLE);
        }
    };

    let cache_control = format!("max-age={}", max_age);
    let not_modified = req
        .headers()
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| if_none_match_hits(v, &tag));
    if not_modified {
        return HttpResponse::NotModified()
            .insert_header((header::ETAG, tag))
            .insert_header((header::CACHE_CONTROL, cache_control))
            .finish();
    }

    let mut response = file.use_etag(false).into_response(req);
    if let Ok(value) = HeaderValue::from_str(&tag) {
        response.headers_mut().insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&cache_control) {
        response.headers_mut().insert(header::CACHE_CONTROL, value);
    }
    response
}
