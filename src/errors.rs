use crate::helper::auth_helpers::AuthError;
use crate::helper::file_helpers::FileError;
use crate::helper::form_helpers::FormError;
use crate::helper::mail_helpers::MailError;
use crate::helper::mailchimp_helpers::MailchimpError;
use crate::helper::session_helpers::SessionError;
use crate::models::db_operations::DbError;
use crate::models::UnknownVariant;
use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Every failure a handler can return. `status_code` is the one place
/// errors become HTTP statuses.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    File(#[from] FileError),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error(transparent)]
    Mailchimp(#[from] MailchimpError),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Blocking task failed: {0}")]
    Blocking(#[from] BlockingError),
    #[error("{0}")]
    Internal(String),
}

impl From<UnknownVariant> for AppError {
    fn from(e: UnknownVariant) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

fn db_status(e: &DbError) -> StatusCode {
    match e {
        DbError::InvalidId(_) => StatusCode::BAD_REQUEST,
        DbError::NotFound(_) => StatusCode::NOT_FOUND,
        DbError::Duplicate(_) | DbError::DependentContentExists(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Form(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Db(e) => db_status(e),
            AppError::Auth(e) => match e {
                AuthError::WrongPassword => StatusCode::UNAUTHORIZED,
                AuthError::InvalidKey => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },
            AppError::File(e) => match e {
                FileError::EmptyUpload | FileError::MissingFile | FileError::Multipart(_) => StatusCode::BAD_REQUEST,
                FileError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                FileError::Db(db) => db_status(db),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{} -> {}", self, status);
        } else {
            log::warn!("{} -> {}", self, status);
        }

        // Internal details stay in the log and the error report.
        let message = if status.is_server_error() {
            status.canonical_reason().unwrap_or("Error").to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status)
            .content_type("text/html; charset=utf-8")
            .body(error_page(status, &message))
    }
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{code}</title>\
         <link href=\"/static/basscss.min.css\" rel=\"stylesheet\"></head>\
         <body><main><h1>{code}</h1><h2>{message}</h2><p><a href=\"/\">&larr;</a></p></main></body></html>",
        code = status.as_u16(),
        message = html_escape::encode_text(message),
    )
}
