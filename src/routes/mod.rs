use crate::helper::language::Locale;
use crate::helper::render_helpers::PageView;
use crate::models::User;
use crate::AppState;
use actix_web::http::header;
use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

pub mod admin;
pub mod public;
pub mod static_files;

/// `?p=` on paginated listings. Missing, malformed or non-positive values
/// mean page 1.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    p: Option<String>,
}

impl PageQuery {
    pub fn page(&self) -> u32 {
        self.p
            .as_deref()
            .and_then(|p| p.trim().parse::<i64>().ok())
            .unwrap_or(1)
            .clamp(1, u32::MAX as i64) as u32
    }
}

pub(crate) fn see_other(location: impl Into<String>) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, location.into()))
        .finish()
}

pub(crate) fn page_view<T: Serialize>(state: &AppState, language: Locale, user: Option<User>, data: T) -> PageView<T> {
    PageView::new(language, state.languages.supported(), user, data)
}

pub(crate) fn render_page<T: Serialize>(
    state: &AppState,
    template: &str,
    language: Locale,
    user: Option<User>,
    data: T,
) -> HttpResponse {
    state.renderer.render(template, &page_view(state, language, user, data))
}
