use crate::helper::i18n::{Catalog, CatalogError};
use crate::helper::language::Locale;
use crate::helper::sanitization_helpers::markdown_to_html;
use crate::models::{Notification, User};
use actix_web::HttpResponse;
use serde::Serialize;
use std::collections::HashMap;
use std::error::Error as _;
use std::path::Path;
use tera::{Context, Tera, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Template error: {0}")]
    Tera(#[from] tera::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Serialize)]
pub struct LanguageLink {
    pub code: &'static str,
    pub name: &'static str,
    pub current: bool,
}

/// Everything a page template receives besides the translations.
#[derive(Debug, Serialize)]
pub struct PageView<T: Serialize> {
    pub current_user: Option<User>,
    pub language: Locale,
    pub available_languages: Vec<LanguageLink>,
    pub notification: Option<Notification>,
    pub data: T,
}

impl<T: Serialize> PageView<T> {
    pub fn new(language: Locale, supported: &[Locale], current_user: Option<User>, data: T) -> Self {
        let available_languages = supported
            .iter()
            .map(|l| LanguageLink { code: l.code(), name: l.native_name(), current: *l == language })
            .collect();
        PageView { current_user, language, available_languages, notification: None, data }
    }

    pub fn with_notification(mut self, notification: Option<Notification>) -> Self {
        self.notification = notification;
        self
    }
}

fn markdown_filter(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let source = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("Filter `markdown` expects a string"))?;
    Ok(Value::String(markdown_to_html(source)))
}

/// Owns the templates and translation catalog. Shared read-only.
pub struct Renderer {
    tera: Tera,
    catalog: Catalog,
}

impl Renderer {
    pub fn new(templates_glob: &str, locales_dir: &Path, locales: &[Locale]) -> Result<Self, RenderError> {
        let tera = Tera::new(templates_glob)?;
        let catalog = Catalog::load(locales_dir, locales)?;
        Ok(Self::from_parts(tera, catalog))
    }

    pub fn from_parts(mut tera: Tera, catalog: Catalog) -> Self {
        tera.register_filter("markdown", markdown_filter);
        Renderer { tera, catalog }
    }

    pub fn translate(&self, locale: Locale, id: &str) -> String {
        self.catalog.translate(locale, id)
    }

    pub fn render_to_string<T: Serialize>(&self, template: &str, page: &PageView<T>) -> Result<String, tera::Error> {
        let mut ctx = Context::new();
        ctx.insert("page", page);
        ctx.insert("t", &self.catalog.messages(page.language));
        self.tera.render(template, &ctx)
    }

    /// Renders a page. Template failures are logged and answered with a
    /// plain 500.
    pub fn render<T: Serialize>(&self, template: &str, page: &PageView<T>) -> HttpResponse {
        match self.render_to_string(template, page) {
            Ok(rendered) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(rendered),
            Err(err) => {
                let mut message = err.to_string();
                let mut source = err.source();
                while let Some(cause) = source {
                    message.push_str(&format!(": {}", cause));
                    source = cause.source();
                }
                log::error!("Template rendering error in '{}': {}", template, message);
                HttpResponse::InternalServerError()
                    .content_type("text/plain; charset=utf-8")
                    .body("Error rendering page.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    fn renderer() -> Renderer {
        let mut tera = Tera::default();
        tera.add_raw_template("hello.html", "{{ t.greeting }} {{ page.language }} {{ page.data.body | markdown | safe }}")
            .unwrap();
        tera.add_raw_template("broken.html", "{{ page.data.missing.field }}").unwrap();
        let catalog = Catalog::from_sources(vec![
            (Locale::En, "greeting = Hello".to_string()),
            (Locale::Be, "greeting = Вітаем".to_string()),
        ])
        .unwrap();
        Renderer::from_parts(tera, catalog)
    }

    #[derive(Serialize)]
    struct Body {
        body: &'static str,
    }

    #[test]
    fn translations_follow_the_page_locale() {
        let r = renderer();
        let page = PageView::new(Locale::Be, &[Locale::En, Locale::Be], None, Body { body: "*hi*" });
        let html = r.render_to_string("hello.html", &page).unwrap();
        assert_eq!(html, "Вітаем be <p><em>hi</em></p>\n");
        assert!(page.available_languages[1].current);
    }

    #[test]
    fn template_errors_become_plain_500() {
        let page = PageView::new(Locale::En, &[Locale::En], None, Body { body: "" });
        let response = renderer().render("broken.html", &page);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
