//! Translation catalogs loaded from `locales/{code}.ftl`.

use crate::helper::language::Locale;
use fluent::{bundle::FluentBundle, FluentResource};
use fluent_syntax::ast;
use intl_memoizer::concurrent::IntlLangMemoizer;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;
use unic_langid::LanguageIdentifier;

type Translation = FluentBundle<FluentResource, IntlLangMemoizer>;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid FTL for '{locale}': {message}")]
    Parse { locale: String, message: String },
    #[error("Invalid language identifier: {0}")]
    LanguageId(String),
}

struct LocaleBundle {
    locale: Locale,
    bundle: Translation,
    ids: Vec<String>,
}

pub struct Catalog {
    bundles: Vec<LocaleBundle>,
}

impl Catalog {
    /// Reads one FTL file per locale. A missing file leaves that locale
    /// empty; it then falls back to the first locale's messages.
    pub fn load(dir: &Path, locales: &[Locale]) -> Result<Self, CatalogError> {
        let mut sources = Vec::new();
        for locale in locales {
            let path = dir.join(format!("{}.ftl", locale.code()));
            match fs::read_to_string(&path) {
                Ok(source) => sources.push((*locale, source)),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    log::warn!("No translation file at '{}'", path.display());
                    sources.push((*locale, String::new()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Self::from_sources(sources)
    }

    pub fn from_sources(sources: Vec<(Locale, String)>) -> Result<Self, CatalogError> {
        let mut bundles = Vec::with_capacity(sources.len());
        for (locale, source) in sources {
            let resource = FluentResource::try_new(source).map_err(|(_, errors)| CatalogError::Parse {
                locale: locale.code().to_string(),
                message: format!("{:?}", errors),
            })?;
            let ids = resource
                .entries()
                .filter_map(|entry| match entry {
                    ast::Entry::Message(message) => Some(message.id.name.to_string()),
                    _ => None,
                })
                .collect();

            let lang_id = locale
                .code()
                .parse::<LanguageIdentifier>()
                .map_err(|e| CatalogError::LanguageId(e.to_string()))?;
            let mut bundle = FluentBundle::new_concurrent(vec![lang_id]);
            bundle.set_use_isolating(false);
            bundle.add_resource_overriding(resource);

            bundles.push(LocaleBundle { locale, bundle, ids });
        }
        Ok(Catalog { bundles })
    }

    fn format(bundle: &Translation, id: &str) -> Option<String> {
        let pattern = bundle.get_message(id)?.value()?;
        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, None, &mut errors);
        if !errors.is_empty() {
            log::warn!("Translation '{}' formatted with errors: {:?}", id, errors);
        }
        Some(value.into_owned())
    }

    /// Translates one message id; unknown ids come back unchanged.
    pub fn translate(&self, locale: Locale, id: &str) -> String {
        let own = self.bundles.iter().find(|b| b.locale == locale);
        own.and_then(|b| Self::format(&b.bundle, id))
            .or_else(|| self.bundles.first().and_then(|b| Self::format(&b.bundle, id)))
            .unwrap_or_else(|| id.to_string())
    }

    /// Every known message rendered for one locale, ready for a template context.
    pub fn messages(&self, locale: Locale) -> HashMap<String, String> {
        let mut ids: Vec<&str> = Vec::new();
        for b in self.bundles.iter().filter(|b| b.locale == locale).chain(self.bundles.first()) {
            ids.extend(b.ids.iter().map(String::as_str));
        }
        ids.into_iter()
            .map(|id| (id.to_string(), self.translate(locale, id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::from_sources(vec![
            (Locale::En, "login = Log in\nsearch = Search\n".to_string()),
            (Locale::Be, "login = Увайсці\n".to_string()),
        ])
        .unwrap()
    }

    #[test]
    fn translates_with_fallback_to_first_locale() {
        let c = catalog();
        assert_eq!(c.translate(Locale::Be, "login"), "Увайсці");
        assert_eq!(c.translate(Locale::Be, "search"), "Search");
        assert_eq!(c.translate(Locale::Ru, "login"), "Log in");
        assert_eq!(c.translate(Locale::En, "missing_id"), "missing_id");
    }

    #[test]
    fn message_map_covers_fallback_ids() {
        let messages = catalog().messages(Locale::Be);
        assert_eq!(messages.get("login").map(String::as_str), Some("Увайсці"));
        assert_eq!(messages.get("search").map(String::as_str), Some("Search"));
    }
}
