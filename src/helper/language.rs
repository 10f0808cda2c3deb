//! Locale negotiation for incoming requests.

use crate::models::UnknownVariant;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use unic_langid::LanguageIdentifier;

pub const LANG_COOKIE: &str = "lang";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Be,
    Ru,
}

impl Locale {
    pub fn code(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Be => "be",
            Locale::Ru => "ru",
        }
    }

    /// Self-name, as shown in the language switcher.
    pub fn native_name(&self) -> &'static str {
        match self {
            Locale::En => "English",
            Locale::Be => "Беларуская",
            Locale::Ru => "Русский",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "be" => Ok(Locale::Be),
            "ru" => Ok(Locale::Ru),
            _ => Err(UnknownVariant { kind: "locale", value: s.to_string() }),
        }
    }
}

/// Picks a supported locale for a request. The first supported locale is
/// the fallback, so resolution always succeeds.
#[derive(Debug, Clone)]
pub struct LanguageResolver {
    supported: Vec<Locale>,
}

impl LanguageResolver {
    pub fn new(codes: &[String]) -> Result<Self, UnknownVariant> {
        let mut supported = Vec::new();
        for code in codes {
            let locale = code.parse::<Locale>()?;
            if !supported.contains(&locale) {
                supported.push(locale);
            }
        }
        if supported.is_empty() {
            supported.push(Locale::En);
        }
        Ok(LanguageResolver { supported })
    }

    pub fn supported(&self) -> &[Locale] {
        &self.supported
    }

    pub fn fallback(&self) -> Locale {
        self.supported[0]
    }

    /// Candidate tags in priority order: route hint, cookie, then the first
    /// `Accept-Language` entry group (cut at the first `;`, split on `,`).
    pub fn candidates(route_hint: Option<&str>, cookie: Option<&str>, accept_language: Option<&str>) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        for value in [route_hint, cookie].into_iter().flatten() {
            if !value.trim().is_empty() {
                candidates.push(value.trim().to_string());
            }
        }
        if let Some(header) = accept_language {
            let head = header.split(';').next().unwrap_or("");
            candidates.extend(
                head.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
        candidates
    }

    pub fn resolve(&self, route_hint: Option<&str>, cookie: Option<&str>, accept_language: Option<&str>) -> Locale {
        Self::candidates(route_hint, cookie, accept_language)
            .iter()
            .find_map(|c| self.match_candidate(c))
            .unwrap_or_else(|| self.fallback())
    }

    fn match_candidate(&self, candidate: &str) -> Option<Locale> {
        let lang_id = candidate.parse::<LanguageIdentifier>().ok()?;
        let locale = lang_id.language.as_str().parse::<Locale>().ok()?;
        self.supported.contains(&locale).then_some(locale)
    }
}
