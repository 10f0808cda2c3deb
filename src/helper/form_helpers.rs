use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use std::str::FromStr;
use thiserror::Error;
use url::form_urlencoded;

const DATETIME_LOCAL_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

#[derive(Error, Debug, PartialEq)]
pub enum FormError {
    #[error("Invalid UTF-8 in request body.")]
    InvalidUtf8,
    #[error("Field '{0}' is required.")]
    Missing(String),
    #[error("Field '{field}' has an invalid value: '{value}'")]
    Invalid { field: String, value: String },
}

/// URL-encoded form data. Keeps every pair, so repeated fields such as
/// multi-selects survive parsing.
#[derive(Debug, Clone, Default)]
pub struct FormFields {
    pairs: Vec<(String, String)>,
}

impl FormFields {
    /// Parses URL-encoded form data from bytes, handling UTF-8 errors gracefully.
    pub fn parse(form_bytes: &[u8]) -> Result<Self, FormError> {
        let body = std::str::from_utf8(form_bytes).map_err(|_| FormError::InvalidUtf8)?;
        Ok(FormFields {
            pairs: form_urlencoded::parse(body.as_bytes()).into_owned().collect(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed value, empty when the field is absent.
    pub fn text(&self, name: &str) -> String {
        self.get(name).map(|v| v.trim().to_string()).unwrap_or_default()
    }

    pub fn required(&self, name: &str) -> Result<String, FormError> {
        let value = self.text(name);
        if value.is_empty() {
            return Err(FormError::Missing(name.to_string()));
        }
        Ok(value)
    }

    /// Every non-empty value submitted under `name`, in form order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, v)| k == name && !v.trim().is_empty())
            .map(|(_, v)| v.trim())
            .collect()
    }

    /// Every value under `name`, blanks included, so parallel fields stay aligned.
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.trim())
            .collect()
    }

    /// HTML checkboxes are only submitted when ticked.
    pub fn checkbox(&self, name: &str) -> bool {
        matches!(self.get(name), Some(v) if !v.is_empty() && v != "false" && v != "off")
    }

    /// Parses a field with `FromStr`. An absent or blank field is `None`.
    pub fn parse_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, FormError> {
        let value = self.text(name);
        if value.is_empty() {
            return Ok(None);
        }
        value.parse::<T>().map(Some).map_err(|_| FormError::Invalid {
            field: name.to_string(),
            value,
        })
    }

    pub fn datetime(&self, name: &str, offset: FixedOffset) -> Result<Option<DateTime<Utc>>, FormError> {
        parse_datetime_local(&self.text(name), offset).map_err(|value| FormError::Invalid {
            field: name.to_string(),
            value,
        })
    }
}

/// The fixed offset admin forms are entered in. Out-of-range hours mean UTC.
pub fn form_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours.saturating_mul(3600)).unwrap_or_else(|| {
        log::warn!("form_utc_offset_hours={} is out of range, using UTC", hours);
        Utc.fix()
    })
}

/// Reads an `<input type="datetime-local">` value given in `offset`. A blank
/// value is "unset"; a malformed one is returned as the error.
pub fn parse_datetime_local(value: &str, offset: FixedOffset) -> Result<Option<DateTime<Utc>>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    for format in DATETIME_LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return match offset.from_local_datetime(&naive).single() {
                Some(local) => Ok(Some(local.with_timezone(&Utc))),
                None => Err(value.to_string()),
            };
        }
    }
    Err(value.to_string())
}

/// The inverse of [`parse_datetime_local`], for pre-filling edit forms.
pub fn format_datetime_local(value: Option<DateTime<Utc>>, offset: FixedOffset) -> String {
    value
        .map(|v| v.with_timezone(&offset).format(DATETIME_LOCAL_FORMATS[0]).to_string())
        .unwrap_or_default()
}
