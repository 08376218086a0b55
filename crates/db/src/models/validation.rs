use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::DbErr;
use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

/// Error shared by the model layer.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),
    #[error("{0} not found")]
    NotFound(&'static str),
}

impl From<FieldErrors> for ModelError {
    fn from(errors: FieldErrors) -> Self {
        ModelError::Validation(errors)
    }
}

impl From<ValidationErrors> for ModelError {
    fn from(errors: ValidationErrors) -> Self {
        ModelError::Validation(errors.into())
    }
}

/// Field name to messages, serialized as `{"field": ["message", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), ModelError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ModelError::Validation(self))
        }
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FieldErrors::new();
        for (field, field_errors) in errors.field_errors() {
            for error in field_errors {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for {field}"));
                out.add(&field, message);
            }
        }
        out
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// `#RRGGBB`.
pub fn validate_hex_color(color: &str) -> Result<(), ValidationError> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("hex_color")
            .with_message("Color must be a hex value like #1a2b3c".into()))
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DD`, which means midnight UTC.
/// A missing or empty value is `None`.
pub fn deserialize_date_or_datetime<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    parse_date_or_datetime(raw)
        .map(Some)
        .ok_or_else(|| D::Error::custom(format!("invalid date or datetime: {raw}")))
}

fn parse_date_or_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Some(datetime.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

/// Empty or whitespace-only strings are stored as null.
pub(crate) fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::*;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, max = 3, message = "Name is too long"))]
        name: String,
        #[validate(custom(function = "validate_hex_color"))]
        color: String,
    }

    #[test]
    fn validator_errors_are_keyed_by_field() {
        let sample = Sample {
            name: "abcd".to_string(),
            color: "red".to_string(),
        };
        let errors: FieldErrors = sample.validate().unwrap_err().into();

        assert!(errors.contains("name"));
        assert!(errors.contains("color"));
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["name"][0], "Name is too long");
    }

    #[test]
    fn hex_color_accepts_only_six_digits() {
        assert!(validate_hex_color("#00ffAA").is_ok());
        assert!(validate_hex_color("#00ff").is_err());
        assert!(validate_hex_color("00ffaa1").is_err());
        assert!(validate_hex_color("#00ffzz").is_err());
    }

    #[derive(Debug, Deserialize)]
    struct Window {
        #[serde(default, deserialize_with = "deserialize_date_or_datetime")]
        from: Option<DateTime<Utc>>,
    }

    #[test]
    fn bare_dates_mean_midnight_utc() {
        let window: Window = serde_json::from_value(serde_json::json!({ "from": "2026-01-10" })).unwrap();
        assert_eq!(
            window.from.unwrap().to_rfc3339(),
            "2026-01-10T00:00:00+00:00"
        );

        let window: Window =
            serde_json::from_value(serde_json::json!({ "from": "2026-01-10T12:30:00+03:00" }))
                .unwrap();
        assert_eq!(
            window.from.unwrap().to_rfc3339(),
            "2026-01-10T09:30:00+00:00"
        );

        let window: Window = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(window.from.is_none());
        let window: Window = serde_json::from_value(serde_json::json!({ "from": null })).unwrap();
        assert!(window.from.is_none());

        assert!(serde_json::from_value::<Window>(serde_json::json!({ "from": "10.01.2026" })).is_err());
    }

    #[test]
    fn blank_strings_become_none() {
        assert_eq!(blank_to_none(Some("  ".to_string())), None);
        assert_eq!(blank_to_none(None), None);
        assert_eq!(blank_to_none(Some("x".to_string())), Some("x".to_string()));
    }

    #[test]
    fn empty_errors_are_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
        assert!(matches!(
            FieldErrors::single("title", "taken").into_result(),
            Err(ModelError::Validation(_))
        ));
    }
}
