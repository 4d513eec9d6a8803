//! Meeting record payloads.
//!
//! Clients send loosely-typed JSON (the frontend posts whatever its form holds), so validation
//! follows the truthiness rules that frontend was written against: a field counts as present when
//! it is not missing, `null`, `false`, `0` or an empty string.

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::errors::{Error, Result};
use crate::vendor::RecordFields;

pub const CONFERENCE_DATE: &str = "conference_date";
pub const CONFERENCE_LOCATION: &str = "conference_location";
pub const CONFERENCE_THEME: &str = "conference_theme";
pub const CONFERENCE_CONTENT: &str = "conference_content";
pub const CONFERENCE_PICTURE: &str = "conference_picture";

/// A validated create/update payload.
#[derive(Debug, Clone, PartialEq)]
pub struct MeetingInput {
    /// Raw date as sent; coerced to a number when building vendor fields
    pub date: Value,
    pub location: Value,
    pub theme: Value,
    pub content: Value,
    pub picture: Option<Value>,
}

impl MeetingInput {
    /// Parse a request body. An empty body, or JSON that is not an object, behaves like `{}`.
    pub fn parse(body: &Bytes) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Self::from_map(Map::new());
        }
        let value: Value = serde_json::from_slice(body).map_err(|e| Error::BadRequest {
            message: format!("Invalid JSON body: {e}"),
        })?;
        match value {
            Value::Object(map) => Self::from_map(map),
            _ => Self::from_map(Map::new()),
        }
    }

    /// Check the four required fields.
    ///
    /// The date is checked before coercion: a literal `0` is rejected as missing, while the
    /// string `"0"` passes and is later coerced to `0`.
    pub fn from_map(mut map: Map<String, Value>) -> Result<Self> {
        let mut take = |key: &str| map.remove(key).filter(is_truthy);

        let date = take(CONFERENCE_DATE);
        let location = take(CONFERENCE_LOCATION);
        let theme = take(CONFERENCE_THEME);
        let content = take(CONFERENCE_CONTENT);
        let picture = map.remove(CONFERENCE_PICTURE);

        match (date, location, theme, content) {
            (Some(date), Some(location), Some(theme), Some(content)) => Ok(Self {
                date,
                location,
                theme,
                content,
                picture,
            }),
            _ => Err(Error::MissingFields),
        }
    }

    fn base_fields(&self) -> RecordFields {
        let mut fields = RecordFields::new();
        fields.insert(CONFERENCE_DATE.to_string(), coerce_number(&self.date));
        fields.insert(CONFERENCE_LOCATION.to_string(), self.location.clone());
        fields.insert(CONFERENCE_THEME.to_string(), self.theme.clone());
        fields.insert(CONFERENCE_CONTENT.to_string(), self.content.clone());
        fields
    }

    /// Fields for a new record. Pictures are only attached when non-empty, so an omitted picture
    /// leaves the vendor default in place.
    pub fn create_fields(&self) -> RecordFields {
        let mut fields = self.base_fields();
        if let Some(picture) = self.picture.as_ref().filter(|p| has_length(p)) {
            fields.insert(CONFERENCE_PICTURE.to_string(), picture.clone());
        }
        fields
    }

    /// Fields for an update. A missing or falsy picture is sent as `null`, clearing the cell.
    pub fn update_fields(&self) -> RecordFields {
        let mut fields = self.base_fields();
        let picture = self.picture.clone().filter(is_truthy).unwrap_or(Value::Null);
        fields.insert(CONFERENCE_PICTURE.to_string(), picture);
        fields
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn has_length(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => false,
    }
}

/// Numeric coercion for the date field, following the browser's `Number(value)`.
///
/// Arrays read as their single element (`[]` is `0`, `["7"]` is `7`), strings accept `0x`, `0o`
/// and `0b` prefixes, and blank strings are `0`. Results that are NaN or infinite become `null`,
/// as JSON has no encoding for them.
pub fn coerce_number(value: &Value) -> Value {
    if let Value::Number(_) = value {
        return value.clone();
    }

    match numeric_reading(value).filter(|f| f.is_finite()) {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::Number(Number::from(f as i64)),
        Some(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        None => Value::Null,
    }
}

fn numeric_reading(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => string_to_number(s),
        Value::Array(items) => match items.as_slice() {
            [] => Some(0.0),
            // A one-element array stringifies to its element; null stringifies to ""
            [Value::Bool(_)] | [Value::Object(_)] => None,
            [item] => numeric_reading(item),
            _ => None,
        },
        Value::Object(_) => None,
    }
}

fn string_to_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }

    let radix = match trimmed.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    match radix {
        Some(radix) => {
            let digits = &trimmed[2..];
            if digits.is_empty() {
                return None;
            }
            digits
                .chars()
                .try_fold(0.0_f64, |acc, c| c.to_digit(radix).map(|d| acc * f64::from(radix) + f64::from(d)))
        }
        None => trimmed.parse::<f64>().ok(),
    }
}

/// Envelope for meeting record responses.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub code: u16,
    pub success: bool,
    pub message: String,
    pub data: Value,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self {
            code: 200,
            success: true,
            message: message.into(),
            data,
        }
    }
}
