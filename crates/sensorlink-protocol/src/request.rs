//! Request line parsing.

use crate::error::RequestError;
use sensorlink_settings::json::parse_entries;
use serde_json::value::RawValue;

/// A parsed request: one key and its still-unparsed value.
#[derive(Debug)]
pub struct ParsedLine<'a> {
    key: String,
    value: &'a RawValue,
}

impl<'a> ParsedLine<'a> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &'a RawValue {
        self.value
    }
}

/// Parse a received line, without its terminator, as a single-pair JSON
/// object.
pub fn parse_line(line: &[u8]) -> Result<ParsedLine<'_>, RequestError> {
    let text = std::str::from_utf8(line).map_err(|_| RequestError::InvalidUtf8)?;
    if !text.trim_start().starts_with('{') {
        return Err(RequestError::NotAnObject);
    }

    let mut entries = parse_entries(text).map_err(|error| RequestError::Malformed(error.to_string()))?;
    if entries.len() != 1 {
        return Err(RequestError::NotSinglePair);
    }
    let (key, value) = entries.remove(0);
    Ok(ParsedLine { key, value })
}

/// Whether a value literal is `null`.
pub fn is_null(value: &RawValue) -> bool {
    value.get().trim() == "null"
}
