//! Error types for settings JSON access.

use thiserror::Error;

/// Errors that can occur when applying JSON to the settings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsJsonError {
    /// The text is not a well-formed JSON object.
    #[error("Invalid JSON object. {0}")]
    InvalidObject(String),

    /// The value literal does not match the field's declared type.
    #[error("Expected {expected}")]
    TypeMismatch {
        /// Human-readable name of the expected JSON type.
        expected: &'static str,
    },
}

/// Result type alias for settings JSON operations.
pub type SettingsJsonResult<T> = Result<T, SettingsJsonError>;
