//! Typed settings values.

use crate::schema::SettingType;
use serde::Serialize;

/// A value read from, or written to, a settings field.
///
/// Serializes as the bare JSON literal of the value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    /// Boolean value.
    Bool(bool),
    /// Float value.
    Float(f32),
    /// Unsigned integer value.
    UInt32(u32),
    /// String value.
    CharArray(String),
}

impl SettingValue {
    /// Check if this value can be stored in a field of the given type.
    pub fn matches(&self, value_type: SettingType) -> bool {
        matches!(
            (self, value_type),
            (SettingValue::Bool(_), SettingType::Bool)
                | (SettingValue::Float(_), SettingType::Float)
                | (SettingValue::UInt32(_), SettingType::UInt32)
                | (SettingValue::CharArray(_), SettingType::CharArray(_))
        )
    }

    /// Convert to bool if possible.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert to f32 if possible.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            SettingValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert to u32 if possible.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            SettingValue::UInt32(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert to string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::CharArray(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for SettingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingValue::Bool(v) => write!(f, "{}", v),
            SettingValue::Float(v) => write!(f, "{}", v),
            SettingValue::UInt32(v) => write!(f, "{}", v),
            SettingValue::CharArray(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        SettingValue::Bool(v)
    }
}

impl From<f32> for SettingValue {
    fn from(v: f32) -> Self {
        SettingValue::Float(v)
    }
}

impl From<u32> for SettingValue {
    fn from(v: u32) -> Self {
        SettingValue::UInt32(v)
    }
}

impl From<String> for SettingValue {
    fn from(v: String) -> Self {
        SettingValue::CharArray(v)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        SettingValue::CharArray(v.to_string())
    }
}
