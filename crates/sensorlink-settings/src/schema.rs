//! Settings metadata table.
//!
//! This module provides:
//! - [`SettingType`] - The storage type of a field
//! - [`SettingDefault`] - Default values usable in const contexts
//! - [`SettingDef`] - Per-field metadata: key, type, blob region, flags and default
//! - [`SettingIndex`] - Type-safe index of a field in the table
//! - [`SETTINGS`] - The compiled-in table, the single source of truth for the blob layout

use crate::value::SettingValue;
use std::ops::Range;

// ============================================================================
// Setting Type
// ============================================================================

/// The storage type of a settings field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingType {
    /// Boolean, stored as one byte.
    Bool,
    /// 32-bit float, stored little-endian.
    Float,
    /// 32-bit unsigned integer, stored little-endian.
    UInt32,
    /// Fixed-size, zero-terminated printable ASCII string. The size includes
    /// the terminator.
    CharArray(usize),
}

impl SettingType {
    /// Number of bytes this type occupies in the settings blob.
    pub const fn size(&self) -> usize {
        match self {
            SettingType::Bool => 1,
            SettingType::Float => 4,
            SettingType::UInt32 => 4,
            SettingType::CharArray(size) => *size,
        }
    }

    /// Name of the JSON type used to represent this field on the wire.
    pub const fn json_type(&self) -> &'static str {
        match self {
            SettingType::Bool => "boolean",
            SettingType::Float | SettingType::UInt32 => "number",
            SettingType::CharArray(_) => "string",
        }
    }
}

impl std::fmt::Display for SettingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingType::Bool => write!(f, "bool"),
            SettingType::Float => write!(f, "float"),
            SettingType::UInt32 => write!(f, "uint32"),
            SettingType::CharArray(size) => write!(f, "char[{}]", size),
        }
    }
}

// ============================================================================
// Setting Default (const-compatible)
// ============================================================================

/// The default value for a field, usable in const contexts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingDefault {
    /// Boolean value.
    Bool(bool),
    /// Float value.
    Float(f32),
    /// Unsigned integer value.
    UInt32(u32),
    /// String value.
    CharArray(&'static str),
}

impl SettingDefault {
    /// Convert to a SettingValue.
    pub fn to_value(self) -> SettingValue {
        match self {
            SettingDefault::Bool(v) => SettingValue::Bool(v),
            SettingDefault::Float(v) => SettingValue::Float(v),
            SettingDefault::UInt32(v) => SettingValue::UInt32(v),
            SettingDefault::CharArray(v) => SettingValue::CharArray(v.to_string()),
        }
    }
}

impl From<SettingDefault> for SettingValue {
    fn from(d: SettingDefault) -> Self {
        d.to_value()
    }
}

// ============================================================================
// Setting Definition
// ============================================================================

/// Metadata for one settings field.
#[derive(Debug, Clone, Copy)]
pub struct SettingDef {
    /// Canonical key, as written in whole-object dumps.
    pub key: &'static str,
    /// Human-readable description of the field.
    pub description: &'static str,
    /// Storage type.
    pub value_type: SettingType,
    /// Byte offset of the field's region in the settings blob.
    pub offset: usize,
    /// Writes from the command interface are rejected unless overridden.
    pub read_only: bool,
    /// Survives a user-triggered defaults reset.
    pub calibration: bool,
    /// Default value.
    pub default: SettingDefault,
}

impl PartialEq for SettingDef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for SettingDef {}

impl SettingDef {
    /// Create a writable, non-calibration field. The offset is assigned by the
    /// table layout.
    pub const fn new(key: &'static str, value_type: SettingType, default: SettingDefault) -> Self {
        Self {
            key,
            description: "",
            value_type,
            offset: 0,
            read_only: false,
            calibration: false,
            default,
        }
    }

    /// Set the description (const-compatible).
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Mark the field read-only (const-compatible).
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Mark the field as calibration data (const-compatible).
    pub const fn calibration(mut self) -> Self {
        self.calibration = true;
        self
    }

    /// Size of the field's region in bytes.
    pub const fn size(&self) -> usize {
        self.value_type.size()
    }

    /// Byte range of the field's region in the settings blob.
    pub const fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.size()
    }

    /// Get the default value as a SettingValue.
    pub fn default_value(&self) -> SettingValue {
        self.default.to_value()
    }
}

// ============================================================================
// Layout
// ============================================================================

/// Assign consecutive, non-overlapping offsets in table order.
const fn layout<const N: usize>(mut defs: [SettingDef; N]) -> [SettingDef; N] {
    let mut offset = 0;
    let mut index = 0;
    while index < N {
        defs[index].offset = offset;
        offset += defs[index].value_type.size();
        index += 1;
    }
    defs
}

const fn blob_size(defs: &[SettingDef]) -> usize {
    let mut size = 0;
    let mut index = 0;
    while index < defs.len() {
        size += defs[index].value_type.size();
        index += 1;
    }
    size
}

const fn largest_field(defs: &[SettingDef]) -> usize {
    let mut largest = 0;
    let mut index = 0;
    while index < defs.len() {
        if defs[index].value_type.size() > largest {
            largest = defs[index].value_type.size();
        }
        index += 1;
    }
    largest
}

const fn longest_key(defs: &[SettingDef]) -> usize {
    let mut longest = 0;
    let mut index = 0;
    while index < defs.len() {
        if defs[index].key.len() > longest {
            longest = defs[index].key.len();
        }
        index += 1;
    }
    longest
}

/// Size of every string field, including the terminator.
pub const STRING_SIZE: usize = 32;

/// Number of settings fields.
pub const NUMBER_OF_SETTINGS: usize = 8;

const TABLE: [SettingDef; NUMBER_OF_SETTINGS] = layout([
    SettingDef::new("serial_number", SettingType::CharArray(STRING_SIZE), SettingDefault::CharArray(""))
        .with_description("Device serial number")
        .read_only()
        .calibration(),
    SettingDef::new("calibration_date", SettingType::CharArray(STRING_SIZE), SettingDefault::CharArray("Unknown"))
        .with_description("Date of the last factory calibration")
        .read_only()
        .calibration(),
    SettingDef::new("offset", SettingType::Float, SettingDefault::Float(0.0))
        .with_description("Sensor zero offset")
        .read_only()
        .calibration(),
    SettingDef::new("sensitivity", SettingType::Float, SettingDefault::Float(1.0))
        .with_description("Sensor sensitivity")
        .read_only()
        .calibration(),
    SettingDef::new("firmware_version", SettingType::CharArray(STRING_SIZE), SettingDefault::CharArray(""))
        .with_description("Firmware version")
        .read_only(),
    SettingDef::new("device_name", SettingType::CharArray(STRING_SIZE), SettingDefault::CharArray("Sensor"))
        .with_description("User-assigned device name"),
    SettingDef::new("binary_mode", SettingType::Bool, SettingDefault::Bool(false))
        .with_description("Send data messages in binary rather than ASCII"),
    SettingDef::new("message_rate_divisor", SettingType::UInt32, SettingDefault::UInt32(1))
        .with_description("Divides the sensor sample rate to give the message rate"),
]);

/// The settings table. Field order defines both [`SettingIndex`] and the blob layout.
pub static SETTINGS: [SettingDef; NUMBER_OF_SETTINGS] = TABLE;

/// Total size of the settings blob in bytes.
pub const SETTINGS_SIZE: usize = blob_size(&TABLE);

/// Size of the largest field in bytes.
pub const MAX_FIELD_SIZE: usize = largest_field(&TABLE);

/// Length of the longest canonical key.
pub const MAX_KEY_LENGTH: usize = longest_key(&TABLE);

// ============================================================================
// Setting Index
// ============================================================================

/// Index of a field in [`SETTINGS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingIndex {
    SerialNumber,
    CalibrationDate,
    Offset,
    Sensitivity,
    FirmwareVersion,
    DeviceName,
    BinaryMode,
    MessageRateDivisor,
}

impl SettingIndex {
    /// Every index, in table order.
    pub const ALL: [SettingIndex; NUMBER_OF_SETTINGS] = [
        SettingIndex::SerialNumber,
        SettingIndex::CalibrationDate,
        SettingIndex::Offset,
        SettingIndex::Sensitivity,
        SettingIndex::FirmwareVersion,
        SettingIndex::DeviceName,
        SettingIndex::BinaryMode,
        SettingIndex::MessageRateDivisor,
    ];

    /// Convert a raw integer into an index, if it names a field.
    pub fn from_index(index: usize) -> Option<SettingIndex> {
        Self::ALL.get(index).copied()
    }

    /// Position of this field in the table.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Metadata for this field.
    pub fn def(self) -> &'static SettingDef {
        &SETTINGS[self.index()]
    }
}

impl std::fmt::Display for SettingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.def().key)
    }
}

/// Metadata for the field at `index`.
pub fn describe(index: SettingIndex) -> &'static SettingDef {
    index.def()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key;

    #[test]
    fn test_regions_are_contiguous_and_cover_blob() {
        let mut expected_offset = 0;
        for def in &SETTINGS {
            assert_eq!(def.offset, expected_offset, "{} is not contiguous", def.key);
            expected_offset += def.size();
        }
        assert_eq!(expected_offset, SETTINGS_SIZE);
    }

    #[test]
    fn test_keys_unique_under_tolerant_comparison() {
        for (i, a) in SETTINGS.iter().enumerate() {
            for b in SETTINGS.iter().skip(i + 1) {
                assert!(!key::matches(a.key, b.key), "{} collides with {}", a.key, b.key);
            }
        }
    }

    #[test]
    fn test_index_order_matches_table() {
        for (position, index) in SettingIndex::ALL.iter().enumerate() {
            assert_eq!(index.index(), position);
            assert_eq!(SettingIndex::from_index(position), Some(*index));
        }
        assert_eq!(SettingIndex::from_index(NUMBER_OF_SETTINGS), None);
        assert_eq!(SettingIndex::from_index(999), None);
    }

    #[test]
    fn test_defaults_match_declared_types() {
        for def in &SETTINGS {
            let matches = matches!(
                (def.value_type, def.default),
                (SettingType::Bool, SettingDefault::Bool(_))
                    | (SettingType::Float, SettingDefault::Float(_))
                    | (SettingType::UInt32, SettingDefault::UInt32(_))
                    | (SettingType::CharArray(_), SettingDefault::CharArray(_))
            );
            assert!(matches, "default of {} does not match {}", def.key, def.value_type);
        }
    }

    #[test]
    fn test_describe() {
        let def = describe(SettingIndex::DeviceName);
        assert_eq!(def.key, "device_name");
        assert_eq!(def.value_type, SettingType::CharArray(STRING_SIZE));
        assert!(!def.read_only);
        assert!(!def.calibration);

        let def = describe(SettingIndex::SerialNumber);
        assert!(def.read_only);
        assert!(def.calibration);
    }

    #[test]
    fn test_derived_sizes() {
        assert_eq!(MAX_FIELD_SIZE, STRING_SIZE);
        assert_eq!(MAX_KEY_LENGTH, "message_rate_divisor".len());
    }
}
