//! # sensorlink-settings
//!
//! Device settings for sensorlink firmware.
//!
//! The settings are a fixed, compiled-in set of typed fields stored in a single
//! byte blob with a stable little-endian layout. The blob is what gets written
//! to non-volatile memory, so an erased (all `0xFF`) region is recognised as
//! "never initialised" and replaced with defaults.
//!
//! This crate provides:
//! - [`key`] - Case- and punctuation-insensitive key comparison
//! - [`schema`] - The settings metadata table ([`SettingDef`], [`SettingIndex`])
//! - [`SettingValue`] - A typed value read from or written to a field
//! - [`Settings`] - The store: defaults, change detection, apply-pending flags and persistence
//! - [`json`] - Translation between the store and wire JSON
//!
//! # Example
//!
//! ```rust
//! use sensorlink_settings::{json, MemoryStorage, SettingIndex, Settings, SETTINGS_SIZE};
//!
//! let mut settings = Settings::new().with_storage(MemoryStorage::new(SETTINGS_SIZE));
//! settings.initialise();
//!
//! let index = json::find_index_by_key("Device Name").unwrap();
//! assert_eq!(index, SettingIndex::DeviceName);
//! assert_eq!(json::get_value_json(&settings, index), "\"Sensor\"");
//! ```

pub mod json;
pub mod key;
pub mod schema;

mod error;
mod store;
mod value;

pub use error::*;
pub use schema::{
    describe, SettingDef, SettingDefault, SettingIndex, SettingType, MAX_KEY_LENGTH, NUMBER_OF_SETTINGS, SETTINGS,
    SETTINGS_SIZE, STRING_SIZE,
};
pub use store::*;
pub use value::*;
