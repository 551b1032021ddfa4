//! Translation between the settings store and wire JSON.
//!
//! Values are rendered with `serde_json`, so strings are escaped and floats use
//! the shortest representation that reads back to the same `f32`. Incoming
//! values are borrowed as [`RawValue`] and only parsed once the target field,
//! and so the expected type, is known.

use crate::error::{SettingsJsonError, SettingsJsonResult};
use crate::key;
use crate::schema::{SettingIndex, SettingType, MAX_KEY_LENGTH};
use crate::store::{SetOutcome, Settings};
use crate::value::SettingValue;
use serde::de::{DeserializeOwned, Error as _, MapAccess, Visitor};
use serde::{Deserializer, Serialize};
use serde_json::value::RawValue;
use std::fmt::Write;
use tracing::debug;

/// Find the field whose key tolerantly matches `key`.
pub fn find_index_by_key(key: &str) -> Option<SettingIndex> {
    SettingIndex::ALL
        .into_iter()
        .find(|index| key::matches(key, index.def().key))
}

/// The canonical key of a field.
pub fn get_key(index: SettingIndex) -> &'static str {
    index.def().key
}

/// The current value of a field as a JSON literal.
pub fn get_value_json(settings: &Settings, index: SettingIndex) -> String {
    to_json(&settings.get().value(index))
}

/// A field as a single-pair JSON object, e.g. `{"device_name":"Sensor"}`.
pub fn get_object_json(settings: &Settings, index: SettingIndex) -> String {
    format!("{{{}:{}}}", to_json(get_key(index)), get_value_json(settings, index))
}

/// Every field as a multi-line JSON object with aligned values.
pub fn get_all_object_json(settings: &Settings) -> String {
    let width = MAX_KEY_LENGTH + 2;
    let mut json = String::from("{\n");
    for (position, index) in SettingIndex::ALL.into_iter().enumerate() {
        let key = to_json(get_key(index));
        let value = get_value_json(settings, index);
        let _ = write!(json, "    {key:<width$} : {value}");
        if position + 1 < SettingIndex::ALL.len() {
            json.push(',');
        }
        json.push('\n');
    }
    json.push_str("}\n");
    json
}

/// Parse `value` as `T`, reporting `expected` on failure.
pub fn parse_value<T: DeserializeOwned>(value: &RawValue, expected: &'static str) -> SettingsJsonResult<T> {
    serde_json::from_str(value.get()).map_err(|_| SettingsJsonError::TypeMismatch { expected })
}

/// Parse `value` according to the declared type of `index` and write it.
///
/// Unsigned integers are parsed as a number and truncated toward zero;
/// out-of-range values saturate. A float that does not fit in an `f32` is a
/// type mismatch.
pub fn set_value_json(
    settings: &mut Settings,
    index: SettingIndex,
    value: &RawValue,
    override_read_only: bool,
) -> SettingsJsonResult<SetOutcome> {
    let value_type = index.def().value_type;
    let expected = value_type.json_type();
    let value = match value_type {
        SettingType::Bool => SettingValue::Bool(parse_value(value, expected)?),
        SettingType::Float => {
            let number = parse_value::<f64>(value, expected)? as f32;
            if !number.is_finite() {
                return Err(SettingsJsonError::TypeMismatch { expected });
            }
            SettingValue::Float(number)
        }
        SettingType::UInt32 => SettingValue::UInt32(parse_value::<f64>(value, expected)? as u32),
        SettingType::CharArray(_) => SettingValue::CharArray(parse_value(value, expected)?),
    };
    Ok(settings.set(index, value, override_read_only))
}

/// Write the field named by `key`. An unknown key is ignored.
pub fn set_from_key_value(
    settings: &mut Settings,
    key: &str,
    value: &RawValue,
    override_read_only: bool,
) -> SettingsJsonResult<()> {
    let Some(index) = find_index_by_key(key) else {
        debug!("Settings: ignoring unknown key {:?}", key);
        return Ok(());
    };
    set_value_json(settings, index, value, override_read_only)?;
    Ok(())
}

/// Apply every pair of a JSON object, one at a time in document order.
///
/// Stops at the first pair that is malformed or rejected. Pairs before it
/// stay applied.
pub fn set_from_object(settings: &mut Settings, json: &str, override_read_only: bool) -> SettingsJsonResult<()> {
    let mut rejected = None;
    let mut deserializer = serde_json::Deserializer::from_str(json);
    let applier = ObjectApplier {
        settings,
        override_read_only,
        rejected: &mut rejected,
    };
    let mut parsed = (&mut deserializer).deserialize_map(applier);
    if parsed.is_ok() {
        parsed = deserializer.end();
    }
    if let Some(error) = rejected {
        return Err(error);
    }
    parsed.map_err(|error| SettingsJsonError::InvalidObject(error.to_string()))
}

struct ObjectApplier<'a> {
    settings: &'a mut Settings,
    override_read_only: bool,
    rejected: &'a mut Option<SettingsJsonError>,
}

impl<'de> Visitor<'de> for ObjectApplier<'_> {
    type Value = ();

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while let Some((key, value)) = map.next_entry::<String, &'de RawValue>()? {
            if let Err(error) = set_from_key_value(self.settings, &key, value, self.override_read_only) {
                let message = error.to_string();
                *self.rejected = Some(error);
                return Err(A::Error::custom(message));
            }
        }
        Ok(())
    }
}

/// Split a JSON object into its pairs, in document order, with each value
/// left unparsed. Trailing characters other than whitespace are an error.
pub fn parse_entries(json: &str) -> Result<Vec<(String, &RawValue)>, serde_json::Error> {
    let mut deserializer = serde_json::Deserializer::from_str(json);
    let entries = (&mut deserializer).deserialize_map(EntriesVisitor)?;
    deserializer.end()?;
    Ok(entries)
}

struct EntriesVisitor;

impl<'de> Visitor<'de> for EntriesVisitor {
    type Value = Vec<(String, &'de RawValue)>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(entry) = map.next_entry::<String, &'de RawValue>()? {
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Render a value as JSON.
pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}
