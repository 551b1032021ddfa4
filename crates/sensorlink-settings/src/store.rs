//! Settings store.
//!
//! [`Settings`] owns the settings blob: one fixed little-endian region per
//! field of [`SETTINGS`], plus a parallel array of apply-pending flags. The
//! blob is loaded from and saved to an optional [`Storage`] capability.

use crate::schema::{SettingIndex, SettingType, MAX_FIELD_SIZE, NUMBER_OF_SETTINGS, SETTINGS, SETTINGS_SIZE};
use crate::value::SettingValue;
use tracing::{debug, trace};

/// Byte value of erased persistent storage.
pub const BLANK_BYTE: u8 = 0xFF;

// ============================================================================
// Storage
// ============================================================================

/// Persistent storage for the settings blob.
pub trait Storage {
    /// Fill `destination` with the bytes stored at `address`.
    fn read(&mut self, address: u32, destination: &mut [u8]);

    /// Store `data` at `address`.
    fn write(&mut self, address: u32, data: &[u8]);
}

/// In-memory storage. Starts blank.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    bytes: Vec<u8>,
}

impl MemoryStorage {
    /// Create a blank storage area of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![BLANK_BYTE; size],
        }
    }

    /// Create a storage area holding `bytes`.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Storage for MemoryStorage {
    fn read(&mut self, address: u32, destination: &mut [u8]) {
        let start = address as usize;
        for (offset, byte) in destination.iter_mut().enumerate() {
            *byte = self.bytes.get(start + offset).copied().unwrap_or(BLANK_BYTE);
        }
    }

    fn write(&mut self, address: u32, data: &[u8]) {
        let start = address as usize;
        let end = start + data.len();
        if self.bytes.len() < end {
            self.bytes.resize(end, BLANK_BYTE);
        }
        self.bytes[start..end].copy_from_slice(data);
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Callback invoked with the store after `initialise` or `defaults`.
pub type SettingsHook = Box<dyn FnMut(&mut Settings)>;

/// Result of [`Settings::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// The value changed and the field is now apply-pending.
    Updated,
    /// The encoded value is identical to the stored one.
    Unchanged,
    /// The field is read-only and the write was not overridden.
    ReadOnly,
    /// The value does not match the field's declared type.
    TypeMismatch,
}

/// The settings store.
pub struct Settings {
    start_address: u32,
    storage: Option<Box<dyn Storage>>,
    initialise_epilogue: Option<SettingsHook>,
    defaults_epilogue: Option<SettingsHook>,
    blob: [u8; SETTINGS_SIZE],
    apply_pending: [bool; NUMBER_OF_SETTINGS],
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("start_address", &self.start_address)
            .field("has_storage", &self.storage.is_some())
            .field("values", &self.get())
            .field("apply_pending", &self.apply_pending)
            .finish()
    }
}

impl Settings {
    /// Create a store with a blank blob and no storage.
    pub fn new() -> Self {
        Self {
            start_address: 0,
            storage: None,
            initialise_epilogue: None,
            defaults_epilogue: None,
            blob: [BLANK_BYTE; SETTINGS_SIZE],
            apply_pending: [false; NUMBER_OF_SETTINGS],
        }
    }

    /// Persist the blob to `storage`.
    pub fn with_storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    /// Address of the blob within the storage.
    pub fn with_start_address(mut self, address: u32) -> Self {
        self.start_address = address;
        self
    }

    /// Hook invoked at the end of [`Settings::initialise`].
    pub fn with_initialise_epilogue(mut self, hook: impl FnMut(&mut Settings) + 'static) -> Self {
        self.initialise_epilogue = Some(Box::new(hook));
        self
    }

    /// Hook invoked at the end of [`Settings::defaults`].
    pub fn with_defaults_epilogue(mut self, hook: impl FnMut(&mut Settings) + 'static) -> Self {
        self.defaults_epilogue = Some(Box::new(hook));
        self
    }

    /// Load the blob from storage. A blank blob is replaced by the defaults,
    /// calibration fields included.
    pub fn initialise(&mut self) {
        if let Some(storage) = self.storage.as_mut() {
            storage.read(self.start_address, &mut self.blob);
        }

        if self.is_blank() {
            debug!("Settings: storage is blank, loading defaults");
            self.defaults(true);
        }

        self.run_hook(Epilogue::Initialise);
    }

    /// Restore every field to its default. Calibration fields are only
    /// restored if `overwrite_calibration` is set.
    pub fn defaults(&mut self, overwrite_calibration: bool) {
        for index in SettingIndex::ALL {
            let def = index.def();
            if def.calibration && !overwrite_calibration {
                continue;
            }
            self.set(index, def.default_value(), true);
        }

        self.run_hook(Epilogue::Defaults);
    }

    /// Typed view of the current values.
    pub fn get(&self) -> SettingsValues<'_> {
        SettingsValues { blob: &self.blob }
    }

    /// Write a field.
    ///
    /// Read-only fields are only written if `override_read_only` is set. A
    /// value whose encoding matches the stored bytes leaves the field, and its
    /// apply-pending flag, untouched.
    pub fn set(
        &mut self,
        index: SettingIndex,
        value: impl Into<SettingValue>,
        override_read_only: bool,
    ) -> SetOutcome {
        let def = index.def();
        let value = value.into();

        if def.read_only && !override_read_only {
            return SetOutcome::ReadOnly;
        }
        if !value.matches(def.value_type) {
            return SetOutcome::TypeMismatch;
        }

        let mut encoded = [0u8; MAX_FIELD_SIZE];
        let encoded = &mut encoded[..def.size()];
        encode(&value, encoded);

        let region = &mut self.blob[def.range()];
        if region == encoded {
            return SetOutcome::Unchanged;
        }

        region.copy_from_slice(encoded);
        self.apply_pending[index.index()] = true;
        trace!("Settings: {} = {}", index, self.get().value(index));
        SetOutcome::Updated
    }

    /// Write the blob to storage. Does nothing without storage.
    pub fn save(&mut self) {
        if let Some(storage) = self.storage.as_mut() {
            storage.write(self.start_address, &self.blob);
            debug!("Settings: saved {} bytes at {:#x}", SETTINGS_SIZE, self.start_address);
        }
    }

    /// Whether the field changed since this was last called for it.
    pub fn apply_pending(&mut self, index: SettingIndex) -> bool {
        std::mem::take(&mut self.apply_pending[index.index()])
    }

    /// The raw settings blob.
    pub fn as_bytes(&self) -> &[u8; SETTINGS_SIZE] {
        &self.blob
    }

    fn is_blank(&self) -> bool {
        self.blob.iter().all(|&byte| byte == BLANK_BYTE)
    }

    fn epilogue(&mut self, epilogue: Epilogue) -> &mut Option<SettingsHook> {
        match epilogue {
            Epilogue::Initialise => &mut self.initialise_epilogue,
            Epilogue::Defaults => &mut self.defaults_epilogue,
        }
    }

    /// Take the hook out of its slot, call it, then put it back.
    fn run_hook(&mut self, epilogue: Epilogue) {
        if let Some(mut hook) = self.epilogue(epilogue).take() {
            hook(self);
            *self.epilogue(epilogue) = Some(hook);
        }
    }
}

#[derive(Clone, Copy)]
enum Epilogue {
    Initialise,
    Defaults,
}

/// Encode `value` into a field region.
fn encode(value: &SettingValue, region: &mut [u8]) {
    match value {
        SettingValue::Bool(v) => region[0] = u8::from(*v),
        SettingValue::Float(v) => region.copy_from_slice(&v.to_le_bytes()),
        SettingValue::UInt32(v) => region.copy_from_slice(&v.to_le_bytes()),
        SettingValue::CharArray(v) => sanitize(v.as_bytes(), region),
    }
}

/// Copy a string into a fixed-size region. Non-printable bytes become `?`,
/// the copy stops at the first NUL, the remainder is zero-filled and the last
/// byte is always a terminator.
fn sanitize(source: &[u8], region: &mut [u8]) {
    let Some(capacity) = region.len().checked_sub(1) else {
        return;
    };

    let printable = source
        .iter()
        .take_while(|&&byte| byte != 0)
        .take(capacity)
        .map(|&byte| if (0x20..=0x7E).contains(&byte) { byte } else { b'?' });

    region.fill(0);
    for (destination, byte) in region.iter_mut().zip(printable) {
        *destination = byte;
    }
}

// ============================================================================
// Settings Values
// ============================================================================

/// Immutable typed view of the settings blob.
#[derive(Clone, Copy)]
pub struct SettingsValues<'a> {
    blob: &'a [u8; SETTINGS_SIZE],
}

impl std::fmt::Debug for SettingsValues<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for index in SettingIndex::ALL {
            map.entry(&index.def().key, &self.value(index));
        }
        map.finish()
    }
}

impl<'a> SettingsValues<'a> {
    pub fn serial_number(&self) -> &'a str {
        self.string(SettingIndex::SerialNumber)
    }

    pub fn calibration_date(&self) -> &'a str {
        self.string(SettingIndex::CalibrationDate)
    }

    pub fn offset(&self) -> f32 {
        self.float(SettingIndex::Offset)
    }

    pub fn sensitivity(&self) -> f32 {
        self.float(SettingIndex::Sensitivity)
    }

    pub fn firmware_version(&self) -> &'a str {
        self.string(SettingIndex::FirmwareVersion)
    }

    pub fn device_name(&self) -> &'a str {
        self.string(SettingIndex::DeviceName)
    }

    pub fn binary_mode(&self) -> bool {
        self.bool(SettingIndex::BinaryMode)
    }

    pub fn message_rate_divisor(&self) -> u32 {
        self.uint32(SettingIndex::MessageRateDivisor)
    }

    /// The value of any field.
    pub fn value(&self, index: SettingIndex) -> SettingValue {
        match index.def().value_type {
            SettingType::Bool => SettingValue::Bool(self.bool(index)),
            SettingType::Float => SettingValue::Float(self.float(index)),
            SettingType::UInt32 => SettingValue::UInt32(self.uint32(index)),
            SettingType::CharArray(_) => SettingValue::CharArray(self.string(index).to_string()),
        }
    }

    fn region(&self, index: SettingIndex) -> &'a [u8] {
        &self.blob[SETTINGS[index.index()].range()]
    }

    fn word(&self, index: SettingIndex) -> [u8; 4] {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.region(index)[..4]);
        word
    }

    fn bool(&self, index: SettingIndex) -> bool {
        self.region(index)[0] != 0
    }

    fn float(&self, index: SettingIndex) -> f32 {
        f32::from_le_bytes(self.word(index))
    }

    fn uint32(&self, index: SettingIndex) -> u32 {
        u32::from_le_bytes(self.word(index))
    }

    /// The text before the terminator, cut at the first invalid UTF-8 byte.
    fn string(&self, index: SettingIndex) -> &'a str {
        let region = self.region(index);
        let end = region.iter().position(|&byte| byte == 0).unwrap_or(region.len());
        let text = &region[..end];
        match std::str::from_utf8(text) {
            Ok(text) => text,
            Err(error) => std::str::from_utf8(&text[..error.valid_up_to()]).unwrap_or_default(),
        }
    }
}
