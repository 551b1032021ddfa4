//! The device's commands and settings hooks.

use sensorlink_protocol::{BridgeError, CommandBridge, Interface, Request, UNKNOWN_COMMAND_ERROR};
use sensorlink_settings::{json, key, SettingIndex, Settings};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Error response for `enumerate_<N>` with no field `N`.
pub const INVALID_INDEX_ERROR: &str = "Invalid setting index";

const ENUMERATE_PREFIX: &str = "enumerate";

/// Flags the commands share with the main loop.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    factory: Rc<Cell<bool>>,
    shutdown: Arc<AtomicBool>,
    receive_errors: Rc<Cell<u64>>,
}

impl DeviceState {
    pub fn new(shutdown: Arc<AtomicBool>) -> Self {
        DeviceState {
            factory: Rc::new(Cell::new(false)),
            shutdown,
            receive_errors: Rc::new(Cell::new(0)),
        }
    }

    /// True once `factory` has been received. Read-only fields are then
    /// writable from every interface.
    pub fn factory_mode(&self) -> bool {
        self.factory.get()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Received lines dropped without a response, on every interface.
    pub fn receive_errors(&self) -> u64 {
        self.receive_errors.get()
    }
}

/// Install the device's settings hooks.
///
/// Restoring defaults stamps `serial_number` and `firmware_version`. If the
/// stored firmware version is unreadable after loading, everything is
/// restored to defaults, calibration included.
pub fn with_device_hooks(settings: Settings, serial_number: String, firmware_version: String) -> Settings {
    settings
        .with_defaults_epilogue(move |settings| {
            settings.set(SettingIndex::SerialNumber, serial_number.as_str(), true);
            settings.set(SettingIndex::FirmwareVersion, firmware_version.as_str(), true);
        })
        .with_initialise_epilogue(|settings| {
            if is_unreadable(settings.get().firmware_version()) {
                info!("Settings: firmware version unreadable, restoring defaults");
                settings.defaults(true);
                settings.save();
            }
        })
}

/// Blank or corrupt stored text reads back as `?` characters.
fn is_unreadable(text: &str) -> bool {
    text.chars().all(|c| c == '?')
}

/// Build the bridge serving `settings` on `interfaces`.
pub fn build_bridge(settings: Settings, interfaces: Vec<Interface>, state: &DeviceState) -> CommandBridge {
    let mut bridge = CommandBridge::new();
    for interface in interfaces {
        bridge = bridge.with_interface(interface);
    }

    let factory = state.factory.clone();
    let override_flag = state.factory.clone();
    let shutdown = state.shutdown.clone();
    let receive_errors = state.receive_errors.clone();

    bridge
        .with_settings(settings)
        .with_command("ping", ping)
        .with_command("factory", move |request| {
            if request.response.parse_null(request.value).is_none() {
                return;
            }
            info!("Factory mode enabled on {}", request.response.interface());
            factory.set(true);
            request.response.respond();
        })
        .with_command("default", |request| {
            if request.response.parse_null(request.value).is_none() {
                return;
            }
            if let Some(settings) = request.settings.as_mut() {
                settings.defaults(false);
                settings.save();
            }
            request.response.respond();
        })
        .with_command("save", |request| {
            if request.response.parse_null(request.value).is_none() {
                return;
            }
            if let Some(settings) = request.settings.as_mut() {
                settings.save();
            }
            request.response.respond();
        })
        .with_command("shutdown", move |request| {
            if request.response.parse_null(request.value).is_none() {
                return;
            }
            info!("Shutdown requested on {}", request.response.interface());
            shutdown.store(true, Ordering::SeqCst);
            request.response.respond();
        })
        .with_override_read_only(move || override_flag.get())
        .with_write_epilogue(|_, settings| settings.save())
        .with_unknown_handler(enumerate)
        .with_error_reporter(move |error| {
            receive_errors.set(receive_errors.get() + 1);
            report_error(error);
        })
}

fn report_error(error: &BridgeError) {
    warn!(interface = error.interface(), "{}", error);
}

fn ping(request: &mut Request<'_>) {
    if request.response.parse_null(request.value).is_none() {
        return;
    }
    let (name, serial_number) = match request.settings.as_ref() {
        Some(settings) => {
            let values = settings.get();
            (values.device_name().to_string(), values.serial_number().to_string())
        }
        None => (String::new(), String::new()),
    };
    request.response.respond_ping(&name, &serial_number);
}

/// `enumerate_<N>` answers with field `N` as a `{"<key>":<value>}` object.
fn enumerate(request: &mut Request<'_>) {
    let mut rest = request.key;
    if !key::starts_with(&mut rest, ENUMERATE_PREFIX) {
        request.response.respond_error(UNKNOWN_COMMAND_ERROR);
        return;
    }
    if request.response.parse_null(request.value).is_none() {
        return;
    }

    let index = rest.parse::<usize>().ok().and_then(SettingIndex::from_index);
    match (index, request.settings.as_ref()) {
        (Some(index), Some(settings)) => request.response.respond_value(json::get_object_json(settings, index)),
        _ => request.response.respond_error(INVALID_INDEX_ERROR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorlink_protocol::{loopback, LoopbackHandle};
    use sensorlink_settings::MemoryStorage;

    fn device() -> (CommandBridge, LoopbackHandle, DeviceState) {
        let mut settings = with_device_hooks(
            Settings::new().with_storage(MemoryStorage::new(1024)),
            "01234567".to_string(),
            "v1.0.0".to_string(),
        );
        settings.initialise();

        let (transport, host) = loopback();
        let state = DeviceState::new(Arc::new(AtomicBool::new(false)));
        let bridge = build_bridge(settings, vec![Interface::new("USB", transport)], &state);
        (bridge, host, state)
    }

    fn exchange(bridge: &mut CommandBridge, host: &LoopbackHandle, line: &str) -> Vec<String> {
        host.send_line(line);
        bridge.tasks();
        host.take_lines()
    }

    #[test]
    fn test_defaults_are_stamped() {
        let (bridge, _host, _state) = device();
        let values = bridge.settings().unwrap().get();
        assert_eq!(values.serial_number(), "01234567");
        assert_eq!(values.firmware_version(), "v1.0.0");
    }

    #[test]
    fn test_ping() {
        let (mut bridge, host, _state) = device();
        assert_eq!(
            exchange(&mut bridge, &host, r#"{"ping":null}"#),
            [r#"{"ping":{"interface":"USB","name":"Sensor","sn":"01234567"}}"#]
        );
        assert_eq!(
            exchange(&mut bridge, &host, r#"{"ping":1}"#),
            [r#"{"ping":{"error":"Expected null"}}"#]
        );
    }

    #[test]
    fn test_factory_enables_read_only_writes() {
        let (mut bridge, host, state) = device();
        assert_eq!(
            exchange(&mut bridge, &host, r#"{"serial_number":"X"}"#),
            [r#"{"serial_number":{"error":"Unable to write read-only setting"}}"#]
        );
        assert_eq!(exchange(&mut bridge, &host, r#"{"factory":null}"#), [r#"{"factory":null}"#]);
        assert!(state.factory_mode());
        assert_eq!(
            exchange(&mut bridge, &host, r#"{"serial_number":"X"}"#),
            [r#"{"serial_number":"X"}"#]
        );
    }

    #[test]
    fn test_shutdown_sets_flag() {
        let (mut bridge, host, state) = device();
        assert!(!state.shutdown_requested());
        assert_eq!(exchange(&mut bridge, &host, r#"{"shutdown":null}"#), [r#"{"shutdown":null}"#]);
        assert!(state.shutdown_requested());
    }

    #[test]
    fn test_enumerate() {
        let (mut bridge, host, _state) = device();
        assert_eq!(
            exchange(&mut bridge, &host, r#"{"enumerate_0":null}"#),
            [r#"{"enumerate_0":{"serial_number":"01234567"}}"#]
        );
        assert_eq!(
            exchange(&mut bridge, &host, r#"{"Enumerate 6":null}"#),
            [r#"{"Enumerate 6":{"binary_mode":false}}"#]
        );
        assert_eq!(
            exchange(&mut bridge, &host, r#"{"enumerate_999":null}"#),
            [r#"{"enumerate_999":{"error":"Invalid setting index"}}"#]
        );
        assert_eq!(
            exchange(&mut bridge, &host, r#"{"enumerate":null}"#),
            [r#"{"enumerate":{"error":"Invalid setting index"}}"#]
        );
    }

    #[test]
    fn test_receive_errors_are_counted() {
        let (mut bridge, host, state) = device();
        assert!(exchange(&mut bridge, &host, "ping").is_empty());
        assert!(exchange(&mut bridge, &host, r#"{"ping":null,"save":null}"#).is_empty());
        host.send(&[b'x'; 2048]);
        bridge.tasks();
        assert_eq!(state.receive_errors(), 3);

        assert_eq!(
            exchange(&mut bridge, &host, r#"{"ping":null}"#),
            [r#"{"ping":{"interface":"USB","name":"Sensor","sn":"01234567"}}"#]
        );
        assert_eq!(state.receive_errors(), 3);
    }

    #[test]
    fn test_unknown_key() {
        let (mut bridge, host, _state) = device();
        assert_eq!(
            exchange(&mut bridge, &host, r#"{"reboot":null}"#),
            [r#"{"reboot":{"error":"Unknown command"}}"#]
        );
    }

    #[test]
    fn test_default_keeps_calibration() {
        let (mut bridge, host, _state) = device();
        exchange(&mut bridge, &host, r#"{"factory":null}"#);
        exchange(&mut bridge, &host, r#"{"offset":1.5}"#);
        exchange(&mut bridge, &host, r#"{"device_name":"Bob"}"#);

        assert_eq!(exchange(&mut bridge, &host, r#"{"default":null}"#), [r#"{"default":null}"#]);
        let values = bridge.settings().unwrap().get();
        assert_eq!(values.offset(), 1.5);
        assert_eq!(values.device_name(), "Sensor");
        assert_eq!(values.serial_number(), "01234567");
    }

    #[test]
    fn test_unreadable_firmware_version_restores_defaults() {
        let mut image = vec![0xFFu8; 1024];
        image[..4].copy_from_slice(b"SN-1");
        image[4] = 0;

        let mut settings = with_device_hooks(
            Settings::new().with_storage(MemoryStorage::from_bytes(image)),
            "01234567".to_string(),
            "v1.0.0".to_string(),
        );
        settings.initialise();
        assert_eq!(settings.get().firmware_version(), "v1.0.0");
        assert_eq!(settings.get().serial_number(), "01234567");
    }

    #[test]
    fn test_is_unreadable() {
        assert!(is_unreadable(""));
        assert!(is_unreadable("????"));
        assert!(!is_unreadable("v?"));
    }
}
