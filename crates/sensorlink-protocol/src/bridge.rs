//! The command bridge.
//!
//! [`CommandBridge::tasks`] polls every interface in the order they were
//! added, drains the bytes each one has available and dispatches every
//! complete line. A line's key resolves, first match wins, to:
//!
//! 1. a registered command, whose handler owns the response;
//! 2. a settings field, read when the value is `null` and written otherwise;
//! 3. the unknown-key handler, or an `Unknown command` error response.

use crate::error::BridgeError;
use crate::interface::Interface;
use crate::line::LineEvent;
use crate::request::{is_null, parse_line};
use crate::response::Response;
use sensorlink_metrics::metric_defs;
use sensorlink_settings::{json, key, SettingIndex, Settings};
use serde_json::value::RawValue;
use tracing::{debug, trace};

/// Bytes requested from a transport per read.
pub const READ_CHUNK_SIZE: usize = 256;

/// Error response for a write to a read-only field.
pub const READ_ONLY_ERROR: &str = "Unable to write read-only setting";

/// Error response for a key nothing handles.
pub const UNKNOWN_COMMAND_ERROR: &str = "Unknown command";

/// Everything a command handler gets to work with.
pub struct Request<'a> {
    /// The key as received.
    pub key: &'a str,
    /// The value, not yet parsed.
    pub value: &'a RawValue,
    /// Response to the interface the request arrived on.
    pub response: Response<'a>,
    /// The bridge's settings, if it has any.
    pub settings: Option<&'a mut Settings>,
}

/// Handles a command, or a key nothing else handled.
pub type CommandHandler = Box<dyn FnMut(&mut Request<'_>)>;

/// Decides whether writes from the command interface may change read-only
/// fields.
pub type OverrideReadOnly = Box<dyn FnMut() -> bool>;

/// Invoked after a settings field is written from the command interface.
pub type WriteEpilogue = Box<dyn FnMut(SettingIndex, &mut Settings)>;

/// Receives errors that do not produce a response.
pub type ErrorReporter = Box<dyn FnMut(&BridgeError)>;

struct Command {
    key: String,
    handler: CommandHandler,
}

/// Receives requests on a set of interfaces and answers them.
#[derive(Default)]
pub struct CommandBridge {
    interfaces: Vec<Interface>,
    commands: Vec<Command>,
    settings: Option<Settings>,
    override_read_only: Option<OverrideReadOnly>,
    write_epilogue: Option<WriteEpilogue>,
    unknown: Option<CommandHandler>,
    error_reporter: Option<ErrorReporter>,
}

impl std::fmt::Debug for CommandBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBridge")
            .field("interfaces", &self.interfaces)
            .field("commands", &self.commands.iter().map(|c| c.key.as_str()).collect::<Vec<_>>())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl CommandBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interface. Interfaces are polled in the order they are added.
    pub fn with_interface(mut self, interface: Interface) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Register a command. Commands are matched in registration order and
    /// take precedence over settings keys.
    pub fn with_command(mut self, key: impl Into<String>, handler: impl FnMut(&mut Request<'_>) + 'static) -> Self {
        self.commands.push(Command {
            key: key.into(),
            handler: Box::new(handler),
        });
        self
    }

    /// Serve reads and writes of `settings`.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_override_read_only(mut self, predicate: impl FnMut() -> bool + 'static) -> Self {
        self.override_read_only = Some(Box::new(predicate));
        self
    }

    pub fn with_write_epilogue(mut self, epilogue: impl FnMut(SettingIndex, &mut Settings) + 'static) -> Self {
        self.write_epilogue = Some(Box::new(epilogue));
        self
    }

    /// Handle keys that match neither a command nor a settings field.
    pub fn with_unknown_handler(mut self, handler: impl FnMut(&mut Request<'_>) + 'static) -> Self {
        self.unknown = Some(Box::new(handler));
        self
    }

    pub fn with_error_reporter(mut self, reporter: impl FnMut(&BridgeError) + 'static) -> Self {
        self.error_reporter = Some(Box::new(reporter));
        self
    }

    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    pub fn settings_mut(&mut self) -> Option<&mut Settings> {
        self.settings.as_mut()
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// Process everything received so far. Call repeatedly from the main loop.
    pub fn tasks(&mut self) {
        for position in 0..self.interfaces.len() {
            self.receive(position);
        }
    }

    fn receive(&mut self, position: usize) {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let count = self.interfaces[position].transport.read(&mut chunk).min(chunk.len());
            if count == 0 {
                break;
            }
            trace!("{}: read {} bytes", self.interfaces[position].name, count);

            for &byte in &chunk[..count] {
                match self.interfaces[position].line.push(byte) {
                    None => {}
                    Some(LineEvent::Line(line)) => self.dispatch(position, &line),
                    Some(LineEvent::Overrun) => {
                        let interface = &self.interfaces[position];
                        metrics::counter!(metric_defs::BRIDGE_OVERRUNS.name, &interface.labels).increment(1);
                        let error = BridgeError::BufferOverrun {
                            interface: interface.name.clone(),
                        };
                        report(&mut self.error_reporter, error);
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, position: usize, line: &[u8]) {
        let CommandBridge {
            interfaces,
            commands,
            settings,
            override_read_only,
            write_epilogue,
            unknown,
            error_reporter,
        } = self;
        let interface = &mut interfaces[position];

        let parsed = match parse_line(line) {
            Ok(parsed) => parsed,
            Err(source) => {
                metrics::counter!(metric_defs::BRIDGE_ERRORS.name, &interface.labels).increment(1);
                let error = BridgeError::Request {
                    interface: interface.name.clone(),
                    source,
                };
                report(error_reporter, error);
                return;
            }
        };
        metrics::counter!(metric_defs::BRIDGE_LINES.name, &interface.labels).increment(1);

        let key = parsed.key();
        let value = parsed.value();
        debug!("{}: <- {{{:?}:{}}}", interface.name, key, value.get());

        let mut response = Response::new(&interface.name, &interface.labels, interface.transport.as_mut(), key);

        // Commands
        if let Some(command) = commands.iter_mut().find(|command| key::matches(key, &command.key)) {
            let mut request = Request {
                key,
                value,
                response,
                settings: settings.as_mut(),
            };
            (command.handler)(&mut request);
            return;
        }

        // Settings
        if let Some(settings) = settings.as_mut() {
            if let Some(index) = json::find_index_by_key(key) {
                if is_null(value) {
                    response.respond_value(json::get_value_json(settings, index));
                    return;
                }

                let override_read_only = override_read_only.as_mut().is_some_and(|predicate| predicate());
                if index.def().read_only && !override_read_only {
                    response.respond_error(READ_ONLY_ERROR);
                    return;
                }
                if let Err(error) = json::set_value_json(settings, index, value, override_read_only) {
                    response.respond_error(&error.to_string());
                    return;
                }
                if let Some(epilogue) = write_epilogue.as_mut() {
                    epilogue(index, settings);
                }
                response.respond_value(json::get_value_json(settings, index));
                return;
            }
        }

        // Unknown
        if let Some(handler) = unknown.as_mut() {
            let mut request = Request {
                key,
                value,
                response,
                settings: settings.as_mut(),
            };
            handler(&mut request);
            return;
        }
        response.respond_error(UNKNOWN_COMMAND_ERROR);
    }
}

fn report(reporter: &mut Option<ErrorReporter>, error: BridgeError) {
    debug!("{}", error);
    if let Some(reporter) = reporter.as_mut() {
        reporter(&error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestError;
    use crate::interface::{loopback, LoopbackHandle};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn bridge_with_settings() -> (CommandBridge, LoopbackHandle) {
        let (transport, host) = loopback();
        let mut settings = Settings::new();
        settings.initialise();
        let bridge = CommandBridge::new()
            .with_interface(Interface::new("USB", transport))
            .with_settings(settings);
        (bridge, host)
    }

    fn exchange(bridge: &mut CommandBridge, host: &LoopbackHandle, line: &str) -> Vec<String> {
        host.send_line(line);
        bridge.tasks();
        host.take_lines()
    }

    #[test]
    fn test_command_takes_precedence_over_settings() {
        let (bridge, host) = bridge_with_settings();
        let mut bridge = bridge.with_command("device name", |request| request.response.respond_value("\"cmd\""));
        assert_eq!(exchange(&mut bridge, &host, r#"{"device_name":null}"#), [r#"{"device_name":"cmd"}"#]);
    }

    #[test]
    fn test_first_matching_command_wins() {
        let (transport, host) = loopback();
        let mut bridge = CommandBridge::new()
            .with_interface(Interface::new("USB", transport))
            .with_command("save", |request| request.response.respond_value("1"))
            .with_command("SAVE", |request| request.response.respond_value("2"));
        assert_eq!(exchange(&mut bridge, &host, r#"{"save":null}"#), [r#"{"save":1}"#]);
    }

    #[test]
    fn test_command_handler_sees_value_and_settings() {
        let seen = Rc::new(RefCell::new(None));
        let seen_in_handler = seen.clone();
        let (bridge, host) = bridge_with_settings();
        let mut bridge = bridge.with_command("echo", move |request| {
            let name = request.settings.as_ref().map(|s| s.get().device_name().to_string());
            *seen_in_handler.borrow_mut() = Some((request.value.get().to_string(), name));
            request.response.respond();
        });

        assert_eq!(exchange(&mut bridge, &host, r#"{"Echo":[1, 2]}"#), [r#"{"Echo":null}"#]);
        assert_eq!(
            *seen.borrow(),
            Some(("[1, 2]".to_string(), Some("Sensor".to_string())))
        );
    }

    #[test]
    fn test_command_without_response_sends_nothing() {
        let (transport, host) = loopback();
        let mut bridge = CommandBridge::new()
            .with_interface(Interface::new("USB", transport))
            .with_command("quiet", |_| {});
        assert!(exchange(&mut bridge, &host, r#"{"quiet":null}"#).is_empty());
    }

    #[test]
    fn test_settings_read_and_write() {
        let (mut bridge, host) = bridge_with_settings();
        assert_eq!(exchange(&mut bridge, &host, r#"{"binaryMode":null}"#), [r#"{"binaryMode":false}"#]);
        assert_eq!(exchange(&mut bridge, &host, r#"{"binaryMode":true}"#), [r#"{"binaryMode":true}"#]);
        assert!(bridge.settings().unwrap().get().binary_mode());
    }

    #[test]
    fn test_settings_write_responds_with_stored_value() {
        let (mut bridge, host) = bridge_with_settings();
        assert_eq!(
            exchange(&mut bridge, &host, r#"{"message_rate_divisor":9.7}"#),
            [r#"{"message_rate_divisor":9}"#]
        );
    }

    #[test]
    fn test_settings_type_error() {
        let (mut bridge, host) = bridge_with_settings();
        assert_eq!(
            exchange(&mut bridge, &host, r#"{"binary_mode":"yes"}"#),
            [r#"{"binary_mode":{"error":"Expected boolean"}}"#]
        );
        assert!(!bridge.settings().unwrap().get().binary_mode());
    }

    #[test]
    fn test_out_of_range_float_write_is_an_error() {
        let (bridge, host) = bridge_with_settings();
        let mut bridge = bridge.with_override_read_only(|| true);
        assert_eq!(
            exchange(&mut bridge, &host, r#"{"sensitivity":1e39}"#),
            [r#"{"sensitivity":{"error":"Expected number"}}"#]
        );
        assert_eq!(exchange(&mut bridge, &host, r#"{"sensitivity":null}"#), [r#"{"sensitivity":1.0}"#]);
    }

    #[test]
    fn test_read_only_override() {
        let factory = Rc::new(Cell::new(false));
        let predicate = factory.clone();
        let (bridge, host) = bridge_with_settings();
        let mut bridge = bridge.with_override_read_only(move || predicate.get());

        assert_eq!(
            exchange(&mut bridge, &host, r#"{"serial_number":"A1"}"#),
            [r#"{"serial_number":{"error":"Unable to write read-only setting"}}"#]
        );

        factory.set(true);
        assert_eq!(exchange(&mut bridge, &host, r#"{"serial_number":"A1"}"#), [r#"{"serial_number":"A1"}"#]);
    }

    #[test]
    fn test_read_only_field_is_still_readable() {
        let (mut bridge, host) = bridge_with_settings();
        assert_eq!(
            exchange(&mut bridge, &host, r#"{"calibration_date":null}"#),
            [r#"{"calibration_date":"Unknown"}"#]
        );
    }

    #[test]
    fn test_write_epilogue_runs_after_successful_write() {
        let written = Rc::new(RefCell::new(Vec::new()));
        let log = written.clone();
        let (bridge, host) = bridge_with_settings();
        let mut bridge = bridge.with_write_epilogue(move |index, settings| {
            log.borrow_mut().push(index);
            settings.set(SettingIndex::BinaryMode, true, false);
        });

        exchange(&mut bridge, &host, r#"{"device_name":"X"}"#);
        exchange(&mut bridge, &host, r#"{"device_name":null}"#);
        exchange(&mut bridge, &host, r#"{"device_name":3}"#);

        assert_eq!(*written.borrow(), [SettingIndex::DeviceName]);
        assert!(bridge.settings().unwrap().get().binary_mode());
    }

    #[test]
    fn test_unknown_without_handler() {
        let (mut bridge, host) = bridge_with_settings();
        assert_eq!(
            exchange(&mut bridge, &host, r#"{"bogus":1}"#),
            [r#"{"bogus":{"error":"Unknown command"}}"#]
        );
    }

    #[test]
    fn test_unknown_handler_receives_key() {
        let (bridge, host) = bridge_with_settings();
        let mut bridge = bridge.with_unknown_handler(|request| {
            let mut key = request.key;
            if key::starts_with(&mut key, "echo") {
                let echoed = key.to_string();
                request.response.respond_value(format!("{:?}", echoed));
            } else {
                request.response.respond_error("nope");
            }
        });

        assert_eq!(exchange(&mut bridge, &host, r#"{"echo_42":null}"#), [r#"{"echo_42":"42"}"#]);
        assert_eq!(exchange(&mut bridge, &host, r#"{"other":null}"#), [r#"{"other":{"error":"nope"}}"#]);
    }

    #[test]
    fn test_malformed_lines_are_reported_without_response() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        let (bridge, host) = bridge_with_settings();
        let mut bridge = bridge.with_error_reporter(move |error| sink.borrow_mut().push(error.clone()));

        assert!(exchange(&mut bridge, &host, "not json").is_empty());
        assert!(exchange(&mut bridge, &host, r#"{"a":1,"b":2}"#).is_empty());

        let errors = errors.borrow();
        assert_eq!(
            errors[0],
            BridgeError::Request {
                interface: "USB".to_string(),
                source: RequestError::NotAnObject,
            }
        );
        assert_eq!(errors[1].to_string(), "USB receive error. JSON object is not a single key/value pair.");
    }

    #[test]
    fn test_overrun_reported_once_and_next_line_parses() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        let (transport, host) = loopback();
        let mut settings = Settings::new();
        settings.initialise();
        let mut bridge = CommandBridge::new()
            .with_interface(Interface::new("USB", transport).with_capacity(32))
            .with_settings(settings)
            .with_error_reporter(move |error| sink.borrow_mut().push(error.to_string()));

        host.send(&[b'x'; 96]);
        assert_eq!(exchange(&mut bridge, &host, r#"{"device_name":null}"#), [r#"{"device_name":"Sensor"}"#]);
        assert_eq!(*errors.borrow(), ["USB receive error. Buffer overrun."]);
    }

    #[test]
    fn test_overlong_terminated_line_reports_its_tail() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        let (transport, host) = loopback();
        let mut bridge = CommandBridge::new()
            .with_interface(Interface::new("USB", transport).with_capacity(8))
            .with_error_reporter(move |error| sink.borrow_mut().push(error.to_string()));

        assert!(exchange(&mut bridge, &host, "0123456789").is_empty());
        assert_eq!(errors.borrow().len(), 2);
        assert_eq!(errors.borrow()[0], "USB receive error. Buffer overrun.");
    }

    #[test]
    fn test_line_split_across_polls() {
        let (mut bridge, host) = bridge_with_settings();
        host.send(br#"{"device_"#);
        bridge.tasks();
        assert!(host.take_lines().is_empty());

        host.send(b"name\":null}\n");
        bridge.tasks();
        assert_eq!(host.take_lines(), [r#"{"device_name":"Sensor"}"#]);
    }

    #[test]
    fn test_interfaces_are_independent() {
        let (usb_transport, usb) = loopback();
        let (tcp_transport, tcp) = loopback();
        let mut bridge = CommandBridge::new()
            .with_interface(Interface::new("USB", usb_transport.with_chunk_size(3)))
            .with_interface(Interface::new("TCP", tcp_transport))
            .with_command("ping", |request| request.response.respond_ping("S", "1"));

        usb.send(br#"{"pi"#);
        tcp.send_line(r#"{"ping":null}"#);
        bridge.tasks();
        assert!(usb.take_lines().is_empty());
        assert_eq!(tcp.take_lines(), [r#"{"ping":{"interface":"TCP","name":"S","sn":"1"}}"#]);

        usb.send(b"ng\":null}\n");
        bridge.tasks();
        assert_eq!(usb.take_lines(), [r#"{"ping":{"interface":"USB","name":"S","sn":"1"}}"#]);
        assert!(tcp.take_lines().is_empty());
    }

    #[test]
    fn test_bridge_without_settings_treats_setting_keys_as_unknown() {
        let (transport, host) = loopback();
        let mut bridge = CommandBridge::new().with_interface(Interface::new("USB", transport));
        assert_eq!(
            exchange(&mut bridge, &host, r#"{"device_name":null}"#),
            [r#"{"device_name":{"error":"Unknown command"}}"#]
        );
    }
}
