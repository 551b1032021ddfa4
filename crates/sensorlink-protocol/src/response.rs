//! Response formatting.

use crate::interface::Transport;
use sensorlink_metrics::metric_defs;
use sensorlink_settings::json::parse_value;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;
use tracing::debug;

#[derive(Serialize)]
struct ErrorValue<'a> {
    error: &'a str,
}

#[derive(Serialize)]
struct PingValue<'a> {
    interface: &'a str,
    name: &'a str,
    sn: &'a str,
}

/// The response to one request, written as `{"<key>":<value>}\n` to the
/// interface the request arrived on.
///
/// The key echoes the request key and the value defaults to `null`.
pub struct Response<'a> {
    interface: &'a str,
    labels: &'a Vec<(&'static str, String)>,
    transport: &'a mut dyn Transport,
    key: &'a str,
    value: String,
}

impl<'a> Response<'a> {
    #[allow(clippy::ptr_arg)]
    pub(crate) fn new(
        interface: &'a str,
        labels: &'a Vec<(&'static str, String)>,
        transport: &'a mut dyn Transport,
        key: &'a str,
    ) -> Self {
        Response {
            interface,
            labels,
            transport,
            key,
            value: "null".to_string(),
        }
    }

    /// Name of the interface the request arrived on.
    pub fn interface(&self) -> &str {
        self.interface
    }

    pub fn key(&self) -> &str {
        self.key
    }

    /// The value that will be sent, as JSON.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Replace the value. `json` must be a JSON literal, object or array.
    pub fn set_value(&mut self, json: impl Into<String>) {
        self.value = json.into();
    }

    /// Send the response.
    pub fn respond(&mut self) {
        let key = serde_json::to_string(self.key).unwrap_or_else(|_| "\"\"".to_string());
        let line = format!("{{{}:{}}}\n", key, self.value);
        debug!("{}: -> {}", self.interface, line.trim_end());
        self.transport.write(line.as_bytes());
        metrics::counter!(metric_defs::BRIDGE_RESPONSES.name, self.labels).increment(1);
    }

    /// Send the response with `json` as its value.
    pub fn respond_value(&mut self, json: impl Into<String>) {
        self.set_value(json);
        self.respond();
    }

    /// Send `{"error":"<message>"}` as the value.
    pub fn respond_error(&mut self, message: &str) {
        self.respond_serialized(&ErrorValue { error: message });
    }

    /// Answer a ping with the interface name, device name and serial number.
    pub fn respond_ping(&mut self, name: &str, serial_number: &str) {
        let ping = PingValue {
            interface: self.interface,
            name,
            sn: serial_number,
        };
        self.respond_serialized(&ping);
    }

    fn respond_serialized<T: Serialize>(&mut self, value: &T) {
        let json = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
        self.respond_value(json);
    }

    /// Parse `value` as `T`, or respond with an error naming `expected`.
    fn parse<T: DeserializeOwned>(&mut self, value: &RawValue, expected: &'static str) -> Option<T> {
        match parse_value(value, expected) {
            Ok(parsed) => Some(parsed),
            Err(error) => {
                self.respond_error(&error.to_string());
                None
            }
        }
    }

    /// Check that `value` is `null`, or respond with an error.
    pub fn parse_null(&mut self, value: &RawValue) -> Option<()> {
        self.parse(value, "null")
    }

    /// Parse a boolean, or respond with an error.
    pub fn parse_bool(&mut self, value: &RawValue) -> Option<bool> {
        self.parse(value, "boolean")
    }

    /// Parse a number, or respond with an error.
    pub fn parse_number(&mut self, value: &RawValue) -> Option<f32> {
        self.parse::<f64>(value, "number").map(|number| number as f32)
    }

    /// Parse a string, or respond with an error.
    pub fn parse_string(&mut self, value: &RawValue) -> Option<String> {
        self.parse(value, "string")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::loopback;

    fn raw(json: &str) -> Box<RawValue> {
        RawValue::from_string(json.to_string()).unwrap()
    }

    fn with_response(key: &str, f: impl FnOnce(&mut Response<'_>)) -> Vec<String> {
        let (mut transport, host) = loopback();
        let labels = Vec::new();
        let mut response = Response::new("USB", &labels, &mut transport, key);
        f(&mut response);
        host.take_lines()
    }

    #[test]
    fn test_default_value_is_null() {
        let lines = with_response("save", |response| response.respond());
        assert_eq!(lines, [r#"{"save":null}"#]);
    }

    #[test]
    fn test_respond_value() {
        let lines = with_response("rate", |response| response.respond_value("12"));
        assert_eq!(lines, [r#"{"rate":12}"#]);
    }

    #[test]
    fn test_respond_error_escapes_message() {
        let lines = with_response("x", |response| response.respond_error("bad \"thing\""));
        assert_eq!(lines, [r#"{"x":{"error":"bad \"thing\""}}"#]);
    }

    #[test]
    fn test_respond_escapes_key() {
        let lines = with_response("a\"b", |response| response.respond());
        assert_eq!(lines, [r#"{"a\"b":null}"#]);
    }

    #[test]
    fn test_respond_ping() {
        let lines = with_response("ping", |response| response.respond_ping("Sensor", "0123"));
        assert_eq!(lines, [r#"{"ping":{"interface":"USB","name":"Sensor","sn":"0123"}}"#]);
    }

    #[test]
    fn test_parse_helpers_accept_matching_type() {
        let lines = with_response("v", |response| {
            assert_eq!(response.parse_null(&raw("null")), Some(()));
            assert_eq!(response.parse_bool(&raw("true")), Some(true));
            assert_eq!(response.parse_number(&raw("2.5")), Some(2.5));
            assert_eq!(response.parse_string(&raw("\"s\"")), Some("s".to_string()));
        });
        assert!(lines.is_empty());
    }

    #[test]
    fn test_parse_helpers_respond_on_mismatch() {
        let lines = with_response("v", |response| {
            assert_eq!(response.parse_bool(&raw("1")), None);
        });
        assert_eq!(lines, [r#"{"v":{"error":"Expected boolean"}}"#]);

        let lines = with_response("v", |response| {
            assert_eq!(response.parse_null(&raw("{}")), None);
        });
        assert_eq!(lines, [r#"{"v":{"error":"Expected null"}}"#]);
    }
}
