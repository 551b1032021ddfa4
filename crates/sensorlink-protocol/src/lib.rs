//! # sensorlink-protocol
//!
//! The command bridge of a sensorlink device.
//!
//! # Protocol Overview
//!
//! Every interface carries newline-delimited JSON objects holding exactly one
//! key/value pair:
//!
//! - **Requests** (host → device): `{"<key>":<value>}\n`
//! - **Responses** (device → host): `{"<key>":<value>}\n`, where the response
//!   key echoes the request key
//! - **Errors**: `{"<key>":{"error":"<message>"}}\n`
//!
//! Keys are matched ignoring case and punctuation. A key resolves, in order, to
//! a registered command, a settings field, or the unknown-key handler. A
//! settings request whose value is `null` reads the field; any other value
//! writes it and responds with the new value.
//!
//! Lines that are not a single-pair JSON object, and lines that overrun the
//! receive buffer, are dropped without a response and passed to the error
//! reporter.
//!
//! # Example
//!
//! ```rust
//! use sensorlink_protocol::{loopback, CommandBridge, Interface};
//! use sensorlink_settings::Settings;
//!
//! let (transport, host) = loopback();
//! let mut settings = Settings::new();
//! settings.initialise();
//!
//! let mut bridge = CommandBridge::new()
//!     .with_interface(Interface::new("USB", transport))
//!     .with_command("ping", |request| request.response.respond_ping("Sensor", "0001"))
//!     .with_settings(settings);
//!
//! host.send(b"{\"device_name\":null}\n");
//! bridge.tasks();
//! assert_eq!(host.take_lines(), ["{\"device_name\":\"Sensor\"}"]);
//! ```

mod bridge;
mod error;
mod interface;
mod line;
mod request;
mod response;

pub use bridge::*;
pub use error::*;
pub use interface::*;
pub use line::*;
pub use request::*;
pub use response::*;

pub use sensorlink_metrics::metric_defs;
