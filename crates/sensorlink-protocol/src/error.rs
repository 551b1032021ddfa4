//! Error types for the command bridge.

use thiserror::Error;

/// Reasons a received line is not a valid request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Not a JSON object.")]
    NotAnObject,

    #[error("Line is not valid UTF-8.")]
    InvalidUtf8,

    /// The JSON tokenizer rejected the line.
    #[error("Unable to parse JSON object. {0}.")]
    Malformed(String),

    /// Zero, or more than one, key/value pair.
    #[error("JSON object is not a single key/value pair.")]
    NotSinglePair,
}

/// Errors reported by the bridge. None of these produce a response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A line did not fit in the interface's receive buffer.
    #[error("{interface} receive error. Buffer overrun.")]
    BufferOverrun { interface: String },

    /// A complete line could not be parsed as a request.
    #[error("{interface} receive error. {source}")]
    Request {
        interface: String,
        #[source]
        source: RequestError,
    },
}

impl BridgeError {
    /// Name of the interface the error occurred on.
    pub fn interface(&self) -> &str {
        match self {
            BridgeError::BufferOverrun { interface } | BridgeError::Request { interface, .. } => interface,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_interface() {
        let overrun = BridgeError::BufferOverrun {
            interface: "USB".to_string(),
        };
        assert_eq!(overrun.to_string(), "USB receive error. Buffer overrun.");
        assert_eq!(overrun.interface(), "USB");

        let request = BridgeError::Request {
            interface: "TCP".to_string(),
            source: RequestError::NotSinglePair,
        };
        assert_eq!(
            request.to_string(),
            "TCP receive error. JSON object is not a single key/value pair."
        );
    }
}
