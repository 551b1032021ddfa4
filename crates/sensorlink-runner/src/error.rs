//! Error types for the device runner.

use sensorlink_settings::SettingsJsonError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop the runner from starting.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The NVM image could not be read or created.
    #[error("NVM image {}: {source}", path.display())]
    Nvm {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The NVM is too small to hold the settings.
    #[error("NVM size {size} is smaller than the {required} bytes the settings need")]
    NvmTooSmall { size: usize, required: usize },

    /// The settings file could not be read.
    #[error("settings file {}: {source}", path.display())]
    SettingsFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The settings file is not a valid settings object.
    #[error("settings file {}: {source}", path.display())]
    SettingsJson {
        path: PathBuf,
        #[source]
        source: SettingsJsonError,
    },

    /// The TCP interface could not be started.
    #[error("TCP interface on port {port}: {source}")]
    Tcp {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// An I/O thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Thread {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("no interfaces enabled")]
    NoInterfaces,

    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;
