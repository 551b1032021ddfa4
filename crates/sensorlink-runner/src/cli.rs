//! Command-line configuration.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Default NVM size in bytes.
pub const DEFAULT_NVM_SIZE: usize = 1024;

/// Run a sensor device that answers JSON commands on stdin/stdout and,
/// optionally, a TCP port.
#[derive(Debug, Clone, Parser)]
#[command(name = "sensorlink", version, about = "Sensor device command bridge")]
pub struct Cli {
    /// NVM image file. Created blank if missing. Settings are kept in memory
    /// when omitted.
    #[arg(long, value_name = "PATH")]
    pub nvm: Option<PathBuf>,

    /// NVM size in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_NVM_SIZE)]
    pub nvm_size: usize,

    /// Also serve the command interface on this TCP port.
    #[arg(long, value_name = "PORT")]
    pub tcp_port: Option<u16>,

    /// Do not serve the command interface on stdin/stdout.
    #[arg(long)]
    pub no_stdio: bool,

    /// JSON object of settings to apply at startup. Read-only settings are
    /// written too.
    #[arg(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Print all settings as JSON and exit.
    #[arg(long)]
    pub dump_settings: bool,

    /// Delay between polls of the interfaces.
    #[arg(long, value_name = "MS", default_value_t = 1)]
    pub poll_interval_ms: u64,

    /// Log filter, e.g. `debug` or `sensorlink_protocol=trace`. Overrides
    /// RUST_LOG.
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Serial number written when settings are restored to defaults.
    #[arg(long, value_name = "SERIAL", default_value = "01234567")]
    pub device_serial: String,

    /// Firmware version written when settings are restored to defaults.
    #[arg(long, value_name = "VERSION", default_value = "v1.0.0")]
    pub firmware_version: String,
}

impl Cli {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["sensorlink"]).unwrap();
        assert_eq!(cli.nvm, None);
        assert_eq!(cli.nvm_size, DEFAULT_NVM_SIZE);
        assert_eq!(cli.tcp_port, None);
        assert!(!cli.no_stdio);
        assert!(!cli.dump_settings);
        assert_eq!(cli.poll_interval(), Duration::from_millis(1));
        assert_eq!(cli.device_serial, "01234567");
        assert_eq!(cli.firmware_version, "v1.0.0");
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "sensorlink",
            "--nvm",
            "device.nvm",
            "--tcp-port",
            "7000",
            "--no-stdio",
            "--settings",
            "factory.json",
            "--log-level",
            "debug",
            "--device-serial",
            "SN-1",
        ])
        .unwrap();
        assert_eq!(cli.nvm, Some(PathBuf::from("device.nvm")));
        assert_eq!(cli.tcp_port, Some(7000));
        assert!(cli.no_stdio);
        assert_eq!(cli.settings, Some(PathBuf::from("factory.json")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.device_serial, "SN-1");
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(Cli::try_parse_from(["sensorlink", "--tcp-port", "70000"]).is_err());
    }
}
