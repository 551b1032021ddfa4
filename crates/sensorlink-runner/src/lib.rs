//! Sensor device runner.
//!
//! Hosts a [`CommandBridge`] over stdin/stdout and, optionally, a TCP port,
//! with settings kept in an NVM image file. The main loop polls the bridge
//! until a `shutdown` command, Ctrl-C, or end of stdin.

pub mod cli;
pub mod commands;
pub mod error;
pub mod storage;
pub mod tcp_server;
pub mod transport;

pub use cli::Cli;
pub use error::{RunnerError, RunnerResult};

use commands::DeviceState;
use sensorlink_protocol::{CommandBridge, Interface};
use sensorlink_settings::{json, MemoryStorage, Settings, SETTINGS_SIZE};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use storage::FileStorage;
use tcp_server::TcpServer;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use transport::WriterThread;

/// Name of the stdin/stdout interface.
pub const STDIO_INTERFACE: &str = "USB";

/// Name of the TCP interface.
pub const TCP_INTERFACE: &str = "TCP";

/// Log to stderr; stdout carries responses.
///
/// The filter comes from `log_level` when given, else `RUST_LOG`, else
/// `warn`.
pub fn init_tracing(log_level: Option<&str>) {
    let filter = log_level
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init();
}

/// Load settings from the configured NVM, running the device's hooks.
pub fn load_settings(cli: &Cli) -> RunnerResult<Settings> {
    if cli.nvm_size < SETTINGS_SIZE {
        return Err(RunnerError::NvmTooSmall {
            size: cli.nvm_size,
            required: SETTINGS_SIZE,
        });
    }

    let settings = match &cli.nvm {
        Some(path) => Settings::new().with_storage(FileStorage::open(path, cli.nvm_size)?),
        None => Settings::new().with_storage(MemoryStorage::new(cli.nvm_size)),
    };
    let mut settings = commands::with_device_hooks(settings, cli.device_serial.clone(), cli.firmware_version.clone());
    settings.initialise();

    if let Some(path) = &cli.settings {
        let text = fs::read_to_string(path).map_err(|source| RunnerError::SettingsFile {
            path: path.clone(),
            source,
        })?;
        json::set_from_object(&mut settings, &text, true).map_err(|source| RunnerError::SettingsJson {
            path: path.clone(),
            source,
        })?;
        settings.save();
        info!("Settings: applied {}", path.display());
    }

    Ok(settings)
}

/// Run the device until shutdown.
pub fn run(cli: Cli) -> RunnerResult<()> {
    let settings = load_settings(&cli)?;

    if cli.dump_settings {
        print!("{}", json::get_all_object_json(&settings));
        return Ok(());
    }

    sensorlink_metrics::describe_metrics();

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut interfaces = Vec::new();

    let mut writer: Option<WriterThread> = None;
    if !cli.no_stdio {
        // Without another interface, end of stdin ends the session.
        let eof = cli.tcp_port.is_none().then(|| shutdown.clone());
        let (transport, thread) = transport::stdio(eof)?;
        interfaces.push(Interface::new(STDIO_INTERFACE, transport));
        writer = Some(thread);
    }

    let mut server: Option<TcpServer> = None;
    if let Some(port) = cli.tcp_port {
        let (tcp, transport) = TcpServer::start(port)?;
        interfaces.push(Interface::new(TCP_INTERFACE, transport));
        server = Some(tcp);
    }

    if interfaces.is_empty() {
        return Err(RunnerError::NoInterfaces);
    }

    let handler_flag = shutdown.clone();
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst))?;

    let state = DeviceState::new(shutdown);
    let mut bridge = commands::build_bridge(settings, interfaces, &state);
    info!(
        "Device running on {:?}",
        bridge.interfaces().iter().map(Interface::name).collect::<Vec<_>>()
    );

    poll(&mut bridge, &state, &cli);

    info!("Shutting down after {} receive errors", state.receive_errors());
    drop(bridge);
    if let Some(writer) = writer {
        writer.finish();
    }
    if let Some(server) = server {
        server.shutdown();
    }
    Ok(())
}

/// Poll until shutdown, then once more so requests that arrived with the
/// shutdown are answered.
fn poll(bridge: &mut CommandBridge, state: &DeviceState, cli: &Cli) {
    let interval = cli.poll_interval();
    loop {
        bridge.tasks();
        if state.shutdown_requested() {
            break;
        }
        std::thread::sleep(interval);
    }
    bridge.tasks();
}
