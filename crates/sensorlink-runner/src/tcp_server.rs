//! TCP command interface.
//!
//! One client at a time. Received bytes are queued for the bridge and
//! responses go back to whoever is connected. Responses written while no
//! client is connected are dropped.

use crate::error::{RunnerError, RunnerResult};
use crate::transport::ReadBuffer;
use sensorlink_protocol::Transport;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Chunks buffered in each direction.
const CHANNEL_CAPACITY: usize = 256;

/// Owns the runtime the listener runs on. Dropping it stops the listener.
#[derive(Debug)]
pub struct TcpServer {
    runtime: Runtime,
    local_addr: SocketAddr,
    connected: Arc<AtomicBool>,
}

impl TcpServer {
    /// Listen on `port` (0 picks a free port) on all addresses.
    pub fn start(port: u16) -> RunnerResult<(TcpServer, TcpTransport)> {
        let tcp_error = |source: io::Error| RunnerError::Tcp { port, source };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("sensorlink-tcp")
            .enable_all()
            .build()
            .map_err(tcp_error)?;
        let listener = runtime
            .block_on(TcpListener::bind(("0.0.0.0", port)))
            .map_err(tcp_error)?;
        let local_addr = listener.local_addr().map_err(tcp_error)?;

        let (rx_sender, rx_receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx_sender, tx_receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));

        runtime.spawn(run_listener(listener, tx_receiver, rx_sender, connected.clone()));
        info!("TCP: listening on {}", local_addr);

        let transport = TcpTransport {
            incoming: rx_receiver,
            outgoing: tx_sender,
            connected: connected.clone(),
            pending: ReadBuffer::default(),
        };
        let server = TcpServer {
            runtime,
            local_addr,
            connected,
        };
        Ok((server, transport))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_client_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Stop the listener without waiting for it.
    pub fn shutdown(self) {
        self.runtime.shutdown_background();
    }
}

/// Device side of the TCP interface.
#[derive(Debug)]
pub struct TcpTransport {
    incoming: mpsc::Receiver<Vec<u8>>,
    outgoing: mpsc::Sender<Vec<u8>>,
    connected: Arc<AtomicBool>,
    pending: ReadBuffer,
}

impl Transport for TcpTransport {
    fn read(&mut self, buffer: &mut [u8]) -> usize {
        let incoming = &mut self.incoming;
        self.pending.read(buffer, || incoming.try_recv().ok())
    }

    fn write(&mut self, data: &[u8]) {
        if !self.connected.load(Ordering::SeqCst) {
            trace!("TCP: no client, dropped {} bytes", data.len());
            return;
        }
        match self.outgoing.try_send(data.to_vec()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("TCP: send buffer full, dropped {} bytes", data.len());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("TCP: listener stopped, dropped {} bytes", data.len());
            }
        }
    }
}

async fn run_listener(
    listener: TcpListener,
    mut tx_receiver: mpsc::Receiver<Vec<u8>>,
    rx_sender: mpsc::Sender<Vec<u8>>,
    connected: Arc<AtomicBool>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                warn!("TCP: accept failed: {}", error);
                continue;
            }
        };
        info!("TCP: client {} connected", peer);

        // Anything still queued was meant for the previous client.
        while tx_receiver.try_recv().is_ok() {}
        connected.store(true, Ordering::SeqCst);

        let result = handle_connection(stream, &mut tx_receiver, &rx_sender).await;

        connected.store(false, Ordering::SeqCst);
        match result {
            Ok(()) => info!("TCP: client {} disconnected", peer),
            Err(error) => warn!("TCP: connection error with {}: {}", peer, error),
        }
        if rx_sender.is_closed() {
            debug!("TCP: bridge gone, listener stopping");
            return;
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    tx_receiver: &mut mpsc::Receiver<Vec<u8>>,
    rx_sender: &mpsc::Sender<Vec<u8>>,
) -> io::Result<()> {
    let (mut reader, mut writer) = stream.split();
    let mut read_buf = [0u8; 1024];

    loop {
        tokio::select! {
            result = reader.read(&mut read_buf) => {
                let n = result?;
                if n == 0 {
                    return Ok(());
                }
                if rx_sender.send(read_buf[..n].to_vec()).await.is_err() {
                    return Ok(());
                }
            }

            Some(data) = tx_receiver.recv() => {
                writer.write_all(&data).await?;
                writer.flush().await?;
            }
        }
    }
}
