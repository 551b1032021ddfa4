//! Transports backed by blocking I/O threads.
//!
//! A reader thread forwards whatever it reads into a channel and a writer
//! thread drains another channel into its sink, so the bridge side never
//! blocks.

use crate::error::{RunnerError, RunnerResult};
use bytes::{Buf, BytesMut};
use crossbeam_channel::{Receiver, Sender};
use sensorlink_protocol::Transport;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

const READ_SIZE: usize = 1024;

/// Bytes received in chunks but not yet handed to the bridge.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    pending: BytesMut,
}

impl ReadBuffer {
    /// Fill `buffer` from pending bytes, pulling more chunks from `next`
    /// until it is full or `next` has nothing left.
    pub fn read(&mut self, buffer: &mut [u8], mut next: impl FnMut() -> Option<Vec<u8>>) -> usize {
        while self.pending.len() < buffer.len() {
            match next() {
                Some(chunk) => self.pending.extend_from_slice(&chunk),
                None => break,
            }
        }
        let count = buffer.len().min(self.pending.len());
        buffer[..count].copy_from_slice(&self.pending[..count]);
        self.pending.advance(count);
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Device side of a pair of I/O threads.
#[derive(Debug)]
pub struct ChannelTransport {
    name: &'static str,
    incoming: Receiver<Vec<u8>>,
    outgoing: Sender<Vec<u8>>,
    pending: ReadBuffer,
}

impl Transport for ChannelTransport {
    fn read(&mut self, buffer: &mut [u8]) -> usize {
        let incoming = &self.incoming;
        self.pending.read(buffer, || incoming.try_recv().ok())
    }

    fn write(&mut self, data: &[u8]) {
        if self.outgoing.send(data.to_vec()).is_err() {
            trace!("{}: writer gone, dropped {} bytes", self.name, data.len());
        }
    }
}

/// The writer thread of a [`ChannelTransport`].
#[derive(Debug)]
pub struct WriterThread {
    handle: JoinHandle<()>,
}

impl WriterThread {
    /// Wait for everything written so far to reach the sink. The transport
    /// must have been dropped first or this never returns.
    pub fn finish(self) {
        if self.handle.join().is_err() {
            warn!("writer thread panicked");
        }
    }
}

/// Spawn reader and writer threads for `reader` and `writer`.
///
/// When `eof` is given it is set once the reader reaches end of input.
pub fn channel_transport<R, W>(
    name: &'static str,
    reader: R,
    writer: W,
    eof: Option<Arc<AtomicBool>>,
) -> RunnerResult<(ChannelTransport, WriterThread)>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let (incoming_tx, incoming) = crossbeam_channel::unbounded();
    let (outgoing, outgoing_rx) = crossbeam_channel::unbounded();

    thread::Builder::new()
        .name(format!("{}-reader", name))
        .spawn(move || read_loop(name, reader, incoming_tx, eof))
        .map_err(|source| RunnerError::Thread { name, source })?;

    let handle = thread::Builder::new()
        .name(format!("{}-writer", name))
        .spawn(move || write_loop(name, writer, outgoing_rx))
        .map_err(|source| RunnerError::Thread { name, source })?;

    let transport = ChannelTransport {
        name,
        incoming,
        outgoing,
        pending: ReadBuffer::default(),
    };
    Ok((transport, WriterThread { handle }))
}

/// Transport over the process's stdin and stdout.
pub fn stdio(eof: Option<Arc<AtomicBool>>) -> RunnerResult<(ChannelTransport, WriterThread)> {
    channel_transport("stdio", io::stdin(), io::stdout(), eof)
}

fn read_loop(name: &str, mut reader: impl Read, sender: Sender<Vec<u8>>, eof: Option<Arc<AtomicBool>>) {
    let mut buffer = [0u8; READ_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => {
                debug!("{}: end of input", name);
                break;
            }
            Ok(n) => {
                if sender.send(buffer[..n].to_vec()).is_err() {
                    return;
                }
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                warn!("{}: read failed: {}", name, error);
                break;
            }
        }
    }
    if let Some(eof) = eof {
        eof.store(true, Ordering::SeqCst);
    }
}

fn write_loop(name: &str, mut writer: impl Write, receiver: Receiver<Vec<u8>>) {
    for data in receiver {
        let result = writer.write_all(&data).and_then(|()| writer.flush());
        if let Err(error) = result {
            warn!("{}: write failed: {}", name, error);
            return;
        }
    }
}
