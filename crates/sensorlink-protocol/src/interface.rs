//! Command interfaces and the byte transports beneath them.

use crate::line::{LineBuffer, DEFAULT_LINE_CAPACITY};
use sensorlink_metrics::InterfaceLabels;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A byte-oriented channel. Both calls must return without blocking.
pub trait Transport {
    /// Copy available received bytes into `buffer` and return how many were
    /// copied. Zero means nothing is available right now.
    fn read(&mut self, buffer: &mut [u8]) -> usize;

    /// Send `data`. Failures are not reported.
    fn write(&mut self, data: &[u8]);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, buffer: &mut [u8]) -> usize {
        (**self).read(buffer)
    }

    fn write(&mut self, data: &[u8]) {
        (**self).write(data)
    }
}

/// A named channel the bridge receives requests on and answers through.
pub struct Interface {
    pub(crate) name: String,
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) line: LineBuffer,
    pub(crate) labels: Vec<(&'static str, String)>,
}

impl std::fmt::Debug for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.name)
            .field("line", &self.line)
            .finish_non_exhaustive()
    }
}

impl Interface {
    /// Create an interface with the default receive buffer capacity.
    pub fn new(name: impl Into<String>, transport: impl Transport + 'static) -> Self {
        let name = name.into();
        let labels = InterfaceLabels::new(name.clone()).to_labels();
        Interface {
            name,
            transport: Box::new(transport),
            line: LineBuffer::new(DEFAULT_LINE_CAPACITY),
            labels,
        }
    }

    /// Set the receive buffer capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.line = LineBuffer::new(capacity);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn line(&self) -> &LineBuffer {
        &self.line
    }
}

// ============================================================================
// Loopback
// ============================================================================

#[derive(Debug, Default)]
struct LoopbackState {
    incoming: VecDeque<u8>,
    outgoing: Vec<u8>,
}

/// Create an in-memory transport pair: the device side is a
/// [`LoopbackTransport`], the host side a [`LoopbackHandle`].
pub fn loopback() -> (LoopbackTransport, LoopbackHandle) {
    let state = Rc::new(RefCell::new(LoopbackState::default()));
    (
        LoopbackTransport {
            state: state.clone(),
            chunk_size: usize::MAX,
        },
        LoopbackHandle { state },
    )
}

/// Device side of a [`loopback`] pair.
#[derive(Debug)]
pub struct LoopbackTransport {
    state: Rc<RefCell<LoopbackState>>,
    chunk_size: usize,
}

impl LoopbackTransport {
    /// Return at most `chunk_size` bytes per read.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Transport for LoopbackTransport {
    fn read(&mut self, buffer: &mut [u8]) -> usize {
        let mut state = self.state.borrow_mut();
        let count = buffer.len().min(self.chunk_size).min(state.incoming.len());
        for (destination, byte) in buffer.iter_mut().zip(state.incoming.drain(..count)) {
            *destination = byte;
        }
        count
    }

    fn write(&mut self, data: &[u8]) {
        self.state.borrow_mut().outgoing.extend_from_slice(data);
    }
}

/// Host side of a [`loopback`] pair.
#[derive(Debug, Clone)]
pub struct LoopbackHandle {
    state: Rc<RefCell<LoopbackState>>,
}

impl LoopbackHandle {
    /// Queue bytes for the device to read.
    pub fn send(&self, data: &[u8]) {
        self.state.borrow_mut().incoming.extend(data);
    }

    /// Queue `line` followed by a terminator.
    pub fn send_line(&self, line: &str) {
        let mut state = self.state.borrow_mut();
        state.incoming.extend(line.as_bytes());
        state.incoming.push_back(b'\n');
    }

    /// Number of queued bytes the device has not read yet.
    pub fn pending(&self) -> usize {
        self.state.borrow().incoming.len()
    }

    /// Take everything the device has written.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.borrow_mut().outgoing)
    }

    /// Take everything the device has written, split into lines.
    pub fn take_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.take_output())
            .lines()
            .map(str::to_string)
            .collect()
    }
}
