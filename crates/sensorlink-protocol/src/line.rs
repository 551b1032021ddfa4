//! Line framing for received bytes.
//!
//! Requests are terminated by `\n`. Bytes are accumulated one at a time into a
//! bounded buffer. When the buffer fills before a terminator, the partial line
//! is dropped and accumulation starts again with the next byte. Only the first
//! overrun before a terminator is reported.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

/// Default receive buffer capacity, in bytes.
pub const DEFAULT_LINE_CAPACITY: usize = 1024;

/// Line terminator.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Something a pushed byte completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A complete line, without its terminator.
    Line(Bytes),
    /// The buffer filled before a terminator arrived.
    Overrun,
}

/// Receive state of a [`LineBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    /// Nothing buffered.
    Idle,
    /// Part of a line is buffered.
    Accumulating,
    /// An overrun has been reported and no terminator has arrived since.
    Overrun,
}

/// A bounded line accumulator.
#[derive(Debug)]
pub struct LineBuffer {
    buffer: BytesMut,
    capacity: usize,
    overrun: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_CAPACITY)
    }
}

impl LineBuffer {
    /// Create a buffer that overruns once it holds `capacity` bytes. A line
    /// therefore carries at most `capacity - 1` bytes before its terminator.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        LineBuffer {
            buffer: BytesMut::with_capacity(capacity),
            capacity,
            overrun: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> LineState {
        if self.overrun {
            LineState::Overrun
        } else if self.buffer.is_empty() {
            LineState::Idle
        } else {
            LineState::Accumulating
        }
    }

    /// Number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Add one received byte.
    pub fn push(&mut self, byte: u8) -> Option<LineEvent> {
        if byte == LINE_TERMINATOR {
            self.overrun = false;
            return Some(LineEvent::Line(self.buffer.split().freeze()));
        }

        self.buffer.put_u8(byte);
        if self.buffer.len() < self.capacity {
            return None;
        }

        self.buffer.clear();
        if self.overrun {
            trace!("LineBuffer: overrun continues");
            return None;
        }
        self.overrun = true;
        Some(LineEvent::Overrun)
    }

    /// Drop any partial line.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.overrun = false;
    }
}
