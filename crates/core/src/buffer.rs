//! Bounded byte buffer used by the object writer

use bytes::{Bytes, BytesMut};

/// A fixed-capacity buffer that accumulates one upload part at a time
#[derive(Debug)]
pub(crate) struct PartBuffer {
    buffer: BytesMut,
    capacity: usize,
}

impl PartBuffer {
    /// Create a buffer holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            // Large part sizes grow lazily; small payloads never pay for them
            buffer: BytesMut::with_capacity(capacity.min(64 * 1024)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }

    /// Free space left before the buffer is full
    pub fn remaining(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    /// Append as much of `data` as fits; returns the number of bytes taken
    pub fn append(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.remaining());
        self.buffer.extend_from_slice(&data[..n]);
        n
    }

    /// Take the contents, leaving the buffer empty
    pub fn drain(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Discard the contents
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
