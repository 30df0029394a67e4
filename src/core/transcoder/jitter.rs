//! Fixed-unit accumulators for the downlink path.

use bytes::{Bytes, BytesMut};

/// Accumulates 16-bit PCM bytes and releases whole units.
///
/// Only even byte counts are admitted into the buffer. A trailing odd byte is
/// kept in a one-byte carry and prefixed to the next push.
#[derive(Debug)]
pub struct PcmAccumulator {
    unit_bytes: usize,
    buffer: BytesMut,
    carry: Option<u8>,
}

impl PcmAccumulator {
    /// `unit_bytes` is rounded up to an even count.
    pub fn new(unit_bytes: usize) -> Self {
        let unit_bytes = (unit_bytes.max(2) + 1) & !1;
        Self {
            unit_bytes,
            buffer: BytesMut::with_capacity(unit_bytes * 2),
            carry: None,
        }
    }

    pub fn unit_bytes(&self) -> usize {
        self.unit_bytes
    }

    pub fn push(&mut self, data: &[u8]) {
        let mut data = data;
        if data.is_empty() {
            return;
        }

        if let Some(byte) = self.carry.take() {
            self.buffer.extend_from_slice(&[byte, data[0]]);
            data = &data[1..];
        }

        if data.len() % 2 == 1 {
            self.carry = Some(data[data.len() - 1]);
            data = &data[..data.len() - 1];
        }

        self.buffer.extend_from_slice(data);
    }

    /// Cut off the next complete unit, if one is buffered.
    pub fn next_unit(&mut self) -> Option<Bytes> {
        if self.buffer.len() < self.unit_bytes {
            return None;
        }
        Some(self.buffer.split_to(self.unit_bytes).freeze())
    }

    /// Bytes held, including the carry byte.
    pub fn len(&self) -> usize {
        self.buffer.len() + usize::from(self.carry.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_carry(&self) -> bool {
        self.carry.is_some()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.carry = None;
    }
}

/// Smooths variably sized encoded output into fixed-size chunks.
#[derive(Debug)]
pub struct JitterBuffer {
    chunk_bytes: usize,
    buffer: BytesMut,
}

impl JitterBuffer {
    pub fn new(chunk_bytes: usize) -> Self {
        let chunk_bytes = chunk_bytes.max(1);
        Self {
            chunk_bytes,
            buffer: BytesMut::with_capacity(chunk_bytes * 4),
        }
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Drain every complete chunk, leaving the remainder buffered.
    pub fn drain_ready(&mut self, out: &mut Vec<Bytes>) {
        while self.buffer.len() >= self.chunk_bytes {
            out.push(self.buffer.split_to(self.chunk_bytes).freeze());
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
