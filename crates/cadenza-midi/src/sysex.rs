//! Variable-length SysEx storage referenced from fixed-size events.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SysexHandle(u16);

impl SysexHandle {
    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

#[derive(Clone, Copy, Debug)]
struct Span {
    start: u32,
    len: u32,
}

/// Bump arena of SysEx payloads, reset once per block by its owner.
#[derive(Debug)]
pub struct SysexPool {
    bytes: Vec<u8>,
    spans: Vec<Span>,
    byte_capacity: usize,
    max_messages: usize,
}

impl SysexPool {
    pub fn new(byte_capacity: usize, max_messages: usize) -> Self {
        let max_messages = max_messages.min(usize::from(u16::MAX) + 1);
        Self {
            bytes: Vec::with_capacity(byte_capacity),
            spans: Vec::with_capacity(max_messages),
            byte_capacity,
            max_messages,
        }
    }

    pub fn store(&mut self, payload: &[u8]) -> Result<SysexHandle> {
        let available = self.byte_capacity - self.bytes.len();
        if payload.len() > available || self.spans.len() >= self.max_messages {
            return Err(Error::PoolFull {
                requested: payload.len(),
                available,
            });
        }
        let handle = SysexHandle(self.spans.len() as u16);
        self.spans.push(Span {
            start: self.bytes.len() as u32,
            len: payload.len() as u32,
        });
        self.bytes.extend_from_slice(payload);
        Ok(handle)
    }

    pub fn get(&self, handle: SysexHandle) -> Result<&[u8]> {
        let span = self
            .spans
            .get(usize::from(handle.0))
            .ok_or(Error::UnknownHandle(handle.0))?;
        let start = span.start as usize;
        Ok(&self.bytes[start..start + span.len as usize])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.spans.clear();
    }
}
