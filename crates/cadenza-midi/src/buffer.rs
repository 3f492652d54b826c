//! Fixed-capacity, offset-sorted event list for one block.

use crate::error::{Error, Result};
use crate::event::MidiEvent;

/// Pre-sized event list. Never grows past the capacity it was created with,
/// so every mutating call is allocation-free.
///
/// Ordering is by `(offset, insertion order)`: [`insert_sorted`] places a new
/// event after every existing event with the same offset.
///
/// [`insert_sorted`]: MidiBuffer::insert_sorted
#[derive(Debug, Clone, Default)]
pub struct MidiBuffer {
    events: Vec<MidiEvent>,
    capacity: usize,
    dropped: u32,
}

impl MidiBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    /// Events refused since the last [`clear`](Self::clear) because the buffer was full.
    #[inline]
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped = 0;
    }

    #[inline]
    pub fn as_slice(&self) -> &[MidiEvent] {
        &self.events
    }

    #[inline]
    pub fn iter(&self) -> core::slice::Iter<'_, MidiEvent> {
        self.events.iter()
    }

    /// Append without reordering. Caller guarantees offsets are non-decreasing
    /// or calls [`sort_stable`](Self::sort_stable) afterwards.
    #[inline]
    pub fn push(&mut self, event: MidiEvent) -> Result<()> {
        if self.is_full() {
            self.dropped = self.dropped.saturating_add(1);
            return Err(Error::BufferFull(self.capacity));
        }
        self.events.push(event);
        Ok(())
    }

    /// Insert keeping `(offset, insertion order)` ordering.
    pub fn insert_sorted(&mut self, event: MidiEvent) -> Result<()> {
        if self.is_full() {
            self.dropped = self.dropped.saturating_add(1);
            return Err(Error::BufferFull(self.capacity));
        }
        let at = self.events.partition_point(|e| e.offset <= event.offset);
        self.events.insert(at, event);
        Ok(())
    }

    /// In-place stable insertion sort by offset. `slice::sort_by_key` would
    /// allocate scratch space, this does not.
    pub fn sort_stable(&mut self) {
        for i in 1..self.events.len() {
            let mut j = i;
            while j > 0 && self.events[j - 1].offset > self.events[j].offset {
                self.events.swap(j - 1, j);
                j -= 1;
            }
        }
    }

    /// Copy the events whose offset lies in `[start, start + len)` into `self`,
    /// rebased so that `start` becomes offset 0. Keeps sort order.
    pub fn extend_window(&mut self, source: &[MidiEvent], start: u32, len: u32) -> usize {
        let end = start.saturating_add(len);
        let from = source.partition_point(|e| e.offset < start);
        let mut copied = 0;
        for event in &source[from..] {
            if event.offset >= end {
                break;
            }
            if self.insert_sorted(event.with_offset(event.offset - start)).is_ok() {
                copied += 1;
            }
        }
        copied
    }

    /// Remove every event matching `predicate`, preserving order of the rest.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&MidiEvent) -> bool) {
        self.events.retain(|e| !predicate(e));
    }
}

impl<'a> IntoIterator for &'a MidiBuffer {
    type Item = &'a MidiEvent;
    type IntoIter = core::slice::Iter<'a, MidiEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
