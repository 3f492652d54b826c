//! Held-note bookkeeping for one track.

use smallvec::SmallVec;

/// Where a held note came from. Re-triggers after a loop wrap keep the
/// source so instance edges still cut them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteSource {
    Instance(u32),
    Steps,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeldNote {
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
    /// Absolute beat at which the note-off is due.
    pub off_beat: f64,
    pub source: NoteSource,
}

/// Fixed-capacity set of sounding notes keyed by `(channel, pitch)`.
///
/// Capacity is reserved up front; `hold` refuses new notes when full rather
/// than growing.
#[derive(Debug, Clone)]
pub struct ActiveNotes {
    held: SmallVec<[HeldNote; 32]>,
    capacity: usize,
}

impl ActiveNotes {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut held = SmallVec::new();
        held.reserve(capacity);
        Self { held, capacity }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.held.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.held.len() >= self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeldNote> {
        self.held.iter()
    }

    pub fn is_held(&self, channel: u8, pitch: u8) -> bool {
        self.find(channel, pitch).is_some()
    }

    fn find(&self, channel: u8, pitch: u8) -> Option<usize> {
        self.held
            .iter()
            .position(|n| n.channel == channel && n.pitch == pitch)
    }

    /// Start tracking `note`. Returns the note it replaces on the same
    /// channel and pitch, or `Err(note)` when the set is full.
    pub fn hold(&mut self, note: HeldNote) -> Result<Option<HeldNote>, HeldNote> {
        if let Some(i) = self.find(note.channel, note.pitch) {
            let previous = self.held[i];
            self.held[i] = note;
            return Ok(Some(previous));
        }
        if self.held.len() >= self.capacity {
            return Err(note);
        }
        self.held.push(note);
        Ok(None)
    }

    pub fn release(&mut self, channel: u8, pitch: u8) -> Option<HeldNote> {
        self.find(channel, pitch).map(|i| self.held.remove(i))
    }

    /// Remove the earliest note whose off-beat is before `until`.
    pub fn pop_due(&mut self, until: f64) -> Option<HeldNote> {
        let mut best: Option<usize> = None;
        for (i, n) in self.held.iter().enumerate() {
            if n.off_beat < until && best.map_or(true, |b| n.off_beat < self.held[b].off_beat) {
                best = Some(i);
            }
        }
        best.map(|i| self.held.remove(i))
    }

    /// Remove every note, oldest first.
    pub fn drain(&mut self, mut f: impl FnMut(HeldNote)) {
        for note in self.held.drain(..) {
            f(note);
        }
    }

    /// Keep the notes for which `f` returns true. `f` may edit a note in
    /// place.
    pub fn retain(&mut self, mut f: impl FnMut(&mut HeldNote) -> bool) {
        self.held.retain(|note| f(note));
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }
}
