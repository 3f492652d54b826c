//! Pre-allocated capture buffer for one recording track.
//!
//! A [`TakeBuffer`] is allocated once, off the audio thread, and shared as an
//! `Arc` between the control side and the recorder. Either the recorder
//! writes or any number of views read, arbitrated by an atomic state word:
//!
//! - `IDLE` (0): nobody is writing; the valid prefix is stable.
//! - `WRITING`: the recorder owns the buffer and appends frames.
//! - any other value: that many [`TakeView`]s are alive; the recorder will
//!   not start a take until the last one is dropped.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use cadenza_core::AudioBlock;

const IDLE: usize = 0;
const WRITING: usize = usize::MAX;

/// Planar capture storage: channel `c` occupies
/// `[c * capacity, (c + 1) * capacity)` of one contiguous allocation.
pub struct TakeBuffer {
    data: Box<[UnsafeCell<f32>]>,
    channels: usize,
    capacity: usize,
    sample_rate: f64,
    recorded: AtomicUsize,
    start_sample: AtomicU64,
    state: AtomicUsize,
}

// SAFETY: sample memory is only written while `state == WRITING`, which a
// single owner acquires by CAS from `IDLE`, and only read through `TakeView`,
// each of which holds one count in `state`. Readers never see frames past `recorded`,
// which is published with Release after the frames are written.
unsafe impl Sync for TakeBuffer {}

impl core::fmt::Debug for TakeBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TakeBuffer")
            .field("channels", &self.channels)
            .field("capacity", &self.capacity)
            .field("recorded", &self.recorded_frames())
            .finish()
    }
}

impl TakeBuffer {
    /// Zeroed buffer for `channels` x `capacity` frames. Allocates.
    pub fn new(channels: usize, capacity: usize, sample_rate: f64) -> Self {
        let channels = channels.max(1);
        let data = (0..channels * capacity)
            .map(|_| UnsafeCell::new(0.0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            data,
            channels,
            capacity,
            sample_rate,
            recorded: AtomicUsize::new(0),
            start_sample: AtomicU64::new(0),
            state: AtomicUsize::new(IDLE),
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames per channel.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn recorded_frames(&self) -> usize {
        self.recorded.load(Ordering::Acquire)
    }

    /// Timeline sample of the first recorded frame.
    #[inline]
    pub fn start_sample(&self) -> u64 {
        self.start_sample.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_writing(&self) -> bool {
        self.state.load(Ordering::Acquire) == WRITING
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.recorded_frames() >= self.capacity
    }

    #[inline]
    fn base(&self) -> *mut f32 {
        UnsafeCell::raw_get(self.data.as_ptr())
    }

    /// Start a new take at `start_sample`, discarding the previous one.
    /// Fails while a view is open.
    pub(crate) fn begin(&self, start_sample: u64) -> bool {
        if self
            .state
            .compare_exchange(IDLE, WRITING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.start_sample.store(start_sample, Ordering::Release);
        self.recorded.store(0, Ordering::Release);
        true
    }

    pub(crate) fn end(&self) {
        let _ = self
            .state
            .compare_exchange(WRITING, IDLE, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Append `len` frames of `input` starting at `offset`, reading host
    /// channels from `first_channel`. Missing input channels record silence.
    /// Returns the frames written, which is short when the buffer fills.
    pub(crate) fn append(
        &self,
        input: &AudioBlock,
        first_channel: usize,
        offset: usize,
        len: usize,
    ) -> usize {
        if self.state.load(Ordering::Acquire) != WRITING {
            return 0;
        }
        let at = self.recorded.load(Ordering::Relaxed);
        let n = len.min(self.capacity - at);
        if n == 0 {
            return 0;
        }
        let base = self.base();
        for c in 0..self.channels {
            // SAFETY: `[at, at + n)` lies inside channel `c`'s region and
            // past `recorded`, so no view can alias it; we hold WRITING.
            let dest = unsafe {
                core::slice::from_raw_parts_mut(base.add(c * self.capacity + at), n)
            };
            let src_ch = first_channel + c;
            if src_ch < input.channels() {
                let src = input.channel(src_ch);
                let end = (offset + n).min(src.len());
                let available = end.saturating_sub(offset);
                dest[..available].copy_from_slice(&src[offset..end]);
                dest[available..].fill(0.0);
            } else {
                dest.fill(0.0);
            }
        }
        self.recorded.store(at + n, Ordering::Release);
        n
    }
}

/// Read-only view of a finished take's valid prefix.
///
/// While a view is alive the recorder will not begin a new take on this
/// buffer. Views are `Send`, so export can run on a worker thread.
pub struct TakeView {
    take: Arc<TakeBuffer>,
    frames: usize,
}

impl TakeView {
    /// Open a view, or `None` if the take is being written. Any number of
    /// views may be open at once.
    pub fn open(take: Arc<TakeBuffer>) -> Option<Self> {
        let mut current = take.state.load(Ordering::Acquire);
        loop {
            if current == WRITING || current == WRITING - 1 {
                return None;
            }
            match take.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        let frames = take.recorded_frames();
        Some(Self { take, frames })
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.take.channels
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.take.sample_rate
    }

    pub fn start_sample(&self) -> u64 {
        self.take.start_sample()
    }

    pub fn channel(&self, ch: usize) -> &[f32] {
        if ch >= self.take.channels {
            return &[];
        }
        // SAFETY: an open view excludes the writer; `frames <= recorded`.
        unsafe {
            core::slice::from_raw_parts(
                self.take.base().add(ch * self.take.capacity),
                self.frames,
            )
        }
    }

    /// Copy out as per-channel vectors.
    pub fn to_channels(&self) -> Vec<Vec<f32>> {
        (0..self.channels()).map(|c| self.channel(c).to_vec()).collect()
    }
}

impl Drop for TakeView {
    fn drop(&mut self) {
        // The last view to go returns the buffer to IDLE.
        self.take.state.fetch_sub(1, Ordering::AcqRel);
    }
}

impl core::fmt::Debug for TakeView {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TakeView")
            .field("channels", &self.channels())
            .field("frames", &self.frames)
            .finish()
    }
}
