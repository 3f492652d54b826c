//! Outbound events, audio thread to listeners.
//!
//! Everything here is `Copy` so the audio thread can report without
//! allocating. Listeners drain the queue on their own thread and must not
//! call back into the core synchronously.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::graph::NodeId;
use crate::metering::MeterReading;
use crate::node::NodeFault;
use crate::spsc::SpscProducer;
use crate::transport::TransportState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Event {
    TransportStateChanged(TransportState),
    PositionChanged { beat: f64, sample: u64 },
    TempoChanged { bpm: f64 },
    LoopWrapped { sample: u64 },
    Metering {
        node: NodeId,
        peak_l: f32,
        peak_r: f32,
        rms: f32,
    },
    RecorderOverrun { track: usize },
    RecordingStarted { track: usize, sample: u64 },
    NodeFailed { node: NodeId, fault: NodeFault },
    /// A malformed or undeliverable MIDI event was skipped.
    EventDropped { track: usize, offset: u32 },
    /// A command reached the audio thread but could not be applied.
    CommandRejected { kind: ErrorKind },
    GraphSwapped { generation: u64 },
}

impl Event {
    pub fn metering(node: NodeId, reading: MeterReading) -> Self {
        Event::Metering {
            node,
            peak_l: reading.peak_l,
            peak_r: reading.peak_r,
            rms: reading.rms,
        }
    }
}

/// Destination for events produced on the audio thread.
///
/// Implementations must not block or allocate. `emit` returns `false` when
/// the event could not be delivered.
pub trait EventSink {
    fn emit(&mut self, event: Event) -> bool;
}

impl EventSink for SpscProducer<Event> {
    #[inline]
    fn emit(&mut self, event: Event) -> bool {
        self.try_push(event).is_ok()
    }
}

/// Collects into a vector; used off the audio thread and in tests.
impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) -> bool {
        self.push(event);
        true
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    #[inline]
    fn emit(&mut self, _event: Event) -> bool {
        true
    }
}

/// Counts events that could not be delivered.
pub struct CountingSink<'a, S: EventSink + ?Sized> {
    inner: &'a mut S,
    dropped: u64,
}

impl<'a, S: EventSink + ?Sized> CountingSink<'a, S> {
    pub fn new(inner: &'a mut S) -> Self {
        Self { inner, dropped: 0 }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl<S: EventSink + ?Sized> EventSink for CountingSink<'_, S> {
    #[inline]
    fn emit(&mut self, event: Event) -> bool {
        let delivered = self.inner.emit(event);
        if !delivered {
            self.dropped += 1;
        }
        delivered
    }
}
