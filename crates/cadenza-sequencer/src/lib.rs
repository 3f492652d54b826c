//! Pattern arrangement and step sequencing.
//!
//! The control thread edits an [`Arrangement`] (tracks, a [`PatternBank`],
//! pattern instances and optional [`StepPattern`] grids) and publishes
//! [`ArrangementSnapshot`]s. On the audio thread a [`MidiScheduler`] walks
//! the transport's segments and fills one [`MidiBuffer`] per track.
//!
//! ```
//! use cadenza_core::{NullSink, TimeMap, Transport, TransportCommand};
//! use cadenza_sequencer::{Arrangement, MidiScheduler, Step, StepPattern};
//!
//! let map = TimeMap::default();
//! let mut arrangement = Arrangement::new();
//! let track = arrangement.add_track("kick");
//! let mut grid = StepPattern::new(16).unwrap();
//! let row = grid.add_row(36, 9).unwrap();
//! grid.set_step(row, 0, Step::on(100)).unwrap();
//! arrangement.set_step_pattern(track, Some(grid)).unwrap();
//! let snapshot = arrangement.snapshot(&map);
//!
//! let mut transport = Transport::new();
//! transport.apply(TransportCommand::Play, &map);
//! let mut scheduler = MidiScheduler::new(1, 64);
//! let plan = transport.plan_block(512, &map);
//! scheduler.begin_block();
//! for segment in plan.segments() {
//!     scheduler.render_segment(segment, plan.loop_region, &snapshot, &map, &mut NullSink);
//! }
//! assert_eq!(scheduler.output(track).unwrap().len(), 1);
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod rng;

mod index;
pub use index::{Interval, IntervalIndex};

pub mod pattern;
pub use pattern::{Pattern, PatternBank, PatternEvent, PatternEventKind, PatternId};

pub mod step;
pub use step::{Step, StepNote, StepPattern, StepRow};

mod notes;
pub use notes::{ActiveNotes, HeldNote, NoteSource};

pub mod arrangement;
pub use arrangement::{
    Arrangement, ArrangementSnapshot, InstanceId, PatternInstance, ResolvedInstance, Track,
    TrackPlan, DEFAULT_GRID_BARS,
};

pub mod scheduler;
pub use scheduler::{MidiScheduler, MAX_HELD_NOTES};

pub use cadenza_midi::MidiBuffer;
