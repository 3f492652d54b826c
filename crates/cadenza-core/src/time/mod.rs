//! Time model: tempo curve, meter map, loop region and markers.

mod map;
mod meter;
mod region;
mod tempo;

pub use map::TimeMap;
pub use meter::{Bbt, MeterChange, MeterMap, TICKS_PER_BEAT};
pub use region::{LoopRegion, Marker, MarkerAction};
pub use tempo::{CurveKind, TempoMap, TempoPoint, MAX_BPM};
