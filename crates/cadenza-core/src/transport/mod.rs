//! Transport (play/stop/record/pause), block planning across loop seams,
//! and the lock-free position mirror.

mod fsm;
mod planner;
mod state;

pub use fsm::{TransitionResult, Transport, TransportCommand};
pub use planner::{BlockPlan, Segment, MAX_SEGMENTS};
pub use state::{TransportInfo, TransportSnapshot, TransportState};
