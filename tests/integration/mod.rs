//! Integration test modules for Cadenza
//!
//! Test categories:
//! - transport: Play/stop/seek/loop operations and the tempo map
//! - graph: Audio graph construction, routing and fault isolation
//! - sequencer: Step patterns and loop wrap behaviour
//! - recorder: Armed capture and take export
//! - project: Session save/load

pub mod graph;
pub mod project;
pub mod recorder;
pub mod sequencer;
pub mod transport;
