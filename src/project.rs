//! Persisted session state.
//!
//! A [`ProjectDocument`] captures what a user edits: the tempo and meter
//! maps, markers, loop and punch settings, the arrangement and the parameter
//! values of every node. It is plain serde data; pick any format. Graph
//! topology is not part of it, since processors are application types the
//! engine cannot reconstruct. Applications rebuild the graph first (node ids
//! are handed out in insertion order), then load the document.

use cadenza_core::{LoopRegion, Marker, MeterChange, MeterMap, NodeId, TempoMap, TempoPoint, TimeMap};
use cadenza_recorder::RecordMode;
use cadenza_sequencer::Arrangement;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::control::Controller;
use crate::error::{Error, Result};

/// Format version written by this build.
pub const PROJECT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub node: NodeId,
    /// Processor name at save time; a node with a different name at load
    /// time is not the same node.
    pub name: String,
    pub parameters: Vec<(u32, f32)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub version: u32,
    pub sample_rate: f64,
    pub tempo: Vec<TempoPoint>,
    pub meter: Vec<MeterChange>,
    pub markers: Vec<Marker>,
    pub loop_region: LoopRegion,
    pub record_mode: RecordMode,
    pub arrangement: Arrangement,
    pub nodes: Vec<NodeState>,
}

impl ProjectDocument {
    /// Rebuild the time map, validating every tempo point, meter change and
    /// marker.
    pub fn time_map(&self, sample_rate: f64) -> Result<TimeMap> {
        let tempo = TempoMap::from_points(&self.tempo)?;
        let meter = MeterMap::from_changes(&self.meter)?;
        let mut map = TimeMap::from_parts(tempo, meter, sample_rate);
        for marker in &self.markers {
            map.add_marker(marker.clone())?;
        }
        Ok(map)
    }
}

impl Controller {
    /// Snapshot the session.
    pub fn export_project(&self) -> ProjectDocument {
        let map = self.time_map();
        let nodes = self
            .nodes()
            .filter_map(|info| {
                let parameters = self.parameters(info.id).ok()?;
                (!parameters.is_empty()).then(|| NodeState {
                    node: info.id,
                    name: info.name.clone(),
                    parameters,
                })
            })
            .collect();
        let mut doc = ProjectDocument {
            version: PROJECT_VERSION,
            sample_rate: self.sample_rate(),
            tempo: map.tempo().points().to_vec(),
            meter: map.meter().changes().to_vec(),
            markers: map.markers().to_vec(),
            loop_region: self.loop_region(),
            record_mode: self.record_mode(),
            arrangement: self.arrangement().clone(),
            nodes,
        };
        doc.nodes.sort_by_key(|state| state.node);
        doc
    }

    /// Replace the session state with `doc`.
    ///
    /// Everything is validated before anything is applied. Parameter values
    /// for nodes that no longer exist (or now hold a different processor)
    /// are skipped with a warning.
    pub fn load_project(&mut self, doc: ProjectDocument) -> Result<()> {
        if doc.version != PROJECT_VERSION {
            return Err(Error::ProjectVersion {
                found: doc.version,
                expected: PROJECT_VERSION,
            });
        }
        let map = doc.time_map(self.sample_rate())?;
        doc.loop_region.validate()?;
        if doc.arrangement.tracks().len() > self.config().sequencer_tracks {
            return Err(cadenza_sequencer::Error::CapacityExceeded("sequencer tracks").into());
        }
        if let RecordMode::AutoPunch {
            punch_in,
            punch_out,
        } = doc.record_mode
        {
            if punch_in >= punch_out {
                return Err(cadenza_recorder::Error::InvalidArgument(format!(
                    "punch range {punch_in}..{punch_out} is empty"
                ))
                .into());
            }
        }
        if (doc.sample_rate - self.sample_rate()).abs() > 1e-6 {
            warn!(
                saved = doc.sample_rate,
                engine = self.sample_rate(),
                "project saved at a different sample rate"
            );
        }

        self.set_time_map(map)?;
        self.set_arrangement(doc.arrangement)?;
        let region = doc.loop_region;
        self.set_loop(region.start_beat, region.end_beat, region.enabled)?;
        self.set_record_mode(doc.record_mode)?;

        let mut restored = 0;
        for state in doc.nodes {
            let matches = self
                .node(state.node)
                .is_some_and(|info| info.name == state.name);
            if !matches {
                warn!(node = %state.node, name = %state.name, "skipping parameters of missing node");
                continue;
            }
            self.set_parameters(state.node, &state.parameters)?;
            restored += 1;
        }
        info!(nodes = restored, tracks = self.arrangement().tracks().len(), "project loaded");
        Ok(())
    }
}
