//! Project integration tests
//!
//! The persisted document is plain serde data; bincode stands in for
//! whatever format an application picks.

use crate::helpers::*;
use cadenza::dsp_nodes::gain;
use cadenza::prelude::*;
use cadenza::{CurveKind, Marker, MarkerAction, ProjectDocument, Step, PROJECT_VERSION};

/// Graph every session in this file is rebuilt with: a gate instrument
/// through a fader into master.
fn build_graph(ctl: &mut Controller) -> (NodeId, NodeId) {
    let master = master(ctl);
    let gate = ctl.add_node(Box::new(GateInstrument::new())).unwrap();
    let fader = ctl.add_node(Box::new(GainNode::unity())).unwrap();
    ctl.connect(gate, 0, fader, 0).unwrap();
    ctl.connect(fader, 0, master, 0).unwrap();
    (gate, fader)
}

fn session() -> (Controller, AudioCore) {
    let (mut ctl, core) = test_engine();
    let (gate, fader) = build_graph(&mut ctl);
    ctl.set_parameter(fader, gain::LEVEL as u32, -3.0, 0.0)
        .unwrap();

    ctl.set_tempo_point(8.0, 90.0, CurveKind::Linear).unwrap();
    ctl.set_tempo_point(16.0, 140.0, CurveKind::Step).unwrap();
    ctl.set_meter(4.0, 3, 4).unwrap();
    ctl.add_marker(Marker::new(2.0, "verse")).unwrap();
    ctl.add_marker(Marker::new(64.0, "end").with_action(MarkerAction::Stop))
        .unwrap();
    ctl.set_loop(0.0, 8.0, false).unwrap();
    ctl.set_punch_range(4.0, 12.0).unwrap();

    let drums = ctl.add_track("drums").unwrap();
    let mut steps = StepPattern::new(16).unwrap();
    let row = steps.add_row(36, 9).unwrap();
    steps.set_step(row, 0, Step::on(110)).unwrap();
    steps.set_step(row, 8, Step::on(90)).unwrap();
    steps.set_swing(0.3);
    ctl.set_step_pattern(drums, Some(steps)).unwrap();
    ctl.set_track_target(drums, Some(gate)).unwrap();

    let keys = ctl.add_track("keys").unwrap();
    let riff = ctl.create_pattern("riff", 1.0).unwrap();
    ctl.add_pattern_event(riff, PatternEvent::note(0.5, 60, 100, 0.25))
        .unwrap();
    ctl.add_pattern_event(riff, PatternEvent::note(2.75, 67, 80, 0.5))
        .unwrap();
    ctl.place_pattern(riff, keys, 0.0).unwrap();
    ctl.place_pattern(riff, keys, 2.0).unwrap();
    ctl.set_track_target(keys, Some(gate)).unwrap();
    (ctl, core)
}

/// serialize, deserialize, serialize again: the bytes do not change.
#[test]
fn test_bincode_round_trip_is_bit_identical() {
    let (ctl, _core) = session();
    let doc = ctl.export_project();
    assert_eq!(doc.version, PROJECT_VERSION);
    assert_eq!(doc.arrangement.tracks().len(), 2);
    assert_eq!(doc.tempo.len(), 3);

    let bytes = bincode::serialize(&doc).unwrap();
    let back: ProjectDocument = bincode::deserialize(&bytes).unwrap();
    assert_eq!(back, doc);
    assert_eq!(bincode::serialize(&back).unwrap(), bytes);
}

/// A loaded session exports the same document and renders the same audio.
#[test]
fn test_load_restores_session() {
    let (mut original, mut original_core) = session();
    let doc = original.export_project();
    let bytes = bincode::serialize(&doc).unwrap();

    let (mut restored, mut restored_core) = test_engine();
    build_graph(&mut restored);
    restored
        .load_project(bincode::deserialize(&bytes).unwrap())
        .unwrap();
    assert_eq!(restored.export_project(), doc);

    original.play().unwrap();
    restored.play().unwrap();
    let expected = render(&mut original_core, 200);
    let actual = render(&mut restored_core, 200);
    assert!(peak(&expected) > 0.1);
    assert_eq!(expected, actual);
}

/// Parameters of nodes that are not in the graph are skipped.
#[test]
fn test_load_skips_missing_nodes() {
    let (original, _core) = session();
    let doc = original.export_project();
    assert!(!doc.nodes.is_empty());

    let (mut bare, _bare_core) = test_engine();
    bare.load_project(doc.clone()).unwrap();
    let loaded = bare.export_project();
    assert_eq!(loaded.arrangement, doc.arrangement);
    assert_eq!(loaded.tempo, doc.tempo);
    assert!(loaded.nodes.iter().all(|n| n.name == "master"));
}

#[test]
fn test_load_rejects_future_version() {
    let (original, _core) = session();
    let mut doc = original.export_project();
    doc.version = PROJECT_VERSION + 1;

    let (mut other, _other_core) = test_engine();
    let err = other.load_project(doc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(other.arrangement().tracks().is_empty());
}
