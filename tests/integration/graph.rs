//! Graph integration tests
//!
//! Tests graph construction and routing through the controller, and what
//! the audio thread renders from it: cycle rejection, fault isolation,
//! sidechain keying and deterministic output.

use crate::helpers::*;
use cadenza::dsp_nodes::{gain, FaultInjector};
use cadenza::prelude::*;
use cadenza::{FeedbackDelay, ImpulseSource, NodeFault, SidechainCompressor};
use proptest::prelude::*;

/// Nodes summed into the master bus reach the output.
#[test]
fn test_sources_sum_into_master() {
    let (mut ctl, mut core) = test_engine();
    let master = master(&ctl);
    let a = ctl.add_node(Box::new(ConstantSource::new(0.25, 2))).unwrap();
    let b = ctl.add_node(Box::new(ConstantSource::new(0.125, 1))).unwrap();
    ctl.connect(a, 0, master, 0).unwrap();
    ctl.connect(b, 0, master, 0).unwrap();

    let mut runner = BlockRunner::new(TEST_BLOCK_SIZE);
    runner.run(&mut core, 1);
    for ch in 0..2 {
        assert!(runner
            .output()
            .channel(ch)
            .iter()
            .all(|s| (s - 0.375).abs() < FLOAT_EPSILON));
    }
}

/// Master is the last node in processing order and cannot be removed.
#[test]
fn test_master_is_protected() {
    let (mut ctl, _core) = test_engine();
    let master = master(&ctl);
    let source = ctl.add_node(Box::new(ConstantSource::new(0.5, 2))).unwrap();
    ctl.connect(source, 0, master, 0).unwrap();

    assert_eq!(ctl.processing_order().last(), Some(&master));
    let err = ctl.remove_node(master).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TopologyViolation);
    assert!(ctl.node(master).is_some());
}

/// S5: closing a cycle between two effects is refused and changes nothing.
#[test]
fn test_cycle_rejection() {
    let (mut ctl, mut core) = test_engine();
    let master = master(&ctl);
    let effect1 = ctl.add_node(Box::new(GainNode::unity())).unwrap();
    let effect2 = ctl.add_node(Box::new(GainNode::unity())).unwrap();
    ctl.connect(effect1, 0, effect2, 0).unwrap();
    ctl.connect(effect2, 0, master, 0).unwrap();
    render(&mut core, 1);

    let connections_before: Vec<_> = ctl.connections().cloned().collect();
    let order_before = ctl.processing_order();
    let generation_before = core.graph_generation();

    let err = ctl.connect(effect2, 0, effect1, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TopologyViolation);

    let connections_after: Vec<_> = ctl.connections().cloned().collect();
    assert_eq!(connections_after, connections_before);
    assert_eq!(ctl.processing_order(), order_before);
    render(&mut core, 1);
    assert_eq!(core.graph_generation(), generation_before);
}

/// A feedback delay of at least one block may close a loop.
#[test]
fn test_feedback_through_delay_is_allowed() {
    let (mut ctl, mut core) = test_engine();
    let master = master(&ctl);
    let source = ctl.add_node(Box::new(ImpulseSource::new(4096, 1.0))).unwrap();
    let mix = ctl.add_node(Box::new(GainNode::unity())).unwrap();
    let delay = ctl
        .add_node(Box::new(FeedbackDelay::new(TEST_BLOCK_SIZE, 0.5)))
        .unwrap();
    ctl.connect(source, 0, mix, 0).unwrap();
    ctl.connect(mix, 0, delay, 0).unwrap();
    ctl.connect(delay, 0, mix, 0).unwrap();
    ctl.connect(mix, 0, master, 0).unwrap();

    let out = render(&mut core, 8);
    assert!(out.iter().all(|s| s.is_finite()));
    assert!(peak(&out) > 0.5);
}

#[test]
fn test_connection_type_checks() {
    let (mut ctl, _core) = test_engine();
    let source = ctl.add_node(Box::new(ConstantSource::new(0.5, 2))).unwrap();
    let gate = ctl.add_node(Box::new(GateInstrument::new())).unwrap();
    let effect = ctl.add_node(Box::new(GainNode::unity())).unwrap();

    // Audio-only nodes have no MIDI ports and no sidechain.
    let err = ctl.connect_midi(source, gate).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TopologyViolation);
    let err = ctl.connect_sidechain(source, 0, effect).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TopologyViolation);
    let err = ctl.connect(source, 3, effect, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TopologyViolation);
    let err = ctl.connect(effect, 0, effect, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TopologyViolation);

    ctl.connect(source, 0, effect, 0).unwrap();
    let err = ctl.connect(source, 0, effect, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TopologyViolation);
}

/// S6: a node that fails is silenced from that block on and reported once;
/// everything else keeps playing.
#[test]
fn test_node_fault_is_isolated() {
    let (mut ctl, mut core) = test_engine();
    let master = master(&ctl);
    let healthy = ctl.add_node(Box::new(ConstantSource::new(0.5, 2))).unwrap();
    let faulty = ctl
        .add_node(Box::new(FaultInjector::new(0.25, 3, NodeFault::Code(7))))
        .unwrap();
    ctl.connect(healthy, 0, master, 0).unwrap();
    ctl.connect(faulty, 0, master, 0).unwrap();

    let mut runner = BlockRunner::new(TEST_BLOCK_SIZE);
    for block in 0..8 {
        let out = runner.block(&mut core);
        let expected = if block < 3 { 0.75 } else { 0.5 };
        assert!(
            out.iter().all(|s| (s - expected).abs() < FLOAT_EPSILON),
            "block {block}: expected {expected}, got {}",
            out[0]
        );
    }

    let failures: Vec<_> = ctl
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            Event::NodeFailed { node, fault } => Some((node, fault)),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![(faulty, NodeFault::Code(7))]);
}

/// Non-finite output counts as a fault too.
#[test]
fn test_non_finite_output_is_caught() {
    let (mut ctl, mut core) = test_engine();
    let master = master(&ctl);
    let faulty = ctl.add_node(Box::new(FaultInjector::non_finite(1))).unwrap();
    ctl.connect(faulty, 0, master, 0).unwrap();

    let out = render(&mut core, 3);
    assert!(out.iter().all(|s| s.is_finite()));
    assert_silence(&out[TEST_BLOCK_SIZE..], "after the fault");
    assert!(ctl.drain_events().iter().any(|e| matches!(
        e,
        Event::NodeFailed { node, fault: NodeFault::NonFinite } if *node == faulty
    )));
}

/// Resetting a failed node brings it back with fresh state.
#[test]
fn test_reset_node_recovers_from_fault() {
    let (mut ctl, mut core) = test_engine();
    let master = master(&ctl);
    let faulty = ctl
        .add_node(Box::new(FaultInjector::new(0.25, 2, NodeFault::InvalidState)))
        .unwrap();
    ctl.connect(faulty, 0, master, 0).unwrap();

    let out = render(&mut core, 3);
    assert_silence(&out[2 * TEST_BLOCK_SIZE..], "failed node");

    ctl.reset_node(faulty).unwrap();
    render(&mut core, 1);
    ctl.maintain();

    let out = render(&mut core, 1);
    assert!((out[0] - 0.25).abs() < FLOAT_EPSILON);
}

/// Stepped parameter changes apply on the next block; ramps land on target.
#[test]
fn test_set_parameter() {
    let (mut ctl, mut core) = test_engine();
    let master = master(&ctl);
    let source = ctl.add_node(Box::new(ConstantSource::new(0.5, 2))).unwrap();
    let fader = ctl.add_node(Box::new(GainNode::unity())).unwrap();
    ctl.connect(source, 0, fader, 0).unwrap();
    ctl.connect(fader, 0, master, 0).unwrap();

    let level = gain::LEVEL as u32;
    ctl.set_parameter(fader, level, -6.0, 0.0).unwrap();
    let out = render(&mut core, 1);
    let expected = 0.5 * 10f32.powf(-6.0 / 20.0);
    assert!((out[0] - expected).abs() < DSP_EPSILON);
    assert!((ctl.parameter(fader, level).unwrap() + 6.0).abs() < FLOAT_EPSILON);

    ctl.set_parameter(fader, level, 0.0, 5.0).unwrap();
    let out = render(&mut core, 2);
    assert!((out.last().copied().unwrap() - 0.5).abs() < DSP_EPSILON);

    // Values are clamped to the declared range.
    let clamped = ctl.set_parameter(fader, level, 500.0, 0.0).unwrap();
    assert!(clamped < 500.0);
    let err = ctl.set_parameter(fader, 99, 0.0, 0.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = ctl.set_parameter(fader, level, f32::NAN, 0.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_muted_node_is_silent() {
    let (mut ctl, mut core) = test_engine();
    let master = master(&ctl);
    let source = ctl.add_node(Box::new(ConstantSource::new(0.5, 2))).unwrap();
    ctl.connect(source, 0, master, 0).unwrap();
    ctl.set_node_muted(source, true).unwrap();
    assert_silence(&render(&mut core, 1), "muted source");

    ctl.set_node_muted(source, false).unwrap();
    assert!((render(&mut core, 1)[0] - 0.5).abs() < FLOAT_EPSILON);
}

/// Metered nodes publish levels at the metering interval.
#[test]
fn test_metering_events() {
    let (mut ctl, mut core) = test_engine();
    let master = master(&ctl);
    let source = ctl.add_node(Box::new(ConstantSource::new(0.5, 2))).unwrap();
    ctl.connect(source, 0, master, 0).unwrap();
    ctl.set_node_metered(source, true).unwrap();
    render(&mut core, 8);

    let readings: Vec<f32> = ctl
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Metering { node, peak_l, .. } if node == source => Some(peak_l),
            _ => None,
        })
        .collect();
    assert_eq!(readings.len(), 2);
    assert!(readings.iter().all(|p| (p - 0.5).abs() < DSP_EPSILON));
}

/// S4: a kick on the sidechain ducks the bass, which then recovers.
#[test]
fn test_sidechain_compression() {
    let (mut ctl, mut core) = test_engine();
    let master = master(&ctl);
    let kick = ctl
        .add_node(Box::new(ImpulseSource::new(2 * SAMPLES_PER_BEAT, 1.0)))
        .unwrap();
    let bass = ctl.add_node(Box::new(ConstantSource::new(0.1, 2))).unwrap();
    let compressor = SidechainCompressor::new(-20.0, 10.0, 0.001, 0.02);
    let gain_reduction = compressor.gain_reduction_meter();
    let compressor = ctl.add_node(Box::new(compressor)).unwrap();

    ctl.connect(kick, 0, master, 0).unwrap();
    ctl.connect(bass, 0, compressor, 0).unwrap();
    ctl.connect(compressor, 0, master, 0).unwrap();
    ctl.connect_sidechain(kick, 0, compressor).unwrap();

    let mut runner = BlockRunner::new(TEST_BLOCK_SIZE);
    runner.run(&mut core, 1);
    // Reduction is well under way within the first block.
    assert!(gain_reduction.get() > 6.0, "reduction {}", gain_reduction.get());
    // One attack time after the kick the bass is ducked.
    assert!(runner.rendered[200] < 0.05, "bass at {}", runner.rendered[200]);

    runner.run_until(&mut core, SAMPLES_PER_BEAT);
    assert!(gain_reduction.get() < 0.5, "reduction {}", gain_reduction.get());
    assert!((runner.rendered[SAMPLES_PER_BEAT - 1] - 0.1).abs() < PERCEPTUAL_EPSILON * 10.0);
}

/// Without a key the same bass, sitting at the threshold, passes untouched.
#[test]
fn test_compressor_without_sidechain_key() {
    let (mut ctl, mut core) = test_engine();
    let master = master(&ctl);
    let bass = ctl.add_node(Box::new(ConstantSource::new(0.1, 2))).unwrap();
    let compressor = SidechainCompressor::new(-20.0, 10.0, 0.001, 0.02);
    let gain_reduction = compressor.gain_reduction_meter();
    let compressor = ctl.add_node(Box::new(compressor)).unwrap();
    ctl.connect(bass, 0, compressor, 0).unwrap();
    ctl.connect(compressor, 0, master, 0).unwrap();

    let out = render(&mut core, 2);
    assert!(gain_reduction.get() < DSP_EPSILON);
    assert!((out[700] - 0.1).abs() < DSP_EPSILON);
}

fn feedback_engine() -> (Controller, AudioCore) {
    let (mut ctl, core) = test_engine();
    let master = master(&ctl);
    let source = ctl.add_node(Box::new(ImpulseSource::new(1000, 0.8))).unwrap();
    let delay = ctl
        .add_node(Box::new(FeedbackDelay::new(700, 0.6).with_mix(0.5)))
        .unwrap();
    let compressor = ctl
        .add_node(Box::new(SidechainCompressor::new(-12.0, 4.0, 0.005, 0.05)))
        .unwrap();
    ctl.connect(source, 0, delay, 0).unwrap();
    ctl.connect(delay, 0, compressor, 0).unwrap();
    ctl.connect_sidechain(source, 0, compressor).unwrap();
    ctl.connect(compressor, 0, master, 0).unwrap();
    (ctl, core)
}

/// Identical graphs render bit-identical output.
#[test]
fn test_rendering_is_deterministic() {
    let (_a, mut core_a) = feedback_engine();
    let (_b, mut core_b) = feedback_engine();
    let out_a = render(&mut core_a, 32);
    let out_b = render(&mut core_b, 32);
    assert!(peak(&out_a) > 0.1);
    assert_eq!(out_a, out_b);
}

/// Unity gain stages leave the signal untouched.
#[test]
fn test_unity_stages_are_transparent() {
    let impulses = |stages: usize| {
        let (mut ctl, mut core) = test_engine();
        let master = master(&ctl);
        let mut tail = ctl.add_node(Box::new(ImpulseSource::new(1000, 0.8))).unwrap();
        for _ in 0..stages {
            let stage = ctl.add_node(Box::new(GainNode::unity())).unwrap();
            ctl.connect(tail, 0, stage, 0).unwrap();
            tail = stage;
        }
        ctl.connect(tail, 0, master, 0).unwrap();
        render(&mut core, 8)
    };

    let direct = impulses(0);
    let chained = impulses(3);
    assert!(peak(&direct) > 0.1);
    if let Err((index, diff)) = compare_audio(&direct, &chained, FLOAT_EPSILON) {
        panic!("outputs diverge at sample {index} by {diff}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Processing order respects every connection, whatever the DAG.
    #[test]
    fn prop_processing_order_is_topological(
        count in 2usize..10,
        raw_edges in proptest::collection::vec((0usize..10, 0usize..10), 0..30),
    ) {
        let (mut ctl, _core) = test_builder().build().unwrap();
        let master = master(&ctl);
        let nodes: Vec<NodeId> = (0..count)
            .map(|_| ctl.add_node(Box::new(GainNode::unity())).unwrap())
            .collect();

        let mut edges: Vec<(usize, usize)> = raw_edges
            .into_iter()
            .map(|(a, b)| (a % count, b % count))
            .filter(|(a, b)| a < b)
            .collect();
        edges.sort_unstable();
        edges.dedup();
        for (a, b) in edges {
            ctl.connect(nodes[a], 0, nodes[b], 0).unwrap();
        }
        ctl.connect(nodes[count - 1], 0, master, 0).unwrap();

        let order = ctl.processing_order();
        prop_assert_eq!(order.len(), count + 1);
        let position = |id: NodeId| order.iter().position(|n| *n == id).unwrap();
        for connection in ctl.connections() {
            prop_assert!(position(connection.source) < position(connection.dest));
        }
    }

    /// Inserting a node and removing it again leaves the output as if it
    /// had never been there.
    #[test]
    fn prop_insert_then_remove_restores_output(
        interval in 64usize..4000,
        level_db in -24.0f32..6.0,
        inserted_blocks in 1usize..6,
        compared_blocks in 1usize..6,
    ) {
        let setup = || {
            let (mut ctl, core) = test_engine();
            let master = master(&ctl);
            let source = ctl.add_node(Box::new(ImpulseSource::new(interval, 0.9))).unwrap();
            ctl.connect(source, 0, master, 0).unwrap();
            (ctl, core, source, master)
        };
        let (_reference, mut reference_core, _, _) = setup();
        let (mut ctl, mut core, source, master) = setup();

        let inserted = ctl.add_node(Box::new(GainNode::new(level_db))).unwrap();
        ctl.connect(source, 0, inserted, 0).unwrap();
        ctl.connect(inserted, 0, master, 0).unwrap();
        render(&mut reference_core, inserted_blocks);
        render(&mut core, inserted_blocks);

        let removed = ctl.remove_node(inserted).unwrap();
        prop_assert_eq!(removed.len(), 2);
        let expected = render(&mut reference_core, compared_blocks);
        let actual = render(&mut core, compared_blocks);
        prop_assert_eq!(expected, actual);
    }
}
