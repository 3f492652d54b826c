//! Transport integration tests
//!
//! Tests the transport state machine as seen from the two engine halves:
//! commands go in through the controller, take effect on the next block and
//! come back as events.

use crate::helpers::*;
use approx::assert_relative_eq;
use cadenza::prelude::*;
use cadenza::{CurveKind, Marker, MarkerAction};
use proptest::prelude::*;

fn state_changes(events: &[Event]) -> Vec<TransportState> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::TransportStateChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

/// Play and stop take effect on the next block and are reported once.
#[test]
fn test_transport_play_stop() {
    let (mut ctl, mut core) = test_engine();
    assert_eq!(core.transport_state(), TransportState::Stopped);

    ctl.play().unwrap();
    render(&mut core, 4);
    assert_eq!(core.transport_state(), TransportState::Playing);
    assert_eq!(core.playhead(), 4 * TEST_BLOCK_SIZE as u64);
    assert!(ctl.transport().state().is_rolling());

    ctl.stop().unwrap();
    render(&mut core, 1);
    assert_eq!(core.transport_state(), TransportState::Stopped);
    // Stop returns to where play started.
    assert_eq!(core.playhead(), 0);

    let events = ctl.drain_events();
    assert_eq!(
        state_changes(&events),
        vec![TransportState::Playing, TransportState::Stopped]
    );
}

/// The playhead does not move while stopped or paused.
#[test]
fn test_transport_pause_holds_position() {
    let (mut ctl, mut core) = test_engine();
    ctl.play().unwrap();
    render(&mut core, 3);
    ctl.pause().unwrap();
    render(&mut core, 3);
    assert_eq!(core.transport_state(), TransportState::Paused);
    assert_eq!(core.playhead(), 3 * TEST_BLOCK_SIZE as u64);

    ctl.play().unwrap();
    render(&mut core, 1);
    assert_eq!(core.playhead(), 4 * TEST_BLOCK_SIZE as u64);
}

/// Seek lands on the exact sample and is reported as a position change.
#[test]
fn test_transport_seek() {
    let (mut ctl, mut core) = test_engine();
    ctl.seek(4.0).unwrap();
    render(&mut core, 1);
    assert_eq!(core.playhead(), 4 * SAMPLES_PER_BEAT as u64);
    assert_eq!(ctl.transport().playhead_sample(), 4 * SAMPLES_PER_BEAT as u64);

    let events = ctl.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::PositionChanged { sample, .. } if *sample == 4 * SAMPLES_PER_BEAT as u64
    )));

    // Seeking to the same beat again changes nothing.
    ctl.seek(4.0).unwrap();
    render(&mut core, 1);
    assert_eq!(core.playhead(), 4 * SAMPLES_PER_BEAT as u64);
    let events = ctl.drain_events();
    assert!(!events
        .iter()
        .any(|e| matches!(e, Event::PositionChanged { .. })));
}

#[test]
fn test_transport_seek_rejects_bad_beats() {
    let (mut ctl, _core) = test_engine();
    assert_eq!(ctl.seek(f64::NAN).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(ctl.seek(-1.0).unwrap_err().kind(), ErrorKind::InvalidArgument);
}

/// Stopping twice returns to the start of the timeline.
#[test]
fn test_transport_stop_twice_returns_to_zero() {
    let (mut ctl, mut core) = test_engine();
    ctl.seek(2.0).unwrap();
    ctl.play().unwrap();
    render(&mut core, 2);
    ctl.stop().unwrap();
    render(&mut core, 1);
    assert_eq!(core.playhead(), 2 * SAMPLES_PER_BEAT as u64);

    ctl.stop().unwrap();
    render(&mut core, 1);
    assert_eq!(core.playhead(), 0);
}

/// Looping one beat wraps the playhead and reports the wrap.
#[test]
fn test_transport_loop_wraps() {
    let (mut ctl, mut core) = test_engine();
    ctl.set_loop(0.0, 1.0, true).unwrap();
    ctl.play().unwrap();

    // 48 blocks = 24576 samples, one beat is 24000.
    render(&mut core, 48);
    assert_eq!(core.playhead(), 48 * TEST_BLOCK_SIZE as u64 - SAMPLES_PER_BEAT as u64);
    assert!(ctl.transport().is_looping());

    let events = ctl.drain_events();
    let wraps: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            Event::LoopWrapped { sample } => Some(*sample),
            _ => None,
        })
        .collect();
    assert_eq!(wraps, vec![0]);
}

/// A block ending exactly on the loop end wraps without losing frames.
#[test]
fn test_transport_block_aligned_with_loop_end() {
    let (mut ctl, mut core) = prepared(test_builder().max_block_size(480));
    ctl.set_loop(0.0, 1.0, true).unwrap();
    ctl.play().unwrap();

    let mut runner = BlockRunner::new(480);
    runner.run(&mut core, 50);
    assert_eq!(runner.rendered.len(), SAMPLES_PER_BEAT);
    assert_eq!(core.playhead(), 0);

    runner.run(&mut core, 1);
    assert_eq!(core.playhead(), 480);
    let events = ctl.drain_events();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Event::LoopWrapped { .. }))
            .count(),
        1
    );
}

/// A zero-frame block neither renders nor advances the transport.
#[test]
fn test_zero_frame_block_is_noop() {
    let (mut ctl, mut core) = test_engine();
    ctl.play().unwrap();
    let input = AudioBlock::new(2, TEST_BLOCK_SIZE);
    let mut output = AudioBlock::filled(2, TEST_BLOCK_SIZE, 0.7);

    core.process(&input, &mut output, 0).unwrap();
    assert_eq!(core.playhead(), 0);
    assert_eq!(core.transport_state(), TransportState::Stopped);
    assert!(ctl.drain_events().is_empty());
}

/// Processing before prepare silences the output and reports it.
#[test]
fn test_process_before_prepare() {
    let (_ctl, mut core) = test_builder().build().unwrap();
    let input = AudioBlock::new(2, TEST_BLOCK_SIZE);
    let mut output = AudioBlock::filled(2, TEST_BLOCK_SIZE, 0.7);

    let err = core.process(&input, &mut output, TEST_BLOCK_SIZE).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotPrepared);
    assert_silence(output.channel(0), "unprepared output");
}

#[test]
fn test_prepare_validates_driver_format() {
    let (_ctl, mut core) = test_builder().build().unwrap();
    assert!(core.prepare(44_100.0, TEST_BLOCK_SIZE).is_err());
    assert!(core.prepare(TEST_SAMPLE_RATE, TEST_BLOCK_SIZE * 2).is_err());
    assert!(core.prepare(TEST_SAMPLE_RATE, 0).is_err());
    core.prepare(TEST_SAMPLE_RATE, 256).unwrap();

    let input = AudioBlock::new(2, TEST_BLOCK_SIZE);
    let mut output = AudioBlock::new(2, TEST_BLOCK_SIZE);
    let err = core.process(&input, &mut output, 300).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);

    core.release();
    assert!(!core.is_prepared());
    let err = core.process(&input, &mut output, 128).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotPrepared);
}

/// Tempo edits are published to the audio thread and reported back.
#[test]
fn test_tempo_change_moves_beats() {
    let (mut ctl, mut core) = test_engine();
    ctl.set_tempo(60.0).unwrap();
    ctl.seek(1.0).unwrap();
    render(&mut core, 1);
    // One beat at 60 BPM is a full second.
    assert_eq!(core.playhead(), 48_000);
    assert_relative_eq!(ctl.transport().bpm(), 60.0, epsilon = 1e-9);

    let events = ctl.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::TempoChanged { bpm } if (*bpm - 60.0).abs() < 1e-9)));
}

/// A stop marker halts the transport on its exact sample.
#[test]
fn test_stop_marker() {
    let (mut ctl, mut core) = test_engine();
    ctl.add_marker(Marker::new(1.0, "end").with_action(MarkerAction::Stop))
        .unwrap();
    ctl.play().unwrap();
    render(&mut core, 50);

    assert_eq!(core.transport_state(), TransportState::Stopped);
    let events = ctl.drain_events();
    assert_eq!(
        state_changes(&events),
        vec![TransportState::Playing, TransportState::Stopped]
    );
}

/// Interleaved driver buffers render the same signal as planar blocks.
#[test]
fn test_process_interleaved() {
    let (mut ctl, mut core) = test_engine();
    let source = ctl.add_node(Box::new(ConstantSource::new(0.25, 2))).unwrap();
    ctl.connect(source, 0, master(&ctl), 0).unwrap();

    let input = vec![0.0f32; TEST_BLOCK_SIZE * 2];
    let mut output = vec![1.0f32; TEST_BLOCK_SIZE * 2];
    core.process_interleaved(&input, 2, &mut output, 2).unwrap();
    assert!(output.iter().all(|s| (s - 0.25).abs() < FLOAT_EPSILON));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Beat to sample and back lands on the same beat, whatever the tempo map.
    #[test]
    fn prop_beat_sample_round_trip(
        points in proptest::collection::vec((0.5f64..64.0, 20.0f64..400.0, 0usize..3), 0..6),
        first_bpm in 20.0f64..400.0,
        beat in 0.0f64..128.0,
    ) {
        let (mut ctl, _core) = test_builder().tempo(first_bpm).build().unwrap();
        for (at, bpm, curve) in points {
            let curve = [CurveKind::Step, CurveKind::Linear, CurveKind::Exponential][curve];
            ctl.set_tempo_point(at, bpm, curve).unwrap();
        }
        let map = ctl.time_map();
        let back = map.sample_to_beat(map.beat_to_sample(beat));
        prop_assert!((back - beat).abs() < BEAT_EPSILON, "{} -> {}", beat, back);
    }
}
