//! Sequencer integration tests
//!
//! Patterns and step patterns drive a `GateInstrument`, whose output is a
//! DC level while any note is held. Note timing shows up sample-accurately
//! in the rendered audio.

use crate::helpers::*;
use cadenza::prelude::*;
use cadenza::Step;

fn level(velocity: u8) -> f32 {
    f32::from(velocity) / 127.0
}

/// Engine with one sequencer track targeting a gate instrument on master.
fn gate_engine() -> (Controller, AudioCore, usize) {
    let (mut ctl, core) = test_engine();
    let master = master(&ctl);
    let gate = ctl.add_node(Box::new(GateInstrument::new())).unwrap();
    ctl.connect(gate, 0, master, 0).unwrap();
    let track = ctl.add_track("drums").unwrap();
    ctl.set_track_target(track, Some(gate)).unwrap();
    (ctl, core, track)
}

fn four_on_the_floor() -> StepPattern {
    let mut steps = StepPattern::new(16).unwrap();
    let row = steps.add_row(36, 9).unwrap();
    for i in [0, 4, 8, 12] {
        steps.set_step(row, i, Step::on(100)).unwrap();
    }
    steps
}

/// S1: kick on every quarter at 120 BPM, 48 kHz, 512-frame blocks.
#[test]
fn test_step_pattern_kick_every_quarter() {
    let (mut ctl, mut core, track) = gate_engine();
    ctl.set_step_pattern(track, Some(four_on_the_floor())).unwrap();
    ctl.play().unwrap();

    let mut runner = BlockRunner::new(TEST_BLOCK_SIZE);
    runner.run(&mut core, 1);
    // Exactly one note sounding, started at offset 0.
    assert_eq!(core.held_notes(track), 1);
    assert!((runner.rendered[0] - level(100)).abs() < FLOAT_EPSILON);

    runner.run_until(&mut core, 4 * SAMPLES_PER_BEAT);
    let rendered = &runner.rendered[..4 * SAMPLES_PER_BEAT];
    assert_eq!(onsets(rendered), vec![0, 24_000, 48_000, 72_000]);

    // Gate of 0.8 of a sixteenth: 4800 samples.
    for onset in [0, 24_000, 48_000, 72_000] {
        assert!((rendered[onset + 4_790] - level(100)).abs() < FLOAT_EPSILON);
        assert_silence(&rendered[onset + 4_810..onset + 24_000], "between kicks");
    }
}

/// S2: a note held across the loop end is cut at the seam and re-struck
/// after the wrap for the rest of its length.
#[test]
fn test_loop_wrap_across_held_note() {
    let (mut ctl, mut core, track) = gate_engine();
    let pattern = ctl.create_pattern("tail", 2.0).unwrap();
    ctl.add_pattern_event(pattern, PatternEvent::note(3.9, 64, 90, 0.2))
        .unwrap();
    ctl.place_pattern(pattern, track, 0.0).unwrap();
    ctl.set_loop(0.0, 4.0, true).unwrap();
    ctl.play().unwrap();

    let mut runner = BlockRunner::new(TEST_BLOCK_SIZE);
    runner.run_until(&mut core, 4 * SAMPLES_PER_BEAT + 4_000);
    let out = &runner.rendered;
    let on = level(90);

    // Note-on at beat 3.9.
    assert_silence(&out[..93_590], "before the note");
    assert!((out[93_610] - on).abs() < FLOAT_EPSILON);
    assert!((out[95_999] - on).abs() < FLOAT_EPSILON);
    // Re-struck at the loop start for the remaining 0.1 beat (2400 samples).
    assert!((out[96_000] - on).abs() < FLOAT_EPSILON);
    assert!((out[96_000 + 2_390] - on).abs() < FLOAT_EPSILON);
    assert_silence(&out[96_000 + 2_410..], "after the re-struck tail");
    assert_eq!(core.held_notes(track), 0);

    let wraps = ctl
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, Event::LoopWrapped { sample: 0 }))
        .count();
    assert_eq!(wraps, 1);
}

/// A note ending exactly on the loop end is not re-struck.
#[test]
fn test_note_ending_on_loop_end() {
    let (mut ctl, mut core, track) = gate_engine();
    let pattern = ctl.create_pattern("edge", 1.0).unwrap();
    ctl.add_pattern_event(pattern, PatternEvent::note(3.5, 60, 100, 0.5))
        .unwrap();
    ctl.place_pattern(pattern, track, 0.0).unwrap();
    ctl.set_loop(0.0, 4.0, true).unwrap();
    ctl.play().unwrap();

    let mut runner = BlockRunner::new(TEST_BLOCK_SIZE);
    runner.run_until(&mut core, 4 * SAMPLES_PER_BEAT + 4_000);
    assert!((runner.rendered[95_000] - level(100)).abs() < FLOAT_EPSILON);
    assert_silence(&runner.rendered[96_000..], "after the wrap");
}

/// All steps muted: no events, no note-offs, nothing sounding.
#[test]
fn test_muted_steps_emit_nothing() {
    let (mut ctl, mut core, track) = gate_engine();
    let mut steps = four_on_the_floor();
    for i in [0, 4, 8, 12] {
        let step = Step {
            mute: true,
            ..Step::on(100)
        };
        steps.set_step(0, i, step).unwrap();
    }
    ctl.set_step_pattern(track, Some(steps)).unwrap();
    ctl.play().unwrap();

    let out = render(&mut core, 200);
    assert_silence(&out, "muted steps");
    assert_eq!(core.held_notes(track), 0);
    assert!(!ctl
        .drain_events()
        .iter()
        .any(|e| matches!(e, Event::EventDropped { .. })));
}

#[test]
fn test_track_mute_silences_track() {
    let (mut ctl, mut core, track) = gate_engine();
    ctl.set_step_pattern(track, Some(four_on_the_floor())).unwrap();
    ctl.set_track_muted(track, true).unwrap();
    ctl.play().unwrap();
    assert_silence(&render(&mut core, 100), "muted track");
}

/// Stopping the transport releases every sounding note.
#[test]
fn test_stop_releases_notes() {
    let (mut ctl, mut core, track) = gate_engine();
    let pattern = ctl.create_pattern("pad", 4.0).unwrap();
    ctl.add_pattern_event(pattern, PatternEvent::note(0.0, 60, 127, 12.0))
        .unwrap();
    ctl.place_pattern(pattern, track, 0.0).unwrap();
    ctl.play().unwrap();

    let out = render(&mut core, 4);
    assert!((out[2_000] - 1.0).abs() < FLOAT_EPSILON);

    ctl.stop().unwrap();
    assert_silence(&render(&mut core, 1), "after stop");
}

/// Panic silences held notes while the transport keeps rolling.
#[test]
fn test_panic_releases_notes() {
    let (mut ctl, mut core, track) = gate_engine();
    let pattern = ctl.create_pattern("pad", 4.0).unwrap();
    ctl.add_pattern_event(pattern, PatternEvent::note(0.0, 60, 127, 12.0))
        .unwrap();
    ctl.place_pattern(pattern, track, 0.0).unwrap();
    ctl.play().unwrap();
    render(&mut core, 2);
    assert_eq!(core.held_notes(track), 1);

    ctl.panic().unwrap();
    let out = render(&mut core, 2);
    assert_silence(&out, "after panic");
    assert_eq!(core.held_notes(track), 0);
    assert_eq!(core.transport_state(), TransportState::Playing);
}

/// Instances placed later on the timeline play at their bar.
#[test]
fn test_pattern_instance_position() {
    let (mut ctl, mut core, track) = gate_engine();
    let pattern = ctl.create_pattern("hit", 1.0).unwrap();
    ctl.add_pattern_event(pattern, PatternEvent::note(0.0, 38, 127, 0.5))
        .unwrap();
    ctl.place_pattern(pattern, track, 1.0).unwrap();
    ctl.play().unwrap();

    let mut runner = BlockRunner::new(TEST_BLOCK_SIZE);
    runner.run_until(&mut core, 5 * SAMPLES_PER_BEAT);
    // Bar 1 in 4/4 starts at beat 4.
    assert_eq!(first_sound(&runner.rendered), Some(4 * SAMPLES_PER_BEAT));
}

/// Arrangement edits are validated on the control thread.
#[test]
fn test_arrangement_validation() {
    let (mut ctl, _core, track) = gate_engine();
    let pattern = ctl.create_pattern("p", 1.0).unwrap();
    assert!(ctl.place_pattern(pattern, track + 5, 0.0).is_err());
    assert!(ctl
        .add_pattern_event(pattern, PatternEvent::note(0.0, 200, 100, 1.0))
        .is_err());
    assert!(ctl.create_pattern("empty", 0.0).is_err());
    assert_eq!(ctl.arrangement().instances().len(), 0);
}
