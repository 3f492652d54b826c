//! Recorder integration tests
//!
//! Armed tracks capture the driver input while the transport records.
//! Blocks of 480 frames keep ten seconds at 48 kHz a whole number of blocks.

use crate::helpers::*;
use approx::assert_relative_eq;
use cadenza::prelude::*;
use cadenza::{MemoryWriter, RecordMode, WavFileWriter};

const BLOCK: usize = 480;

fn recording_engine() -> (Controller, AudioCore) {
    prepared(
        test_builder()
            .max_block_size(BLOCK)
            .max_recording_seconds(12.0)
            .recording_tracks(2),
    )
}

fn input_runner(value: f32) -> BlockRunner {
    BlockRunner::with_input(constant_input(value, 2, BLOCK), BLOCK)
}

/// S3: track 0 plays a pattern while track 1 records ten seconds of a
/// constant input, monitored.
#[test]
fn test_record_while_play() {
    let (mut ctl, mut core) = recording_engine();
    let master = master(&ctl);
    let gate = ctl.add_node(Box::new(GateInstrument::new())).unwrap();
    ctl.connect(gate, 0, master, 0).unwrap();
    let lead = ctl.add_track("lead").unwrap();
    ctl.set_track_target(lead, Some(gate)).unwrap();
    let pattern = ctl.create_pattern("riff", 1.0).unwrap();
    ctl.add_pattern_event(pattern, PatternEvent::note(0.0, 60, 127, 0.5))
        .unwrap();
    ctl.place_pattern(pattern, lead, 0.0).unwrap();

    ctl.arm_track(1, true).unwrap();
    ctl.set_monitoring(1, true).unwrap();
    ctl.record(0.0, 0).unwrap();

    let mut runner = input_runner(0.5);
    runner.run(&mut core, 1);
    assert!(core.is_capturing(1));
    assert!(!core.is_capturing(0));
    // Monitored input plus the note on track 0.
    assert_relative_eq!(runner.rendered[0], 1.5, epsilon = FLOAT_EPSILON);

    runner.run(&mut core, 999);
    assert_eq!(core.playhead(), 480_000);
    ctl.stop().unwrap();
    runner.run(&mut core, 1);
    assert!(!core.is_capturing(1));

    let take = ctl.take_view(1).unwrap();
    assert_eq!(take.frames(), 480_000);
    assert_eq!(take.channels(), 1);
    assert_eq!(take.start_sample(), 0);
    assert!(take.channel(0).iter().all(|s| *s == 0.5));
    drop(take);

    let started: Vec<_> = ctl
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            Event::RecordingStarted { track, sample } => Some((track, sample)),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![(1, 0)]);
}

/// Arming and disarming again leaves nothing to capture.
#[test]
fn test_arm_then_disarm_is_noop() {
    let (mut ctl, mut core) = recording_engine();
    ctl.arm_track(0, true).unwrap();
    ctl.arm_track(0, false).unwrap();
    ctl.record(0.0, 0).unwrap();

    let mut runner = input_runner(0.5);
    runner.run(&mut core, 10);
    assert!(!core.is_capturing(0));
    ctl.stop().unwrap();
    runner.run(&mut core, 1);

    assert_eq!(ctl.take_view(0).unwrap().frames(), 0);
    assert!(!ctl
        .drain_events()
        .iter()
        .any(|e| matches!(e, Event::RecordingStarted { .. })));
}

/// Playing is not recording: an armed track only monitors.
#[test]
fn test_play_does_not_capture() {
    let (mut ctl, mut core) = recording_engine();
    ctl.arm_track(0, true).unwrap();
    ctl.set_monitoring(0, true).unwrap();
    ctl.play().unwrap();

    let mut runner = input_runner(0.25);
    runner.run(&mut core, 4);
    assert!(!core.is_capturing(0));
    assert!((runner.rendered[0] - 0.25).abs() < FLOAT_EPSILON);

    // Record volume scales the monitor path.
    ctl.set_record_volume(0, 0.5).unwrap();
    let out = runner.block(&mut core);
    assert_relative_eq!(out[0], 0.125, epsilon = FLOAT_EPSILON);
    ctl.stop().unwrap();
    runner.run(&mut core, 1);
    assert_eq!(ctl.take_view(0).unwrap().frames(), 0);
}

/// Auto-punch only keeps the audio between punch-in and punch-out.
#[test]
fn test_auto_punch() {
    let (mut ctl, mut core) = recording_engine();
    ctl.arm_track(0, true).unwrap();
    ctl.set_punch_range(1.0, 2.0).unwrap();
    assert_eq!(
        ctl.record_mode(),
        RecordMode::AutoPunch {
            punch_in: 24_000,
            punch_out: 48_000,
        }
    );
    ctl.record(0.0, 0).unwrap();

    let mut runner = input_runner(0.5);
    runner.run_until(&mut core, 3 * SAMPLES_PER_BEAT);
    assert!(!core.is_capturing(0));
    ctl.stop().unwrap();
    runner.run(&mut core, 1);

    let take = ctl.take_view(0).unwrap();
    assert_eq!(take.start_sample(), 24_000);
    assert_eq!(take.frames(), SAMPLES_PER_BEAT);

    assert!(ctl.set_punch_range(2.0, 1.0).is_err());
}

/// Pre-roll plays before the record point and only captures from it.
#[test]
fn test_record_with_preroll() {
    let (mut ctl, mut core) = recording_engine();
    ctl.arm_track(0, true).unwrap();
    ctl.record(4.0, 1).unwrap();

    let mut runner = input_runner(0.5);
    runner.run(&mut core, 1);
    assert_eq!(core.transport_state(), TransportState::Playing);
    runner.run_until(&mut core, 5 * SAMPLES_PER_BEAT);
    assert_eq!(core.transport_state(), TransportState::Recording);
    ctl.stop().unwrap();
    runner.run(&mut core, 1);

    let take = ctl.take_view(0).unwrap();
    assert_eq!(take.start_sample(), 4 * SAMPLES_PER_BEAT as u64);
    assert!(take.frames() >= SAMPLES_PER_BEAT);
}

/// Blocks that end exactly on the record point still switch to recording
/// at the start of the next block.
#[test]
fn test_preroll_block_aligned_record_point() {
    let (mut ctl, mut core) = prepared(
        test_builder()
            .max_block_size(256)
            .max_recording_seconds(12.0)
            .recording_tracks(1),
    );
    ctl.arm_track(0, true).unwrap();
    ctl.record(8.0, 1).unwrap();

    let mut runner = BlockRunner::with_input(constant_input(0.5, 2, 256), 256);
    // One bar of pre-roll from beat 4 is 96000 samples: 375 blocks.
    runner.run(&mut core, 375);
    assert_eq!(core.playhead(), 8 * SAMPLES_PER_BEAT as u64);
    assert!(!core.is_capturing(0));

    runner.run(&mut core, 1);
    assert_eq!(core.transport_state(), TransportState::Recording);
    assert!(core.is_capturing(0));
    ctl.stop().unwrap();
    runner.run(&mut core, 1);

    let take = ctl.take_view(0).unwrap();
    assert_eq!(take.start_sample(), 8 * SAMPLES_PER_BEAT as u64);
    assert_eq!(take.frames(), 256);
    drop(take);

    let started: Vec<_> = ctl
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            Event::RecordingStarted { track, sample } => Some((track, sample)),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![(0, 192_000)]);
}

/// Running out of take capacity is reported once and keeps what fit.
#[test]
fn test_take_overrun() {
    let (mut ctl, mut core) = prepared(
        test_builder()
            .max_block_size(BLOCK)
            .max_recording_seconds(0.25),
    );
    ctl.arm_track(0, true).unwrap();
    ctl.record(0.0, 0).unwrap();

    let mut runner = input_runner(0.5);
    runner.run(&mut core, 40);
    ctl.stop().unwrap();
    runner.run(&mut core, 1);

    assert_eq!(ctl.take_view(0).unwrap().frames(), 12_000);
    let overruns = ctl
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, Event::RecorderOverrun { track: 0 }))
        .count();
    assert_eq!(overruns, 1);
}

/// The take cannot be read while it is being written.
#[test]
fn test_take_busy_while_recording() {
    let (mut ctl, mut core) = recording_engine();
    assert_eq!(
        ctl.take_view(0).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    ctl.arm_track(0, true).unwrap();
    ctl.record(0.0, 0).unwrap();
    let mut runner = input_runner(0.5);
    runner.run(&mut core, 2);

    assert_eq!(
        ctl.take_view(0).unwrap_err().kind(),
        ErrorKind::ResourceUnavailable
    );
    let mut writer = MemoryWriter::default();
    assert!(ctl.export_track(0, &mut writer).is_err());
    assert!(writer.takes.is_empty());
}

/// A finished take can be exported while another view is open, and the
/// next take waits until every view is gone.
#[test]
fn test_concurrent_take_views() {
    let (mut ctl, mut core) = recording_engine();
    ctl.arm_track(0, true).unwrap();
    ctl.record(0.0, 0).unwrap();
    let mut runner = input_runner(0.5);
    runner.run(&mut core, 10);
    ctl.stop().unwrap();
    runner.run(&mut core, 1);

    let waveform = ctl.take_view(0).unwrap();
    let mut writer = MemoryWriter::default();
    ctl.export_track(0, &mut writer).unwrap();
    assert_eq!(writer.takes[0][0].len(), 10 * BLOCK);
    assert_eq!(waveform.frames(), 10 * BLOCK);

    // Recording over an open view is refused.
    ctl.record(0.0, 0).unwrap();
    runner.run(&mut core, 2);
    assert!(!core.is_capturing(0));
    assert_eq!(waveform.frames(), 10 * BLOCK);
    ctl.stop().unwrap();
    runner.run(&mut core, 1);
    drop(waveform);

    ctl.record(0.0, 0).unwrap();
    runner.run(&mut core, 1);
    assert!(core.is_capturing(0));
}

/// The first arm needs room for both the take and the arm command; with
/// one free slot neither is sent.
#[test]
fn test_first_arm_needs_two_queue_slots() {
    let (mut ctl, mut core) = prepared(
        test_builder()
            .max_block_size(BLOCK)
            .max_recording_seconds(1.0)
            .recording_tracks(1)
            .command_queue_capacity(8)
            .max_commands_per_block(1),
    );
    let mut runner = input_runner(0.5);
    runner.run(&mut core, 4);
    ctl.drain_events();

    while ctl.set_monitoring(0, false).is_ok() {}
    // Drains exactly one command.
    runner.run(&mut core, 1);

    let err = ctl.arm_track(0, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
    assert_eq!(
        ctl.take_view(0).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );

    // Once the queue drains, arming goes through as a pair.
    runner.run(&mut core, 16);
    ctl.arm_track(0, true).unwrap();
    ctl.record(0.0, 0).unwrap();
    runner.run(&mut core, 3);
    assert!(core.is_capturing(0));
}

/// Stereo takes record consecutive inputs from the configured channel.
#[test]
fn test_stereo_take() {
    let (mut ctl, mut core) = recording_engine();
    ctl.set_take_channels(0, 2).unwrap();
    ctl.arm_track(0, true).unwrap();
    ctl.record(0.0, 0).unwrap();

    let mut input = AudioBlock::new(2, BLOCK);
    input.channel_mut(0).fill(0.2);
    input.channel_mut(1).fill(-0.4);
    let mut runner = BlockRunner::with_input(input, BLOCK);
    runner.run(&mut core, 10);
    ctl.stop().unwrap();
    runner.run(&mut core, 1);

    let mut writer = MemoryWriter::default();
    ctl.export_track(0, &mut writer).unwrap();
    let take = &writer.takes[0];
    assert_eq!(take.len(), 2);
    assert_eq!(take[0].len(), 10 * BLOCK);
    assert!(take[0].iter().all(|s| (s - 0.2).abs() < FLOAT_EPSILON));
    assert!(take[1].iter().all(|s| (s + 0.4).abs() < FLOAT_EPSILON));

    assert!(ctl.set_take_channels(0, 3).is_err());
    assert!(ctl.set_record_input(0, 2).is_err());
    assert!(ctl.arm_track(7, true).is_err());
}

/// Finished takes export to a float WAV file.
#[test]
fn test_export_wav() {
    let (mut ctl, mut core) = recording_engine();
    ctl.arm_track(0, true).unwrap();
    ctl.record(0.0, 0).unwrap();
    let mut runner = input_runner(0.5);
    runner.run(&mut core, 100);
    ctl.stop().unwrap();
    runner.run(&mut core, 1);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.wav");
    ctl.export_track(0, &mut WavFileWriter::new(&path)).unwrap();

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 48_000);
    assert_eq!(spec.sample_format, hound::SampleFormat::Float);
    let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
    assert_eq!(samples.len(), 100 * BLOCK);
    assert!(samples.iter().all(|s| *s == 0.5));
}
