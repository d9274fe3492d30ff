//! Tests for the message pipeline

use super::*;
use crate::latch::LatchOptions;
use parking_lot::Mutex;
use std::time::Duration;

/// Sink that records everything written to it
#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<Vec<u8>>>,
}

impl RecordingSink {
    fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }
}

impl OutputSink for RecordingSink {
    fn send(&self, data: &[u8]) -> Result<()> {
        self.sent.lock().push(data.to_vec());
        Ok(())
    }
}

struct BrokenSink;

impl OutputSink for BrokenSink {
    fn send(&self, _data: &[u8]) -> Result<()> {
        anyhow::bail!("port closed")
    }
}

fn msg(timestamp: f64, data: &[u8]) -> InboundMessage {
    InboundMessage {
        timestamp,
        data: data.to_vec(),
    }
}

fn pipeline() -> Pipeline<RecordingSink> {
    Pipeline::new(LatchEngine::new(), RecordingSink::default(), true)
}

#[test]
fn test_triple_tap_then_toggle_bytes() {
    let mut pipeline = pipeline();

    for t in [0.0, 0.05, 0.10] {
        pipeline.handle(&msg(t, &[0xB1, 64, 127])).unwrap();
    }
    // Releases while latched go nowhere
    assert_eq!(
        pipeline.handle(&msg(0.12, &[0xB1, 64, 0])).unwrap(),
        Dispatch::Suppressed
    );
    pipeline.handle(&msg(1.0, &[0xB1, 64, 127])).unwrap();
    pipeline.handle(&msg(1.1, &[0xB1, 64, 0])).unwrap();
    pipeline.handle(&msg(2.0, &[0xB1, 64, 127])).unwrap();

    assert_eq!(
        pipeline.sink().sent(),
        vec![
            vec![0xB1, 64, 127],
            vec![0xB1, 64, 127],
            vec![0xB1, 64, 0],
            vec![0xB1, 64, 127],
            vec![0xB1, 64, 0],
        ]
    );
    assert!(pipeline.engine().is_latched(1, 64));

    let stats = pipeline.stats();
    assert_eq!(stats.received, 7);
    assert_eq!(stats.sent, 5);
    assert_eq!(stats.modified, 3);
    assert_eq!(stats.suppressed, 2);
}

#[test]
fn test_unlatched_controller_passes_through() {
    let mut pipeline = pipeline();

    assert_eq!(
        pipeline.handle(&msg(0.0, &[0xB0, 7, 127])).unwrap(),
        Dispatch::Sent(vec![0xB0, 7, 127])
    );
    assert_eq!(
        pipeline.handle(&msg(0.1, &[0xB0, 7, 0])).unwrap(),
        Dispatch::Sent(vec![0xB0, 7, 0])
    );
    assert_eq!(
        pipeline.handle(&msg(0.2, &[0xB0, 1, 64])).unwrap(),
        Dispatch::Sent(vec![0xB0, 1, 64])
    );
}

#[test]
fn test_other_messages_forwarded_by_default() {
    let mut pipeline = pipeline();

    let note_on = [0x90, 60, 127];
    assert_eq!(
        pipeline.handle(&msg(0.0, &note_on)).unwrap(),
        Dispatch::Sent(note_on.to_vec())
    );
    assert_eq!(
        pipeline.handle(&msg(0.0, &[0xF8])).unwrap(),
        Dispatch::Sent(vec![0xF8])
    );
    // Note velocity 127 never feeds the gesture detector
    assert_eq!(pipeline.engine().tracked_keys(), 0);
}

#[test]
fn test_other_messages_skipped_when_disabled() {
    let mut pipeline = Pipeline::new(LatchEngine::new(), RecordingSink::default(), false);

    assert_eq!(
        pipeline.handle(&msg(0.0, &[0x90, 60, 127])).unwrap(),
        Dispatch::Skipped
    );
    assert!(pipeline.sink().sent().is_empty());
}

#[test]
fn test_unparseable_bytes_rejected() {
    let mut pipeline = pipeline();

    let dispatch = pipeline.handle(&msg(0.0, &[0xB0, 7])).unwrap();
    assert!(matches!(dispatch, Dispatch::Rejected(EventError::NotControlChange(_))));
    assert_eq!(pipeline.stats().rejected, 1);
    assert!(pipeline.sink().sent().is_empty());
}

#[test]
fn test_backwards_timestamp_rejected_per_key() {
    let mut pipeline = pipeline();

    pipeline.handle(&msg(1.0, &[0xB0, 7, 127])).unwrap();
    let dispatch = pipeline.handle(&msg(0.5, &[0xB0, 7, 127])).unwrap();
    assert!(matches!(dispatch, Dispatch::Rejected(EventError::NonMonotonic { .. })));

    // Other keys keep their own clocks
    assert!(matches!(
        pipeline.handle(&msg(0.5, &[0xB0, 8, 127])).unwrap(),
        Dispatch::Sent(_)
    ));
    // Equal timestamps are allowed
    assert!(matches!(
        pipeline.handle(&msg(1.0, &[0xB0, 7, 0])).unwrap(),
        Dispatch::Sent(_)
    ));
    assert_eq!(pipeline.engine().state(0, 7).unwrap().repeat_count, 1);
}

#[test]
fn test_sink_errors_propagate() {
    let mut pipeline = Pipeline::new(LatchEngine::new(), BrokenSink, true);

    let err = pipeline.handle(&msg(0.0, &[0xB0, 7, 127])).unwrap_err();
    assert!(format!("{:#}", err).contains("port closed"));
    assert_eq!(pipeline.stats().sent, 0);
}

#[test]
fn test_configured_options_reach_engine() {
    let engine = LatchEngine::with_options(LatchOptions {
        gesture_window: Duration::from_millis(100),
        toggle_presses: 3,
    });
    let mut pipeline = Pipeline::new(engine, RecordingSink::default(), true);

    for t in [0.0, 0.15, 0.30] {
        pipeline.handle(&msg(t, &[0xB0, 7, 127])).unwrap();
    }
    assert!(!pipeline.engine().is_latched(0, 7));
}

#[test]
fn test_timestamp_guard() {
    let mut guard = TimestampGuard::default();
    let at = |t: f64| ControlChangeEvent::new(0, 7, 127, t).unwrap();

    assert!(guard.check(&at(0.0)).is_ok());
    assert!(guard.check(&at(0.0)).is_ok());
    assert!(guard.check(&at(0.3)).is_ok());
    assert!(guard.check(&at(0.2)).is_err());
    // A rejected event does not move the clock back
    assert!(guard.check(&at(0.25)).is_err());
}

#[test]
fn test_high_bit_data_bytes_never_latch() {
    let mut pipeline = pipeline();

    for t in [0.0, 0.05, 0.10] {
        let dispatch = pipeline.handle(&msg(t, &[0xB0, 7, 0xFF])).unwrap();
        assert_eq!(dispatch, Dispatch::Rejected(EventError::ValueOutOfRange(0xFF)));
    }
    let dispatch = pipeline.handle(&msg(0.15, &[0xB0, 0x87, 127])).unwrap();
    assert_eq!(dispatch, Dispatch::Rejected(EventError::ControllerOutOfRange(0x87)));

    assert!(!pipeline.engine().is_latched(0, 7));
    assert_eq!(pipeline.engine().tracked_keys(), 0);
    assert!(pipeline.sink().sent().is_empty());
    assert_eq!(pipeline.stats().rejected, 4);
}

#[test]
fn test_control_change_must_be_three_bytes() {
    let mut pipeline = pipeline();

    let dispatch = pipeline.handle(&msg(0.0, &[0xB0, 7, 127, 0x42])).unwrap();
    assert_eq!(dispatch, Dispatch::Rejected(EventError::WrongLength(4)));
    assert_eq!(pipeline.engine().tracked_keys(), 0);
    assert!(pipeline.sink().sent().is_empty());
}
