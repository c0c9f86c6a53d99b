//! Lifecycle observers for a transfer run.
//!
//! This module provides:
//! - `TransferNotifier`: the observer contract (start, success, failure,
//!   phase_changed)
//! - `NoopNotifier`: no caller observation
//! - `AccumulatingNotifier`: collects one line per callback, retrievable
//!   as a joined block for a synchronous API response body
//! - `PublishingNotifier`: wraps an `AccumulatingNotifier` and additionally
//!   publishes phase-change events on the bus
//!
//! A notifier's lifetime spans one transfer request; the orchestrator owns
//! it for the request's duration only.

use crate::events::{EventBus, PHASE_CHANGED};
use crate::phase::{Phase, PhaseChangeEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Observer receiving lifecycle callbacks for one run.
pub trait TransferNotifier: Send + Sync {
    fn start(&self, local_name: &str, remote_name: &str);

    fn success(&self, local_name: &str, remote_name: &str, elapsed: Duration);

    fn failure(&self, local_name: &str, remote_name: &str, elapsed: Duration, msg: &str);

    fn phase_changed(&self, event: &PhaseChangeEvent);
}

/// Notifier that observes nothing.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl TransferNotifier for NoopNotifier {
    fn start(&self, _local_name: &str, _remote_name: &str) {}

    fn success(&self, _local_name: &str, _remote_name: &str, _elapsed: Duration) {}

    fn failure(&self, _local_name: &str, _remote_name: &str, _elapsed: Duration, _msg: &str) {}

    fn phase_changed(&self, _event: &PhaseChangeEvent) {}
}

/// Notifier that appends a human-readable line per callback.
#[derive(Default)]
pub struct AccumulatingNotifier {
    lines: Mutex<Vec<String>>,
}

impl AccumulatingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn append(&self, line: String) {
        self.lines.lock().expect("notifier lines poisoned").push(line);
    }

    /// All accumulated lines joined into one text block.
    pub fn joined(&self) -> String {
        self.lines.lock().expect("notifier lines poisoned").join("\n")
    }
}

impl TransferNotifier for AccumulatingNotifier {
    fn start(&self, local_name: &str, remote_name: &str) {
        self.append(format!(
            "Starting transfer of {local_name} to {remote_name}"
        ));
    }

    fn success(&self, local_name: &str, remote_name: &str, elapsed: Duration) {
        self.append(format!(
            "Transfer of {local_name} to {remote_name} succeeded after {:.1}s",
            elapsed.as_secs_f64()
        ));
    }

    fn failure(&self, local_name: &str, remote_name: &str, elapsed: Duration, msg: &str) {
        self.append(format!(
            "Transfer of {local_name} to {remote_name} failed after {:.1}s: {msg}",
            elapsed.as_secs_f64()
        ));
    }

    fn phase_changed(&self, event: &PhaseChangeEvent) {
        self.append(format!("Phase changed ({} -> {})", event.prev, event.curr));
    }
}

/// Notifier that publishes phase-change events for the UI dialog.
///
/// Composes an `AccumulatingNotifier` and additionally fires a
/// `phase_changed` event on every call. Its phase mapping is narrower than
/// the orchestrator's persisted sequence — `Connect` on start,
/// `PostTransfer` on both success and failure — and the previous phase is
/// tracked locally, so the two phase streams are free to diverge.
pub struct PublishingNotifier {
    inner: AccumulatingNotifier,
    bus: Arc<dyn EventBus>,
    prev: Mutex<Phase>,
}

impl PublishingNotifier {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self {
            inner: AccumulatingNotifier::new(),
            bus,
            prev: Mutex::new(Phase::Inactive),
        }
    }

    /// All accumulated lines joined into one text block.
    pub fn joined(&self) -> String {
        self.inner.joined()
    }

    fn fire(&self, curr: Phase, msg: Option<String>) {
        let mut prev = self.prev.lock().expect("notification phase poisoned");
        let event = PhaseChangeEvent::new(*prev, curr, msg);
        self.bus.fire(PHASE_CHANGED, &event);
        *prev = curr;
    }
}

impl TransferNotifier for PublishingNotifier {
    fn start(&self, local_name: &str, remote_name: &str) {
        self.fire(Phase::Connect, None);
        self.inner.start(local_name, remote_name);
    }

    fn success(&self, local_name: &str, remote_name: &str, elapsed: Duration) {
        self.fire(Phase::PostTransfer, None);
        self.inner.success(local_name, remote_name, elapsed);
    }

    fn failure(&self, local_name: &str, remote_name: &str, elapsed: Duration, msg: &str) {
        self.fire(Phase::PostTransfer, Some(msg.to_string()));
        self.inner.failure(local_name, remote_name, elapsed, msg);
    }

    fn phase_changed(&self, event: &PhaseChangeEvent) {
        self.bus.fire(PHASE_CHANGED, event);
        self.inner.phase_changed(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingBus {
        fired: Mutex<Vec<(String, PhaseChangeEvent)>>,
    }

    impl RecordingBus {
        fn new() -> Self {
            Self {
                fired: Mutex::new(Vec::new()),
            }
        }

        fn fired(&self) -> Vec<(String, PhaseChangeEvent)> {
            self.fired.lock().unwrap().clone()
        }
    }

    impl EventBus for RecordingBus {
        fn fire(&self, event: &str, payload: &PhaseChangeEvent) {
            self.fired
                .lock()
                .unwrap()
                .push((event.to_string(), payload.clone()));
        }
    }

    #[test]
    fn test_noop_notifier_observes_nothing() {
        let notifier = NoopNotifier;
        notifier.start("a.bin", "a.bin");
        notifier.success("a.bin", "a.bin", Duration::from_secs(1));
        notifier.failure("a.bin", "a.bin", Duration::from_secs(1), "boom");
        notifier.phase_changed(&PhaseChangeEvent::new(Phase::Inactive, Phase::Transfer, None));
    }

    #[test]
    fn test_accumulating_notifier_joins_lines() {
        let notifier = AccumulatingNotifier::new();
        notifier.start("firmware_update.bin", "firmware.bin");
        notifier.success(
            "firmware_update.bin",
            "firmware.bin",
            Duration::from_millis(2500),
        );

        let body = notifier.joined();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "Starting transfer of firmware_update.bin to firmware.bin"
        );
        assert!(lines[1].contains("succeeded after 2.5s"));
    }

    #[test]
    fn test_accumulating_notifier_records_failure_message() {
        let notifier = AccumulatingNotifier::new();
        notifier.failure(
            "a.bin",
            "a.bin",
            Duration::from_secs(3),
            "Too many retries",
        );
        assert!(notifier.joined().contains("Too many retries"));
    }

    #[test]
    fn test_publishing_notifier_maps_start_to_connect() {
        let bus = Arc::new(RecordingBus::new());
        let notifier = PublishingNotifier::new(bus.clone());

        notifier.start("a.bin", "a.bin");

        let fired = bus.fired();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, PHASE_CHANGED);
        assert_eq!(fired[0].1.prev, Phase::Inactive);
        assert_eq!(fired[0].1.curr, Phase::Connect);
    }

    #[test]
    fn test_publishing_notifier_maps_outcomes_to_post_transfer() {
        let bus = Arc::new(RecordingBus::new());
        let notifier = PublishingNotifier::new(bus.clone());

        notifier.start("a.bin", "a.bin");
        notifier.success("a.bin", "a.bin", Duration::from_secs(1));

        let fired = bus.fired();
        assert_eq!(fired[1].1.prev, Phase::Connect);
        assert_eq!(fired[1].1.curr, Phase::PostTransfer);

        let bus = Arc::new(RecordingBus::new());
        let notifier = PublishingNotifier::new(bus.clone());
        notifier.failure("a.bin", "a.bin", Duration::from_secs(1), "boom");
        assert_eq!(bus.fired()[0].1.curr, Phase::PostTransfer);
        assert_eq!(bus.fired()[0].1.msg.as_deref(), Some("boom"));
    }

    #[test]
    fn test_publishing_notifier_forwards_orchestrator_events() {
        let bus = Arc::new(RecordingBus::new());
        let notifier = PublishingNotifier::new(bus.clone());

        let event = PhaseChangeEvent::new(Phase::PreConnect, Phase::Transfer, None);
        notifier.phase_changed(&event);

        let fired = bus.fired();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].1, event);
    }

    #[test]
    fn test_publishing_notifier_still_accumulates() {
        let bus = Arc::new(RecordingBus::new());
        let notifier = PublishingNotifier::new(bus);
        notifier.start("a.bin", "a.bin");
        assert!(notifier.joined().contains("Starting transfer"));
    }
}
