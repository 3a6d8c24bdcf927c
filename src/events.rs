//! Diagnostic event sink: a host-observable notification boundary for things
//! that happen at module boundaries but aren't captured by a counter or a
//! snapshot value — a build starting or finishing, a drift-triggered rebuild
//! firing, a snapshot write failing, a single document dropped during build.
//!
//! Modeled the same way as [`crate::embedder::Embedder`]: the engine depends
//! on a trait object, never a concrete logging backend, so a host can wire
//! this to `tracing`, a channel, a test-only collector, or nothing at all.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    BuildStarted { requested: usize },
    BuildFinished { processed: usize, failures: usize, elapsed_ms: u64 },
    DocumentBuildFailed { doc_id: String },
    RebuildTriggered { drift_count: usize, threshold: usize },
    SnapshotFailed { path: String, reason: String },
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::BuildStarted { requested } => write!(f, "build started: {requested} documents requested"),
            EngineEvent::BuildFinished { processed, failures, elapsed_ms } => {
                write!(f, "build finished: {processed} processed, {failures} failed, {elapsed_ms}ms")
            }
            EngineEvent::DocumentBuildFailed { doc_id } => write!(f, "document '{doc_id}' failed during build"),
            EngineEvent::RebuildTriggered { drift_count, threshold } => {
                write!(f, "rebuild triggered: drift {drift_count} >= threshold {threshold}")
            }
            EngineEvent::SnapshotFailed { path, reason } => write!(f, "snapshot at '{path}' failed: {reason}"),
        }
    }
}

/// Receives [`EngineEvent`]s as the engine emits them. Implementations must
/// not block the caller for long — events are emitted while holding no
/// engine lock, but a slow sink still adds latency to the call that
/// triggered it.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: EngineEvent);
}

/// The default sink: discards everything. Matches the engine's posture
/// toward every other external feature (HTTP, a logging backend, a config
/// file loader) being a host concern, not this crate's.
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn on_event(&self, _event: EngineEvent) {}
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingEventSink;
    use super::*;

    #[test]
    fn noop_sink_accepts_every_event_variant_without_panicking() {
        let sink = NoopEventSink;
        sink.on_event(EngineEvent::BuildStarted { requested: 3 });
        sink.on_event(EngineEvent::BuildFinished { processed: 3, failures: 0, elapsed_ms: 1 });
        sink.on_event(EngineEvent::DocumentBuildFailed { doc_id: "d1".to_string() });
        sink.on_event(EngineEvent::RebuildTriggered { drift_count: 5, threshold: 5 });
        sink.on_event(EngineEvent::SnapshotFailed { path: "/tmp/x".to_string(), reason: "disk full".to_string() });
    }

    #[test]
    fn recording_sink_preserves_emission_order() {
        let sink = RecordingEventSink::new();
        sink.on_event(EngineEvent::BuildStarted { requested: 1 });
        sink.on_event(EngineEvent::BuildFinished { processed: 1, failures: 0, elapsed_ms: 0 });
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], EngineEvent::BuildStarted { .. }));
        assert!(matches!(events[1], EngineEvent::BuildFinished { .. }));
    }
}
