//! Event emitter abstraction for decoupling services from the UI transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than a concrete
//! channel, so the watcher and dispatcher can be tested with counting fakes.

use super::{ArtworkEvent, ConnectionEvent, QueueEvent, TrackEvent};

/// Trait for emitting domain events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits a now-playing event.
    fn emit_track(&self, event: TrackEvent);

    /// Emits a queue event.
    fn emit_queue(&self, event: QueueEvent);

    /// Emits an artwork event.
    fn emit_artwork(&self, event: ArtworkEvent);

    /// Emits a connectivity event.
    fn emit_connection(&self, event: ConnectionEvent);
}

/// No-op emitter for tests and headless runs without a UI.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_track(&self, _event: TrackEvent) {}

    fn emit_queue(&self, _event: QueueEvent) {}

    fn emit_artwork(&self, _event: ArtworkEvent) {}

    fn emit_connection(&self, _event: ConnectionEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_track(&self, event: TrackEvent) {
        tracing::debug!(?event, "track_event");
    }

    fn emit_queue(&self, event: QueueEvent) {
        tracing::debug!(?event, "queue_event");
    }

    fn emit_artwork(&self, event: ArtworkEvent) {
        tracing::debug!(?event, "artwork_event");
    }

    fn emit_connection(&self, event: ConnectionEvent) {
        tracing::debug!(?event, "connection_event");
    }
}
