//! Event system for the external UI layer.
//!
//! This module provides:
//! - [`EventEmitter`] trait that core services emit through
//! - [`BroadcastEventBridge`] fanning events out to subscribers
//! - Event types for each concern (track, queue, artwork, connection)
//!
//! Services receive an emitter at construction; there is no global
//! notification hook.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

#[cfg(test)]
pub(crate) use emitter::tests::RecordingEmitter;

use std::path::PathBuf;

use serde::Serialize;

use crate::artwork::ArtSource;
use crate::services::ConnectionState;

/// Events delivered to UI subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum KioskEvent {
    /// Now-playing changes.
    Track(TrackEvent),

    /// Queue additions and length changes.
    Queue(QueueEvent),

    /// A new artifact was written.
    Artwork(ArtworkEvent),

    /// Music server connectivity.
    Connection(ConnectionEvent),
}

/// Events related to the currently playing track.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TrackEvent {
    /// A different track started.
    Changed {
        /// Track reference.
        reference: String,
        /// Artist, or "Unknown Artist".
        artist: String,
        /// Title, or the file name of the reference.
        title: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Nothing is playing any more.
    Cleared {
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events related to the play queue.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueueEvent {
    /// A keypad entry was enqueued.
    TrackAdded {
        /// Track reference that was added.
        reference: String,
        /// `"artist - title"`, the title, or the file name.
        display: String,
        /// Locally tracked queue length after the add.
        #[serde(rename = "queueLength")]
        queue_length: u32,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The polled queue length differs from the last one seen.
    LengthChanged {
        /// New queue length.
        length: u32,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events related to the artwork artifact.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ArtworkEvent {
    /// The artifact file was replaced.
    Updated {
        /// Path the UI should (re)load.
        path: PathBuf,
        /// Strategy that produced the image; `None` for the placeholder.
        source: Option<ArtSource>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events related to music server connectivity.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectionEvent {
    /// A connection manager changed state.
    StateChanged {
        /// Which manager (`commands` or `events`).
        channel: &'static str,
        /// New state.
        state: ConnectionState,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_category_and_type_tags() {
        let event = KioskEvent::Queue(QueueEvent::TrackAdded {
            reference: "A/01.flac".into(),
            display: "Artist - Song".into(),
            queue_length: 3,
            timestamp: 1,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "queue");
        assert_eq!(json["type"], "trackAdded");
        assert_eq!(json["queueLength"], 3);
    }
}
