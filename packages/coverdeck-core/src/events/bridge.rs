//! Bridge implementation that maps domain events to a broadcast channel.
//!
//! The [`BroadcastEventBridge`] lives at the boundary between core services
//! and whatever renders the kiosk UI. The binary subscribes to it and writes
//! events out; an optional external emitter can be attached as well.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{ArtworkEvent, ConnectionEvent, KioskEvent, QueueEvent, TrackEvent};

/// Bridges domain events to a `tokio::sync::broadcast` channel.
///
/// # Thread Safety
///
/// The bridge is `Send + Sync` and can be shared across async tasks.
/// The external emitter uses `RwLock` so it can be set after construction.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<KioskEvent>,
    /// Optional external emitter for platform-specific delivery
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter that receives every event before broadcast.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<KioskEvent> {
        self.tx.subscribe()
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(KioskEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_track, TrackEvent, Track);
    impl_emit!(emit_queue, QueueEvent, Queue);
    impl_emit!(emit_artwork, ArtworkEvent, Artwork);
    impl_emit!(emit_connection, ConnectionEvent, Connection);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEmitter;

    #[tokio::test]
    async fn subscribers_and_external_emitter_both_receive() {
        let bridge = BroadcastEventBridge::new(8);
        let external = Arc::new(RecordingEmitter::default());
        bridge.set_external_emitter(Arc::clone(&external) as Arc<dyn EventEmitter>);
        let mut rx = bridge.subscribe();

        bridge.emit_track(TrackEvent::Cleared { timestamp: 7 });

        let received = rx.recv().await.unwrap();
        assert!(matches!(
            received,
            KioskEvent::Track(TrackEvent::Cleared { timestamp: 7 })
        ));
        assert_eq!(external.tracks.lock().len(), 1);
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let bridge = BroadcastEventBridge::new(8);
        bridge.emit_queue(QueueEvent::LengthChanged {
            length: 1,
            timestamp: 0,
        });
    }
}
