//! Shared runtime state.
//!
//! The watcher and the keypad dispatcher both touch the queue length: the
//! watcher overwrites it from every status poll, the dispatcher bumps it
//! optimistically after an enqueue so the display reacts before the next
//! poll. Both go through [`KioskState`].

use parking_lot::RwLock;

use crate::mpd::{QueueSnapshot, Track};

/// Most recent observations of the server.
///
/// # Concurrency design
///
/// Each field sits behind its own `RwLock`; writers replace whole values and
/// never hold a lock across an `.await`.
#[derive(Debug, Default)]
pub struct KioskState {
    queue: RwLock<QueueSnapshot>,
    now_playing: RwLock<Option<Track>>,
}

impl KioskState {
    /// Returns the last known queue snapshot.
    pub fn queue(&self) -> QueueSnapshot {
        *self.queue.read()
    }

    /// Stores a polled queue length. Returns true if it changed.
    pub fn set_queue_length(&self, length: u32) -> bool {
        let mut queue = self.queue.write();
        let changed = queue.length != length;
        queue.length = length;
        changed
    }

    /// Optimistically counts one enqueued track; returns the new length.
    pub fn increment_queue(&self) -> u32 {
        let mut queue = self.queue.write();
        queue.length = queue.length.saturating_add(1);
        queue.length
    }

    /// Returns the track observed by the last poll.
    pub fn now_playing(&self) -> Option<Track> {
        self.now_playing.read().clone()
    }

    /// Replaces the now-playing track.
    pub fn set_now_playing(&self, track: Option<Track>) {
        *self.now_playing.write() = track;
    }
}
