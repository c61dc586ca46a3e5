//! Application services layer.
//!
//! These services hold the kiosk's behavior and sit between the music
//! server client (`mpd/`) and the outer surfaces (display, UI events,
//! keypad):
//!
//! - [`ConnectionManager`]: one resilient, serialized session
//! - [`SongWatcher`]: now-playing and queue tracking
//! - [`InputDispatcher`]: keypad entries to server commands

pub mod connection_manager;
pub mod input_dispatcher;
pub mod song_watcher;

pub use connection_manager::{ConnectionManager, ConnectionState};
pub use input_dispatcher::{Dispatch, InputBuffer, InputDispatcher, QueuedTrack};
pub use song_watcher::{PollOutcome, SongWatcher};
