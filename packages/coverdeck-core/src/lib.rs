//! Coverdeck Core - the engine behind the Coverdeck music kiosk.
//!
//! The kiosk follows an MPD server's playback, keeps a single "current
//! artwork" image up to date for whatever is playing, and turns 4-digit
//! keypad entries into queue additions or transport commands. Rendering,
//! LED hardware and configuration files live outside this crate.
//!
//! # Architecture
//!
//! - [`mpd`]: minimal async client for the server's text protocol
//! - [`services`]: connection management, the now-playing watcher and the
//!   keypad dispatcher
//! - [`artwork`]: ordered fallback chain producing the artwork artifact
//! - [`events`]: typed UI events and the broadcast bridge
//! - [`bootstrap`]: composition root wiring everything together
//! - [`error`]: centralized error types
//!
//! # Abstraction Traits
//!
//! - [`SessionFactory`](mpd::SessionFactory): opens server sessions
//! - [`ArtStrategy`](artwork::ArtStrategy): one artwork source
//! - [`EventEmitter`](events::EventEmitter): UI notifications
//! - [`DisplaySink`](display::DisplaySink): the two numeric displays
//! - [`TaskSpawner`](runtime::TaskSpawner): fire-and-forget tasks

#![warn(clippy::all)]

pub mod artwork;
pub mod bootstrap;
pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod mpd;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod state;
pub mod track_list;
pub mod utils;

// Re-export commonly used types at the crate root
pub use artwork::{ArtResolver, ArtSource, Resolution};
pub use bootstrap::{bootstrap_services, bootstrap_services_with_factory, BootstrappedServices};
pub use config::{
    ArtworkConfig, Config, InputConfig, MpdConfig, PathsConfig, RetryConfig, WatcherConfig,
};
pub use display::{DisplaySink, LoggingDisplay};
pub use error::{ErrorCode, KioskError, KioskResult};
pub use events::{
    ArtworkEvent, BroadcastEventBridge, ConnectionEvent, EventEmitter, KioskEvent,
    LoggingEventEmitter, NoopEventEmitter, QueueEvent, TrackEvent,
};
pub use mpd::{Subsystem, Track, TransportCommand};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use services::{ConnectionManager, ConnectionState, InputDispatcher, SongWatcher};
pub use state::KioskState;
pub use track_list::TrackReferenceList;
