//! Immutable runtime configuration.
//!
//! A [`Config`] is built once at startup (by the binary, from YAML and
//! environment overrides), validated, and handed to each component's
//! constructor. Nothing mutates it afterwards.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::mpd::{Subsystem, TransportCommand};
use crate::protocol_constants::{DEFAULT_MPD_PORT, INPUT_WIDTH};

/// Connection parameters for the music server.
#[derive(Debug, Clone)]
pub struct MpdConfig {
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Optional password sent right after the greeting.
    pub password: Option<String>,
    /// Bound on every network read, write and connect.
    pub timeout: Duration,
}

impl Default for MpdConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_MPD_PORT,
            password: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Filesystem locations used by the core.
///
/// Defaults are relative; the binary anchors them to the home directory.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Fixed location of the current-artwork artifact.
    pub artifact: PathBuf,
    /// Static placeholder image, created once if absent.
    pub placeholder: PathBuf,
    /// Root directory that track references are relative to.
    pub music_library: PathBuf,
    /// One track reference per line, addressed by 1-based keypad index.
    pub track_list: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifact: PathBuf::from("Downloads/.aartminip.png"),
            placeholder: PathBuf::from("Downloads/.placeholder.png"),
            music_library: PathBuf::from("Music"),
            track_list: PathBuf::from("Music/song_list.txt"),
        }
    }
}

/// Reconnect and command retry budget.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Connect attempts per reconnect sequence.
    pub max_attempts: u32,
    /// Upper bound on the exponential backoff between attempts.
    pub max_backoff: Duration,
    /// Total probe-reconnect-execute passes per command.
    pub command_attempts: u32,
}

impl RetryConfig {
    /// Delay after failed reconnect attempt `attempt` (1-based): `min(2^attempt s, max_backoff)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.max_backoff)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_backoff: Duration::from_secs(10),
            command_attempts: 2,
        }
    }
}

/// Cadence of the song watcher loop.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Delay after a failed connection check.
    pub retry_delay: Duration,
    /// Consecutive connection failures tolerated before the long delay.
    pub max_failures: u32,
    /// Delay once `max_failures` is exceeded.
    pub long_delay: Duration,
    /// Failure count to resume from after the long delay.
    pub resume_failures: u32,
    /// Attempts at the event wait before giving up for this cycle.
    pub idle_retries: u32,
    /// Delay between failed event-wait attempts.
    pub idle_retry_delay: Duration,
    /// Delay once all event-wait attempts failed.
    pub idle_exhausted_delay: Duration,
    /// Bound on a single event wait.
    pub idle_timeout: Duration,
    /// Delay after a poll that could not read server state.
    pub error_delay: Duration,
    /// Subsystems the event wait listens to.
    pub subsystems: Vec<Subsystem>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(2),
            max_failures: 10,
            long_delay: Duration::from_secs(30),
            resume_failures: 5,
            idle_retries: 3,
            idle_retry_delay: Duration::from_secs(1),
            idle_exhausted_delay: Duration::from_secs(2),
            idle_timeout: Duration::from_secs(60),
            error_delay: Duration::from_secs(5),
            subsystems: vec![Subsystem::Player],
        }
    }
}

/// Artwork normalization and lookup settings.
#[derive(Debug, Clone)]
pub struct ArtworkConfig {
    /// Bounding box width for the artifact.
    pub max_width: u32,
    /// Bounding box height for the artifact.
    pub max_height: u32,
    /// Conventional cover filenames, tried in order.
    pub cover_filenames: Vec<String>,
    /// Size of the generated placeholder.
    pub placeholder_size: (u32, u32),
    /// RGB fill of the generated placeholder.
    pub placeholder_color: [u8; 3],
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            max_width: 500,
            max_height: 500,
            cover_filenames: [
                "cover.jpg",
                "folder.jpg",
                "folder.png",
                "folder.jpeg",
                "cover.jpeg",
                "cover.png",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            placeholder_size: (500, 500),
            placeholder_color: [0, 0, 0],
        }
    }
}

/// Keypad behavior.
#[derive(Debug, Clone)]
pub struct InputConfig {
    /// Exact 4-digit codes that trigger transport commands instead of a lookup.
    pub reserved_codes: BTreeMap<u16, TransportCommand>,
    /// Issue `play` after every successful enqueue.
    pub autoplay_on_enqueue: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            reserved_codes: BTreeMap::from([
                (9999, TransportCommand::Next),
                (8888, TransportCommand::Stop),
                (7777, TransportCommand::Play),
                (6666, TransportCommand::Clear),
            ]),
            autoplay_on_enqueue: false,
        }
    }
}

/// Configuration for the Coverdeck core.
///
/// All fields have defaults matching a stock kiosk install.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Music server connection.
    pub mpd: MpdConfig,
    /// Filesystem locations.
    pub paths: PathsConfig,
    /// Reconnect budget shared by both connection managers.
    pub retry: RetryConfig,
    /// Watcher loop cadence.
    pub watcher: WatcherConfig,
    /// Artwork pipeline.
    pub artwork: ArtworkConfig,
    /// Keypad dispatch.
    pub input: InputConfig,
}

impl Config {
    /// Validates values the runtime cannot work with.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.mpd.host.trim().is_empty() {
            return Err("mpd.host must not be empty".to_string());
        }
        if self.mpd.timeout.is_zero() {
            return Err("mpd.timeout must be > 0".to_string());
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be >= 1".to_string());
        }
        if self.retry.command_attempts == 0 {
            return Err("retry.command_attempts must be >= 1".to_string());
        }
        if self.watcher.idle_retries == 0 {
            return Err("watcher.idle_retries must be >= 1".to_string());
        }
        if self.watcher.subsystems.is_empty() {
            return Err("watcher.subsystems must name at least one subsystem".to_string());
        }
        if self.artwork.max_width == 0 || self.artwork.max_height == 0 {
            return Err("artwork bounding box must be at least 1x1".to_string());
        }
        let (w, h) = self.artwork.placeholder_size;
        if w == 0 || h == 0 {
            return Err("placeholder size must be at least 1x1".to_string());
        }
        let lowest = 10u16.pow(INPUT_WIDTH as u32 - 1);
        if let Some(code) = self
            .input
            .reserved_codes
            .keys()
            .find(|code| **code < lowest || **code > 9999)
        {
            return Err(format!("reserved code {} is not {} digits", code, INPUT_WIDTH));
        }
        Ok(())
    }
}
