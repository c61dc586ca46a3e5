//! Kiosk configuration.
//!
//! Supports loading from YAML files with environment variable overrides.
//! Section names follow the kiosk's historical `config.yaml` layout.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use coverdeck_core::mpd::Subsystem;
use coverdeck_core::{
    ArtworkConfig, InputConfig, MpdConfig, PathsConfig, RetryConfig, TransportCommand,
    WatcherConfig,
};
use serde::Deserialize;

/// Kiosk configuration loaded from YAML with environment overrides.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    pub file_paths: FilePaths,
    pub mpd: MpdSection,
    pub logging: LoggingSection,
    pub display: DisplaySection,
    /// Cover file names looked up next to a track, in priority order.
    pub cover_formats: Option<Vec<String>>,
    pub connection: ConnectionSection,
    pub watcher: WatcherSection,
    pub input: InputSection,
}

/// `file_paths:` section. A leading `~` expands to the home directory.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FilePaths {
    pub album_art_loc: String,
    pub placeholder_loc: String,
    pub music_library: String,
    pub song_list_path: String,
    /// Append logs here instead of stderr.
    pub log_file: Option<String>,
}

impl Default for FilePaths {
    fn default() -> Self {
        Self {
            album_art_loc: "~/Downloads/.aartminip.png".to_string(),
            placeholder_loc: "~/Downloads/.placeholder.png".to_string(),
            music_library: "~/Music".to_string(),
            song_list_path: "~/Music/song_list.txt".to_string(),
            log_file: None,
        }
    }
}

/// Password as written in YAML: a string, or `false` for none.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Password {
    Flag(bool),
    Secret(String),
}

impl Password {
    fn into_secret(self) -> Option<String> {
        match self {
            Self::Secret(secret) if !secret.is_empty() && secret != "false" => Some(secret),
            _ => None,
        }
    }
}

/// `mpd:` section.
/// Overrides: `COVERDECK_MPD_HOST`, `COVERDECK_MPD_PORT`, `COVERDECK_MPD_PASSWORD`
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MpdSection {
    pub host: String,
    pub port: u16,
    pub password: Option<Password>,
    /// Network timeout in seconds.
    pub timeout: u64,
}

impl Default for MpdSection {
    fn default() -> Self {
        let defaults = MpdConfig::default();
        Self {
            host: defaults.host,
            port: defaults.port,
            password: None,
            timeout: defaults.timeout.as_secs(),
        }
    }
}

/// `logging:` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `error`, `warn`, `info`, `debug` or `trace`.
    pub level: Option<String>,
}

/// `display:` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DisplaySection {
    pub placeholder_image_size: (u32, u32),
    pub placeholder_image_color: [u8; 3],
    /// Bounding box for resolved artwork.
    pub max_art_size: (u32, u32),
}

impl Default for DisplaySection {
    fn default() -> Self {
        let defaults = ArtworkConfig::default();
        Self {
            placeholder_image_size: defaults.placeholder_size,
            placeholder_image_color: defaults.placeholder_color,
            max_art_size: (defaults.max_width, defaults.max_height),
        }
    }
}

/// `connection:` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    pub max_attempts: u32,
    /// Cap on the exponential backoff, in seconds.
    pub max_backoff: u64,
    pub command_attempts: u32,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            max_backoff: defaults.max_backoff.as_secs(),
            command_attempts: defaults.command_attempts,
        }
    }
}

/// `watcher:` section. Delays are in seconds.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatcherSection {
    pub retry_delay: u64,
    pub max_failures: u32,
    pub long_delay: u64,
    pub resume_failures: u32,
    pub idle_retries: u32,
    pub idle_retry_delay: u64,
    pub idle_exhausted_delay: u64,
    pub idle_timeout: u64,
    pub error_delay: u64,
    pub subsystems: Vec<String>,
}

impl Default for WatcherSection {
    fn default() -> Self {
        let d = WatcherConfig::default();
        Self {
            retry_delay: d.retry_delay.as_secs(),
            max_failures: d.max_failures,
            long_delay: d.long_delay.as_secs(),
            resume_failures: d.resume_failures,
            idle_retries: d.idle_retries,
            idle_retry_delay: d.idle_retry_delay.as_secs(),
            idle_exhausted_delay: d.idle_exhausted_delay.as_secs(),
            idle_timeout: d.idle_timeout.as_secs(),
            error_delay: d.error_delay.as_secs(),
            subsystems: d.subsystems.iter().map(|s| s.as_str().to_string()).collect(),
        }
    }
}

/// `input:` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InputSection {
    /// Code to command name (`next`, `stop`, `play`, `clear`). Replaces the
    /// default set when present.
    pub reserved_codes: Option<BTreeMap<String, String>>,
    pub autoplay_on_enqueue: bool,
}

impl KioskConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self> {
        // An empty file is a valid, all-defaults config
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("COVERDECK_MPD_HOST") {
            if !val.is_empty() {
                self.mpd.host = val;
            }
        }

        if let Ok(val) = std::env::var("COVERDECK_MPD_PORT") {
            if let Ok(port) = val.parse() {
                self.mpd.port = port;
            }
        }

        if let Ok(val) = std::env::var("COVERDECK_MPD_PASSWORD") {
            self.mpd.password = Some(Password::Secret(val));
        }

        // Note: COVERDECK_LOG_LEVEL is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Log file path, with `~` expanded.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.file_paths.log_file.as_deref().map(expand_home)
    }

    /// Converts to coverdeck-core's Config type.
    pub fn to_core_config(&self) -> Result<coverdeck_core::Config> {
        let mpd = MpdConfig {
            host: self.mpd.host.clone(),
            port: self.mpd.port,
            password: self.mpd.password.clone().and_then(Password::into_secret),
            timeout: Duration::from_secs(self.mpd.timeout),
        };

        let paths = PathsConfig {
            artifact: expand_home(&self.file_paths.album_art_loc),
            placeholder: expand_home(&self.file_paths.placeholder_loc),
            music_library: expand_home(&self.file_paths.music_library),
            track_list: expand_home(&self.file_paths.song_list_path),
        };

        let retry = RetryConfig {
            max_attempts: self.connection.max_attempts,
            max_backoff: Duration::from_secs(self.connection.max_backoff),
            command_attempts: self.connection.command_attempts,
        };

        let w = &self.watcher;
        let subsystems = w
            .subsystems
            .iter()
            .map(|name| {
                Subsystem::from_name(name)
                    .with_context(|| format!("Unknown watcher subsystem: {}", name))
            })
            .collect::<Result<Vec<_>>>()?;
        let watcher = WatcherConfig {
            retry_delay: Duration::from_secs(w.retry_delay),
            max_failures: w.max_failures,
            long_delay: Duration::from_secs(w.long_delay),
            resume_failures: w.resume_failures,
            idle_retries: w.idle_retries,
            idle_retry_delay: Duration::from_secs(w.idle_retry_delay),
            idle_exhausted_delay: Duration::from_secs(w.idle_exhausted_delay),
            idle_timeout: Duration::from_secs(w.idle_timeout),
            error_delay: Duration::from_secs(w.error_delay),
            subsystems,
        };

        let defaults = ArtworkConfig::default();
        let artwork = ArtworkConfig {
            max_width: self.display.max_art_size.0,
            max_height: self.display.max_art_size.1,
            cover_filenames: self
                .cover_formats
                .clone()
                .unwrap_or(defaults.cover_filenames),
            placeholder_size: self.display.placeholder_image_size,
            placeholder_color: self.display.placeholder_image_color,
        };

        let reserved_codes = match &self.input.reserved_codes {
            Some(codes) => parse_reserved_codes(codes)?,
            None => InputConfig::default().reserved_codes,
        };
        let input = InputConfig {
            reserved_codes,
            autoplay_on_enqueue: self.input.autoplay_on_enqueue,
        };

        Ok(coverdeck_core::Config {
            mpd,
            paths,
            retry,
            watcher,
            artwork,
            input,
        })
    }
}

fn parse_reserved_codes(
    codes: &BTreeMap<String, String>,
) -> Result<BTreeMap<u16, TransportCommand>> {
    codes
        .iter()
        .map(|(code, name)| {
            if code.len() != 4 || !code.bytes().all(|b| b.is_ascii_digit()) {
                bail!("Reserved code {:?} must be exactly 4 digits", code);
            }
            let command = TransportCommand::from_name(name)
                .with_context(|| format!("Unknown command {:?} for code {}", name, code))?;
            Ok((code.parse::<u16>()?, command))
        })
        .collect()
}

/// Expands a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}
