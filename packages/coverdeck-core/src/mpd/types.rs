//! Domain types exchanged with the music server.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use crate::utils::reference_file_name;

/// A playable track as reported by the server.
///
/// Identity is the `reference`; two tracks with the same reference are the
/// same track even if their tags differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Opaque path identifier, relative to the music library.
    pub reference: String,
    /// Artist tag, if present.
    pub artist: Option<String>,
    /// Title tag, if present.
    pub title: Option<String>,
}

impl Track {
    /// Creates a track with no tags.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            artist: None,
            title: None,
        }
    }

    /// Artist for on-screen display.
    #[must_use]
    pub fn display_artist(&self) -> &str {
        self.artist.as_deref().unwrap_or("Unknown Artist")
    }

    /// Title for on-screen display, falling back to the file name.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .unwrap_or_else(|| reference_file_name(&self.reference))
    }

    /// One-line summary used in queue notifications.
    ///
    /// `"artist - title"` when both tags exist, the title alone when only it
    /// exists, otherwise the file name.
    #[must_use]
    pub fn summary(&self) -> String {
        match (self.artist.as_deref(), self.title.as_deref()) {
            (Some(artist), Some(title)) => format!("{} - {}", artist, title),
            (_, Some(title)) => title.to_string(),
            _ => reference_file_name(&self.reference).to_string(),
        }
    }
}

/// Server-side playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    Play,
    Pause,
    Stop,
    #[default]
    Unknown,
}

impl PlaybackState {
    /// Parses the `state` field of a status response.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "play" => Self::Play,
            "pause" => Self::Pause,
            "stop" => Self::Stop,
            _ => Self::Unknown,
        }
    }
}

/// Subset of the status response the kiosk cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerStatus {
    pub state: PlaybackState,
    pub queue_length: u32,
}

/// Length of the play queue, refreshed every poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueSnapshot {
    pub length: u32,
}

/// Server subsystems an idle wait can listen to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Player,
    Playlist,
    Mixer,
    Options,
    Database,
}

impl Subsystem {
    /// Protocol name of the subsystem.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Playlist => "playlist",
            Self::Mixer => "mixer",
            Self::Options => "options",
            Self::Database => "database",
        }
    }

    /// Parses a protocol subsystem name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "player" => Some(Self::Player),
            "playlist" => Some(Self::Playlist),
            "mixer" => Some(Self::Mixer),
            "options" => Some(Self::Options),
            "database" => Some(Self::Database),
            _ => None,
        }
    }
}

/// Transport commands reachable from the keypad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportCommand {
    Next,
    Stop,
    Play,
    Clear,
}

impl TransportCommand {
    /// Parses a configuration name (`next`, `stop`, `play`, `clear`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "next" => Some(Self::Next),
            "stop" => Some(Self::Stop),
            "play" => Some(Self::Play),
            "clear" => Some(Self::Clear),
            _ => None,
        }
    }
}

impl From<TransportCommand> for Command {
    fn from(cmd: TransportCommand) -> Self {
        match cmd {
            TransportCommand::Next => Command::Next,
            TransportCommand::Stop => Command::Stop,
            TransportCommand::Play => Command::Play,
            TransportCommand::Clear => Command::Clear,
        }
    }
}

/// A command the core issues against a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Status,
    CurrentSong,
    /// Embedded picture for the exact reference.
    ReadPicture(String),
    Next,
    Stop,
    Play,
    Clear,
    /// Append the reference to the queue.
    Add(String),
    /// Exact-match lookup by file reference.
    FindFile(String),
}

impl Command {
    /// Protocol name of the command.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Status => "status",
            Self::CurrentSong => "currentsong",
            Self::ReadPicture(_) => "readpicture",
            Self::Next => "next",
            Self::Stop => "stop",
            Self::Play => "play",
            Self::Clear => "clear",
            Self::Add(_) => "add",
            Self::FindFile(_) => "find",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadPicture(uri) | Self::Add(uri) | Self::FindFile(uri) => {
                write!(f, "{} {}", self.name(), uri)
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Parsed reply to a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Command succeeded with no payload of interest.
    Done,
    Status(PlayerStatus),
    /// `currentsong`: nothing when the queue is stopped at no track.
    CurrentSong(Option<Track>),
    /// `readpicture`: `None` when the file has no embedded picture.
    Picture(Option<Bytes>),
    /// `find`: matching song records in server order.
    Songs(Vec<Track>),
}
