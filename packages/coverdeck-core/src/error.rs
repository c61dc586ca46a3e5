//! Centralized error types for the Coverdeck core library.
//!
//! Each concern has its own `thiserror` enum:
//! - [`MpdError`]: wire-level failures talking to the music server
//! - [`CommandError`]: a serialized command that could not be completed
//! - [`ArtworkError`]: artifact write and placeholder failures
//! - [`TrackListError`]: keypad index lookups against the track list file
//! - [`KioskError`]: crate-wide errors surfaced by bootstrap
//!
//! Only [`KioskError::Initialization`] is meant to stop the process; every
//! other error is logged and contained by the component that produced it.

use std::path::PathBuf;

use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
///
/// Used when errors are reported through UI events or structured logs.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

// ─────────────────────────────────────────────────────────────────────────────
// Music Server Protocol
// ─────────────────────────────────────────────────────────────────────────────

/// Errors produced by a music-server session.
#[derive(Debug, Error)]
pub enum MpdError {
    /// Socket-level failure (refused, reset, broken pipe).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server did not answer within the configured timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The server rejected the command.
    #[error("Server rejected {command}: [{code}] {message}")]
    Ack {
        /// Numeric ACK error code.
        code: u32,
        /// Command name reported by the server.
        command: String,
        /// Human-readable message from the server.
        message: String,
    },

    /// The server sent something the client could not interpret.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server closed the connection.
    #[error("Connection closed by server")]
    Closed,

    /// No session is currently open.
    #[error("Not connected")]
    NotConnected,
}

impl MpdError {
    /// Returns true for connection-level failures that a fresh session can fix.
    ///
    /// A server `ACK` means the command itself was rejected on a healthy
    /// session, so it is never retried.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Ack { .. })
    }
}

impl ErrorCode for MpdError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "mpd_io_error",
            Self::Timeout(_) => "mpd_timeout",
            Self::Ack { .. } => "mpd_command_rejected",
            Self::Protocol(_) => "mpd_protocol_error",
            Self::Closed => "mpd_connection_closed",
            Self::NotConnected => "mpd_not_connected",
        }
    }
}

/// Result type for session-level operations.
pub type MpdResult<T> = Result<T, MpdError>;

// ─────────────────────────────────────────────────────────────────────────────
// Serialized Command Execution
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of a command issued through the connection manager.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The server rejected the command; the session stays healthy.
    #[error("{command} rejected: {source}")]
    Rejected {
        /// Command name.
        command: &'static str,
        /// The underlying `ACK`.
        #[source]
        source: MpdError,
    },

    /// No session could be (re)established for the command.
    #[error("{command} not sent: server unreachable after {attempts} reconnect attempt(s)")]
    Unavailable {
        /// Command name.
        command: &'static str,
        /// Reconnect attempts made before giving up.
        attempts: u32,
    },

    /// The command kept failing with connection errors.
    #[error("{command} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Command name.
        command: &'static str,
        /// Attempts consumed.
        attempts: u32,
        /// The last connection error observed.
        #[source]
        source: MpdError,
    },

    /// The session answered with a reply shape that does not fit the command.
    #[error("{0} returned an unexpected reply")]
    UnexpectedReply(&'static str),
}

impl ErrorCode for CommandError {
    fn code(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "command_rejected",
            Self::Unavailable { .. } => "server_unavailable",
            Self::Exhausted { .. } => "command_attempts_exhausted",
            Self::UnexpectedReply(_) => "unexpected_reply",
        }
    }
}

/// Result type for commands issued through the connection manager.
pub type CommandResult<T> = Result<T, CommandError>;

// ─────────────────────────────────────────────────────────────────────────────
// Artwork
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised while producing the artwork artifact.
#[derive(Debug, Error)]
pub enum ArtworkError {
    /// Candidate bytes could not be decoded as an image.
    #[error("Image decode failed: {0}")]
    Decode(String),

    /// The artifact (or its temporary file) could not be written.
    #[error("Failed to write artwork to {path}: {reason}")]
    Write {
        /// Destination that failed.
        path: PathBuf,
        /// Underlying failure.
        reason: String,
    },

    /// The placeholder image is missing and could not be created or copied.
    #[error("Placeholder unavailable at {path}: {reason}")]
    Placeholder {
        /// Placeholder location.
        path: PathBuf,
        /// Underlying failure.
        reason: String,
    },
}

impl ArtworkError {
    /// Returns true if the error only concerns one candidate.
    #[must_use]
    pub fn is_candidate_failure(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

impl ErrorCode for ArtworkError {
    fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "artwork_decode_failed",
            Self::Write { .. } => "artwork_write_failed",
            Self::Placeholder { .. } => "placeholder_unavailable",
        }
    }
}

/// Result type for artwork operations.
pub type ArtworkResult<T> = Result<T, ArtworkError>;

// ─────────────────────────────────────────────────────────────────────────────
// Track Reference List
// ─────────────────────────────────────────────────────────────────────────────

/// Errors looking up a keypad index in the track list file.
#[derive(Debug, Error)]
pub enum TrackListError {
    /// The list file could not be read.
    #[error("Cannot read track list {path}: {source}")]
    Unreadable {
        /// List file location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The index is outside `[1, line_count]`.
    #[error("Line {index} out of range (valid range: 1-{line_count})")]
    OutOfRange {
        /// Requested 1-based index.
        index: u32,
        /// Number of lines in the file.
        line_count: usize,
    },

    /// The line exists but holds no reference.
    #[error("Line {0} is blank")]
    BlankEntry(u32),
}

impl ErrorCode for TrackListError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unreadable { .. } => "track_list_unreadable",
            Self::OutOfRange { .. } => "track_index_out_of_range",
            Self::BlankEntry(_) => "track_list_blank_entry",
        }
    }
}

/// Failure of a keypad-triggered action.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The index could not be resolved to a reference.
    #[error(transparent)]
    TrackList(#[from] TrackListError),

    /// The command could not be completed.
    #[error(transparent)]
    Command(#[from] CommandError),
}

impl ErrorCode for DispatchError {
    fn code(&self) -> &'static str {
        match self {
            Self::TrackList(e) => e.code(),
            Self::Command(e) => e.code(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Application
// ─────────────────────────────────────────────────────────────────────────────

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum KioskError {
    /// Startup could not complete (server unreachable, placeholder missing).
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Configuration values are unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Artwork pipeline failure.
    #[error(transparent)]
    Artwork(#[from] ArtworkError),
}

impl KioskError {
    /// Returns a machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Initialization(_) => "initialization_failed",
            Self::Configuration(_) => "configuration_error",
            Self::Artwork(e) => e.code(),
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type KioskResult<T> = Result<T, KioskError>;
