//! Line protocol encoding and response parsing.
//!
//! Pure functions with no I/O: building command lines, splitting
//! `key: value` pairs, parsing `ACK` lines and turning pair lists into
//! typed replies. The session layer feeds them lines read from the socket.

use crate::error::{MpdError, MpdResult};
use crate::protocol_constants::{RESPONSE_ACK_PREFIX, SONG_RECORD_KEY};

use super::types::{Command, PlaybackState, PlayerStatus, Subsystem, Track};

/// A `key: value` pair from a response.
pub type Pair = (String, String);

/// Quotes an argument, escaping `"` and `\`.
#[must_use]
pub fn quote(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for ch in arg.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Builds the request line for `command`, without the trailing newline.
///
/// `readpicture` is chunked; `offset` selects the chunk and is ignored by
/// every other command.
#[must_use]
pub fn command_line(command: &Command, offset: usize) -> String {
    match command {
        Command::ReadPicture(uri) => format!("readpicture {} {}", quote(uri), offset),
        Command::Add(uri) => format!("add {}", quote(uri)),
        Command::FindFile(uri) => format!("find file {}", quote(uri)),
        other => other.name().to_string(),
    }
}

/// Builds an `idle` line for the given subsystems.
#[must_use]
pub fn idle_line(subsystems: &[Subsystem]) -> String {
    let mut line = String::from("idle");
    for subsystem in subsystems {
        line.push(' ');
        line.push_str(subsystem.as_str());
    }
    line
}

/// Splits a response line into a key and value.
pub fn parse_pair(line: &str) -> MpdResult<Pair> {
    line.split_once(": ")
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| MpdError::Protocol(format!("malformed response line: {:?}", line)))
}

/// Parses `ACK [code@index] {command} message`.
///
/// Returns `None` if the line is not an ACK at all.
#[must_use]
pub fn parse_ack(line: &str) -> Option<MpdError> {
    let rest = line.strip_prefix(RESPONSE_ACK_PREFIX)?;
    let fallback = || MpdError::Ack {
        code: 0,
        command: String::new(),
        message: rest.to_string(),
    };

    let Some(rest) = rest.strip_prefix('[') else {
        return Some(fallback());
    };
    let Some((location, rest)) = rest.split_once(']') else {
        return Some(fallback());
    };
    let code = location
        .split('@')
        .next()
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);

    let rest = rest.trim_start();
    let (command, message) = match rest.strip_prefix('{').and_then(|r| r.split_once('}')) {
        Some((command, message)) => (command.to_string(), message.trim_start().to_string()),
        None => (String::new(), rest.to_string()),
    };

    Some(MpdError::Ack {
        code,
        command,
        message,
    })
}

/// Returns the first value for `key`, matched case-insensitively.
#[must_use]
pub fn find_value<'a>(pairs: &'a [Pair], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Parses a `status` response.
pub fn parse_status(pairs: &[Pair]) -> MpdResult<PlayerStatus> {
    let state = find_value(pairs, "state")
        .map(PlaybackState::parse)
        .unwrap_or_default();
    let queue_length = match find_value(pairs, "playlistlength") {
        Some(v) => v
            .parse()
            .map_err(|_| MpdError::Protocol(format!("bad playlistlength: {:?}", v)))?,
        None => 0,
    };
    Ok(PlayerStatus {
        state,
        queue_length,
    })
}

/// Splits a song list into tracks; each record starts at a `file` key.
///
/// Pairs before the first `file` key are ignored.
#[must_use]
pub fn parse_tracks(pairs: &[Pair]) -> Vec<Track> {
    let mut tracks: Vec<Track> = Vec::new();
    for (key, value) in pairs {
        if key.eq_ignore_ascii_case(SONG_RECORD_KEY) {
            tracks.push(Track::new(value.clone()));
            continue;
        }
        let Some(current) = tracks.last_mut() else {
            continue;
        };
        if key.eq_ignore_ascii_case("artist") && current.artist.is_none() {
            current.artist = non_empty(value);
        } else if key.eq_ignore_ascii_case("title") && current.title.is_none() {
            current.title = non_empty(value);
        }
    }
    tracks
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
