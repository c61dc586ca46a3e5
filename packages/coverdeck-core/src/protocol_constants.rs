//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the music server's line protocol or by the
//! display hardware and changing them would break compatibility.

// ─────────────────────────────────────────────────────────────────────────────
// Music Server Line Protocol
// ─────────────────────────────────────────────────────────────────────────────

/// Prefix of the greeting line sent by the server on connect.
pub const GREETING_PREFIX: &str = "OK MPD ";

/// Line terminating a successful response.
pub const RESPONSE_OK: &str = "OK";

/// Prefix of a line reporting a rejected command.
pub const RESPONSE_ACK_PREFIX: &str = "ACK ";

/// Key announcing a raw binary payload of the given length.
pub const BINARY_KEY: &str = "binary";

/// Key that opens a new song record in list responses.
pub const SONG_RECORD_KEY: &str = "file";

/// Key carrying subsystem names in an idle response.
pub const CHANGED_KEY: &str = "changed";

/// Default TCP port of the music server.
pub const DEFAULT_MPD_PORT: u16 = 6600;

// ─────────────────────────────────────────────────────────────────────────────
// Keypad and Display
// ─────────────────────────────────────────────────────────────────────────────

/// Width of the keypad input buffer and of each 7-segment display.
pub const INPUT_WIDTH: usize = 4;

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the UI event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
