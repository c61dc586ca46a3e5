//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol_constants::INPUT_WIDTH;

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Display Formatting
// ─────────────────────────────────────────────────────────────────────────────

/// Right-justifies `value` to the display width.
///
/// Longer values are passed through unchanged; the display driver shows the
/// leftmost digits it can fit.
#[must_use]
pub fn right_justify(value: &str) -> String {
    format!("{:>width$}", value, width = INPUT_WIDTH)
}

/// Returns the last path component of a track reference.
#[must_use]
pub fn reference_file_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}
