//! Numeric display sink.
//!
//! The kiosk has two 4-digit 7-segment displays: one for the queue length and
//! one echoing keypad input. The core only produces right-justified strings;
//! a [`DisplaySink`] implementation decides how to show them.

/// Receiver for the two numeric displays.
pub trait DisplaySink: Send + Sync {
    /// Shows the current queue length (right-justified, 4 chars).
    fn show_queue_length(&self, value: &str);

    /// Shows the current keypad buffer (right-justified, 4 chars).
    fn show_input(&self, value: &str);
}

/// Display that writes values to the log.
pub struct LoggingDisplay;

impl DisplaySink for LoggingDisplay {
    fn show_queue_length(&self, value: &str) {
        log::info!("[Display] queue [{}]", value);
    }

    fn show_input(&self, value: &str) {
        log::info!("[Display] input [{}]", value);
    }
}
