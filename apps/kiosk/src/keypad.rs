//! Keypad input from the controlling terminal.
//!
//! USB keypads show up as keyboards. The terminal is switched to raw mode so
//! every key press arrives on its own, without waiting for Enter.

use std::io;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

/// Keeps the terminal in raw mode until dropped.
pub struct RawModeGuard(());

impl RawModeGuard {
    /// Switches the terminal to raw mode.
    pub fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            log::warn!("[Keypad] Failed to restore terminal: {}", e);
        }
    }
}

/// Forwards every key press from `events` to `on_key` until the stream ends
/// or `cancel` fires.
///
/// Raw mode swallows the terminal's SIGINT, so Ctrl-C is handled here by
/// cancelling `cancel`.
pub async fn forward_keys<S, F>(mut events: S, mut on_key: F, cancel: CancellationToken)
where
    S: Stream<Item = io::Result<Event>> + Unpin,
    F: FnMut(char),
{
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.next() => event,
        };

        match event {
            Some(Ok(Event::Key(KeyEvent {
                code: KeyCode::Char(key),
                modifiers,
                kind: KeyEventKind::Press,
                ..
            }))) => {
                if modifiers.contains(KeyModifiers::CONTROL) {
                    if key == 'c' {
                        log::info!("[Keypad] Ctrl-C pressed, shutting down");
                        cancel.cancel();
                        break;
                    }
                    continue;
                }
                on_key(key);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                log::warn!("[Keypad] Read failed: {}", e);
                break;
            }
            None => {
                log::info!("[Keypad] Input closed");
                break;
            }
        }
    }
}
