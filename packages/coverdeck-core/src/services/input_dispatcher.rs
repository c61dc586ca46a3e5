//! Keypad input handling.
//!
//! Digits accumulate in a 4-wide [`InputBuffer`]. A complete entry is either
//! a reserved transport code or a 1-based line number in the track list.
//! The resulting command always runs on a spawned task so key handling
//! never waits on the network.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::InputConfig;
use crate::display::DisplaySink;
use crate::error::DispatchError;
use crate::events::{EventEmitter, QueueEvent};
use crate::mpd::TransportCommand;
use crate::protocol_constants::INPUT_WIDTH;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::ConnectionManager;
use crate::state::KioskState;
use crate::track_list::TrackReferenceList;
use crate::utils::{now_millis, right_justify};

/// Sliding window of the last [`INPUT_WIDTH`] digits typed.
#[derive(Debug, Default, Clone)]
pub struct InputBuffer {
    digits: VecDeque<char>,
}

impl InputBuffer {
    /// Appends `digit`, evicting the oldest one past the window width.
    /// Non-digits are ignored; returns whether the key was taken.
    pub fn push(&mut self, digit: char) -> bool {
        if !digit.is_ascii_digit() {
            return false;
        }
        self.digits.push_back(digit);
        while self.digits.len() > INPUT_WIDTH {
            self.digits.pop_front();
        }
        true
    }

    /// Returns the numeric value and empties the buffer once it is full.
    pub fn take_code(&mut self) -> Option<u16> {
        if self.digits.len() < INPUT_WIDTH {
            return None;
        }
        let value = self
            .digits
            .drain(..)
            .filter_map(|d| d.to_digit(10))
            .fold(0u16, |acc, d| acc * 10 + d as u16);
        Some(value)
    }

    /// Current contents as typed.
    pub fn as_string(&self) -> String {
        self.digits.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }
}

/// What a complete keypad entry asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A reserved code.
    Transport(TransportCommand),
    /// A 1-based track list line.
    Enqueue(u32),
}

/// A track added from the keypad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTrack {
    pub reference: String,
    /// `"artist - title"`, the title, or the bare reference.
    pub display: String,
    /// Locally tracked queue length after the add.
    pub queue_length: u32,
}

/// Turns keypad digits into server commands.
pub struct InputDispatcher {
    commands: Arc<ConnectionManager>,
    track_list: TrackReferenceList,
    state: Arc<KioskState>,
    display: Arc<dyn DisplaySink>,
    emitter: Arc<dyn EventEmitter>,
    config: InputConfig,
    buffer: Mutex<InputBuffer>,
    spawner: TokioSpawner,
}

impl InputDispatcher {
    /// Creates a new InputDispatcher.
    ///
    /// # Arguments
    /// * `commands` - Session shared with the watcher
    /// * `track_list` - Index to reference lookup
    /// * `state` - Shared queue length
    /// * `display` - Input and queue length displays
    /// * `emitter` - UI event sink
    /// * `config` - Reserved codes and autoplay
    /// * `spawner` - Runs dispatched commands
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        commands: Arc<ConnectionManager>,
        track_list: TrackReferenceList,
        state: Arc<KioskState>,
        display: Arc<dyn DisplaySink>,
        emitter: Arc<dyn EventEmitter>,
        config: InputConfig,
        spawner: TokioSpawner,
    ) -> Self {
        Self {
            commands,
            track_list,
            state,
            display,
            emitter,
            config,
            buffer: Mutex::new(InputBuffer::default()),
            spawner,
        }
    }

    /// Feeds one key into the buffer and echoes it on the input display.
    ///
    /// Returns the decision once four digits have been entered. Nothing is
    /// sent to the server here.
    pub fn handle_key(&self, key: char) -> Option<Dispatch> {
        let code = {
            let mut buffer = self.buffer.lock();
            if !buffer.push(key) {
                log::debug!("[InputDispatcher] Ignoring non-digit key {:?}", key);
                return None;
            }
            self.display.show_input(&right_justify(&buffer.as_string()));
            buffer.take_code()?
        };

        let dispatch = self.classify(code);
        log::info!("[InputDispatcher] {:04} -> {:?}", code, dispatch);
        Some(dispatch)
    }

    /// Reserved codes win over line numbers.
    pub fn classify(&self, code: u16) -> Dispatch {
        match self.config.reserved_codes.get(&code) {
            Some(command) => Dispatch::Transport(*command),
            None => Dispatch::Enqueue(u32::from(code)),
        }
    }

    /// Handles a key press, spawning the command if the entry is complete.
    pub fn press(self: &Arc<Self>, key: char) {
        let Some(dispatch) = self.handle_key(key) else {
            return;
        };
        let this = Arc::clone(self);
        self.spawner.spawn(async move {
            if let Err(e) = this.dispatch(dispatch).await {
                log::warn!("[InputDispatcher] {:?} dropped: {}", dispatch, e);
            }
        });
    }

    /// Executes a decision.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the line cannot be resolved or the
    /// server command fails.
    pub async fn dispatch(&self, dispatch: Dispatch) -> Result<(), DispatchError> {
        match dispatch {
            Dispatch::Transport(command) => {
                self.commands.transport(command).await?;
                log::info!("[InputDispatcher] Sent {:?}", command);
                Ok(())
            }
            Dispatch::Enqueue(index) => self.enqueue_line(index).await.map(|_| ()),
        }
    }

    /// Looks up line `index` and appends it to the play queue.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::TrackList`] if the list is unreadable or the index
    ///   is out of range (no command is sent)
    /// - [`DispatchError::Command`] if the server did not accept the add
    pub async fn enqueue_line(&self, index: u32) -> Result<QueuedTrack, DispatchError> {
        let reference = self.track_list.lookup(index).await?;
        self.commands.enqueue(&reference).await?;

        let queue_length = self.state.increment_queue();
        self.display
            .show_queue_length(&right_justify(&queue_length.to_string()));

        // Tagged tracks are announced by artist and title, anything else by reference
        let display = match self.commands.find_track(&reference).await {
            Ok(Some(track)) if track.title.is_some() => track.summary(),
            Ok(_) => reference.clone(),
            Err(e) => {
                log::debug!("[InputDispatcher] No tags for {}: {}", reference, e);
                reference.clone()
            }
        };
        log::info!("[InputDispatcher] Queued line {}: {}", index, display);
        self.emitter.emit_queue(QueueEvent::TrackAdded {
            reference: reference.clone(),
            display: display.clone(),
            queue_length,
            timestamp: now_millis(),
        });

        if self.config.autoplay_on_enqueue {
            if let Err(e) = self.commands.transport(TransportCommand::Play).await {
                log::warn!("[InputDispatcher] Autoplay failed: {}", e);
            }
        }

        Ok(QueuedTrack {
            reference,
            display,
            queue_length,
        })
    }
}
