//! Resilient, serialized access to the music server.
//!
//! A [`ConnectionManager`] owns exactly one session. Every operation takes
//! the session lock for its whole probe-reconnect-execute sequence, so a
//! reconnect can never race a command and no two commands ever interleave on
//! the wire.
//!
//! Reconnects discard the old session, open a fresh one through the
//! [`SessionFactory`], and back off `min(2^attempt, max_backoff)` seconds
//! between failed attempts.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::RetryConfig;
use crate::error::{CommandError, CommandResult, MpdError, MpdResult};
use crate::events::{ConnectionEvent, EventEmitter};
use crate::mpd::{
    Command, MpdSession, PlayerStatus, Reply, SessionFactory, Subsystem, Track, TransportCommand,
};
use crate::utils::now_millis;

/// Connection lifecycle as observed by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ConnectionState {
    /// No session (initial state, or after a session broke).
    Disconnected,
    /// The last probe or command succeeded.
    Connected,
    /// A reconnect sequence is at (or gave up at) `attempt`.
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    /// True when a healthy session is held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Current reconnect attempt; 0 unless reconnecting.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        match self {
            Self::Reconnecting { attempt } => *attempt,
            _ => 0,
        }
    }
}

type SessionSlot = Option<Box<dyn MpdSession>>;

/// Owns one session to the music server and serializes access to it.
pub struct ConnectionManager {
    /// Label for logs and events (`commands` or `events`).
    channel: &'static str,
    factory: Arc<dyn SessionFactory>,
    session: Mutex<SessionSlot>,
    state: RwLock<ConnectionState>,
    retry: RetryConfig,
    emitter: Arc<dyn EventEmitter>,
}

impl ConnectionManager {
    /// Creates a manager with no open session.
    ///
    /// # Arguments
    /// * `channel` - Label used in logs and connection events
    /// * `factory` - Opens fresh sessions
    /// * `retry` - Reconnect and command budget
    /// * `emitter` - Receives state change events
    pub fn new(
        channel: &'static str,
        factory: Arc<dyn SessionFactory>,
        retry: RetryConfig,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            channel,
            factory,
            session: Mutex::new(None),
            state: RwLock::new(ConnectionState::Disconnected),
            retry,
            emitter,
        }
    }

    /// Returns the last observed state without touching the session.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, next: ConnectionState) {
        {
            let mut state = self.state.write();
            if *state == next {
                return;
            }
            *state = next;
        }
        log::debug!("[ConnectionManager:{}] State -> {:?}", self.channel, next);
        self.emitter.emit_connection(ConnectionEvent::StateChanged {
            channel: self.channel,
            state: next,
            timestamp: now_millis(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Probes the session and reconnects if the probe fails.
    ///
    /// Returns `Connected` on success, or `Reconnecting` with the last attempt
    /// number once the reconnect budget is spent. The caller decides when to
    /// try again.
    pub async fn ensure_connected(&self) -> ConnectionState {
        let mut slot = self.session.lock().await;
        if probe(&mut slot).await {
            self.set_state(ConnectionState::Connected);
            return ConnectionState::Connected;
        }
        self.reconnect_locked(&mut slot).await
    }

    /// Discards the current session and runs a full reconnect sequence.
    pub async fn reconnect(&self) -> ConnectionState {
        let mut slot = self.session.lock().await;
        self.reconnect_locked(&mut slot).await
    }

    /// Closes the session, if any.
    pub async fn close(&self) {
        let mut slot = self.session.lock().await;
        self.discard_locked(&mut slot).await;
    }

    async fn reconnect_locked(&self, slot: &mut SessionSlot) -> ConnectionState {
        if let Some(mut old) = slot.take() {
            old.close().await;
        }

        let max_attempts = self.retry.max_attempts;
        log::warn!(
            "[ConnectionManager:{}] Reconnecting to {} (max attempts: {})",
            self.channel,
            self.factory.describe(),
            max_attempts
        );

        for attempt in 1..=max_attempts {
            self.set_state(ConnectionState::Reconnecting { attempt });
            match self.open_session().await {
                Ok(session) => {
                    *slot = Some(session);
                    self.set_state(ConnectionState::Connected);
                    log::info!(
                        "[ConnectionManager:{}] Connected (attempt {}/{})",
                        self.channel,
                        attempt,
                        max_attempts
                    );
                    return ConnectionState::Connected;
                }
                Err(e) if attempt < max_attempts => {
                    let wait = self.retry.backoff(attempt);
                    log::warn!(
                        "[ConnectionManager:{}] Attempt {}/{} failed, retrying in {:?}: {}",
                        self.channel,
                        attempt,
                        max_attempts,
                        wait,
                        e
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    log::warn!(
                        "[ConnectionManager:{}] Attempt {}/{} failed: {}",
                        self.channel,
                        attempt,
                        max_attempts,
                        e
                    );
                }
            }
        }

        log::error!(
            "[ConnectionManager:{}] Failed to reconnect after {} attempts",
            self.channel,
            max_attempts
        );
        ConnectionState::Reconnecting {
            attempt: max_attempts,
        }
    }

    /// Connects, authenticates and confirms with a probe.
    async fn open_session(&self) -> MpdResult<Box<dyn MpdSession>> {
        let mut session = self.factory.connect().await?;
        if let Err(e) = session.ping().await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    async fn discard_locked(&self, slot: &mut SessionSlot) {
        if let Some(mut session) = slot.take() {
            session.close().await;
        }
        self.set_state(ConnectionState::Disconnected);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Command execution
    // ─────────────────────────────────────────────────────────────────────────

    /// Runs `command` with health-check-then-reconnect semantics.
    ///
    /// Each pass probes the session, reconnects inline if the probe fails,
    /// then runs the command. Connection errors consume a pass; a server
    /// `ACK` returns immediately since the session is still healthy.
    ///
    /// # Errors
    ///
    /// - [`CommandError::Rejected`] if the server refused the command
    /// - [`CommandError::Unavailable`] if a reconnect ran out of attempts
    /// - [`CommandError::Exhausted`] if every pass hit a connection error
    pub async fn execute(&self, command: Command) -> CommandResult<Reply> {
        let name = command.name();
        let passes = self.retry.command_attempts;
        let mut slot = self.session.lock().await;
        let mut last_error = MpdError::NotConnected;

        for pass in 1..=passes {
            if !probe(&mut slot).await {
                log::warn!(
                    "[ConnectionManager:{}] Connection lost before {} (attempt {}/{})",
                    self.channel,
                    name,
                    pass,
                    passes
                );
                let state = self.reconnect_locked(&mut slot).await;
                if !state.is_connected() {
                    return Err(CommandError::Unavailable {
                        command: name,
                        attempts: state.attempt(),
                    });
                }
            }

            let Some(session) = slot.as_mut() else {
                continue;
            };
            let result = session.run(&command).await;
            match result {
                Ok(reply) => {
                    log::debug!("[ConnectionManager:{}] Executed {}", self.channel, command);
                    self.set_state(ConnectionState::Connected);
                    return Ok(reply);
                }
                Err(e) if !e.is_recoverable() => {
                    return Err(CommandError::Rejected {
                        command: name,
                        source: e,
                    });
                }
                Err(e) => {
                    log::warn!(
                        "[ConnectionManager:{}] {} failed (attempt {}/{}): {}",
                        self.channel,
                        name,
                        pass,
                        passes,
                        e
                    );
                    self.discard_locked(&mut slot).await;
                    last_error = e;
                }
            }
        }

        Err(CommandError::Exhausted {
            command: name,
            attempts: passes,
            source: last_error,
        })
    }

    /// Blocks on the server's idle primitive.
    ///
    /// Does not reconnect by itself: a connection error drops the session and
    /// is returned so the caller can apply its own retry policy.
    pub async fn wait_for_events(
        &self,
        subsystems: &[Subsystem],
        timeout: Duration,
    ) -> MpdResult<Vec<String>> {
        let mut slot = self.session.lock().await;
        let session = slot.as_mut().ok_or(MpdError::NotConnected)?;
        let result = session.idle(subsystems, timeout).await;
        match result {
            Ok(changed) => Ok(changed),
            Err(e) => {
                if e.is_recoverable() {
                    self.discard_locked(&mut slot).await;
                }
                Err(e)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Typed helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Queries playback state and queue length.
    pub async fn status(&self) -> CommandResult<PlayerStatus> {
        match self.execute(Command::Status).await? {
            Reply::Status(status) => Ok(status),
            _ => Err(CommandError::UnexpectedReply("status")),
        }
    }

    /// Queries the current track; `None` when nothing is selected.
    pub async fn current_track(&self) -> CommandResult<Option<Track>> {
        match self.execute(Command::CurrentSong).await? {
            Reply::CurrentSong(track) => Ok(track),
            _ => Err(CommandError::UnexpectedReply("currentsong")),
        }
    }

    /// Fetches the server-side embedded picture for `reference`.
    pub async fn read_picture(&self, reference: &str) -> CommandResult<Option<Bytes>> {
        match self
            .execute(Command::ReadPicture(reference.to_string()))
            .await?
        {
            Reply::Picture(picture) => Ok(picture),
            _ => Err(CommandError::UnexpectedReply("readpicture")),
        }
    }

    /// Looks up tags for an exact reference.
    pub async fn find_track(&self, reference: &str) -> CommandResult<Option<Track>> {
        match self.execute(Command::FindFile(reference.to_string())).await? {
            Reply::Songs(songs) => Ok(songs.into_iter().next()),
            _ => Err(CommandError::UnexpectedReply("find")),
        }
    }

    /// Appends `reference` to the play queue.
    pub async fn enqueue(&self, reference: &str) -> CommandResult<()> {
        self.execute(Command::Add(reference.to_string()))
            .await
            .map(|_| ())
    }

    /// Issues a transport command.
    pub async fn transport(&self, command: TransportCommand) -> CommandResult<()> {
        self.execute(Command::from(command)).await.map(|_| ())
    }
}

/// Pings the held session; false if there is none or the ping fails.
async fn probe(slot: &mut SessionSlot) -> bool {
    let Some(session) = slot.as_mut() else {
        return false;
    };
    match session.ping().await {
        Ok(()) => true,
        Err(e) => {
            log::debug!("[ConnectionManager] Probe failed: {}", e);
            false
        }
    }
}
