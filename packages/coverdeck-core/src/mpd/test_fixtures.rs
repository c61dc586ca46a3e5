//! Shared test fixtures for the music-server client and its consumers.
//!
//! Two levels of fake:
//! - [`scripted_server`] speaks the real line protocol over an in-memory pipe
//! - [`FakeServer`] + [`FakeFactory`] stand in for whole sessions, with
//!   counters to inject failures and a log of the commands that ran

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use crate::error::{MpdError, MpdResult};

use super::traits::{MpdSession, SessionFactory};
use super::types::{Command, PlaybackState, PlayerStatus, Reply, Subsystem, Track};

/// Greeting sent by [`scripted_server`].
pub const GREETING: &str = "OK MPD 0.23.5\n";

/// Spawns a server that sends `greeting`, then for each exchange reads one
/// request line, checks it, and writes the canned response bytes.
pub fn scripted_server(
    greeting: &'static str,
    exchanges: Vec<(&'static str, Vec<u8>)>,
) -> DuplexStream {
    let (client, server) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        let (read_half, mut write_half) = tokio::io::split(server);
        let mut reader = BufReader::new(read_half);
        write_half.write_all(greeting.as_bytes()).await.unwrap();

        for (expected, response) in exchanges {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line.trim_end(), expected);
            write_half.write_all(&response).await.unwrap();
        }
    });
    client
}

/// Decrements `counter` if it is positive; returns whether it did.
fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// In-memory music server shared by every session a [`FakeFactory`] opens.
pub struct FakeServer {
    /// Number of `connect()` calls made.
    pub connects: AtomicU32,
    /// Upcoming `connect()` calls that fail.
    pub connect_failures: AtomicU32,
    /// Upcoming pings that fail with a dropped connection.
    pub ping_failures: AtomicU32,
    /// Upcoming non-ping commands that fail with a dropped connection.
    pub command_failures: AtomicU32,
    /// Upcoming idle waits that fail with a dropped connection.
    pub idle_failures: AtomicU32,
    /// Number of idle waits started.
    pub idle_calls: AtomicU32,
    /// Number of sessions closed.
    pub closes: AtomicU32,
    /// Command names the server answers with an ACK.
    pub rejected: Mutex<HashSet<&'static str>>,
    /// Non-ping commands that completed, in order.
    pub log: Mutex<Vec<Command>>,
    pub status: Mutex<PlayerStatus>,
    pub current: Mutex<Option<Track>>,
    pub picture: Mutex<Option<Bytes>>,
    pub library: Mutex<Vec<Track>>,
    /// Canned idle results; when empty an idle wait sleeps for its timeout.
    pub idle_results: Mutex<VecDeque<Vec<String>>>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connects: AtomicU32::new(0),
            connect_failures: AtomicU32::new(0),
            ping_failures: AtomicU32::new(0),
            command_failures: AtomicU32::new(0),
            idle_failures: AtomicU32::new(0),
            idle_calls: AtomicU32::new(0),
            closes: AtomicU32::new(0),
            rejected: Mutex::new(HashSet::new()),
            log: Mutex::new(Vec::new()),
            status: Mutex::new(PlayerStatus {
                state: PlaybackState::Stop,
                queue_length: 0,
            }),
            current: Mutex::new(None),
            picture: Mutex::new(None),
            library: Mutex::new(Vec::new()),
            idle_results: Mutex::new(VecDeque::new()),
        })
    }

    /// Names of the commands that completed, in order.
    pub fn command_names(&self) -> Vec<&'static str> {
        self.log.lock().iter().map(Command::name).collect()
    }

    pub fn set_current(&self, track: Option<Track>) {
        *self.current.lock() = track;
    }

    pub fn set_queue_length(&self, length: u32) {
        self.status.lock().queue_length = length;
    }

    fn reply(&self, command: &Command) -> MpdResult<Reply> {
        if self.rejected.lock().contains(command.name()) {
            return Err(MpdError::Ack {
                code: 50,
                command: command.name().to_string(),
                message: "rejected by fake".to_string(),
            });
        }
        self.log.lock().push(command.clone());

        Ok(match command {
            Command::Status => Reply::Status(*self.status.lock()),
            Command::CurrentSong => Reply::CurrentSong(self.current.lock().clone()),
            Command::ReadPicture(_) => Reply::Picture(self.picture.lock().clone()),
            Command::FindFile(uri) => Reply::Songs(
                self.library
                    .lock()
                    .iter()
                    .filter(|t| &t.reference == uri)
                    .cloned()
                    .collect(),
            ),
            Command::Add(_) => {
                self.status.lock().queue_length += 1;
                Reply::Done
            }
            Command::Clear => {
                self.status.lock().queue_length = 0;
                Reply::Done
            }
            _ => Reply::Done,
        })
    }
}

/// Session handed out by [`FakeFactory`].
pub struct FakeSession {
    server: Arc<FakeServer>,
}

#[async_trait]
impl MpdSession for FakeSession {
    async fn run(&mut self, command: &Command) -> MpdResult<Reply> {
        if *command == Command::Ping {
            if take(&self.server.ping_failures) {
                return Err(MpdError::Closed);
            }
            return Ok(Reply::Done);
        }
        if take(&self.server.command_failures) {
            return Err(MpdError::Closed);
        }
        self.server.reply(command)
    }

    async fn idle(&mut self, _subsystems: &[Subsystem], timeout: Duration) -> MpdResult<Vec<String>> {
        self.server.idle_calls.fetch_add(1, Ordering::SeqCst);
        if take(&self.server.idle_failures) {
            return Err(MpdError::Closed);
        }
        let canned = self.server.idle_results.lock().pop_front();
        match canned {
            Some(changed) => Ok(changed),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
        }
    }

    async fn close(&mut self) {
        self.server.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory producing [`FakeSession`]s against one [`FakeServer`].
pub struct FakeFactory {
    pub server: Arc<FakeServer>,
}

impl FakeFactory {
    pub fn new(server: &Arc<FakeServer>) -> Arc<Self> {
        Arc::new(Self {
            server: Arc::clone(server),
        })
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn connect(&self) -> MpdResult<Box<dyn MpdSession>> {
        self.server.connects.fetch_add(1, Ordering::SeqCst);
        if take(&self.server.connect_failures) {
            return Err(MpdError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused by fake",
            )));
        }
        Ok(Box::new(FakeSession {
            server: Arc::clone(&self.server),
        }))
    }

    fn describe(&self) -> String {
        "fake:6600".to_string()
    }
}
