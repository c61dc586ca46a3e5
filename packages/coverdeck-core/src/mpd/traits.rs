//! Session abstractions.
//!
//! [`MpdSession`] is one open, authenticated connection. It is owned
//! exclusively by a [`ConnectionManager`](crate::services::ConnectionManager)
//! and takes `&mut self`: nothing else ever holds a session.
//!
//! [`SessionFactory`] builds fresh sessions so the manager can discard a
//! broken one and reconnect. Tests inject scripted factories.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::MpdResult;

use super::types::{Command, Reply, Subsystem};

/// One live connection to the music server.
#[async_trait]
pub trait MpdSession: Send {
    /// Runs a command and parses its reply.
    async fn run(&mut self, command: &Command) -> MpdResult<Reply>;

    /// Blocks until one of `subsystems` changes or `timeout` elapses.
    ///
    /// Returns the changed subsystem names; an empty list means the wait
    /// timed out and was cancelled cleanly.
    async fn idle(&mut self, subsystems: &[Subsystem], timeout: Duration) -> MpdResult<Vec<String>>;

    /// Politely closes the connection. Errors are ignored.
    async fn close(&mut self);

    /// Lightweight health probe.
    async fn ping(&mut self) -> MpdResult<()> {
        self.run(&Command::Ping).await.map(|_| ())
    }
}

/// Creates connected, authenticated sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Opens a new session.
    async fn connect(&self) -> MpdResult<Box<dyn MpdSession>>;

    /// Human-readable address for logs.
    fn describe(&self) -> String;
}
