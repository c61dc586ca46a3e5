//! Music server client.
//!
//! This module provides a minimal async client for the server's text
//! protocol, covering only the commands the kiosk issues:
//!
//! - [`protocol`]: command encoding and response parsing (no I/O)
//! - [`session`]: a tokio connection plus the TCP [`SessionFactory`]
//! - [`traits`]: the [`MpdSession`] / [`SessionFactory`] seams
//! - [`types`]: tracks, status, commands and replies

pub mod protocol;
pub mod session;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use session::{MpdConnection, TcpSessionFactory};
pub use traits::{MpdSession, SessionFactory};
pub use types::{
    Command, PlaybackState, PlayerStatus, QueueSnapshot, Reply, Subsystem, Track,
    TransportCommand,
};
