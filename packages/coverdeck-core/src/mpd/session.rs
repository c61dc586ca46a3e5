//! Tokio client for the music server's line protocol.
//!
//! [`MpdConnection`] wraps any bidirectional byte stream (a `TcpStream` in
//! production, an in-memory duplex pipe in tests). Every read and write is
//! bounded by the configured timeout; a timed-out session is considered
//! desynchronized and must be discarded by the owner.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;

use crate::config::MpdConfig;
use crate::error::{MpdError, MpdResult};
use crate::protocol_constants::{BINARY_KEY, CHANGED_KEY, GREETING_PREFIX, RESPONSE_OK};

use super::protocol::{
    command_line, idle_line, parse_ack, parse_pair, parse_status, parse_tracks, quote, Pair,
};
use super::traits::{MpdSession, SessionFactory};
use super::types::{Command, Reply, Subsystem};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One chunk of a `readpicture` response.
struct PictureChunk {
    /// Total picture size announced by the server.
    size: usize,
    data: Vec<u8>,
}

/// An open connection to the music server.
pub struct MpdConnection {
    reader: BufReader<BoxedReader>,
    writer: BoxedWriter,
    timeout: Duration,
    version: String,
    /// Bytes of the line currently being read. Kept across calls so a
    /// timed-out idle read never drops a partial line.
    line: Vec<u8>,
}

impl MpdConnection {
    /// Reads the server greeting and returns a ready connection.
    ///
    /// # Arguments
    /// * `stream` - Connected byte stream
    /// * `timeout` - Bound applied to every subsequent read and write
    pub async fn handshake<S>(stream: S, timeout: Duration) -> MpdResult<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let reader: BoxedReader = Box::new(read_half);
        let writer: BoxedWriter = Box::new(write_half);

        let mut conn = Self {
            reader: BufReader::new(reader),
            writer,
            timeout,
            version: String::new(),
            line: Vec::new(),
        };

        let greeting = conn.read_line().await?;
        let version = greeting
            .strip_prefix(GREETING_PREFIX)
            .ok_or_else(|| MpdError::Protocol(format!("unexpected greeting: {:?}", greeting)))?;
        conn.version = version.to_string();
        Ok(conn)
    }

    /// Protocol version announced in the greeting.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Sends the password. A wrong password comes back as an `ACK`.
    pub async fn authenticate(&mut self, password: &str) -> MpdResult<()> {
        self.send(&format!("password {}", quote(password))).await?;
        self.read_pairs().await.map(|_| ())
    }

    async fn send(&mut self, line: &str) -> MpdResult<()> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        let limit = self.timeout;
        let writer = &mut self.writer;
        tokio::time::timeout(limit, async move {
            writer.write_all(&buf).await?;
            writer.flush().await
        })
        .await
        .map_err(|_| MpdError::Timeout(limit))??;
        Ok(())
    }

    async fn read_line(&mut self) -> MpdResult<String> {
        self.read_line_within(self.timeout).await
    }

    async fn read_line_within(&mut self, limit: Duration) -> MpdResult<String> {
        tokio::time::timeout(limit, self.reader.read_until(b'\n', &mut self.line))
            .await
            .map_err(|_| MpdError::Timeout(limit))??;

        if self.line.last() != Some(&b'\n') {
            // EOF before a full line
            self.line.clear();
            return Err(MpdError::Closed);
        }

        let raw = std::mem::take(&mut self.line);
        let text = String::from_utf8_lossy(&raw);
        Ok(text.trim_end_matches(['\n', '\r']).to_string())
    }

    async fn read_pairs(&mut self) -> MpdResult<Vec<Pair>> {
        let mut pairs = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == RESPONSE_OK {
                return Ok(pairs);
            }
            if let Some(err) = parse_ack(&line) {
                return Err(err);
            }
            pairs.push(parse_pair(&line)?);
        }
    }

    async fn exchange(&mut self, command: &Command) -> MpdResult<Vec<Pair>> {
        self.send(&command_line(command, 0)).await?;
        self.read_pairs().await
    }

    async fn read_exact_within(&mut self, buf: &mut [u8]) -> MpdResult<()> {
        let limit = self.timeout;
        tokio::time::timeout(limit, self.reader.read_exact(buf))
            .await
            .map_err(|_| MpdError::Timeout(limit))??;
        Ok(())
    }

    /// Reads one `readpicture` response; `None` when the server has no picture.
    async fn read_picture_chunk(&mut self) -> MpdResult<Option<PictureChunk>> {
        let mut size = None;
        loop {
            let line = self.read_line().await?;
            if line == RESPONSE_OK {
                return Ok(None);
            }
            if let Some(err) = parse_ack(&line) {
                return Err(err);
            }

            let (key, value) = parse_pair(&line)?;
            if key == "size" {
                size = Some(parse_len(&value)?);
            } else if key == BINARY_KEY {
                let len = parse_len(&value)?;
                let mut data = vec![0u8; len];
                self.read_exact_within(&mut data).await?;

                let mut newline = [0u8; 1];
                self.read_exact_within(&mut newline).await?;
                if newline[0] != b'\n' {
                    return Err(MpdError::Protocol(
                        "binary payload not terminated by newline".to_string(),
                    ));
                }

                let trailer = self.read_line().await?;
                if trailer != RESPONSE_OK {
                    return Err(MpdError::Protocol(format!(
                        "expected OK after binary payload, got {:?}",
                        trailer
                    )));
                }

                return Ok(Some(PictureChunk {
                    size: size.unwrap_or(len),
                    data,
                }));
            }
        }
    }

    async fn read_picture(&mut self, command: &Command) -> MpdResult<Option<Bytes>> {
        let mut picture = BytesMut::new();
        loop {
            self.send(&command_line(command, picture.len())).await?;
            let Some(chunk) = self.read_picture_chunk().await? else {
                break;
            };
            if chunk.data.is_empty() {
                break;
            }
            picture.extend_from_slice(&chunk.data);
            if picture.len() >= chunk.size {
                break;
            }
        }

        if picture.is_empty() {
            Ok(None)
        } else {
            Ok(Some(picture.freeze()))
        }
    }
}

fn parse_len(value: &str) -> MpdResult<usize> {
    value
        .parse()
        .map_err(|_| MpdError::Protocol(format!("bad length: {:?}", value)))
}

#[async_trait]
impl MpdSession for MpdConnection {
    async fn run(&mut self, command: &Command) -> MpdResult<Reply> {
        match command {
            Command::ReadPicture(_) => self.read_picture(command).await.map(Reply::Picture),
            Command::Status => {
                let pairs = self.exchange(command).await?;
                parse_status(&pairs).map(Reply::Status)
            }
            Command::CurrentSong => {
                let pairs = self.exchange(command).await?;
                Ok(Reply::CurrentSong(parse_tracks(&pairs).into_iter().next()))
            }
            Command::FindFile(_) => {
                let pairs = self.exchange(command).await?;
                Ok(Reply::Songs(parse_tracks(&pairs)))
            }
            _ => {
                self.exchange(command).await?;
                Ok(Reply::Done)
            }
        }
    }

    async fn idle(&mut self, subsystems: &[Subsystem], timeout: Duration) -> MpdResult<Vec<String>> {
        self.send(&idle_line(subsystems)).await?;

        let mut pending = match self.read_line_within(timeout).await {
            Ok(line) => Some(line),
            Err(MpdError::Timeout(_)) => {
                log::debug!("[MpdSession] Idle wait timed out after {:?}", timeout);
                self.send("noidle").await?;
                None
            }
            Err(e) => return Err(e),
        };

        let mut changed = Vec::new();
        loop {
            let line = match pending.take() {
                Some(line) => line,
                None => self.read_line().await?,
            };
            if line == RESPONSE_OK {
                return Ok(changed);
            }
            if let Some(err) = parse_ack(&line) {
                return Err(err);
            }
            let (key, value) = parse_pair(&line)?;
            if key == CHANGED_KEY {
                changed.push(value);
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.send("close").await {
            log::debug!("[MpdSession] Close failed: {}", e);
        }
        let _ = self.writer.shutdown().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TCP Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Opens TCP sessions to the configured server.
pub struct TcpSessionFactory {
    config: MpdConfig,
}

impl TcpSessionFactory {
    /// Creates a factory for the given server.
    #[must_use]
    pub fn new(config: MpdConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for TcpSessionFactory {
    async fn connect(&self) -> MpdResult<Box<dyn MpdSession>> {
        let limit = self.config.timeout;
        let stream = tokio::time::timeout(
            limit,
            TcpStream::connect((self.config.host.as_str(), self.config.port)),
        )
        .await
        .map_err(|_| MpdError::Timeout(limit))??;
        stream.set_nodelay(true)?;

        let mut conn = MpdConnection::handshake(stream, limit).await?;
        if let Some(password) = self.config.password.as_deref() {
            conn.authenticate(password).await?;
        }

        log::debug!(
            "[MpdSession] Connected to {} (protocol {})",
            self.describe(),
            conn.version()
        );
        Ok(Box::new(conn))
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpd::test_fixtures::{scripted_server, GREETING};
    use crate::mpd::PlaybackState;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn connect(exchanges: Vec<(&'static str, Vec<u8>)>) -> MpdConnection {
        let stream = scripted_server(GREETING, exchanges);
        MpdConnection::handshake(stream, TIMEOUT)
            .await
            .expect("handshake")
    }

    #[tokio::test]
    async fn handshake_reads_version() {
        let conn = connect(vec![]).await;
        assert_eq!(conn.version(), "0.23.5");
    }

    #[tokio::test]
    async fn handshake_rejects_foreign_greeting() {
        let stream = scripted_server("SSH-2.0-OpenSSH\n", vec![]);
        let err = MpdConnection::handshake(stream, TIMEOUT)
            .await
            .err()
            .expect("should reject");
        assert!(matches!(err, MpdError::Protocol(_)));
    }

    #[tokio::test]
    async fn status_is_parsed() {
        let mut conn = connect(vec![(
            "status",
            b"volume: 100\nstate: play\nplaylistlength: 7\nOK\n".to_vec(),
        )])
        .await;

        let reply = conn.run(&Command::Status).await.unwrap();
        match reply {
            Reply::Status(status) => {
                assert_eq!(status.state, PlaybackState::Play);
                assert_eq!(status.queue_length, 7);
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_currentsong_is_none() {
        let mut conn = connect(vec![("currentsong", b"OK\n".to_vec())]).await;
        assert_eq!(
            conn.run(&Command::CurrentSong).await.unwrap(),
            Reply::CurrentSong(None)
        );
    }

    #[tokio::test]
    async fn ack_becomes_error() {
        let mut conn = connect(vec![(
            "add \"missing.flac\"",
            b"ACK [50@0] {add} No such directory\n".to_vec(),
        )])
        .await;

        let err = conn
            .run(&Command::Add("missing.flac".into()))
            .await
            .unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn readpicture_reassembles_chunks() {
        let mut first = b"size: 6\ntype: image/png\nbinary: 4\n".to_vec();
        first.extend_from_slice(&[1, 2, 3, 4]);
        first.extend_from_slice(b"\nOK\n");
        let mut second = b"size: 6\nbinary: 2\n".to_vec();
        second.extend_from_slice(&[5, 6]);
        second.extend_from_slice(b"\nOK\n");

        let mut conn = connect(vec![
            ("readpicture \"a.flac\" 0", first),
            ("readpicture \"a.flac\" 4", second),
        ])
        .await;

        let reply = conn
            .run(&Command::ReadPicture("a.flac".into()))
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::Picture(Some(Bytes::from_static(&[1, 2, 3, 4, 5, 6])))
        );
    }

    #[tokio::test]
    async fn readpicture_without_picture_is_none() {
        let mut conn = connect(vec![("readpicture \"a.flac\" 0", b"OK\n".to_vec())]).await;
        assert_eq!(
            conn.run(&Command::ReadPicture("a.flac".into()))
                .await
                .unwrap(),
            Reply::Picture(None)
        );
    }

    #[tokio::test]
    async fn idle_returns_changed_subsystems() {
        let mut conn = connect(vec![("idle player", b"changed: player\nOK\n".to_vec())]).await;
        let changed = conn
            .idle(&[Subsystem::Player], Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(changed, vec!["player".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_sends_noidle() {
        let mut conn = connect(vec![
            ("idle player", Vec::new()),
            ("noidle", b"OK\n".to_vec()),
        ])
        .await;
        let changed = conn
            .idle(&[Subsystem::Player], Duration::from_secs(60))
            .await
            .unwrap();
        assert!(changed.is_empty());
    }

    #[tokio::test]
    async fn server_hangup_is_closed() {
        let mut conn = connect(vec![]).await;
        let err = conn.run(&Command::Ping).await.unwrap_err();
        assert!(matches!(err, MpdError::Closed | MpdError::Io(_)));
        assert!(err.is_recoverable());
    }
}
