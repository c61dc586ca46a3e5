//! Artwork lookup strategies.
//!
//! Each strategy answers "do you have image bytes for this track?" and never
//! fails: every error is logged and reported as "nothing found" so the
//! resolver can move on to the next one.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::{embedded, normalize, ArtSource, ArtifactResult};
use crate::mpd::Track;
use crate::services::ConnectionManager;

/// One step in the artwork fallback chain.
#[async_trait]
pub trait ArtStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Looks for image bytes for `track`; `None` if there are none.
    async fn fetch(&self, track: &Track) -> Option<ArtifactResult>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Server picture
// ─────────────────────────────────────────────────────────────────────────────

/// Asks the music server for the picture embedded in the track.
pub struct ServerPictureStrategy {
    commands: Arc<ConnectionManager>,
}

impl ServerPictureStrategy {
    pub fn new(commands: Arc<ConnectionManager>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl ArtStrategy for ServerPictureStrategy {
    fn name(&self) -> &'static str {
        "server picture"
    }

    async fn fetch(&self, track: &Track) -> Option<ArtifactResult> {
        match self.commands.read_picture(&track.reference).await {
            Ok(Some(bytes)) if !bytes.is_empty() => Some(ArtifactResult {
                source: ArtSource::ServerPicture,
                bytes,
            }),
            Ok(_) => None,
            Err(e) => {
                log::debug!(
                    "[ArtResolver] readpicture failed for {}: {}",
                    track.reference,
                    e
                );
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedded tags
// ─────────────────────────────────────────────────────────────────────────────

/// Reads the picture from the media file's own tags.
pub struct EmbeddedTagStrategy {
    library: PathBuf,
}

impl EmbeddedTagStrategy {
    /// `library` is the directory track references are relative to.
    pub fn new(library: impl Into<PathBuf>) -> Self {
        Self {
            library: library.into(),
        }
    }
}

#[async_trait]
impl ArtStrategy for EmbeddedTagStrategy {
    fn name(&self) -> &'static str {
        "embedded tags"
    }

    async fn fetch(&self, track: &Track) -> Option<ArtifactResult> {
        let path = self.library.join(&track.reference);
        if !path.is_file() {
            log::debug!("[ArtResolver] Media file not found: {}", path.display());
            return None;
        }

        match tokio::task::spawn_blocking(move || embedded::extract_cover(&path)).await {
            Ok(found) => found.map(|(source, bytes)| ArtifactResult {
                source,
                bytes: Bytes::from(bytes),
            }),
            Err(e) => {
                log::warn!("[ArtResolver] Tag reader task failed: {}", e);
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory covers
// ─────────────────────────────────────────────────────────────────────────────

/// Looks for conventional cover files next to the track.
pub struct DirectoryCoverStrategy {
    library: PathBuf,
    filenames: Vec<String>,
}

impl DirectoryCoverStrategy {
    /// # Arguments
    /// * `library` - Directory track references are relative to
    /// * `filenames` - Candidate names, in priority order
    pub fn new(library: impl Into<PathBuf>, filenames: Vec<String>) -> Self {
        Self {
            library: library.into(),
            filenames,
        }
    }
}

#[async_trait]
impl ArtStrategy for DirectoryCoverStrategy {
    fn name(&self) -> &'static str {
        "directory cover"
    }

    async fn fetch(&self, track: &Track) -> Option<ArtifactResult> {
        let media = self.library.join(&track.reference);
        let dir = media.parent()?;

        for name in &self.filenames {
            let candidate = dir.join(name);
            let Ok(bytes) = tokio::fs::read(&candidate).await else {
                continue;
            };
            let decoded =
                tokio::task::spawn_blocking(move || normalize::decode(&bytes).map(|_| bytes)).await;
            match decoded {
                Ok(Ok(bytes)) => {
                    log::debug!("[ArtResolver] Found {}", candidate.display());
                    return Some(ArtifactResult {
                        source: ArtSource::DirectoryCover,
                        bytes: Bytes::from(bytes),
                    });
                }
                Ok(Err(e)) => {
                    log::warn!(
                        "[ArtResolver] Skipping unreadable cover {}: {}",
                        candidate.display(),
                        e
                    );
                }
                Err(e) => log::warn!("[ArtResolver] Cover decode task failed: {}", e),
            }
        }
        None
    }
}
