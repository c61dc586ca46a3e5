//! Artwork resolution for the current track.
//!
//! [`ArtResolver`] walks an ordered list of [`ArtStrategy`]s and stops at
//! the first one whose bytes decode. The winner is shrunk to the configured
//! bounding box and written to the artifact path; if nothing works the
//! placeholder is copied there instead, so the artifact never shows the
//! previous track's cover.

pub mod embedded;
pub mod normalize;
pub mod strategies;

pub use strategies::{
    ArtStrategy, DirectoryCoverStrategy, EmbeddedTagStrategy, ServerPictureStrategy,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::config::{ArtworkConfig, PathsConfig};
use crate::error::{ArtworkError, ArtworkResult};
use crate::mpd::Track;
use crate::services::ConnectionManager;

/// Where a piece of artwork came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtSource {
    /// `readpicture` on the music server.
    ServerPicture,
    /// ID3v2 `APIC` frame.
    EmbeddedId3,
    /// FLAC `PICTURE` block.
    EmbeddedFlac,
    /// MP4 `covr` atom.
    EmbeddedMp4,
    /// A conventional cover file in the track's directory.
    DirectoryCover,
}

/// Bytes found by a strategy. Consumed immediately by normalization.
#[derive(Debug, Clone)]
pub struct ArtifactResult {
    pub source: ArtSource,
    pub bytes: Bytes,
}

/// Outcome of a resolution that managed to update the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Real artwork was written.
    Resolved(ArtSource),
    /// No strategy produced usable art; the placeholder was installed.
    Placeholder,
}

impl Resolution {
    /// Source of the artwork, `None` for the placeholder.
    pub fn source(&self) -> Option<ArtSource> {
        match self {
            Self::Resolved(source) => Some(*source),
            Self::Placeholder => None,
        }
    }
}

/// Produces the artwork artifact for a track.
pub struct ArtResolver {
    strategies: Vec<Arc<dyn ArtStrategy>>,
    artifact: PathBuf,
    placeholder: PathBuf,
    max_width: u32,
    max_height: u32,
}

impl ArtResolver {
    /// Creates a resolver over an explicit strategy list (tried in order).
    pub fn new(
        strategies: Vec<Arc<dyn ArtStrategy>>,
        paths: &PathsConfig,
        artwork: &ArtworkConfig,
    ) -> Self {
        Self {
            strategies,
            artifact: paths.artifact.clone(),
            placeholder: paths.placeholder.clone(),
            max_width: artwork.max_width,
            max_height: artwork.max_height,
        }
    }

    /// Server picture, then embedded tags, then directory covers.
    pub fn with_default_strategies(
        commands: Arc<ConnectionManager>,
        paths: &PathsConfig,
        artwork: &ArtworkConfig,
    ) -> Self {
        let strategies: Vec<Arc<dyn ArtStrategy>> = vec![
            Arc::new(ServerPictureStrategy::new(commands)),
            Arc::new(EmbeddedTagStrategy::new(&paths.music_library)),
            Arc::new(DirectoryCoverStrategy::new(
                &paths.music_library,
                artwork.cover_filenames.clone(),
            )),
        ];
        Self::new(strategies, paths, artwork)
    }

    /// Path of the artifact this resolver writes.
    pub fn artifact_path(&self) -> &Path {
        &self.artifact
    }

    /// Resolves artwork for `track` and updates the artifact.
    ///
    /// # Errors
    ///
    /// Only failures to write the artifact (or to read the placeholder)
    /// are returned; a missing or broken candidate is logged and skipped.
    pub async fn resolve(&self, track: &Track) -> ArtworkResult<Resolution> {
        for strategy in &self.strategies {
            let Some(found) = strategy.fetch(track).await else {
                log::debug!(
                    "[ArtResolver] {}: nothing for {}",
                    strategy.name(),
                    track.reference
                );
                continue;
            };

            match self.write_artifact(found.bytes).await {
                Ok(()) => {
                    log::info!(
                        "[ArtResolver] Artwork for {} from {}",
                        track.reference,
                        strategy.name()
                    );
                    return Ok(Resolution::Resolved(found.source));
                }
                Err(e) if e.is_candidate_failure() => {
                    log::warn!(
                        "[ArtResolver] {} returned unusable image for {}: {}",
                        strategy.name(),
                        track.reference,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        log::warn!(
            "[ArtResolver] No artwork for {}, using placeholder",
            track.reference
        );
        let placeholder = self.placeholder.clone();
        let artifact = self.artifact.clone();
        self.blocking(move || normalize::install_placeholder(&placeholder, &artifact))
            .await?;
        Ok(Resolution::Placeholder)
    }

    async fn write_artifact(&self, bytes: Bytes) -> ArtworkResult<()> {
        let dest = self.artifact.clone();
        let (max_width, max_height) = (self.max_width, self.max_height);
        self.blocking(move || {
            let image = normalize::decode(&bytes)?;
            let image = normalize::thumbnail(image, max_width, max_height);
            normalize::write_png_atomic(&image, &dest)
        })
        .await
    }

    async fn blocking<F>(&self, work: F) -> ArtworkResult<()>
    where
        F: FnOnce() -> ArtworkResult<()> + Send + 'static,
    {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| ArtworkError::Write {
                path: self.artifact.clone(),
                reason: e.to_string(),
            })?
    }
}
