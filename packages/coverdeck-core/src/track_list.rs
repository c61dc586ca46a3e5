//! Keypad index to track reference lookup.
//!
//! The track list is a plain text file, one reference per line, addressed by
//! 1-based line number. It is edited by hand outside the kiosk, so it is
//! re-read on every lookup and never cached.

use std::path::{Path, PathBuf};

use crate::error::TrackListError;

/// Read-only view of the track list file.
#[derive(Debug, Clone)]
pub struct TrackReferenceList {
    path: PathBuf,
}

impl TrackReferenceList {
    /// Creates a list backed by `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the list file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves a 1-based `index` to its trimmed reference.
    ///
    /// # Errors
    ///
    /// - [`TrackListError::Unreadable`] if the file cannot be read
    /// - [`TrackListError::OutOfRange`] unless `1 <= index <= line_count`
    /// - [`TrackListError::BlankEntry`] if the line holds only whitespace
    pub async fn lookup(&self, index: u32) -> Result<String, TrackListError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| TrackListError::Unreadable {
                path: self.path.clone(),
                source,
            })?;

        let line_count = content.lines().count();
        let position = index as usize;
        if position == 0 || position > line_count {
            return Err(TrackListError::OutOfRange { index, line_count });
        }

        let reference = content
            .lines()
            .nth(position - 1)
            .map(str::trim)
            .unwrap_or_default();
        if reference.is_empty() {
            return Err(TrackListError::BlankEntry(index));
        }
        Ok(reference.to_string())
    }
}
