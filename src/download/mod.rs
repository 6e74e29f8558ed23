//! Download completion detection.
//!
//! The browser gives no completion signal, so each artifact's directory is
//! polled until the file size stops changing.

mod tracker;

pub use tracker::{DownloadTracker, TrackerSummary};

use std::path::{Path, PathBuf};

use crate::error::DownloadError;

/// Chrome's suffix for a download still being written.
const PARTIAL_SUFFIX: &str = ".crdownload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    /// No complete file seen yet.
    Pending,
    /// Last observed size.
    Observed(u64),
    /// Two successive observations agreed.
    Stable(u64),
    TimedOut,
}

impl ArtifactState {
    /// Advance by one observation. `None` means no complete file is present.
    pub fn observe(self, size: Option<u64>) -> Self {
        match (self, size) {
            (ArtifactState::Stable(_) | ArtifactState::TimedOut, _) => self,
            (_, None) => ArtifactState::Pending,
            (ArtifactState::Observed(previous), Some(size)) if previous == size => {
                ArtifactState::Stable(size)
            }
            (_, Some(size)) => ArtifactState::Observed(size),
        }
    }

    pub fn is_done(self) -> bool {
        matches!(self, ArtifactState::Stable(_) | ArtifactState::TimedOut)
    }
}

fn is_candidate(name: &str) -> bool {
    !name.starts_with('.') && !name.ends_with(PARTIAL_SUFFIX)
}

/// The first complete file in `dir` by name, with its size.
pub async fn current_artifact(dir: &Path) -> std::io::Result<Option<(PathBuf, u64)>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_candidate(name) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if metadata.is_file() {
            files.push((entry.path(), metadata.len()));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files.into_iter().next())
}

/// Whether a download (complete or partial) has started in `dir`.
pub async fn download_started(dir: &Path) -> std::io::Result<bool> {
    if !tokio::fs::try_exists(dir).await? {
        return Ok(false);
    }
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_str().is_some_and(|n| !n.starts_with('.'))
            && entry.metadata().await?.is_file()
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Polls one artifact directory with a ceiling on observations.
#[derive(Debug)]
pub struct DownloadWatch {
    dir: PathBuf,
    state: ArtifactState,
    file: Option<PathBuf>,
    polls: u32,
    max_polls: u32,
}

impl DownloadWatch {
    pub fn new(dir: PathBuf, max_polls: u32) -> Self {
        Self {
            dir,
            state: ArtifactState::Pending,
            file: None,
            polls: 0,
            max_polls: max_polls.max(2),
        }
    }

    pub fn state(&self) -> ArtifactState {
        self.state
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// File the last observation was taken from.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Take one observation.
    pub async fn poll(&mut self) -> Result<ArtifactState, DownloadError> {
        if self.state.is_done() {
            return Ok(self.state);
        }

        let current = current_artifact(&self.dir).await.map_err(|source| DownloadError::Io {
            dir: self.dir.clone(),
            source,
        })?;
        self.polls += 1;

        let size = match current {
            Some((path, size)) => {
                if self.file.as_ref() != Some(&path) {
                    // A different file restarts the comparison.
                    self.state = ArtifactState::Pending;
                    self.file = Some(path);
                }
                Some(size)
            }
            None => None,
        };
        self.state = self.state.observe(size);

        if !self.state.is_done() && self.polls >= self.max_polls {
            self.state = ArtifactState::TimedOut;
        }
        Ok(self.state)
    }
}
