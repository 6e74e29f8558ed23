use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use super::{ArtifactState, DownloadWatch};
use crate::error::{DownloadError, ReportError};
use crate::models::{NormalizedRecord, ReportJob};
use crate::normalize::{normalize, ArtifactPath, RecordSender, TableDecoder};

#[derive(Debug)]
enum Outcome {
    Emitted,
    Abandoned,
}

/// Counts reported once every registered artifact has resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerSummary {
    pub registered: usize,
    pub emitted: usize,
    pub abandoned: usize,
}

/// Runs one poll loop per registered download and forwards each completed
/// artifact, normalized, to the output channel.
pub struct DownloadTracker {
    tx: RecordSender,
    decoder: Arc<dyn TableDecoder>,
    poll_interval: Duration,
    max_polls: u32,
    tasks: JoinSet<Outcome>,
    registered: usize,
}

impl DownloadTracker {
    pub(crate) fn new(
        tx: RecordSender,
        decoder: Arc<dyn TableDecoder>,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Self {
        Self {
            tx,
            decoder,
            poll_interval,
            max_polls,
            tasks: JoinSet::new(),
            registered: 0,
        }
    }

    pub fn registered(&self) -> usize {
        self.registered
    }

    /// Start watching `dir` for the artifact of `job`. Returns immediately.
    pub fn register(&mut self, job: ReportJob, dir: PathBuf) {
        self.registered += 1;
        let tx = self.tx.clone();
        let decoder = self.decoder.clone();
        let poll_interval = self.poll_interval;
        let max_polls = self.max_polls;

        tracing::debug!(job = %job, dir = %dir.display(), "Download registered");
        self.tasks.spawn(async move {
            let file = match watch(dir, poll_interval, max_polls).await {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!(job = %job, error = %e, "Abandoning download");
                    return Outcome::Abandoned;
                }
            };

            let record = match decode(decoder, file).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(job = %job, error = %e, "Abandoning undecodable artifact");
                    return Outcome::Abandoned;
                }
            };

            let rows = record.rows.len();
            if tx.send(Ok(record)).await.is_err() {
                tracing::debug!(job = %job, "Output stream dropped");
                return Outcome::Abandoned;
            }
            tracing::info!(job = %job, rows, "Record emitted");
            Outcome::Emitted
        });
    }

    /// Wait for every registered artifact to complete or be abandoned.
    pub async fn finish(mut self) -> TrackerSummary {
        let mut summary = TrackerSummary {
            registered: self.registered,
            ..TrackerSummary::default()
        };
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Outcome::Emitted) => summary.emitted += 1,
                Ok(Outcome::Abandoned) => summary.abandoned += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "Download task failed");
                    summary.abandoned += 1;
                }
            }
        }
        summary
    }
}

async fn watch(
    dir: PathBuf,
    poll_interval: Duration,
    max_polls: u32,
) -> Result<PathBuf, DownloadError> {
    let mut watch = DownloadWatch::new(dir.clone(), max_polls);
    loop {
        tokio::time::sleep(poll_interval).await;
        match watch.poll().await? {
            ArtifactState::Stable(size) => {
                tracing::debug!(dir = %dir.display(), size, polls = watch.polls(), "Download stable");
                break;
            }
            ArtifactState::TimedOut => {
                return Err(DownloadError::TimedOut {
                    dir,
                    polls: watch.polls(),
                });
            }
            state => tracing::debug!(dir = %dir.display(), state = ?state, "Download in flight"),
        }
    }
    watch
        .file()
        .map(PathBuf::from)
        .ok_or(DownloadError::TimedOut {
            dir,
            polls: watch.polls(),
        })
}

async fn decode(
    decoder: Arc<dyn TableDecoder>,
    file: PathBuf,
) -> Result<NormalizedRecord, ReportError> {
    let path = ArtifactPath::parse(&file)?;
    let rows = tokio::task::spawn_blocking(move || decoder.decode(&file))
        .await
        .map_err(|e| ReportError::Io(std::io::Error::other(e)))??;
    Ok(normalize(&path, rows)?)
}
