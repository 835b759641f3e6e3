//! Crash-recovery backup of the last reading.
//!
//! Every ingest overwrites a single JSON file with the committed reading. The
//! file is only read back when the in-memory cache is empty, i.e. after a
//! restart, and only if it is younger than the configured staleness bound.
//!
//! Writes are best effort: they run on detached tasks, are never retried, and
//! concurrent writes race with the last one to reach the filesystem winning.

use std::path::{Path, PathBuf};

use airgradient_types::Reading;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Backup file errors.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Failed to serialize reading: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Failed to write backup file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read backup file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to decode backup file {path}: {source}")]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Backup reading is {age_secs}s old (limit {max_age_secs}s)")]
    Stale { age_secs: i64, max_age_secs: i64 },
}

/// Handle to the backup file.
#[derive(Debug, Clone)]
pub struct BackupStore {
    path: PathBuf,
}

impl BackupStore {
    /// Create a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backup file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `reading` and overwrite the backup file with it.
    pub async fn save(&self, reading: &Reading) -> Result<(), BackupError> {
        let json = serde_json::to_vec(reading).map_err(BackupError::Serialize)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| BackupError::Write {
                path: self.path.clone(),
                source: e,
            })
    }

    /// Save `reading` on a detached task.
    ///
    /// Failures are logged and dropped. The returned handle may be ignored;
    /// awaiting it only tells the caller the attempt has finished.
    pub fn spawn_save(&self, reading: Reading) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            match store.save(&reading).await {
                Ok(()) => debug!("Wrote backup for {} to {:?}", reading.id, store.path),
                Err(e) => error!("Backup write failed: {}", e),
            }
        })
    }

    /// Read and decode the backup file.
    pub async fn load(&self) -> Result<Reading, BackupError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| BackupError::Read {
                path: self.path.clone(),
                source: e,
            })?;
        serde_json::from_slice(&bytes).map_err(|e| BackupError::Decode {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Load the backup if it is strictly younger than `max_age_secs` at `now`.
    ///
    /// A backup without a timestamp counts as infinitely old.
    pub async fn load_recent(
        &self,
        now: OffsetDateTime,
        max_age_secs: i64,
    ) -> Result<Reading, BackupError> {
        let reading = self.load().await?;
        if reading.is_fresh(now, max_age_secs) {
            Ok(reading)
        } else {
            Err(BackupError::Stale {
                age_secs: reading.age_secs(now),
                max_age_secs,
            })
        }
    }
}
