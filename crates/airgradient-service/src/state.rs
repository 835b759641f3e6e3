//! Application state shared across handlers.
//!
//! [`AppState`] owns the last-value cache and the backup store and implements
//! the two operations the HTTP layer exposes:
//!
//! - [`AppState::ingest`]: decode, normalize and commit a posted reading, then
//!   persist it on a detached task
//! - [`AppState::snapshot`]: the reading to render, falling back to the backup
//!   file on a cold start
//!
//! The state is created once in `main`, wrapped in an `Arc`, and handed to
//! every router with `with_state`, so both listeners see the same cache.

use std::sync::Arc;

use airgradient_types::{Reading, decode_measures, parse_instance_id};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::backup::{BackupError, BackupStore};
use crate::cache::LastValueCache;
use crate::config::Config;

/// Shared application state.
pub struct AppState {
    /// Configuration (read-only after startup).
    pub config: Config,
    /// The most recent reading.
    pub cache: LastValueCache,
    /// Crash-recovery copy of the most recent reading.
    pub backup: BackupStore,
}

/// Outcome of a successful ingest.
#[derive(Debug)]
pub struct Ingested {
    /// The reading as committed to the cache.
    pub reading: Reading,
    /// The detached backup write. Dropping it does not cancel the write.
    pub backup: JoinHandle<()>,
}

impl AppState {
    /// Create new application state with an empty cache.
    pub fn new(config: Config) -> Arc<Self> {
        let backup = BackupStore::new(config.backup.path.clone());
        Arc::new(Self {
            config,
            cache: LastValueCache::new(),
            backup,
        })
    }

    /// Decode a posted body and commit it as the current reading.
    ///
    /// `token` is the path segment identifying the sender (`prefix:id`).
    /// A body that does not decode leaves the cache untouched; a `null` body
    /// commits all-zero measures.
    pub async fn ingest(&self, token: &str, body: &[u8]) -> Result<Ingested, serde_json::Error> {
        let measures = decode_measures(body)?;
        let instance_id = parse_instance_id(token);

        debug!(
            "Received measures from {}: {}",
            instance_id,
            String::from_utf8_lossy(body)
        );

        let reading = self
            .cache
            .commit(measures, instance_id, OffsetDateTime::now_utc())
            .await;
        let backup = self.backup.spawn_save(reading.clone());

        Ok(Ingested { reading, backup })
    }

    /// The reading to expose.
    ///
    /// Returns the cached reading if there is one. Otherwise the backup file
    /// is consulted and used if it is younger than `backup.max_time_delta`;
    /// failing that, the zero-valued reading. A restored reading is not put
    /// back into the cache, so every cold render re-reads the file.
    pub async fn snapshot(&self) -> Reading {
        if let Some(reading) = self.cache.get().await {
            return reading;
        }

        match self
            .backup
            .load_recent(OffsetDateTime::now_utc(), self.config.backup.max_time_delta)
            .await
        {
            Ok(reading) => {
                debug!("Restored reading for {} from backup", reading.id);
                reading
            }
            Err(e @ BackupError::Stale { .. }) => {
                debug!("Ignoring backup: {}", e);
                Reading::default()
            }
            Err(e) => {
                error!("Failed to restore backup: {}", e);
                Reading::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackupConfig;

    fn create_test_state(dir: &tempfile::TempDir) -> Arc<AppState> {
        let config = Config {
            backup: BackupConfig {
                path: dir.path().join("backup.json"),
                max_time_delta: 60,
            },
            ..Config::default()
        };
        AppState::new(config)
    }

    fn body(pm25: i64, co2: i64) -> Vec<u8> {
        format!(r#"{{"wifi":-73,"pm02":{pm25},"rco2":{co2},"atmp":26.1,"rhum":51}}"#).into_bytes()
    }

    async fn write_backup(state: &AppState, age_secs: i64) {
        let reading = Reading {
            id: "restored".to_string(),
            timestamp: OffsetDateTime::now_utc().unix_timestamp() - age_secs,
            wifi: -50,
            pm25: 7,
            co2: 777,
            temperature: 19.5,
            humidity: 33,
        };
        state.backup.save(&reading).await.unwrap();
    }

    #[tokio::test]
    async fn test_ingest_commits_reading() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir);

        let before = OffsetDateTime::now_utc().unix_timestamp();
        let ingested = state.ingest("airgradient:abc", &body(12, 640)).await.unwrap();

        assert_eq!(ingested.reading.id, "abc");
        assert_eq!(ingested.reading.pm25, 12);
        assert_eq!(ingested.reading.co2, 640);
        assert!(ingested.reading.timestamp >= before);
        assert_eq!(state.cache.get().await, Some(ingested.reading));
    }

    #[tokio::test]
    async fn test_ingest_writes_backup() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir);

        let ingested = state.ingest("airgradient:abc", &body(12, 640)).await.unwrap();
        ingested.backup.await.unwrap();

        assert_eq!(state.backup.load().await.unwrap(), ingested.reading);
    }

    #[tokio::test]
    async fn test_ingest_malformed_body_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir);

        let first = state.ingest("airgradient:abc", &body(12, 640)).await.unwrap();
        assert!(state.ingest("airgradient:abc", b"not json").await.is_err());

        assert_eq!(state.cache.get().await, Some(first.reading));
    }

    #[tokio::test]
    async fn test_ingest_substitutes_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir);

        state.ingest("airgradient:abc", &body(12, 640)).await.unwrap();
        let second = state.ingest("airgradient:abc", &body(0, -1)).await.unwrap();

        assert_eq!(second.reading.pm25, 12);
        assert_eq!(second.reading.co2, 640);
    }

    #[tokio::test]
    async fn test_ingest_null_body_commits_zero_measures() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir);

        state.ingest("airgradient:abc", &body(12, 640)).await.unwrap();
        let ingested = state.ingest("airgradient:abc", b"null").await.unwrap();

        assert_eq!(ingested.reading.wifi, 0);
        assert_eq!(ingested.reading.humidity, 0);
        // Zero PM2.5 and CO2 still fall back to the previous reading.
        assert_eq!(ingested.reading.pm25, 12);
        assert_eq!(ingested.reading.co2, 640);
    }

    #[tokio::test]
    async fn test_ingest_malformed_token() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir);

        let ingested = state.ingest("a:b:c", &body(1, 1)).await.unwrap();
        assert_eq!(ingested.reading.id, "null");
    }

    #[tokio::test]
    async fn test_snapshot_prefers_cache() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir);

        write_backup(&state, 5).await;
        state.ingest("airgradient:live", &body(3, 500)).await.unwrap();

        assert_eq!(state.snapshot().await.id, "live");
    }

    #[tokio::test]
    async fn test_snapshot_cold_start_recent_backup() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir);

        write_backup(&state, 30).await;
        let reading = state.snapshot().await;

        assert_eq!(reading.id, "restored");
        assert_eq!(reading.co2, 777);
        // Restoring is one-shot and does not populate the cache.
        assert!(state.cache.get().await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_cold_start_stale_backup() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir);

        write_backup(&state, 90).await;
        assert_eq!(state.snapshot().await, Reading::default());
    }

    #[tokio::test]
    async fn test_snapshot_cold_start_without_backup() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir);

        assert_eq!(state.snapshot().await, Reading::default());
    }

    #[tokio::test]
    async fn test_snapshot_cold_start_corrupt_backup() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir);

        std::fs::write(state.backup.path(), b"\x00\x01garbage").unwrap();
        assert_eq!(state.snapshot().await, Reading::default());
    }
}
