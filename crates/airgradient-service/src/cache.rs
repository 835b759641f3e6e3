//! In-memory last-value cache.
//!
//! Holds at most one [`Reading`]. Writers take the exclusive lock only for the
//! copy/replace itself; readers share the lock and receive a clone, so no lock
//! is ever held across I/O.

use airgradient_types::{Measures, Reading};
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Guarded cell holding the most recently committed reading.
#[derive(Debug, Default)]
pub struct LastValueCache {
    current: RwLock<Option<Reading>>,
}

impl LastValueCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held reading unconditionally.
    pub async fn put(&self, reading: Reading) {
        *self.current.write().await = Some(reading);
    }

    /// Copy of the held reading, or `None` if nothing was ever committed.
    pub async fn get(&self) -> Option<Reading> {
        self.current.read().await.clone()
    }

    /// Normalize `measures` against the held reading and commit the result.
    ///
    /// Substitution, timestamping and the replace happen under one exclusive
    /// lock, so concurrent ingests always substitute against the reading they
    /// replace.
    pub async fn commit(
        &self,
        measures: Measures,
        instance_id: String,
        received_at: OffsetDateTime,
    ) -> Reading {
        let mut current = self.current.write().await;
        let reading = measures
            .substitute_invalid(current.as_ref())
            .into_reading(instance_id, received_at);
        *current = Some(reading.clone());
        reading
    }
}
