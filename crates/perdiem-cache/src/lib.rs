//! Perdiem Cache Layer
//!
//! Stores previously extracted rate records keyed by location code, with a
//! staleness window.
//!
//! # Architecture
//!
//! - **Contract**: [`RateCache`] is the only interface the lookup pipeline sees
//! - **Backends**: process memory ([`MemoryCache`]), a JSON document
//!   ([`FileCache`]) and `SQLite` ([`SqliteCache`])
//! - **Staleness**: a record older than the window is treated as absent by
//!   [`RateCache::get`] but is never deleted, so it stays available as a
//!   fallback through [`RateCache::entry`]
//! - **Writes**: every write replaces the whole entry for its key; the last
//!   successful write wins
//!
//! # Example
//!
//! ```ignore
//! use perdiem_cache::{MemoryCache, RateCache};
//!
//! let cache = MemoryCache::new();
//! cache.put(record).await?;
//! let fresh = cache.get(&code, chrono::Duration::hours(24)).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod file;
pub mod memory;
pub mod migrations;
pub mod sqlite;

// Re-export commonly used types
pub use error::{CacheError, Result};
pub use file::{CacheDocument, FileCache};
pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use async_trait::async_trait;
use perdiem_core::{LocationCode, RateRecord, Timestamp};
use serde::{Deserialize, Serialize};

/// A cached rate record together with the moment it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Key of the entry
    pub location_code: LocationCode,
    /// The stored record
    pub record: RateRecord,
    /// When the record was written to the cache
    pub stored_at: Timestamp,
}

impl CacheEntry {
    /// Wrap a record, stamping it with the current time.
    #[must_use]
    pub fn new(record: RateRecord) -> Self {
        Self::stored_at(record, Timestamp::now())
    }

    /// Wrap a record with an explicit storage time.
    #[must_use]
    pub fn stored_at(record: RateRecord, stored_at: Timestamp) -> Self {
        Self {
            location_code: record.location_code.clone(),
            record,
            stored_at,
        }
    }

    /// Whether the entry is younger than `window` at `now`.
    #[must_use]
    pub fn is_fresh(&self, window: chrono::Duration, now: Timestamp) -> bool {
        self.stored_at.age_at(now) < window
    }
}

/// Storage for extracted rate records.
///
/// Implementations must tolerate concurrent readers and writers without
/// exposing a partially written entry.
#[async_trait]
pub trait RateCache: Send + Sync {
    /// Get the entry for a location code regardless of its age.
    async fn entry(&self, code: &LocationCode) -> Result<Option<CacheEntry>>;

    /// Store an entry, replacing any existing entry for the same code.
    async fn store(&self, entry: CacheEntry) -> Result<()>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Store a freshly extracted record, stamped with the current time.
    async fn put(&self, record: RateRecord) -> Result<()> {
        self.store(CacheEntry::new(record)).await
    }

    /// Get the record for a location code only if it is younger than `window`.
    async fn get(
        &self,
        code: &LocationCode,
        window: chrono::Duration,
    ) -> Result<Option<RateRecord>> {
        let now = Timestamp::now();
        Ok(self
            .entry(code)
            .await?
            .filter(|entry| entry.is_fresh(window, now))
            .map(|entry| entry.record))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{hours_ago, record};
    use super::*;

    #[test]
    fn test_entry_freshness() {
        let window = chrono::Duration::hours(24);
        let now = Timestamp::now();

        let fresh = CacheEntry::stored_at(record("11410", 193, 152), hours_ago(23));
        assert!(fresh.is_fresh(window, now));

        let stale = CacheEntry::stored_at(record("11410", 193, 152), hours_ago(25));
        assert!(!stale.is_fresh(window, now));
    }

    #[test]
    fn test_entry_key_follows_record() {
        let entry = CacheEntry::new(record("10450", 100, 50));
        assert_eq!(entry.location_code.as_str(), "10450");
    }

    #[tokio::test]
    async fn test_get_hides_stale_entry_but_entry_keeps_it() {
        let cache = MemoryCache::new();
        let code = LocationCode::new("11410").expect("valid code");
        cache
            .store(CacheEntry::stored_at(record("11410", 193, 152), hours_ago(48)))
            .await
            .expect("store stale entry");

        let window = chrono::Duration::hours(24);
        assert!(cache.get(&code, window).await.expect("get").is_none());
        assert!(cache.entry(&code).await.expect("entry").is_some());
    }
}
