//! In-memory rate cache.

use crate::error::{CacheError, Result};
use crate::{CacheEntry, RateCache};
use async_trait::async_trait;
use perdiem_core::LocationCode;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Process-local cache of rate records.
///
/// Cloning yields another handle to the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<LocationCode, CacheEntry>>>,
}

impl MemoryCache {
    /// Create a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries, fresh or stale.
    pub fn len(&self) -> Result<usize> {
        let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.len())
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl RateCache for MemoryCache {
    async fn entry(&self, code: &LocationCode) -> Result<Option<CacheEntry>> {
        let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.get(code).cloned())
    }

    async fn store(&self, entry: CacheEntry) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.insert(entry.location_code.clone(), entry);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = MemoryCache::new();
        let code = LocationCode::new("11410").expect("valid code");

        assert!(cache.entry(&code).await.expect("entry").is_none());

        cache.put(record("11410", 193, 152)).await.expect("put");
        let found = cache
            .get(&code, chrono::Duration::hours(24))
            .await
            .expect("get")
            .expect("fresh record");
        assert_eq!(found.lodging_rate, 193);
        assert_eq!(cache.len().expect("len"), 1);
    }

    #[tokio::test]
    async fn test_newer_write_supersedes() {
        let cache = MemoryCache::new();
        let code = LocationCode::new("11410").expect("valid code");

        cache.put(record("11410", 193, 152)).await.expect("put");
        cache.put(record("11410", 200, 160)).await.expect("put");

        let entry = cache.entry(&code).await.expect("entry").expect("present");
        assert_eq!(entry.record.lodging_rate, 200);
        assert_eq!(entry.record.mie_rate, 160);
        assert_eq!(cache.len().expect("len"), 1);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let cache = MemoryCache::new();
        let handle = cache.clone();
        handle.put(record("10450", 100, 50)).await.expect("put");
        assert!(!cache.is_empty().expect("is_empty"));
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_mix_entries() {
        let cache = MemoryCache::new();
        let mut handles = Vec::new();

        for i in 0..20u32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .put(record("11410", 100 + i, 50 + i))
                    .await
                    .expect("concurrent put");
            }));
        }
        for handle in handles {
            handle.await.expect("join writer");
        }

        let code = LocationCode::new("11410").expect("valid code");
        let entry = cache.entry(&code).await.expect("entry").expect("present");
        // Whatever write won, its fields belong together
        assert_eq!(entry.record.lodging_rate - 100, entry.record.mie_rate - 50);
        assert_eq!(
            entry.record.total_rate,
            entry.record.lodging_rate + entry.record.mie_rate
        );
    }
}
