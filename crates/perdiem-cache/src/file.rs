//! JSON-file rate cache.
//!
//! The on-disk document has the shape
//! `{ "data": [RateRecord, ...], "timestamp": <epoch ms>, "count": <n> }`.
//! The document carries no per-entry storage time, so entries loaded from
//! disk use each record's `extractedAt` as their storage time.

use crate::error::{CacheError, Result};
use crate::{CacheEntry, RateCache};
use async_trait::async_trait;
use perdiem_core::{LocationCode, RateRecord, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Serialized form of the whole cache file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDocument {
    /// Cached records
    pub data: Vec<RateRecord>,
    /// When the document was written, in milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Number of records in `data`
    pub count: usize,
}

/// Cache persisted as a single JSON document.
///
/// Entries are held in memory and the whole document is rewritten on every
/// store, through a temporary file and a rename so readers never see a
/// half-written file.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    entries: Mutex<HashMap<LocationCode, CacheEntry>>,
}

impl FileCache {
    /// Open a cache file, starting empty if it does not exist yet.
    ///
    /// # Errors
    /// Returns `CacheError` if the file exists but cannot be read or parsed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::decode(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Cache file {} not found, starting empty", path.display());
                HashMap::new()
            }
            Err(e) => return Err(CacheError::Io(e)),
        };

        tracing::info!(
            count = entries.len(),
            "Opened rate cache file {}",
            path.display()
        );

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(contents: &str) -> Result<HashMap<LocationCode, CacheEntry>> {
        let document: CacheDocument = serde_json::from_str(contents)?;
        if document.count != document.data.len() {
            tracing::warn!(
                declared = document.count,
                actual = document.data.len(),
                "Cache document count does not match its data"
            );
        }

        let mut entries = HashMap::with_capacity(document.data.len());
        for record in document.data {
            let entry = CacheEntry::stored_at(record.clone(), record.extracted_at);
            entries.insert(entry.location_code.clone(), entry);
        }
        Ok(entries)
    }

    fn encode(entries: &HashMap<LocationCode, CacheEntry>) -> Result<String> {
        let mut data: Vec<RateRecord> = entries.values().map(|e| e.record.clone()).collect();
        data.sort_by(|a, b| a.location_code.cmp(&b.location_code));

        let document = CacheDocument {
            count: data.len(),
            data,
            timestamp: Timestamp::now().timestamp_millis(),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    async fn persist(&self, entries: &HashMap<LocationCode, CacheEntry>) -> Result<()> {
        let contents = Self::encode(entries)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut tmp_name = self
            .path
            .file_name()
            .ok_or_else(|| CacheError::Open(format!("not a file path: {}", self.path.display())))?
            .to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RateCache for FileCache {
    async fn entry(&self, code: &LocationCode) -> Result<Option<CacheEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries.get(code).cloned())
    }

    async fn store(&self, entry: CacheEntry) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let code = entry.location_code.clone();
        let previous = entries.insert(code.clone(), entry);

        // Roll back so memory never runs ahead of the file
        if let Err(e) = self.persist(&entries).await {
            match previous {
                Some(old) => entries.insert(code, old),
                None => entries.remove(&code),
            };
            return Err(e);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
