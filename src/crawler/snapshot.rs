//! Snapshot persistence
//!
//! The snapshot file is the only durable artifact: a pretty-printed JSON
//! array of peer records, fully replaced each crawl cycle. The file is
//! single-writer (the crawl cycle) and multi-reader (the serving
//! endpoints) with no locking, so the replace must be atomic — write to a
//! temp file, then rename over the target.

use std::path::PathBuf;

use anyhow::Context;
use tracing::debug;

use crate::types::PeerRecord;

/// Reads and atomically replaces the peer snapshot file
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Atomically replace the snapshot with the given records.
    ///
    /// Failures are fatal to the calling crawl cycle; a later cycle
    /// retries from scratch.
    pub async fn write(&self, records: &[PeerRecord]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating snapshot directory {:?}", parent))?;
            }
        }

        let content = serde_json::to_vec_pretty(records)?;

        // Write to temp, then rename: readers never observe a partial file
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &content)
            .await
            .with_context(|| format!("writing snapshot temp file {:?}", temp_path))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| format!("replacing snapshot {:?}", self.path))?;

        debug!("Saved {} peer records to {:?}", records.len(), self.path);
        Ok(())
    }

    /// Raw snapshot content, byte-for-byte as persisted
    pub async fn read_raw(&self) -> anyhow::Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading snapshot {:?}", self.path))
    }

    /// Parsed snapshot records
    pub async fn read(&self) -> anyhow::Result<Vec<PeerRecord>> {
        let raw = self.read_raw().await?;
        serde_json::from_str(&raw).with_context(|| format!("parsing snapshot {:?}", self.path))
    }
}
