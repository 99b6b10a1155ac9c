// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregated counters and the atomic status snapshot.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mnemo_core::MnemoError;
use mnemo_store::{Archive, HotStore, WriteQueue};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Write-queue counters in serializable form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteQueueSnapshot {
    pub total_writes: u64,
    pub queue_max: usize,
    pub current_queue: usize,
}

/// One stats snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Hot records for the configured user plus archive lines.
    pub total_memories: usize,
    pub hot_size_bytes: u64,
    pub archive_size_bytes: u64,
    pub write_queue: WriteQueueSnapshot,
    pub last_updated: DateTime<Utc>,
}

impl MemoryStats {
    /// Plain-text rendering for tool payloads and the CLI.
    pub fn render(&self) -> String {
        format!(
            "memories: {}\nhot tier: {} bytes\narchive: {} bytes\nwrites: {} total, {} peak queue, {} in flight\nupdated: {}",
            self.total_memories,
            self.hot_size_bytes,
            self.archive_size_bytes,
            self.write_queue.total_writes,
            self.write_queue.queue_max,
            self.write_queue.current_queue,
            self.last_updated.to_rfc3339(),
        )
    }
}

/// Collects stats across the tiers and writes status snapshots.
pub struct StatsCollector {
    store: Arc<HotStore>,
    archive: Arc<Archive>,
    queue: Arc<WriteQueue>,
    user_id: String,
}

impl StatsCollector {
    pub fn new(
        store: Arc<HotStore>,
        archive: Arc<Archive>,
        queue: Arc<WriteQueue>,
        user_id: String,
    ) -> Self {
        Self {
            store,
            archive,
            queue,
            user_id,
        }
    }

    /// Gathers a fresh snapshot.
    pub async fn collect(&self) -> Result<MemoryStats, MnemoError> {
        let hot_count = self.store.count(&self.user_id).await?;
        let archive_lines = self.archive.line_count().await?;
        let queue = self.queue.stats();

        Ok(MemoryStats {
            total_memories: hot_count + archive_lines,
            hot_size_bytes: self.store.size_bytes().await,
            archive_size_bytes: self.archive.size_bytes().await,
            write_queue: WriteQueueSnapshot {
                total_writes: queue.total_writes,
                queue_max: queue.queue_max,
                current_queue: queue.current_queue,
            },
            last_updated: Utc::now(),
        })
    }

    /// Writes a snapshot atomically: temp file in the same directory,
    /// then rename over the target.
    pub async fn write_status(&self, path: &Path) -> Result<MemoryStats, MnemoError> {
        let stats = self.collect().await?;
        let json = serde_json::to_string_pretty(&stats)
            .map_err(|e| MnemoError::Internal(format!("serialize status: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| MnemoError::Internal(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| MnemoError::Internal(format!("rename to {}: {e}", path.display())))?;

        debug!(path = %path.display(), "status snapshot written");
        Ok(stats)
    }
}
