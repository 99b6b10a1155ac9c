// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only cold tier: one serialized memory per line of a JSONL journal.
//!
//! Lines are never mutated in place; insertion order is the only order.
//! Search is a deliberate streaming scan with keyword matching, not an
//! index. Appends must be serialized through the write queue by callers.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use mnemo_core::{Memory, MnemoError, SourceTier};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Fingerprint of the journal file used to cache the line count.
type Fingerprint = (u64, SystemTime);

/// Append-only journal of archived memories.
pub struct Archive {
    path: PathBuf,
    /// Cached `(fingerprint, count)`; recomputed when the file changes.
    line_count_cache: Mutex<Option<(Fingerprint, usize)>>,
    /// Malformed lines skipped across all searches, for diagnostics.
    malformed_lines: AtomicU64,
}

impl Archive {
    /// Creates an archive over the given journal path. The file is only
    /// created on first append.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            line_count_cache: Mutex::new(None),
            malformed_lines: AtomicU64::new(0),
        }
    }

    /// Path of the backing journal.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends memories to the journal as a single write.
    ///
    /// Either all lines of the call land or none do their callers any
    /// good: the buffer is written with one `write_all`. Failures are not
    /// retried here; pruning treats an append error as a hard stop before
    /// any hot deletion.
    pub async fn append(&self, memories: &[Memory]) -> Result<(), MnemoError> {
        if memories.is_empty() {
            return Ok(());
        }

        let mut buffer = String::new();
        for memory in memories {
            let line = serde_json::to_string(memory)
                .map_err(|e| MnemoError::Archive(format!("serialize: {e}")))?;
            buffer.push_str(&line);
            buffer.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| MnemoError::Archive(format!("open {}: {e}", self.path.display())))?;
        file.write_all(buffer.as_bytes())
            .await
            .map_err(|e| MnemoError::Archive(format!("append {}: {e}", self.path.display())))?;
        file.flush()
            .await
            .map_err(|e| MnemoError::Archive(format!("flush {}: {e}", self.path.display())))?;

        debug!(count = memories.len(), "archived memories");
        Ok(())
    }

    /// Streaming keyword search over the journal.
    ///
    /// The query is split on whitespace and punctuation into lowercase
    /// tokens of length >= 2. A line matches if it contains any token as a
    /// case-insensitive substring. Matches are ranked by the number of
    /// distinct tokens they contain, then by insertion order. Malformed
    /// lines are counted and skipped. A missing journal or an empty token
    /// set yields an empty result.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Memory>, MnemoError> {
        let tokens = tokenize(query);
        if tokens.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let file = match tokio::fs::File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(MnemoError::Archive(format!(
                    "open {}: {e}",
                    self.path.display()
                )))
            }
        };

        let mut lines = BufReader::new(file).lines();
        let mut matches: Vec<(usize, usize, Memory)> = Vec::new();
        let mut index = 0usize;
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| MnemoError::Archive(format!("read {}: {e}", self.path.display())))?
        {
            let position = index;
            index += 1;
            if line.trim().is_empty() {
                continue;
            }

            let haystack = line.to_lowercase();
            let hit_count = tokens.iter().filter(|t| haystack.contains(*t)).count();
            if hit_count == 0 {
                continue;
            }

            match serde_json::from_str::<Memory>(&line) {
                Ok(mut memory) => {
                    memory.source_tier = SourceTier::Archive;
                    matches.push((hit_count, position, memory));
                }
                Err(e) => {
                    self.malformed_lines.fetch_add(1, Ordering::Relaxed);
                    warn!(line = position, error = %e, "skipping malformed archive line");
                }
            }
        }

        matches.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        matches.truncate(limit);
        Ok(matches.into_iter().map(|(_, _, m)| m).collect())
    }

    /// Number of records in the journal.
    ///
    /// Cached by `(size, mtime)` fingerprint; recomputed only when the
    /// file changes, by byte-scanning for `\n` with a trailing correction
    /// when the last byte is not a newline.
    pub async fn line_count(&self) -> Result<usize, MnemoError> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(MnemoError::Archive(format!(
                    "stat {}: {e}",
                    self.path.display()
                )))
            }
        };
        let fingerprint: Fingerprint = (
            meta.len(),
            meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        );

        let mut cache = self.line_count_cache.lock().await;
        if let Some((cached_fp, count)) = *cache {
            if cached_fp == fingerprint {
                return Ok(count);
            }
        }

        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| MnemoError::Archive(format!("read {}: {e}", self.path.display())))?;
        let mut count = bytes.iter().filter(|&&b| b == b'\n').count();
        if let Some(&last) = bytes.last() {
            if last != b'\n' {
                count += 1;
            }
        }

        *cache = Some((fingerprint, count));
        Ok(count)
    }

    /// Byte size of the journal; 0 when it does not exist yet.
    pub async fn size_bytes(&self) -> u64 {
        tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Malformed lines skipped so far.
    pub fn malformed_lines(&self) -> u64 {
        self.malformed_lines.load(Ordering::Relaxed)
    }
}

/// Lowercase tokens of length >= 2, split on anything non-alphanumeric.
fn tokenize(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .filter(|t| seen.insert(t.to_string()))
        .map(|t| t.to_string())
        .collect()
}
