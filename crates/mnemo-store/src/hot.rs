// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed hot tier with BLOB vector storage and cosine search.
//!
//! One row per memory id. All mutators must be invoked through the
//! [`crate::WriteQueue`]; reads go straight to the connection, which
//! `tokio-rusqlite` already serializes on a single background thread.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use mnemo_core::types::{blob_to_vec, cosine_similarity, l2_normalize, vec_to_blob};
use mnemo_core::{Memory, MnemoError, SourceTier};
use tokio_rusqlite::Connection;

/// Helper to convert tokio_rusqlite errors into MnemoError::Store.
fn store_err(e: tokio_rusqlite::Error) -> MnemoError {
    MnemoError::Store {
        source: Box::new(e),
    }
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    run_id TEXT,
    text TEXT NOT NULL,
    categories TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding BLOB NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_scope ON memories(user_id, run_id);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);";

const MEMORY_COLUMNS: &str =
    "id, user_id, run_id, text, categories, metadata, embedding, created_at, updated_at";

/// Parameters for a vector search over one scope.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Mandatory owner filter.
    pub user_id: String,
    /// Exact session scope: `None` matches only rows without a run id.
    pub run_id: Option<String>,
    /// Result cap.
    pub limit: usize,
    /// Minimum cosine similarity; hits below are excluded.
    pub threshold: f32,
}

/// Persistent, process-local vector store keyed by memory id.
pub struct HotStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl HotStore {
    /// Opens (or creates) the backing file and applies the schema.
    pub async fn open(path: &Path) -> Result<Self, MnemoError> {
        let conn = Connection::open(path).await.map_err(store_err)?;
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> Result<Self, MnemoError> {
        let conn = Connection::open_in_memory().await.map_err(store_err)?;
        let store = Self { conn, path: None };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), MnemoError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await
            .map_err(store_err)
    }

    /// Inserts or replaces a memory together with its vector.
    ///
    /// The vector is L2-normalized and `updated_at` refreshed; an existing
    /// row's `created_at` is whatever the caller passes in (the ingestor
    /// preserves the original on UPDATE events).
    pub async fn upsert(&self, memory: &Memory, vector: &[f32]) -> Result<(), MnemoError> {
        let normalized = l2_normalize(vector);
        let blob = vec_to_blob(&normalized);
        let id = memory.id.clone();
        let user_id = memory.user_id.clone();
        let run_id = memory.run_id.clone();
        let text = memory.text.clone();
        let categories = serde_json::to_string(&memory.categories)
            .map_err(|e| MnemoError::Internal(format!("categories serialization: {e}")))?;
        let metadata = serde_json::to_string(&memory.metadata)
            .map_err(|e| MnemoError::Internal(format!("metadata serialization: {e}")))?;
        let created_at = format_ts(memory.created_at);
        let updated_at = format_ts(Utc::now());

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO memories (id, user_id, run_id, text, categories, metadata, embedding, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![id, user_id, run_id, text, categories, metadata, blob, created_at, updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(store_err)
    }

    /// Fetches one memory. Missing id or empty text both yield `NotFound`.
    pub async fn get(&self, id: &str) -> Result<Memory, MnemoError> {
        let wanted = id.to_string();
        let found = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"
                ))?;
                let memory = stmt
                    .query_row(rusqlite::params![wanted], row_to_memory)
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;
                Ok(memory)
            })
            .await
            .map_err(store_err)?;

        match found {
            Some(memory) if !memory.text.trim().is_empty() => Ok(memory),
            _ => Err(MnemoError::NotFound(id.to_string())),
        }
    }

    /// Deletes a memory. Idempotent: deleting an absent id succeeds.
    pub async fn delete(&self, id: &str) -> Result<(), MnemoError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM memories WHERE id = ?1", rusqlite::params![id])?;
                Ok(())
            })
            .await
            .map_err(store_err)
    }

    /// Filtered scan for one scope, ordered by creation time ascending.
    pub async fn list(
        &self,
        user_id: &str,
        run_id: Option<&str>,
    ) -> Result<Vec<Memory>, MnemoError> {
        let user_id = user_id.to_string();
        let run_id = run_id.map(|s| s.to_string());
        self.conn
            .call(move |conn| {
                let sql = match run_id {
                    Some(_) => format!(
                        "SELECT {MEMORY_COLUMNS} FROM memories WHERE user_id = ?1 AND run_id = ?2 ORDER BY created_at ASC, id ASC"
                    ),
                    None => format!(
                        "SELECT {MEMORY_COLUMNS} FROM memories WHERE user_id = ?1 AND run_id IS NULL ORDER BY created_at ASC, id ASC"
                    ),
                };
                let mut stmt = conn.prepare(&sql)?;
                let memories = match run_id {
                    Some(run) => stmt
                        .query_map(rusqlite::params![user_id, run], row_to_memory)?
                        .collect::<Result<Vec<_>, _>>()?,
                    None => stmt
                        .query_map(rusqlite::params![user_id], row_to_memory)?
                        .collect::<Result<Vec<_>, _>>()?,
                };
                Ok(memories)
            })
            .await
            .map_err(store_err)
    }

    /// Scan of every record for one user across all run scopes, ordered
    /// by creation time ascending. Pruning uses this to find the oldest
    /// overflow slice.
    pub async fn list_all(&self, user_id: &str) -> Result<Vec<Memory>, MnemoError> {
        let user_id = user_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MEMORY_COLUMNS} FROM memories WHERE user_id = ?1 ORDER BY created_at ASC, id ASC"
                ))?;
                let memories = stmt
                    .query_map(rusqlite::params![user_id], row_to_memory)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(memories)
            })
            .await
            .map_err(store_err)
    }

    /// Cosine-similarity search within one scope.
    ///
    /// Results carry `score` populated and are ordered by
    /// `(score desc, updated_at desc, id asc)`; entries below the
    /// threshold are excluded.
    pub async fn search(
        &self,
        query_vector: &[f32],
        params: SearchParams,
    ) -> Result<Vec<Memory>, MnemoError> {
        let query = query_vector.to_vec();
        self.conn
            .call(move |conn| {
                let sql = match params.run_id {
                    Some(_) => format!(
                        "SELECT {MEMORY_COLUMNS} FROM memories WHERE user_id = ?1 AND run_id = ?2"
                    ),
                    None => format!(
                        "SELECT {MEMORY_COLUMNS} FROM memories WHERE user_id = ?1 AND run_id IS NULL"
                    ),
                };
                let mut stmt = conn.prepare(&sql)?;
                let rows = match &params.run_id {
                    Some(run) => stmt
                        .query_map(rusqlite::params![params.user_id, run], |row| {
                            let memory = row_to_memory(row)?;
                            let blob: Vec<u8> = row.get(6)?;
                            Ok((memory, blob_to_vec(&blob)))
                        })?
                        .collect::<Result<Vec<_>, _>>()?,
                    None => stmt
                        .query_map(rusqlite::params![params.user_id], |row| {
                            let memory = row_to_memory(row)?;
                            let blob: Vec<u8> = row.get(6)?;
                            Ok((memory, blob_to_vec(&blob)))
                        })?
                        .collect::<Result<Vec<_>, _>>()?,
                };

                let mut scored: Vec<Memory> = rows
                    .into_iter()
                    .filter_map(|(mut memory, embedding)| {
                        if embedding.len() != query.len() {
                            return None;
                        }
                        let score = cosine_similarity(&query, &embedding);
                        if score < params.threshold {
                            return None;
                        }
                        memory.score = Some(score);
                        Some(memory)
                    })
                    .collect();

                scored.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| b.updated_at.cmp(&a.updated_at))
                        .then_with(|| a.id.cmp(&b.id))
                });
                scored.truncate(params.limit);
                Ok(scored)
            })
            .await
            .map_err(store_err)
    }

    /// Number of records for one user across all run scopes.
    pub async fn count(&self, user_id: &str) -> Result<usize, MnemoError> {
        let user_id = user_id.to_string();
        self.conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM memories WHERE user_id = ?1",
                    rusqlite::params![user_id],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
            .map_err(store_err)
    }

    /// Byte size of the backing file; 0 for in-memory stores.
    pub async fn size_bytes(&self) -> u64 {
        match &self.path {
            Some(path) => tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0),
            None => 0,
        }
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Convert a rusqlite row to a Memory (embedding omitted; column 6 holds it).
fn row_to_memory(row: &rusqlite::Row) -> Result<Memory, rusqlite::Error> {
    let categories_json: String = row.get(4)?;
    let metadata_json: String = row.get(5)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Memory {
        id: row.get(0)?,
        user_id: row.get(1)?,
        run_id: row.get(2)?,
        text: row.get(3)?,
        score: None,
        categories: serde_json::from_str(&categories_json).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
        source_tier: SourceTier::Hot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_memory(id: &str, text: &str, user: &str, run: Option<&str>) -> Memory {
        Memory::new(
            id.to_string(),
            text.to_string(),
            user.to_string(),
            run.map(|s| s.to_string()),
        )
    }

    fn unit(v: &[f32]) -> Vec<f32> {
        l2_normalize(v)
    }

    #[tokio::test]
    async fn upsert_and_get_roundtrip() {
        let store = HotStore::open_in_memory().await.unwrap();
        let m = make_memory("m1", "User uses Rust daily.", "u1", None);
        store.upsert(&m, &unit(&[1.0, 0.0, 0.0])).await.unwrap();

        let back = store.get("m1").await.unwrap();
        assert_eq!(back.text, "User uses Rust daily.");
        assert_eq!(back.user_id, "u1");
        assert!(back.run_id.is_none());
        assert_eq!(back.source_tier, SourceTier::Hot);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = HotStore::open_in_memory().await.unwrap();
        match store.get("nope").await {
            Err(MnemoError::NotFound(id)) => assert_eq!(id, "nope"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_empty_text_is_not_found() {
        let store = HotStore::open_in_memory().await.unwrap();
        let m = make_memory("m1", "   ", "u1", None);
        store.upsert(&m, &unit(&[1.0, 0.0])).await.unwrap();
        assert!(matches!(
            store.get("m1").await,
            Err(MnemoError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn upsert_twice_keeps_single_row_and_advances_updated_at() {
        let store = HotStore::open_in_memory().await.unwrap();
        let m = make_memory("m1", "fact", "u1", None);
        store.upsert(&m, &unit(&[1.0, 0.0])).await.unwrap();
        let first = store.get("m1").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.upsert(&m, &unit(&[1.0, 0.0])).await.unwrap();
        let second = store.get("m1").await.unwrap();

        assert_eq!(store.count("u1").await.unwrap(), 1);
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = HotStore::open_in_memory().await.unwrap();
        let m = make_memory("m1", "fact", "u1", None);
        store.upsert(&m, &unit(&[1.0, 0.0])).await.unwrap();

        store.delete("m1").await.unwrap();
        store.delete("m1").await.unwrap();
        assert!(matches!(
            store.get("m1").await,
            Err(MnemoError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_scopes_run_id_exactly() {
        let store = HotStore::open_in_memory().await.unwrap();
        store
            .upsert(&make_memory("lt", "long term", "u1", None), &unit(&[1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(
                &make_memory("s1", "session fact", "u1", Some("sess-a")),
                &unit(&[0.0, 1.0]),
            )
            .await
            .unwrap();

        let long_term = store.list("u1", None).await.unwrap();
        assert_eq!(long_term.len(), 1);
        assert_eq!(long_term[0].id, "lt");

        let session = store.list("u1", Some("sess-a")).await.unwrap();
        assert_eq!(session.len(), 1);
        assert_eq!(session[0].id, "s1");

        let other = store.list("u1", Some("sess-b")).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn list_filters_by_user() {
        let store = HotStore::open_in_memory().await.unwrap();
        store
            .upsert(&make_memory("a", "alice fact", "alice", None), &unit(&[1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(&make_memory("b", "bob fact", "bob", None), &unit(&[1.0, 0.0]))
            .await
            .unwrap();

        let memories = store.list("alice", None).await.unwrap();
        assert_eq!(memories.len(), 1);
        assert!(memories.iter().all(|m| m.user_id == "alice"));
    }

    #[tokio::test]
    async fn search_filters_threshold_and_scope() {
        let store = HotStore::open_in_memory().await.unwrap();
        store
            .upsert(&make_memory("close", "tea fact", "u1", None), &unit(&[1.0, 0.1]))
            .await
            .unwrap();
        store
            .upsert(&make_memory("far", "other fact", "u1", None), &unit(&[0.0, 1.0]))
            .await
            .unwrap();
        store
            .upsert(
                &make_memory("scoped", "session tea", "u1", Some("s")),
                &unit(&[1.0, 0.0]),
            )
            .await
            .unwrap();

        let results = store
            .search(
                &unit(&[1.0, 0.0]),
                SearchParams {
                    user_id: "u1".to_string(),
                    run_id: None,
                    limit: 10,
                    threshold: 0.5,
                },
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "close");
        let score = results[0].score.unwrap();
        assert!(score >= 0.5);
    }

    #[tokio::test]
    async fn search_orders_by_score_then_recency_then_id() {
        let store = HotStore::open_in_memory().await.unwrap();
        // Two rows with identical vectors (identical score); newer one first.
        store
            .upsert(&make_memory("older", "same", "u1", None), &unit(&[1.0, 0.0]))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .upsert(&make_memory("newer", "same", "u1", None), &unit(&[1.0, 0.0]))
            .await
            .unwrap();

        let results = store
            .search(
                &unit(&[1.0, 0.0]),
                SearchParams {
                    user_id: "u1".to_string(),
                    run_id: None,
                    limit: 10,
                    threshold: 0.0,
                },
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "newer");
        assert_eq!(results[1].id, "older");
    }

    #[tokio::test]
    async fn search_normalizes_on_insert() {
        let store = HotStore::open_in_memory().await.unwrap();
        // Deliberately non-normalized input vector.
        store
            .upsert(&make_memory("m1", "fact", "u1", None), &[3.0, 4.0])
            .await
            .unwrap();

        let results = store
            .search(
                &unit(&[3.0, 4.0]),
                SearchParams {
                    user_id: "u1".to_string(),
                    run_id: None,
                    limit: 1,
                    threshold: 0.0,
                },
            )
            .await
            .unwrap();

        let score = results[0].score.unwrap();
        assert!((score - 1.0).abs() < 1e-3, "stored vector must be unit norm");
    }

    #[tokio::test]
    async fn count_spans_all_scopes() {
        let store = HotStore::open_in_memory().await.unwrap();
        store
            .upsert(&make_memory("a", "one", "u1", None), &unit(&[1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(&make_memory("b", "two", "u1", Some("s")), &unit(&[1.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(store.count("u1").await.unwrap(), 2);
        assert_eq!(store.count("u2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector_store.db");
        {
            let store = HotStore::open(&path).await.unwrap();
            store
                .upsert(&make_memory("m1", "durable fact", "u1", None), &unit(&[1.0, 0.0]))
                .await
                .unwrap();
        }
        let store = HotStore::open(&path).await.unwrap();
        let back = store.get("m1").await.unwrap();
        assert_eq!(back.text, "durable fact");
        assert!(store.size_bytes().await > 0);
    }
}
