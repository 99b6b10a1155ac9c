// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Host-facing memory operations.
//!
//! Each operation returns a typed payload plus a rendered text preview;
//! the host surfaces errors as text payloads, so nothing here panics or
//! leaks internal failures across the event boundary.

use mnemo_core::{Memory, MemoryEvent, MnemoError, SearchScope};
use mnemo_memory::{IngestOptions, IngestResultItem, RecallQuery};
use serde::Serialize;

use crate::coordinator::Coordinator;
use crate::stats::MemoryStats;

/// Bounds for the `memory_forget` recall limit.
const FORGET_LIMIT_RANGE: (usize, usize) = (1, 50);
/// Default cap for `memory_list`.
const DEFAULT_LIST_LIMIT: usize = 50;

/// Arguments for `memory_search`.
#[derive(Debug, Clone, Default)]
pub struct SearchArgs {
    pub query: String,
    pub limit: Option<usize>,
    pub user_id: Option<String>,
    pub scope: Option<SearchScope>,
    pub deep: bool,
}

/// One search hit in tool form.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub score: Option<f32>,
    pub source_tier: String,
}

/// `memory_search` result: preview text plus the structured list.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutput {
    pub text: String,
    pub results: Vec<SearchHit>,
}

/// Arguments for `memory_store`.
#[derive(Debug, Clone)]
pub struct StoreArgs {
    pub text: String,
    pub user_id: Option<String>,
    /// `true` (default) stores user-long-term; `false` scopes to the
    /// current session.
    pub long_term: bool,
}

impl Default for StoreArgs {
    fn default() -> Self {
        Self {
            text: String::new(),
            user_id: None,
            long_term: true,
        }
    }
}

/// `memory_store` result.
#[derive(Debug, Clone)]
pub struct StoreOutput {
    pub stored_count: usize,
    pub results: Vec<IngestResultItem>,
}

/// Arguments for `memory_list`.
#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub user_id: Option<String>,
    pub scope: Option<SearchScope>,
    pub limit: Option<usize>,
}

/// Arguments for `memory_forget`.
#[derive(Debug, Clone, Default)]
pub struct ForgetArgs {
    pub query: Option<String>,
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub scope: Option<SearchScope>,
    pub limit: Option<usize>,
    pub delete_all: bool,
}

/// Outcome of `memory_forget`.
#[derive(Debug, Clone)]
pub enum ForgetOutcome {
    /// Exactly one memory was deleted.
    Deleted { id: String, text: String },
    /// Bulk delete over every candidate.
    BulkDeleted { deleted: usize, failed: usize },
    /// More than one candidate; the user must disambiguate.
    Candidates(Vec<Memory>),
    /// Nothing matched.
    NotFound,
}

impl Coordinator {
    /// Semantic search across the configured scopes.
    pub async fn memory_search(&self, args: SearchArgs) -> Result<SearchOutput, MnemoError> {
        let user_id = args
            .user_id
            .unwrap_or_else(|| self.config().memory.user_id.clone());
        let limit = args.limit.unwrap_or(self.config().memory.top_k).max(1);
        let scope = args.scope.unwrap_or_default();

        let memories = self
            .recall()
            .search(
                &args.query,
                &RecallQuery {
                    user_id,
                    scope,
                    limit,
                    deep: args.deep,
                    session_id: self.current_session().await,
                },
            )
            .await?;

        let results: Vec<SearchHit> = memories
            .iter()
            .map(|m| SearchHit {
                id: m.id.clone(),
                text: m.text.clone(),
                score: m.score,
                source_tier: m.source_tier.as_str().to_string(),
            })
            .collect();

        let text = if results.is_empty() {
            "No matching memories.".to_string()
        } else {
            let mut out = format!("Found {} memories:\n", results.len());
            for (i, hit) in results.iter().enumerate() {
                match hit.score {
                    Some(score) => out.push_str(&format!(
                        "{}. [{score:.2}] {} ({})\n",
                        i + 1,
                        hit.text,
                        hit.source_tier
                    )),
                    None => out.push_str(&format!(
                        "{}. {} ({})\n",
                        i + 1,
                        hit.text,
                        hit.source_tier
                    )),
                }
            }
            out
        };

        Ok(SearchOutput { text, results })
    }

    /// Stores one explicit memory through the dedup/merge policy.
    pub async fn memory_store(&self, args: StoreArgs) -> Result<StoreOutput, MnemoError> {
        let text = args.text.trim();
        if text.is_empty() {
            return Err(MnemoError::Internal("memory_store requires text".to_string()));
        }
        let user_id = args
            .user_id
            .unwrap_or_else(|| self.config().memory.user_id.clone());
        let run_id = if args.long_term {
            None
        } else {
            self.current_session().await
        };

        let item = self
            .ingestor()
            .store_fact(text, &IngestOptions { user_id, run_id })
            .await?;
        let stored_count = usize::from(item.event != MemoryEvent::Noop);
        Ok(StoreOutput {
            stored_count,
            results: vec![item],
        })
    }

    /// Fetches one memory by id. Missing or empty-text ids are `NotFound`.
    pub async fn memory_get(&self, id: &str) -> Result<Memory, MnemoError> {
        self.store().get(id).await
    }

    /// Lists memories for a scope, newest last.
    pub async fn memory_list(&self, args: ListArgs) -> Result<Vec<Memory>, MnemoError> {
        let user_id = args
            .user_id
            .unwrap_or_else(|| self.config().memory.user_id.clone());
        let limit = args.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);

        let mut memories = match args.scope.unwrap_or_default() {
            SearchScope::All => self.store().list_all(&user_id).await?,
            SearchScope::LongTerm => self.store().list(&user_id, None).await?,
            SearchScope::Session => match self.current_session().await {
                Some(session) => self.store().list(&user_id, Some(&session)).await?,
                None => Vec::new(),
            },
        };
        memories.truncate(limit);
        Ok(memories)
    }

    /// Deletes memories by id or by query, with disambiguation.
    pub async fn memory_forget(&self, args: ForgetArgs) -> Result<ForgetOutcome, MnemoError> {
        if let Some(id) = &args.id {
            return match self.store().get(id).await {
                Ok(memory) => {
                    self.ingestor().delete(id).await?;
                    Ok(ForgetOutcome::Deleted {
                        id: memory.id,
                        text: memory.text,
                    })
                }
                Err(MnemoError::NotFound(_)) => Ok(ForgetOutcome::NotFound),
                Err(e) => Err(e),
            };
        }

        let Some(query) = &args.query else {
            return Err(MnemoError::Internal(
                "memory_forget requires an id or a query".to_string(),
            ));
        };

        let user_id = args
            .user_id
            .unwrap_or_else(|| self.config().memory.user_id.clone());
        let limit = args
            .limit
            .unwrap_or(10)
            .clamp(FORGET_LIMIT_RANGE.0, FORGET_LIMIT_RANGE.1);

        let results = self
            .recall()
            .search(
                query,
                &RecallQuery {
                    user_id,
                    scope: args.scope.unwrap_or_default(),
                    limit,
                    deep: false,
                    session_id: self.current_session().await,
                },
            )
            .await?;
        if results.is_empty() {
            return Ok(ForgetOutcome::NotFound);
        }

        // An exact (case-insensitive) text match narrows the candidates.
        let lowered = query.trim().to_lowercase();
        let exact: Vec<&Memory> = results
            .iter()
            .filter(|m| m.text.trim().to_lowercase() == lowered)
            .collect();
        let candidates: Vec<Memory> = if exact.is_empty() {
            results.clone()
        } else {
            exact.into_iter().cloned().collect()
        };

        if args.delete_all {
            let mut deleted = 0usize;
            let mut failed = 0usize;
            for memory in &candidates {
                match self.ingestor().delete(&memory.id).await {
                    Ok(()) => deleted += 1,
                    Err(_) => failed += 1,
                }
            }
            return Ok(ForgetOutcome::BulkDeleted { deleted, failed });
        }

        if candidates.len() == 1 {
            let memory = &candidates[0];
            self.ingestor().delete(&memory.id).await?;
            return Ok(ForgetOutcome::Deleted {
                id: memory.id.clone(),
                text: memory.text.clone(),
            });
        }

        Ok(ForgetOutcome::Candidates(candidates))
    }

    /// Aggregated counters in tool form.
    pub async fn memory_stats(&self) -> Result<MemoryStats, MnemoError> {
        self.stats().collect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::LogSink;
    use mnemo_config::MnemoConfig;
    use mnemo_core::types::l2_normalize;
    use mnemo_test_utils::MockEmbedder;
    use std::sync::Arc;

    async fn coordinator(dir: &tempfile::TempDir) -> (Coordinator, Arc<MockEmbedder>) {
        let mut config = MnemoConfig::default();
        config.data_dir = Some(dir.path().to_path_buf());
        let embedder = Arc::new(MockEmbedder::new(8));
        let coordinator = Coordinator::new(
            config,
            embedder.clone(),
            None,
            Arc::new(LogSink),
        )
        .await
        .unwrap();
        (coordinator, embedder)
    }

    #[tokio::test]
    async fn store_then_search_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _embedder) = coordinator(&dir).await;

        let stored = coordinator
            .memory_store(StoreArgs {
                text: "User uses Rust daily for systems work.".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(stored.stored_count, 1);
        assert_eq!(stored.results[0].event, MemoryEvent::Add);

        let found = coordinator
            .memory_search(SearchArgs {
                query: "User uses Rust daily for systems work.".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.results.len(), 1);
        assert!(found.text.contains("Rust daily"));
        assert_eq!(found.results[0].source_tier, "hot");
    }

    #[tokio::test]
    async fn store_duplicate_counts_zero() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _embedder) = coordinator(&dir).await;
        let args = || StoreArgs {
            text: "User likes tea.".to_string(),
            ..Default::default()
        };

        let first = coordinator.memory_store(args()).await.unwrap();
        assert_eq!(first.stored_count, 1);
        // Identical text embeds identically: cosine 1.0, shorter-or-equal
        // candidate, so the merge policy classifies NOOP.
        let second = coordinator.memory_store(args()).await.unwrap();
        assert_eq!(second.stored_count, 0);
        assert_eq!(second.results[0].event, MemoryEvent::Noop);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _embedder) = coordinator(&dir).await;
        assert!(matches!(
            coordinator.memory_get("ghost").await,
            Err(MnemoError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_scopes_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _embedder) = coordinator(&dir).await;

        for i in 0..5 {
            coordinator
                .memory_store(StoreArgs {
                    text: format!("Standalone fact number {i} about topic {i}."),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let all = coordinator.memory_list(ListArgs::default()).await.unwrap();
        assert_eq!(all.len(), 5);

        let limited = coordinator
            .memory_list(ListArgs {
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);

        // No session established: session scope lists nothing.
        let session = coordinator
            .memory_list(ListArgs {
                scope: Some(SearchScope::Session),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn forget_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _embedder) = coordinator(&dir).await;
        let stored = coordinator
            .memory_store(StoreArgs {
                text: "User has a dog named Max.".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let id = stored.results[0].id.clone();

        match coordinator
            .memory_forget(ForgetArgs {
                id: Some(id.clone()),
                ..Default::default()
            })
            .await
            .unwrap()
        {
            ForgetOutcome::Deleted { id: deleted, .. } => assert_eq!(deleted, id),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(
            coordinator.memory_get(&id).await,
            Err(MnemoError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn forget_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _embedder) = coordinator(&dir).await;
        assert!(matches!(
            coordinator
                .memory_forget(ForgetArgs {
                    id: Some("ghost".to_string()),
                    ..Default::default()
                })
                .await
                .unwrap(),
            ForgetOutcome::NotFound
        ));
    }

    #[tokio::test]
    async fn forget_exact_match_restricts_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, embedder) = coordinator(&dir).await;

        // Two memories close in vector space; only one matches the query
        // text exactly. The lowercased query embeds to the same direction.
        embedder.set_vector("User likes tea.", l2_normalize(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
        embedder.set_vector("user likes tea.", l2_normalize(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
        embedder.set_vector(
            "User likes tea ceremonies.",
            l2_normalize(&[0.85, 0.52, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        );
        coordinator
            .memory_store(StoreArgs {
                text: "User likes tea.".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        coordinator
            .memory_store(StoreArgs {
                text: "User likes tea ceremonies.".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        match coordinator
            .memory_forget(ForgetArgs {
                query: Some("user likes tea.".to_string()),
                ..Default::default()
            })
            .await
            .unwrap()
        {
            ForgetOutcome::Deleted { text, .. } => assert_eq!(text, "User likes tea."),
            other => panic!("unexpected outcome: {other:?}"),
        }

        // The non-exact sibling survives.
        let rest = coordinator.memory_list(ListArgs::default()).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].text, "User likes tea ceremonies.");
    }

    #[tokio::test]
    async fn forget_multiple_candidates_returns_disambiguation() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, embedder) = coordinator(&dir).await;

        embedder.set_vector("tea", l2_normalize(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
        embedder.set_vector(
            "User drinks green tea.",
            l2_normalize(&[0.9, 0.44, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        );
        embedder.set_vector(
            "User drinks black tea.",
            l2_normalize(&[0.9, 0.0, 0.44, 0.0, 0.0, 0.0, 0.0, 0.0]),
        );
        coordinator
            .memory_store(StoreArgs {
                text: "User drinks green tea.".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        coordinator
            .memory_store(StoreArgs {
                text: "User drinks black tea.".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        match coordinator
            .memory_forget(ForgetArgs {
                query: Some("tea".to_string()),
                ..Default::default()
            })
            .await
            .unwrap()
        {
            ForgetOutcome::Candidates(candidates) => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
        // Nothing deleted.
        assert_eq!(
            coordinator.memory_list(ListArgs::default()).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn forget_delete_all_removes_every_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, embedder) = coordinator(&dir).await;

        embedder.set_vector("tea", l2_normalize(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
        embedder.set_vector(
            "User drinks green tea.",
            l2_normalize(&[0.9, 0.44, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        );
        embedder.set_vector(
            "User drinks black tea.",
            l2_normalize(&[0.9, 0.0, 0.44, 0.0, 0.0, 0.0, 0.0, 0.0]),
        );
        for text in ["User drinks green tea.", "User drinks black tea."] {
            coordinator
                .memory_store(StoreArgs {
                    text: text.to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        match coordinator
            .memory_forget(ForgetArgs {
                query: Some("tea".to_string()),
                delete_all: true,
                ..Default::default()
            })
            .await
            .unwrap()
        {
            ForgetOutcome::BulkDeleted { deleted, failed } => {
                assert_eq!(deleted, 2);
                assert_eq!(failed, 0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(coordinator.memory_list(ListArgs::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn forget_without_id_or_query_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _embedder) = coordinator(&dir).await;
        assert!(coordinator.memory_forget(ForgetArgs::default()).await.is_err());
    }

    #[tokio::test]
    async fn stats_reflect_store_contents() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _embedder) = coordinator(&dir).await;
        coordinator
            .memory_store(StoreArgs {
                text: "User prefers dark mode.".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let stats = coordinator.memory_stats().await.unwrap();
        assert_eq!(stats.total_memories, 1);
        assert_eq!(stats.write_queue.total_writes, 1);
    }
}
