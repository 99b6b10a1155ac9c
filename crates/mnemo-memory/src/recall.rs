// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-scope semantic recall with a fingerprinted result cache.
//!
//! A query fans out to up to three independent read-only sub-searches
//! (long-term hot, session hot, deep archive) which run concurrently.
//! Results merge in scope order with first-occurrence-wins dedup by id.
//! Non-empty result sets are cached under a fingerprint of every input
//! that affects them; any acknowledged hot mutation clears the cache.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use mnemo_core::{Embedder, Memory, MnemoError, SearchScope};
use mnemo_store::{Archive, HotStore, SearchParams};
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct CacheEntry {
    expires_at: Instant,
    results: Vec<Memory>,
}

/// Bounded TTL cache for recall results.
///
/// Shared between the recall path (reads, inserts) and every mutation
/// path (invalidation). Expired entries are removed lazily on lookup.
pub struct SearchCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl SearchCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Copy-on-return lookup; expired entries are dropped.
    pub async fn get(&self, key: &str) -> Option<Vec<Memory>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.results.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, key: String, results: Vec<Memory>) {
        let entry = CacheEntry {
            expires_at: Instant::now() + self.ttl,
            results,
        };
        self.entries.lock().await.put(key, entry);
    }

    /// Drops every entry. Called synchronously after each acknowledged
    /// hot-store mutation.
    pub async fn invalidate(&self) {
        self.entries.lock().await.clear();
    }

    /// Current entry count (testing and stats).
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Options for one recall query.
#[derive(Debug, Clone)]
pub struct RecallQuery {
    pub user_id: String,
    pub scope: SearchScope,
    pub limit: usize,
    /// Include the cold archive in the fan-out.
    pub deep: bool,
    pub session_id: Option<String>,
}

/// Multi-scope searcher over the hot store and archive.
pub struct Recall {
    store: Arc<HotStore>,
    archive: Arc<Archive>,
    embedder: Arc<dyn Embedder>,
    cache: Arc<SearchCache>,
    threshold: f32,
}

impl Recall {
    pub fn new(
        store: Arc<HotStore>,
        archive: Arc<Archive>,
        embedder: Arc<dyn Embedder>,
        cache: Arc<SearchCache>,
        threshold: f32,
    ) -> Self {
        Self {
            store,
            archive,
            embedder,
            cache,
            threshold,
        }
    }

    /// The shared cache, for mutation paths to invalidate.
    pub fn cache(&self) -> Arc<SearchCache> {
        Arc::clone(&self.cache)
    }

    /// Runs one recall query, consulting the cache first.
    pub async fn search(&self, query: &str, opts: &RecallQuery) -> Result<Vec<Memory>, MnemoError> {
        let key = fingerprint(query, opts);
        if let Some(hit) = self.cache.get(&key).await {
            debug!(key, "recall cache hit");
            return Ok(hit);
        }

        let want_long_term = matches!(opts.scope, SearchScope::LongTerm | SearchScope::All);
        let want_session = matches!(opts.scope, SearchScope::Session | SearchScope::All)
            && opts.session_id.is_some();
        let want_archive = opts.deep && want_long_term;

        // The hot sub-searches need the query embedded; the archive scan
        // does not. An unavailable embedder turns the hot sources into
        // empty lists rather than failing the whole recall.
        let query_vector = if want_long_term || want_session {
            match self.embedder.embed(query).await {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(error = %e, "query embedding failed, hot tiers skipped");
                    None
                }
            }
        } else {
            None
        };

        let long_term_fut = async {
            match (&query_vector, want_long_term) {
                (Some(vector), true) => self
                    .store
                    .search(
                        vector,
                        SearchParams {
                            user_id: opts.user_id.clone(),
                            run_id: None,
                            limit: opts.limit,
                            threshold: self.threshold,
                        },
                    )
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "long-term search failed");
                        Vec::new()
                    }),
                _ => Vec::new(),
            }
        };

        let session_fut = async {
            match (&query_vector, want_session) {
                (Some(vector), true) => self
                    .store
                    .search(
                        vector,
                        SearchParams {
                            user_id: opts.user_id.clone(),
                            run_id: opts.session_id.clone(),
                            limit: opts.limit,
                            threshold: self.threshold,
                        },
                    )
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "session search failed");
                        Vec::new()
                    }),
                _ => Vec::new(),
            }
        };

        let archive_fut = async {
            if want_archive {
                self.archive
                    .search(query, opts.limit)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "archive search failed");
                        Vec::new()
                    })
            } else {
                Vec::new()
            }
        };

        let (long_term, session, archived) = tokio::join!(long_term_fut, session_fut, archive_fut);

        // Union order: long-term, then session, then archive; dedup by id
        // with the first occurrence winning. Session scope uses only its
        // own source.
        let ordered: Vec<Vec<Memory>> = match opts.scope {
            SearchScope::Session => vec![session],
            SearchScope::LongTerm => vec![long_term, archived],
            SearchScope::All => vec![long_term, session, archived],
        };

        let mut seen = std::collections::HashSet::new();
        let mut merged = Vec::new();
        for source in ordered {
            for memory in source {
                if seen.insert(memory.id.clone()) {
                    merged.push(memory);
                }
            }
        }
        merged.truncate(opts.limit);

        if !merged.is_empty() {
            self.cache.put(key, merged.clone()).await;
        }
        Ok(merged)
    }
}

/// Cache key capturing every variable that affects a search's result set.
fn fingerprint(query: &str, opts: &RecallQuery) -> String {
    let normalized = query.trim().to_lowercase();
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    format!(
        "{normalized}|{}|{}|{}|{}|{}",
        opts.limit,
        opts.user_id,
        opts.scope.as_str(),
        opts.deep,
        opts.session_id.as_deref().unwrap_or("-"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::types::l2_normalize;
    use mnemo_core::Memory;
    use mnemo_test_utils::MockEmbedder;

    fn make_memory(id: &str, text: &str, user: &str, run: Option<&str>) -> Memory {
        Memory::new(
            id.to_string(),
            text.to_string(),
            user.to_string(),
            run.map(|s| s.to_string()),
        )
    }

    async fn setup() -> (Arc<HotStore>, Arc<Archive>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(HotStore::open_in_memory().await.unwrap());
        let archive = Arc::new(Archive::new(dir.path().join("mem0-archive.jsonl")));
        (store, archive, dir)
    }

    fn recall_with(
        store: Arc<HotStore>,
        archive: Arc<Archive>,
        embedder: Arc<MockEmbedder>,
    ) -> Recall {
        let cache = Arc::new(SearchCache::new(16, Duration::from_secs(60)));
        Recall::new(store, archive, embedder, cache, 0.5)
    }

    fn query(user: &str, scope: SearchScope, deep: bool, session: Option<&str>) -> RecallQuery {
        RecallQuery {
            user_id: user.to_string(),
            scope,
            limit: 5,
            deep,
            session_id: session.map(|s| s.to_string()),
        }
    }

    #[tokio::test]
    async fn long_term_scope_excludes_session_memories() {
        let (store, archive, _dir) = setup().await;
        let embedder = Arc::new(MockEmbedder::new(4));
        embedder.set_vector("tea", l2_normalize(&[1.0, 0.0, 0.0, 0.0]));
        embedder.set_vector("User likes tea.", l2_normalize(&[1.0, 0.1, 0.0, 0.0]));
        embedder.set_vector("Session tea note.", l2_normalize(&[1.0, 0.2, 0.0, 0.0]));

        store
            .upsert(
                &make_memory("lt", "User likes tea.", "u1", None),
                &embedder.vector_for("User likes tea."),
            )
            .await
            .unwrap();
        store
            .upsert(
                &make_memory("sess", "Session tea note.", "u1", Some("s1")),
                &embedder.vector_for("Session tea note."),
            )
            .await
            .unwrap();

        let recall = recall_with(store, archive, embedder);
        let results = recall
            .search("tea", &query("u1", SearchScope::LongTerm, false, Some("s1")))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "lt");
    }

    #[tokio::test]
    async fn all_scope_merges_long_term_before_session() {
        let (store, archive, _dir) = setup().await;
        let embedder = Arc::new(MockEmbedder::new(4));
        embedder.set_vector("tea", l2_normalize(&[1.0, 0.0, 0.0, 0.0]));
        embedder.set_vector("User likes tea.", l2_normalize(&[1.0, 0.1, 0.0, 0.0]));
        embedder.set_vector("Session tea note.", l2_normalize(&[1.0, 0.2, 0.0, 0.0]));

        store
            .upsert(
                &make_memory("lt", "User likes tea.", "u1", None),
                &embedder.vector_for("User likes tea."),
            )
            .await
            .unwrap();
        store
            .upsert(
                &make_memory("sess", "Session tea note.", "u1", Some("s1")),
                &embedder.vector_for("Session tea note."),
            )
            .await
            .unwrap();

        let recall = recall_with(store, archive, embedder);
        let results = recall
            .search("tea", &query("u1", SearchScope::All, false, Some("s1")))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "lt");
        assert_eq!(results[1].id, "sess");
    }

    #[tokio::test]
    async fn deep_search_reaches_archive() {
        let (store, archive, _dir) = setup().await;
        archive
            .append(&[make_memory("a1", "Project Titan ran in 2023.", "u1", None)])
            .await
            .unwrap();

        let embedder = Arc::new(MockEmbedder::new(4));
        let recall = recall_with(store, archive, embedder);
        let results = recall
            .search(
                "Titan project",
                &query("u1", SearchScope::LongTerm, true, None),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a1");
        assert_eq!(results[0].source_tier, mnemo_core::SourceTier::Archive);
    }

    #[tokio::test]
    async fn shallow_search_skips_archive() {
        let (store, archive, _dir) = setup().await;
        archive
            .append(&[make_memory("a1", "Project Titan ran in 2023.", "u1", None)])
            .await
            .unwrap();

        let embedder = Arc::new(MockEmbedder::new(4));
        let recall = recall_with(store, archive, embedder);
        let results = recall
            .search(
                "Titan project",
                &query("u1", SearchScope::LongTerm, false, None),
            )
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn dedup_by_id_first_occurrence_wins() {
        let (store, archive, _dir) = setup().await;
        let embedder = Arc::new(MockEmbedder::new(4));
        embedder.set_vector("tea", l2_normalize(&[1.0, 0.0, 0.0, 0.0]));
        embedder.set_vector("User likes tea.", l2_normalize(&[1.0, 0.1, 0.0, 0.0]));

        store
            .upsert(
                &make_memory("dup", "User likes tea.", "u1", None),
                &embedder.vector_for("User likes tea."),
            )
            .await
            .unwrap();
        // Same id also in archive; hot copy must win.
        archive
            .append(&[make_memory("dup", "User likes tea.", "u1", None)])
            .await
            .unwrap();

        let recall = recall_with(store, archive, embedder);
        let results = recall
            .search("tea", &query("u1", SearchScope::LongTerm, true, None))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_tier, mnemo_core::SourceTier::Hot);
    }

    #[tokio::test]
    async fn cache_returns_copy_and_invalidation_clears() {
        let (store, archive, _dir) = setup().await;
        let embedder = Arc::new(MockEmbedder::new(4));
        embedder.set_vector("tea", l2_normalize(&[1.0, 0.0, 0.0, 0.0]));
        embedder.set_vector("User likes tea.", l2_normalize(&[1.0, 0.1, 0.0, 0.0]));

        store
            .upsert(
                &make_memory("m1", "User likes tea.", "u1", None),
                &embedder.vector_for("User likes tea."),
            )
            .await
            .unwrap();

        let recall = recall_with(Arc::clone(&store), archive, embedder);
        let opts = query("u1", SearchScope::LongTerm, false, None);
        let first = recall.search("tea", &opts).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(recall.cache().len().await, 1);

        // Delete behind the cache's back: cached result still served.
        store.delete("m1").await.unwrap();
        let cached = recall.search("tea", &opts).await.unwrap();
        assert_eq!(cached.len(), 1);

        // After invalidation the live (now empty) store is consulted.
        recall.cache().invalidate().await;
        let live = recall.search("tea", &opts).await.unwrap();
        assert!(live.is_empty());
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_lazily() {
        let cache = SearchCache::new(4, Duration::from_millis(10));
        cache
            .put(
                "k".to_string(),
                vec![make_memory("m", "x", "u", None)],
            )
            .await;
        assert!(cache.get("k").await.is_some());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("k").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn empty_results_are_not_cached() {
        let (store, archive, _dir) = setup().await;
        let embedder = Arc::new(MockEmbedder::new(4));
        let recall = recall_with(store, archive, embedder);
        let results = recall
            .search("nothing", &query("u1", SearchScope::All, false, None))
            .await
            .unwrap();
        assert!(results.is_empty());
        assert!(recall.cache().is_empty().await);
    }

    #[test]
    fn fingerprint_normalizes_whitespace_and_case() {
        let opts = RecallQuery {
            user_id: "u1".to_string(),
            scope: SearchScope::All,
            limit: 5,
            deep: false,
            session_id: None,
        };
        assert_eq!(
            fingerprint("  What   Language ", &opts),
            fingerprint("what language", &opts)
        );
    }

    #[test]
    fn fingerprint_distinguishes_scope_and_session() {
        let base = RecallQuery {
            user_id: "u1".to_string(),
            scope: SearchScope::All,
            limit: 5,
            deep: false,
            session_id: None,
        };
        let mut session = base.clone();
        session.session_id = Some("s1".to_string());
        assert_ne!(fingerprint("q", &base), fingerprint("q", &session));

        let mut deep = base.clone();
        deep.deep = true;
        assert_ne!(fingerprint("q", &base), fingerprint("q", &deep));
    }
}
