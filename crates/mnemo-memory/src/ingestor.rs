// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fact extraction and upsert orchestration.
//!
//! A compacted conversation batch goes through the language model for
//! candidate facts, each candidate is embedded and compared against its
//! scope's nearest neighbours, and the merge policy classifies it as
//! ADD, UPDATE, or NOOP. All writes pass through the write queue and
//! clear the recall cache on acknowledgement.

use std::sync::Arc;

use mnemo_core::{
    ChatMessage, Embedder, GenerateOptions, LanguageModel, Memory, MemoryEvent, MnemoError,
    TurnMessage,
};
use mnemo_store::{Archive, HotStore, SearchParams, WriteQueue};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::recall::SearchCache;

/// Similarity at or above which a longer, overlapping candidate refines
/// the neighbour in place instead of creating a new record.
const UPDATE_THRESHOLD: f32 = 0.90;
/// Similarity at or above which a non-refining candidate is a duplicate.
const NOOP_THRESHOLD: f32 = 0.92;
/// Share of the neighbour's significant tokens a refinement must keep.
const REFINEMENT_OVERLAP: f64 = 0.7;
/// Neighbour query fan-out per candidate.
const NEIGHBOUR_CAP: usize = 10;
/// Neighbour query similarity floor.
const NEIGHBOUR_THRESHOLD: f32 = 0.5;

/// Fixed extraction instructions. Facts must be third-person,
/// self-contained, and credential-free.
const EXTRACTION_PROMPT: &str = r#"Extract durable facts about the user from this conversation. Output a JSON object of the form {"facts": ["...", "..."]}.

Rules for each fact:
- A self-contained third-person statement (e.g., "The user's dog is named Max")
- Specific and factual; opinions only when explicitly stated as preferences
- Never include passwords, API keys, tokens, or any other credentials
- Only facts likely to be relevant in future conversations

If there is nothing worth remembering, return {"facts": []}

Conversation:
{conversation}"#;

/// Scope a batch is ingested into.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub user_id: String,
    /// Session scope; `None` stores user-long-term facts.
    pub run_id: Option<String>,
}

/// One classified candidate.
#[derive(Debug, Clone)]
pub struct IngestResultItem {
    pub id: String,
    pub text: String,
    pub event: MemoryEvent,
}

/// Result of one ingest pass.
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub results: Vec<IngestResultItem>,
}

impl IngestOutcome {
    /// Candidates that actually mutated the store.
    pub fn written(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.event != MemoryEvent::Noop)
            .count()
    }
}

/// Fact-extraction orchestrator over the hot store.
pub struct Ingestor {
    store: Arc<HotStore>,
    archive: Arc<Archive>,
    queue: Arc<WriteQueue>,
    embedder: Arc<dyn Embedder>,
    llm: Option<Arc<dyn LanguageModel>>,
    cache: Arc<SearchCache>,
    max_memory_count: usize,
}

impl Ingestor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<HotStore>,
        archive: Arc<Archive>,
        queue: Arc<WriteQueue>,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<dyn LanguageModel>>,
        cache: Arc<SearchCache>,
        max_memory_count: usize,
    ) -> Self {
        Self {
            store,
            archive,
            queue,
            embedder,
            llm,
            cache,
            max_memory_count,
        }
    }

    /// Extracts facts from a conversation batch and applies the merge policy.
    ///
    /// A language-model failure aborts the batch (already-committed writes
    /// stay). An empty extraction is a successful no-op. Without a
    /// configured language model the ingest is silently empty.
    pub async fn ingest(
        &self,
        messages: &[TurnMessage],
        opts: &IngestOptions,
    ) -> Result<IngestOutcome, MnemoError> {
        let Some(llm) = &self.llm else {
            debug!("no language model configured, skipping extraction");
            return Ok(IngestOutcome::default());
        };
        if messages.is_empty() {
            return Ok(IngestOutcome::default());
        }

        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.text))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = EXTRACTION_PROMPT.replace("{conversation}", &transcript);

        let raw = llm
            .generate(
                &[ChatMessage::user(prompt)],
                GenerateOptions {
                    json_mode: true,
                    temperature: Some(0.2),
                    max_tokens: Some(1024),
                },
            )
            .await?;

        let candidates = parse_candidates(&raw);
        if candidates.is_empty() {
            debug!("extraction produced no candidates");
            return Ok(IngestOutcome::default());
        }

        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.store_fact(&candidate, opts).await {
                Ok(item) => results.push(item),
                // Losing the embedder or the hot tier fails the whole
                // operation; writes already committed stay. Anything
                // else (a timeout on one candidate, say) is recoverable
                // per item.
                Err(e @ (MnemoError::EmbedderUnavailable(_) | MnemoError::Store { .. })) => {
                    return Err(e)
                }
                Err(e) => {
                    warn!(error = %e, fact = %candidate, "failed to process extracted fact");
                }
            }
        }

        info!(
            extracted = results.len(),
            written = results.iter().filter(|r| r.event != MemoryEvent::Noop).count(),
            "ingest batch complete"
        );
        Ok(IngestOutcome { results })
    }

    /// Embeds one fact, queries its scope's neighbours, and applies the
    /// merge policy. Also the direct path behind the store tool.
    pub async fn store_fact(
        &self,
        text: &str,
        opts: &IngestOptions,
    ) -> Result<IngestResultItem, MnemoError> {
        let vector = self.embedder.embed(text).await?;
        let neighbours = self
            .store
            .search(
                &vector,
                SearchParams {
                    user_id: opts.user_id.clone(),
                    run_id: opts.run_id.clone(),
                    limit: NEIGHBOUR_CAP,
                    threshold: NEIGHBOUR_THRESHOLD,
                },
            )
            .await?;

        if let Some(top) = neighbours.first() {
            let similarity = top.score.unwrap_or(0.0);
            if similarity >= UPDATE_THRESHOLD && is_refinement(text, &top.text) {
                // Refined version of the same fact: keep id and created_at,
                // replace text and vector.
                let mut updated = top.clone();
                updated.text = text.to_string();
                updated.score = None;
                self.queued_upsert(updated.clone(), vector).await?;
                debug!(id = %updated.id, "updated memory in place");
                return Ok(IngestResultItem {
                    id: updated.id,
                    text: text.to_string(),
                    event: MemoryEvent::Update,
                });
            }
            if similarity >= NOOP_THRESHOLD {
                debug!(id = %top.id, similarity, "duplicate fact skipped");
                return Ok(IngestResultItem {
                    id: top.id.clone(),
                    text: text.to_string(),
                    event: MemoryEvent::Noop,
                });
            }
        }

        let memory = Memory::new(
            Uuid::new_v4().to_string(),
            text.to_string(),
            opts.user_id.clone(),
            opts.run_id.clone(),
        );
        let id = memory.id.clone();
        self.queued_upsert(memory, vector).await?;
        Ok(IngestResultItem {
            id,
            text: text.to_string(),
            event: MemoryEvent::Add,
        })
    }

    /// Deletes one memory through the write queue and clears the cache.
    pub async fn delete(&self, id: &str) -> Result<(), MnemoError> {
        let store = Arc::clone(&self.store);
        let owned = id.to_string();
        self.queue
            .submit(move || async move { store.delete(&owned).await })
            .await?;
        self.cache.invalidate().await;
        Ok(())
    }

    /// Moves the oldest overflow beyond `max_memory_count` into the archive.
    ///
    /// Archive append happens first and through the write queue; only on
    /// success are the hot copies deleted one by one. Per-item delete
    /// failures are counted and logged, not fatal. Returns the number of
    /// memories pruned from the hot tier.
    pub async fn prune(&self, user_id: &str) -> Result<usize, MnemoError> {
        let all = self.store.list_all(user_id).await?;
        if all.len() <= self.max_memory_count {
            return Ok(0);
        }
        let overflow = all.len() - self.max_memory_count;
        let victims: Vec<Memory> = all.into_iter().take(overflow).collect();

        let archive = Arc::clone(&self.archive);
        let batch = victims.clone();
        self.queue
            .submit(move || async move { archive.append(&batch).await })
            .await?;

        let mut deleted = 0usize;
        let mut failures = 0usize;
        for victim in &victims {
            let store = Arc::clone(&self.store);
            let id = victim.id.clone();
            match self
                .queue
                .submit(move || async move { store.delete(&id).await })
                .await
            {
                Ok(()) => deleted += 1,
                Err(e) => {
                    failures += 1;
                    warn!(id = %victim.id, error = %e, "failed to delete pruned memory");
                }
            }
        }
        self.cache.invalidate().await;

        info!(pruned = deleted, failures, "prune pass complete");
        Ok(deleted)
    }

    async fn queued_upsert(&self, memory: Memory, vector: Vec<f32>) -> Result<(), MnemoError> {
        let store = Arc::clone(&self.store);
        self.queue
            .submit(move || async move { store.upsert(&memory, &vector).await })
            .await?;
        self.cache.invalidate().await;
        Ok(())
    }
}

/// Pulls candidate fact texts out of the extraction response.
///
/// Accepts `{"facts": [...]}` and `{"results": [...]}` objects as well
/// as a bare array; items may be plain strings or objects carrying a
/// `text` or `content` field. Anything else contributes nothing.
pub fn parse_candidates(raw: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
        warn!("extraction response was not valid JSON");
        return Vec::new();
    };

    let items = match &value {
        serde_json::Value::Array(items) => items.as_slice(),
        serde_json::Value::Object(map) => map
            .get("facts")
            .or_else(|| map.get("results"))
            .and_then(|v| v.as_array())
            .map(|v| v.as_slice())
            .unwrap_or_default(),
        _ => &[],
    };

    items
        .iter()
        .filter_map(|item| match item {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(map) => map
                .get("text")
                .or_else(|| map.get("content"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            _ => None,
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// True when `candidate` reads as a refined/extended version of
/// `neighbour`: strictly longer and sharing at least 70% of the
/// neighbour's significant tokens.
fn is_refinement(candidate: &str, neighbour: &str) -> bool {
    if candidate.chars().count() <= neighbour.chars().count() {
        return false;
    }
    let neighbour_tokens = significant_tokens(neighbour);
    if neighbour_tokens.is_empty() {
        return false;
    }
    let candidate_tokens = significant_tokens(candidate);
    let shared = neighbour_tokens
        .iter()
        .filter(|t| candidate_tokens.contains(*t))
        .count();
    shared as f64 / neighbour_tokens.len() as f64 >= REFINEMENT_OVERLAP
}

/// Lowercased alphanumeric tokens of length >= 3.
fn significant_tokens(text: &str) -> std::collections::HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(|t| t.to_string())
        .collect()
}
