// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle coordinator: owns every subsystem and bridges host events.
//!
//! `before_turn` runs recall, context building, and a reflection poll,
//! returning the system-context string to inject. `after_turn` feeds the
//! capture batcher, whose flushes drive ingestion and the reflection
//! pass. A background tick delivers due proactive actions and writes
//! status snapshots. Event handlers never propagate errors to the host:
//! everything is caught, logged, and degraded to a neutral result.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mnemo_config::MnemoConfig;
use mnemo_core::{Embedder, LanguageModel, Memory, MnemoError, PendingAction, SearchScope, TurnMessage};
use mnemo_memory::{
    BuildOptions, CaptureBatcher, ContextBuilder, IngestOptions, IngestSink, Ingestor, Recall,
    RecallQuery, SearchCache,
};
use mnemo_store::{Archive, HotStore, WriteQueue};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::reflection::Reflection;
use crate::stats::StatsCollector;

/// Hot-tier backing file inside the data directory.
const HOT_STORE_FILE: &str = "vector_store.db";
/// Cold journal inside the data directory.
const ARCHIVE_FILE: &str = "mem0-archive.jsonl";
/// Reflection state inside the data directory.
const ACTIONS_FILE: &str = "mem0-actions.json";
/// Status snapshot inside the data directory.
const STATUS_FILE: &str = "mem0-status.json";

/// Minimum prompt length that triggers auto-recall.
const MIN_RECALL_PROMPT_CHARS: usize = 5;
/// Turns kept from the tail of an `after_turn` message list.
const CAPTURE_TAIL: usize = 10;

/// Outbound channel for proactive actions. Intentionally abstract: the
/// host decides what delivery means.
#[async_trait]
pub trait ProactiveSink: Send + Sync {
    async fn deliver(&self, action: &PendingAction) -> Result<(), MnemoError>;
}

/// Default sink: logs the action and declares it delivered.
pub struct LogSink;

#[async_trait]
impl ProactiveSink for LogSink {
    async fn deliver(&self, action: &PendingAction) -> Result<(), MnemoError> {
        info!(id = %action.id, message = %action.message, "proactive action due");
        Ok(())
    }
}

/// Per-turn context handed over by the host.
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    pub session_id: Option<String>,
    pub model_id: Option<String>,
}

/// Message content as the host emits it: a plain string or a list of
/// content blocks from which the text blocks are concatenated.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HostContent {
    Text(String),
    Blocks(Vec<HostBlock>),
}

/// One content block; non-text blocks simply carry no text.
#[derive(Debug, Clone, Deserialize)]
pub struct HostBlock {
    #[serde(default)]
    pub text: Option<String>,
}

/// One message observed on `after_turn`.
#[derive(Debug, Clone, Deserialize)]
pub struct HostMessage {
    pub role: String,
    pub content: HostContent,
}

impl HostMessage {
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: HostContent::Text(text.into()),
        }
    }

    /// Flattens the content to plain text.
    pub fn extract_text(&self) -> String {
        match &self.content {
            HostContent::Text(s) => s.clone(),
            HostContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| b.text.as_deref())
                .filter(|t| !t.trim().is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Glue between the capture batcher and ingestion + reflection.
///
/// The batcher stays ignorant of both; this sink runs the ingest and,
/// after a successful non-empty extraction, hands the batch and freshly
/// recalled memories to the reflection engine.
struct CaptureSink {
    ingestor: Arc<Ingestor>,
    reflection: Arc<Reflection>,
    recall: Arc<Recall>,
    user_id: String,
    top_k: usize,
}

#[async_trait]
impl IngestSink for CaptureSink {
    async fn deliver(
        &self,
        session_id: Option<String>,
        messages: Vec<TurnMessage>,
    ) -> Result<(), MnemoError> {
        let opts = IngestOptions {
            user_id: self.user_id.clone(),
            run_id: session_id,
        };
        let outcome = self.ingestor.ingest(&messages, &opts).await?;
        if outcome.results.is_empty() {
            return Ok(());
        }

        let recalled = self.recall_for_reflection(&messages).await;
        if let Err(e) = self.reflection.observe(&messages, &recalled).await {
            warn!(error = %e, "reflection observe failed");
        }
        Ok(())
    }
}

impl CaptureSink {
    /// Long-term memories matching the batch's last user message, for
    /// the reflection prompt.
    async fn recall_for_reflection(&self, messages: &[TurnMessage]) -> Vec<Memory> {
        let Some(query) = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.text.clone())
        else {
            return Vec::new();
        };
        self.recall
            .search(
                &query,
                &RecallQuery {
                    user_id: self.user_id.clone(),
                    scope: SearchScope::LongTerm,
                    limit: self.top_k,
                    deep: false,
                    session_id: None,
                },
            )
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "recall for reflection failed");
                Vec::new()
            })
    }
}

/// Owner of all memory subsystems for one data directory.
pub struct Coordinator {
    config: MnemoConfig,
    data_dir: PathBuf,
    store: Arc<HotStore>,
    archive: Arc<Archive>,
    queue: Arc<WriteQueue>,
    recall: Arc<Recall>,
    context_builder: ContextBuilder,
    ingestor: Arc<Ingestor>,
    batcher: CaptureBatcher,
    reflection: Arc<Reflection>,
    stats: Arc<StatsCollector>,
    sink: Arc<dyn ProactiveSink>,
    current_session: RwLock<Option<String>>,
    started: AtomicBool,
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Builds every subsystem against the configured data directory.
    pub async fn new(
        config: MnemoConfig,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<dyn LanguageModel>>,
        sink: Arc<dyn ProactiveSink>,
    ) -> Result<Self, MnemoError> {
        let data_dir = resolve_data_dir(&config)?;
        tokio::fs::create_dir_all(&data_dir).await.map_err(|e| {
            MnemoError::Config(format!("cannot create data dir {}: {e}", data_dir.display()))
        })?;

        let store = Arc::new(HotStore::open(&data_dir.join(HOT_STORE_FILE)).await?);
        let archive = Arc::new(Archive::new(data_dir.join(ARCHIVE_FILE)));
        let queue = Arc::new(WriteQueue::new(Duration::from_millis(
            config.store.write_queue_delay_ms,
        )));
        let cache = Arc::new(SearchCache::new(
            config.recall.cache_max_entries,
            Duration::from_millis(config.recall.cache_ttl_ms),
        ));
        let recall = Arc::new(Recall::new(
            Arc::clone(&store),
            Arc::clone(&archive),
            Arc::clone(&embedder),
            Arc::clone(&cache),
            config.memory.search_threshold,
        ));
        let ingestor = Arc::new(Ingestor::new(
            Arc::clone(&store),
            Arc::clone(&archive),
            Arc::clone(&queue),
            Arc::clone(&embedder),
            llm.clone(),
            Arc::clone(&cache),
            config.memory.max_memory_count,
        ));
        let reflection = Arc::new(Reflection::new(
            data_dir.join(ACTIONS_FILE),
            llm,
            &config.reflection,
        ));
        let stats = Arc::new(StatsCollector::new(
            Arc::clone(&store),
            Arc::clone(&archive),
            Arc::clone(&queue),
            config.memory.user_id.clone(),
        ));

        let capture_sink = Arc::new(CaptureSink {
            ingestor: Arc::clone(&ingestor),
            reflection: Arc::clone(&reflection),
            recall: Arc::clone(&recall),
            user_id: config.memory.user_id.clone(),
            top_k: config.memory.top_k,
        });
        let batcher = CaptureBatcher::new(
            Duration::from_millis(config.capture.batch_window_ms),
            config.capture.batch_max_messages,
            capture_sink,
        );

        Ok(Self {
            context_builder: ContextBuilder::new(&config.context),
            config,
            data_dir,
            store,
            archive,
            queue,
            recall,
            ingestor,
            batcher,
            reflection,
            stats,
            sink,
            current_session: RwLock::new(None),
            started: AtomicBool::new(false),
            tick_task: Mutex::new(None),
        })
    }

    /// Startup: prune pass, initial status, tick timer. Idempotent.
    pub async fn start(&self) -> Result<(), MnemoError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        match self.ingestor.prune(&self.config.memory.user_id).await {
            Ok(pruned) => info!(pruned, "startup prune complete"),
            Err(e) => warn!(error = %e, "startup prune failed"),
        }

        if let Err(e) = self.stats.write_status(&self.status_path()).await {
            warn!(error = %e, "initial status write failed");
        }

        let reflection = Arc::clone(&self.reflection);
        let stats = Arc::clone(&self.stats);
        let sink = Arc::clone(&self.sink);
        let status_path = self.status_path();
        let period = Duration::from_millis(self.config.reflection.tick_ms.max(1));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the tick
            // cadence starts one full period after startup.
            interval.tick().await;
            loop {
                interval.tick().await;
                match reflection.poll().await {
                    Ok(Some(action)) => match sink.deliver(&action).await {
                        Ok(()) => {
                            let _ = reflection.complete(&action.id).await;
                        }
                        Err(e) => {
                            warn!(id = %action.id, error = %e, "proactive delivery failed, re-arming");
                            let _ = reflection.mark_failed(&action.id).await;
                        }
                    },
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "reflection poll failed"),
                }
                if let Err(e) = stats.write_status(&status_path).await {
                    warn!(error = %e, "status snapshot failed");
                }
            }
        });
        *self.tick_task.lock().await = Some(handle);

        info!(data_dir = %self.data_dir.display(), "memory subsystem started");
        Ok(())
    }

    /// Shutdown: cancel tick, drain captures and writes, final status.
    /// Idempotent.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.tick_task.lock().await.take() {
            handle.abort();
        }
        self.batcher.flush_all().await;
        if let Err(e) = self.queue.drain().await {
            warn!(error = %e, "write queue drain failed");
        }
        if let Err(e) = self.stats.write_status(&self.status_path()).await {
            warn!(error = %e, "final status write failed");
        }
        info!("memory subsystem stopped");
    }

    /// Host `before_turn`: returns the system-context string to inject,
    /// or `None` when there is nothing to say. Never errors.
    pub async fn before_turn(&self, prompt: &str, ctx: &TurnContext) -> Option<String> {
        if !self.config.memory.auto_recall || prompt.chars().count() < MIN_RECALL_PROMPT_CHARS {
            return None;
        }

        *self.current_session.write().await = ctx.session_id.clone();

        let memories = match self
            .recall
            .search(
                prompt,
                &RecallQuery {
                    user_id: self.config.memory.user_id.clone(),
                    scope: SearchScope::All,
                    limit: self.config.memory.top_k,
                    deep: false,
                    session_id: ctx.session_id.clone(),
                },
            )
            .await
        {
            Ok(memories) => memories,
            Err(e) => {
                warn!(error = %e, "recall failed, turn proceeds without injection");
                Vec::new()
            }
        };

        let built = self.context_builder.build(
            &memories,
            &BuildOptions {
                model_id: ctx.model_id.clone().unwrap_or_else(|| "default".to_string()),
                max_memories: Some(self.config.memory.top_k),
            },
        );

        let mut out = built.text;
        match self.reflection.poll().await {
            Ok(Some(action)) => {
                out.push_str(&format!(
                    "\n<proactive-insight>\n系统提示: {}\n</proactive-insight>",
                    action.message
                ));
                // Injection into the prompt is the delivery.
                let _ = self.reflection.complete(&action.id).await;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "reflection poll failed"),
        }

        if out.is_empty() {
            None
        } else {
            debug!(injected = built.injected_count, "context injection ready");
            Some(out)
        }
    }

    /// Host `after_turn`: schedules the tail of the conversation into the
    /// capture batcher. Never errors.
    pub async fn after_turn(&self, messages: &[HostMessage], success: bool, ctx: &TurnContext) {
        if !self.config.memory.auto_capture || !success || messages.is_empty() {
            return;
        }

        let turns: Vec<TurnMessage> = messages
            .iter()
            .filter(|m| m.role == "user" || m.role == "assistant")
            .filter_map(|m| {
                let text = m.extract_text();
                if text.trim().is_empty() {
                    None
                } else {
                    Some(TurnMessage::new(m.role.clone(), text))
                }
            })
            .collect();
        if turns.is_empty() {
            return;
        }

        let tail = turns.len().saturating_sub(CAPTURE_TAIL);
        self.batcher
            .schedule(ctx.session_id.clone(), turns[tail..].to_vec())
            .await;
    }

    /// Session id seen on the most recent `before_turn`.
    pub async fn current_session(&self) -> Option<String> {
        self.current_session.read().await.clone()
    }

    pub fn status_path(&self) -> PathBuf {
        self.data_dir.join(STATUS_FILE)
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn config(&self) -> &MnemoConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<HotStore> {
        &self.store
    }

    pub fn archive(&self) -> &Arc<Archive> {
        &self.archive
    }

    pub fn recall(&self) -> &Arc<Recall> {
        &self.recall
    }

    pub fn ingestor(&self) -> &Arc<Ingestor> {
        &self.ingestor
    }

    pub fn reflection(&self) -> &Arc<Reflection> {
        &self.reflection
    }

    pub fn stats(&self) -> &Arc<StatsCollector> {
        &self.stats
    }

    pub fn batcher(&self) -> &CaptureBatcher {
        &self.batcher
    }
}

/// Per-user data directory: configured override or `~/.mnemo/data/mem0`.
pub fn resolve_data_dir(config: &MnemoConfig) -> Result<PathBuf, MnemoError> {
    if let Some(dir) = &config.data_dir {
        return Ok(dir.clone());
    }
    dirs::home_dir()
        .map(|home| home.join(".mnemo").join("data").join("mem0"))
        .ok_or_else(|| MnemoError::Config("cannot determine home directory".to_string()))
}
