// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the mnemo memory subsystem.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level mnemo configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values; a missing `[language_model]` section disables extraction and
/// reflection (capture still buffers, recall still serves).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MnemoConfig {
    /// Per-user data directory. Defaults to `~/.mnemo/data/mem0`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Memory identity, recall gates, and hot-store sizing.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Conversation capture batching.
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Search-result caching.
    #[serde(default)]
    pub recall: RecallConfig,

    /// Token budgeting for context injection.
    #[serde(default)]
    pub context: ContextConfig,

    /// Proactive-action scheduling.
    #[serde(default)]
    pub reflection: ReflectionConfig,

    /// Hot-store write serialization.
    #[serde(default)]
    pub store: StoreConfig,

    /// Language model used for extraction and reflection.
    #[serde(default)]
    pub language_model: Option<LanguageModelConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Memory identity, recall gates, and hot-store sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Owner of all memories written by this instance.
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Inject recalled memories on `before_turn`.
    #[serde(default = "default_true")]
    pub auto_recall: bool,

    /// Capture conversation turns on `after_turn`.
    #[serde(default = "default_true")]
    pub auto_capture: bool,

    /// Result cap for a recall query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum cosine similarity for a hot-store search hit.
    #[serde(default = "default_search_threshold")]
    pub search_threshold: f32,

    /// Hot-store record cap before pruning to the archive.
    #[serde(default = "default_max_memory_count")]
    pub max_memory_count: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            auto_recall: true,
            auto_capture: true,
            top_k: default_top_k(),
            search_threshold: default_search_threshold(),
            max_memory_count: default_max_memory_count(),
        }
    }
}

fn default_user_id() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_top_k() -> usize {
    5
}

fn default_search_threshold() -> f32 {
    0.5
}

fn default_max_memory_count() -> usize {
    2000
}

/// Conversation capture batching.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    /// Debounce window before a buffered batch is flushed, in milliseconds.
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,

    /// Maximum messages retained per buffer; older entries are dropped.
    #[serde(default = "default_batch_max_messages")]
    pub batch_max_messages: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: default_batch_window_ms(),
            batch_max_messages: default_batch_max_messages(),
        }
    }
}

fn default_batch_window_ms() -> u64 {
    1200
}

fn default_batch_max_messages() -> usize {
    30
}

/// Search-result caching.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecallConfig {
    /// Cache entry time-to-live, in milliseconds.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Bounded cache capacity.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_max_entries: default_cache_max_entries(),
        }
    }
}

fn default_cache_ttl_ms() -> u64 {
    45_000
}

fn default_cache_max_entries() -> usize {
    128
}

/// Token budgeting for context injection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Fraction of the model context window allotted to memories.
    #[serde(default = "default_budget_ratio")]
    pub token_budget_ratio: f64,

    /// Lower clamp on the derived budget, in tokens.
    #[serde(default = "default_budget_min")]
    pub token_budget_min: usize,

    /// Upper clamp on the derived budget, in tokens.
    #[serde(default = "default_budget_max")]
    pub token_budget_max: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget_ratio: default_budget_ratio(),
            token_budget_min: default_budget_min(),
            token_budget_max: default_budget_max(),
        }
    }
}

fn default_budget_ratio() -> f64 {
    0.15
}

fn default_budget_min() -> usize {
    200
}

fn default_budget_max() -> usize {
    4000
}

/// Proactive-action scheduling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReflectionConfig {
    /// Undelivered actions older than this are pruned, in milliseconds.
    #[serde(default = "default_action_ttl_ms")]
    pub action_ttl_ms: u64,

    /// Cap on unfired actions.
    #[serde(default = "default_max_pending_actions")]
    pub max_pending_actions: usize,

    /// Scheduler tick interval, in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            action_ttl_ms: default_action_ttl_ms(),
            max_pending_actions: default_max_pending_actions(),
            tick_ms: default_tick_ms(),
        }
    }
}

fn default_action_ttl_ms() -> u64 {
    7 * 24 * 3600 * 1000
}

fn default_max_pending_actions() -> usize {
    20
}

fn default_tick_ms() -> u64 {
    60_000
}

/// Hot-store write serialization.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Optional pause between serialized write tasks, in milliseconds.
    #[serde(default)]
    pub write_queue_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            write_queue_delay_ms: 0,
        }
    }
}

/// Language-model provider settings.
///
/// The heterogeneous provider shapes of the wild are re-expressed as a
/// tagged variant; `mnemo-llm` runs a normalization pass over these raw
/// values (default URLs, `/v1` suffixes, trailing `/chat/completions`
/// stripping) before building a client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum LanguageModelConfig {
    /// Any OpenAI-compatible chat-completions endpoint.
    OpenaiCompatible {
        base_url: String,
        #[serde(default)]
        api_key: Option<String>,
        model: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Whether the backend honors `response_format: json_object`.
        #[serde(default = "default_true")]
        json_mode_support: bool,
    },
    /// Local Ollama daemon.
    Ollama {
        #[serde(default = "default_ollama_url")]
        url: String,
        model: String,
    },
    /// Anthropic Messages API.
    Anthropic {
        api_key: String,
        model: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    /// Google Gemini generateContent API.
    Gemini { api_key: String, model: String },
    /// MiniMax chat completion API.
    Minimax {
        api_key: String,
        model: String,
        #[serde(default)]
        group_id: Option<String>,
    },
}

fn default_ollama_url() -> String {
    "http://127.0.0.1:11434".to_string()
}
