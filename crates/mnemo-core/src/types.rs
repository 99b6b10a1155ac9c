// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the mnemo memory subsystem.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which storage tier a memory was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    /// The vector-indexed hot store.
    #[default]
    Hot,
    /// The append-only cold journal.
    Archive,
}

impl SourceTier {
    /// String form used in tool payloads and persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTier::Hot => "hot",
            SourceTier::Archive => "archive",
        }
    }
}

fn default_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// A single durable fact distilled from conversation.
///
/// `text` is a self-contained third-person statement. Identity is `id`;
/// `run_id` scopes the memory to a session, absence means user-long-term.
/// Archive lines may omit most fields, so everything except `id` and
/// `text` deserializes leniently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Opaque unique identifier.
    pub id: String,
    /// The fact as a standalone statement.
    pub text: String,
    /// Owner of this memory.
    #[serde(default)]
    pub user_id: String,
    /// Session scope; `None` means user-long-term.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Similarity score, populated only on search results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    /// Free-form category labels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Arbitrary key/value annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Creation instant.
    #[serde(default = "default_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Last-update instant. Invariant: `updated_at >= created_at`.
    #[serde(default = "default_timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Tier the record was served from.
    #[serde(default)]
    pub source_tier: SourceTier,
}

impl Memory {
    /// Creates a fresh hot-tier memory with both timestamps set to `now`.
    pub fn new(id: String, text: String, user_id: String, run_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            text,
            user_id,
            run_id,
            score: None,
            categories: Vec::new(),
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            source_tier: SourceTier::Hot,
        }
    }
}

/// Classification assigned to each extracted candidate fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoryEvent {
    /// A new memory was created.
    Add,
    /// An existing memory's text was refined in place.
    Update,
    /// The candidate duplicated an existing memory; nothing was written.
    Noop,
}

impl MemoryEvent {
    /// Wire form used in ingest results.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryEvent::Add => "ADD",
            MemoryEvent::Update => "UPDATE",
            MemoryEvent::Noop => "NOOP",
        }
    }
}

/// One observed conversation turn, as captured from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMessage {
    /// Role: "user" or "assistant".
    pub role: String,
    /// Plain text content.
    pub text: String,
}

impl TurnMessage {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            text: text.into(),
        }
    }
}

/// A scheduled proactive action awaiting delivery.
///
/// Invariant: `trigger_at >= created_at`. The `fired` flag is the
/// at-most-once bit: `poll` flips it before returning an action, and
/// `mark_failed` clears it to re-arm delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    /// Identifier of the form `action_{unix_ms}_{suffix}`.
    pub id: String,
    /// The message to deliver.
    pub message: String,
    /// When the action was created.
    pub created_at: DateTime<Utc>,
    /// Earliest instant the action may fire.
    pub trigger_at: DateTime<Utc>,
    /// Whether the action has been handed out for delivery.
    pub fired: bool,
    /// Number of failed delivery attempts so far.
    #[serde(default)]
    pub delivery_attempts: u32,
}

/// Which memory scopes a recall query fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SearchScope {
    /// Only memories bound to the current session.
    Session,
    /// Only user-long-term memories (no `run_id`).
    LongTerm,
    /// Long-term plus session memories.
    #[default]
    All,
}

impl SearchScope {
    /// String form used in cache fingerprints and tool payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchScope::Session => "session",
            SearchScope::LongTerm => "long-term",
            SearchScope::All => "all",
        }
    }

    /// Parses the wire form, defaulting unknown values to `All`.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "session" => SearchScope::Session,
            "long-term" | "long_term" => SearchScope::LongTerm,
            _ => SearchScope::All,
        }
    }
}

/// One message in a language-model conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant".
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Options for a language-model generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// When set, the returned string must parse as a JSON value.
    pub json_mode: bool,
    /// Sampling temperature override.
    pub temperature: Option<f32>,
    /// Output token cap override.
    pub max_tokens: Option<u32>,
}

/// Convert an f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a SQLite BLOB back to an f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Cosine similarity between two vectors of equal length.
///
/// For L2-normalized vectors this is the dot product. Mismatched
/// lengths yield 0.0 rather than panicking; the store filters those out
/// before scoring.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2-normalize a vector. Zero vectors are returned unchanged.
pub fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vec.iter().map(|v| v / norm).collect()
    } else {
        vec.to_vec()
    }
}
