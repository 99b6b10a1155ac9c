// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the mnemo memory subsystem.

use thiserror::Error;

/// The primary error type used across all mnemo subsystems.
#[derive(Debug, Error)]
pub enum MnemoError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    /// Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The embedding model could not be loaded or is unusable.
    /// Non-fatal: recall and ingest skip the turn with a warning.
    #[error("embedder unavailable: {0}")]
    EmbedderUnavailable(String),

    /// Language model transport or HTTP failure. `status` is the HTTP
    /// status code, or 0 when the request never reached the server.
    /// `body_preview` is the response body truncated to 240 characters.
    #[error("language model error (status {status}): {body_preview}")]
    LanguageModel { status: u16, body_preview: String },

    /// Hot-tier read/write failure (database connection, query, serialization).
    #[error("store error: {source}")]
    Store {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Cold-tier journal failure. Non-fatal for reads; fatal for an
    /// append within a pruning batch (the corresponding deletes are skipped).
    #[error("archive error: {0}")]
    Archive(String),

    /// The requested memory does not exist (or has no usable text).
    #[error("memory not found: {0}")]
    NotFound(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MnemoError {
    /// Builds a `LanguageModel` error, truncating the body preview to 240 chars.
    pub fn language_model(status: u16, body: &str) -> Self {
        let body_preview: String = body.chars().take(240).collect();
        MnemoError::LanguageModel {
            status,
            body_preview,
        }
    }

    /// Wraps an arbitrary error source as a store error.
    pub fn store<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        MnemoError::Store {
            source: Box::new(source),
        }
    }
}
