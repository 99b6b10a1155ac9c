// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types, errors, and boundary traits for the mnemo memory subsystem.
//!
//! Everything downstream (store, ingestion, recall, reflection) depends on
//! this crate and nothing here depends back, keeping the dependency graph
//! acyclic: providers and embedders are leaves behind narrow traits.

pub mod error;
pub mod traits;
pub mod types;

pub use error::MnemoError;
pub use traits::{Embedder, LanguageModel};
pub use types::{
    ChatMessage, GenerateOptions, Memory, MemoryEvent, PendingAction, SearchScope, SourceTier,
    TurnMessage,
};
