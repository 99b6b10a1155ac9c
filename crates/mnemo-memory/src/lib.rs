// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory pipeline for the mnemo subsystem.
//!
//! ## Architecture
//!
//! - **OnnxEmbedder**: local ONNX model for 384-dim embedding inference
//! - **ModelManager**: first-run model download from HuggingFace
//! - **Ingestor**: LLM fact extraction with ADD/UPDATE/NOOP merge policy
//! - **Recall**: multi-scope concurrent search with a fingerprinted cache
//! - **ContextBuilder**: token-budgeted serialization for prompt injection
//! - **CaptureBatcher**: debounced batching of observed conversation turns

pub mod batcher;
pub mod context;
pub mod embedder;
pub mod ingestor;
pub mod model_manager;
pub mod recall;

pub use batcher::{CaptureBatcher, IngestSink};
pub use context::{BuildOptions, ContextBuildResult, ContextBuilder};
pub use embedder::OnnxEmbedder;
pub use ingestor::{IngestOptions, IngestOutcome, IngestResultItem, Ingestor};
pub use model_manager::ModelManager;
pub use recall::{Recall, RecallQuery, SearchCache};
