// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Language-model provider clients for the mnemo memory subsystem.
//!
//! One `HttpLanguageModel` speaks every configured provider variant
//! (OpenAI-compatible, Ollama, Anthropic, Gemini, MiniMax) behind the
//! `LanguageModel` trait from `mnemo-core`. Raw config is normalized
//! once at construction; JSON-mode output is cleaned of reasoning noise
//! before it reaches a parser.

pub mod clean;
pub mod client;
pub mod normalize;

pub use clean::{extract_json_value, strip_reasoning};
pub use client::HttpLanguageModel;
pub use normalize::{normalize, Provider};
