// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Boundary traits consumed by the memory core.

pub mod embedding;
pub mod provider;

pub use embedding::Embedder;
pub use provider::LanguageModel;
