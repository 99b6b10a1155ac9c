// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Language-model boundary: chat completion with optional JSON mode.

use async_trait::async_trait;

use crate::error::MnemoError;
use crate::types::{ChatMessage, GenerateOptions};

/// Chat-completion provider.
///
/// With `json_mode` set, the returned string must parse as a JSON value.
/// Backends without native structured output are expected to append a
/// JSON-only instruction, strip reasoning fences from the reply, and
/// return the literal `{}` rather than failing on unparsable output.
/// Transport and HTTP failures surface as
/// [`MnemoError::LanguageModel`] with a truncated body preview.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Runs one completion over the given messages.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        opts: GenerateOptions,
    ) -> Result<String, MnemoError>;
}
