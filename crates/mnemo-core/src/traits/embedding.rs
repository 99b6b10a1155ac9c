// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding boundary: text to unit-norm vector.

use async_trait::async_trait;

use crate::error::MnemoError;

/// Maps text to a unit-norm vector of the model's fixed dimension.
///
/// Implementations may pool a single extractor and serialize access; the
/// contract only requires that `embed_batch` output order matches input
/// order. A model that cannot be loaded fails with
/// [`MnemoError::EmbedderUnavailable`], which callers treat as a
/// best-effort skip of recall/ingest for the turn.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds one text into a unit-norm vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MnemoError>;

    /// Embeds a batch; output index i corresponds to input index i.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MnemoError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Output vector dimension.
    fn dimensions(&self) -> usize;
}
