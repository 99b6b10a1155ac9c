// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local ONNX embedder using all-MiniLM-L6-v2.
//!
//! Produces 384-dimensional unit-norm embeddings on CPU with zero
//! external API calls. A single inference session is pooled behind a
//! mutex; callers see per-call ordering but not parallel inference.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use mnemo_core::types::l2_normalize;
use mnemo_core::{Embedder, MnemoError};
use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

/// Embedding dimensions for all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

/// ONNX-based embedder over the quantized all-MiniLM-L6-v2 model.
///
/// All inference runs on CPU with a single thread. Construction failures
/// (missing or unloadable model files) surface as `EmbedderUnavailable`,
/// which recall and ingest treat as a skip-this-turn signal.
pub struct OnnxEmbedder {
    /// ONNX Runtime session (not Send, wrapped in Mutex for safety).
    session: Mutex<Session>,
    /// HuggingFace tokenizer.
    tokenizer: tokenizers::Tokenizer,
}

// Safety: Session is accessed through Mutex which provides synchronization.
// The tokenizer is thread-safe for encoding operations.
unsafe impl Send for OnnxEmbedder {}
unsafe impl Sync for OnnxEmbedder {}

impl OnnxEmbedder {
    /// Creates an embedder from model files on disk.
    ///
    /// Expects `tokenizer.json` next to the provided `model.onnx` path.
    pub fn new(model_path: &Path) -> Result<Self, MnemoError> {
        let tokenizer_path = model_path
            .parent()
            .map(|dir| dir.join("tokenizer.json"))
            .ok_or_else(|| {
                MnemoError::EmbedderUnavailable(format!(
                    "invalid model path {}",
                    model_path.display()
                ))
            })?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            MnemoError::EmbedderUnavailable(format!(
                "tokenizer {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.with_intra_threads(1))
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(|e| {
                MnemoError::EmbedderUnavailable(format!("model {}: {e}", model_path.display()))
            })?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    /// Embed a single text string, returning a unit-norm 384-dim vector.
    fn embed_text(&self, text: &str) -> Result<Vec<f32>, MnemoError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| MnemoError::Internal(format!("tokenization failed: {e}")))?;
        let features = EncodedFeatures::from_encoding(&encoding)?;
        let pooled = self.run_pooled(&features)?;
        Ok(l2_normalize(&pooled))
    }

    /// Runs the model and mean-pools token states under the attention mask.
    fn run_pooled(&self, features: &EncodedFeatures) -> Result<Vec<f32>, MnemoError> {
        let mut session = self
            .session
            .lock()
            .map_err(|e| MnemoError::Internal(format!("failed to lock session: {e}")))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => tensor_view(&features.input_ids)?,
                "attention_mask" => tensor_view(&features.attention_mask)?,
                "token_type_ids" => tensor_view(&features.token_type_ids)?
            ])
            .map_err(|e| MnemoError::Internal(format!("inference failed: {e}")))?;

        // Last hidden state, shape [1, seq_len, hidden].
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| MnemoError::Internal(format!("failed to extract output tensor: {e}")))?;
        let hidden = shape
            .last()
            .map(|&d| d as usize)
            .filter(|&d| d > 0)
            .ok_or_else(|| MnemoError::Internal("output tensor has no hidden axis".to_string()))?;

        Ok(masked_mean(data, features.attention_mask.iter(), hidden))
    }
}

/// Tokenizer output reshaped into the model's three [1, seq_len] inputs.
struct EncodedFeatures {
    input_ids: Array2<i64>,
    attention_mask: Array2<i64>,
    token_type_ids: Array2<i64>,
}

impl EncodedFeatures {
    fn from_encoding(encoding: &tokenizers::Encoding) -> Result<Self, MnemoError> {
        Ok(Self {
            input_ids: feature_row(encoding.get_ids())?,
            attention_mask: feature_row(encoding.get_attention_mask())?,
            token_type_ids: feature_row(encoding.get_type_ids())?,
        })
    }
}

/// One batch-of-one feature row, widened to the i64 the model expects.
fn feature_row(values: &[u32]) -> Result<Array2<i64>, MnemoError> {
    let row: Vec<i64> = values.iter().map(|&v| i64::from(v)).collect();
    Array2::from_shape_vec((1, row.len()), row)
        .map_err(|e| MnemoError::Internal(format!("failed to shape model input: {e}")))
}

fn tensor_view(array: &Array2<i64>) -> Result<TensorRef<'_, i64>, MnemoError> {
    TensorRef::from_array_view(array)
        .map_err(|e| MnemoError::Internal(format!("tensor view: {e}")))
}

/// Mean over the token states whose mask bit is set.
///
/// `hidden_states` is the flattened [seq_len, hidden] output; tokens and
/// mask bits pair up positionally. An all-zero mask yields a zero vector.
fn masked_mean<'a>(
    hidden_states: &[f32],
    mask: impl Iterator<Item = &'a i64>,
    hidden: usize,
) -> Vec<f32> {
    let mut acc = vec![0.0f32; hidden];
    let mut kept = 0usize;

    for (token_state, &keep) in hidden_states.chunks(hidden).zip(mask) {
        if keep == 0 {
            continue;
        }
        kept += 1;
        for (slot, value) in acc.iter_mut().zip(token_state) {
            *slot += value;
        }
    }

    if kept > 0 {
        let scale = 1.0 / kept as f32;
        for slot in &mut acc {
            *slot *= scale;
        }
    }
    acc
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MnemoError> {
        self.embed_text(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MnemoError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_text(text)?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_mean_skips_padding() {
        // Two tokens, hidden 3, first token is padding.
        let states = [
            0.0, 0.0, 0.0, // padding
            1.0, 2.0, 3.0, // real token
        ];
        let mask = [0i64, 1];
        assert_eq!(masked_mean(&states, mask.iter(), 3), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn masked_mean_averages_kept_tokens() {
        let states = [
            1.0, 2.0, // token 0
            3.0, 4.0, // token 1
            5.0, 6.0, // token 2
        ];
        let mask = [1i64, 1, 1];
        let pooled = masked_mean(&states, mask.iter(), 2);
        assert!((pooled[0] - 3.0).abs() < f32::EPSILON);
        assert!((pooled[1] - 4.0).abs() < f32::EPSILON);
    }

    #[test]
    fn masked_mean_all_padding_is_zero() {
        let states = [1.0, 2.0, 3.0, 4.0];
        let mask = [0i64, 0];
        assert_eq!(masked_mean(&states, mask.iter(), 2), vec![0.0, 0.0]);
    }

    #[test]
    fn feature_row_widens_and_shapes() {
        let row = feature_row(&[101, 2023, 102]).unwrap();
        assert_eq!(row.shape(), &[1, 3]);
        assert_eq!(row[[0, 0]], 101);
        assert_eq!(row[[0, 2]], 102);
    }

    #[test]
    fn feature_row_empty_input() {
        let row = feature_row(&[]).unwrap();
        assert_eq!(row.shape(), &[1, 0]);
    }

    #[test]
    fn missing_model_is_embedder_unavailable() {
        let err = OnnxEmbedder::new(Path::new("/nonexistent/model.onnx")).unwrap_err();
        assert!(matches!(err, MnemoError::EmbedderUnavailable(_)));
    }

    // Note: inference itself requires actual model files; the trait
    // implementation is exercised with MockEmbedder elsewhere.
}
