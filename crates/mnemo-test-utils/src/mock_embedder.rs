// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic mock embedder for similarity-controlled tests.
//!
//! Unknown texts hash to a stable pseudo-random unit vector; tests that
//! need an exact cosine relationship register explicit vectors with
//! [`MockEmbedder::set_vector`].

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;
use mnemo_core::types::l2_normalize;
use mnemo_core::{Embedder, MnemoError};

/// Mock embedder with per-text vector overrides.
pub struct MockEmbedder {
    dim: usize,
    overrides: Mutex<HashMap<String, Vec<f32>>>,
    fail: Mutex<bool>,
}

impl MockEmbedder {
    /// Creates a mock producing vectors of the given dimension.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            overrides: Mutex::new(HashMap::new()),
            fail: Mutex::new(false),
        }
    }

    /// Registers an exact vector for a text. The vector is normalized.
    pub fn set_vector(&self, text: &str, vector: Vec<f32>) {
        assert_eq!(vector.len(), self.dim, "override must match dimension");
        self.overrides
            .lock()
            .unwrap()
            .insert(text.to_string(), l2_normalize(&vector));
    }

    /// Makes every subsequent call fail with `EmbedderUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.fail.lock().unwrap() = unavailable;
    }

    /// The vector `embed` would return for this text (sync helper for
    /// seeding stores directly).
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.overrides.lock().unwrap().get(text) {
            return v.clone();
        }
        // Stable pseudo-random unit vector derived from the text hash.
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut state = hasher.finish() | 1;
        let mut raw = Vec::with_capacity(self.dim);
        for _ in 0..self.dim {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let unit = ((state >> 33) as f32 / (1u64 << 31) as f32) - 0.5;
            raw.push(unit);
        }
        l2_normalize(&raw)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MnemoError> {
        if *self.fail.lock().unwrap() {
            return Err(MnemoError::EmbedderUnavailable(
                "mock embedder marked unavailable".to_string(),
            ));
        }
        Ok(self.vector_for(text))
    }

    fn dimensions(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::types::cosine_similarity;

    #[tokio::test]
    async fn same_text_same_vector() {
        let embedder = MockEmbedder::new(8);
        let a = embedder.embed("hello").await.unwrap();
        let b = embedder.embed("hello").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_texts_differ() {
        let embedder = MockEmbedder::new(8);
        let a = embedder.embed("hello").await.unwrap();
        let b = embedder.embed("goodbye").await.unwrap();
        assert!(cosine_similarity(&a, &b) < 0.999);
    }

    #[tokio::test]
    async fn vectors_are_unit_norm() {
        let embedder = MockEmbedder::new(16);
        let v = embedder.embed("normalize me").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn override_takes_precedence() {
        let embedder = MockEmbedder::new(3);
        embedder.set_vector("pinned", vec![1.0, 0.0, 0.0]);
        let v = embedder.embed("pinned").await.unwrap();
        assert_eq!(v, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn unavailable_mode_errors() {
        let embedder = MockEmbedder::new(3);
        embedder.set_unavailable(true);
        assert!(matches!(
            embedder.embed("x").await,
            Err(MnemoError::EmbedderUnavailable(_))
        ));
    }
}
