// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic embedding adapter.
//!
//! Texts registered with [`MockEmbedder::with_vector`] map to exactly that vector.
//! Anything else is embedded as a normalized hashed bag of words, so texts sharing
//! words score higher than unrelated ones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use mnemos_core::vector::l2_normalize;
use mnemos_core::{
    AdapterType, EmbeddingAdapter, EmbeddingInput, EmbeddingOutput, HealthStatus, MnemosError,
    PluginAdapter, Vector,
};

pub struct MockEmbedder {
    dimension: usize,
    table: HashMap<String, Vector>,
    calls: AtomicUsize,
    texts: AtomicUsize,
    failing: AtomicBool,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            table: HashMap::new(),
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Pins `text` to `vector`.
    ///
    /// # Panics
    ///
    /// When `vector` does not have the embedder's dimension.
    pub fn with_vector(mut self, text: &str, vector: Vector) -> Self {
        assert_eq!(vector.len(), self.dimension, "pinned vector for {text:?}");
        self.table.insert(text.to_string(), vector);
        self
    }

    /// Number of `embed` calls so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of texts successfully embedded so far.
    pub fn texts_embedded(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }

    /// While set, every `embed` call fails with an encoding error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn vector_for(&self, text: &str) -> Vector {
        if let Some(v) = self.table.get(text) {
            return v.clone();
        }
        let mut v = vec![0.0f32; self.dimension];
        let mut any = false;
        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dimension;
            v[bucket] += 1.0;
            any = true;
        }
        if !any {
            v[0] = 1.0;
        }
        l2_normalize(&v)
    }
}

/// Lowercased alphanumeric words; CJK characters count as one word each.
fn tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut word = String::new();
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            word.push(c);
            continue;
        }
        if !word.is_empty() {
            out.push(std::mem::take(&mut word));
        }
        if c.is_alphanumeric() {
            out.push(c.to_string());
        }
    }
    if !word.is_empty() {
        out.push(word);
    }
    out
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemosError> {
        if self.probe().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy("mock embedder set to fail".into()))
        }
    }

    async fn shutdown(&self) -> Result<(), MnemosError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, MnemosError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(MnemosError::encoding("mock embedder set to fail"));
        }
        if input.texts.is_empty() {
            return Err(MnemosError::encoding("cannot embed an empty batch"));
        }
        self.texts.fetch_add(input.texts.len(), Ordering::SeqCst);
        Ok(EmbeddingOutput {
            embeddings: input.texts.iter().map(|t| self.vector_for(t)).collect(),
            dimensions: self.dimension,
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
