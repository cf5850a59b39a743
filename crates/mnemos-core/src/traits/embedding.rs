// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter trait: turns text into fixed-length vectors.

use async_trait::async_trait;
use tracing::debug;

use crate::error::MnemosError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{EmbeddingInput, EmbeddingOutput, Vector};

/// Text used by [`EmbeddingAdapter::probe`] for its round-trip encode.
pub const PROBE_TEXT: &str = "health check";

/// Adapter for generating vector embeddings from text.
///
/// Every vector produced by one instance has the same length, reported by
/// [`dimension`](EmbeddingAdapter::dimension). Output order always matches input order.
#[async_trait]
pub trait EmbeddingAdapter: PluginAdapter {
    /// Encodes a batch of texts. Fails with [`MnemosError::Encoding`] on an empty batch
    /// or when the backend cannot produce one vector per text.
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, MnemosError>;

    /// Fixed vector length, or 0 while it is not yet known.
    fn dimension(&self) -> usize;

    /// Encodes a single text into a 1-D vector.
    async fn encode_one(&self, text: &str) -> Result<Vector, MnemosError> {
        let output = self
            .embed(EmbeddingInput::new(vec![text.to_string()]))
            .await?;
        output
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| MnemosError::encoding("backend returned no vector"))
    }

    /// Encodes many texts into one vector per text, in input order.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vector>, MnemosError> {
        Ok(self.embed(EmbeddingInput::new(texts.to_vec())).await?.embeddings)
    }

    /// Cheap round-trip encode. Never errors: any failure is reported as `false`.
    async fn probe(&self) -> bool {
        match self.encode_one(PROBE_TEXT).await {
            Ok(v) => !v.is_empty(),
            Err(e) => {
                debug!(adapter = self.name(), error = %e, "embedding probe failed");
                false
            }
        }
    }
}

/// Checks a backend's raw output against the request: one non-empty vector per text,
/// all of the same length. Returns that length.
pub fn validate_embeddings(expected: usize, embeddings: &[Vector]) -> Result<usize, MnemosError> {
    if embeddings.len() != expected {
        return Err(MnemosError::encoding(format!(
            "backend returned {} vectors for {expected} texts",
            embeddings.len()
        )));
    }
    let dim = embeddings.first().map(Vec::len).unwrap_or(0);
    if dim == 0 {
        return Err(MnemosError::encoding("backend returned an empty embedding"));
    }
    if let Some(bad) = embeddings.iter().find(|v| v.len() != dim) {
        return Err(MnemosError::encoding(format!(
            "backend returned vectors of mixed length ({dim} and {})",
            bad.len()
        )));
    }
    Ok(dim)
}
