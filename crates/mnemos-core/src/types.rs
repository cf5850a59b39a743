// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by embedding backends, vector indexes, and memory components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A fixed-length embedding.
pub type Vector = Vec<f32>;

/// Arbitrary string-keyed metadata attached to an indexed record.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Opaque record identifier assigned by a vector index.
pub type RecordId = String;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Embedding,
    VectorIndex,
}

/// Input for an embedding adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingInput {
    /// Texts to encode, in order.
    pub texts: Vec<String>,
}

impl EmbeddingInput {
    pub fn new(texts: Vec<String>) -> Self {
        Self { texts }
    }
}

/// Output from an embedding adapter: one vector per input text, same order.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingOutput {
    pub embeddings: Vec<Vector>,
    /// Length of every vector in `embeddings`.
    pub dimensions: usize,
}

/// A stored entry in a vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub vector: Vector,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// One result of a similarity search, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: RecordId,
    pub text: String,
    /// Cosine similarity in `[-1, 1]`; higher is more similar.
    pub score: f32,
    pub metadata: Metadata,
}

/// Builds a metadata map from string pairs.
pub fn metadata_from_pairs<'a, I>(pairs: I) -> Metadata
where
    I: IntoIterator<Item = (&'a str, serde_json::Value)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
