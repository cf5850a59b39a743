// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector index adapter trait: durable storage of (vector, text, metadata) records
//! with top-k cosine similarity search.

use async_trait::async_trait;

use crate::error::MnemosError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Metadata, Record, RecordId, SearchHit, Vector};

/// A persistent similarity index.
///
/// Record ids are assigned by the index and stay valid until the record is deleted,
/// regardless of updates or deletions of other records. Scores are cosine
/// similarities; results are ordered best first, ties broken by insertion order.
#[async_trait]
pub trait VectorIndexAdapter: PluginAdapter {
    /// Inserts records and returns their ids in input order.
    ///
    /// `metadatas`, when given, must have the same length as `vectors` and `texts`;
    /// when absent every record gets empty metadata. The first insert into an empty
    /// index fixes its dimension unless one was configured.
    async fn add(
        &self,
        vectors: Vec<Vector>,
        texts: Vec<String>,
        metadatas: Option<Vec<Metadata>>,
    ) -> Result<Vec<RecordId>, MnemosError>;

    /// Returns at most `top_k` records whose score is `>= threshold`, best first.
    /// An empty index yields an empty list.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>, MnemosError>;

    /// Replaces a record's vector and text. `metadata = None` keeps the existing
    /// metadata. Returns `false` when the id is unknown.
    async fn update(
        &self,
        id: &str,
        vector: Vector,
        text: String,
        metadata: Option<Metadata>,
    ) -> Result<bool, MnemosError>;

    /// Removes the given ids. Unknown ids are ignored.
    async fn delete_by_ids(&self, ids: &[RecordId]) -> Result<bool, MnemosError>;

    /// Looks up a single record.
    async fn get(&self, id: &str) -> Result<Option<Record>, MnemosError>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize, MnemosError>;

    /// Removes every record (and the persisted representation where applicable).
    async fn clear(&self) -> Result<bool, MnemosError>;

    /// Fixed vector dimension, or 0 while unset.
    async fn dimension(&self) -> usize;
}

/// Validates the parallel inputs of [`VectorIndexAdapter::add`] and returns the common
/// vector length (0 for an empty batch).
pub fn check_add_shape(
    vectors: &[Vector],
    texts: &[String],
    metadatas: Option<&[Metadata]>,
) -> Result<usize, MnemosError> {
    if texts.len() != vectors.len() {
        return Err(MnemosError::ShapeMismatch {
            what: "texts",
            expected: vectors.len(),
            actual: texts.len(),
        });
    }
    if let Some(m) = metadatas
        && m.len() != vectors.len()
    {
        return Err(MnemosError::ShapeMismatch {
            what: "metadatas",
            expected: vectors.len(),
            actual: m.len(),
        });
    }
    let dim = vectors.first().map(Vec::len).unwrap_or(0);
    if !vectors.is_empty() && dim == 0 {
        return Err(MnemosError::InvalidInput(
            "vectors must have at least one component".into(),
        ));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(MnemosError::DimensionMismatch {
            expected: dim,
            actual: bad.len(),
        });
    }
    Ok(dim)
}
