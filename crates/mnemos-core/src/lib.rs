// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Mnemos memory subsystem.
//!
//! Defines the two backend contracts (embedding and vector index), the error type
//! shared by every crate in the workspace, and the vector helpers the backends and
//! memory components have in common.

pub mod error;
pub mod traits;
pub mod types;
pub mod vector;

pub use error::MnemosError;
pub use types::{
    AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus, Metadata, Record, RecordId,
    SearchHit, Vector, metadata_from_pairs,
};

pub use traits::{
    EmbeddingAdapter, PluginAdapter, SMALL_TALK_TAG, TimeExtractor, TimeRange, TurnSummarizer,
    VectorIndexAdapter,
};
