// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod embedding;
pub mod index;
pub mod memory;

pub use adapter::PluginAdapter;
pub use embedding::EmbeddingAdapter;
pub use index::VectorIndexAdapter;
pub use memory::{SMALL_TALK_TAG, TimeExtractor, TimeRange, TurnSummarizer};
