// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Mnemos.
//!
//! Deterministic stand-ins for the embedding model and the LLM summarizer, so
//! memory tests run without a model download, a network, or a database.
//!
//! # Components
//!
//! - [`MockEmbedder`] - fixed text-to-vector table with a hashed bag-of-words fallback
//! - [`MockSummarizer`] - queued topic tags
//! - [`clock`] - fixed timestamps in a chosen UTC offset

pub mod clock;
pub mod mock_embedder;
pub mod mock_summarizer;

pub use mock_embedder::MockEmbedder;
pub use mock_summarizer::MockSummarizer;
