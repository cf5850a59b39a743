// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding backends for Mnemos.
//!
//! - [`OnnxEmbedder`]: in-process ONNX Runtime inference, model files managed by
//!   [`ModelManager`].
//! - [`RemoteEmbedder`]: OpenAI-compatible HTTP service with batching, bounded
//!   concurrency, retry, and an optional exact-text cache.
//!
//! [`EmbeddingFactory`] picks one from [`mnemos_config::model::EmbeddingConfig`].

pub mod factory;
pub mod model_manager;
pub mod onnx;
pub mod remote;

pub use factory::EmbeddingFactory;
pub use model_manager::ModelManager;
pub use onnx::OnnxEmbedder;
pub use remote::RemoteEmbedder;
