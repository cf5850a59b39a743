// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builds the configured embedding backend.

use std::sync::Arc;

use mnemos_config::model::{BackendMode, EmbeddingConfig};
use mnemos_core::{EmbeddingAdapter, MnemosError};
use tracing::info;

use crate::model_manager::ModelManager;
use crate::onnx::OnnxEmbedder;
use crate::remote::RemoteEmbedder;

/// Selects and constructs an [`EmbeddingAdapter`] from configuration.
pub struct EmbeddingFactory;

impl EmbeddingFactory {
    /// `local` loads (and on first use downloads) an ONNX model; `remote` connects
    /// to an OpenAI-compatible service.
    pub async fn create(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingAdapter>, MnemosError> {
        info!(mode = ?config.mode, "creating embedding backend");
        match config.mode {
            BackendMode::Local => {
                let manager = ModelManager::new(&config.local);
                let embedder = OnnxEmbedder::load(&manager, config.local.intra_threads).await?;
                Ok(Arc::new(embedder))
            }
            BackendMode::Remote => Ok(Arc::new(RemoteEmbedder::connect(&config.remote).await?)),
        }
    }
}
