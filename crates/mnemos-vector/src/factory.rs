// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builds the configured vector index backend.

use std::sync::Arc;

use mnemos_config::model::{BackendMode, VectorStoreConfig};
use mnemos_core::{MnemosError, VectorIndexAdapter};
use tracing::info;

use crate::local::LocalVectorStore;
use crate::postgres::PgVectorStore;

/// Selects and constructs a [`VectorIndexAdapter`] from configuration.
pub struct VectorIndexFactory;

impl VectorIndexFactory {
    /// Opens the collection named `table`: a file pair under `local.save_path`, or a
    /// pgvector table of that name.
    pub async fn create(
        config: &VectorStoreConfig,
        table: &str,
    ) -> Result<Arc<dyn VectorIndexAdapter>, MnemosError> {
        info!(mode = ?config.mode, table, "creating vector index");
        match config.mode {
            BackendMode::Local => Ok(Arc::new(LocalVectorStore::open(&config.local, table).await?)),
            BackendMode::Remote => Ok(Arc::new(PgVectorStore::connect(&config.remote, table).await?)),
        }
    }
}
