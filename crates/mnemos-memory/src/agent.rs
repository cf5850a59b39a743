// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opens the three memory components of one character from configuration.

use std::sync::Arc;

use tracing::info;

use mnemos_config::MnemosConfig;
use mnemos_core::{EmbeddingAdapter, MnemosError, TimeExtractor};
use mnemos_vector::VectorIndexFactory;

use crate::episodic::EpisodicMemory;
use crate::identity::IdentityMemory;
use crate::lore_book::LoreBookIndex;
use crate::persona::Persona;

/// Table name prefixes, suffixed with the character name.
pub const LORE_BOOK_TABLE: &str = "lore_books";
pub const EPISODIC_TABLE: &str = "long_memory";
pub const IDENTITY_TABLE: &str = "core_memory";

/// Lore book, episodic, and identity memory sharing one embedder.
pub struct AgentMemory {
    pub lore_book: LoreBookIndex,
    pub episodic: EpisodicMemory,
    pub identity: IdentityMemory,
}

impl AgentMemory {
    /// Creates each component's vector index through [`VectorIndexFactory`] and
    /// loads the component from its files under [`MnemosConfig::agent_dir`].
    pub async fn open(
        config: &MnemosConfig,
        embedder: Arc<dyn EmbeddingAdapter>,
        extractor: Arc<dyn TimeExtractor>,
    ) -> Result<Self, MnemosError> {
        let persona = Persona::from_config(&config.agent);
        let store = &config.vector_store;

        let lore_index =
            VectorIndexFactory::create(store, &config.table_name(LORE_BOOK_TABLE)).await?;
        let lore_book = LoreBookIndex::open(
            config.lore_book_dir(),
            embedder.clone(),
            lore_index,
            &config.lore_book,
        )
        .await?;

        let episodic_index =
            VectorIndexFactory::create(store, &config.table_name(EPISODIC_TABLE)).await?;
        let episodic = EpisodicMemory::open(
            config.memories_dir(),
            embedder.clone(),
            episodic_index,
            extractor,
            persona.clone(),
            &config.episodic,
        )
        .await?;

        let identity_index =
            VectorIndexFactory::create(store, &config.table_name(IDENTITY_TABLE)).await?;
        let identity = IdentityMemory::open(
            config.core_memory_path(),
            embedder,
            identity_index,
            persona,
            &config.identity,
        )
        .await?;

        info!(
            agent = %config.agent.char_name,
            episodes = episodic.len(),
            facts = identity.len(),
            "agent memory ready"
        );
        Ok(Self {
            lore_book,
            episodic,
            identity,
        })
    }
}
