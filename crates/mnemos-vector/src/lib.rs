// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector index backends for Mnemos.
//!
//! - [`LocalVectorStore`]: in-process flat or IVF index mirrored to a
//!   `{table}.index` / `{table}.data` file pair.
//! - [`PgVectorStore`]: PostgreSQL table with a pgvector column and an
//!   IVFFlat or HNSW similarity index.
//!
//! [`VectorIndexFactory`] picks one from [`mnemos_config::model::VectorStoreConfig`].

pub mod factory;
pub mod local;
pub mod postgres;

pub use factory::VectorIndexFactory;
pub use local::{LocalStoreStats, LocalVectorStore};
pub use postgres::{PgStoreStats, PgVectorStore};
