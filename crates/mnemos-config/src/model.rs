// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Mnemos memory subsystem.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level Mnemos configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MnemosConfig {
    /// Persona names and on-disk layout.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Embedding backend selection and settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector index backend selection and settings.
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Lore book retrieval settings.
    #[serde(default)]
    pub lore_book: LoreBookConfig,

    /// Episodic (timestamped conversation) memory settings.
    #[serde(default)]
    pub episodic: EpisodicConfig,

    /// Identity (core fact) memory settings.
    #[serde(default)]
    pub identity: IdentityConfig,
}

impl MnemosConfig {
    /// Per-character data directory: `{data_dir}/agents/{char_name}`.
    pub fn agent_dir(&self) -> PathBuf {
        PathBuf::from(&self.agent.data_dir)
            .join("agents")
            .join(&self.agent.char_name)
    }

    /// Directory scanned for lore book documents.
    pub fn lore_book_dir(&self) -> PathBuf {
        self.agent_dir().join("lore_book")
    }

    /// Directory holding episodic day shards.
    pub fn memories_dir(&self) -> PathBuf {
        self.agent_dir().join("memories")
    }

    /// The identity memory document.
    pub fn core_memory_path(&self) -> PathBuf {
        self.agent_dir().join("core_memory.yaml")
    }

    /// Vector table name for a component, scoped to the current character.
    pub fn table_name(&self, component: &str) -> String {
        let raw = format!("{component}_{}", self.agent.char_name);
        sanitize_table_name(&raw)
    }
}

/// Lowercases and replaces every character outside `[a-z0-9_]` with `_`.
pub fn sanitize_table_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }
        })
        .collect();
    if name.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        name.insert(0, 't');
    }
    name
}

/// Persona and storage layout settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Name of the character the agent plays; substituted for `{{char}}`.
    #[serde(default = "default_char_name")]
    pub char_name: String,

    /// Name used for the human; substituted for `{{user}}`.
    #[serde(default = "default_user_name")]
    pub user_name: String,

    /// Root directory for all per-character data.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            char_name: default_char_name(),
            user_name: default_user_name(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_char_name() -> String {
    "assistant".to_string()
}

fn default_user_name() -> String {
    "user".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

/// Where a backend runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// In-process.
    #[default]
    Local,
    /// Network service.
    Remote,
}

/// Embedding backend configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub mode: BackendMode,

    #[serde(default)]
    pub local: LocalEmbeddingConfig,

    #[serde(default)]
    pub remote: RemoteEmbeddingConfig,
}

/// In-process ONNX embedding model settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LocalEmbeddingConfig {
    /// Model identifier; also the name of its directory under `cache_folder`.
    #[serde(default = "default_local_model_name")]
    pub model_name: String,

    /// Directory where model files are cached.
    #[serde(default = "default_cache_folder")]
    pub cache_folder: String,

    /// Download URL for the ONNX graph. Defaults to the MiniLM export on HuggingFace.
    #[serde(default)]
    pub model_url: Option<String>,

    /// Download URL for `tokenizer.json`.
    #[serde(default)]
    pub tokenizer_url: Option<String>,

    /// ONNX Runtime intra-op threads.
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

impl Default for LocalEmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: default_local_model_name(),
            cache_folder: default_cache_folder(),
            model_url: None,
            tokenizer_url: None,
            intra_threads: default_intra_threads(),
        }
    }
}

fn default_local_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_cache_folder() -> String {
    "./models".to_string()
}

fn default_intra_threads() -> usize {
    1
}

/// OpenAI-compatible HTTP embedding service settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteEmbeddingConfig {
    /// Service root; requests go to `{base_url}/v1/embeddings`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token. Omitted from requests when unset.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_remote_model_name")]
    pub model_name: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt of each batch.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry delay; attempt `n` waits `retry_delay_ms * n`.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Texts per request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent in-flight batches.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Cache vectors by exact input text.
    #[serde(default)]
    pub enable_cache: bool,

    /// Expected vector length. When unset it is learned from the first response.
    #[serde(default)]
    pub dimension: Option<usize>,
}

impl Default for RemoteEmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model_name: default_remote_model_name(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            batch_size: default_batch_size(),
            max_workers: default_max_workers(),
            enable_cache: false,
            dimension: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_remote_model_name() -> String {
    "Qwen3-Embedding-0.6B".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    32
}

fn default_max_workers() -> usize {
    4
}

/// Vector index backend configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub mode: BackendMode,

    #[serde(default)]
    pub local: LocalVectorStoreConfig,

    #[serde(default)]
    pub remote: RemoteVectorStoreConfig,
}

/// In-process index structure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalIndexType {
    /// Exhaustive scan.
    #[default]
    Flat,
    /// Inverted file lists over k-means centroids.
    Ivf,
}

/// File-pair backed index settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LocalVectorStoreConfig {
    #[serde(default)]
    pub index_type: LocalIndexType,

    /// Directory holding `{table}.index` and `{table}.data`.
    #[serde(default = "default_save_path")]
    pub save_path: String,

    /// Expected dimension. When unset the first insert fixes it.
    #[serde(default)]
    pub dimension: Option<usize>,

    /// Maximum number of IVF lists.
    #[serde(default = "default_nlist")]
    pub nlist: usize,

    /// IVF lists probed per query once trained.
    #[serde(default = "default_nprobe")]
    pub nprobe: usize,
}

impl Default for LocalVectorStoreConfig {
    fn default() -> Self {
        Self {
            index_type: LocalIndexType::Flat,
            save_path: default_save_path(),
            dimension: None,
            nlist: default_nlist(),
            nprobe: default_nprobe(),
        }
    }
}

fn default_save_path() -> String {
    "./vector_indexes".to_string()
}

fn default_nlist() -> usize {
    100
}

fn default_nprobe() -> usize {
    8
}

/// PostgreSQL + pgvector settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteVectorStoreConfig {
    #[serde(default)]
    pub db_config: DbConfig,

    #[serde(default)]
    pub vector_config: PgVectorConfig,
}

/// Database connection parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DbConfig {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_name")]
    pub database: String,

    #[serde(default = "default_db_user")]
    pub user: String,

    #[serde(default)]
    pub password: Option<String>,

    /// Bound on establishing a connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Bound on each statement round-trip.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            database: default_db_name(),
            user: default_db_user(),
            password: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "mnemos".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_query_timeout_secs() -> u64 {
    30
}

/// pgvector index access method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PgIndexType {
    #[default]
    Ivfflat,
    Hnsw,
}

/// Column and index settings for the pgvector table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PgVectorConfig {
    #[serde(default = "default_pg_dimension")]
    pub dimension: usize,

    #[serde(default)]
    pub index_type: PgIndexType,

    /// IVFFlat list count.
    #[serde(default = "default_lists")]
    pub lists: usize,

    /// IVFFlat lists probed per query.
    #[serde(default = "default_probes")]
    pub probes: usize,

    /// HNSW max connections per layer.
    #[serde(default = "default_hnsw_m")]
    pub m: usize,

    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,

    #[serde(default = "default_ef_search")]
    pub ef_search: usize,
}

impl Default for PgVectorConfig {
    fn default() -> Self {
        Self {
            dimension: default_pg_dimension(),
            index_type: PgIndexType::Ivfflat,
            lists: default_lists(),
            probes: default_probes(),
            m: default_hnsw_m(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
        }
    }
}

fn default_pg_dimension() -> usize {
    1024
}

fn default_lists() -> usize {
    100
}

fn default_probes() -> usize {
    1
}

fn default_hnsw_m() -> usize {
    16
}

fn default_ef_construction() -> usize {
    64
}

fn default_ef_search() -> usize {
    40
}

/// Lore book retrieval settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoreBookConfig {
    #[serde(default = "default_lore_top_k")]
    pub top_k: usize,

    #[serde(default = "default_lore_threshold")]
    pub threshold: f32,
}

impl Default for LoreBookConfig {
    fn default() -> Self {
        Self {
            top_k: default_lore_top_k(),
            threshold: default_lore_threshold(),
        }
    }
}

fn default_lore_top_k() -> usize {
    5
}

fn default_lore_threshold() -> f32 {
    0.3
}

/// Episodic memory settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EpisodicConfig {
    /// Filter the time range by semantic similarity instead of returning all of it.
    #[serde(default)]
    pub deep_retrieval: bool,

    /// Minimum similarity in deep mode.
    #[serde(default = "default_episodic_threshold")]
    pub threshold: f32,

    /// Offset applied when grouping timestamps into calendar days.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for EpisodicConfig {
    fn default() -> Self {
        Self {
            deep_retrieval: false,
            threshold: default_episodic_threshold(),
            utc_offset_minutes: 0,
        }
    }
}

fn default_episodic_threshold() -> f32 {
    0.5
}

/// Identity memory settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_threshold")]
    pub threshold: f32,

    #[serde(default = "default_identity_top_k")]
    pub top_k: usize,

    /// Fact seeded into an empty identity memory.
    #[serde(default = "default_bootstrap_fact")]
    pub bootstrap_fact: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            threshold: default_identity_threshold(),
            top_k: default_identity_top_k(),
            bootstrap_fact: default_bootstrap_fact(),
        }
    }
}

fn default_identity_threshold() -> f32 {
    0.5
}

fn default_identity_top_k() -> usize {
    5
}

fn default_bootstrap_fact() -> String {
    "This is the first time {{char}} and {{user}} have met.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_are_scoped_by_character() {
        let mut config = MnemosConfig::default();
        config.agent.data_dir = "/srv/mnemos".into();
        config.agent.char_name = "aria".into();
        assert_eq!(config.agent_dir(), PathBuf::from("/srv/mnemos/agents/aria"));
        assert_eq!(
            config.core_memory_path(),
            PathBuf::from("/srv/mnemos/agents/aria/core_memory.yaml")
        );
        assert_eq!(config.table_name("long_memory"), "long_memory_aria");
    }

    #[test]
    fn table_names_are_sanitized() {
        assert_eq!(sanitize_table_name("Lore Books-Élan"), "lore_books__lan");
        assert_eq!(sanitize_table_name("9lives"), "t9lives");
        assert_eq!(sanitize_table_name(""), "t");
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = MnemosConfig::default();
        assert_eq!(config.embedding.mode, BackendMode::Local);
        assert_eq!(config.embedding.remote.batch_size, 32);
        assert_eq!(config.embedding.remote.max_workers, 4);
        assert_eq!(config.vector_store.remote.vector_config.dimension, 1024);
        assert_eq!(config.lore_book.top_k, 5);
        assert!((config.lore_book.threshold - 0.3).abs() < f32::EPSILON);
        assert!((config.identity.threshold - 0.5).abs() < f32::EPSILON);
    }
}
