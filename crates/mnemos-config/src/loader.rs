// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./mnemos.toml` > `~/.config/mnemos/mnemos.toml` > `/etc/mnemos/mnemos.toml`
//! with environment variable overrides via `MNEMOS_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::MnemosConfig;

/// Env var section prefixes and the dotted config path each maps to.
///
/// Ordered longest first so `embedding_remote_` wins over `embedding_`.
const ENV_SECTIONS: &[(&str, &str)] = &[
    ("vector_store_remote_db_config_", "vector_store.remote.db_config."),
    ("vector_store_remote_vector_config_", "vector_store.remote.vector_config."),
    ("vector_store_local_", "vector_store.local."),
    ("vector_store_", "vector_store."),
    ("embedding_remote_", "embedding.remote."),
    ("embedding_local_", "embedding.local."),
    ("embedding_", "embedding."),
    ("lore_book_", "lore_book."),
    ("episodic_", "episodic."),
    ("identity_", "identity."),
    ("agent_", "agent."),
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/mnemos/mnemos.toml` (system-wide)
/// 3. `~/.config/mnemos/mnemos.toml` (user XDG config)
/// 4. `./mnemos.toml` (local directory)
/// 5. `MNEMOS_*` environment variables
pub fn load_config() -> Result<MnemosConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<MnemosConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MnemosConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MnemosConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MnemosConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(MnemosConfig::default()))
        .merge(Toml::file("/etc/mnemos/mnemos.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("mnemos/mnemos.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("mnemos.toml"))
        .merge(env_provider())
}

/// Maps `MNEMOS_*` variables onto dotted keys using the explicit section table.
///
/// `Env::split("_")` cannot be used because both section and field names contain
/// underscores: `MNEMOS_EMBEDDING_REMOTE_BATCH_SIZE` must become
/// `embedding.remote.batch_size`.
fn env_provider() -> Env {
    Env::prefixed("MNEMOS_").map(|key| map_env_key(key.as_str()).into())
}

/// Rewrites a lowercased, prefix-stripped env key into a dotted config path.
pub fn map_env_key(key: &str) -> String {
    for (prefix, dotted) in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(prefix) {
            return format!("{dotted}{rest}");
        }
    }
    key.to_string()
}
