// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde attributes cannot express: similarity
//! thresholds within the cosine range, positive batch and worker counts, and
//! required endpoints for remote backends.

use crate::diagnostic::ConfigError;
use crate::model::{BackendMode, MnemosConfig};

/// Largest real-world UTC offset (+14:00).
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &MnemosConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.agent.char_name.trim().is_empty() {
        errors.push(validation("agent.char_name must not be empty"));
    }
    if config.agent.data_dir.trim().is_empty() {
        errors.push(validation("agent.data_dir must not be empty"));
    }

    let remote = &config.embedding.remote;
    if config.embedding.mode == BackendMode::Remote && remote.base_url.trim().is_empty() {
        errors.push(validation(
            "embedding.remote.base_url must be set when embedding.mode = \"remote\"",
        ));
    }
    if remote.batch_size == 0 {
        errors.push(validation("embedding.remote.batch_size must be at least 1"));
    }
    if remote.max_workers == 0 {
        errors.push(validation("embedding.remote.max_workers must be at least 1"));
    }
    if remote.timeout_secs == 0 {
        errors.push(validation("embedding.remote.timeout_secs must be at least 1"));
    }
    if remote.dimension == Some(0) {
        errors.push(validation("embedding.remote.dimension must be at least 1"));
    }

    let local = &config.vector_store.local;
    if local.save_path.trim().is_empty() {
        errors.push(validation("vector_store.local.save_path must not be empty"));
    }
    if local.dimension == Some(0) {
        errors.push(validation("vector_store.local.dimension must be at least 1"));
    }
    if local.nlist == 0 {
        errors.push(validation("vector_store.local.nlist must be at least 1"));
    }
    if local.nprobe == 0 {
        errors.push(validation("vector_store.local.nprobe must be at least 1"));
    }

    let pg = &config.vector_store.remote.vector_config;
    if pg.dimension == 0 {
        errors.push(validation(
            "vector_store.remote.vector_config.dimension must be at least 1",
        ));
    }
    if pg.lists == 0 || pg.probes == 0 || pg.m == 0 || pg.ef_construction == 0 || pg.ef_search == 0
    {
        errors.push(validation(
            "vector_store.remote.vector_config index parameters must all be at least 1",
        ));
    }
    if config.vector_store.mode == BackendMode::Remote
        && config.vector_store.remote.db_config.host.trim().is_empty()
    {
        errors.push(validation(
            "vector_store.remote.db_config.host must be set when vector_store.mode = \"remote\"",
        ));
    }

    check_threshold(&mut errors, "lore_book.threshold", config.lore_book.threshold);
    check_threshold(&mut errors, "episodic.threshold", config.episodic.threshold);
    check_threshold(&mut errors, "identity.threshold", config.identity.threshold);
    check_top_k(&mut errors, "lore_book.top_k", config.lore_book.top_k);
    check_top_k(&mut errors, "identity.top_k", config.identity.top_k);

    if config.episodic.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        errors.push(ConfigError::Validation {
            message: format!(
                "episodic.utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}, got {}",
                config.episodic.utc_offset_minutes
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validation(message: &str) -> ConfigError {
    ConfigError::Validation {
        message: message.to_string(),
    }
}

fn check_threshold(errors: &mut Vec<ConfigError>, key: &str, value: f32) {
    if !(-1.0..=1.0).contains(&value) {
        errors.push(ConfigError::Validation {
            message: format!("{key} must be within [-1, 1], got {value}"),
        });
    }
}

fn check_top_k(errors: &mut Vec<ConfigError>, key: &str, value: usize) {
    if value == 0 {
        errors.push(ConfigError::Validation {
            message: format!("{key} must be at least 1"),
        });
    }
}
