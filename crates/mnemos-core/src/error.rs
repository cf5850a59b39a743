// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Mnemos memory subsystem.

use std::path::PathBuf;

use thiserror::Error;

/// The primary error type used across all Mnemos adapter traits and memory components.
#[derive(Debug, Error)]
pub enum MnemosError {
    /// Configuration errors (invalid values, unsupported backend mode).
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem or serialization failures while persisting state.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A vector's length differs from the dimension the index or model is fixed to.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Parallel inputs (vectors, texts, metadata) have different lengths.
    #[error("shape mismatch: {what} has {actual} entries, expected {expected}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Embedding failed after retries, or the backend returned a malformed response.
    #[error("encoding error: {message}")]
    Encoding {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A remote backend (HTTP embedding service, PostgreSQL) could not be reached or
    /// rejected the request.
    #[error("backend unavailable: {message}")]
    BackendUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A persisted file exists but cannot be decoded or is internally inconsistent.
    #[error("corrupt persisted state at {}: {message}", path.display())]
    CorruptPersistedState { path: PathBuf, message: String },

    /// Caller-supplied input violates a component invariant.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MnemosError {
    /// Wraps any error as a [`MnemosError::Storage`].
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        MnemosError::Storage {
            source: Box::new(err),
        }
    }

    /// Builds an [`MnemosError::Encoding`] without an underlying source.
    pub fn encoding(message: impl Into<String>) -> Self {
        MnemosError::Encoding {
            message: message.into(),
            source: None,
        }
    }

    /// Builds an [`MnemosError::BackendUnavailable`] with an underlying source.
    pub fn backend<E>(message: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        MnemosError::BackendUnavailable {
            message: message.into(),
            source: Some(Box::new(err)),
        }
    }
}
