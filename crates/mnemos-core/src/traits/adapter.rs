// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait shared by embedding backends and vector indexes.

use async_trait::async_trait;

use crate::error::MnemosError;
use crate::types::{AdapterType, HealthStatus};

/// Identity and lifecycle shared by every backend.
///
/// Callers holding a trait object use it to report which backend serves them.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Instance name: the model for embedders, the table for indexes.
    fn name(&self) -> &str;

    fn version(&self) -> semver::Version;

    fn adapter_type(&self) -> AdapterType;

    /// Probes the backend without mutating it.
    async fn health_check(&self) -> Result<HealthStatus, MnemosError>;

    /// Releases connections, sessions and file handles.
    async fn shutdown(&self) -> Result<(), MnemosError>;
}
