// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Day shards: `YYYY-MM-DD.yaml` holds the digests of one local calendar day,
//! `YYYY-MM-DD.vec` caches their tag embeddings.
//!
//! `.vec` layout (little-endian): magic `MNEV`, `u32` dimension, `u32` row count,
//! then per row an `i64` timestamp followed by `dimension` `f32`s.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use mnemos_core::vector::{blob_to_vec, vec_to_blob};
use mnemos_core::{MnemosError, Vector};
use mnemos_vector::local::persist::write_atomic;

const MAGIC: &[u8; 4] = b"MNEV";
const HEADER_LEN: usize = 12;
const SECONDS_PER_DAY: i64 = 86_400;

/// One digest as stored in a text shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardEntry {
    pub text_tag: String,
    pub msg: String,
}

/// Timestamp-keyed contents of one text shard.
pub type TextShard = BTreeMap<i64, ShardEntry>;

/// First and last second of the local day containing `ts`.
pub fn day_bounds(ts: i64, offset: FixedOffset) -> (i64, i64) {
    let local = ts + i64::from(offset.local_minus_utc());
    let start = ts - local.rem_euclid(SECONDS_PER_DAY);
    (start, start + SECONDS_PER_DAY - 1)
}

/// Local calendar day of `ts`.
pub fn day_of(ts: i64, offset: FixedOffset) -> Result<NaiveDate, MnemosError> {
    DateTime::from_timestamp(ts, 0)
        .map(|t| t.with_timezone(&offset).date_naive())
        .ok_or_else(|| MnemosError::InvalidInput(format!("timestamp {ts} is out of range")))
}

pub fn text_path(dir: &Path, day: NaiveDate) -> PathBuf {
    dir.join(format!("{}.yaml", day.format("%Y-%m-%d")))
}

pub fn vec_path(text_path: &Path) -> PathBuf {
    text_path.with_extension("vec")
}

pub async fn read_text(path: &Path) -> Result<TextShard, MnemosError> {
    let bytes = tokio::fs::read(path).await.map_err(MnemosError::storage)?;
    let shard: Option<TextShard> =
        serde_yaml_ng::from_slice(&bytes).map_err(|e| MnemosError::CorruptPersistedState {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok(shard.unwrap_or_default())
}

pub async fn write_text(path: &Path, shard: &TextShard) -> Result<(), MnemosError> {
    let yaml = serde_yaml_ng::to_string(shard).map_err(MnemosError::storage)?;
    write_atomic(path, yaml.as_bytes()).await
}

/// Reads a vector cache. A missing or undecodable file yields `None`.
pub async fn read_vectors(path: &Path) -> Option<Vec<(i64, Vector)>> {
    let bytes = tokio::fs::read(path).await.ok()?;
    decode_vectors(&bytes)
}

pub async fn write_vectors(path: &Path, rows: &[(i64, &[f32])]) -> Result<(), MnemosError> {
    let bytes = encode_vectors(rows)?;
    write_atomic(path, &bytes).await
}

pub fn encode_vectors(rows: &[(i64, &[f32])]) -> Result<Vec<u8>, MnemosError> {
    let dim = rows.first().map(|(_, v)| v.len()).unwrap_or(0);
    if let Some((ts, v)) = rows.iter().find(|(_, v)| v.len() != dim) {
        return Err(MnemosError::Internal(format!(
            "vector for {ts} has {} components, expected {dim}",
            v.len()
        )));
    }
    let dim32 = u32::try_from(dim).map_err(|_| MnemosError::Internal("dimension too large".into()))?;
    let count32 =
        u32::try_from(rows.len()).map_err(|_| MnemosError::Internal("too many rows".into()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + rows.len() * (8 + 4 * dim));
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&dim32.to_le_bytes());
    out.extend_from_slice(&count32.to_le_bytes());
    for (ts, v) in rows {
        out.extend_from_slice(&ts.to_le_bytes());
        out.extend_from_slice(&vec_to_blob(v));
    }
    Ok(out)
}

pub fn decode_vectors(bytes: &[u8]) -> Option<Vec<(i64, Vector)>> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return None;
    }
    let dim = usize::try_from(u32::from_le_bytes(bytes[4..8].try_into().ok()?)).ok()?;
    let count = usize::try_from(u32::from_le_bytes(bytes[8..12].try_into().ok()?)).ok()?;
    // Header values are untrusted; any overflow means the file is not ours.
    let row_len = dim.checked_mul(4)?.checked_add(8)?;
    let expected = count.checked_mul(row_len)?.checked_add(HEADER_LEN)?;
    if bytes.len() != expected {
        return None;
    }
    let rows = bytes[HEADER_LEN..]
        .chunks_exact(row_len)
        .map(|row| {
            let mut ts = [0u8; 8];
            ts.copy_from_slice(&row[..8]);
            (i64::from_le_bytes(ts), blob_to_vec(&row[8..]))
        })
        .collect();
    Some(rows)
}
