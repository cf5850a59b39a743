// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File-backed vector index.
//!
//! Records live in memory in insertion order and are mirrored to
//! `{save_path}/{table}.data`; the similarity structure is mirrored to
//! `{save_path}/{table}.index`. Every mutation rewrites both files.
//!
//! Ids are UUIDs and never change. Delete and update rebuild the similarity
//! structure from the remaining records, which costs O(n) per call.

pub mod ann;
pub mod persist;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use mnemos_config::model::{LocalIndexType, LocalVectorStoreConfig};
use mnemos_core::traits::index::check_add_shape;
use mnemos_core::{
    AdapterType, HealthStatus, Metadata, MnemosError, PluginAdapter, Record, RecordId, SearchHit,
    Vector, VectorIndexAdapter,
};

use ann::{AnnIndex, IvfParams};
use persist::{FilePair, Loaded};

/// Point-in-time description of a local store.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalStoreStats {
    pub table: String,
    pub records: usize,
    pub dimension: usize,
    pub index_type: LocalIndexType,
    pub trained: bool,
}

struct State {
    /// 0 while unset.
    dimension: usize,
    records: Vec<Record>,
    positions: HashMap<RecordId, usize>,
    ann: AnnIndex,
}

impl State {
    fn empty(kind: LocalIndexType, dimension: usize, params: IvfParams) -> Self {
        Self {
            dimension,
            records: Vec::new(),
            positions: HashMap::new(),
            ann: AnnIndex::new(kind, dimension, params),
        }
    }

    /// Fresh state over `records`, with the similarity structure rebuilt.
    fn rebuilt(
        kind: LocalIndexType,
        dimension: usize,
        params: IvfParams,
        records: Vec<Record>,
        reason: &'static str,
    ) -> Self {
        let positions = positions_of(&records);
        let ann = AnnIndex::build(
            kind,
            dimension,
            params,
            records.iter().map(|r| r.vector.as_slice()),
        );
        metrics::counter!("mnemos_index_rebuilds_total", "reason" => reason).increment(1);
        Self {
            dimension,
            records,
            positions,
            ann,
        }
    }

    /// Drops every record at or after `len`, undoing an append that never reached disk.
    fn truncate(&mut self, len: usize, ann: AnnIndex, dimension: usize) {
        for record in self.records.drain(len..) {
            self.positions.remove(&record.id);
        }
        self.ann = ann;
        self.dimension = dimension;
    }
}

fn positions_of(records: &[Record]) -> HashMap<RecordId, usize> {
    records
        .iter()
        .enumerate()
        .map(|(pos, r)| (r.id.clone(), pos))
        .collect()
}

/// [`VectorIndexAdapter`] persisted as a file pair.
pub struct LocalVectorStore {
    table: String,
    kind: LocalIndexType,
    configured_dimension: Option<usize>,
    params: IvfParams,
    files: FilePair,
    state: RwLock<State>,
}

impl LocalVectorStore {
    /// Opens (or creates) the store for `table`.
    ///
    /// Missing files yield an empty store. An index file that no longer matches the
    /// data file is rebuilt from it. Otherwise unreadable or inconsistent files are
    /// logged and yield an empty store; they are overwritten by the next write.
    pub async fn open(config: &LocalVectorStoreConfig, table: &str) -> Result<Self, MnemosError> {
        let dir = PathBuf::from(&config.save_path);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(MnemosError::storage)?;

        let params = IvfParams {
            nlist: config.nlist,
            nprobe: config.nprobe,
        };
        let files = FilePair::new(&dir, table);
        let fresh = || State::empty(config.index_type, config.dimension.unwrap_or(0), params);

        let state = match files.load().await {
            Ok(Loaded::Missing) => fresh(),
            Ok(Loaded::Found { data, index }) => {
                match restore(config, table, params, data.dimension, data.records, index.index) {
                    Ok(state) => state,
                    Err(message) => {
                        warn!(table, path = %files.data.display(), %message, "discarding inconsistent vector store");
                        fresh()
                    }
                }
            }
            Err(e) => {
                warn!(table, error = %e, "vector store files unreadable, starting empty");
                fresh()
            }
        };

        info!(
            table,
            records = state.records.len(),
            dimension = state.dimension,
            index_type = ?config.index_type,
            "local vector store opened"
        );

        Ok(Self {
            table: table.to_string(),
            kind: config.index_type,
            configured_dimension: config.dimension,
            params,
            files,
            state: RwLock::new(state),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn stats(&self) -> LocalStoreStats {
        let state = self.state.read().await;
        LocalStoreStats {
            table: self.table.clone(),
            records: state.records.len(),
            dimension: state.dimension,
            index_type: self.kind,
            trained: state.ann.is_trained(),
        }
    }

    async fn persist(&self, state: &State) -> Result<(), MnemosError> {
        self.files
            .save(state.dimension, &state.records, state.ann.snapshot())
            .await
    }
}

/// Rebuilds in-memory state from the loaded pair, or explains why it cannot.
fn restore(
    config: &LocalVectorStoreConfig,
    table: &str,
    params: IvfParams,
    dimension: usize,
    records: Vec<Record>,
    snapshot: ann::IndexSnapshot,
) -> Result<State, String> {
    if records.is_empty() {
        let dimension = config.dimension.unwrap_or(dimension);
        return Ok(State::empty(config.index_type, dimension, params));
    }
    if let Some(expected) = config.dimension
        && expected != dimension
    {
        return Err(format!(
            "stored dimension {dimension} differs from configured {expected}"
        ));
    }
    if let Some(bad) = records.iter().find(|r| r.vector.len() != dimension) {
        return Err(format!(
            "record {} has {} values, expected {dimension}",
            bad.id,
            bad.vector.len()
        ));
    }

    let positions = positions_of(&records);
    if positions.len() != records.len() {
        return Err("duplicate record ids".to_string());
    }

    // The index file is derived from the data file, which is written first.
    if snapshot.kind != config.index_type {
        debug!(from = ?snapshot.kind, to = ?config.index_type, "index type changed, rebuilding");
        return Ok(State::rebuilt(config.index_type, dimension, params, records, "index_type"));
    }
    let restored = AnnIndex::restore(snapshot, params, records.iter().map(|r| r.vector.as_slice()));
    match restored {
        Some(ann) => Ok(State {
            dimension,
            records,
            positions,
            ann,
        }),
        None => {
            warn!(table, records = records.len(), "vector index file does not match data file, rebuilding");
            Ok(State::rebuilt(config.index_type, dimension, params, records, "recovery"))
        }
    }
}

#[async_trait]
impl PluginAdapter for LocalVectorStore {
    fn name(&self) -> &str {
        &self.table
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::VectorIndex
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemosError> {
        let state = self.state.read().await;
        let n = state.records.len();
        if state.positions.len() != n || state.ann.len() != n {
            return Ok(HealthStatus::Degraded(format!(
                "{} records, {} ids, {} indexed rows",
                n,
                state.positions.len(),
                state.ann.len()
            )));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MnemosError> {
        Ok(())
    }
}

#[async_trait]
impl VectorIndexAdapter for LocalVectorStore {
    async fn add(
        &self,
        vectors: Vec<Vector>,
        texts: Vec<String>,
        metadatas: Option<Vec<Metadata>>,
    ) -> Result<Vec<RecordId>, MnemosError> {
        let dim = check_add_shape(&vectors, &texts, metadatas.as_deref())?;
        if vectors.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.state.write().await;
        if state.dimension != 0 && state.dimension != dim {
            return Err(MnemosError::DimensionMismatch {
                expected: state.dimension,
                actual: dim,
            });
        }
        let previous_ann = state.ann.clone();
        let previous_dimension = state.dimension;
        if state.dimension == 0 {
            state.dimension = dim;
            state.ann = AnnIndex::new(self.kind, dim, self.params);
        }

        let now = Utc::now();
        let metadatas = metadatas.unwrap_or_else(|| vec![Metadata::new(); vectors.len()]);
        let start = state.records.len();
        let mut ids = Vec::with_capacity(vectors.len());

        state.ann.add(&vectors);
        for (offset, ((vector, text), metadata)) in
            vectors.into_iter().zip(texts).zip(metadatas).enumerate()
        {
            let id = uuid::Uuid::new_v4().to_string();
            state.positions.insert(id.clone(), start + offset);
            state.records.push(Record {
                id: id.clone(),
                vector,
                text,
                metadata,
                created_at: now,
            });
            ids.push(id);
        }

        if let Err(e) = self.persist(&state).await {
            state.truncate(start, previous_ann, previous_dimension);
            warn!(table = %self.table, error = %e, "add not persisted, rolled back");
            return Err(e);
        }
        metrics::counter!("mnemos_vector_adds_total", "backend" => "local").increment(ids.len() as u64);
        debug!(table = %self.table, added = ids.len(), total = state.records.len(), "records added");
        Ok(ids)
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>, MnemosError> {
        let state = self.state.read().await;
        if state.records.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != state.dimension {
            return Err(MnemosError::DimensionMismatch {
                expected: state.dimension,
                actual: query.len(),
            });
        }
        metrics::counter!("mnemos_vector_searches_total", "backend" => "local").increment(1);

        // Candidates arrive in position order; the stable sort keeps earlier
        // insertions first among equal scores.
        let mut scored: Vec<(usize, f32)> = state
            .ann
            .candidates(query)
            .into_iter()
            .filter(|(_, score)| *score >= threshold)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(pos, score)| {
                let r = &state.records[pos];
                SearchHit {
                    id: r.id.clone(),
                    text: r.text.clone(),
                    score,
                    metadata: r.metadata.clone(),
                }
            })
            .collect())
    }

    async fn update(
        &self,
        id: &str,
        vector: Vector,
        text: String,
        metadata: Option<Metadata>,
    ) -> Result<bool, MnemosError> {
        let mut state = self.state.write().await;
        let Some(&pos) = state.positions.get(id) else {
            return Ok(false);
        };
        if vector.len() != state.dimension {
            return Err(MnemosError::DimensionMismatch {
                expected: state.dimension,
                actual: vector.len(),
            });
        }

        let mut records = state.records.clone();
        let record = &mut records[pos];
        record.vector = vector;
        record.text = text;
        if let Some(metadata) = metadata {
            record.metadata = metadata;
        }
        let next = State::rebuilt(self.kind, state.dimension, self.params, records, "mutation");

        self.persist(&next).await?;
        *state = next;
        Ok(true)
    }

    async fn delete_by_ids(&self, ids: &[RecordId]) -> Result<bool, MnemosError> {
        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut state = self.state.write().await;

        let kept: Vec<Record> = state
            .records
            .iter()
            .filter(|r| !doomed.contains(r.id.as_str()))
            .cloned()
            .collect();
        let removed = state.records.len() - kept.len();
        if removed == 0 {
            return Ok(true);
        }

        let next = State::rebuilt(self.kind, state.dimension, self.params, kept, "mutation");
        self.persist(&next).await?;
        *state = next;
        debug!(table = %self.table, removed, "records deleted");
        Ok(true)
    }

    async fn get(&self, id: &str) -> Result<Option<Record>, MnemosError> {
        let state = self.state.read().await;
        Ok(state
            .positions
            .get(id)
            .map(|&pos| state.records[pos].clone()))
    }

    async fn count(&self) -> Result<usize, MnemosError> {
        Ok(self.state.read().await.records.len())
    }

    async fn clear(&self) -> Result<bool, MnemosError> {
        let mut state = self.state.write().await;
        *state = State::empty(self.kind, self.configured_dimension.unwrap_or(0), self.params);
        self.files.remove().await?;
        info!(table = %self.table, "local vector store cleared");
        Ok(true)
    }

    async fn dimension(&self) -> usize {
        self.state.read().await.dimension
    }
}
