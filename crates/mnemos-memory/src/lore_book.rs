// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lore book index: a directory of `title: body` YAML documents kept in sync with
//! a vector index.
//!
//! Each scan hashes every document and re-embeds only files whose SHA-256 changed.
//! The hashes, together with the record ids each file produced, live in
//! `{dir}/.index/fingerprints.yaml`, which lets a changed or removed file have its
//! old records deleted. Titles are embedded; bodies are what searches return.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use mnemos_config::model::LoreBookConfig;
use mnemos_core::{
    EmbeddingAdapter, Metadata, MnemosError, RecordId, VectorIndexAdapter, metadata_from_pairs,
};
use mnemos_vector::local::persist::write_atomic;

const FINGERPRINT_DIR: &str = ".index";
const FINGERPRINT_FILE: &str = "fingerprints.yaml";

/// Text of the record that keeps an otherwise empty index well-defined.
pub const PLACEHOLDER_TEXT: &str = "lore book placeholder";

const ENTRY_TYPE: &str = "lore_book";
const PLACEHOLDER_TYPE: &str = "placeholder";

/// Scan lifecycle of one source directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Unscanned,
    Scanning,
    Ready,
}

/// What one scan did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Files (re)embedded because they were new or changed.
    pub embedded_files: usize,
    pub embedded_entries: usize,
    /// Files whose fingerprint matched and were left alone.
    pub skipped_files: usize,
    /// Files that could not be read, parsed, or embedded.
    pub failed_files: usize,
    pub removed_files: usize,
}

/// One `title: body` pair from a lore book document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoreBookEntry {
    pub key: String,
    pub text: String,
    pub source_file: String,
    pub content_fingerprint: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FingerprintTable {
    #[serde(default)]
    files: BTreeMap<String, FileFingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    placeholder: Option<RecordId>,
}

impl FingerprintTable {
    fn is_empty(&self) -> bool {
        self.files.is_empty() && self.placeholder.is_none()
    }

    fn record_count(&self) -> usize {
        self.files.values().map(|f| f.record_ids.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileFingerprint {
    sha256: String,
    #[serde(default)]
    record_ids: Vec<RecordId>,
}

pub struct LoreBookIndex {
    dir: PathBuf,
    embedder: Arc<dyn EmbeddingAdapter>,
    index: Arc<dyn VectorIndexAdapter>,
    top_k: usize,
    threshold: f32,
    state: ScanState,
}

impl LoreBookIndex {
    pub fn new(
        dir: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingAdapter>,
        index: Arc<dyn VectorIndexAdapter>,
        config: &LoreBookConfig,
    ) -> Self {
        Self {
            dir: dir.into(),
            embedder,
            index,
            top_k: config.top_k,
            threshold: config.threshold,
            state: ScanState::Unscanned,
        }
    }

    /// Constructs the index and runs the first scan.
    pub async fn open(
        dir: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingAdapter>,
        index: Arc<dyn VectorIndexAdapter>,
        config: &LoreBookConfig,
    ) -> Result<Self, MnemosError> {
        let mut lore = Self::new(dir, embedder, index, config);
        lore.scan().await?;
        Ok(lore)
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Brings the vector index in line with the directory contents.
    ///
    /// A scan that fails part-way leaves the state at [`ScanState::Scanning`]; the
    /// next scan starts over from the persisted fingerprints.
    pub async fn scan(&mut self) -> Result<ScanReport, MnemosError> {
        self.state = ScanState::Scanning;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(MnemosError::storage)?;

        let mut table = self.load_fingerprints().await?;
        let mut report = ScanReport::default();
        let files = self.list_documents().await?;

        let present: BTreeSet<&str> = files.iter().map(|(name, _)| name.as_str()).collect();
        let gone: Vec<String> = table
            .files
            .keys()
            .filter(|name| !present.contains(name.as_str()))
            .cloned()
            .collect();
        for name in gone {
            if let Some(old) = table.files.remove(&name) {
                self.index.delete_by_ids(&old.record_ids).await?;
                report.removed_files += 1;
                info!(file = %name, records = old.record_ids.len(), "lore book removed");
            }
        }

        for (name, path) in &files {
            let bytes = match tokio::fs::read(path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(file = %name, error = %e, "cannot read lore book");
                    report.failed_files += 1;
                    continue;
                }
            };
            let sha256 = hex::encode(Sha256::digest(&bytes));
            if table.files.get(name).is_some_and(|f| f.sha256 == sha256) {
                report.skipped_files += 1;
                continue;
            }

            if let Some(old) = table.files.remove(name) {
                self.index.delete_by_ids(&old.record_ids).await?;
                debug!(file = %name, records = old.record_ids.len(), "purged stale lore records");
            }

            let entries = match parse_document(name, &sha256, &bytes) {
                Ok(entries) => entries,
                Err(message) => {
                    // Fingerprinted anyway so a malformed file is not retried every scan.
                    warn!(file = %name, %message, "malformed lore book");
                    table.files.insert(
                        name.clone(),
                        FileFingerprint {
                            sha256,
                            record_ids: Vec::new(),
                        },
                    );
                    report.failed_files += 1;
                    continue;
                }
            };

            match self.embed_entries(&entries).await {
                Ok(record_ids) => {
                    info!(file = %name, entries = entries.len(), "lore book embedded");
                    metrics::counter!("mnemos_lore_book_files_embedded_total").increment(1);
                    report.embedded_files += 1;
                    report.embedded_entries += record_ids.len();
                    table
                        .files
                        .insert(name.clone(), FileFingerprint { sha256, record_ids });
                }
                Err(e) => {
                    // Not fingerprinted: embedding failures are retried next scan.
                    warn!(file = %name, error = %e, "failed to embed lore book");
                    report.failed_files += 1;
                }
            }
        }

        self.reconcile_placeholder(&mut table).await?;
        self.save_fingerprints(&table).await?;
        self.state = ScanState::Ready;
        info!(
            dir = %self.dir.display(),
            embedded = report.embedded_files,
            skipped = report.skipped_files,
            failed = report.failed_files,
            removed = report.removed_files,
            "lore book scan complete"
        );
        Ok(report)
    }

    /// Searches every query and joins all matched bodies with blank lines, in result
    /// order per query. Failures are logged and yield an empty string.
    pub async fn search(&self, queries: &[String]) -> String {
        if queries.is_empty() {
            return String::new();
        }
        match self.try_search(queries).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "lore book search failed");
                String::new()
            }
        }
    }

    async fn try_search(&self, queries: &[String]) -> Result<String, MnemosError> {
        let vectors = self.embedder.encode_batch(queries).await?;
        let mut passages = Vec::new();
        for vector in &vectors {
            let hits = self.index.search(vector, self.top_k, self.threshold).await?;
            passages.extend(
                hits.into_iter()
                    .filter(|hit| entry_type(&hit.metadata) != Some(PLACEHOLDER_TYPE))
                    .map(|hit| hit.text),
            );
        }
        Ok(passages.join("\n\n"))
    }

    async fn embed_entries(&self, entries: &[LoreBookEntry]) -> Result<Vec<RecordId>, MnemosError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let titles: Vec<String> = entries.iter().map(|e| e.key.clone()).collect();
        let vectors = self.embedder.encode_batch(&titles).await?;
        let texts = entries.iter().map(|e| e.text.clone()).collect();
        let metadatas = entries
            .iter()
            .map(|e| {
                metadata_from_pairs([
                    ("source", e.source_file.clone().into()),
                    ("key", e.key.clone().into()),
                    ("type", ENTRY_TYPE.into()),
                ])
            })
            .collect();
        self.index.add(vectors, texts, Some(metadatas)).await
    }

    /// Keeps exactly one placeholder while no real entries exist, and none otherwise.
    async fn reconcile_placeholder(&self, table: &mut FingerprintTable) -> Result<(), MnemosError> {
        let real = table.record_count();
        match (&table.placeholder, real) {
            (Some(id), n) if n > 0 => {
                self.index.delete_by_ids(std::slice::from_ref(id)).await?;
                debug!("lore book placeholder removed");
                table.placeholder = None;
            }
            (None, 0) => match self.insert_placeholder().await {
                Ok(id) => table.placeholder = Some(id),
                Err(e) => warn!(error = %e, "could not insert lore book placeholder"),
            },
            _ => {}
        }
        Ok(())
    }

    async fn insert_placeholder(&self) -> Result<RecordId, MnemosError> {
        let vector = self.embedder.encode_one(PLACEHOLDER_TEXT).await?;
        let metadata: Metadata = metadata_from_pairs([("type", PLACEHOLDER_TYPE.into())]);
        let ids = self
            .index
            .add(vec![vector], vec![PLACEHOLDER_TEXT.to_string()], Some(vec![metadata]))
            .await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| MnemosError::Internal("index returned no id for placeholder".into()))
    }

    fn fingerprint_path(&self) -> PathBuf {
        self.dir.join(FINGERPRINT_DIR).join(FINGERPRINT_FILE)
    }

    /// Reads the fingerprint table and reconciles it with the index: a table that
    /// references records while the index is empty (or the reverse) is discarded,
    /// along with the index contents, and everything is embedded again.
    async fn load_fingerprints(&self) -> Result<FingerprintTable, MnemosError> {
        let path = self.fingerprint_path();
        let table = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_yaml_ng::from_slice::<Option<FingerprintTable>>(&bytes) {
                Ok(table) => table.unwrap_or_default(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable fingerprint table, rebuilding");
                    FingerprintTable::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FingerprintTable::default(),
            Err(e) => return Err(MnemosError::storage(e)),
        };

        let indexed = self.index.count().await?;
        match (table.is_empty(), indexed) {
            (true, 0) => Ok(table),
            (false, n) if n > 0 => Ok(table),
            (true, n) => {
                warn!(records = n, "index holds records unknown to the lore book, clearing");
                self.index.clear().await?;
                Ok(FingerprintTable::default())
            }
            (false, _) => {
                warn!("lore book index is empty but fingerprints exist, re-embedding");
                Ok(FingerprintTable::default())
            }
        }
    }

    async fn save_fingerprints(&self, table: &FingerprintTable) -> Result<(), MnemosError> {
        let path = self.fingerprint_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(MnemosError::storage)?;
        }
        let yaml = serde_yaml_ng::to_string(table).map_err(MnemosError::storage)?;
        write_atomic(&path, yaml.as_bytes()).await
    }

    /// Regular, non-hidden files directly inside the directory, sorted by name.
    async fn list_documents(&self) -> Result<Vec<(String, PathBuf)>, MnemosError> {
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(MnemosError::storage)?;
        while let Some(entry) = entries.next_entry().await.map_err(MnemosError::storage)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                out.push((name, entry.path()));
            }
        }
        out.sort();
        Ok(out)
    }
}

fn entry_type(metadata: &Metadata) -> Option<&str> {
    metadata.get("type").and_then(|v| v.as_str())
}

/// Parses one document into entries. An empty document has no entries; anything
/// other than a mapping is an error.
pub fn parse_document(
    source_file: &str,
    fingerprint: &str,
    bytes: &[u8],
) -> Result<Vec<LoreBookEntry>, String> {
    let value: serde_yaml_ng::Value = serde_yaml_ng::from_slice(bytes).map_err(|e| e.to_string())?;
    let mapping = match value {
        serde_yaml_ng::Value::Null => return Ok(Vec::new()),
        serde_yaml_ng::Value::Mapping(m) => m,
        _ => return Err("top level is not a title: body mapping".into()),
    };

    let mut entries = Vec::with_capacity(mapping.len());
    for (key, body) in mapping {
        let (Some(key), Some(text)) = (scalar_to_string(&key), scalar_to_string(&body)) else {
            debug!(file = source_file, "skipping non-scalar lore entry");
            continue;
        };
        if key.trim().is_empty() || text.trim().is_empty() {
            continue;
        }
        entries.push(LoreBookEntry {
            key,
            text,
            source_file: source_file.to_string(),
            content_fingerprint: fingerprint.to_string(),
        });
    }
    Ok(entries)
}

fn scalar_to_string(value: &serde_yaml_ng::Value) -> Option<String> {
    match value {
        serde_yaml_ng::Value::String(s) => Some(s.clone()),
        serde_yaml_ng::Value::Number(n) => Some(n.to_string()),
        serde_yaml_ng::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
