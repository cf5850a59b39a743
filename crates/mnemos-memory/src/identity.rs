// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity memory: durable, undated facts about the agent and the user.
//!
//! Facts are kept in one YAML document (a sequence of `{id, time, text}`), embedded
//! as a single batch on load, and matched by plain similarity search. Search hits
//! are resolved through the record ids the index returned, never by position.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mnemos_config::model::IdentityConfig;
use mnemos_core::{
    EmbeddingAdapter, Metadata, MnemosError, RecordId, VectorIndexAdapter, metadata_from_pairs,
};
use mnemos_vector::local::persist::write_atomic;

use crate::persona::Persona;

const FACT_ID_LEN: usize = 10;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One remembered fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityFact {
    pub id: String,
    /// Local time the fact was learned, `YYYY-MM-DD HH:MM:SS`.
    pub time: String,
    pub text: String,
}

impl IdentityFact {
    fn render(&self) -> String {
        format!("Acquired at: {}\n{}", self.time, self.text)
    }
}

pub struct IdentityMemory {
    path: PathBuf,
    embedder: Arc<dyn EmbeddingAdapter>,
    index: Arc<dyn VectorIndexAdapter>,
    persona: Persona,
    threshold: f32,
    top_k: usize,
    facts: Vec<IdentityFact>,
    /// Index record id to position in `facts`.
    by_record: HashMap<RecordId, usize>,
}

impl IdentityMemory {
    /// Loads the facts at `path` (seeding the bootstrap fact when there are none)
    /// and replaces the contents of `index` with their embeddings.
    pub async fn open(
        path: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingAdapter>,
        index: Arc<dyn VectorIndexAdapter>,
        persona: Persona,
        config: &IdentityConfig,
    ) -> Result<Self, MnemosError> {
        let mut memory = Self {
            path: path.into(),
            embedder,
            index,
            persona,
            threshold: config.threshold,
            top_k: config.top_k,
            facts: Vec::new(),
            by_record: HashMap::new(),
        };

        memory.facts = read_facts(&memory.path).await?;
        if memory.facts.is_empty() {
            let seed = IdentityFact {
                id: fresh_id(&HashSet::new()),
                time: Local::now().format(TIME_FORMAT).to_string(),
                text: config.bootstrap_fact.clone(),
            };
            info!(path = %memory.path.display(), "seeding identity memory");
            memory.facts.push(seed);
            memory.save().await?;
        }

        memory.index.clear().await?;
        memory.index_facts(0).await?;
        info!(facts = memory.facts.len(), "identity memory loaded");
        Ok(memory)
    }

    pub fn facts(&self) -> &[IdentityFact] {
        &self.facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Facts similar to `query`, rendered with their acquisition time and joined by
    /// newlines. Failures are logged and yield an empty string.
    pub async fn find_mem(&self, query: &str) -> String {
        match self.try_find(query).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "identity memory search failed");
                String::new()
            }
        }
    }

    async fn try_find(&self, query: &str) -> Result<String, MnemosError> {
        let q = self.embedder.encode_one(query).await?;
        let hits = self.index.search(&q, self.top_k, self.threshold).await?;
        let mut rendered = Vec::with_capacity(hits.len());
        for hit in &hits {
            match self.by_record.get(&hit.id).and_then(|&i| self.facts.get(i)) {
                Some(fact) => rendered.push(fact.render()),
                None => warn!(record = %hit.id, "search hit has no identity fact"),
            }
        }
        debug!(hits = hits.len(), matched = rendered.len(), "identity recall");
        Ok(self.persona.fill(&rendered.join("\n")))
    }

    /// Appends facts stamped with the current local time.
    pub async fn add_facts(&mut self, texts: &[String]) -> Result<Vec<IdentityFact>, MnemosError> {
        self.add_facts_at(texts, Local::now().fixed_offset()).await
    }

    /// Appends facts stamped with `acquired_at`, persists them, and indexes them.
    pub async fn add_facts_at(
        &mut self,
        texts: &[String],
        acquired_at: DateTime<FixedOffset>,
    ) -> Result<Vec<IdentityFact>, MnemosError> {
        let texts: Vec<&String> = texts.iter().filter(|t| !t.trim().is_empty()).collect();
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let time = acquired_at.format(TIME_FORMAT).to_string();
        let mut taken: HashSet<String> = self.facts.iter().map(|f| f.id.clone()).collect();
        let start = self.facts.len();
        for text in texts {
            let id = fresh_id(&taken);
            taken.insert(id.clone());
            self.facts.push(IdentityFact {
                id,
                time: time.clone(),
                text: text.clone(),
            });
        }

        if let Err(e) = self.save().await {
            self.facts.truncate(start);
            return Err(e);
        }
        self.index_facts(start).await?;
        let added = self.facts[start..].to_vec();
        info!(count = added.len(), "identity facts added");
        Ok(added)
    }

    /// Embeds `facts[start..]` as one batch and records their index ids.
    async fn index_facts(&mut self, start: usize) -> Result<(), MnemosError> {
        let pending = &self.facts[start..];
        if pending.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = pending.iter().map(|f| f.text.clone()).collect();
        let vectors = self.embedder.encode_batch(&texts).await?;
        let metadatas: Vec<Metadata> = pending
            .iter()
            .map(|f| metadata_from_pairs([("uuid", f.id.clone().into()), ("time", f.time.clone().into())]))
            .collect();
        let ids = self.index.add(vectors, texts, Some(metadatas)).await?;
        for (offset, id) in ids.into_iter().enumerate() {
            self.by_record.insert(id, start + offset);
        }
        Ok(())
    }

    async fn save(&self) -> Result<(), MnemosError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(MnemosError::storage)?;
        }
        let yaml = serde_yaml_ng::to_string(&self.facts).map_err(MnemosError::storage)?;
        write_atomic(&self.path, yaml.as_bytes()).await
    }
}

/// Reads the fact document. A missing or empty file has no facts. Entries with
/// blank text or a repeated id are dropped. An unparsable file is moved aside to
/// `{path}.bak` and treated as empty.
async fn read_facts(path: &Path) -> Result<Vec<IdentityFact>, MnemosError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(MnemosError::storage(e)),
    };
    let parsed: Option<Vec<IdentityFact>> = match serde_yaml_ng::from_slice(&bytes) {
        Ok(parsed) => parsed,
        Err(e) => {
            let mut backup = path.as_os_str().to_owned();
            backup.push(".bak");
            warn!(path = %path.display(), error = %e, "unreadable identity memory, moved aside");
            tokio::fs::rename(path, PathBuf::from(backup))
                .await
                .map_err(MnemosError::storage)?;
            return Ok(Vec::new());
        }
    };

    let mut seen = HashSet::new();
    Ok(parsed
        .unwrap_or_default()
        .into_iter()
        .filter(|f| !f.text.trim().is_empty() && seen.insert(f.id.clone()))
        .collect())
}

/// Random alphanumeric id not present in `taken`.
fn fresh_id(taken: &HashSet<String>) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let id: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(FACT_ID_LEN)
            .map(char::from)
            .collect();
        if !taken.contains(&id) {
            return id;
        }
    }
}
