// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Episodic memory: timestamped conversation digests retrieved by time range.
//!
//! Digests live in a sorted timestamp list plus a timestamp-keyed map, so a time
//! range resolves to a contiguous slice by binary search. Each digest's topic tag is
//! embedded; the vectors are cached per day next to the text shard and mirrored into
//! the backing vector index with `{timestamp, type: "long_memory"}` metadata.

pub mod shard;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use tracing::{debug, info, warn};

use mnemos_config::model::EpisodicConfig;
use mnemos_core::vector::cosine_similarity;
use mnemos_core::{
    EmbeddingAdapter, Metadata, MnemosError, SMALL_TALK_TAG, TimeExtractor, TurnSummarizer,
    Vector, VectorIndexAdapter, metadata_from_pairs,
};

use crate::persona::{CHAR_PLACEHOLDER, Persona, USER_PLACEHOLDER};
use shard::{ShardEntry, TextShard};

static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const RECORD_TYPE: &str = "long_memory";

/// One remembered conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodicDigest {
    /// Epoch seconds; unique.
    pub timestamp: i64,
    pub topic_tag: String,
    /// Stored with `{{user}}` / `{{char}}` placeholders.
    pub narrative: String,
}

struct Slot {
    topic_tag: String,
    narrative: String,
    /// `None` when the tag could not be embedded at load time.
    vector: Option<Vector>,
}

/// Indices `[first, last]` into sorted `keys` of the entries within `[low, high]`:
/// `first` is the leftmost key `>= low`, `last` the rightmost key `<= high`.
/// `None` when no key falls inside the range.
pub fn find_range_indices(keys: &[i64], low: i64, high: i64) -> Option<(usize, usize)> {
    let start = keys.partition_point(|&k| k < low);
    let end = keys.partition_point(|&k| k <= high);
    if end == 0 || start >= keys.len() || start >= end {
        return None;
    }
    Some((start, end - 1))
}

/// Tidies a summarizer answer into a tag: markup removed, whitespace collapsed,
/// anything mentioning small talk (or nothing at all) mapped to [`SMALL_TALK_TAG`].
pub fn clean_topic_tag(raw: &str) -> String {
    let stripped = MARKUP.replace_all(raw, "");
    let tag = WHITESPACE.replace_all(stripped.trim(), " ").into_owned();
    if tag.is_empty() || tag.to_lowercase().contains(SMALL_TALK_TAG) {
        SMALL_TALK_TAG.to_string()
    } else {
        tag
    }
}

pub struct EpisodicMemory {
    dir: PathBuf,
    embedder: Arc<dyn EmbeddingAdapter>,
    index: Arc<dyn VectorIndexAdapter>,
    extractor: Arc<dyn TimeExtractor>,
    persona: Persona,
    deep_retrieval: bool,
    threshold: f32,
    offset: FixedOffset,
    keys: Vec<i64>,
    slots: HashMap<i64, Slot>,
}

impl EpisodicMemory {
    /// Loads every day shard under `dir` and repopulates `index` from them.
    ///
    /// Shards whose vector cache is missing or stale are re-embedded and the cache is
    /// rewritten. An unreadable text shard is skipped with a warning.
    pub async fn open(
        dir: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingAdapter>,
        index: Arc<dyn VectorIndexAdapter>,
        extractor: Arc<dyn TimeExtractor>,
        persona: Persona,
        config: &EpisodicConfig,
    ) -> Result<Self, MnemosError> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            MnemosError::Config(format!(
                "utc_offset_minutes {} is out of range",
                config.utc_offset_minutes
            ))
        })?;
        let mut memory = Self {
            dir: dir.into(),
            embedder,
            index,
            extractor,
            persona,
            deep_retrieval: config.deep_retrieval,
            threshold: config.threshold,
            offset,
            keys: Vec::new(),
            slots: HashMap::new(),
        };
        memory.load().await?;
        Ok(memory)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// All timestamps, ascending.
    pub fn timestamps(&self) -> &[i64] {
        &self.keys
    }

    pub fn digest(&self, timestamp: i64) -> Option<EpisodicDigest> {
        self.slots.get(&timestamp).map(|slot| EpisodicDigest {
            timestamp,
            topic_tag: slot.topic_tag.clone(),
            narrative: slot.narrative.clone(),
        })
    }

    pub fn find_range_indices(&self, low: i64, high: i64) -> Option<(usize, usize)> {
        find_range_indices(&self.keys, low, high)
    }

    /// Stores one digest: embeds its tag, rewrites the day's shard pair, and adds the
    /// vector to the index. A timestamp already present is rejected.
    pub async fn add(
        &mut self,
        timestamp: i64,
        narrative: &str,
        topic_tag: &str,
    ) -> Result<(), MnemosError> {
        if self.slots.contains_key(&timestamp) {
            return Err(MnemosError::InvalidInput(format!(
                "an episodic digest already exists at {timestamp}"
            )));
        }
        let day = shard::day_of(timestamp, self.offset)?;
        let vector = self.embedder.encode_one(topic_tag).await?;

        let pos = self.keys.partition_point(|&k| k < timestamp);
        self.keys.insert(pos, timestamp);
        self.slots.insert(
            timestamp,
            Slot {
                topic_tag: topic_tag.to_string(),
                narrative: narrative.to_string(),
                vector: Some(vector.clone()),
            },
        );

        if let Err(e) = self.persist_day(timestamp, day).await {
            self.forget(timestamp, day).await;
            return Err(e);
        }
        if let Err(e) = self
            .index
            .add(
                vec![vector],
                vec![narrative.to_string()],
                Some(vec![record_metadata(timestamp)]),
            )
            .await
        {
            self.forget(timestamp, day).await;
            return Err(e);
        }
        debug!(timestamp, tag = topic_tag, "episodic digest stored");
        Ok(())
    }

    /// Drops a digest whose `add` failed and rewrites its day without it, so the
    /// caller may retry the same timestamp.
    async fn forget(&mut self, timestamp: i64, day: chrono::NaiveDate) {
        if let Ok(pos) = self.keys.binary_search(&timestamp) {
            self.keys.remove(pos);
        }
        self.slots.remove(&timestamp);
        if let Err(e) = self.persist_day(timestamp, day).await {
            warn!(timestamp, error = %e, "could not restore episodic shard after failed add");
        }
    }

    /// Turns one exchange into a digest: the summarizer supplies the topic tag and
    /// the narrative records the local time and both messages.
    pub async fn record_turn(
        &mut self,
        user_message: &str,
        reply: &str,
        timestamp: i64,
        summarizer: &dyn TurnSummarizer,
    ) -> Result<EpisodicDigest, MnemosError> {
        let topic_tag = match summarizer.topic_tag(user_message, reply).await {
            Ok(raw) => clean_topic_tag(&raw),
            Err(e) => {
                warn!(error = %e, "turn summarizer failed, tagging as small talk");
                SMALL_TALK_TAG.to_string()
            }
        };
        let when = DateTime::from_timestamp(timestamp, 0)
            .ok_or_else(|| MnemosError::InvalidInput(format!("timestamp {timestamp} is out of range")))?
            .with_timezone(&self.offset);
        let narrative = format!(
            "Time: {}\n{USER_PLACEHOLDER}: {user_message}\n{CHAR_PLACEHOLDER}: {reply}",
            when.format("%Y-%m-%d %H:%M:%S")
        );
        self.add(timestamp, &narrative, &topic_tag).await?;
        info!(timestamp, tag = %topic_tag, "conversation turn remembered");
        Ok(EpisodicDigest {
            timestamp,
            topic_tag,
            narrative,
        })
    }

    /// Recalls digests from the period `time_hint` names, relative to the current time.
    pub async fn get(&self, query: &str, time_hint: &str) -> Option<String> {
        let now = Utc::now().with_timezone(&self.offset);
        self.get_at(query, time_hint, now).await
    }

    /// Recalls digests from the period `time_hint` names, relative to `now`.
    ///
    /// Nothing is returned when the hint names no time. Shallow retrieval returns
    /// every digest in the range in chronological order; deep retrieval keeps only
    /// those whose tag is similar enough to `query`. Failures are logged.
    pub async fn get_at(
        &self,
        query: &str,
        time_hint: &str,
        now: DateTime<FixedOffset>,
    ) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }
        let range = self
            .extractor
            .extract(time_hint, now)
            .into_iter()
            .reduce(|a, b| a.union(b))?;
        let (first, last) = self.find_range_indices(range.start, range.end)?;
        let in_range = &self.keys[first..=last];

        let selected: Vec<&Slot> = if self.deep_retrieval {
            let q = match self.embedder.encode_one(query).await {
                Ok(q) => q,
                Err(e) => {
                    warn!(error = %e, "episodic query could not be embedded");
                    return None;
                }
            };
            in_range
                .iter()
                .filter_map(|ts| self.slots.get(ts))
                .filter(|slot| {
                    slot.vector
                        .as_deref()
                        .is_some_and(|v| v.len() == q.len() && cosine_similarity(v, &q) >= self.threshold)
                })
                .collect()
        } else {
            in_range.iter().filter_map(|ts| self.slots.get(ts)).collect()
        };
        debug!(
            start = range.start,
            end = range.end,
            in_range = in_range.len(),
            selected = selected.len(),
            deep = self.deep_retrieval,
            "episodic recall"
        );

        if selected.is_empty() {
            return None;
        }
        let joined = selected
            .iter()
            .map(|slot| slot.narrative.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Some(self.persona.fill(&joined))
    }

    async fn load(&mut self) -> Result<(), MnemosError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(MnemosError::storage)?;

        let mut shards = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(MnemosError::storage)?;
        while let Some(entry) = entries.next_entry().await.map_err(MnemosError::storage)? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "yaml") {
                shards.push(path);
            }
        }
        shards.sort();

        let mut reembedded = 0usize;
        for path in &shards {
            let text = match shard::read_text(path).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable episodic shard");
                    continue;
                }
            };
            if text.is_empty() {
                continue;
            }
            let vectors = match self.cached_vectors(path, &text).await {
                Some(vectors) => vectors,
                None => {
                    reembedded += 1;
                    self.embed_shard(path, &text).await
                }
            };
            for ((ts, entry), vector) in text.into_iter().zip(vectors) {
                if self.slots.contains_key(&ts) {
                    warn!(timestamp = ts, path = %path.display(), "duplicate episodic timestamp ignored");
                    continue;
                }
                self.keys.push(ts);
                self.slots.insert(
                    ts,
                    Slot {
                        topic_tag: entry.text_tag,
                        narrative: entry.msg,
                        vector,
                    },
                );
            }
        }
        self.keys.sort_unstable();

        self.reindex().await?;
        info!(
            dir = %self.dir.display(),
            digests = self.keys.len(),
            shards = shards.len(),
            reembedded,
            "episodic memory loaded"
        );
        Ok(())
    }

    /// Cached vectors for a shard, if the cache covers exactly its timestamps.
    async fn cached_vectors(&self, path: &Path, text: &TextShard) -> Option<Vec<Option<Vector>>> {
        let rows = shard::read_vectors(&shard::vec_path(path)).await?;
        let aligned = rows.len() == text.len()
            && rows.iter().zip(text.keys()).all(|((ts, _), key)| ts == key);
        if !aligned {
            debug!(path = %path.display(), "stale vector cache");
            return None;
        }
        Some(rows.into_iter().map(|(_, v)| Some(v)).collect())
    }

    /// Embeds a shard's tags and rewrites its cache. On failure the shard's digests
    /// are kept without vectors.
    async fn embed_shard(&self, path: &Path, text: &TextShard) -> Vec<Option<Vector>> {
        let tags: Vec<String> = text.values().map(|e| e.text_tag.clone()).collect();
        let vectors = match self.embedder.encode_batch(&tags).await {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not embed episodic shard");
                return vec![None; text.len()];
            }
        };
        let rows: Vec<(i64, &[f32])> = text
            .keys()
            .copied()
            .zip(vectors.iter().map(Vec::as_slice))
            .collect();
        if let Err(e) = shard::write_vectors(&shard::vec_path(path), &rows).await {
            warn!(path = %path.display(), error = %e, "could not write vector cache");
        }
        info!(path = %path.display(), digests = text.len(), "episodic shard embedded");
        vectors.into_iter().map(Some).collect()
    }

    /// Replaces the index contents with one record per digest that has a vector.
    async fn reindex(&self) -> Result<(), MnemosError> {
        self.index.clear().await?;
        let mut vectors = Vec::new();
        let mut texts = Vec::new();
        let mut metadatas = Vec::new();
        for ts in &self.keys {
            if let Some(slot) = self.slots.get(ts)
                && let Some(v) = &slot.vector
            {
                vectors.push(v.clone());
                texts.push(slot.narrative.clone());
                metadatas.push(record_metadata(*ts));
            }
        }
        if !vectors.is_empty() {
            self.index.add(vectors, texts, Some(metadatas)).await?;
        }
        Ok(())
    }

    /// Rewrites the text shard and vector cache of the day containing `timestamp`.
    async fn persist_day(&self, timestamp: i64, day: chrono::NaiveDate) -> Result<(), MnemosError> {
        let (start, end) = shard::day_bounds(timestamp, self.offset);
        let path = shard::text_path(&self.dir, day);
        let Some((first, last)) = self.find_range_indices(start, end) else {
            remove_stale(&path).await;
            remove_stale(&shard::vec_path(&path)).await;
            return Ok(());
        };

        let mut text = TextShard::new();
        let mut rows: Vec<(i64, &[f32])> = Vec::new();
        let mut complete = true;
        for ts in &self.keys[first..=last] {
            let Some(slot) = self.slots.get(ts) else {
                continue;
            };
            text.insert(
                *ts,
                ShardEntry {
                    text_tag: slot.topic_tag.clone(),
                    msg: slot.narrative.clone(),
                },
            );
            match &slot.vector {
                Some(v) => rows.push((*ts, v.as_slice())),
                None => complete = false,
            }
        }

        shard::write_text(&path, &text).await?;
        if complete {
            shard::write_vectors(&shard::vec_path(&path), &rows).await?;
        } else {
            // Left for the next load to regenerate.
            remove_stale(&shard::vec_path(&path)).await;
        }
        Ok(())
    }
}

async fn remove_stale(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove episodic shard file"),
    }
}

fn record_metadata(timestamp: i64) -> Metadata {
    metadata_from_pairs([
        ("timestamp", timestamp.into()),
        ("type", RECORD_TYPE.into()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn range_inside_keys() {
        let keys = [100, 200, 300, 400];
        assert_eq!(find_range_indices(&keys, 150, 350), Some((1, 2)));
        assert_eq!(find_range_indices(&keys, 100, 400), Some((0, 3)));
        assert_eq!(find_range_indices(&keys, 200, 200), Some((1, 1)));
    }

    #[test]
    fn range_outside_keys() {
        let keys = [100, 200, 300, 400];
        assert_eq!(find_range_indices(&keys, 0, 99), None);
        assert_eq!(find_range_indices(&keys, 401, 500), None);
        assert_eq!(find_range_indices(&keys, 210, 290), None);
        assert_eq!(find_range_indices(&[], 0, 10), None);
    }

    #[test]
    fn tags_are_tidied() {
        assert_eq!(clean_topic_tag("  <b>trip</b> to\n Kyoto "), "trip to Kyoto");
        assert_eq!(clean_topic_tag("Daily Chat about nothing"), SMALL_TALK_TAG);
        assert_eq!(clean_topic_tag("<p> </p>"), SMALL_TALK_TAG);
    }

    proptest! {
        #[test]
        fn range_indices_bracket_exactly_the_keys_in_range(
            mut keys in proptest::collection::vec(-1000i64..1000, 0..40),
            a in -1100i64..1100,
            b in -1100i64..1100,
        ) {
            keys.sort_unstable();
            keys.dedup();
            let (low, high) = (a.min(b), a.max(b));
            let expected: Vec<i64> = keys.iter().copied().filter(|k| (low..=high).contains(k)).collect();
            match find_range_indices(&keys, low, high) {
                Some((first, last)) => prop_assert_eq!(keys[first..=last].to_vec(), expected),
                None => prop_assert!(expected.is_empty()),
            }
        }
    }
}
