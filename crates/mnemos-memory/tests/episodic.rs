// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Episodic memory: ingestion, day shards, and time-gated recall.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mnemos_config::model::{EpisodicConfig, LocalVectorStoreConfig};
use mnemos_core::{MnemosError, SMALL_TALK_TAG, VectorIndexAdapter};
use mnemos_memory::{CalendarTimeExtractor, EpisodicMemory, Persona};
use mnemos_test_utils::clock::{TEST_OFFSET_MINUTES, at, epoch};
use mnemos_test_utils::{MockEmbedder, MockSummarizer};
use mnemos_vector::LocalVectorStore;
use tracing_test::traced_test;

const DIM: usize = 8;

fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[i] = 1.0;
    v
}

struct Fixture {
    _tmp: tempfile::TempDir,
    memories: PathBuf,
    vectors: PathBuf,
    embedder: Arc<MockEmbedder>,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let memories = tmp.path().join("memories");
        let vectors = tmp.path().join("vectors");
        let embedder = Arc::new(
            MockEmbedder::new(DIM)
                .with_vector("hiking trip", axis(1))
                .with_vector("tax forms", axis(2))
                .with_vector("cooking", axis(3))
                .with_vector("how was the hike", axis(1))
                .with_vector("unrelated words", axis(5)),
        );
        Self {
            _tmp: tmp,
            memories,
            vectors,
            embedder,
        }
    }

    async fn index(&self) -> Arc<LocalVectorStore> {
        let config = LocalVectorStoreConfig {
            save_path: self.vectors.display().to_string(),
            ..LocalVectorStoreConfig::default()
        };
        Arc::new(LocalVectorStore::open(&config, "long_memory_test").await.unwrap())
    }

    async fn open(&self, deep_retrieval: bool) -> EpisodicMemory {
        self.open_with(deep_retrieval, self.index().await).await
    }

    async fn open_with(&self, deep_retrieval: bool, index: Arc<LocalVectorStore>) -> EpisodicMemory {
        let config = EpisodicConfig {
            deep_retrieval,
            threshold: 0.9,
            utc_offset_minutes: TEST_OFFSET_MINUTES,
        };
        EpisodicMemory::open(
            &self.memories,
            self.embedder.clone(),
            index,
            Arc::new(CalendarTimeExtractor),
            Persona::new("Sam", "Mira"),
            &config,
        )
        .await
        .unwrap()
    }

    fn shard(&self, day: &str, ext: &str) -> PathBuf {
        self.memories.join(format!("{day}.{ext}"))
    }
}

fn narrative(time: &str, user: &str, reply: &str) -> String {
    format!("Time: {time}\n{{{{user}}}}: {user}\n{{{{char}}}}: {reply}")
}

/// Three digests: two on 2024-03-12, one on 2024-03-13 (UTC+8).
async fn seed(memory: &mut EpisodicMemory) {
    memory
        .add(
            epoch(2024, 3, 12, 10, 0, 0),
            &narrative("2024-03-12 10:00:00", "We hiked the ridge", "The view was lovely"),
            "hiking trip",
        )
        .await
        .unwrap();
    memory
        .add(
            epoch(2024, 3, 12, 20, 0, 0),
            &narrative("2024-03-12 20:00:00", "Taxes are due", "Let's sort the forms"),
            "tax forms",
        )
        .await
        .unwrap();
    memory
        .add(
            epoch(2024, 3, 13, 9, 0, 0),
            &narrative("2024-03-13 09:00:00", "Breakfast?", "Pancakes"),
            "cooking",
        )
        .await
        .unwrap();
}

fn now() -> chrono::DateTime<chrono::FixedOffset> {
    at(2024, 3, 13, 15, 30, 0)
}

#[tokio::test]
async fn shallow_recall_returns_the_whole_day_in_order() {
    let fx = Fixture::new();
    let mut memory = fx.open(false).await;
    seed(&mut memory).await;

    let recalled = memory
        .get_at("anything", "what did we do yesterday?", now())
        .await
        .unwrap();
    assert_eq!(
        recalled,
        "Time: 2024-03-12 10:00:00\nSam: We hiked the ridge\nMira: The view was lovely\n\
         Time: 2024-03-12 20:00:00\nSam: Taxes are due\nMira: Let's sort the forms"
    );
}

#[tokio::test]
async fn recall_is_time_gated() {
    let fx = Fixture::new();
    let mut memory = fx.open(false).await;
    seed(&mut memory).await;

    assert_eq!(memory.get_at("hiking", "tell me about hiking", now()).await, None);
    assert_eq!(memory.get_at("hiking", "last month", now()).await, None);
}

#[tokio::test]
async fn several_expressions_widen_the_range() {
    let fx = Fixture::new();
    let mut memory = fx.open(false).await;
    seed(&mut memory).await;

    let recalled = memory
        .get_at("anything", "yesterday and today", now())
        .await
        .unwrap();
    assert_eq!(recalled.matches("Time: ").count(), 3);
}

#[tokio::test]
async fn deep_recall_is_a_subset_of_shallow_recall() {
    let fx = Fixture::new();
    let mut shallow = fx.open(false).await;
    seed(&mut shallow).await;
    let all = shallow
        .get_at("how was the hike", "yesterday", now())
        .await
        .unwrap();
    drop(shallow);

    let deep = fx.open(true).await;
    let filtered = deep
        .get_at("how was the hike", "yesterday", now())
        .await
        .unwrap();
    assert!(filtered.contains("We hiked the ridge"));
    assert!(!filtered.contains("Taxes"));
    for line in filtered.lines() {
        assert!(all.lines().any(|l| l == line));
    }

    assert_eq!(deep.get_at("unrelated words", "yesterday", now()).await, None);
}

#[tokio::test]
async fn shards_follow_local_calendar_days() {
    let fx = Fixture::new();
    let mut memory = fx.open(false).await;
    seed(&mut memory).await;
    // 00:30 local is still the previous day in UTC.
    memory
        .add(epoch(2024, 3, 14, 0, 30, 0), "late", "hiking trip")
        .await
        .unwrap();

    for day in ["2024-03-12", "2024-03-13", "2024-03-14"] {
        assert!(fx.shard(day, "yaml").exists(), "{day}.yaml");
        assert!(fx.shard(day, "vec").exists(), "{day}.vec");
    }
    let text = std::fs::read_to_string(fx.shard("2024-03-12", "yaml")).unwrap();
    assert!(text.contains("hiking trip"));
    assert!(text.contains("tax forms"));
    assert!(!text.contains("cooking"));
}

#[tokio::test]
async fn reload_uses_vector_caches_and_does_not_duplicate_records() {
    let fx = Fixture::new();
    let index = fx.index().await;
    let mut memory = fx.open_with(false, index.clone()).await;
    seed(&mut memory).await;
    assert_eq!(index.count().await.unwrap(), 3);
    drop(memory);

    let calls = fx.embedder.calls();
    let reopened = fx.open_with(false, index.clone()).await;
    assert_eq!(fx.embedder.calls(), calls);
    assert_eq!(reopened.len(), 3);
    assert_eq!(index.count().await.unwrap(), 3);
    assert_eq!(
        reopened.timestamps(),
        &[
            epoch(2024, 3, 12, 10, 0, 0),
            epoch(2024, 3, 12, 20, 0, 0),
            epoch(2024, 3, 13, 9, 0, 0)
        ]
    );
}

#[tokio::test]
async fn missing_vector_cache_is_regenerated() {
    let fx = Fixture::new();
    let mut memory = fx.open(false).await;
    seed(&mut memory).await;
    drop(memory);

    std::fs::remove_file(fx.shard("2024-03-12", "vec")).unwrap();
    let before = fx.embedder.texts_embedded();
    let reopened = fx.open(true).await;
    assert_eq!(fx.embedder.texts_embedded() - before, 2);
    assert!(fx.shard("2024-03-12", "vec").exists());

    let recalled = reopened
        .get_at("how was the hike", "yesterday", now())
        .await
        .unwrap();
    assert!(recalled.contains("We hiked the ridge"));
}

#[tokio::test]
async fn stale_vector_cache_is_regenerated() {
    let fx = Fixture::new();
    let mut memory = fx.open(false).await;
    seed(&mut memory).await;
    drop(memory);

    let day12 = fx.shard("2024-03-12", "vec");
    std::fs::copy(fx.shard("2024-03-13", "vec"), &day12).unwrap();
    let before = fx.embedder.texts_embedded();
    fx.open(false).await;
    assert_eq!(fx.embedder.texts_embedded() - before, 2);
}

#[tokio::test]
async fn cache_with_absurd_header_is_regenerated() {
    let fx = Fixture::new();
    let mut memory = fx.open(false).await;
    seed(&mut memory).await;
    drop(memory);

    let mut header = b"MNEV".to_vec();
    header.extend_from_slice(&u32::MAX.to_le_bytes());
    header.extend_from_slice(&u32::MAX.to_le_bytes());
    std::fs::write(fx.shard("2024-03-12", "vec"), header).unwrap();

    let before = fx.embedder.texts_embedded();
    let reopened = fx.open(false).await;
    assert_eq!(reopened.len(), 3);
    assert_eq!(fx.embedder.texts_embedded() - before, 2);
}

#[tokio::test]
async fn failed_shard_write_leaves_no_trace() {
    let fx = Fixture::new();
    let index = fx.index().await;
    let mut memory = fx.open_with(false, index.clone()).await;
    let ts = epoch(2024, 3, 12, 10, 0, 0);

    // A directory where the day's text shard belongs makes the write fail.
    std::fs::create_dir_all(fx.shard("2024-03-12", "yaml")).unwrap();
    assert!(memory.add(ts, "hiked", "hiking trip").await.is_err());
    assert!(memory.is_empty());
    assert!(memory.timestamps().is_empty());
    assert_eq!(index.count().await.unwrap(), 0);

    std::fs::remove_dir(fx.shard("2024-03-12", "yaml")).unwrap();
    memory.add(ts, "hiked", "hiking trip").await.unwrap();
    assert_eq!(memory.len(), 1);
    assert_eq!(index.count().await.unwrap(), 1);
}

#[tokio::test]
#[traced_test]
async fn unreadable_shard_is_skipped() {
    let fx = Fixture::new();
    let mut memory = fx.open(false).await;
    seed(&mut memory).await;
    drop(memory);

    std::fs::write(fx.shard("2024-01-01", "yaml"), "1700000000: [unclosed").unwrap();
    let reopened = fx.open(false).await;
    assert_eq!(reopened.len(), 3);
    assert!(logs_contain("skipping unreadable episodic shard"));
}

#[tokio::test]
async fn duplicate_timestamp_is_rejected() {
    let fx = Fixture::new();
    let mut memory = fx.open(false).await;
    seed(&mut memory).await;

    let err = memory
        .add(epoch(2024, 3, 12, 10, 0, 0), "again", "cooking")
        .await
        .unwrap_err();
    assert!(matches!(err, MnemosError::InvalidInput(_)));
    assert_eq!(memory.len(), 3);
}

#[tokio::test]
async fn earlier_timestamp_is_inserted_in_order() {
    let fx = Fixture::new();
    let mut memory = fx.open(false).await;
    seed(&mut memory).await;

    let early = epoch(2024, 3, 12, 8, 0, 0);
    memory.add(early, "early", "cooking").await.unwrap();
    assert_eq!(memory.timestamps()[0], early);
    assert!(memory.timestamps().windows(2).all(|w| w[0] < w[1]));
    assert_eq!(memory.find_range_indices(early, early), Some((0, 0)));
}

#[tokio::test]
async fn index_records_carry_their_timestamp() {
    let fx = Fixture::new();
    let index = fx.index().await;
    let mut memory = fx.open_with(false, index.clone()).await;
    seed(&mut memory).await;

    let hits = index.search(&axis(2), 1, 0.5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(
        hits[0].metadata.get("timestamp").and_then(|v| v.as_i64()),
        Some(epoch(2024, 3, 12, 20, 0, 0))
    );
    assert_eq!(
        hits[0].metadata.get("type").and_then(|v| v.as_str()),
        Some("long_memory")
    );
}

#[tokio::test]
async fn turns_become_digests() {
    let fx = Fixture::new();
    let mut memory = fx.open(false).await;
    let summarizer = MockSummarizer::with_tags(&["<b>hiking</b>\n trip"]);

    let digest = memory
        .record_turn(
            "We hiked the ridge",
            "The view was lovely",
            epoch(2024, 3, 12, 10, 0, 0),
            &summarizer,
        )
        .await
        .unwrap();
    assert_eq!(digest.topic_tag, "hiking trip");
    assert_eq!(
        digest.narrative,
        narrative("2024-03-12 10:00:00", "We hiked the ridge", "The view was lovely")
    );
    assert_eq!(memory.digest(digest.timestamp), Some(digest));
}

#[tokio::test]
async fn summarizer_trouble_falls_back_to_small_talk() {
    let fx = Fixture::new();
    let mut memory = fx.open(false).await;
    let summarizer = MockSummarizer::with_tags(&["just daily chat"]);
    summarizer.push_failure("llm offline").await;

    let chat = memory
        .record_turn("hi", "hello", epoch(2024, 3, 12, 10, 0, 0), &summarizer)
        .await
        .unwrap();
    let failed = memory
        .record_turn("hi again", "hello again", epoch(2024, 3, 12, 10, 5, 0), &summarizer)
        .await
        .unwrap();
    assert_eq!(chat.topic_tag, SMALL_TALK_TAG);
    assert_eq!(failed.topic_tag, SMALL_TALK_TAG);
    assert_eq!(summarizer.calls(), 2);
}

#[tokio::test]
async fn empty_memory_recalls_nothing() {
    let fx = Fixture::new();
    let memory = fx.open(true).await;
    assert!(memory.is_empty());
    assert_eq!(memory.get_at("x", "yesterday", now()).await, None);
    assert!(Path::new(&fx.memories).is_dir());
}
