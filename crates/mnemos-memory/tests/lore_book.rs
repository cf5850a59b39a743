// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lore book scanning and search against the file-backed vector store.

use std::path::Path;
use std::sync::Arc;

use mnemos_config::model::{LocalVectorStoreConfig, LoreBookConfig};
use mnemos_core::VectorIndexAdapter;
use mnemos_memory::{LoreBookIndex, ScanState};
use mnemos_test_utils::MockEmbedder;
use mnemos_vector::LocalVectorStore;
use tracing_test::traced_test;

const DIM: usize = 8;

fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[i] = 1.0;
    v
}

fn embedder() -> Arc<MockEmbedder> {
    Arc::new(
        MockEmbedder::new(DIM)
            .with_vector("Dragons", axis(1))
            .with_vector("The Capital", axis(2))
            .with_vector("Harbor", axis(3))
            .with_vector("tell me about dragons", axis(1))
            .with_vector("where is the capital", axis(2)),
    )
}

async fn store(dir: &Path) -> Arc<LocalVectorStore> {
    let config = LocalVectorStoreConfig {
        save_path: dir.display().to_string(),
        ..LocalVectorStoreConfig::default()
    };
    Arc::new(LocalVectorStore::open(&config, "lore_books_test").await.unwrap())
}

struct Fixture {
    _tmp: tempfile::TempDir,
    books: std::path::PathBuf,
    embedder: Arc<MockEmbedder>,
    index: Arc<LocalVectorStore>,
}

impl Fixture {
    async fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let books = tmp.path().join("lore_book");
        std::fs::create_dir_all(&books).unwrap();
        let index = store(&tmp.path().join("vectors")).await;
        Self {
            _tmp: tmp,
            books,
            embedder: embedder(),
            index,
        }
    }

    fn write(&self, name: &str, body: &str) {
        std::fs::write(self.books.join(name), body).unwrap();
    }

    fn lore(&self) -> LoreBookIndex {
        LoreBookIndex::new(
            &self.books,
            self.embedder.clone(),
            self.index.clone(),
            &LoreBookConfig::default(),
        )
    }
}

#[tokio::test]
async fn second_scan_embeds_nothing() {
    let fx = Fixture::new().await;
    fx.write("creatures.yaml", "Dragons: Winged and proud.\n");
    fx.write("places.yaml", "The Capital: A walled city.\nHarbor: Busy at dawn.\n");

    let mut lore = fx.lore();
    assert_eq!(lore.state(), ScanState::Unscanned);
    let first = lore.scan().await.unwrap();
    assert_eq!(lore.state(), ScanState::Ready);
    assert_eq!(first.embedded_files, 2);
    assert_eq!(first.embedded_entries, 3);
    assert_eq!(fx.index.count().await.unwrap(), 3);

    let calls = fx.embedder.calls();
    let again = fx.lore().scan().await.unwrap();
    assert_eq!(again.embedded_files, 0);
    assert_eq!(again.skipped_files, 2);
    assert_eq!(fx.embedder.calls(), calls);
    assert_eq!(fx.index.count().await.unwrap(), 3);
}

#[tokio::test]
async fn changed_file_alone_is_reembedded() {
    let fx = Fixture::new().await;
    fx.write("creatures.yaml", "Dragons: Winged and proud.\n");
    fx.write("places.yaml", "The Capital: A walled city.\nHarbor: Busy at dawn.\n");
    fx.lore().scan().await.unwrap();

    let before = fx.embedder.texts_embedded();
    fx.write("creatures.yaml", "Dragons: Winged and proud!\n");
    let report = fx.lore().scan().await.unwrap();

    assert_eq!(report.embedded_files, 1);
    assert_eq!(report.skipped_files, 1);
    assert_eq!(fx.embedder.texts_embedded() - before, 1);
    // The stale record for the old body is gone.
    assert_eq!(fx.index.count().await.unwrap(), 3);

    let lore = fx.lore();
    let text = lore.search(&["tell me about dragons".to_string()]).await;
    assert_eq!(text, "Winged and proud!");
}

#[tokio::test]
async fn search_joins_every_query_with_blank_lines() {
    let fx = Fixture::new().await;
    fx.write("creatures.yaml", "Dragons: Winged and proud.\n");
    fx.write("places.yaml", "The Capital: A walled city.\n");
    let mut lore = fx.lore();
    lore.scan().await.unwrap();

    let text = lore
        .search(&[
            "tell me about dragons".to_string(),
            "where is the capital".to_string(),
            "tell me about dragons".to_string(),
        ])
        .await;
    assert_eq!(
        text,
        "Winged and proud.\n\nA walled city.\n\nWinged and proud."
    );
    assert_eq!(lore.search(&[]).await, "");
}

#[tokio::test]
async fn empty_directory_gets_a_placeholder_until_entries_arrive() {
    let fx = Fixture::new().await;
    let mut lore = fx.lore();
    lore.scan().await.unwrap();
    assert_eq!(fx.index.count().await.unwrap(), 1);
    assert_eq!(
        lore.search(&[mnemos_memory::lore_book::PLACEHOLDER_TEXT.to_string()]).await,
        ""
    );

    // A rescan of the still-empty directory keeps exactly one placeholder.
    lore.scan().await.unwrap();
    assert_eq!(fx.index.count().await.unwrap(), 1);

    fx.write("creatures.yaml", "Dragons: Winged and proud.\n");
    lore.scan().await.unwrap();
    assert_eq!(fx.index.count().await.unwrap(), 1);
    assert_eq!(
        lore.search(&["tell me about dragons".to_string()]).await,
        "Winged and proud."
    );
}

#[tokio::test]
async fn removed_file_loses_its_records() {
    let fx = Fixture::new().await;
    fx.write("creatures.yaml", "Dragons: Winged and proud.\n");
    fx.write("places.yaml", "The Capital: A walled city.\n");
    let mut lore = fx.lore();
    lore.scan().await.unwrap();

    std::fs::remove_file(fx.books.join("places.yaml")).unwrap();
    let report = lore.scan().await.unwrap();
    assert_eq!(report.removed_files, 1);
    assert_eq!(fx.index.count().await.unwrap(), 1);
    assert_eq!(lore.search(&["where is the capital".to_string()]).await, "");
}

#[tokio::test]
#[traced_test]
async fn malformed_file_is_not_retried() {
    let fx = Fixture::new().await;
    fx.write("broken.yaml", "- just\n- a list\n");
    fx.write("creatures.yaml", "Dragons: Winged and proud.\n");

    let first = fx.lore().scan().await.unwrap();
    assert_eq!(first.failed_files, 1);
    assert_eq!(first.embedded_files, 1);
    assert!(logs_contain("malformed lore book"));

    let second = fx.lore().scan().await.unwrap();
    assert_eq!(second.failed_files, 0);
    assert_eq!(second.skipped_files, 2);
}

#[tokio::test]
async fn embedding_failure_is_retried_next_scan() {
    let fx = Fixture::new().await;
    fx.write("creatures.yaml", "Dragons: Winged and proud.\n");

    fx.embedder.set_failing(true);
    let failed = fx.lore().scan().await.unwrap();
    assert_eq!(failed.failed_files, 1);
    assert_eq!(fx.index.count().await.unwrap(), 0);

    fx.embedder.set_failing(false);
    let retried = fx.lore().scan().await.unwrap();
    assert_eq!(retried.embedded_files, 1);
    assert_eq!(fx.index.count().await.unwrap(), 1);
}

#[tokio::test]
async fn lost_fingerprints_rebuild_without_duplicates() {
    let fx = Fixture::new().await;
    fx.write("creatures.yaml", "Dragons: Winged and proud.\n");
    fx.lore().scan().await.unwrap();

    std::fs::remove_file(fx.books.join(".index").join("fingerprints.yaml")).unwrap();
    let report = fx.lore().scan().await.unwrap();
    assert_eq!(report.embedded_files, 1);
    assert_eq!(fx.index.count().await.unwrap(), 1);
}

#[tokio::test]
async fn hidden_files_and_subdirectories_are_ignored() {
    let fx = Fixture::new().await;
    fx.write(".draft.yaml", "Dragons: not yet.\n");
    std::fs::create_dir_all(fx.books.join("archive")).unwrap();
    std::fs::write(fx.books.join("archive").join("old.yaml"), "Harbor: gone.\n").unwrap();
    fx.write("creatures.yaml", "Dragons: Winged and proud.\n");

    let report = fx.lore().scan().await.unwrap();
    assert_eq!(report.embedded_files, 1);
    assert_eq!(fx.index.count().await.unwrap(), 1);
}

#[tokio::test]
#[traced_test]
async fn search_failure_returns_empty_text() {
    let fx = Fixture::new().await;
    fx.write("creatures.yaml", "Dragons: Winged and proud.\n");
    let mut lore = fx.lore();
    lore.scan().await.unwrap();

    fx.embedder.set_failing(true);
    assert_eq!(lore.search(&["tell me about dragons".to_string()]).await, "");
    assert!(logs_contain("lore book search failed"));
}
