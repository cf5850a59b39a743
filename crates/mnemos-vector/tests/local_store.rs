// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Behavior of the file-backed vector store through the adapter contract.

use std::path::Path;

use mnemos_config::model::{LocalIndexType, LocalVectorStoreConfig};
use mnemos_core::{Metadata, MnemosError, VectorIndexAdapter, metadata_from_pairs};
use mnemos_vector::LocalVectorStore;
use proptest::prelude::*;

fn config(dir: &Path) -> LocalVectorStoreConfig {
    LocalVectorStoreConfig {
        save_path: dir.display().to_string(),
        ..LocalVectorStoreConfig::default()
    }
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

async fn open(dir: &Path) -> LocalVectorStore {
    LocalVectorStore::open(&config(dir), "test").await.unwrap()
}

#[tokio::test]
async fn cat_dog_car_top_hit() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    let cat = vec![1.0, 0.05, 0.0];
    let ids = store
        .add(
            vec![cat.clone(), vec![0.05, 1.0, 0.0], vec![0.0, 0.05, 1.0]],
            texts(&["cat", "dog", "car"]),
            None,
        )
        .await
        .unwrap();

    let hits = store.search(&cat, 1, 0.5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, ids[0]);
    assert_eq!(hits[0].text, "cat");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn empty_store_search_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    assert!(store.search(&[1.0, 2.0], 5, 0.0).await.unwrap().is_empty());
    assert_eq!(store.dimension().await, 0);
}

#[tokio::test]
async fn dimension_mismatch_leaves_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    store
        .add(vec![vec![1.0, 0.0]], texts(&["a"]), None)
        .await
        .unwrap();

    let err = store
        .add(vec![vec![1.0, 0.0, 0.0]], texts(&["b"]), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MnemosError::DimensionMismatch {
            expected: 2,
            actual: 3
        }
    ));
    assert_eq!(store.count().await.unwrap(), 1);

    let err = store.search(&[1.0, 0.0, 0.0], 1, 0.0).await.unwrap_err();
    assert!(matches!(err, MnemosError::DimensionMismatch { .. }));
}

#[tokio::test]
async fn shape_mismatch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    let err = store
        .add(vec![vec![1.0], vec![2.0]], texts(&["only one"]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MnemosError::ShapeMismatch { .. }));

    let err = store
        .add(vec![vec![1.0]], texts(&["x"]), Some(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, MnemosError::ShapeMismatch { .. }));
}

#[tokio::test]
async fn configured_dimension_is_enforced_from_the_start() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.dimension = Some(4);
    let store = LocalVectorStore::open(&cfg, "fixed").await.unwrap();

    assert_eq!(store.dimension().await, 4);
    let err = store
        .add(vec![vec![1.0, 0.0]], texts(&["short"]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MnemosError::DimensionMismatch { expected: 4, .. }));
    // Rejected before any file was written.
    assert!(!dir.path().join("fixed.data").exists());
}

#[tokio::test]
async fn reload_preserves_records_and_top_hit() {
    let dir = tempfile::tempdir().unwrap();
    let query = vec![0.2, 0.9, 0.1];
    let (ids, before) = {
        let store = open(dir.path()).await;
        let ids = store
            .add(
                vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]],
                texts(&["x", "y", "z"]),
                Some(vec![
                    metadata_from_pairs([("n", serde_json::json!(1))]),
                    Metadata::new(),
                    Metadata::new(),
                ]),
            )
            .await
            .unwrap();
        (ids, store.search(&query, 1, 0.0).await.unwrap())
    };

    let store = open(dir.path()).await;
    assert_eq!(store.count().await.unwrap(), 3);
    assert_eq!(store.dimension().await, 3);
    let after = store.search(&query, 1, 0.0).await.unwrap();
    assert_eq!(before[0].id, after[0].id);
    assert_eq!(after[0].text, "y");

    let first = store.get(&ids[0]).await.unwrap().unwrap();
    assert_eq!(first.metadata["n"], serde_json::json!(1));
}

#[tokio::test]
async fn ids_survive_deletes_of_other_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    let ids = store
        .add(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]],
            texts(&["a", "b", "c"]),
            None,
        )
        .await
        .unwrap();

    assert!(
        store
            .delete_by_ids(&[ids[0].clone(), "no-such-id".to_string()])
            .await
            .unwrap()
    );
    assert_eq!(store.count().await.unwrap(), 2);
    assert!(store.get(&ids[0]).await.unwrap().is_none());

    let c = store.get(&ids[2]).await.unwrap().unwrap();
    assert_eq!(c.text, "c");
    let hits = store.search(&[0.0, 1.0], 1, 0.0).await.unwrap();
    assert_eq!(hits[0].id, ids[1]);

    let reopened = open(dir.path()).await;
    assert_eq!(reopened.get(&ids[2]).await.unwrap().unwrap().text, "c");
}

#[tokio::test]
async fn update_replaces_vector_and_keeps_metadata_when_absent() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    let meta = metadata_from_pairs([("source", serde_json::json!("a.yaml"))]);
    let ids = store
        .add(vec![vec![1.0, 0.0]], texts(&["old"]), Some(vec![meta.clone()]))
        .await
        .unwrap();

    assert!(
        store
            .update(&ids[0], vec![0.0, 1.0], "new".into(), None)
            .await
            .unwrap()
    );
    let record = store.get(&ids[0]).await.unwrap().unwrap();
    assert_eq!(record.text, "new");
    assert_eq!(record.vector, vec![0.0, 1.0]);
    assert_eq!(record.metadata, meta);

    assert!(
        !store
            .update("missing", vec![0.0, 1.0], "x".into(), None)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn ties_keep_insertion_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    let v = vec![0.6, 0.8];
    let ids = store
        .add(
            vec![v.clone(), vec![0.0, 1.0], v.clone(), v.clone()],
            texts(&["first", "other", "second", "third"]),
            None,
        )
        .await
        .unwrap();

    let hits = store.search(&v, 3, 0.99).await.unwrap();
    let got: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(got, vec![ids[0].as_str(), ids[2].as_str(), ids[3].as_str()]);
}

#[tokio::test]
async fn threshold_filters_low_scores() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    store
        .add(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]],
            texts(&["same", "orthogonal", "opposite"]),
            None,
        )
        .await
        .unwrap();

    let hits = store.search(&[1.0, 0.0], 10, 0.0).await.unwrap();
    let got: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
    assert_eq!(got, vec!["same", "orthogonal"]);

    assert!(store.search(&[1.0, 0.0], 0, -1.0).await.unwrap().is_empty());
}

#[tokio::test]
async fn clear_resets_store_and_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    store
        .add(vec![vec![1.0, 0.0]], texts(&["a"]), None)
        .await
        .unwrap();

    assert!(store.clear().await.unwrap());
    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(store.dimension().await, 0);
    assert!(!dir.path().join("test.data").exists());
    assert!(!dir.path().join("test.index").exists());

    // A new dimension is accepted after clearing.
    store
        .add(vec![vec![1.0, 0.0, 0.0]], texts(&["b"]), None)
        .await
        .unwrap();
    assert_eq!(store.dimension().await, 3);
}

#[tokio::test]
async fn ivf_store_trains_and_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.index_type = LocalIndexType::Ivf;
    cfg.nprobe = 4;

    let dim = 6;
    let vectors: Vec<Vec<f32>> = (0..120)
        .map(|i| {
            let mut v = vec![0.1; dim];
            v[i % dim] = 1.0 + (i / dim) as f32 * 0.01;
            v
        })
        .collect();
    let labels: Vec<String> = (0..120).map(|i| format!("row {i}")).collect();

    let store = LocalVectorStore::open(&cfg, "ivf").await.unwrap();
    store.add(vectors[..60].to_vec(), labels[..60].to_vec(), None).await.unwrap();
    assert!(!store.stats().await.trained);
    store.add(vectors[60..].to_vec(), labels[60..].to_vec(), None).await.unwrap();
    assert!(store.stats().await.trained);

    let reopened = LocalVectorStore::open(&cfg, "ivf").await.unwrap();
    let stats = reopened.stats().await;
    assert!(stats.trained);
    assert_eq!(stats.records, 120);

    let hits = reopened.search(&vectors[77], 1, 0.0).await.unwrap();
    assert_eq!(hits[0].text, "row 77");
}

#[tokio::test]
async fn switching_index_type_rebuilds_from_data() {
    let dir = tempfile::tempdir().unwrap();
    let flat = config(dir.path());
    {
        let store = LocalVectorStore::open(&flat, "switch").await.unwrap();
        store
            .add(vec![vec![1.0, 0.0], vec![0.0, 1.0]], texts(&["a", "b"]), None)
            .await
            .unwrap();
    }

    let mut ivf = flat.clone();
    ivf.index_type = LocalIndexType::Ivf;
    let store = LocalVectorStore::open(&ivf, "switch").await.unwrap();
    assert_eq!(store.count().await.unwrap(), 2);
    assert_eq!(store.search(&[0.0, 1.0], 1, 0.0).await.unwrap()[0].text, "b");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn search_is_sorted_bounded_and_finds_exact_vector(
        rows in prop::collection::vec(prop::collection::vec(-1.0f32..1.0, 4), 1..30),
        pick in any::<prop::sample::Index>(),
        top_k in 1usize..10,
    ) {
        let rows: Vec<Vec<f32>> = rows
            .into_iter()
            .map(|mut v| { v[0] += 2.0; v })
            .collect();
        let target = pick.index(rows.len());
        let runtime = tokio::runtime::Runtime::new().unwrap();

        let (hits, target_vector) = runtime.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let store = open(dir.path()).await;
            let labels: Vec<String> = (0..rows.len()).map(|i| i.to_string()).collect();
            store.add(rows.clone(), labels, None).await.unwrap();
            let hits = store.search(&rows[target], top_k, 0.0).await.unwrap();
            (hits, rows[target].clone())
        });

        prop_assert!(hits.len() <= top_k);
        prop_assert!(!hits.is_empty());
        for pair in hits.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
        let top: usize = hits[0].text.parse().unwrap();
        let top_score = mnemos_core::vector::cosine_similarity(&rows[top], &target_vector);
        prop_assert!((top_score - 1.0).abs() < 1e-4);
    }
}

#[tokio::test]
async fn failed_writes_leave_the_store_unchanged() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("vectors");
    let store = open(&dir).await;
    let ids = store
        .add(vec![vec![1.0, 0.0]], texts(&["kept"]), None)
        .await
        .unwrap();

    // Writes go through temp files in the save directory, so removing it makes
    // every persist fail.
    std::fs::remove_dir_all(&dir).unwrap();

    assert!(store.add(vec![vec![0.0, 1.0]], texts(&["lost"]), None).await.is_err());
    assert_eq!(store.count().await.unwrap(), 1);
    let hits = store.search(&[0.0, 1.0], 5, 0.5).await.unwrap();
    assert!(hits.is_empty());

    assert!(store.update(&ids[0], vec![0.0, 1.0], "changed".into(), None).await.is_err());
    assert_eq!(store.get(&ids[0]).await.unwrap().unwrap().text, "kept");

    assert!(store.delete_by_ids(&ids).await.is_err());
    assert_eq!(store.count().await.unwrap(), 1);

    std::fs::create_dir_all(&dir).unwrap();
    store.add(vec![vec![0.0, 1.0]], texts(&["later"]), None).await.unwrap();
    assert_eq!(open(&dir).await.count().await.unwrap(), 2);
}

#[tokio::test]
async fn first_add_failure_keeps_dimension_unset() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("vectors");
    let store = open(&dir).await;
    std::fs::remove_dir_all(&dir).unwrap();

    assert!(store.add(vec![vec![1.0, 0.0, 0.0]], texts(&["a"]), None).await.is_err());
    assert_eq!(store.dimension().await, 0);

    std::fs::create_dir_all(&dir).unwrap();
    store.add(vec![vec![1.0, 0.0]], texts(&["b"]), None).await.unwrap();
    assert_eq!(store.dimension().await, 2);
}

#[tokio::test]
async fn index_file_older_than_data_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    store
        .add(vec![vec![1.0, 0.0], vec![0.0, 1.0]], texts(&["a", "b"]), None)
        .await
        .unwrap();
    let index_path = dir.path().join("test.index");
    let older_index = std::fs::read(&index_path).unwrap();
    store
        .add(vec![vec![1.0, 1.0]], texts(&["c"]), None)
        .await
        .unwrap();

    // As if the process died after the data file was replaced but before the index was.
    std::fs::write(&index_path, older_index).unwrap();
    let reopened = open(dir.path()).await;
    assert_eq!(reopened.count().await.unwrap(), 3);
    let hits = reopened.search(&[1.0, 1.0], 1, 0.5).await.unwrap();
    assert_eq!(hits[0].text, "c");
}

#[tokio::test]
async fn zero_length_vectors_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    let err = store
        .add(vec![vec![], vec![]], texts(&["a", "b"]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MnemosError::InvalidInput(_)));
    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(store.dimension().await, 0);
}
