// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory similarity structures over L2-normalized rows.
//!
//! Rows are addressed by position (insertion order of the owning store). Scores are
//! inner products of normalized vectors, i.e. cosine similarity.

use mnemos_config::model::LocalIndexType;
use mnemos_core::vector::{dot, l2_normalize};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// IVF trains its coarse quantizer once the store holds this many records.
pub const IVF_MIN_TRAINING: usize = 100;

/// Lloyd iterations cap for IVF training.
const KMEANS_MAX_ITERATIONS: usize = 20;

/// Tuning knobs for the IVF variant.
#[derive(Debug, Clone, Copy)]
pub struct IvfParams {
    pub nlist: usize,
    pub nprobe: usize,
}

/// Serializable form of the structure, written to the `.index` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub kind: LocalIndexType,
    pub dimension: usize,
    pub len: usize,
    #[serde(default)]
    pub centroids: Vec<Vec<f32>>,
    #[serde(default)]
    pub lists: Vec<Vec<usize>>,
}

/// Flat or inverted-file index.
#[derive(Debug, Clone)]
pub struct AnnIndex {
    kind: LocalIndexType,
    dimension: usize,
    params: IvfParams,
    /// Row-major normalized vectors, `len * dimension` values.
    rows: Vec<f32>,
    /// Empty while untrained (and always for flat).
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<usize>>,
}

impl AnnIndex {
    pub fn new(kind: LocalIndexType, dimension: usize, params: IvfParams) -> Self {
        Self {
            kind,
            dimension,
            params,
            rows: Vec::new(),
            centroids: Vec::new(),
            lists: Vec::new(),
        }
    }

    /// Builds a fresh index over `vectors` (in position order).
    pub fn build<'a, I>(kind: LocalIndexType, dimension: usize, params: IvfParams, vectors: I) -> Self
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let mut index = Self::new(kind, dimension, params);
        for v in vectors {
            index.rows.extend(l2_normalize(v));
        }
        index.maybe_train();
        index
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.rows.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> LocalIndexType {
        self.kind
    }

    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    /// Appends rows at the next positions.
    pub fn add(&mut self, vectors: &[Vec<f32>]) {
        let start = self.len();
        for v in vectors {
            self.rows.extend(l2_normalize(v));
        }
        if self.is_trained() {
            for pos in start..self.len() {
                let list = nearest(&self.centroids, self.row(pos));
                self.lists[list].push(pos);
            }
        } else {
            self.maybe_train();
        }
    }

    /// Candidate positions with their scores. Exhaustive unless IVF is trained.
    pub fn candidates(&self, query: &[f32]) -> Vec<(usize, f32)> {
        let n = self.len();
        if n == 0 {
            return Vec::new();
        }
        let q = l2_normalize(query);

        if !self.is_trained() {
            let Ok(matrix) = ArrayView2::from_shape((n, self.dimension), &self.rows) else {
                return Vec::new();
            };
            let scores = matrix.dot(&ArrayView1::from(&q[..]));
            return scores.iter().copied().enumerate().collect();
        }

        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, dot(c, &q)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut out: Vec<(usize, f32)> = ranked
            .iter()
            .take(self.params.nprobe.max(1))
            .flat_map(|(list, _)| self.lists[*list].iter())
            .map(|&pos| (pos, dot(self.row(pos), &q)))
            .collect();
        out.sort_by_key(|(pos, _)| *pos);
        out
    }

    pub fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            kind: self.kind,
            dimension: self.dimension,
            len: self.len(),
            centroids: self.centroids.clone(),
            lists: self.lists.clone(),
        }
    }

    /// Restores a snapshot over the stored vectors. Returns `None` when the snapshot
    /// does not describe those vectors.
    pub fn restore<'a, I>(snapshot: IndexSnapshot, params: IvfParams, vectors: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let mut index = Self::new(snapshot.kind, snapshot.dimension, params);
        for v in vectors {
            if v.len() != snapshot.dimension {
                return None;
            }
            index.rows.extend(l2_normalize(v));
        }
        if index.len() != snapshot.len || snapshot.centroids.len() != snapshot.lists.len() {
            return None;
        }

        let mut seen = vec![false; snapshot.len];
        for pos in snapshot.lists.iter().flatten() {
            match seen.get_mut(*pos) {
                Some(slot) if !*slot => *slot = true,
                _ => return None,
            }
        }
        if !snapshot.centroids.is_empty() && seen.iter().any(|s| !s) {
            return None;
        }
        if snapshot
            .centroids
            .iter()
            .any(|c| c.len() != snapshot.dimension)
        {
            return None;
        }

        index.centroids = snapshot.centroids;
        index.lists = snapshot.lists;
        Some(index)
    }

    fn row(&self, pos: usize) -> &[f32] {
        &self.rows[pos * self.dimension..(pos + 1) * self.dimension]
    }

    fn maybe_train(&mut self) {
        if self.kind != LocalIndexType::Ivf || self.is_trained() || self.len() < IVF_MIN_TRAINING {
            return;
        }
        let n = self.len();
        let k = self
            .params
            .nlist
            .min((n as f64).sqrt().ceil() as usize)
            .max(1);
        let positions: Vec<usize> = (0..n).collect();
        let (centroids, assignments) = kmeans(self, &positions, k);

        let mut lists = vec![Vec::new(); centroids.len()];
        for (pos, list) in assignments.into_iter().enumerate() {
            lists[list].push(pos);
        }
        debug!(rows = n, lists = k, "trained IVF quantizer");
        metrics::counter!("mnemos_index_rebuilds_total", "reason" => "train").increment(1);
        self.centroids = centroids;
        self.lists = lists;
    }
}

/// Index of the centroid with the highest inner product; ties go to the lower index.
fn nearest(centroids: &[Vec<f32>], row: &[f32]) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let s = dot(c, row);
        if s > best_score {
            best_score = s;
            best = i;
        }
    }
    best
}

/// Spherical k-means with deterministic farthest-point seeding.
fn kmeans(index: &AnnIndex, positions: &[usize], k: usize) -> (Vec<Vec<f32>>, Vec<usize>) {
    let mut centroids: Vec<Vec<f32>> = vec![index.row(positions[0]).to_vec()];
    while centroids.len() < k {
        let mut far_pos = positions[0];
        let mut far_dist = f32::NEG_INFINITY;
        for &pos in positions {
            let row = index.row(pos);
            let closest = centroids
                .iter()
                .map(|c| 1.0 - dot(c, row))
                .fold(f32::INFINITY, f32::min);
            if closest > far_dist {
                far_dist = closest;
                far_pos = pos;
            }
        }
        centroids.push(index.row(far_pos).to_vec());
    }

    let mut assignments = vec![usize::MAX; positions.len()];
    for _ in 0..KMEANS_MAX_ITERATIONS {
        let mut changed = false;
        for (i, &pos) in positions.iter().enumerate() {
            let list = nearest(&centroids, index.row(pos));
            if assignments[i] != list {
                assignments[i] = list;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![vec![0.0f32; index.dimension]; k];
        let mut counts = vec![0usize; k];
        for (i, &pos) in positions.iter().enumerate() {
            counts[assignments[i]] += 1;
            for (acc, v) in sums[assignments[i]].iter_mut().zip(index.row(pos)) {
                *acc += v;
            }
        }
        for (c, (sum, count)) in centroids.iter_mut().zip(sums.into_iter().zip(counts)) {
            // An empty cluster keeps its previous centroid.
            if count > 0 {
                *c = l2_normalize(&sum);
            }
        }
    }

    // The loop may stop on the iteration cap right after moving the centroids.
    for (i, &pos) in positions.iter().enumerate() {
        assignments[i] = nearest(&centroids, index.row(pos));
    }
    (centroids, assignments)
}
