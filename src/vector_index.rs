//! In-process inverted-file (IVF) vector index.
//!
//! Records are grouped into partitions, each owned by a centroid. A vector
//! is assigned to its nearest centroid at insert time and a query probes
//! only the `probes` nearest partitions. Centroids are seeded from the
//! first inserted vectors and only move when [`VectorIndex::rebuild_partitions`]
//! is called explicitly.
//!
//! All state sits behind one `RwLock`: an upsert is visible to searches
//! either completely or not at all, and a search that starts after
//! `remove` returns never sees the removed id.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use tracing::info;

use crate::config::VectorIndexConfig;
use crate::embedding::{cosine_similarity, normalize};
use crate::error::{EngineError, Result};
use crate::models::ChunkId;

#[derive(Debug, Clone)]
struct Record {
    vector: Vec<f32>,
    partition: usize,
    /// Insertion order, used to break similarity ties.
    seq: u64,
}

#[derive(Debug, Default)]
struct IvfState {
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<ChunkId>>,
    records: HashMap<ChunkId, Record>,
    next_seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorIndexStats {
    pub model_id: String,
    pub dims: usize,
    pub records: usize,
    pub partitions: usize,
    pub probes: usize,
    /// Record count per partition.
    pub list_sizes: Vec<usize>,
}

#[derive(Debug)]
pub struct VectorIndex {
    model_id: String,
    dims: usize,
    partitions: usize,
    probes: usize,
    iterations: usize,
    state: RwLock<IvfState>,
}

impl VectorIndex {
    pub fn new(model_id: impl Into<String>, dims: usize, partitions: usize, probes: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dims,
            partitions: partitions.max(1),
            probes: probes.max(1),
            iterations: 8,
            state: RwLock::new(IvfState::default()),
        }
    }

    pub fn from_config(model_id: impl Into<String>, dims: usize, config: &VectorIndexConfig) -> Self {
        let mut index = Self::new(model_id, dims, config.partitions, config.probes);
        index.iterations = config.kmeans_iterations.max(1);
        index
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IvfState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IvfState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_dims(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dims {
            return Err(EngineError::DimensionMismatch {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Insert or replace the vector for `id`. Re-inserting an identical
    /// vector is a no-op; replacing keeps the original insertion order.
    pub fn upsert(&self, id: ChunkId, vector: &[f32]) -> Result<()> {
        self.check_dims(vector)?;
        let mut v = vector.to_vec();
        normalize(&mut v);

        let mut guard = self.write();
        let state = &mut *guard;
        let seq = match state.records.get(&id) {
            Some(existing) if existing.vector == v => return Ok(()),
            Some(existing) => existing.seq,
            None => {
                state.next_seq += 1;
                state.next_seq
            }
        };
        detach(state, &id);

        let partition = if state.centroids.len() < self.partitions {
            state.centroids.push(v.clone());
            state.lists.push(Vec::new());
            state.centroids.len() - 1
        } else {
            nearest_centroids(&state.centroids, &v, 1)[0]
        };
        state.lists[partition].push(id);
        state.records.insert(
            id,
            Record {
                vector: v,
                partition,
                seq,
            },
        );
        Ok(())
    }

    /// Remove `id`; returns whether it was present.
    pub fn remove(&self, id: &ChunkId) -> bool {
        let mut state = self.write();
        detach(&mut state, id)
    }

    pub fn contains(&self, id: &ChunkId) -> bool {
        self.read().records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate k-nearest neighbours by cosine similarity, highest first.
    ///
    /// With `probes >= partitions` the search is exhaustive.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(ChunkId, f32)>> {
        self.check_dims(query)?;
        let state = self.read();
        if k == 0 || state.records.is_empty() {
            return Ok(Vec::new());
        }

        let probed = nearest_centroids(&state.centroids, query, self.probes);
        let mut hits: Vec<(ChunkId, f32, u64)> = probed
            .into_iter()
            .flat_map(|p| state.lists[p].iter())
            .filter_map(|id| {
                state
                    .records
                    .get(id)
                    .map(|r| (*id, cosine_similarity(query, &r.vector), r.seq))
            })
            .collect();

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.2.cmp(&b.2))
        });
        hits.truncate(k);
        Ok(hits.into_iter().map(|(id, sim, _)| (id, sim)).collect())
    }

    /// Recompute centroids with k-means over all records and reassign
    /// every record to its nearest centroid.
    ///
    /// Deterministic: initial centroids are records spread evenly over
    /// insertion order.
    pub fn rebuild_partitions(&self) {
        let mut guard = self.write();
        let state = &mut *guard;
        let mut ordered: Vec<(ChunkId, Vec<f32>, u64)> = state
            .records
            .iter()
            .map(|(id, r)| (*id, r.vector.clone(), r.seq))
            .collect();
        ordered.sort_by_key(|(_, _, seq)| *seq);

        let k = self.partitions.min(ordered.len());
        if k == 0 {
            state.centroids.clear();
            state.lists.clear();
            return;
        }

        let step = ordered.len() as f64 / k as f64;
        let mut centroids: Vec<Vec<f32>> = (0..k)
            .map(|i| ordered[(i as f64 * step) as usize].1.clone())
            .collect();
        let mut assignment = vec![0usize; ordered.len()];

        for _ in 0..self.iterations {
            let mut changed = false;
            for (i, (_, v, _)) in ordered.iter().enumerate() {
                let best = nearest_centroids(&centroids, v, 1)[0];
                if assignment[i] != best {
                    assignment[i] = best;
                    changed = true;
                }
            }
            let mut sums = vec![vec![0.0f32; self.dims]; k];
            let mut counts = vec![0usize; k];
            for (i, (_, v, _)) in ordered.iter().enumerate() {
                counts[assignment[i]] += 1;
                for (s, x) in sums[assignment[i]].iter_mut().zip(v) {
                    *s += x;
                }
            }
            for (c, (sum, count)) in centroids.iter_mut().zip(sums.into_iter().zip(counts)) {
                // An empty cluster keeps its previous centroid.
                if count > 0 {
                    *c = sum;
                    normalize(c);
                }
            }
            if !changed {
                break;
            }
        }

        let mut lists = vec![Vec::new(); k];
        for (id, v, _) in &ordered {
            let p = nearest_centroids(&centroids, v, 1)[0];
            lists[p].push(*id);
            if let Some(r) = state.records.get_mut(id) {
                r.partition = p;
            }
        }
        state.centroids = centroids;
        state.lists = lists;
        info!(records = ordered.len(), partitions = k, "rebuilt vector partitions");
    }

    /// Check that partition lists and records agree.
    pub fn verify(&self) -> Result<()> {
        let state = self.read();
        if state.lists.len() != state.centroids.len() {
            return Err(EngineError::IndexCorrupt(format!(
                "{} partition lists for {} centroids",
                state.lists.len(),
                state.centroids.len()
            )));
        }
        let mut listed = 0usize;
        for (p, list) in state.lists.iter().enumerate() {
            for id in list {
                match state.records.get(id) {
                    Some(r) if r.partition == p => listed += 1,
                    Some(r) => {
                        return Err(EngineError::IndexCorrupt(format!(
                            "chunk {} listed in partition {} but assigned to {}",
                            id, p, r.partition
                        )))
                    }
                    None => {
                        return Err(EngineError::IndexCorrupt(format!(
                            "partition {} references missing chunk {}",
                            p, id
                        )))
                    }
                }
            }
        }
        if listed != state.records.len() {
            return Err(EngineError::IndexCorrupt(format!(
                "{} records but {} partition entries",
                state.records.len(),
                listed
            )));
        }
        if let Some(r) = state.records.values().find(|r| r.vector.len() != self.dims) {
            return Err(EngineError::IndexCorrupt(format!(
                "record of dimension {} in a {}-dimensional index",
                r.vector.len(),
                self.dims
            )));
        }
        Ok(())
    }

    pub fn stats(&self) -> VectorIndexStats {
        let state = self.read();
        VectorIndexStats {
            model_id: self.model_id.clone(),
            dims: self.dims,
            records: state.records.len(),
            partitions: state.centroids.len(),
            probes: self.probes,
            list_sizes: state.lists.iter().map(Vec::len).collect(),
        }
    }

    /// An empty index with the same model, dimension, and partitioning.
    pub fn empty_like(&self) -> Self {
        Self {
            model_id: self.model_id.clone(),
            dims: self.dims,
            partitions: self.partitions,
            probes: self.probes,
            iterations: self.iterations,
            state: RwLock::new(IvfState::default()),
        }
    }

    /// Replace every record with those of `other` in one write.
    pub fn replace_with(&self, other: VectorIndex) -> Result<()> {
        if other.model_id != self.model_id || other.dims != self.dims {
            return Err(EngineError::IndexCorrupt(format!(
                "cannot replace {}/{} index with {}/{}",
                self.model_id, self.dims, other.model_id, other.dims
            )));
        }
        let fresh = other.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        *self.write() = fresh;
        Ok(())
    }
}

fn detach(state: &mut IvfState, id: &ChunkId) -> bool {
    match state.records.remove(id) {
        Some(record) => {
            if let Some(list) = state.lists.get_mut(record.partition) {
                list.retain(|x| x != id);
            }
            true
        }
        None => false,
    }
}

/// Indices of the `n` centroids most similar to `v`, best first.
fn nearest_centroids(centroids: &[Vec<f32>], v: &[f32], n: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, f32)> = centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, cosine_similarity(c, v)))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.into_iter().take(n).map(|(i, _)| i).collect()
}
