//! HNSW vector index
//!
//! Multi-layer navigable small-world graph for approximate nearest-neighbour
//! search over embeddings. Layer 0 holds every node with up to `m_max0`
//! connections; higher layers hold a geometrically thinning subset with up
//! to `m` connections. Search greedily descends from the entry point and
//! finishes with a beam search on layer 0.
//!
//! Distances are cosine distances over unit vectors; embeddings are L2
//! normalized on insert and queries are normalized before descent.
//!
//! ## Determinism
//!
//! - Fixed seed + monotonic counter for level assignment
//! - Sorted neighbor lists
//! - Tie-breaking by (distance asc, id asc)
//!
//! ## Bulk construction
//!
//! Repeated insert with per-insert pruning is quadratic in the worst case.
//! [`HnswIndex::begin_bulk`] pre-sizes the pool and defers pruning;
//! [`HnswIndex::end_bulk`] runs one compaction pass over all nodes.

use crate::simd::{cosine_distance, normalize};
use crate::vector_pool::{VectorId, VectorPool};
use agrama_core::{AgramaError, AgramaResult, Deadline};
use rustc_hash::FxHashMap;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// HNSW build and query parameters
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Max connections per node per layer above 0 (default: 16)
    pub m: usize,
    /// Max connections per node on layer 0 (default: 32)
    pub m_max0: usize,
    /// Candidate pool width during insert (default: 200)
    pub ef_construction: usize,
    /// Candidate pool width during search (default: 50)
    pub ef_search: usize,
    /// Level multiplier; defaults to 1/ln(m)
    pub ml: f64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        let m = 16;
        HnswConfig {
            m,
            m_max0: m * 2,
            ef_construction: 200,
            ef_search: 50,
            ml: 1.0 / (m as f64).ln(),
        }
    }
}

/// A node in the layered graph
#[derive(Debug, Clone)]
struct HnswNode {
    /// neighbors[layer] = sorted neighbor ids
    neighbors: Vec<Vec<VectorId>>,
    max_layer: usize,
    /// Tombstone; honored during search, skipped in results
    deleted: bool,
}

impl HnswNode {
    fn new(max_layer: usize) -> Self {
        HnswNode {
            neighbors: vec![Vec::new(); max_layer + 1],
            max_layer,
            deleted: false,
        }
    }
}

/// Candidate ordered by (distance, id)
///
/// Natural order puts the larger distance on top, so a plain BinaryHeap is
/// the result set (worst on top, O(1) eviction) and `Reverse` wrapping gives
/// the candidate queue (nearest popped first).
#[derive(Debug, Clone, Copy, PartialEq)]
struct DistId {
    dist: f32,
    id: VectorId,
}

impl Eq for DistId {}

impl PartialOrd for DistId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap_or(Ordering::Equal)
            // Larger id ranks as "worse" so ties evict deterministically
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// The HNSW index
pub struct HnswIndex {
    config: HnswConfig,
    pool: VectorPool,
    nodes: FxHashMap<VectorId, HnswNode>,
    key_to_id: FxHashMap<String, VectorId>,
    id_to_key: FxHashMap<VectorId, String>,
    entry_point: Option<VectorId>,
    max_level: usize,
    rng_seed: u64,
    rng_counter: u64,
    bulk_mode: bool,
    version: u64,
}

impl HnswIndex {
    /// Create an index over `dimension`-float embeddings
    pub fn new(dimension: usize, config: HnswConfig) -> AgramaResult<Self> {
        Ok(HnswIndex {
            config,
            pool: VectorPool::new(dimension)?,
            nodes: FxHashMap::default(),
            key_to_id: FxHashMap::default(),
            id_to_key: FxHashMap::default(),
            entry_point: None,
            max_level: 0,
            rng_seed: 42,
            rng_counter: 0,
            bulk_mode: false,
            version: 0,
        })
    }

    /// The index dimension
    pub fn dimension(&self) -> usize {
        self.pool.dimension()
    }

    /// Count of live (non-tombstoned) vectors
    pub fn len(&self) -> usize {
        self.nodes.values().filter(|n| !n.deleted).count()
    }

    /// Whether the index holds no live vectors
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Version watermark, bumped on every mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether a key currently has a live embedding
    pub fn contains(&self, key: &str) -> bool {
        self.key_to_id
            .get(key)
            .and_then(|id| self.nodes.get(id))
            .is_some_and(|n| !n.deleted)
    }

    // ========================================================================
    // Level assignment
    // ========================================================================

    /// Deterministic exponential level draw
    fn assign_level(&mut self) -> usize {
        self.rng_counter += 1;
        let hash = splitmix64(self.rng_seed.wrapping_add(self.rng_counter));
        let uniform = ((hash as f64) / (u64::MAX as f64)).max(1e-15);
        (-uniform.ln() * self.config.ml) as usize
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Insert or replace the embedding for `key`
    pub fn insert(&mut self, key: &str, embedding: &[f32]) -> AgramaResult<()> {
        if embedding.len() != self.dimension() {
            return Err(AgramaError::dimension_mismatch(
                self.dimension(),
                embedding.len(),
            ));
        }

        let mut unit = embedding.to_vec();
        normalize(&mut unit);

        // Replacement removes the old node's links, then re-inserts under
        // the same id so the pool slot is reused.
        let id = match self.key_to_id.get(key).copied() {
            Some(id) => {
                self.unlink_node(id);
                id
            }
            None => {
                let id = self.pool.allocate_id();
                self.key_to_id.insert(key.to_string(), id);
                self.id_to_key.insert(id, key.to_string());
                id
            }
        };

        self.pool.upsert(id, &unit)?;
        self.insert_into_graph(id, &unit);
        self.version += 1;
        Ok(())
    }

    fn insert_into_graph(&mut self, id: VectorId, unit: &[f32]) {
        let level = self.assign_level();
        self.nodes.insert(id, HnswNode::new(level));

        let Some(entry_id) = self.entry_point else {
            self.entry_point = Some(id);
            self.max_level = level;
            return;
        };

        // Greedy descent through the layers above the insertion level
        let mut current_entry = entry_id;
        if self.max_level > level {
            current_entry = self.greedy_descend(unit, entry_id, self.max_level, level + 1);
        }

        // Link at each layer from the insertion level down to 0
        let start_layer = level.min(self.max_level);
        for layer in (0..=start_layer).rev() {
            let candidates =
                self.search_layer(unit, current_entry, self.config.ef_construction, layer);

            let selected: Vec<VectorId> = candidates
                .iter()
                .take(self.config.m)
                .map(|c| c.id)
                .collect();

            if let Some(node) = self.nodes.get_mut(&id) {
                let list = &mut node.neighbors[layer];
                for &n in &selected {
                    if !list.contains(&n) {
                        list.push(n);
                    }
                }
                list.sort();
            }

            let cap = if layer == 0 {
                self.config.m_max0
            } else {
                self.config.m
            };

            for &neighbor in &selected {
                let needs_prune = {
                    let Some(node) = self.nodes.get_mut(&neighbor) else {
                        continue;
                    };
                    if layer >= node.neighbors.len() {
                        continue;
                    }
                    let list = &mut node.neighbors[layer];
                    if !list.contains(&id) {
                        list.push(id);
                        list.sort();
                    }
                    list.len() > cap
                };
                if needs_prune && !self.bulk_mode {
                    self.prune_neighbors(neighbor, layer, cap);
                }
            }

            if let Some(closest) = candidates.first() {
                current_entry = closest.id;
            }
        }

        if level > self.max_level {
            self.entry_point = Some(id);
            self.max_level = level;
        }
    }

    /// Trim a node's neighbor list at `layer` to the `cap` closest
    fn prune_neighbors(&mut self, id: VectorId, layer: usize, cap: usize) {
        let Some(own) = self.pool.get(id).map(|v| v.to_vec()) else {
            return;
        };
        let neighbors: Vec<VectorId> = match self.nodes.get(&id) {
            Some(node) if layer < node.neighbors.len() => node.neighbors[layer].clone(),
            _ => return,
        };

        let mut scored: Vec<DistId> = neighbors
            .iter()
            .filter_map(|&nid| {
                self.pool.get(nid).map(|v| DistId {
                    dist: cosine_distance(&own, v),
                    id: nid,
                })
            })
            .collect();
        scored.sort();

        let mut keep: Vec<VectorId> = scored.into_iter().take(cap).map(|s| s.id).collect();
        keep.sort();
        if let Some(node) = self.nodes.get_mut(&id) {
            node.neighbors[layer] = keep;
        }
    }

    // ========================================================================
    // Bulk construction
    // ========================================================================

    /// Enter bulk-construction mode, pre-sizing for `expected` inserts.
    /// Per-insert pruning is suspended until [`HnswIndex::end_bulk`].
    pub fn begin_bulk(&mut self, expected: usize) {
        self.pool.reserve(expected);
        self.nodes.reserve(expected);
        self.bulk_mode = true;
    }

    /// Leave bulk mode and run the deferred compaction pass
    pub fn end_bulk(&mut self) {
        self.bulk_mode = false;
        let ids: Vec<VectorId> = {
            let mut ids: Vec<VectorId> = self.nodes.keys().copied().collect();
            ids.sort();
            ids
        };
        for id in ids {
            let layers = match self.nodes.get(&id) {
                Some(n) => n.neighbors.len(),
                None => continue,
            };
            for layer in 0..layers {
                let cap = if layer == 0 {
                    self.config.m_max0
                } else {
                    self.config.m
                };
                let over = self
                    .nodes
                    .get(&id)
                    .is_some_and(|n| n.neighbors[layer].len() > cap);
                if over {
                    self.prune_neighbors(id, layer, cap);
                }
            }
        }
        self.version += 1;
    }

    // ========================================================================
    // Remove
    // ========================================================================

    /// Tombstone a key's embedding. Returns whether it was live.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(&id) = self.key_to_id.get(key) else {
            return false;
        };
        let was_live = self.nodes.get(&id).is_some_and(|n| !n.deleted);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.deleted = true;
        }
        if was_live {
            self.version += 1;
            if self.entry_point == Some(id) {
                self.reseat_entry_point();
            }
        }
        was_live
    }

    /// Pick a new entry point after the old one was tombstoned
    fn reseat_entry_point(&mut self) {
        let mut best: Option<(usize, VectorId)> = None;
        for (&nid, node) in &self.nodes {
            if node.deleted {
                continue;
            }
            let candidate = (node.max_layer, nid);
            best = match best {
                // Prefer the highest layer; break ties on the smaller id
                Some((layer, id)) if layer > candidate.0 || (layer == candidate.0 && id < nid) => {
                    Some((layer, id))
                }
                _ => Some(candidate),
            };
        }
        match best {
            Some((layer, id)) => {
                self.entry_point = Some(id);
                self.max_level = layer;
            }
            None => {
                self.entry_point = None;
                self.max_level = 0;
            }
        }
    }

    /// Hard-remove a node's bidirectional links (replacement path)
    fn unlink_node(&mut self, id: VectorId) {
        if let Some(node) = self.nodes.remove(&id) {
            for (layer, neighbors) in node.neighbors.iter().enumerate() {
                for nid in neighbors {
                    if let Some(n) = self.nodes.get_mut(nid) {
                        if layer < n.neighbors.len() {
                            n.neighbors[layer].retain(|x| x != &id);
                        }
                    }
                }
            }
            if self.entry_point == Some(id) {
                self.reseat_entry_point();
            }
        }
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// k nearest neighbours of `query` as `(key, cosine_distance)`,
    /// distance ascending. Never returns more than the live vector count.
    pub fn search(&self, query: &[f32], k: usize) -> AgramaResult<Vec<(String, f32)>> {
        self.search_with_deadline(query, k, &Deadline::unbounded())
    }

    /// Search with a cooperative deadline checked between layers
    pub fn search_with_deadline(
        &self,
        query: &[f32],
        k: usize,
        deadline: &Deadline,
    ) -> AgramaResult<Vec<(String, f32)>> {
        if query.len() != self.dimension() {
            return Err(AgramaError::dimension_mismatch(
                self.dimension(),
                query.len(),
            ));
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(entry_id) = self.entry_point else {
            return Ok(Vec::new());
        };
        if self.nodes.values().all(|n| n.deleted) {
            return Ok(Vec::new());
        }

        let mut unit = query.to_vec();
        normalize(&mut unit);

        let mut current_entry = entry_id;
        if self.max_level > 0 {
            current_entry = self.greedy_descend(&unit, entry_id, self.max_level, 1);
        }
        if deadline.expired() {
            return Err(AgramaError::deadline_exceeded(
                "vector search",
                deadline.elapsed_ms(),
            ));
        }

        let ef = self.config.ef_search.max(k);
        let candidates = self.search_layer(&unit, current_entry, ef, 0);

        Ok(candidates
            .into_iter()
            .filter(|c| self.nodes.get(&c.id).is_some_and(|n| !n.deleted))
            .take(k)
            .filter_map(|c| self.id_to_key.get(&c.id).map(|k| (k.clone(), c.dist)))
            .collect())
    }

    /// Beam search at one layer. Returns up to `ef` nearest candidates
    /// sorted by (distance asc, id asc). Tombstoned nodes are traversed as
    /// waypoints but excluded from results.
    fn search_layer(&self, query: &[f32], entry_id: VectorId, ef: usize, layer: usize) -> Vec<DistId> {
        let Some(entry_vec) = self.pool.get(entry_id) else {
            return Vec::new();
        };
        let entry = DistId {
            dist: cosine_distance(query, entry_vec),
            id: entry_id,
        };

        let mut visited: FxHashMap<VectorId, ()> = FxHashMap::default();
        visited.insert(entry_id, ());

        let mut candidates: BinaryHeap<Reverse<DistId>> = BinaryHeap::new();
        candidates.push(Reverse(entry));

        let mut results: BinaryHeap<DistId> = BinaryHeap::new();
        if self.nodes.get(&entry_id).is_some_and(|n| !n.deleted) {
            results.push(entry);
        }

        while let Some(Reverse(nearest)) = candidates.pop() {
            let worst = results.peek().map(|r| r.dist).unwrap_or(f32::INFINITY);
            if nearest.dist > worst && results.len() >= ef {
                break;
            }

            let Some(node) = self.nodes.get(&nearest.id) else {
                continue;
            };
            if layer >= node.neighbors.len() {
                continue;
            }
            for &neighbor_id in &node.neighbors[layer] {
                if visited.contains_key(&neighbor_id) {
                    continue;
                }
                visited.insert(neighbor_id, ());

                let Some(vec) = self.pool.get(neighbor_id) else {
                    continue;
                };
                let dist = cosine_distance(query, vec);
                let worst = results.peek().map(|r| r.dist).unwrap_or(f32::INFINITY);

                if results.len() < ef || dist < worst {
                    candidates.push(Reverse(DistId {
                        dist,
                        id: neighbor_id,
                    }));
                    if self.nodes.get(&neighbor_id).is_some_and(|n| !n.deleted) {
                        results.push(DistId {
                            dist,
                            id: neighbor_id,
                        });
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        let mut out: Vec<DistId> = results.into_vec();
        out.sort();
        out
    }

    /// Greedy single-candidate descent from `from_layer` down to `to_layer`
    fn greedy_descend(
        &self,
        query: &[f32],
        entry_id: VectorId,
        from_layer: usize,
        to_layer: usize,
    ) -> VectorId {
        let mut current = entry_id;
        for layer in (to_layer..=from_layer).rev() {
            loop {
                let Some(current_vec) = self.pool.get(current) else {
                    break;
                };
                let mut best = DistId {
                    dist: cosine_distance(query, current_vec),
                    id: current,
                };
                if let Some(node) = self.nodes.get(&current) {
                    if layer < node.neighbors.len() {
                        for &nid in &node.neighbors[layer] {
                            if let Some(v) = self.pool.get(nid) {
                                let candidate = DistId {
                                    dist: cosine_distance(query, v),
                                    id: nid,
                                };
                                if candidate < best {
                                    best = candidate;
                                }
                            }
                        }
                    }
                }
                if best.id == current {
                    break;
                }
                current = best.id;
            }
        }
        current
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Export live `(key, unit_vector)` pairs, key-sorted
    pub fn export(&self) -> Vec<(String, Vec<f32>)> {
        let mut out: Vec<(String, Vec<f32>)> = self
            .key_to_id
            .iter()
            .filter(|(_, id)| self.nodes.get(id).is_some_and(|n| !n.deleted))
            .filter_map(|(key, id)| self.pool.get(*id).map(|v| (key.clone(), v.to_vec())))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Rebuild from an export using bulk construction
    pub fn restore(&mut self, entries: Vec<(String, Vec<f32>)>) -> AgramaResult<()> {
        self.begin_bulk(entries.len());
        for (key, vector) in entries {
            self.insert(&key, &vector)?;
        }
        self.end_bulk();
        Ok(())
    }
}

/// SplitMix64 mixer for deterministic level assignment
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}
