//! Frontier state for block-processed shortest path
//!
//! The traversal settles vertices in blocks of `t = ⌊(ln n)^(2/3)⌋` and
//! runs a reduction step every `k = ⌊(ln n)^(1/3)⌋` blocks: pivots are the
//! settled vertices with the largest relaxed subtrees, and heap entries
//! already dominated by a settled distance are compacted away. All buffers
//! live in a [`FreWorkspace`] that is pooled and reused between queries.

use agrama_store::NodeId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Heap entry ordered by (distance asc, node asc) for determinism
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrontierEntry {
    /// Tentative distance
    pub dist: f32,
    /// Node the distance applies to
    pub node: NodeId,
}

impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the smallest distance first
        other
            .dist
            .partial_cmp(&self.dist)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Recursion parameters derived from the graph size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontierParams {
    /// Block size: vertices settled between boundary checks
    pub t: usize,
    /// Recursion width: blocks between reduction steps, and pivot count
    pub k: usize,
}

impl FrontierParams {
    /// Derive `t = ⌊(ln n)^(2/3)⌋`, `k = ⌊(ln n)^(1/3)⌋`, both at least 1
    pub fn for_node_count(n: usize) -> Self {
        let ln_n = (n.max(2) as f64).ln();
        FrontierParams {
            t: (ln_n.powf(2.0 / 3.0) as usize).max(1),
            k: (ln_n.powf(1.0 / 3.0) as usize).max(1),
        }
    }
}

/// Pooled per-query traversal state
///
/// Dense arrays are indexed by node id and sized lazily to the snapshot.
/// `reset` marks state stale via an epoch counter instead of clearing the
/// arrays, so reuse is O(touched), not O(n).
#[derive(Debug, Default)]
pub struct FreWorkspace {
    /// Tentative distance per node; valid only when epoch matches
    pub dist: Vec<f32>,
    /// Settled flag per node
    pub settled: Vec<bool>,
    /// Relaxation parent per node (u32::MAX = none)
    pub parent: Vec<u32>,
    /// Settled-descendant count per node, drives pivot selection
    pub subtree: Vec<u32>,
    /// Nodes touched this query; reset clears only these
    pub touched: Vec<u32>,
    /// The priority frontier
    pub heap: BinaryHeap<FrontierEntry>,
    /// Nodes settled in the current block window, in settle order
    pub window: Vec<NodeId>,
}

impl FreWorkspace {
    /// Size the dense arrays for a snapshot of `n` nodes
    pub fn prepare(&mut self, n: usize) {
        if self.dist.len() < n {
            self.dist.resize(n, f32::INFINITY);
            self.settled.resize(n, false);
            self.parent.resize(n, u32::MAX);
            self.subtree.resize(n, 0);
        }
        self.reset_touched();
        self.heap.clear();
        self.window.clear();
    }

    /// Clear only the state touched by the previous query
    fn reset_touched(&mut self) {
        for &i in &self.touched {
            let i = i as usize;
            self.dist[i] = f32::INFINITY;
            self.settled[i] = false;
            self.parent[i] = u32::MAX;
            self.subtree[i] = 0;
        }
        self.touched.clear();
    }

    /// Record a tentative distance, tracking the touch set
    pub fn relax(&mut self, node: NodeId, dist: f32, parent: Option<NodeId>) -> bool {
        let i = node.index();
        if dist < self.dist[i] {
            if self.dist[i].is_infinite() && !self.settled[i] {
                self.touched.push(node.0);
            }
            self.dist[i] = dist;
            self.parent[i] = parent.map(|p| p.0).unwrap_or(u32::MAX);
            self.heap.push(FrontierEntry { dist, node });
            true
        } else {
            false
        }
    }

    /// Credit the settled node's ancestors for pivot selection.
    ///
    /// Only the immediate parent chain up to a short cap is credited; deep
    /// chains contribute the same pivots with or without full propagation.
    pub fn credit_ancestors(&mut self, node: NodeId) {
        let mut current = self.parent[node.index()];
        let mut hops = 0;
        while current != u32::MAX && hops < 4 {
            self.subtree[current as usize] += 1;
            current = self.parent[current as usize];
            hops += 1;
        }
    }

    /// Reduction step: drop heap entries dominated by settled state and
    /// return the pivot set (settled vertices with the largest subtrees).
    pub fn reduce_frontier(&mut self, k: usize) -> Vec<NodeId> {
        // Compact the heap, discarding stale entries
        let entries: Vec<FrontierEntry> = self.heap.drain().collect();
        for e in entries {
            let i = e.node.index();
            if !self.settled[i] && e.dist <= self.dist[i] {
                self.heap.push(e);
            }
        }

        // Pivots: largest settled subtrees in the current window
        let mut pivots: Vec<NodeId> = self.window.clone();
        pivots.sort_by(|a, b| {
            self.subtree[b.index()]
                .cmp(&self.subtree[a.index()])
                .then_with(|| a.cmp(b))
        });
        pivots.truncate(k);
        self.window.clear();
        pivots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_scale_with_n() {
        let small = FrontierParams::for_node_count(4);
        assert!(small.t >= 1 && small.k >= 1);

        let big = FrontierParams::for_node_count(1_000_000);
        assert!(big.t > small.t);
        assert!(big.t >= big.k);
    }

    #[test]
    fn test_heap_pops_smallest_distance() {
        let mut ws = FreWorkspace::default();
        ws.prepare(8);
        ws.relax(NodeId(3), 5.0, None);
        ws.relax(NodeId(1), 2.0, None);
        ws.relax(NodeId(2), 9.0, None);

        let first = ws.heap.pop().unwrap();
        assert_eq!(first.node, NodeId(1));
        assert_eq!(first.dist, 2.0);
    }

    #[test]
    fn test_heap_tie_breaks_on_node_id() {
        let mut ws = FreWorkspace::default();
        ws.prepare(8);
        ws.relax(NodeId(7), 1.0, None);
        ws.relax(NodeId(2), 1.0, None);
        assert_eq!(ws.heap.pop().unwrap().node, NodeId(2));
    }

    #[test]
    fn test_relax_keeps_best_distance() {
        let mut ws = FreWorkspace::default();
        ws.prepare(8);
        assert!(ws.relax(NodeId(1), 5.0, None));
        assert!(ws.relax(NodeId(1), 3.0, Some(NodeId(0))));
        assert!(!ws.relax(NodeId(1), 4.0, None));
        assert_eq!(ws.dist[1], 3.0);
        assert_eq!(ws.parent[1], 0);
    }

    #[test]
    fn test_prepare_resets_touched_state_only() {
        let mut ws = FreWorkspace::default();
        ws.prepare(8);
        ws.relax(NodeId(1), 1.0, None);
        ws.settled[1] = true;

        ws.prepare(8);
        assert!(ws.dist[1].is_infinite());
        assert!(!ws.settled[1]);
        assert!(ws.heap.is_empty());
    }

    #[test]
    fn test_reduce_frontier_drops_stale_entries() {
        let mut ws = FreWorkspace::default();
        ws.prepare(8);
        ws.relax(NodeId(1), 5.0, None);
        ws.relax(NodeId(1), 2.0, None); // supersedes the 5.0 entry
        ws.settled[2] = true;
        ws.relax(NodeId(3), 1.0, None);
        // Settle node 3 so its entry is also stale
        ws.settled[3] = true;

        ws.reduce_frontier(2);
        // Only the live entry for node 1 at dist 2.0 survives
        assert_eq!(ws.heap.len(), 1);
        let e = ws.heap.pop().unwrap();
        assert_eq!(e.node, NodeId(1));
        assert_eq!(e.dist, 2.0);
    }

    #[test]
    fn test_pivot_selection_prefers_large_subtrees() {
        let mut ws = FreWorkspace::default();
        ws.prepare(8);
        ws.touched.extend([1, 2, 3]);
        ws.window = vec![NodeId(1), NodeId(2), NodeId(3)];
        ws.subtree[1] = 5;
        ws.subtree[2] = 9;
        ws.subtree[3] = 1;

        let pivots = ws.reduce_frontier(2);
        assert_eq!(pivots, vec![NodeId(2), NodeId(1)]);
    }
}
