//! Graph edge store
//!
//! Directed, labeled, weighted edges between keys. Nodes and edges live in
//! arenas addressed by dense integer identifiers; the public `key -> id`
//! map is kept separate so the graph layer never holds owning references
//! between nodes. Duplicate `(from, to, label)` triples overwrite weight
//! and metadata and refresh the timestamp.
//!
//! Traversal reads go through [`GraphSnapshot`], a frozen CSR view built
//! once per graph version and shared by concurrent queries.

use agrama_core::{AgramaError, AgramaResult, Metadata, Timestamp};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;

/// Dense node identifier, stable for the life of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Index form for array addressing
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Dense edge identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

/// One directed edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Source node
    pub from: NodeId,
    /// Target node
    pub to: NodeId,
    /// Relation label
    pub label: String,
    /// Traversal weight (distance contribution)
    pub weight: f32,
    /// Caller metadata
    pub metadata: Metadata,
    /// Last write timestamp
    pub timestamp: Timestamp,
}

/// Direction of a traversal or neighborhood query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Follow edges from source to target
    Forward,
    /// Follow edges from target to source
    Reverse,
    /// Follow edges both ways
    Bidirectional,
}

/// Aggregate graph statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GraphStats {
    /// Total nodes (including dangling references)
    pub nodes: usize,
    /// Total edges
    pub edges: usize,
    /// Nodes backed by a stored record
    pub present_nodes: usize,
}

impl GraphStats {
    /// Average out-degree; 0 for an empty graph
    pub fn density(&self) -> f64 {
        if self.nodes == 0 {
            0.0
        } else {
            self.edges as f64 / self.nodes as f64
        }
    }
}

#[derive(Default)]
struct GraphInner {
    /// id -> key
    keys: Vec<String>,
    /// key -> id (kept separate from node storage)
    ids: FxHashMap<String, NodeId>,
    /// Whether the key has a stored record
    present: Vec<bool>,
    /// Explicitly marked dangling references; excluded from traversal results
    dangling: Vec<bool>,
    /// Edge arena
    edges: Vec<EdgeRecord>,
    /// (from, to, label) -> edge index, for upsert semantics
    triple_index: FxHashMap<(NodeId, NodeId, String), EdgeId>,
    /// Outgoing edge ids per node
    out_adj: Vec<SmallVec<[u32; 4]>>,
    /// Incoming edge ids per node
    in_adj: Vec<SmallVec<[u32; 4]>>,
    /// Bumped on every mutation; versions the snapshot cache
    version: u64,
}

impl GraphInner {
    fn intern(&mut self, key: &str) -> NodeId {
        if let Some(&id) = self.ids.get(key) {
            return id;
        }
        let id = NodeId(self.keys.len() as u32);
        self.keys.push(key.to_string());
        self.ids.insert(key.to_string(), id);
        self.present.push(false);
        self.dangling.push(false);
        self.out_adj.push(SmallVec::new());
        self.in_adj.push(SmallVec::new());
        id
    }
}

/// The shared graph store
pub struct GraphStore {
    inner: RwLock<GraphInner>,
    snapshot_cache: Mutex<Option<(u64, Arc<GraphSnapshot>)>>,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    /// Create an empty graph
    pub fn new() -> Self {
        GraphStore {
            inner: RwLock::new(GraphInner::default()),
            snapshot_cache: Mutex::new(None),
        }
    }

    /// Create or update an edge. Self-loops are rejected.
    pub fn link(
        &self,
        from: &str,
        to: &str,
        label: &str,
        weight: f32,
        metadata: Metadata,
        timestamp: Timestamp,
    ) -> AgramaResult<EdgeId> {
        if from == to {
            return Err(AgramaError::validation("to", "self-loops are not allowed"));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(AgramaError::validation(
                "weight",
                "weight must be finite and non-negative",
            ));
        }

        let mut inner = self.inner.write();
        let from_id = inner.intern(from);
        let to_id = inner.intern(to);

        let triple = (from_id, to_id, label.to_string());
        let edge_id = if let Some(&existing) = inner.triple_index.get(&triple) {
            let edge = &mut inner.edges[existing.0 as usize];
            edge.weight = weight;
            edge.metadata = metadata;
            edge.timestamp = timestamp;
            existing
        } else {
            let id = EdgeId(inner.edges.len() as u32);
            inner.edges.push(EdgeRecord {
                from: from_id,
                to: to_id,
                label: label.to_string(),
                weight,
                metadata,
                timestamp,
            });
            inner.triple_index.insert(triple, id);
            inner.out_adj[from_id.index()].push(id.0);
            inner.in_adj[to_id.index()].push(id.0);
            id
        };
        inner.version += 1;
        Ok(edge_id)
    }

    /// Remove an edge by its triple. Returns whether it existed.
    pub fn remove_edge(&self, from: &str, to: &str, label: &str) -> bool {
        let mut inner = self.inner.write();
        let (from_id, to_id) = match (inner.ids.get(from), inner.ids.get(to)) {
            (Some(&f), Some(&t)) => (f, t),
            _ => return false,
        };
        let triple = (from_id, to_id, label.to_string());
        if let Some(edge_id) = inner.triple_index.remove(&triple) {
            // Tombstone: NaN-weight entries are skipped at snapshot build
            // time. The arena slot itself is retained so edge ids stay
            // stable.
            inner.edges[edge_id.0 as usize].weight = f32::NAN;
            inner.out_adj[from_id.index()].retain(|&mut e| e != edge_id.0);
            inner.in_adj[to_id.index()].retain(|&mut e| e != edge_id.0);
            inner.version += 1;
            true
        } else {
            false
        }
    }

    /// Mark a key as backed by a stored record. Clears any dangling mark.
    pub fn mark_present(&self, key: &str) {
        let mut inner = self.inner.write();
        let id = inner.intern(key);
        if !inner.present[id.index()] || inner.dangling[id.index()] {
            inner.present[id.index()] = true;
            inner.dangling[id.index()] = false;
            inner.version += 1;
        }
    }

    /// Explicitly mark a key as a dangling reference. Dangling nodes are
    /// traversed as waypoints but excluded from traversal results.
    pub fn mark_dangling(&self, key: &str) {
        let mut inner = self.inner.write();
        let id = inner.intern(key);
        if !inner.dangling[id.index()] {
            inner.dangling[id.index()] = true;
            inner.version += 1;
        }
    }

    /// Look up a node id
    pub fn node_id(&self, key: &str) -> Option<NodeId> {
        self.inner.read().ids.get(key).copied()
    }

    /// Outgoing or incoming neighbors of a key
    pub fn neighbors(&self, key: &str, direction: Direction) -> Vec<(String, String, f32)> {
        let inner = self.inner.read();
        let Some(&id) = inner.ids.get(key) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut push_edges = |edge_ids: &SmallVec<[u32; 4]>, forward: bool| {
            for &eid in edge_ids {
                let edge = &inner.edges[eid as usize];
                let other = if forward { edge.to } else { edge.from };
                out.push((
                    inner.keys[other.index()].clone(),
                    edge.label.clone(),
                    edge.weight,
                ));
            }
        };
        match direction {
            Direction::Forward => push_edges(&inner.out_adj[id.index()], true),
            Direction::Reverse => push_edges(&inner.in_adj[id.index()], false),
            Direction::Bidirectional => {
                push_edges(&inner.out_adj[id.index()], true);
                push_edges(&inner.in_adj[id.index()], false);
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        out
    }

    /// Fetch an edge record by triple
    pub fn edge(&self, from: &str, to: &str, label: &str) -> Option<EdgeRecord> {
        let inner = self.inner.read();
        let from_id = *inner.ids.get(from)?;
        let to_id = *inner.ids.get(to)?;
        inner
            .triple_index
            .get(&(from_id, to_id, label.to_string()))
            .map(|eid| inner.edges[eid.0 as usize].clone())
    }

    /// Aggregate statistics
    pub fn stats(&self) -> GraphStats {
        let inner = self.inner.read();
        GraphStats {
            nodes: inner.keys.len(),
            edges: inner.triple_index.len(),
            present_nodes: inner.present.iter().filter(|&&p| p).count(),
        }
    }

    /// Current mutation version
    pub fn version(&self) -> u64 {
        self.inner.read().version
    }

    /// Build (or reuse) the frozen CSR view for traversal
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        let version = self.inner.read().version;
        let mut cache = self.snapshot_cache.lock();
        if let Some((cached_version, snapshot)) = cache.as_ref() {
            if *cached_version == version {
                return Arc::clone(snapshot);
            }
        }
        let snapshot = Arc::new(self.build_snapshot());
        *cache = Some((version, Arc::clone(&snapshot)));
        snapshot
    }

    fn build_snapshot(&self) -> GraphSnapshot {
        let inner = self.inner.read();
        let n = inner.keys.len();

        let build_csr = |adj: &[SmallVec<[u32; 4]>], forward: bool| {
            let mut offsets = Vec::with_capacity(n + 1);
            let mut targets = Vec::new();
            let mut weights = Vec::new();
            offsets.push(0u32);
            for edge_ids in adj {
                for &eid in edge_ids {
                    let edge = &inner.edges[eid as usize];
                    if edge.weight.is_nan() {
                        continue;
                    }
                    let other = if forward { edge.to } else { edge.from };
                    targets.push(other.0);
                    weights.push(edge.weight);
                }
                offsets.push(targets.len() as u32);
            }
            (offsets, targets, weights)
        };

        let (fwd_offsets, fwd_targets, fwd_weights) = build_csr(&inner.out_adj, true);
        let (rev_offsets, rev_targets, rev_weights) = build_csr(&inner.in_adj, false);

        GraphSnapshot {
            keys: inner.keys.clone(),
            ids: inner.ids.clone(),
            present: inner.present.clone(),
            dangling: inner.dangling.clone(),
            fwd_offsets,
            fwd_targets,
            fwd_weights,
            rev_offsets,
            rev_targets,
            rev_weights,
        }
    }

    /// Serialize edges for the opaque persistence hook
    pub fn export(&self) -> GraphExport {
        let inner = self.inner.read();
        GraphExport {
            keys: inner.keys.clone(),
            present: inner.present.clone(),
            dangling: inner.dangling.clone(),
            edges: inner
                .triple_index
                .values()
                .map(|eid| inner.edges[eid.0 as usize].clone())
                .collect(),
        }
    }

    /// Restore from a serialized export, replacing current contents
    pub fn restore(&self, export: GraphExport) {
        let mut inner = self.inner.write();
        *inner = GraphInner::default();
        for (i, key) in export.keys.iter().enumerate() {
            let id = inner.intern(key);
            debug_assert_eq!(id.index(), i);
            inner.present[i] = export.present.get(i).copied().unwrap_or(false);
            inner.dangling[i] = export.dangling.get(i).copied().unwrap_or(false);
        }
        drop(inner);
        for edge in export.edges {
            let from = export.keys[edge.from.index()].clone();
            let to = export.keys[edge.to.index()].clone();
            let _ = self.link(
                &from,
                &to,
                &edge.label,
                edge.weight,
                edge.metadata,
                edge.timestamp,
            );
        }
    }
}

/// Serialized graph contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphExport {
    keys: Vec<String>,
    present: Vec<bool>,
    dangling: Vec<bool>,
    edges: Vec<EdgeRecord>,
}

/// Frozen CSR view of the graph, shared by traversal queries
#[derive(Debug)]
pub struct GraphSnapshot {
    keys: Vec<String>,
    ids: FxHashMap<String, NodeId>,
    present: Vec<bool>,
    dangling: Vec<bool>,
    fwd_offsets: Vec<u32>,
    fwd_targets: Vec<u32>,
    fwd_weights: Vec<f32>,
    rev_offsets: Vec<u32>,
    rev_targets: Vec<u32>,
    rev_weights: Vec<f32>,
}

impl GraphSnapshot {
    /// Number of nodes in the snapshot
    pub fn node_count(&self) -> usize {
        self.keys.len()
    }

    /// Number of directed edges in the snapshot
    pub fn edge_count(&self) -> usize {
        self.fwd_targets.len()
    }

    /// Resolve a key to its id
    pub fn id_of(&self, key: &str) -> Option<NodeId> {
        self.ids.get(key).copied()
    }

    /// Resolve an id to its key
    pub fn key_of(&self, id: NodeId) -> &str {
        &self.keys[id.index()]
    }

    /// Whether the node is backed by a stored record
    pub fn is_present(&self, id: NodeId) -> bool {
        self.present[id.index()]
    }

    /// Whether the node is an explicitly marked dangling reference.
    /// Dangling nodes are traversed as waypoints but never returned in
    /// traversal results.
    pub fn is_dangling(&self, id: NodeId) -> bool {
        self.dangling[id.index()]
    }

    /// Weighted out-edges of `id` in the given direction
    pub fn edges_from(
        &self,
        id: NodeId,
        direction: Direction,
    ) -> impl Iterator<Item = (NodeId, f32)> + '_ {
        let fwd = matches!(direction, Direction::Forward | Direction::Bidirectional);
        let rev = matches!(direction, Direction::Reverse | Direction::Bidirectional);
        let fwd_range = if fwd {
            self.fwd_offsets[id.index()] as usize..self.fwd_offsets[id.index() + 1] as usize
        } else {
            0..0
        };
        let rev_range = if rev {
            self.rev_offsets[id.index()] as usize..self.rev_offsets[id.index() + 1] as usize
        } else {
            0..0
        };
        fwd_range
            .map(move |i| (NodeId(self.fwd_targets[i]), self.fwd_weights[i]))
            .chain(rev_range.map(move |i| (NodeId(self.rev_targets[i]), self.rev_weights[i])))
    }
}
