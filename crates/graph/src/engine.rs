//! Bounded shortest-path engine
//!
//! Single- and multi-source shortest path over a [`GraphSnapshot`], with
//! the frontier-reduction structure enabled on dense graphs: vertices are
//! settled in blocks of `t`, and every `k` blocks the frontier is compacted
//! and pivots (largest settled subtrees) are selected. On sparse graphs the
//! same loop runs as a plain priority-queue traversal; results are
//! identical either way.
//!
//! Explicitly dangling nodes are traversed as waypoints but never appear
//! in results.

use crate::frontier::{FrontierParams, FreWorkspace};
use agrama_core::{AgramaError, AgramaResult, Deadline};
use agrama_store::{Direction, GraphSnapshot, GraphStats, NodeId};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

/// Whether a query runs with frontier reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalStrategy {
    /// Decide per query from [`should_use_fre`] and the node floor
    #[default]
    Auto,
    /// Always run the reduction steps
    Always,
    /// Plain priority-queue traversal
    Never,
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct FreConfig {
    /// Hard cap on settled vertices per query; 0 = unlimited
    pub max_settled: usize,
    /// Retained pooled workspaces
    pub workspace_pool: usize,
    /// Node-count floor below which frontier reduction is never used
    pub min_nodes_for_reduction: usize,
    /// Reduction strategy
    pub strategy: TraversalStrategy,
}

impl Default for FreConfig {
    fn default() -> Self {
        FreConfig {
            max_settled: 0,
            workspace_pool: 8,
            min_nodes_for_reduction: 128,
            strategy: TraversalStrategy::Auto,
        }
    }
}

/// Per-query execution counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    /// Vertices settled
    pub settled: usize,
    /// Edge relaxations attempted
    pub edges_scanned: usize,
    /// Frontier reduction steps executed
    pub reductions: usize,
    /// Whether the distance bound cut the traversal short
    pub bound_hit: bool,
    /// Whether frontier reduction was active
    pub used_frontier_reduction: bool,
}

/// Distances plus the relaxation tree for one traversal
#[derive(Debug, Clone, Default)]
pub struct TraversalResult {
    /// `(key, distance)` for every settled non-dangling vertex, distance
    /// ascending with key tie-break
    pub distances: Vec<(String, f32)>,
    /// Relaxation-tree edges as `(parent_key, child_key)`
    pub tree_edges: Vec<(String, String)>,
    /// Execution counters
    pub stats: TraversalStats,
}

/// Impact analysis output
#[derive(Debug, Clone, Default)]
pub struct ImpactResult {
    /// Affected keys, nearest first
    pub affected: Vec<(String, f32)>,
    /// Longest affected chains, one path per farthest vertex
    pub critical_paths: Vec<Vec<String>>,
    /// Edges scanned per settled vertex; a proxy for propagation cost
    pub complexity_estimate: f64,
}

/// Decide whether frontier reduction pays for itself.
///
/// Frontier reduction does `m * (ln n)^(2/3)` work against the plain
/// traversal's `m + n * ln n`; it is used when the former is smaller.
pub fn should_use_fre(stats: &GraphStats) -> bool {
    let n = stats.nodes as f64;
    let m = stats.edges as f64;
    if n < 2.0 || m == 0.0 {
        return false;
    }
    let ln_n = n.ln();
    m * ln_n.powf(2.0 / 3.0) < m + n * ln_n
}

/// The traversal engine. Stateless besides the workspace pool.
pub struct FreEngine {
    config: FreConfig,
    workspaces: Mutex<Vec<FreWorkspace>>,
}

impl Default for FreEngine {
    fn default() -> Self {
        Self::new(FreConfig::default())
    }
}

impl FreEngine {
    /// Create an engine
    pub fn new(config: FreConfig) -> Self {
        FreEngine {
            workspaces: Mutex::new(Vec::new()),
            config,
        }
    }

    fn checkout_workspace(&self) -> FreWorkspace {
        self.workspaces.lock().pop().unwrap_or_default()
    }

    fn giveback_workspace(&self, ws: FreWorkspace) {
        let mut pool = self.workspaces.lock();
        if pool.len() < self.config.workspace_pool {
            pool.push(ws);
        }
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Single-source bounded shortest path.
    ///
    /// Returns `(key, distance)` for every vertex within `distance_bound`
    /// of `source`. A bound of 0 returns only the source.
    pub fn single_source(
        &self,
        snapshot: &GraphSnapshot,
        source: &str,
        distance_bound: f32,
        deadline: &Deadline,
    ) -> AgramaResult<TraversalResult> {
        let id = snapshot
            .id_of(source)
            .ok_or_else(|| AgramaError::node_missing(source))?;
        self.run(
            snapshot,
            &[id],
            Direction::Forward,
            Bound::Distance(distance_bound),
            None,
            deadline,
        )
    }

    /// Dependency closure of `root` up to `max_depth` hops
    pub fn dependencies(
        &self,
        snapshot: &GraphSnapshot,
        root: &str,
        direction: Direction,
        max_depth: usize,
        deadline: &Deadline,
    ) -> AgramaResult<TraversalResult> {
        let id = snapshot
            .id_of(root)
            .ok_or_else(|| AgramaError::node_missing(root))?;
        self.run(
            snapshot,
            &[id],
            direction,
            Bound::Hops(max_depth),
            None,
            deadline,
        )
    }

    /// Which vertices are affected when `changed_roots` change, following
    /// reverse edges out to `max_radius` hops
    pub fn impact(
        &self,
        snapshot: &GraphSnapshot,
        changed_roots: &[String],
        max_radius: usize,
        deadline: &Deadline,
    ) -> AgramaResult<ImpactResult> {
        let mut sources = Vec::with_capacity(changed_roots.len());
        for root in changed_roots {
            sources.push(
                snapshot
                    .id_of(root)
                    .ok_or_else(|| AgramaError::node_missing(root))?,
            );
        }
        let result = self.run(
            snapshot,
            &sources,
            Direction::Reverse,
            Bound::Hops(max_radius),
            None,
            deadline,
        )?;

        // Critical paths: walk the relaxation tree back from the farthest
        // affected vertices.
        let mut parent_of: rustc_hash::FxHashMap<&str, &str> = rustc_hash::FxHashMap::default();
        for (parent, child) in &result.tree_edges {
            parent_of.insert(child.as_str(), parent.as_str());
        }
        let mut farthest: Vec<&(String, f32)> = result.distances.iter().collect();
        farthest.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        let critical_paths: Vec<Vec<String>> = farthest
            .iter()
            .take(3)
            .filter(|(_, d)| *d > 0.0)
            .map(|(key, _)| {
                let mut path = vec![key.clone()];
                let mut current = key.as_str();
                while let Some(&parent) = parent_of.get(current) {
                    path.push(parent.to_string());
                    current = parent;
                }
                path.reverse();
                path
            })
            .collect();

        let complexity_estimate = if result.stats.settled == 0 {
            0.0
        } else {
            result.stats.edges_scanned as f64 / result.stats.settled as f64
        };

        Ok(ImpactResult {
            affected: result.distances,
            critical_paths,
            complexity_estimate,
        })
    }

    /// Whether every target is reachable from some source within
    /// `max_distance`
    pub fn reachability(
        &self,
        snapshot: &GraphSnapshot,
        sources: &[String],
        targets: &[String],
        max_distance: f32,
        deadline: &Deadline,
    ) -> AgramaResult<bool> {
        let mut source_ids = Vec::with_capacity(sources.len());
        for s in sources {
            source_ids.push(
                snapshot
                    .id_of(s)
                    .ok_or_else(|| AgramaError::node_missing(s))?,
            );
        }
        let mut target_ids = FxHashSet::default();
        for t in targets {
            match snapshot.id_of(t) {
                Some(id) => {
                    target_ids.insert(id);
                }
                // An unknown target can never be reached
                None => return Ok(false),
            }
        }
        if target_ids.is_empty() {
            return Ok(true);
        }

        let result = self.run(
            snapshot,
            &source_ids,
            Direction::Forward,
            Bound::Distance(max_distance),
            Some(&target_ids),
            deadline,
        )?;

        let settled: FxHashSet<&str> = result.distances.iter().map(|(k, _)| k.as_str()).collect();
        Ok(targets.iter().all(|t| settled.contains(t.as_str())))
    }

    // ========================================================================
    // Core loop
    // ========================================================================

    fn run(
        &self,
        snapshot: &GraphSnapshot,
        sources: &[NodeId],
        direction: Direction,
        bound: Bound,
        targets: Option<&FxHashSet<NodeId>>,
        deadline: &Deadline,
    ) -> AgramaResult<TraversalResult> {
        let n = snapshot.node_count();
        let mut ws = self.checkout_workspace();
        ws.prepare(n);

        let graph_stats = GraphStats {
            nodes: n,
            edges: snapshot.edge_count(),
            present_nodes: 0,
        };
        let reduce = match self.config.strategy {
            TraversalStrategy::Always => true,
            TraversalStrategy::Never => false,
            TraversalStrategy::Auto => {
                n >= self.config.min_nodes_for_reduction && should_use_fre(&graph_stats)
            }
        };
        let params = FrontierParams::for_node_count(n);

        let mut stats = TraversalStats {
            used_frontier_reduction: reduce,
            ..TraversalStats::default()
        };

        for &s in sources {
            ws.relax(s, 0.0, None);
        }

        let mut remaining_targets = targets.map(|t| t.len()).unwrap_or(usize::MAX);
        let mut settled_order: Vec<NodeId> = Vec::new();
        let mut in_block = 0usize;
        let mut blocks_since_reduce = 0usize;

        let outcome: AgramaResult<()> = loop {
            let Some(entry) = ws.heap.pop() else {
                break Ok(());
            };
            let i = entry.node.index();
            if ws.settled[i] || entry.dist > ws.dist[i] {
                continue;
            }
            if let Bound::Distance(b) = bound {
                if entry.dist > b {
                    stats.bound_hit = true;
                    break Ok(());
                }
            }

            ws.settled[i] = true;
            ws.window.push(entry.node);
            ws.credit_ancestors(entry.node);
            settled_order.push(entry.node);
            stats.settled += 1;

            if stats.settled % 64 == 0 && deadline.expired() {
                break Err(AgramaError::deadline_exceeded(
                    "graph traversal",
                    deadline.elapsed_ms(),
                ));
            }

            if let Some(t) = targets {
                if t.contains(&entry.node) {
                    remaining_targets -= 1;
                    if remaining_targets == 0 {
                        break Ok(());
                    }
                }
            }
            if self.config.max_settled > 0 && stats.settled >= self.config.max_settled {
                stats.bound_hit = true;
                break Ok(());
            }

            // Hop-bounded traversals stop expanding at the depth limit
            let expand = match bound {
                Bound::Hops(max) => (entry.dist as usize) < max,
                Bound::Distance(_) => true,
            };
            if expand {
                for (next, weight) in snapshot.edges_from(entry.node, direction) {
                    stats.edges_scanned += 1;
                    let step = match bound {
                        Bound::Hops(_) => 1.0,
                        Bound::Distance(_) => weight,
                    };
                    let next_dist = entry.dist + step;
                    if !ws.settled[next.index()] {
                        ws.relax(next, next_dist, Some(entry.node));
                    }
                }
            }

            if reduce {
                in_block += 1;
                if in_block >= params.t {
                    in_block = 0;
                    blocks_since_reduce += 1;
                    if blocks_since_reduce >= params.k {
                        blocks_since_reduce = 0;
                        ws.reduce_frontier(params.k);
                        stats.reductions += 1;
                    }
                }
            }
        };

        if let Err(e) = outcome {
            self.giveback_workspace(ws);
            return Err(e);
        }

        // Assemble results, excluding dangling vertices
        let mut distances: Vec<(String, f32)> = settled_order
            .iter()
            .filter(|&&id| !snapshot.is_dangling(id))
            .map(|&id| (snapshot.key_of(id).to_string(), ws.dist[id.index()]))
            .collect();
        distances.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let tree_edges: Vec<(String, String)> = settled_order
            .iter()
            .filter(|&&id| ws.parent[id.index()] != u32::MAX)
            .map(|&id| {
                let parent = NodeId(ws.parent[id.index()]);
                (
                    snapshot.key_of(parent).to_string(),
                    snapshot.key_of(id).to_string(),
                )
            })
            .collect();

        self.giveback_workspace(ws);
        Ok(TraversalResult {
            distances,
            tree_edges,
            stats,
        })
    }
}

/// Traversal termination bound
#[derive(Debug, Clone, Copy)]
enum Bound {
    /// Weighted distance cutoff
    Distance(f32),
    /// Hop-count cutoff (uniform edge cost)
    Hops(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrama_core::{Metadata, Timestamp};
    use agrama_store::GraphStore;

    fn diamond() -> GraphStore {
        // a -> b (1), a -> c (4), b -> c (1), c -> d (1)
        let g = GraphStore::new();
        let md = Metadata::new;
        g.link("a", "b", "e", 1.0, md(), Timestamp(1)).unwrap();
        g.link("a", "c", "e", 4.0, md(), Timestamp(1)).unwrap();
        g.link("b", "c", "e", 1.0, md(), Timestamp(1)).unwrap();
        g.link("c", "d", "e", 1.0, md(), Timestamp(1)).unwrap();
        g
    }

    fn distances_of(result: &TraversalResult) -> std::collections::HashMap<String, f32> {
        result.distances.iter().cloned().collect()
    }

    #[test]
    fn test_single_source_shortest_paths() {
        let g = diamond();
        let engine = FreEngine::default();
        let result = engine
            .single_source(&g.snapshot(), "a", 100.0, &Deadline::unbounded())
            .unwrap();
        let d = distances_of(&result);
        assert_eq!(d["a"], 0.0);
        assert_eq!(d["b"], 1.0);
        assert_eq!(d["c"], 2.0); // via b, not the direct 4.0 edge
        assert_eq!(d["d"], 3.0);
    }

    #[test]
    fn test_single_source_missing_node() {
        let g = diamond();
        let engine = FreEngine::default();
        let err = engine
            .single_source(&g.snapshot(), "zzz", 10.0, &Deadline::unbounded())
            .unwrap_err();
        assert!(matches!(err, AgramaError::NodeMissing { .. }));
    }

    #[test]
    fn test_zero_bound_returns_only_source() {
        let g = diamond();
        let engine = FreEngine::default();
        let result = engine
            .single_source(&g.snapshot(), "a", 0.0, &Deadline::unbounded())
            .unwrap();
        assert_eq!(result.distances, vec![("a".to_string(), 0.0)]);
        assert!(result.stats.bound_hit);
    }

    #[test]
    fn test_distance_bound_cuts_traversal() {
        let g = diamond();
        let engine = FreEngine::default();
        let result = engine
            .single_source(&g.snapshot(), "a", 2.0, &Deadline::unbounded())
            .unwrap();
        let d = distances_of(&result);
        assert!(d.contains_key("c"));
        assert!(!d.contains_key("d"));
    }

    #[test]
    fn test_dependencies_reverse_direction() {
        let g = GraphStore::new();
        let md = Metadata::new;
        // Dependency edges: dependent -> dependency
        g.link("db", "core", "depends_on", 1.0, md(), Timestamp(1)).unwrap();
        g.link("fre", "core", "depends_on", 1.0, md(), Timestamp(1)).unwrap();
        g.link("webapp", "db", "depends_on", 1.0, md(), Timestamp(1)).unwrap();
        g.link("webapp", "fre", "depends_on", 1.0, md(), Timestamp(1)).unwrap();
        g.link("ui", "webapp", "depends_on", 1.0, md(), Timestamp(1)).unwrap();

        let engine = FreEngine::default();
        // Everything ui transitively depends on
        let result = engine
            .dependencies(&g.snapshot(), "ui", Direction::Forward, 4, &Deadline::unbounded())
            .unwrap();
        let keys: Vec<&str> = result.distances.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys.len(), 5);
        for k in ["ui", "webapp", "db", "fre", "core"] {
            assert!(keys.contains(&k), "missing {}", k);
        }

        // Everything that depends on core
        let result = engine
            .dependencies(&g.snapshot(), "core", Direction::Reverse, 4, &Deadline::unbounded())
            .unwrap();
        assert_eq!(result.distances.len(), 5);
    }

    #[test]
    fn test_dependencies_depth_limit() {
        let g = GraphStore::new();
        let md = Metadata::new;
        g.link("a", "b", "e", 1.0, md(), Timestamp(1)).unwrap();
        g.link("b", "c", "e", 1.0, md(), Timestamp(1)).unwrap();
        g.link("c", "d", "e", 1.0, md(), Timestamp(1)).unwrap();

        let engine = FreEngine::default();
        let result = engine
            .dependencies(&g.snapshot(), "a", Direction::Forward, 2, &Deadline::unbounded())
            .unwrap();
        let d = distances_of(&result);
        assert!(d.contains_key("c"));
        assert!(!d.contains_key("d"));
    }

    #[test]
    fn test_dependencies_heavy_edges_count_as_one_hop() {
        let g = GraphStore::new();
        g.link("a", "b", "e", 50.0, Metadata::new(), Timestamp(1)).unwrap();
        let engine = FreEngine::default();
        let result = engine
            .dependencies(&g.snapshot(), "a", Direction::Forward, 1, &Deadline::unbounded())
            .unwrap();
        assert!(distances_of(&result).contains_key("b"));
    }

    #[test]
    fn test_impact() {
        let g = GraphStore::new();
        let md = Metadata::new;
        g.link("db", "core", "depends_on", 1.0, md(), Timestamp(1)).unwrap();
        g.link("webapp", "db", "depends_on", 1.0, md(), Timestamp(1)).unwrap();
        g.link("ui", "webapp", "depends_on", 1.0, md(), Timestamp(1)).unwrap();

        let engine = FreEngine::default();
        let impact = engine
            .impact(&g.snapshot(), &["core".to_string()], 10, &Deadline::unbounded())
            .unwrap();
        let keys: Vec<&str> = impact.affected.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["core", "db", "webapp", "ui"]);
        assert!(!impact.critical_paths.is_empty());
        // The longest chain runs from core out to ui
        assert_eq!(impact.critical_paths[0][0], "core");
        assert_eq!(impact.critical_paths[0][impact.critical_paths[0].len() - 1], "ui");
        assert!(impact.complexity_estimate >= 0.0);
    }

    #[test]
    fn test_reachability() {
        let g = diamond();
        let engine = FreEngine::default();
        let snap = g.snapshot();
        let dl = Deadline::unbounded();

        assert!(engine
            .reachability(&snap, &["a".into()], &["d".into()], 10.0, &dl)
            .unwrap());
        assert!(!engine
            .reachability(&snap, &["a".into()], &["d".into()], 2.0, &dl)
            .unwrap());
        assert!(!engine
            .reachability(&snap, &["d".into()], &["a".into()], 10.0, &dl)
            .unwrap());
        // Unknown target is unreachable, not an error
        assert!(!engine
            .reachability(&snap, &["a".into()], &["ghost".into()], 10.0, &dl)
            .unwrap());
    }

    #[test]
    fn test_dangling_nodes_excluded_from_results() {
        let g = diamond();
        g.mark_dangling("c");
        let engine = FreEngine::default();
        let result = engine
            .single_source(&g.snapshot(), "a", 100.0, &Deadline::unbounded())
            .unwrap();
        let d = distances_of(&result);
        assert!(!d.contains_key("c"));
        // Paths still route through the dangling waypoint
        assert_eq!(d["d"], 3.0);
    }

    #[test]
    fn test_deterministic_results() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let g = GraphStore::new();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..600 {
            let a = rng.gen_range(0..80);
            let b = rng.gen_range(0..80);
            if a != b {
                let _ = g.link(
                    &format!("n{}", a),
                    &format!("n{}", b),
                    "e",
                    rng.gen_range(0.1..5.0),
                    Metadata::new(),
                    Timestamp(1),
                );
            }
        }
        let engine = FreEngine::default();
        let snap = g.snapshot();
        let r1 = engine
            .single_source(&snap, "n0", 50.0, &Deadline::unbounded())
            .unwrap();
        let r2 = engine
            .single_source(&snap, "n0", 50.0, &Deadline::unbounded())
            .unwrap();
        assert_eq!(r1.distances, r2.distances);
    }

    #[test]
    fn test_reduction_matches_plain_traversal() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        // Dense graph over the reduction floor
        let g = GraphStore::new();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..4000 {
            let a = rng.gen_range(0..200);
            let b = rng.gen_range(0..200);
            if a != b {
                let _ = g.link(
                    &format!("n{}", a),
                    &format!("n{}", b),
                    "e",
                    rng.gen_range(0.1..2.0),
                    Metadata::new(),
                    Timestamp(1),
                );
            }
        }
        let snap = g.snapshot();
        let dl = Deadline::unbounded();

        let with_reduction = FreEngine::new(FreConfig {
            strategy: TraversalStrategy::Always,
            ..FreConfig::default()
        });
        let plain = FreEngine::new(FreConfig {
            strategy: TraversalStrategy::Never,
            ..FreConfig::default()
        });

        let r1 = with_reduction
            .single_source(&snap, "n0", 30.0, &dl)
            .unwrap();
        let r2 = plain.single_source(&snap, "n0", 30.0, &dl).unwrap();
        assert_eq!(r1.distances, r2.distances);
        assert!(r1.stats.used_frontier_reduction);
        assert!(!r2.stats.used_frontier_reduction);
        assert!(r1.stats.reductions > 0);
    }

    #[test]
    fn test_node_cap() {
        let g = diamond();
        let engine = FreEngine::new(FreConfig {
            max_settled: 2,
            ..FreConfig::default()
        });
        let result = engine
            .single_source(&g.snapshot(), "a", 100.0, &Deadline::unbounded())
            .unwrap();
        assert_eq!(result.distances.len(), 2);
        assert!(result.stats.bound_hit);
    }

    #[test]
    fn test_should_use_fre_crossover() {
        // m * ln(n)^(2/3) < m + n * ln(n) holds when the n*ln(n) heap cost
        // dominates the reduction overhead
        assert!(should_use_fre(&GraphStats {
            nodes: 10_000,
            edges: 12_000,
            present_nodes: 0,
        }));
        // With edges far past the crossover the reduction overhead loses
        assert!(!should_use_fre(&GraphStats {
            nodes: 1_000,
            edges: 200_000,
            present_nodes: 0,
        }));
        assert!(!should_use_fre(&GraphStats {
            nodes: 0,
            edges: 0,
            present_nodes: 0,
        }));
    }
}
