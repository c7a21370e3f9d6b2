//! Hybrid query engine
//!
//! Fans a query out to the lexical (BM25), semantic (HNSW), and graph
//! (traversal) components in parallel, normalizes each component's scores
//! to [0, 1], and combines them as a weighted sum. Ties break by source
//! priority (lexical > semantic > graph), then by key.
//!
//! Results are cached in a bounded LRU keyed by a fingerprint of the query
//! and the index versions; concurrent misses on the same fingerprint
//! coalesce so a single fan-out serves all waiters. A component failure
//! zeroes that component's contribution and flags the response `degraded`
//! instead of failing the query.

use crate::bm25::Bm25Index;
use crate::hnsw::HnswIndex;
use agrama_core::{AgramaError, AgramaResult, Deadline};
use agrama_graph::FreEngine;
use agrama_store::{Direction, GraphStore};
use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3;

/// Component weights for score fusion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    /// Weight of the BM25 component
    pub lexical: f32,
    /// Weight of the vector component
    pub semantic: f32,
    /// Weight of the graph-proximity component
    pub graph: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        HybridWeights {
            lexical: 0.4,
            semantic: 0.4,
            graph: 0.2,
        }
    }
}

impl HybridWeights {
    /// Validate: every weight finite and non-negative, sum positive
    pub fn validate(&self) -> AgramaResult<()> {
        for (name, w) in [
            ("lexical", self.lexical),
            ("semantic", self.semantic),
            ("graph", self.graph),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(AgramaError::invalid_weights(format!(
                    "{} weight must be finite and non-negative",
                    name
                )));
            }
        }
        if self.lexical + self.semantic + self.graph <= 0.0 {
            return Err(AgramaError::invalid_weights("weights sum to zero"));
        }
        Ok(())
    }
}

/// A hybrid query
#[derive(Debug, Clone)]
pub struct HybridQuery {
    /// Query text
    pub text: String,
    /// Result count
    pub k: usize,
    /// Fusion weights
    pub weights: HybridWeights,
    /// Root for the graph component; absent disables graph scoring
    pub graph_root: Option<String>,
    /// Hop limit for the graph component
    pub graph_depth: usize,
    /// Minimum combined score; hits below are dropped
    pub threshold: Option<f32>,
}

impl HybridQuery {
    /// A query with default weights and no graph component
    pub fn text(text: impl Into<String>, k: usize) -> Self {
        HybridQuery {
            text: text.into(),
            k,
            weights: HybridWeights::default(),
            graph_root: None,
            graph_depth: 3,
            threshold: None,
        }
    }
}

/// Per-component scores backing a combined score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    /// Normalized BM25 contribution
    pub lexical: f32,
    /// Normalized vector-similarity contribution
    pub semantic: f32,
    /// Normalized graph-proximity contribution
    pub graph: f32,
}

/// One ranked hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridHit {
    /// Result key
    pub key: String,
    /// Weighted combined score
    pub combined: f32,
    /// Component breakdown
    pub components: ComponentScores,
}

/// Response for a hybrid query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridResponse {
    /// Ranked hits, combined score descending
    pub hits: Vec<HybridHit>,
    /// True when a component failed and its contribution was zeroed
    pub degraded: bool,
}

/// Cache sizing
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum cached responses
    pub entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { entries: 256 }
    }
}

struct CacheInner {
    map: FxHashMap<u64, (u64, HybridResponse)>,
    tick: u64,
}

/// Embedding function applied to query text for the semantic component
pub type QueryEmbedder = Arc<dyn Fn(&str) -> Vec<f32> + Send + Sync>;

/// The hybrid query engine
pub struct HybridEngine {
    bm25: Arc<Bm25Index>,
    hnsw: Arc<RwLock<HnswIndex>>,
    graph: Arc<GraphStore>,
    fre: Arc<FreEngine>,
    embedder: QueryEmbedder,
    cache: Mutex<CacheInner>,
    cache_cap: usize,
    inflight: Mutex<FxHashMap<u64, Arc<FlightSlot>>>,
}

/// Coalescing slot for one in-flight fingerprint
#[derive(Default)]
struct FlightSlot {
    done: Mutex<bool>,
    cv: Condvar,
}

impl HybridEngine {
    /// Create an engine over shared index handles
    pub fn new(
        bm25: Arc<Bm25Index>,
        hnsw: Arc<RwLock<HnswIndex>>,
        graph: Arc<GraphStore>,
        fre: Arc<FreEngine>,
        embedder: QueryEmbedder,
        cache: CacheConfig,
    ) -> Self {
        HybridEngine {
            bm25,
            hnsw,
            graph,
            fre,
            embedder,
            cache: Mutex::new(CacheInner {
                map: FxHashMap::default(),
                tick: 0,
            }),
            cache_cap: cache.entries.max(1),
            inflight: Mutex::new(FxHashMap::default()),
        }
    }

    /// Execute a hybrid query
    pub fn query(&self, query: &HybridQuery, deadline: &Deadline) -> AgramaResult<HybridResponse> {
        query.weights.validate()?;

        let fingerprint = self.fingerprint(query);
        if let Some(hit) = self.cache_get(fingerprint) {
            return Ok(hit);
        }

        // Coalesce concurrent identical fingerprints: the first caller runs
        // the fan-out, the rest wait on its slot and re-read the cache.
        let (slot, leader) = {
            let mut inflight = self.inflight.lock();
            match inflight.get(&fingerprint) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    let slot = Arc::new(FlightSlot::default());
                    inflight.insert(fingerprint, Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if !leader {
            let mut done = slot.done.lock();
            while !*done {
                slot.cv.wait(&mut done);
            }
            if let Some(hit) = self.cache_get(fingerprint) {
                return Ok(hit);
            }
            // Leader failed; fall through and run the fan-out ourselves
        }

        let result = self.fan_out(query, deadline);

        if leader {
            if let Ok(response) = &result {
                self.cache_put(fingerprint, response.clone());
            }
            self.inflight.lock().remove(&fingerprint);
            let mut done = slot.done.lock();
            *done = true;
            slot.cv.notify_all();
        }

        result
    }

    // ========================================================================
    // Fan-out and fusion
    // ========================================================================

    fn fan_out(&self, query: &HybridQuery, deadline: &Deadline) -> AgramaResult<HybridResponse> {
        let w = query.weights;
        // Over-fetch per component so fusion has material to rank
        let fetch = (query.k * 4).max(32);

        let mut lexical: AgramaResult<Vec<(String, f32)>> = Ok(Vec::new());
        let mut semantic: AgramaResult<Vec<(String, f32)>> = Ok(Vec::new());
        let mut graph: AgramaResult<Vec<(String, f32)>> = Ok(Vec::new());

        std::thread::scope(|scope| {
            let lex_handle = (w.lexical > 0.0).then(|| {
                scope.spawn(|| -> AgramaResult<Vec<(String, f32)>> {
                    Ok(self.bm25.search(&query.text, fetch))
                })
            });
            let sem_handle = (w.semantic > 0.0).then(|| {
                scope.spawn(|| -> AgramaResult<Vec<(String, f32)>> {
                    let embedding = (self.embedder)(&query.text);
                    let index = self.hnsw.read();
                    let hits = index.search_with_deadline(&embedding, fetch, deadline)?;
                    // Similarity, higher = closer
                    Ok(hits.into_iter().map(|(k, d)| (k, 1.0 - d)).collect())
                })
            });
            let graph_handle = match (&query.graph_root, w.graph > 0.0) {
                (Some(root), true) => Some(scope.spawn(move || -> AgramaResult<Vec<(String, f32)>> {
                    let snapshot = self.graph.snapshot();
                    let result = self.fre.dependencies(
                        &snapshot,
                        root,
                        Direction::Forward,
                        query.graph_depth,
                        deadline,
                    )?;
                    // Proximity score: nearer vertices rank higher
                    Ok(result
                        .distances
                        .into_iter()
                        .map(|(k, d)| (k, 1.0 / (1.0 + d)))
                        .collect::<Vec<_>>())
                })),
                _ => None,
            };

            if let Some(h) = lex_handle {
                lexical = h.join().unwrap_or_else(|_| Err(panicked("lexical")));
            }
            if let Some(h) = sem_handle {
                semantic = h.join().unwrap_or_else(|_| Err(panicked("semantic")));
            }
            if let Some(h) = graph_handle {
                graph = h.join().unwrap_or_else(|_| Err(panicked("graph")));
            }
        });

        // Deadline cancellations abort the whole query; other component
        // failures degrade it.
        let mut degraded = false;
        let mut unwrap_component =
            |r: AgramaResult<Vec<(String, f32)>>, name: &str| -> AgramaResult<Vec<(String, f32)>> {
                match r {
                    Ok(v) => Ok(v),
                    Err(e @ AgramaError::DeadlineExceeded { .. }) => Err(e),
                    Err(e) => {
                        tracing::warn!(component = name, error = %e, "hybrid component failed");
                        degraded = true;
                        Ok(Vec::new())
                    }
                }
            };
        let lexical = unwrap_component(lexical, "lexical")?;
        let semantic = unwrap_component(semantic, "semantic")?;
        let graph = unwrap_component(graph, "graph")?;

        let lexical = normalize_component(lexical);
        let semantic = normalize_component(semantic);
        let graph = normalize_component(graph);

        // Weighted union
        let mut combined: FxHashMap<String, ComponentScores> = FxHashMap::default();
        for (key, score) in lexical {
            combined.entry(key).or_default().lexical = score;
        }
        for (key, score) in semantic {
            combined.entry(key).or_default().semantic = score;
        }
        for (key, score) in graph {
            combined.entry(key).or_default().graph = score;
        }

        let mut hits: Vec<HybridHit> = combined
            .into_iter()
            .map(|(key, components)| HybridHit {
                combined: w.lexical * components.lexical
                    + w.semantic * components.semantic
                    + w.graph * components.graph,
                key,
                components,
            })
            .collect();

        // Combined desc, then source priority (lexical > semantic > graph),
        // then key asc
        hits.sort_by(|a, b| {
            b.combined
                .partial_cmp(&a.combined)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.components
                        .lexical
                        .partial_cmp(&a.components.lexical)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    b.components
                        .semantic
                        .partial_cmp(&a.components.semantic)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    b.components
                        .graph
                        .partial_cmp(&a.components.graph)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.key.cmp(&b.key))
        });

        if let Some(threshold) = query.threshold {
            hits.retain(|h| h.combined >= threshold);
        }
        hits.truncate(query.k);

        Ok(HybridResponse { hits, degraded })
    }

    // ========================================================================
    // Cache
    // ========================================================================

    fn fingerprint(&self, query: &HybridQuery) -> u64 {
        let mut hasher = Xxh3::new();
        let mut write = |bytes: &[u8]| {
            use std::hash::Hasher;
            hasher.write(bytes);
        };
        write(query.text.as_bytes());
        write(&query.weights.lexical.to_bits().to_le_bytes());
        write(&query.weights.semantic.to_bits().to_le_bytes());
        write(&query.weights.graph.to_bits().to_le_bytes());
        write(&(query.k as u64).to_le_bytes());
        write(&(query.graph_depth as u64).to_le_bytes());
        if let Some(root) = &query.graph_root {
            write(root.as_bytes());
        }
        if let Some(t) = query.threshold {
            write(&t.to_bits().to_le_bytes());
        }
        // Index versions: any write invalidates dependent fingerprints
        write(&self.bm25.version().to_le_bytes());
        write(&self.hnsw.read().version().to_le_bytes());
        write(&self.graph.version().to_le_bytes());
        use std::hash::Hasher;
        hasher.finish()
    }

    fn cache_get(&self, fingerprint: u64) -> Option<HybridResponse> {
        let mut cache = self.cache.lock();
        cache.tick += 1;
        let tick = cache.tick;
        let entry = cache.map.get_mut(&fingerprint)?;
        entry.0 = tick;
        Some(entry.1.clone())
    }

    fn cache_put(&self, fingerprint: u64, response: HybridResponse) {
        let mut cache = self.cache.lock();
        cache.tick += 1;
        let tick = cache.tick;
        if cache.map.len() >= self.cache_cap && !cache.map.contains_key(&fingerprint) {
            // Evict the least-recently-used entry
            if let Some((&oldest, _)) = cache.map.iter().min_by_key(|(_, (used, _))| *used) {
                cache.map.remove(&oldest);
            }
        }
        cache.map.insert(fingerprint, (tick, response));
    }

    /// Number of cached responses (diagnostics)
    pub fn cache_len(&self) -> usize {
        self.cache.lock().map.len()
    }
}

fn panicked(component: &str) -> AgramaError {
    AgramaError::internal(format!("{} component panicked", component))
}

/// Min-max normalize scores to [0, 1] over the returned set.
/// A single-element or constant set normalizes to 1.0.
fn normalize_component(mut scores: Vec<(String, f32)>) -> Vec<(String, f32)> {
    if scores.is_empty() {
        return scores;
    }
    let min = scores.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
    let max = scores
        .iter()
        .map(|(_, s)| *s)
        .fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    for (_, s) in scores.iter_mut() {
        *s = if range > f32::EPSILON {
            (*s - min) / range
        } else {
            1.0
        };
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bm25::Bm25Config;
    use crate::hnsw::HnswConfig;
    use agrama_core::{Metadata, Timestamp};

    /// Deterministic toy embedder: token hash buckets
    fn test_embedder() -> QueryEmbedder {
        Arc::new(|text: &str| {
            let mut v = vec![0.0f32; 64];
            for token in crate::tokenizer::tokenize(text) {
                let mut h: u64 = 1469598103934665603;
                for b in token.bytes() {
                    h ^= b as u64;
                    h = h.wrapping_mul(1099511628211);
                }
                v[(h % 64) as usize] += 1.0;
            }
            v
        })
    }

    fn engine() -> HybridEngine {
        let bm25 = Arc::new(Bm25Index::new(Bm25Config::default()));
        let hnsw = Arc::new(RwLock::new(
            HnswIndex::new(64, HnswConfig::default()).unwrap(),
        ));
        let graph = Arc::new(GraphStore::new());
        let fre = Arc::new(FreEngine::default());
        HybridEngine::new(bm25, hnsw, graph, fre, test_embedder(), CacheConfig::default())
    }

    fn populate(e: &HybridEngine) {
        let embed = test_embedder();
        for (key, text) in [
            ("alpha", "frontier reduction engine traversal"),
            ("beta", "vector index embedding search"),
            ("gamma", "temporal store history retention"),
        ] {
            e.bm25.add(key, text);
            e.hnsw.write().insert(key, &embed(text)).unwrap();
        }
        e.graph
            .link("alpha", "beta", "refs", 1.0, Metadata::new(), Timestamp(1))
            .unwrap();
        e.graph
            .link("beta", "gamma", "refs", 1.0, Metadata::new(), Timestamp(1))
            .unwrap();
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let e = engine();
        let mut q = HybridQuery::text("anything", 5);
        q.weights = HybridWeights {
            lexical: 0.0,
            semantic: 0.0,
            graph: 0.0,
        };
        assert!(matches!(
            e.query(&q, &Deadline::unbounded()),
            Err(AgramaError::InvalidWeights { .. })
        ));

        q.weights = HybridWeights {
            lexical: -1.0,
            semantic: 1.0,
            graph: 0.0,
        };
        assert!(e.query(&q, &Deadline::unbounded()).is_err());
    }

    #[test]
    fn test_pure_lexical_matches_bm25_ranking() {
        let e = engine();
        populate(&e);
        let mut q = HybridQuery::text("frontier traversal", 10);
        q.weights = HybridWeights {
            lexical: 1.0,
            semantic: 0.0,
            graph: 0.0,
        };
        let response = e.query(&q, &Deadline::unbounded()).unwrap();
        let bm25 = e.bm25.search("frontier traversal", 10);
        assert_eq!(response.hits.len(), bm25.len());
        assert_eq!(response.hits[0].key, bm25[0].0);
        assert!(response.hits[0].components.semantic == 0.0);
        assert!(!response.degraded);
    }

    #[test]
    fn test_pure_semantic_matches_hnsw_ranking() {
        let e = engine();
        populate(&e);
        let mut q = HybridQuery::text("vector embedding search", 3);
        q.weights = HybridWeights {
            lexical: 0.0,
            semantic: 1.0,
            graph: 0.0,
        };
        let response = e.query(&q, &Deadline::unbounded()).unwrap();
        let embed = test_embedder();
        let hnsw = e
            .hnsw
            .read()
            .search(&embed("vector embedding search"), 3)
            .unwrap();
        assert_eq!(response.hits[0].key, hnsw[0].0);
    }

    #[test]
    fn test_pure_graph_matches_traversal() {
        let e = engine();
        populate(&e);
        let mut q = HybridQuery::text("", 10);
        q.weights = HybridWeights {
            lexical: 0.0,
            semantic: 0.0,
            graph: 1.0,
        };
        q.graph_root = Some("alpha".to_string());
        let response = e.query(&q, &Deadline::unbounded()).unwrap();
        let keys: Vec<&str> = response.hits.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_combined_score_is_weighted_sum() {
        let e = engine();
        populate(&e);
        let mut q = HybridQuery::text("frontier reduction engine traversal", 10);
        q.weights = HybridWeights {
            lexical: 0.3,
            semantic: 0.5,
            graph: 0.2,
        };
        q.graph_root = Some("alpha".to_string());
        let response = e.query(&q, &Deadline::unbounded()).unwrap();
        for hit in &response.hits {
            let expected = 0.3 * hit.components.lexical
                + 0.5 * hit.components.semantic
                + 0.2 * hit.components.graph;
            assert!((hit.combined - expected).abs() < 1e-6);
        }
        // Top hit carries signal from all three components
        let top = &response.hits[0];
        assert_eq!(top.key, "alpha");
        assert!(top.components.lexical > 0.0);
        assert!(top.components.graph > 0.0);
    }

    #[test]
    fn test_threshold_filters() {
        let e = engine();
        populate(&e);
        let mut q = HybridQuery::text("frontier", 10);
        q.threshold = Some(0.99);
        q.weights = HybridWeights {
            lexical: 1.0,
            semantic: 0.0,
            graph: 0.0,
        };
        let response = e.query(&q, &Deadline::unbounded()).unwrap();
        assert!(response.hits.iter().all(|h| h.combined >= 0.99));
    }

    #[test]
    fn test_cache_hit_and_invalidation() {
        let e = engine();
        populate(&e);
        let q = HybridQuery::text("frontier", 5);
        let r1 = e.query(&q, &Deadline::unbounded()).unwrap();
        assert_eq!(e.cache_len(), 1);
        let r2 = e.query(&q, &Deadline::unbounded()).unwrap();
        assert_eq!(r1, r2);

        // A write changes the index version, so the fingerprint moves
        e.bm25.add("delta", "frontier of something new");
        let r3 = e.query(&q, &Deadline::unbounded()).unwrap();
        assert!(r3.hits.iter().any(|h| h.key == "delta"));
    }

    #[test]
    fn test_cache_eviction_bounded() {
        let bm25 = Arc::new(Bm25Index::new(Bm25Config::default()));
        let hnsw = Arc::new(RwLock::new(
            HnswIndex::new(64, HnswConfig::default()).unwrap(),
        ));
        let graph = Arc::new(GraphStore::new());
        let fre = Arc::new(FreEngine::default());
        let e = HybridEngine::new(
            bm25,
            hnsw,
            graph,
            fre,
            test_embedder(),
            CacheConfig { entries: 4 },
        );
        for i in 0..20 {
            let q = HybridQuery::text(format!("query {}", i), 5);
            e.query(&q, &Deadline::unbounded()).unwrap();
        }
        assert!(e.cache_len() <= 4);
    }

    #[test]
    fn test_missing_graph_root_degrades() {
        let e = engine();
        populate(&e);
        let mut q = HybridQuery::text("frontier", 5);
        q.weights = HybridWeights {
            lexical: 0.5,
            semantic: 0.0,
            graph: 0.5,
        };
        q.graph_root = Some("no-such-node".to_string());
        let response = e.query(&q, &Deadline::unbounded()).unwrap();
        assert!(response.degraded);
        assert!(response.hits.iter().all(|h| h.components.graph == 0.0));
        // Lexical contribution still present
        assert!(!response.hits.is_empty());
    }

    #[test]
    fn test_concurrent_identical_queries_coalesce() {
        let e = Arc::new(engine());
        populate(&e);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let e = Arc::clone(&e);
            handles.push(std::thread::spawn(move || {
                let q = HybridQuery::text("frontier reduction", 5);
                e.query(&q, &Deadline::unbounded()).unwrap()
            }));
        }
        let results: Vec<HybridResponse> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
        assert_eq!(e.cache_len(), 1);
    }
}
