//! # Agrama
//!
//! A temporal knowledge-graph database built as a substrate for AI coding
//! agents: a temporal file store with anchor+delta history, three query
//! indices (BM25, HNSW, graph traversal) fused by a hybrid engine, a
//! primitive execution layer driven over JSON-RPC, and a CRDT
//! collaboration layer for concurrent agents.
//!
//! # Quick Start
//!
//! ```no_run
//! use agrama::{Agrama, AgramaConfig};
//! use serde_json::json;
//!
//! fn main() -> agrama::AgramaResult<()> {
//!     let db = Agrama::new(AgramaConfig::default())?;
//!
//!     // Store content; it is indexed for lexical and semantic search
//!     db.execute("agent-1", "store", &json!({
//!         "key": "src/main.rs",
//!         "value": "fn main() { println!(\"hello\"); }",
//!     }))?;
//!
//!     // Link knowledge-graph structure
//!     db.execute("agent-1", "link", &json!({
//!         "from": "src/main.rs", "to": "src/lib.rs", "relation": "imports",
//!     }))?;
//!
//!     // Query across all three indices
//!     let hits = db.execute("agent-1", "search", &json!({
//!         "query": "main function", "mode": "hybrid",
//!         "options": {"root": "src/main.rs"},
//!     }))?;
//!     println!("{}", hits);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The [`Agrama`] handle is the embedded-mode entry point; the JSON-RPC
//! surface reaches the same [`PrimitiveEngine`] through a
//! [`Dispatcher`]. Internal crates (storage, search, graph, collab) are
//! re-exported for advanced embedding but the primitive surface is the
//! stable API.

#![warn(missing_docs)]
#![warn(clippy::all)]

use agrama_collab::{ConflictStrategy, CrdtEngine, CrdtOperation, SessionConfig, SessionRegistry};
use agrama_core::{AgramaError, ArenaPool, PathValidator, SafeTimer};
use agrama_graph::{FreConfig, FreEngine};
use agrama_search::{
    Bm25Config, Bm25Index, CacheConfig, HnswConfig, HnswIndex, HybridEngine, QueryEmbedder,
};
use agrama_store::{GraphExport, GraphStore, SerializedRecord, TemporalStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::sync::Arc;

pub use agrama_collab::{ConflictStrategy as CrdtConflictStrategy, Edit};
pub use agrama_core::{AgramaResult, EngineEvent, Limits, Timestamp, Value};
pub use agrama_primitives::{EngineHandles, PrimitiveEngine, ProvenanceRecord, TransformRegistry};
pub use agrama_server::{serve_connection, Dispatcher, EventBroadcaster, EventSubscriber};

/// Construction options for an [`Agrama`] instance
#[derive(Clone)]
pub struct AgramaConfig {
    /// Engine-wide size and retention limits
    pub limits: Limits,
    /// Embedding dimension for the vector index
    pub dimension: usize,
    /// HNSW build and query parameters
    pub hnsw: HnswConfig,
    /// BM25 scoring parameters
    pub bm25: Bm25Config,
    /// Traversal engine parameters
    pub fre: FreConfig,
    /// Session registry limits
    pub sessions: SessionConfig,
    /// Hybrid result-cache sizing
    pub cache: CacheConfig,
    /// CRDT conflict-resolution strategy
    pub conflict_strategy: ConflictStrategy,
    /// Prefixes a key may resolve under when used as filesystem
    /// indirection; empty forbids all path-like use
    pub path_allow_list: Vec<String>,
}

impl Default for AgramaConfig {
    fn default() -> Self {
        AgramaConfig {
            limits: Limits::default(),
            dimension: 256,
            hnsw: HnswConfig::default(),
            bm25: Bm25Config::default(),
            fre: FreConfig::default(),
            sessions: SessionConfig::default(),
            cache: CacheConfig::default(),
            conflict_strategy: ConflictStrategy::default(),
            path_allow_list: Vec::new(),
        }
    }
}

/// The database handle
///
/// Cheap to clone; all components are shared behind `Arc`.
#[derive(Clone)]
pub struct Agrama {
    engine: Arc<PrimitiveEngine>,
    broadcaster: Arc<EventBroadcaster>,
    path_validator: Arc<PathValidator>,
}

impl Agrama {
    /// Wire up a new in-memory instance
    pub fn new(config: AgramaConfig) -> AgramaResult<Self> {
        let limits = config.limits.clone();
        let store = Arc::new(TemporalStore::new(limits.clone()));
        let graph = Arc::new(GraphStore::new());
        let bm25 = Arc::new(Bm25Index::new(config.bm25.clone()));
        let hnsw = Arc::new(RwLock::new(HnswIndex::new(
            config.dimension,
            config.hnsw.clone(),
        )?));
        let fre = Arc::new(FreEngine::new(config.fre.clone()));
        let transforms = Arc::new(TransformRegistry::builtin());

        // The semantic component embeds query text with the same transform
        // that indexes stored values
        let dimension = config.dimension;
        let embed_transforms = Arc::clone(&transforms);
        let embedder: QueryEmbedder = Arc::new(move |text: &str| {
            embed_transforms
                .apply(
                    "generate_embedding",
                    text.as_bytes(),
                    &json!({ "dimension": dimension }),
                )
                .ok()
                .and_then(|out| {
                    out["embedding"].as_array().map(|v| {
                        v.iter()
                            .filter_map(Json::as_f64)
                            .map(|f| f as f32)
                            .collect()
                    })
                })
                .unwrap_or_else(|| vec![0.0; dimension])
        });

        let hybrid = Arc::new(HybridEngine::new(
            Arc::clone(&bm25),
            Arc::clone(&hnsw),
            Arc::clone(&graph),
            Arc::clone(&fre),
            embedder,
            config.cache.clone(),
        ));

        let handles = EngineHandles {
            store,
            graph,
            bm25,
            hnsw,
            fre,
            hybrid,
            crdt: Arc::new(CrdtEngine::new(
                config.conflict_strategy.clone(),
                limits.max_causal_buffer,
            )),
            sessions: Arc::new(SessionRegistry::new(config.sessions.clone())),
            transforms,
            provenance: Arc::new(agrama_primitives::ProvenanceLog::new(
                limits.max_provenance_records,
            )),
            arenas: Arc::new(ArenaPool::new(32)),
            limits,
            timer: Arc::new(SafeTimer::new()),
        };

        let broadcaster = Arc::new(EventBroadcaster::default());
        let sink_broadcaster = Arc::clone(&broadcaster);
        let engine = Arc::new(PrimitiveEngine::with_sink(
            handles,
            Arc::new(move |event| sink_broadcaster.publish(&event)),
        ));

        let path_validator = Arc::new(
            PathValidator::new(config.path_allow_list).with_limits(config.limits),
        );

        Ok(Agrama {
            engine,
            broadcaster,
            path_validator,
        })
    }

    /// Execute a primitive as `agent_id`
    pub fn execute(&self, agent_id: &str, primitive: &str, params: &Json) -> AgramaResult<Json> {
        self.engine.execute(agent_id, primitive, params)
    }

    /// The underlying primitive engine
    pub fn engine(&self) -> &Arc<PrimitiveEngine> {
        &self.engine
    }

    /// Shared component handles
    pub fn handles(&self) -> &EngineHandles {
        self.engine.handles()
    }

    /// A dispatcher serving this instance over JSON-RPC
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.engine))
    }

    /// Serve one line-delimited JSON-RPC connection until EOF
    pub fn serve(
        &self,
        reader: impl std::io::BufRead,
        writer: impl std::io::Write,
    ) -> std::io::Result<()> {
        serve_connection(&self.dispatcher(), reader, writer)
    }

    /// Subscribe to the broadcast event feed
    pub fn subscribe(&self) -> EventSubscriber {
        self.broadcaster.subscribe()
    }

    /// Validate a key that is about to be interpreted as a filesystem
    /// path. Keys are opaque everywhere else; this boundary is the only
    /// place allow-list confinement applies.
    pub fn validate_path(&self, key: &str) -> AgramaResult<()> {
        self.path_validator
            .validate(key)
            .map_err(|e| AgramaError::invalid_key(key, e.to_string()))
    }

    /// Run periodic maintenance: idle-session reaping and history retention
    pub fn maintain(&self) {
        let handles = self.engine.handles();
        let now = handles.timer.now();
        for event in handles.sessions.reap_idle(now) {
            self.broadcaster.publish(&event);
        }
        let stats = handles.store.apply_retention(now);
        if stats.entries_pruned > 0 {
            tracing::debug!(
                pruned = stats.entries_pruned,
                scanned = stats.keys_scanned,
                "retention sweep"
            );
        }
    }

    // ========================================================================
    // Persistence hook
    // ========================================================================

    /// Serialize the full engine state into an opaque snapshot
    pub fn snapshot(&self) -> AgramaResult<Vec<u8>> {
        let handles = self.engine.handles();
        let snapshot = Snapshot {
            records: handles.store.export(),
            // Graph metadata is JSON-typed, so the graph rides as JSON text
            // inside the binary envelope
            graph_json: serde_json::to_string(&handles.graph.export())?,
            vectors: handles.hnsw.read().export(),
            crdt: handles.crdt.export(),
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    /// Restore a snapshot, replacing all current state.
    ///
    /// The temporal store, both indices, the graph, and the CRDT logs are
    /// rebuilt together so a reopened instance is mutually consistent.
    pub fn restore(&self, bytes: &[u8]) -> AgramaResult<()> {
        let snapshot: Snapshot = bincode::deserialize(bytes)?;
        let handles = self.engine.handles();

        handles.store.restore(snapshot.records)?;
        let graph: GraphExport = serde_json::from_str(&snapshot.graph_json)?;
        handles.graph.restore(graph);
        handles.hnsw.write().restore(snapshot.vectors)?;
        handles.crdt.restore(snapshot.crdt)?;

        // Rebuild the lexical index and presence flags from the restored
        // records; a reopened instance must agree across all indices.
        for key in handles.store.keys() {
            let record = handles
                .store
                .get(&key)
                .ok_or_else(|| AgramaError::consistency("restored key vanished during rebuild"))?;
            if let Some(text) = record.current().as_text() {
                handles.bm25.add(&key, text);
            }
            handles.graph.mark_present(&key);
        }
        Ok(())
    }
}

/// On-disk snapshot layout (opaque to callers)
#[derive(Serialize, Deserialize)]
struct Snapshot {
    records: Vec<SerializedRecord>,
    graph_json: String,
    vectors: Vec<(String, Vec<f32>)>,
    crdt: Vec<(String, Vec<CrdtOperation>)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_roundtrip() {
        let db = Agrama::new(AgramaConfig::default()).unwrap();
        db.execute("a", "store", &json!({"key": "k", "value": "v"}))
            .unwrap();
        let got = db.execute("a", "retrieve", &json!({"key": "k"})).unwrap();
        assert_eq!(got["value"], "v");
    }

    #[test]
    fn test_snapshot_restore_consistency() {
        let db = Agrama::new(AgramaConfig::default()).unwrap();
        let long = "frontier reduction engine over dense dependency graphs and more";
        db.execute("a", "store", &json!({"key": "doc", "value": long}))
            .unwrap();
        db.execute("a", "link", &json!({"from": "doc", "to": "other", "relation": "refs"}))
            .unwrap();

        let bytes = db.snapshot().unwrap();

        let restored = Agrama::new(AgramaConfig::default()).unwrap();
        restored.restore(&bytes).unwrap();

        // Store, lexical index, vector index, and graph all agree
        let got = restored
            .execute("a", "retrieve", &json!({"key": "doc"}))
            .unwrap();
        assert_eq!(got["exists"], true);
        assert!(restored.handles().bm25.contains("doc"));
        assert!(restored.handles().hnsw.read().contains("doc"));
        assert!(restored.handles().graph.edge("doc", "other", "refs").is_some());
    }

    #[test]
    fn test_path_allow_list_confinement() {
        let config = AgramaConfig {
            path_allow_list: vec!["workspace".to_string()],
            ..AgramaConfig::default()
        };
        let db = Agrama::new(config).unwrap();

        assert!(db.validate_path("workspace/src/main.rs").is_ok());
        assert!(db.validate_path("etc/passwd").is_err());
        assert!(db.validate_path("workspace/../etc/passwd").is_err());
        assert!(db.validate_path("/workspace/abs").is_err());

        // Keys outside the allow-list are still fine as opaque store keys
        db.execute("a", "store", &json!({"key": "etc/notes", "value": "v"}))
            .unwrap();
    }

    #[test]
    fn test_event_feed() {
        let db = Agrama::new(AgramaConfig::default()).unwrap();
        let feed = db.subscribe();
        db.execute("a", "store", &json!({"key": "k", "value": "v"}))
            .unwrap();
        let kinds: Vec<&str> = feed.drain().iter().map(|e| e.kind()).collect();
        assert!(kinds.contains(&"agent_joined"));
        assert!(kinds.contains(&"primitive_executed"));
    }
}
