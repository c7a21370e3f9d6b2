//! Primitive execution engine
//!
//! A registry of `name -> (schema, validator, executor)` entries drives
//! dispatch; there is no dynamic dispatch beyond the function table. Every
//! invocation follows the same contract: auto-register the session,
//! validate parameters, build a context with a pooled arena, execute,
//! return the arena (reset) regardless of outcome, append a provenance
//! record, and emit a broadcast event.

use crate::context::{EngineHandles, PrimitiveContext};
use crate::provenance::ProvenanceRecord;
use agrama_core::{
    merge_metadata, AgramaError, AgramaResult, Deadline, EngineEvent, Metadata, Timestamp, Value,
};
use agrama_collab::Edit;
use agrama_search::{HybridQuery, HybridWeights};
use agrama_store::Direction;
use serde_json::{json, Value as Json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Callback invoked for every broadcast event
pub type EventSink = Arc<dyn Fn(EngineEvent) + Send + Sync>;

type ValidateFn = fn(&Json) -> AgramaResult<()>;
type ExecuteFn = fn(&mut PrimitiveContext, &Json) -> AgramaResult<Json>;

/// One registered primitive
pub struct PrimitiveSpec {
    /// Wire name
    pub name: &'static str,
    /// One-line description for discovery
    pub description: &'static str,
    /// JSON schema of the parameters
    pub input_schema: Json,
    /// JSON schema of the result
    pub output_schema: Json,
    validate: ValidateFn,
    execute: ExecuteFn,
}

/// The primitive execution engine
pub struct PrimitiveEngine {
    handles: EngineHandles,
    specs: Vec<PrimitiveSpec>,
    sink: EventSink,
}

impl PrimitiveEngine {
    /// Create an engine over wired handles with a no-op event sink
    pub fn new(handles: EngineHandles) -> Self {
        Self::with_sink(handles, Arc::new(|_| {}))
    }

    /// Create an engine that publishes events through `sink`
    pub fn with_sink(handles: EngineHandles, sink: EventSink) -> Self {
        PrimitiveEngine {
            handles,
            specs: build_registry(),
            sink,
        }
    }

    /// Shared handles (for embedding callers)
    pub fn handles(&self) -> &EngineHandles {
        &self.handles
    }

    /// Replace the event sink
    pub fn set_sink(&mut self, sink: EventSink) {
        self.sink = sink;
    }

    /// Schemas of every registered primitive
    pub fn list_primitives(&self) -> Json {
        let primitives: Vec<Json> = self
            .specs
            .iter()
            .map(|s| {
                json!({
                    "name": s.name,
                    "description": s.description,
                    "input_schema": s.input_schema,
                    "output_schema": s.output_schema,
                })
            })
            .collect();
        json!({ "primitives": primitives, "count": self.specs.len() })
    }

    /// Execute a primitive on behalf of an agent
    pub fn execute(&self, agent_id: &str, name: &str, params: &Json) -> AgramaResult<Json> {
        let started = Instant::now();
        let timestamp = self.handles.timer.now();

        // Sessions are created on first request
        if let Some(event) = self.handles.sessions.register(
            agent_id,
            agent_id,
            Vec::new(),
            agent_id,
            timestamp,
        )? {
            (self.sink)(event);
        }
        self.handles.sessions.touch(agent_id, timestamp)?;
        let session_id = self
            .handles
            .sessions
            .get(agent_id)
            .map(|s| s.session_id)
            .unwrap_or_default();

        let spec = self
            .specs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| AgramaError::unknown_primitive(name))?;

        (spec.validate)(params)?;

        let mut arena = self.handles.arenas.checkout();
        let result = {
            let mut ctx = PrimitiveContext {
                handles: &self.handles,
                arena: &mut arena,
                agent_id,
                session_id: &session_id,
                timestamp,
                deadline: Deadline::after(Duration::from_millis(
                    self.handles.limits.default_deadline_ms,
                )),
                events: Vec::new(),
            };
            let result = (spec.execute)(&mut ctx, params);
            for event in ctx.events.drain(..) {
                (self.sink)(event);
            }
            result
        };
        // Arenas are returned (and reset) on every path
        self.handles.arenas.giveback(arena);

        let duration_micros = started.elapsed().as_micros() as u64;
        self.handles.provenance.append(ProvenanceRecord {
            id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            session_id,
            primitive: name.to_string(),
            key: primary_key_of(params),
            timestamp,
            wall_time: chrono::Utc::now().to_rfc3339(),
            success: result.is_ok(),
            duration_micros,
        });

        (self.sink)(EngineEvent::PrimitiveExecuted {
            primitive: name.to_string(),
            agent_id: agent_id.to_string(),
            key: primary_key_of(params),
            success: result.is_ok(),
            duration_micros,
            timestamp,
        });

        if let Err(e) = &result {
            if e.is_serious() {
                tracing::error!(primitive = name, error = %e, "primitive failed");
            } else {
                tracing::debug!(primitive = name, error = %e, "primitive rejected");
            }
        }
        result
    }
}

/// The key a call is about, for provenance and events
fn primary_key_of(params: &Json) -> Option<String> {
    for field in ["key", "from", "root"] {
        if let Some(k) = params.get(field).and_then(Json::as_str) {
            return Some(k.to_string());
        }
    }
    None
}

// ============================================================================
// Parameter helpers
// ============================================================================

fn require_str<'a>(params: &'a Json, field: &str) -> AgramaResult<&'a str> {
    params
        .get(field)
        .and_then(Json::as_str)
        .ok_or_else(|| AgramaError::validation(field, "required string field"))
}

fn opt_u64(params: &Json, field: &str, default: u64) -> u64 {
    params.get(field).and_then(Json::as_u64).unwrap_or(default)
}

fn opt_f32(params: &Json, field: &str, default: f32) -> f32 {
    params
        .get(field)
        .and_then(Json::as_f64)
        .map(|f| f as f32)
        .unwrap_or(default)
}

fn opt_bool(params: &Json, field: &str, default: bool) -> bool {
    params.get(field).and_then(Json::as_bool).unwrap_or(default)
}

fn opt_metadata(params: &Json, field: &str) -> AgramaResult<Option<Metadata>> {
    match params.get(field) {
        None | Some(Json::Null) => Ok(None),
        Some(Json::Object(map)) => Ok(Some(map.clone().into_iter().collect())),
        Some(_) => Err(AgramaError::validation(field, "must be an object")),
    }
}

fn options_of(params: &Json) -> Json {
    params.get("options").cloned().unwrap_or_else(|| json!({}))
}

// ============================================================================
// Registry
// ============================================================================

fn build_registry() -> Vec<PrimitiveSpec> {
    vec![
        PrimitiveSpec {
            name: "store",
            description: "Store content under a key; indexes it for lexical and semantic search",
            input_schema: json!({
                "type": "object",
                "required": ["key", "value"],
                "properties": {
                    "key": {"type": "string"},
                    "value": {"type": "string"},
                    "metadata": {"type": "object"},
                }
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "success": {"type": "boolean"},
                    "key": {"type": "string"},
                    "timestamp": {"type": "integer"},
                    "indexed": {"type": "boolean"},
                }
            }),
            validate: validate_store,
            execute: exec_store,
        },
        PrimitiveSpec {
            name: "retrieve",
            description: "Read current content, metadata, and optionally version history",
            input_schema: json!({
                "type": "object",
                "required": ["key"],
                "properties": {
                    "key": {"type": "string"},
                    "include_history": {"type": "boolean"},
                    "history_limit": {"type": "integer"},
                }
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "exists": {"type": "boolean"},
                    "key": {"type": "string"},
                    "value": {"type": "string"},
                    "metadata": {"type": "object"},
                    "history": {"type": "array"},
                }
            }),
            validate: validate_retrieve,
            execute: exec_retrieve,
        },
        PrimitiveSpec {
            name: "search",
            description: "Query the indices: lexical, semantic, graph, temporal, or hybrid",
            input_schema: json!({
                "type": "object",
                "required": ["query", "mode"],
                "properties": {
                    "query": {"type": "string"},
                    "mode": {"enum": ["lexical", "semantic", "graph", "temporal", "hybrid"]},
                    "options": {"type": "object"},
                }
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "mode": {"type": "string"},
                    "results": {"type": "array"},
                    "count": {"type": "integer"},
                }
            }),
            validate: validate_search,
            execute: exec_search,
        },
        PrimitiveSpec {
            name: "link",
            description: "Create or update a directed labeled edge between two keys",
            input_schema: json!({
                "type": "object",
                "required": ["from", "to", "relation"],
                "properties": {
                    "from": {"type": "string"},
                    "to": {"type": "string"},
                    "relation": {"type": "string"},
                    "weight": {"type": "number"},
                    "metadata": {"type": "object"},
                }
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "success": {"type": "boolean"},
                    "edge_id": {"type": "integer"},
                    "timestamp": {"type": "integer"},
                }
            }),
            validate: validate_link,
            execute: exec_link,
        },
        PrimitiveSpec {
            name: "transform",
            description: "Run a registered transform operation over opaque content",
            input_schema: json!({
                "type": "object",
                "required": ["operation", "data"],
                "properties": {
                    "operation": {"type": "string"},
                    "data": {"type": "string"},
                    "options": {"type": "object"},
                }
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "operation": {"type": "string"},
                    "result": {},
                }
            }),
            validate: validate_transform,
            execute: exec_transform,
        },
        PrimitiveSpec {
            name: "list_primitives",
            description: "Discover the primitive surface and its schemas",
            input_schema: json!({"type": "object", "properties": {}}),
            output_schema: json!({
                "type": "object",
                "properties": {"primitives": {"type": "array"}, "count": {"type": "integer"}}
            }),
            validate: |_| Ok(()),
            execute: exec_list_primitives,
        },
        PrimitiveSpec {
            name: "collaborative_read",
            description: "Read the materialized view of a collaborative document",
            input_schema: json!({
                "type": "object",
                "required": ["key"],
                "properties": {"key": {"type": "string"}}
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string"},
                    "content": {"type": "string"},
                    "agents": {"type": "array"},
                    "conflicts": {"type": "integer"},
                }
            }),
            validate: |p| require_str(p, "key").map(|_| ()),
            execute: exec_collaborative_read,
        },
        PrimitiveSpec {
            name: "collaborative_write",
            description: "Apply an insert, delete, or replace edit to a collaborative document",
            input_schema: json!({
                "type": "object",
                "required": ["key", "operation", "index"],
                "properties": {
                    "key": {"type": "string"},
                    "operation": {"enum": ["insert", "delete", "replace"]},
                    "index": {"type": "integer"},
                    "content": {"type": "string"},
                }
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "success": {"type": "boolean"},
                    "operation_id": {"type": "string"},
                    "content": {"type": "string"},
                }
            }),
            validate: validate_collaborative_write,
            execute: exec_collaborative_write,
        },
        PrimitiveSpec {
            name: "cursor_update",
            description: "Record an agent's cursor position in a collaborative document",
            input_schema: json!({
                "type": "object",
                "required": ["key", "index"],
                "properties": {
                    "key": {"type": "string"},
                    "index": {"type": "integer"},
                }
            }),
            output_schema: json!({
                "type": "object",
                "properties": {"success": {"type": "boolean"}}
            }),
            validate: |p| {
                require_str(p, "key")?;
                p.get("index")
                    .and_then(Json::as_u64)
                    .ok_or_else(|| AgramaError::validation("index", "required integer field"))?;
                Ok(())
            },
            execute: exec_cursor_update,
        },
    ]
}

// ============================================================================
// store
// ============================================================================

fn validate_store(params: &Json) -> AgramaResult<()> {
    require_str(params, "key")?;
    require_str(params, "value")?;
    opt_metadata(params, "metadata")?;
    Ok(())
}

fn exec_store(ctx: &mut PrimitiveContext, params: &Json) -> AgramaResult<Json> {
    let key = require_str(params, "key")?;
    let value_text = require_str(params, "value")?;
    let caller_metadata = opt_metadata(params, "metadata")?;

    let metadata = merge_metadata(
        caller_metadata,
        ctx.agent_id,
        ctx.timestamp.as_secs(),
        ctx.session_id,
    );

    let value = Value::from(value_text);
    let value_len = value.len();
    let timestamp = ctx
        .handles
        .store
        .put(key, value, metadata, ctx.timestamp)?;

    // The write is visible in every index before the call returns
    ctx.handles.graph.mark_present(key);
    ctx.handles.bm25.add(key, value_text);

    let indexed = value_len > ctx.handles.limits.embed_threshold_bytes;
    if indexed {
        let dimension = ctx.handles.hnsw.read().dimension();
        let embedding = ctx.handles.transforms.apply(
            "generate_embedding",
            value_text.as_bytes(),
            &json!({ "dimension": dimension }),
        )?;
        let vector: Vec<f32> = embedding["embedding"]
            .as_array()
            .ok_or_else(|| AgramaError::internal("embedding transform returned no vector"))?
            .iter()
            .filter_map(Json::as_f64)
            .map(|f| f as f32)
            .collect();
        ctx.handles.hnsw.write().insert(key, &vector)?;
    }

    Ok(json!({
        "success": true,
        "key": key,
        "timestamp": timestamp.as_secs(),
        "indexed": indexed,
    }))
}

// ============================================================================
// retrieve
// ============================================================================

fn validate_retrieve(params: &Json) -> AgramaResult<()> {
    require_str(params, "key")?;
    Ok(())
}

fn exec_retrieve(ctx: &mut PrimitiveContext, params: &Json) -> AgramaResult<Json> {
    let key = require_str(params, "key")?;
    let include_history = opt_bool(params, "include_history", false);
    let history_limit = opt_u64(params, "history_limit", 10) as usize;

    let Some(record) = ctx.handles.store.get(key) else {
        return Ok(json!({ "exists": false, "key": key }));
    };

    let mut out = json!({
        "exists": true,
        "key": key,
        "value": String::from_utf8_lossy(record.current().as_bytes()),
        "metadata": record.metadata(),
    });
    if include_history {
        let history: Vec<Json> = record
            .history(history_limit)
            .into_iter()
            .map(|(ts, value)| {
                json!({
                    "timestamp": ts.as_secs(),
                    "value": String::from_utf8_lossy(value.as_bytes()),
                })
            })
            .collect();
        out["history"] = Json::Array(history);
    }
    Ok(out)
}

// ============================================================================
// search
// ============================================================================

const SEARCH_MODES: [&str; 5] = ["lexical", "semantic", "graph", "temporal", "hybrid"];

fn validate_search(params: &Json) -> AgramaResult<()> {
    require_str(params, "query")?;
    let mode = require_str(params, "mode")?;
    if !SEARCH_MODES.contains(&mode) {
        return Err(AgramaError::validation(
            "mode",
            format!("expected one of {}", SEARCH_MODES.join("|")),
        ));
    }
    if mode == "graph" {
        let options = params.get("options").cloned().unwrap_or(Json::Null);
        if options.get("root").and_then(Json::as_str).is_none() {
            return Err(AgramaError::validation(
                "options.root",
                "graph mode requires a root key",
            ));
        }
    }
    Ok(())
}

fn exec_search(ctx: &mut PrimitiveContext, params: &Json) -> AgramaResult<Json> {
    let query = require_str(params, "query")?;
    let mode = require_str(params, "mode")?;
    let options = options_of(params);
    let max_results = opt_u64(&options, "max_results", 10) as usize;

    ctx.check_deadline("search")?;

    let results: Vec<Json> = match mode {
        "lexical" => ctx
            .handles
            .bm25
            .search(query, max_results)
            .into_iter()
            .map(|(key, score)| json!({ "key": key, "score": score }))
            .collect(),

        "semantic" => {
            let dimension = ctx.handles.hnsw.read().dimension();
            let embedding = ctx.handles.transforms.apply(
                "generate_embedding",
                query.as_bytes(),
                &json!({ "dimension": dimension }),
            )?;
            let vector: Vec<f32> = embedding["embedding"]
                .as_array()
                .ok_or_else(|| AgramaError::internal("embedding transform returned no vector"))?
                .iter()
                .filter_map(Json::as_f64)
                .map(|f| f as f32)
                .collect();
            ctx.handles
                .hnsw
                .read()
                .search_with_deadline(&vector, max_results, &ctx.deadline)?
                .into_iter()
                .map(|(key, distance)| {
                    json!({ "key": key, "distance": distance, "score": 1.0 - distance })
                })
                .collect()
        }

        "graph" => {
            let root = options
                .get("root")
                .and_then(Json::as_str)
                .ok_or_else(|| AgramaError::validation("options.root", "required for graph mode"))?;
            let direction = match options.get("direction").and_then(Json::as_str) {
                Some("reverse") => Direction::Reverse,
                Some("bidirectional") => Direction::Bidirectional,
                _ => Direction::Forward,
            };
            let max_depth = opt_u64(&options, "max_depth", 3) as usize;
            let snapshot = ctx.handles.graph.snapshot();
            let result = ctx.handles.fre.dependencies(
                &snapshot,
                root,
                direction,
                max_depth,
                &ctx.deadline,
            )?;
            result
                .distances
                .into_iter()
                .map(|(key, distance)| json!({ "key": key, "distance": distance }))
                .collect()
        }

        "temporal" => {
            let since = Timestamp::from_secs(opt_u64(&options, "since", 0));
            let until = Timestamp::from_secs(opt_u64(&options, "until", u64::MAX / 2_000_000));
            let mut hits = Vec::new();
            for key in ctx.handles.store.keys() {
                ctx.check_deadline("temporal search")?;
                for (ts, value) in ctx.handles.store.history(&key, usize::MAX)? {
                    if ts < since || ts > until {
                        continue;
                    }
                    let text = String::from_utf8_lossy(value.as_bytes()).into_owned();
                    if !query.is_empty() && !text.contains(query) {
                        continue;
                    }
                    hits.push((ts, key.clone(), text));
                }
            }
            hits.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
            hits.truncate(max_results);
            hits.into_iter()
                .map(|(ts, key, text)| {
                    json!({ "key": key, "timestamp": ts.as_secs(), "value": text })
                })
                .collect()
        }

        "hybrid" => {
            let weights = HybridWeights {
                lexical: opt_f32(&options, "lexical_weight", 0.4),
                semantic: opt_f32(&options, "semantic_weight", 0.4),
                graph: opt_f32(&options, "graph_weight", 0.2),
            };
            let hybrid_query = HybridQuery {
                text: query.to_string(),
                k: max_results,
                weights,
                graph_root: options
                    .get("root")
                    .and_then(Json::as_str)
                    .map(String::from),
                graph_depth: opt_u64(&options, "max_depth", 3) as usize,
                threshold: options
                    .get("threshold")
                    .and_then(Json::as_f64)
                    .map(|f| f as f32),
            };
            let response = ctx.handles.hybrid.query(&hybrid_query, &ctx.deadline)?;
            let mut results: Vec<Json> = response
                .hits
                .into_iter()
                .map(|hit| {
                    json!({
                        "key": hit.key,
                        "score": hit.combined,
                        "components": {
                            "lexical": hit.components.lexical,
                            "semantic": hit.components.semantic,
                            "graph": hit.components.graph,
                        }
                    })
                })
                .collect();
            if response.degraded {
                // Signal partial results without failing the call
                results.insert(0, json!({ "degraded": true }));
            }
            results
        }

        other => {
            return Err(AgramaError::validation(
                "mode",
                format!("unsupported search mode {}", other),
            ))
        }
    };

    Ok(json!({
        "query": query,
        "mode": mode,
        "results": results,
        "count": results.len(),
    }))
}

// ============================================================================
// link
// ============================================================================

fn validate_link(params: &Json) -> AgramaResult<()> {
    require_str(params, "from")?;
    require_str(params, "to")?;
    require_str(params, "relation")?;
    opt_metadata(params, "metadata")?;
    Ok(())
}

fn exec_link(ctx: &mut PrimitiveContext, params: &Json) -> AgramaResult<Json> {
    let from = require_str(params, "from")?;
    let to = require_str(params, "to")?;
    let relation = require_str(params, "relation")?;
    let weight = opt_f32(params, "weight", 1.0);
    let metadata = merge_metadata(
        opt_metadata(params, "metadata")?,
        ctx.agent_id,
        ctx.timestamp.as_secs(),
        ctx.session_id,
    );

    let edge_id = ctx
        .handles
        .graph
        .link(from, to, relation, weight, metadata, ctx.timestamp)?;

    Ok(json!({
        "success": true,
        "edge_id": edge_id.0,
        "timestamp": ctx.timestamp.as_secs(),
    }))
}

// ============================================================================
// transform
// ============================================================================

fn validate_transform(params: &Json) -> AgramaResult<()> {
    require_str(params, "operation")?;
    require_str(params, "data")?;
    Ok(())
}

fn exec_transform(ctx: &mut PrimitiveContext, params: &Json) -> AgramaResult<Json> {
    let operation = require_str(params, "operation")?;
    let data = require_str(params, "data")?;
    let options = options_of(params);

    let result = ctx
        .handles
        .transforms
        .apply(operation, data.as_bytes(), &options)?;

    Ok(json!({ "operation": operation, "result": result }))
}

// ============================================================================
// Discovery and collaboration
// ============================================================================

fn exec_list_primitives(ctx: &mut PrimitiveContext, _params: &Json) -> AgramaResult<Json> {
    // The registry is immutable after construction; rebuild the listing
    // from the same table the dispatcher uses.
    let specs = build_registry();
    let primitives: Vec<Json> = specs
        .iter()
        .map(|s| {
            json!({
                "name": s.name,
                "description": s.description,
                "input_schema": s.input_schema,
                "output_schema": s.output_schema,
            })
        })
        .collect();
    let _ = ctx;
    Ok(json!({ "primitives": primitives, "count": specs.len() }))
}

fn exec_collaborative_read(ctx: &mut PrimitiveContext, params: &Json) -> AgramaResult<Json> {
    let key = require_str(params, "key")?;
    let doc = ctx.handles.crdt.document(key)?;
    let doc = doc.lock();
    let agents: Vec<&str> = doc.agents().collect();
    Ok(json!({
        "key": key,
        "content": doc.text(),
        "agents": agents,
        "conflicts": doc.conflicts().len(),
    }))
}

fn validate_collaborative_write(params: &Json) -> AgramaResult<()> {
    require_str(params, "key")?;
    let operation = require_str(params, "operation")?;
    if !["insert", "delete", "replace"].contains(&operation) {
        return Err(AgramaError::validation(
            "operation",
            "expected one of insert|delete|replace",
        ));
    }
    params
        .get("index")
        .and_then(Json::as_u64)
        .ok_or_else(|| AgramaError::validation("index", "required integer field"))?;
    if operation != "delete" && params.get("content").and_then(Json::as_str).is_none() {
        return Err(AgramaError::validation(
            "content",
            "required for insert and replace",
        ));
    }
    Ok(())
}

fn exec_collaborative_write(ctx: &mut PrimitiveContext, params: &Json) -> AgramaResult<Json> {
    let key = require_str(params, "key")?;
    let operation = require_str(params, "operation")?;
    let index = opt_u64(params, "index", 0) as usize;
    let content = params
        .get("content")
        .and_then(Json::as_str)
        .unwrap_or_default();

    let edit = match operation {
        "insert" => Edit::Insert {
            index,
            payload: content.as_bytes().to_vec(),
        },
        "delete" => Edit::Delete { index },
        _ => Edit::Replace {
            index,
            payload: content.as_bytes().to_vec(),
        },
    };

    let outcome = ctx
        .handles
        .crdt
        .apply_local(key, ctx.agent_id, edit, ctx.timestamp)?;

    // Hand collaboration events back to the engine for publication
    ctx.events.extend(outcome.events.iter().cloned());

    Ok(json!({
        "success": true,
        "operation_id": outcome.operation.id.0.to_string(),
        "content": ctx.handles.crdt.read(key)?,
    }))
}

fn exec_cursor_update(ctx: &mut PrimitiveContext, params: &Json) -> AgramaResult<Json> {
    let key = require_str(params, "key")?;
    let index = opt_u64(params, "index", 0) as usize;

    let doc = ctx.handles.crdt.document(key)?;
    let position = doc.lock().position_for_index(ctx.agent_id, index);
    ctx.handles
        .crdt
        .cursor_update(key, ctx.agent_id, position.clone())?;
    ctx.handles
        .sessions
        .cursor_update(ctx.agent_id, key, position)?;

    Ok(json!({ "success": true }))
}
