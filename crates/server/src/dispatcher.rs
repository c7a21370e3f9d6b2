//! Request dispatcher
//!
//! Routes JSON-RPC requests to the primitive engine. The dispatcher is the
//! only component that formats wire error objects: primitive errors are
//! mapped to their application codes here, oversized messages are rejected
//! before parse, and notifications produce no response while still running
//! their side effects.

use crate::protocol::{codes, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use agrama_primitives::PrimitiveEngine;
use serde_json::{json, Value as Json};
use std::sync::Arc;

/// Protocol version reported by initialize
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Per-connection state
#[derive(Debug, Clone)]
pub struct ConnectionState {
    /// Agent identity for calls on this connection
    pub agent_id: String,
    /// Whether initialize has completed
    pub initialized: bool,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState {
            agent_id: format!("agent-{}", uuid::Uuid::new_v4()),
            initialized: false,
        }
    }
}

/// The request dispatcher
pub struct Dispatcher {
    engine: Arc<PrimitiveEngine>,
    max_message_bytes: usize,
}

impl Dispatcher {
    /// Create a dispatcher over an engine
    pub fn new(engine: Arc<PrimitiveEngine>) -> Self {
        let max_message_bytes = engine.handles().limits.max_message_bytes;
        Dispatcher {
            engine,
            max_message_bytes,
        }
    }

    /// The wrapped engine
    pub fn engine(&self) -> &Arc<PrimitiveEngine> {
        &self.engine
    }

    /// Handle one raw line. Returns the serialized response line, or None
    /// for notifications.
    pub fn handle_line(&self, conn: &mut ConnectionState, line: &str) -> Option<String> {
        // Size cap is enforced before any parsing
        if line.len() > self.max_message_bytes {
            let resp = JsonRpcResponse::failure(
                Json::Null,
                codes::PARSE_ERROR,
                format!(
                    "message of {} bytes exceeds maximum {}",
                    line.len(),
                    self.max_message_bytes
                ),
            );
            return serde_json::to_string(&resp).ok();
        }

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                let resp = JsonRpcResponse::failure(
                    Json::Null,
                    codes::PARSE_ERROR,
                    format!("parse error: {}", e),
                );
                return serde_json::to_string(&resp).ok();
            }
        };

        self.handle(conn, request)
            .and_then(|resp| serde_json::to_string(&resp).ok())
    }

    /// Handle a decoded request
    pub fn handle(
        &self,
        conn: &mut ConnectionState,
        request: JsonRpcRequest,
    ) -> Option<JsonRpcResponse> {
        let is_notification = request.is_notification();
        let id = request.id.clone().unwrap_or(Json::Null);

        if request.jsonrpc != JSONRPC_VERSION {
            return self.respond(
                is_notification,
                JsonRpcResponse::failure(id, codes::INVALID_REQUEST, "jsonrpc must be \"2.0\""),
            );
        }

        let params = request.params.unwrap_or(Json::Null);
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(conn, id, &params),
            "initialized" => {
                conn.initialized = true;
                return None;
            }
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(conn, id, &params),
            other => JsonRpcResponse::failure(
                id,
                codes::METHOD_NOT_FOUND,
                format!("method not found: {}", other),
            ),
        };
        self.respond(is_notification, response)
    }

    fn respond(
        &self,
        is_notification: bool,
        response: JsonRpcResponse,
    ) -> Option<JsonRpcResponse> {
        if is_notification {
            None
        } else {
            Some(response)
        }
    }

    fn handle_initialize(
        &self,
        conn: &mut ConnectionState,
        id: Json,
        params: &Json,
    ) -> JsonRpcResponse {
        if let Some(name) = params
            .get("clientInfo")
            .and_then(|c| c.get("name"))
            .and_then(Json::as_str)
        {
            conn.agent_id = name.to_string();
        }
        conn.initialized = true;

        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": "agrama",
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }),
        )
    }

    fn handle_tools_list(&self, id: Json) -> JsonRpcResponse {
        let listing = self.engine.list_primitives();
        let tools: Vec<Json> = listing["primitives"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|p| {
                json!({
                    "name": p["name"],
                    "description": p["description"],
                    "inputSchema": p["input_schema"],
                    "outputSchema": p["output_schema"],
                })
            })
            .collect();
        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    fn handle_tools_call(
        &self,
        conn: &mut ConnectionState,
        id: Json,
        params: &Json,
    ) -> JsonRpcResponse {
        let Some(name) = params.get("name").and_then(Json::as_str) else {
            return JsonRpcResponse::failure(
                id,
                codes::INVALID_PARAMS,
                "tools/call requires a tool name",
            );
        };
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        // Calls may name their agent explicitly; the connection identity is
        // the default.
        let agent_id = arguments
            .get("agent_id")
            .and_then(Json::as_str)
            .unwrap_or(&conn.agent_id)
            .to_string();

        match self.engine.execute(&agent_id, name, &arguments) {
            Ok(result) => {
                let text = serde_json::to_string(&result).unwrap_or_else(|_| "{}".to_string());
                JsonRpcResponse::success(
                    id,
                    json!({
                        "content": [{ "type": "text", "text": text }],
                        "isError": false,
                    }),
                )
            }
            Err(e) => JsonRpcResponse::failure_with_data(
                id,
                e.json_rpc_code(),
                e.wire_message(),
                json!({ "tool": name }),
            ),
        }
    }
}

/// Test-only construction of a fully wired dispatcher
#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use agrama_collab::{ConflictStrategy, CrdtEngine, SessionConfig, SessionRegistry};
    use agrama_core::{ArenaPool, Limits, SafeTimer};
    use agrama_graph::FreEngine;
    use agrama_primitives::{EngineHandles, ProvenanceLog, TransformRegistry};
    use agrama_search::{
        Bm25Config, Bm25Index, CacheConfig, HnswConfig, HnswIndex, HybridEngine, QueryEmbedder,
    };
    use agrama_store::{GraphStore, TemporalStore};
    use parking_lot::RwLock;

    pub(crate) fn test_dispatcher() -> Dispatcher {
        let limits = Limits::default();
        let store = Arc::new(TemporalStore::new(limits.clone()));
        let graph = Arc::new(GraphStore::new());
        let bm25 = Arc::new(Bm25Index::new(Bm25Config::default()));
        let hnsw = Arc::new(RwLock::new(
            HnswIndex::new(256, HnswConfig::default()).unwrap(),
        ));
        let fre = Arc::new(FreEngine::default());
        let transforms = Arc::new(TransformRegistry::builtin());
        let embed_transforms = Arc::clone(&transforms);
        let embedder: QueryEmbedder = Arc::new(move |text: &str| {
            embed_transforms
                .apply(
                    "generate_embedding",
                    text.as_bytes(),
                    &json!({"dimension": 256}),
                )
                .expect("embedding")["embedding"]
                .as_array()
                .expect("vector")
                .iter()
                .filter_map(Json::as_f64)
                .map(|f| f as f32)
                .collect()
        });
        let hybrid = Arc::new(HybridEngine::new(
            Arc::clone(&bm25),
            Arc::clone(&hnsw),
            Arc::clone(&graph),
            Arc::clone(&fre),
            embedder,
            CacheConfig::default(),
        ));
        let handles = EngineHandles {
            store,
            graph,
            bm25,
            hnsw,
            fre,
            hybrid,
            crdt: Arc::new(CrdtEngine::new(ConflictStrategy::default(), 1024)),
            sessions: Arc::new(SessionRegistry::new(SessionConfig::default())),
            transforms,
            provenance: Arc::new(ProvenanceLog::new(1024)),
            arenas: Arc::new(ArenaPool::new(8)),
            limits,
            timer: Arc::new(SafeTimer::new()),
        };
        Dispatcher::new(Arc::new(PrimitiveEngine::new(handles)))
    }
}
