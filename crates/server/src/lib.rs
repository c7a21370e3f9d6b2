//! Protocol surface for Agrama
//!
//! JSON-RPC 2.0 over line-delimited framing: envelope types, the request
//! dispatcher (the only component that formats wire errors), the serve
//! loop, and the broadcast feed consumed by external visualization.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broadcast;
pub mod dispatcher;
pub mod logging;
pub mod protocol;
pub mod serve;

pub use broadcast::{EventBroadcaster, EventSubscriber};
pub use dispatcher::{ConnectionState, Dispatcher, PROTOCOL_VERSION};
pub use protocol::{codes, JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
pub use serve::serve_connection;

pub use logging::init as init_logging;
