//! Sideband logging setup
//!
//! The protocol stream carries only JSON-RPC messages, so all operational
//! logs go to stderr. Filtering follows `AGRAMA_LOG` (falling back to
//! `RUST_LOG`), e.g. `AGRAMA_LOG=agrama_search=debug,info`.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the stderr subscriber. Safe to call more than once; only the
/// first call wins.
pub fn init() {
    let filter = EnvFilter::try_from_env("AGRAMA_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
