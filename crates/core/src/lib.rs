//! Core types and traits for Agrama
//!
//! This crate defines the foundations used throughout the system:
//! - Key validation and the filesystem allow-list sandbox
//! - Value and metadata types with engine-field injection
//! - AgramaError: the unified error hierarchy
//! - Limits: engine-wide size and retention limits
//! - SafeTimer, Timestamp, Deadline: time handling with graceful degradation
//! - Memory pools and the per-invocation query arena
//! - Broadcast event payloads

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod error;
pub mod events;
pub mod key;
pub mod limits;
pub mod pool;
pub mod timer;
pub mod value;

pub use arena::{ArenaPool, QueryArena};
pub use error::{AgramaError, AgramaResult};
pub use events::EngineEvent;
pub use key::{validate_key, validate_key_with_limits, KeyError, PathValidator};
pub use limits::{is_supported_dimension, Limits, SUPPORTED_DIMENSIONS};
pub use pool::{BufferPool, JsonPool};
pub use timer::{Deadline, SafeTimer, Timestamp};
pub use value::{merge_metadata, Metadata, Value};
