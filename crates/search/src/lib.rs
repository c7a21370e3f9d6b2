//! Search indices for Agrama
//!
//! Three query paths over the same key space:
//! - [`Bm25Index`]: code-aware lexical ranking
//! - [`HnswIndex`]: approximate nearest-neighbour search over embeddings
//! - [`HybridEngine`]: parallel fan-out across lexical, semantic, and graph
//!   components with weighted score fusion and a coalescing result cache

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bm25;
pub mod hnsw;
pub mod hybrid;
pub mod simd;
pub mod tokenizer;
pub mod vector_pool;

pub use bm25::{Bm25Config, Bm25Index};
pub use hnsw::{HnswConfig, HnswIndex};
pub use hybrid::{
    CacheConfig, ComponentScores, HybridEngine, HybridHit, HybridQuery, HybridResponse,
    HybridWeights, QueryEmbedder,
};
pub use vector_pool::{VectorId, VectorPool, VECTOR_ALIGN};
