//! BM25 lexical index
//!
//! Inverted index with per-term posting lists and BM25 ranking. Documents
//! are keyed by their store key; re-adding a key replaces its previous
//! postings. A version watermark is bumped on every update so the hybrid
//! cache can fingerprint index state.
//!
//! # Thread Safety
//!
//! DashMap postings with atomic counters; writes are short-lived, reads
//! never block writes on other terms.

use crate::tokenizer::{tokenize, tokenize_unique};
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// BM25 scoring parameters
#[derive(Debug, Clone)]
pub struct Bm25Config {
    /// Term-frequency saturation (default: 1.2)
    pub k1: f32,
    /// Length normalization strength (default: 0.75)
    pub b: f32,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Bm25Config { k1: 1.2, b: 0.75 }
    }
}

/// Entry in a posting list
#[derive(Debug, Clone)]
struct PostingEntry {
    /// Document key
    key: String,
    /// Term frequency in this document
    tf: u32,
    /// Document length in tokens
    doc_len: u32,
}

/// BM25 inverted index
pub struct Bm25Index {
    config: Bm25Config,
    /// term -> posting entries
    postings: DashMap<String, Vec<PostingEntry>>,
    /// key -> token count, for replace/remove bookkeeping
    doc_lengths: DashMap<String, u32>,
    total_docs: AtomicUsize,
    total_doc_len: AtomicUsize,
    version: AtomicU64,
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new(Bm25Config::default())
    }
}

impl Bm25Index {
    /// Create an empty index
    pub fn new(config: Bm25Config) -> Self {
        Bm25Index {
            config,
            postings: DashMap::new(),
            doc_lengths: DashMap::new(),
            total_docs: AtomicUsize::new(0),
            total_doc_len: AtomicUsize::new(0),
            version: AtomicU64::new(0),
        }
    }

    /// Index (or re-index) a document
    pub fn add(&self, key: &str, text: &str) {
        if self.doc_lengths.contains_key(key) {
            self.remove(key);
        }

        let tokens = tokenize(text);
        let doc_len = tokens.len() as u32;

        let mut tf_map: FxHashMap<String, u32> = FxHashMap::default();
        for token in tokens {
            *tf_map.entry(token).or_insert(0) += 1;
        }

        for (term, tf) in tf_map {
            self.postings.entry(term).or_default().push(PostingEntry {
                key: key.to_string(),
                tf,
                doc_len,
            });
        }

        self.doc_lengths.insert(key.to_string(), doc_len);
        self.total_docs.fetch_add(1, Ordering::Release);
        self.total_doc_len
            .fetch_add(doc_len as usize, Ordering::Release);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Remove a document. No-op if the key was never indexed.
    pub fn remove(&self, key: &str) {
        let Some((_, doc_len)) = self.doc_lengths.remove(key) else {
            return;
        };

        self.postings.retain(|_, entries| {
            entries.retain(|e| e.key != key);
            !entries.is_empty()
        });

        self.total_docs.fetch_sub(1, Ordering::Release);
        self.total_doc_len
            .fetch_sub(doc_len as usize, Ordering::Release);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Whether a key is indexed
    pub fn contains(&self, key: &str) -> bool {
        self.doc_lengths.contains_key(key)
    }

    /// Ranked lexical search. Scores descending, ties broken by key.
    pub fn search(&self, query: &str, k: usize) -> Vec<(String, f32)> {
        if k == 0 {
            return Vec::new();
        }
        let terms = tokenize_unique(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let n = self.total_docs.load(Ordering::Acquire);
        if n == 0 {
            return Vec::new();
        }
        let avg_len = self.avg_doc_len();

        let mut scores: FxHashMap<String, f32> = FxHashMap::default();
        for term in &terms {
            let Some(entries) = self.postings.get(term) else {
                continue;
            };
            let idf = self.idf(n, entries.len());
            for entry in entries.iter() {
                let tf = entry.tf as f32;
                let len_norm = 1.0 - self.config.b
                    + self.config.b * (entry.doc_len as f32 / avg_len.max(1e-6));
                let score = idf * (tf * (self.config.k1 + 1.0))
                    / (tf + self.config.k1 * len_norm);
                *scores.entry(entry.key.clone()).or_insert(0.0) += score;
            }
        }

        let mut ranked: Vec<(String, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(k);
        ranked
    }

    /// IDF with standard smoothing: ln((N - df + 0.5) / (df + 0.5) + 1)
    fn idf(&self, n: usize, df: usize) -> f32 {
        let n = n as f32;
        let df = df as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Average document length in tokens
    pub fn avg_doc_len(&self) -> f32 {
        let total = self.total_docs.load(Ordering::Acquire);
        if total == 0 {
            return 0.0;
        }
        self.total_doc_len.load(Ordering::Acquire) as f32 / total as f32
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.total_docs.load(Ordering::Acquire)
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Version watermark, bumped on every update
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Number of distinct terms
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }
}
