//! Per-invocation scratch arena
//!
//! Every primitive invocation and every traversal query gets a
//! [`QueryArena`] checked out from an [`ArenaPool`]. The arena owns the
//! short-lived collections the operation needs; `reset()` clears contents
//! but retains capacity, so steady-state request handling allocates close to
//! nothing. Nothing allocated in the arena may outlive the invocation:
//! values that escape must be copied into caller-owned storage.

use parking_lot::Mutex;

/// Reusable scratch space scoped to a single operation
#[derive(Debug, Default)]
pub struct QueryArena {
    /// Byte scratch (value staging, delta materialization)
    pub bytes: Vec<u8>,
    /// Index scratch (candidate lists, frontier blocks)
    pub indices: Vec<u32>,
    /// Score scratch (distances, tentative path lengths)
    pub scores: Vec<f32>,
    /// Visit markers, indexed by dense node id
    pub visited: Vec<bool>,
    /// Generic string scratch (tokens, keys under construction)
    pub strings: Vec<String>,
}

impl QueryArena {
    /// Create an arena with pre-sized buffers
    pub fn with_capacity(bytes: usize, nodes: usize) -> Self {
        QueryArena {
            bytes: Vec::with_capacity(bytes),
            indices: Vec::with_capacity(nodes),
            scores: Vec::with_capacity(nodes),
            visited: Vec::with_capacity(nodes),
            strings: Vec::new(),
        }
    }

    /// Clear all contents, retaining capacity
    pub fn reset(&mut self) {
        self.bytes.clear();
        self.indices.clear();
        self.scores.clear();
        self.visited.clear();
        self.strings.clear();
    }

    /// Total capacity held across buffers, in approximate bytes
    pub fn resident_bytes(&self) -> usize {
        self.bytes.capacity()
            + self.indices.capacity() * 4
            + self.scores.capacity() * 4
            + self.visited.capacity()
            + self.strings.capacity() * std::mem::size_of::<String>()
    }
}

/// Fixed pool of arenas, one checked out per in-flight invocation
pub struct ArenaPool {
    slots: Mutex<Vec<QueryArena>>,
    cap: usize,
}

impl ArenaPool {
    /// Create a pool bounded at `cap` retained arenas
    pub fn new(cap: usize) -> Self {
        ArenaPool {
            slots: Mutex::new(Vec::with_capacity(cap)),
            cap,
        }
    }

    /// Check out a reset arena
    pub fn checkout(&self) -> QueryArena {
        self.slots.lock().pop().unwrap_or_default()
    }

    /// Return an arena. It is reset here so the next checkout is clean even
    /// when the invocation bailed early.
    pub fn giveback(&self, mut arena: QueryArena) {
        arena.reset();
        let mut slots = self.slots.lock();
        if slots.len() < self.cap {
            slots.push(arena);
        }
    }

    /// Number of retained arenas
    pub fn available(&self) -> usize {
        self.slots.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_retains_capacity() {
        let mut arena = QueryArena::with_capacity(1024, 128);
        arena.bytes.extend_from_slice(&[1u8; 512]);
        arena.indices.extend(0..100u32);
        let byte_cap = arena.bytes.capacity();

        arena.reset();
        assert!(arena.bytes.is_empty());
        assert!(arena.indices.is_empty());
        assert!(arena.bytes.capacity() >= byte_cap);
    }

    #[test]
    fn test_pool_checkout_is_clean() {
        let pool = ArenaPool::new(2);
        let mut arena = pool.checkout();
        arena.strings.push("left over".into());
        pool.giveback(arena);

        let arena = pool.checkout();
        assert!(arena.strings.is_empty());
    }

    #[test]
    fn test_pool_bounded() {
        let pool = ArenaPool::new(1);
        pool.giveback(QueryArena::default());
        pool.giveback(QueryArena::default());
        assert_eq!(pool.available(), 1);
    }
}
