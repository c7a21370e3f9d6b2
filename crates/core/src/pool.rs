//! Object pools for hot-path allocation reuse
//!
//! Response building and per-query scratch dominate allocator traffic under
//! load. These pools recycle the backing storage: checkout hands back a
//! cleared object with its capacity intact, giveback returns it for reuse.
//! Pools are bounded; overflow objects are simply dropped.

use parking_lot::Mutex;

/// Pool of JSON object maps for response building
pub struct JsonPool {
    slots: Mutex<Vec<serde_json::Map<String, serde_json::Value>>>,
    cap: usize,
}

impl JsonPool {
    /// Create a pool holding at most `cap` recycled maps
    pub fn new(cap: usize) -> Self {
        JsonPool {
            slots: Mutex::new(Vec::with_capacity(cap)),
            cap,
        }
    }

    /// Take a cleared map from the pool, or allocate a fresh one
    pub fn checkout(&self) -> serde_json::Map<String, serde_json::Value> {
        self.slots.lock().pop().unwrap_or_default()
    }

    /// Return a map to the pool
    pub fn giveback(&self, mut map: serde_json::Map<String, serde_json::Value>) {
        map.clear();
        let mut slots = self.slots.lock();
        if slots.len() < self.cap {
            slots.push(map);
        }
    }

    /// Number of recycled maps currently pooled
    pub fn available(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Pool of byte buffers
pub struct BufferPool {
    slots: Mutex<Vec<Vec<u8>>>,
    cap: usize,
}

impl BufferPool {
    /// Create a pool holding at most `cap` recycled buffers
    pub fn new(cap: usize) -> Self {
        BufferPool {
            slots: Mutex::new(Vec::with_capacity(cap)),
            cap,
        }
    }

    /// Take a cleared buffer from the pool, or allocate a fresh one
    pub fn checkout(&self) -> Vec<u8> {
        self.slots.lock().pop().unwrap_or_default()
    }

    /// Return a buffer to the pool
    pub fn giveback(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut slots = self.slots.lock();
        if slots.len() < self.cap {
            slots.push(buf);
        }
    }

    /// Number of recycled buffers currently pooled
    pub fn available(&self) -> usize {
        self.slots.lock().len()
    }
}
