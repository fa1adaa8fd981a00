//! Fixed-capacity ring of mono audio samples
//!
//! Storage is allocated once at construction. Writing into a full ring
//! evicts the oldest unread sample, so the freshest audio always survives.

/// Circular buffer of normalized `f32` samples
pub struct AudioRing {
    samples: Box<[f32]>,
    /// Index of the oldest sample
    head: usize,
    /// Number of buffered samples
    len: usize,
}

impl AudioRing {
    /// Create a ring holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be non-zero");

        Self {
            samples: vec![0.0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Append a sample.
    /// Returns true if the oldest sample was evicted to make room.
    pub fn push(&mut self, sample: f32) -> bool {
        let capacity = self.capacity();
        if self.len == capacity {
            self.samples[self.head] = sample;
            self.head = (self.head + 1) % capacity;
            true
        } else {
            let tail = (self.head + self.len) % capacity;
            self.samples[tail] = sample;
            self.len += 1;
            false
        }
    }

    /// Sample at `offset` from the oldest, if buffered
    pub fn get(&self, offset: usize) -> Option<f32> {
        if offset < self.len {
            Some(self.samples[(self.head + offset) % self.capacity()])
        } else {
            None
        }
    }

    /// Drop up to `count` of the oldest samples; returns how many were dropped
    pub fn discard(&mut self, count: usize) -> usize {
        let count = count.min(self.len);
        self.head = (self.head + count) % self.capacity();
        self.len -= count;
        count
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Buffered samples, oldest first
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.len).map(move |i| self.samples[(self.head + i) % self.capacity()])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Get fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len as f32 / self.capacity() as f32
    }
}
