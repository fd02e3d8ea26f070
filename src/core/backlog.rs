//! Fixed-capacity FIFO ring buffer.
//!

/// Ordered buffer of pending items with a capacity fixed at construction.
///
/// Both cursors wrap modulo the capacity. A push into a full buffer hands the
/// item back instead of overwriting the oldest slot.
#[derive(Debug)]
pub struct Backlog<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    len: usize,
}

impl<T> Backlog<T> {
    /// Creates an empty backlog.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "backlog capacity must be positive");

        Backlog {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
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

    /// Appends an item behind every item already queued.
    ///
    /// Returns `Err(item)` untouched if the backlog is full.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }

        let tail = (self.head + self.len) % self.capacity();
        debug_assert!(self.slots[tail].is_none());
        self.slots[tail] = Some(item);
        self.len += 1;
        Ok(())
    }

    /// Removes the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        item
    }
}
