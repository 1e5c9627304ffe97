//! Fixed-capacity ring buffer (not concurrent itself)
//!
//! Storage structure for the buffered elements of a channel. The capacity is
//! decided at construction and never changes, so a bounded channel can never
//! allocate past its configured bound. Channels without buffering construct
//! this with capacity zero.

/// Ring buffer of `T` with a fixed capacity
pub(super) struct Ring<T> {
    /// storage slots. a slot is Some if and only if it currently holds a
    /// queued element.
    slots: Box<[Option<T>]>,
    /// index of the element at the front, meaningless while empty
    head: usize,
    /// number of elements currently queued
    len: usize,
}

impl<T> Ring<T> {
    /// Construct empty with the given capacity
    pub(super) fn new(capacity: usize) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(capacity, || None);
        Ring { slots: slots.into_boxed_slice(), head: 0, len: 0 }
    }

    /// Elements currently queued
    pub(super) fn len(&self) -> usize {
        self.len
    }

    /// Whether no elements are queued
    pub(super) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Push to back. Panics if full.
    pub(super) fn push(&mut self, t: T) {
        assert!(self.len < self.slots.len(), "push into full ring");
        let idx = (self.head + self.len) % self.slots.len();
        debug_assert!(self.slots[idx].is_none());
        self.slots[idx] = Some(t);
        self.len += 1;
    }

    /// Pop from front
    pub(super) fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let t = self.slots[self.head].take();
        debug_assert!(t.is_some());
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        t
    }

    /// The element at the front, if any, without removing it
    pub(super) fn front(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        self.slots[self.head].as_ref()
    }

    /// Iterate the queued elements front to back without removing them
    pub(super) fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.len).map(move |i| {
            let idx = (self.head + i) % self.slots.len();
            self.slots[idx].as_ref().expect("queued slot is empty")
        })
    }

    /// Drop all queued elements
    pub(super) fn clear(&mut self) {
        while self.pop().is_some() {}
    }
}
