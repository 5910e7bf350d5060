//! Lock-free append buffer for parallel producers.
//!
//! Mirrors the append-buffer + atomic-counter pattern of compute shaders:
//!
//! ```text
//! worker:  slot = counter.fetch_add(1)  →  slots[slot] = item     (many threads, any order)
//! host:    &mut buffer (all workers done)  →  read slots[..counter]  →  counter = 0
//! ```
//!
//! The read side takes `&mut self`, so the borrow checker only lets it run once
//! every worker holding `&self` has returned. Reading a half-written frame is
//! therefore impossible rather than merely forbidden.

use std::sync::{
    OnceLock,
    atomic::{AtomicUsize, Ordering},
};

/// Fixed-capacity buffer that many threads can append to concurrently.
pub struct AppendBuffer<T> {
    slots: Box<[OnceLock<T>]>,
    counter: AtomicUsize,
}

/// Result of [`AppendBuffer::drain`].
#[derive(Debug, PartialEq)]
pub struct Drained<T> {
    /// Every accepted item, in reservation order.
    pub items: Vec<T>,
    /// Appends rejected because the buffer was full.
    pub overflowed: usize,
}

impl<T> AppendBuffer<T> {
    /// Allocates all `capacity` slots up front.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| OnceLock::new()).collect(),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Reserves the next slot and stores `item` in it, returning the slot index.
    ///
    /// Hands `item` back when the buffer is full; nothing is written out of bounds.
    pub fn append(&self, item: T) -> Result<usize, T> {
        let slot = self.counter.fetch_add(1, Ordering::Relaxed);
        match self.slots.get(slot) {
            Some(cell) => match cell.set(item) {
                Ok(()) => Ok(slot),
                // Each index is handed out once per frame, so this would mean the
                // counter wrapped.
                Err(item) => Err(item),
            },
            None => Err(item),
        }
    }

    /// Number of appends attempted since the last drain, including rejected ones.
    pub fn requested(&mut self) -> usize {
        *self.counter.get_mut()
    }

    /// Number of slots holding a value. Requires exclusive access, i.e. no
    /// producer can still be running.
    pub fn live_count(&mut self) -> usize {
        self.requested().min(self.capacity())
    }

    /// Moves out exactly the live prefix and resets the buffer for reuse.
    pub fn drain(&mut self) -> Drained<T> {
        let requested = self.requested();
        let live = requested.min(self.capacity());
        let items: Vec<T> = self.slots[..live]
            .iter_mut()
            .filter_map(OnceLock::take)
            .collect();
        *self.counter.get_mut() = 0;
        Drained {
            overflowed: requested - items.len(),
            items,
        }
    }
}
