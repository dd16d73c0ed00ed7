//! Per-thread ring buffer: a fixed-capacity array of [`WireRecord`]s plus a
//! cursor. The inserter advances the cursor after each record it writes;
//! draining resets it to the start. Invariant: `buf <= cursor <= buf +
//! capacity` always holds.

use super::record::WireRecord;
use std::cell::UnsafeCell;

/// Records held per thread before a drain is forced.
pub const CAPACITY: usize = 1024;

/// Not `Sync` in spirit — each instance is meant to live behind
/// [`thread_local!`] and touched only by the thread that owns it. The
/// inserter's injected code and the drain path are the same thread, so a
/// plain `UnsafeCell` (no atomics, no lock) is sufficient.
pub struct Ring {
    buf: UnsafeCell<[WireRecord; CAPACITY]>,
    cursor: UnsafeCell<usize>,
}

impl Ring {
    pub fn new() -> Self {
        Ring {
            buf: UnsafeCell::new([WireRecord::default(); CAPACITY]),
            cursor: UnsafeCell::new(0),
        }
    }

    pub fn cursor(&self) -> usize {
        // SAFETY: single-threaded access per instance (thread_local).
        unsafe { *self.cursor.get() }
    }

    pub fn is_full(&self) -> bool {
        self.cursor() >= CAPACITY
    }

    pub fn is_empty(&self) -> bool {
        self.cursor() == 0
    }

    /// Returns the slot the inserter should fill next, or `None` if the
    /// ring is full and must be drained first.
    pub fn next_slot(&self) -> Option<&mut WireRecord> {
        let idx = self.cursor();
        if idx >= CAPACITY {
            return None;
        }
        // SAFETY: `idx < CAPACITY`, single-threaded access.
        let slot = unsafe { &mut (*self.buf.get())[idx] };
        unsafe {
            *self.cursor.get() = idx + 1;
        }
        Some(slot)
    }

    /// Drains all filled records and resets the cursor to zero. Called on
    /// basic-block entry and on thread exit.
    pub fn drain(&self) -> Vec<WireRecord> {
        let filled = self.cursor();
        // SAFETY: `filled <= CAPACITY`, single-threaded access.
        let out = unsafe { (&(*self.buf.get()))[..filled].to_vec() };
        unsafe {
            *self.cursor.get() = 0;
        }
        out
    }
}

impl Default for Ring {
    fn default() -> Self {
        Ring::new()
    }
}

thread_local! {
    pub static RING: Ring = Ring::new();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let ring = Ring::new();
        assert!(ring.is_empty());
        assert!(!ring.is_full());
    }

    #[test]
    fn fills_and_drains() {
        let ring = Ring::new();
        for i in 0..5 {
            let slot = ring.next_slot().unwrap();
            slot.pc = i as u64;
        }
        assert_eq!(ring.cursor(), 5);
        let drained = ring.drain();
        assert_eq!(drained.len(), 5);
        assert_eq!(drained[3].pc, 3);
        assert!(ring.is_empty());
    }

    #[test]
    fn reports_full_at_capacity() {
        let ring = Ring::new();
        for _ in 0..CAPACITY {
            assert!(ring.next_slot().is_some());
        }
        assert!(ring.is_full());
        assert!(ring.next_slot().is_none());
    }

    #[test]
    fn ring_bounds_invariant_holds_across_use() {
        let ring = Ring::new();
        assert!(ring.cursor() <= CAPACITY);
        for _ in 0..10 {
            ring.next_slot();
            assert!(ring.cursor() <= CAPACITY);
        }
        ring.drain();
        assert!(ring.cursor() <= CAPACITY);
    }
}
