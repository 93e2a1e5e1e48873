//! Engine-side object storage
//!
//! Objects live in a map keyed by handle id. Ids are never reused, so a stale
//! handle can only miss, never alias a newer object.

use crate::contract::RawHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Snapshot of engine bookkeeping counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Handles issued and not yet freed
    pub live_handles: usize,
    /// Buffers issued and not yet freed
    pub outstanding_buffers: usize,
    /// Total handles ever freed
    pub freed_handles: usize,
    /// Frees refused because the handle or buffer was unknown
    pub rejected_frees: usize,
}

/// Thread-safe handle table
pub struct HandleTable<T> {
    objects: Mutex<HashMap<u64, T>>,
    // Zero-length buffers share a dangling address, so count per address.
    buffers: Mutex<HashMap<usize, usize>>,
    next_id: AtomicU64,
    freed: AtomicUsize,
    rejected: AtomicUsize,
}

impl<T> HandleTable<T> {
    /// Create an empty table. The first id issued is 1.
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            buffers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            freed: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
        }
    }

    /// Store `object` and return its handle.
    pub fn insert(&self, object: T) -> RawHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.objects.lock().insert(id, object);
        match RawHandle::from_raw(id) {
            Some(handle) => handle,
            // The counter starts at 1 and would need 2^64 inserts to wrap.
            None => unreachable!("handle id counter wrapped"),
        }
    }

    /// Run `f` against the object stored under `handle`.
    pub fn with<R>(&self, handle: RawHandle, f: impl FnOnce(&T) -> R) -> Option<R> {
        let objects = self.objects.lock();
        objects.get(&handle.as_u64()).map(f)
    }

    /// Remove the object under `handle`. Returns `false` and counts a rejected
    /// free when the handle is unknown.
    pub fn remove(&self, handle: RawHandle) -> bool {
        let removed = self.objects.lock().remove(&handle.as_u64());
        match removed {
            Some(object) => {
                drop(object);
                self.freed.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Refusing to free unknown handle {}", handle);
                false
            }
        }
    }

    /// Record a buffer handed to the caller.
    pub fn track_buffer(&self, addr: usize) {
        *self.buffers.lock().entry(addr).or_insert(0) += 1;
    }

    /// Forget a buffer on release. Returns `false` and counts a rejected free
    /// when the buffer was never issued or was already released.
    pub fn untrack_buffer(&self, addr: usize) -> bool {
        let mut buffers = self.buffers.lock();
        if let Some(count) = buffers.get_mut(&addr) {
            *count -= 1;
            if *count == 0 {
                buffers.remove(&addr);
            }
            true
        } else {
            drop(buffers);
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Refusing to free unknown buffer {:#x}", addr);
            false
        }
    }

    /// Current counters.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            live_handles: self.objects.lock().len(),
            outstanding_buffers: self.buffers.lock().values().sum(),
            freed_handles: self.freed.load(Ordering::Relaxed),
            rejected_frees: self.rejected.load(Ordering::Relaxed),
        }
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let table = HandleTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_eq!(a.as_u64(), 1);
        assert_eq!(b.as_u64(), 2);
        assert_eq!(table.with(a, |v| *v), Some("a"));
    }

    #[test]
    fn test_remove_twice_is_rejected() {
        let table = HandleTable::new();
        let h = table.insert(42u32);
        assert!(table.remove(h));
        assert!(!table.remove(h));

        let stats = table.stats();
        assert_eq!(stats.live_handles, 0);
        assert_eq!(stats.freed_handles, 1);
        assert_eq!(stats.rejected_frees, 1);
        assert_eq!(table.with(h, |v| *v), None);
    }

    #[test]
    fn test_buffer_tracking() {
        let table: HandleTable<()> = HandleTable::new();
        table.track_buffer(0x1000);
        assert_eq!(table.stats().outstanding_buffers, 1);
        assert!(table.untrack_buffer(0x1000));
        assert!(!table.untrack_buffer(0x1000));
        assert_eq!(table.stats().outstanding_buffers, 0);
        assert_eq!(table.stats().rejected_frees, 1);
    }
}
