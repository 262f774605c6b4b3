//! In-process named-mutex registry (spec §5 ThreadLock): a process-wide,
//! reference-counted map from lock name to mutex. Acquire blocks until the
//! named lock is free; release happens on guard drop and removes the slot
//! once its reference count reaches zero, under a short map-level lock.
//! Non-recursive, blocking, no cancellation — matching the original's
//! discipline exactly.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

struct Slot {
    locked: Mutex<bool>,
    cv: Condvar,
    refcount: AtomicUsize,
}

impl Slot {
    fn new() -> Self {
        Self { locked: Mutex::new(false), cv: Condvar::new(), refcount: AtomicUsize::new(0) }
    }
}

/// The process-wide registry. Construct one and share it (e.g. behind an
/// `Arc`) across every caller that needs build/tile/download coordination.
#[derive(Default)]
pub struct LockRegistry {
    slots: DashMap<String, Arc<Slot>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self { slots: DashMap::new() }
    }

    /// Blocks until `name` is free, then holds it until the returned guard
    /// is dropped.
    pub fn acquire(&self, name: impl Into<String>) -> LockGuard<'_> {
        let name = name.into();
        let slot = self
            .slots
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone();
        slot.refcount.fetch_add(1, Ordering::SeqCst);

        let mut locked = slot.locked.lock().expect("thread lock poisoned");
        while *locked {
            locked = slot.cv.wait(locked).expect("thread lock poisoned");
        }
        *locked = true;
        drop(locked);

        LockGuard { registry: self, name, slot }
    }
}

pub struct LockGuard<'a> {
    registry: &'a LockRegistry,
    name: String,
    slot: Arc<Slot>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        {
            let mut locked = self.slot.locked.lock().expect("thread lock poisoned");
            *locked = false;
        }
        self.slot.cv.notify_one();

        if self.slot.refcount.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.registry.slots.remove_if(&self.name, |_, v| Arc::strong_count(v) <= 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_name_serializes_two_threads() {
        let registry = Arc::new(LockRegistry::new());
        let counter = Arc::new(AtomicU32::new(0));
        let overlap = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for _ in 0..4 {
            let registry = registry.clone();
            let counter = counter.clone();
            let overlap = overlap.clone();
            handles.push(thread::spawn(move || {
                let _g = registry.acquire("build-root/hash");
                let before = counter.fetch_add(1, Ordering::SeqCst);
                if before != 0 {
                    overlap.fetch_add(1, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_millis(5));
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(overlap.load(Ordering::SeqCst), 0, "critical section was entered concurrently");
    }

    #[test]
    fn slot_is_removed_once_all_guards_drop() {
        let registry = LockRegistry::new();
        {
            let _g = registry.acquire("x");
            assert!(registry.slots.contains_key("x"));
        }
        assert!(!registry.slots.contains_key("x"));
    }

    #[test]
    fn different_names_do_not_block_each_other() {
        let registry = LockRegistry::new();
        let _a = registry.acquire("a");
        let _b = registry.acquire("b");
    }
}
