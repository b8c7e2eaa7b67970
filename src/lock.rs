use alloc::{collections::BTreeMap, sync::Arc};
use parking_lot::Mutex;

/// Construction locks, one per key.
///
/// First constructions of different keys never wait on each other, so a factory may resolve
/// other services of the same scope while its own lock is held.
pub(crate) struct KeyedLocks<K> {
    locks: Mutex<BTreeMap<K, Arc<Mutex<()>>>>,
}

impl<K: Ord + Copy> KeyedLocks<K> {
    #[inline]
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            locks: Mutex::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub(crate) fn get(&self, key: K) -> Arc<Mutex<()>> {
        self.locks.lock().entry(key).or_default().clone()
    }

    pub(crate) fn clear(&self) {
        self.locks.lock().clear();
    }
}

impl<K: Ord + Copy> Default for KeyedLocks<K> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::KeyedLocks;

    use alloc::sync::Arc;

    #[test]
    fn test_same_key_same_lock() {
        let locks = KeyedLocks::<u8>::new();

        assert!(Arc::ptr_eq(&locks.get(1), &locks.get(1)));
        assert!(!Arc::ptr_eq(&locks.get(1), &locks.get(2)));

        let first = locks.get(1);
        let _guard = first.lock();
        assert!(locks.get(2).try_lock().is_some());
        assert!(locks.get(1).try_lock().is_none());
    }
}
