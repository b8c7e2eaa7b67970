use alloc::{collections::BTreeMap, sync::Weak};
use core::{
    fmt::{self, Display, Formatter},
    sync::atomic::{AtomicU64, Ordering},
};
use parking_lot::RwLock;
use tracing::debug;

use crate::injector::{Injector, InjectorInner};

/// Identity of a backend scope, unique for the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeHandle(u64);

impl ScopeHandle {
    #[must_use]
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for ScopeHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Backend handle → wrapping [`Injector`] map of one composition root.
///
/// Wrappers are held weakly, entries are pruned when a scope is disposed or its last wrapper dropped.
pub(crate) struct ScopeManager {
    wrappers: RwLock<BTreeMap<ScopeHandle, Weak<InjectorInner>>>,
}

impl ScopeManager {
    #[inline]
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            wrappers: RwLock::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub(crate) fn lookup(&self, handle: ScopeHandle) -> Option<Injector> {
        self.wrappers
            .read()
            .get(&handle)
            .and_then(Weak::upgrade)
            .map(Injector::from_inner)
    }

    /// Returns the live wrapper of the handle or registers the one built by `make`.
    ///
    /// The candidate is built outside the write lock and dropped if another thread won the race.
    pub(crate) fn get_or_insert_with(&self, handle: ScopeHandle, make: impl FnOnce() -> Injector) -> Injector {
        if let Some(injector) = self.lookup(handle) {
            return injector;
        }

        let candidate = make();
        let existing = {
            let mut wrappers = self.wrappers.write();
            match wrappers.get(&handle).and_then(Weak::upgrade) {
                Some(existing) => Some(existing),
                None => {
                    wrappers.insert(handle, candidate.downgrade());
                    debug!(scope = %handle, "Scope wrapped");
                    None
                }
            }
        };

        match existing {
            Some(existing) => Injector::from_inner(existing),
            None => candidate,
        }
    }

    /// Removes the entry of a disposed scope.
    pub(crate) fn remove(&self, handle: ScopeHandle) {
        if self.wrappers.write().remove(&handle).is_some() {
            debug!(scope = %handle, "Scope unregistered");
        }
    }

    /// Removes the entry only if no live wrapper is left for the handle.
    pub(crate) fn prune(&self, handle: ScopeHandle) {
        let mut wrappers = self.wrappers.write();
        if wrappers.get(&handle).is_some_and(|weak| weak.strong_count() == 0) {
            wrappers.remove(&handle);
        }
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.wrappers.read().len()
    }
}
