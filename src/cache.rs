use alloc::collections::{btree_map::BTreeMap, vec_deque::VecDeque};
use core::{any::TypeId, mem};
use tracing::debug;

use crate::{
    any::Instance, collection::ServiceId, contract::ServiceInfo, finalizer::BoxedCloneFinalizer, service::Service as _,
};

/// Cache key of one registration, closed generics keyed per closed type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct CacheKey {
    pub(crate) service: ServiceId,
    pub(crate) closed: Option<TypeId>,
}

pub(crate) struct Cache {
    pub(crate) map: BTreeMap<CacheKey, Instance>,
}

impl Cache {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self { map: BTreeMap::new() }
    }

    #[inline]
    #[must_use]
    pub(crate) fn get(&self, key: &CacheKey) -> Option<Instance> {
        self.map.get(key).cloned()
    }

    #[inline]
    pub(crate) fn insert(&mut self, key: CacheKey, instance: Instance) -> Option<Instance> {
        self.map.insert(key, instance)
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.map.clear();
    }
}

/// Owned instance waiting for its finalizer.
pub(crate) struct Resolved {
    pub(crate) name: &'static str,
    pub(crate) instance: Instance,
    pub(crate) finalizer: BoxedCloneFinalizer,
}

impl Resolved {
    /// Teardown entry of a new instance, if the runtime owns instances of the registration.
    #[must_use]
    pub(crate) fn owned(info: &ServiceInfo, instance: &Instance) -> Option<Self> {
        if !info.is_owned() {
            return None;
        }
        info.finalizer.clone().map(|finalizer| Self {
            name: info.implementation_name(),
            instance: instance.clone(),
            finalizer,
        })
    }

    pub(crate) fn finalize(self) {
        let Self {
            name,
            instance,
            mut finalizer,
        } = self;
        if finalizer.call(instance).is_ok() {
            debug!(service = name, "Finalizer called");
        }
    }
}

/// Owned instances in creation order.
#[derive(Default)]
pub(crate) struct ResolvedSet(pub(crate) VecDeque<Resolved>);

impl ResolvedSet {
    pub(crate) fn new() -> Self {
        Self(VecDeque::new())
    }

    pub(crate) fn push(&mut self, resolved: Resolved) {
        self.0.push_back(resolved);
    }

    #[inline]
    #[must_use]
    pub(crate) fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Runs finalizers, most recently created first.
    pub(crate) fn finalize(mut self) {
        while let Some(resolved) = self.0.pop_back() {
            resolved.finalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cache, CacheKey, Resolved, ResolvedSet};
    use crate::{any::Instance, collection::ServiceId, finalizer::boxed_finalizer_factory};

    use alloc::{sync::Arc, vec::Vec};
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    #[test]
    fn test_cache_keys() {
        let mut cache = Cache::new();
        let open = CacheKey {
            service: ServiceId(0),
            closed: None,
        };
        let closed = CacheKey {
            service: ServiceId(0),
            closed: Some(core::any::TypeId::of::<u8>()),
        };

        cache.insert(open, Instance::new(Arc::new(1_u8)));

        assert!(cache.get(&open).is_some());
        assert!(cache.get(&closed).is_none());
        cache.clear();
        assert!(cache.get(&open).is_none());
    }

    #[test]
    #[traced_test]
    fn test_finalize_lifo() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut set = ResolvedSet::new();

        for value in 1..=3_u8 {
            let order = order.clone();
            set.push(Resolved {
                name: "value",
                instance: Instance::new(Arc::new(value)),
                finalizer: boxed_finalizer_factory::<u8, _>(move |value: Arc<u8>| order.lock().push(*value)),
            });
        }

        let taken = set.take();
        assert!(set.0.is_empty());
        taken.finalize();

        assert_eq!(*order.lock(), [3, 2, 1]);
    }
}
