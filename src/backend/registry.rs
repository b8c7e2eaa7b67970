use alloc::{
    boxed::Box,
    collections::BTreeMap,
    sync::{Arc, Weak},
    vec::Vec,
};
use core::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{activate, instantiate, Backend, BackendScope, ClosedGeneric};
use crate::{
    any::{ContractType, Instance},
    cache::{Cache, CacheKey, Resolved, ResolvedSet},
    collection::{ServiceCollection, ServiceId},
    contract::{Lifetime, ServiceInfo},
    errors::{BuildErrorKind, ResolveErrorKind},
    injector::CompositionRoot,
    lock::KeyedLocks,
    scope::ScopeHandle,
};

#[derive(thiserror::Error, Debug)]
pub(crate) enum RegistryErrorKind {
    #[error("Scope {scope} is disposed")]
    Disposed { scope: ScopeHandle },
    #[error("Scope {scope} is dropped")]
    Dropped { scope: ScopeHandle },
    #[error("No registry entry {}", .service.index())]
    UnknownEntry { service: ServiceId },
}

impl From<RegistryErrorKind> for ResolveErrorKind {
    fn from(err: RegistryErrorKind) -> Self {
        match err {
            RegistryErrorKind::Disposed { scope } | RegistryErrorKind::Dropped { scope } => {
                ResolveErrorKind::ObjectDisposed { scope }
            }
            RegistryErrorKind::UnknownEntry { .. } => ResolveErrorKind::ServiceNotFound {
                contract: "unregistered service",
            },
        }
    }
}

/// Engine keeping instances in per-scope caches chained to the root.
///
/// First constructions of one key are serialized with a lock per key and double-checked cache reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryBackend;

impl Backend for RegistryBackend {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn materialize(&self, services: &ServiceCollection) -> Result<Arc<dyn BackendScope>, BuildErrorKind> {
        let registry = Arc::new(Registry::new(services));

        debug!(entries = registry.entries.len(), "Registry materialized");

        Ok(RegistryScope::new(registry, None, None))
    }
}

/// Contract → entries table, open generic definitions keyed by their marker.
struct Registry {
    services: ServiceCollection,
    entries: BTreeMap<ContractType, Box<[ServiceId]>>,
}

impl Registry {
    fn new(services: &ServiceCollection) -> Self {
        let mut entries: BTreeMap<ContractType, Vec<ServiceId>> = BTreeMap::new();
        for (service, info) in services.iter() {
            entries.entry(info.contract_type()).or_default().push(service);
        }

        Self {
            services: services.clone(),
            entries: entries
                .into_iter()
                .map(|(contract, services)| (contract, services.into_boxed_slice()))
                .collect(),
        }
    }

    fn entry(&self, service: ServiceId) -> Result<&ServiceInfo, RegistryErrorKind> {
        self.services
            .get(service)
            .ok_or(RegistryErrorKind::UnknownEntry { service })
    }
}

pub(crate) struct RegistryScope {
    this: Weak<RegistryScope>,
    handle: ScopeHandle,
    registry: Arc<Registry>,
    root: Option<Arc<RegistryScope>>,
    parent: Option<Weak<RegistryScope>>,
    cache: Mutex<Cache>,
    resolved: Mutex<ResolvedSet>,
    locks: KeyedLocks<CacheKey>,
    disposed: AtomicBool,
}

impl RegistryScope {
    fn new(registry: Arc<Registry>, root: Option<Arc<Self>>, parent: Option<Weak<Self>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            handle: ScopeHandle::next(),
            registry,
            root,
            parent,
            cache: Mutex::new(Cache::new()),
            resolved: Mutex::new(ResolvedSet::new()),
            locks: KeyedLocks::new(),
            disposed: AtomicBool::new(false),
        })
    }

    fn arc(&self) -> Result<Arc<Self>, RegistryErrorKind> {
        self.this
            .upgrade()
            .ok_or(RegistryErrorKind::Dropped { scope: self.handle })
    }

    fn ensure_active(&self) -> Result<(), RegistryErrorKind> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(RegistryErrorKind::Disposed { scope: self.handle });
        }
        Ok(())
    }

    /// Scope holding instances of the lifetime: the root for singletons, this scope otherwise.
    fn owner(&self, lifetime: Lifetime) -> Result<Arc<Self>, RegistryErrorKind> {
        match (&self.root, lifetime) {
            (Some(root), Lifetime::Singleton) => Ok(root.clone()),
            _ => self.arc(),
        }
    }

    fn resolve_entry(
        &self,
        service: ServiceId,
        closed: Option<&ClosedGeneric>,
        cx: &Arc<CompositionRoot>,
    ) -> Result<Instance, ResolveErrorKind> {
        self.ensure_active()?;
        let info = self.registry.entry(service)?;
        let owner = self.owner(info.lifetime())?;

        if info.lifetime() == Lifetime::Transient {
            let _activation = activate(cx, owner.handle, service, info, closed)?;
            return instantiate(cx, owner, info, closed);
        }
        owner.get_or_create(service, info, closed, cx)
    }

    fn get_or_create(
        self: &Arc<Self>,
        service: ServiceId,
        info: &ServiceInfo,
        closed: Option<&ClosedGeneric>,
        cx: &Arc<CompositionRoot>,
    ) -> Result<Instance, ResolveErrorKind> {
        self.ensure_active()?;
        let key = CacheKey {
            service,
            closed: closed.map(|request| request.closed().id),
        };

        let cached = self.cache.lock().get(&key);
        if let Some(instance) = cached {
            debug!(scope = %self.handle, "Found in cache");
            return Ok(instance);
        }
        debug!(scope = %self.handle, "Not found in cache");

        let _activation = activate(cx, self.handle, service, info, closed)?;
        let lock = self.locks.get(key);
        let _construction = lock.lock();

        let cached = self.cache.lock().get(&key);
        if let Some(instance) = cached {
            debug!(scope = %self.handle, "Constructed by another thread");
            return Ok(instance);
        }

        let instance = instantiate(cx, self.clone(), info, closed)?;
        self.cache.lock().insert(key, instance.clone());
        debug!(scope = %self.handle, "Cached");

        if let Some(resolved) = Resolved::owned(info, &instance) {
            self.track(resolved);
        }
        Ok(instance)
    }

    fn track(&self, resolved: Resolved) {
        let mut owned = self.resolved.lock();
        if self.disposed.load(Ordering::Acquire) {
            drop(owned);
            warn!(scope = %self.handle, service = resolved.name, "Scope disposed during construction");
            resolved.finalize();
            return;
        }
        owned.push(resolved);
    }
}

impl BackendScope for RegistryScope {
    fn handle(&self) -> ScopeHandle {
        self.handle
    }

    fn parent(&self) -> Option<Arc<dyn BackendScope>> {
        self.parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|parent| parent as Arc<dyn BackendScope>)
    }

    fn registrations(&self, contract: &ContractType) -> Vec<ServiceId> {
        self.registry
            .entries
            .get(contract)
            .map(|services| services.to_vec())
            .unwrap_or_default()
    }

    fn resolve_registration(&self, service: ServiceId, cx: &Arc<CompositionRoot>) -> Result<Instance, ResolveErrorKind> {
        self.resolve_entry(service, None, cx)
    }

    fn resolve_closed_generic(
        &self,
        request: &ClosedGeneric,
        cx: &Arc<CompositionRoot>,
    ) -> Result<Instance, ResolveErrorKind> {
        self.resolve_entry(request.service(), Some(request), cx)
    }

    fn create_child(&self) -> Result<Arc<dyn BackendScope>, ResolveErrorKind> {
        self.ensure_active()?;
        let root = match &self.root {
            Some(root) => root.clone(),
            None => self.arc()?,
        };
        Ok(Self::new(self.registry.clone(), Some(root), Some(self.this.clone())))
    }

    fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let owned = self.resolved.lock().take();
        self.cache.lock().clear();
        self.locks.clear();

        debug!(scope = %self.handle, owned = owned.0.len(), "Finalizing owned instances");
        owned.finalize();
        true
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for RegistryScope {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::{RegistryBackend, RegistryErrorKind};
    use crate::{
        backend::Backend as _, collection::ServiceId, errors::ResolveErrorKind, scope::ScopeHandle, Declarations,
        InstantiateErrorKind, ServiceCollection, ServiceInfo,
    };

    use alloc::sync::Arc;
    use tracing_test::traced_test;

    struct Pool;

    #[test]
    fn test_errors_translated() {
        let scope = ScopeHandle::next();

        assert!(matches!(
            ResolveErrorKind::from(RegistryErrorKind::Dropped { scope }),
            ResolveErrorKind::ObjectDisposed { scope: disposed } if disposed == scope
        ));
        assert!(matches!(
            ResolveErrorKind::from(RegistryErrorKind::UnknownEntry { service: ServiceId(3) }),
            ResolveErrorKind::ServiceNotFound { .. }
        ));
    }

    #[test]
    #[traced_test]
    fn test_children_share_root() {
        let collection = ServiceCollection::builder()
            .with_provider(
                Declarations::new("pool").with(
                    ServiceInfo::builder::<Pool>()
                        .factory(|| Ok::<_, InstantiateErrorKind>(Arc::new(Pool)))
                        .singleton()
                        .build()
                        .unwrap(),
                ),
            )
            .build()
            .unwrap();

        let root = RegistryBackend.materialize(&collection).unwrap();
        let child = root.create_child().unwrap();
        let grandchild = child.create_child().unwrap();

        assert_eq!(grandchild.parent().unwrap().handle(), child.handle());
        assert_eq!(child.parent().unwrap().handle(), root.handle());
        assert!(root.parent().is_none());

        assert!(child.dispose());
        assert!(!child.dispose());
        assert!(child.create_child().is_err());
        assert!(!grandchild.is_disposed());
    }
}
