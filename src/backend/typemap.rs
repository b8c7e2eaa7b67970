use alloc::{
    boxed::Box,
    collections::BTreeMap,
    sync::{Arc, Weak},
    vec::Vec,
};
use anymap2::SendSyncAnyMap;
use core::{
    fmt::{self, Debug, Formatter},
    sync::atomic::{AtomicBool, Ordering},
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::{activate, instantiate, Backend, BackendScope, ClosedGeneric};
use crate::{
    any::{ContractType, Instance, TypeInfo},
    cache::{CacheKey, Resolved, ResolvedSet},
    collection::{ServiceCollection, ServiceId},
    contract::{Lifetime, ServiceInfo},
    errors::{BuildErrorKind, ResolveErrorKind},
    injector::CompositionRoot,
    lock::KeyedLocks,
    scope::ScopeHandle,
};

#[derive(thiserror::Error, Debug)]
pub(crate) enum TypeMapErrorKind {
    #[error("Scope {scope} is disposed")]
    Disposed { scope: ScopeHandle },
    #[error("Scope {scope} is dropped")]
    Dropped { scope: ScopeHandle },
    #[error("No binding {}", .service.index())]
    UnknownBinding { service: ServiceId },
    #[error("Binding of {contract} has no typed storage")]
    Untyped { contract: &'static str },
    #[error("Instance of {actual} can't be stored as {expected}")]
    Mismatch { expected: &'static str, actual: &'static str },
}

impl From<TypeMapErrorKind> for ResolveErrorKind {
    fn from(err: TypeMapErrorKind) -> Self {
        match err {
            TypeMapErrorKind::Disposed { scope } | TypeMapErrorKind::Dropped { scope } => {
                ResolveErrorKind::ObjectDisposed { scope }
            }
            TypeMapErrorKind::UnknownBinding { .. } => ResolveErrorKind::ServiceNotFound {
                contract: "unregistered service",
            },
            TypeMapErrorKind::Untyped { contract } => ResolveErrorKind::ServiceNotFound { contract },
            TypeMapErrorKind::Mismatch { expected, actual } => ResolveErrorKind::IncorrectType { expected, actual },
        }
    }
}

/// Typed accessors of the `Arc<C>` instances kept in a [`SendSyncAnyMap`].
///
/// Captured where `C` is still known: the registration builder, or the closed generic request.
#[derive(Clone, Copy)]
pub(crate) struct TypedStorage {
    type_info: TypeInfo,
    load: fn(&SendSyncAnyMap, &CacheKey) -> Option<Instance>,
    store: fn(&mut SendSyncAnyMap, CacheKey, &Instance) -> bool,
}

impl TypedStorage {
    #[inline]
    #[must_use]
    pub(crate) fn of<C>() -> Self
    where
        C: ?Sized + Send + Sync + 'static,
    {
        Self {
            type_info: TypeInfo::of::<C>(),
            load: load::<C>,
            store: store::<C>,
        }
    }

    fn load(&self, map: &SendSyncAnyMap, key: &CacheKey) -> Option<Instance> {
        (self.load)(map, key)
    }

    fn store(&self, map: &mut SendSyncAnyMap, key: CacheKey, instance: &Instance) -> Result<(), TypeMapErrorKind> {
        if (self.store)(map, key, instance) {
            return Ok(());
        }
        Err(TypeMapErrorKind::Mismatch {
            expected: self.type_info.name,
            actual: instance.type_info().name,
        })
    }
}

impl Debug for TypedStorage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedStorage").field(&self.type_info.name).finish()
    }
}

/// Instances of one type, one per registration and closed type.
struct Stored<C: ?Sized>(BTreeMap<CacheKey, Arc<C>>);

impl<C: ?Sized> Default for Stored<C> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

fn load<C>(map: &SendSyncAnyMap, key: &CacheKey) -> Option<Instance>
where
    C: ?Sized + Send + Sync + 'static,
{
    map.get::<Stored<C>>()?.0.get(key).cloned().map(Instance::new)
}

fn store<C>(map: &mut SendSyncAnyMap, key: CacheKey, instance: &Instance) -> bool
where
    C: ?Sized + Send + Sync + 'static,
{
    let Some(value) = instance.downcast::<C>() else {
        return false;
    };
    map.entry::<Stored<C>>().or_default().0.insert(key, value);
    true
}

/// Engine keeping instances in a typed `anymap2` container per scope.
///
/// Registrations are translated into bindings carrying the typed accessors of their contract,
/// the container holds `Arc<C>` values and never the type-erased [`Instance`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeMapBackend;

impl Backend for TypeMapBackend {
    fn name(&self) -> &'static str {
        "typemap"
    }

    fn materialize(&self, services: &ServiceCollection) -> Result<Arc<dyn BackendScope>, BuildErrorKind> {
        let bindings = Arc::new(Bindings::translate(services));

        debug!(
            bindings = bindings.services.len(),
            untyped = bindings.by_service.iter().filter(|binding| binding.storage.is_none()).count(),
            "Bindings translated"
        );

        Ok(TypeMapScope::new(bindings, None, None))
    }
}

struct Binding {
    lifetime: Lifetime,
    storage: Option<TypedStorage>,
}

struct Bindings {
    services: ServiceCollection,
    by_service: Box<[Binding]>,
    by_contract: BTreeMap<ContractType, Box<[ServiceId]>>,
}

impl Bindings {
    fn translate(services: &ServiceCollection) -> Self {
        let by_service: Box<[Binding]> = services
            .iter()
            .map(|(_, info)| Binding {
                lifetime: info.lifetime(),
                storage: info.storage,
            })
            .collect();

        let by_contract: BTreeMap<ContractType, Box<[ServiceId]>> = services
            .contracts()
            .map(|contract| (*contract, services.registrations(contract).into()))
            .collect();

        Self {
            services: services.clone(),
            by_service,
            by_contract,
        }
    }

    fn binding(&self, service: ServiceId) -> Result<(&Binding, &ServiceInfo), TypeMapErrorKind> {
        let binding = self
            .by_service
            .get(service.index())
            .ok_or(TypeMapErrorKind::UnknownBinding { service })?;
        let info = self
            .services
            .get(service)
            .ok_or(TypeMapErrorKind::UnknownBinding { service })?;
        Ok((binding, info))
    }
}

pub(crate) struct TypeMapScope {
    this: Weak<TypeMapScope>,
    handle: ScopeHandle,
    bindings: Arc<Bindings>,
    root: Option<Arc<TypeMapScope>>,
    parent: Option<Weak<TypeMapScope>>,
    instances: RwLock<SendSyncAnyMap>,
    resolved: Mutex<ResolvedSet>,
    locks: KeyedLocks<CacheKey>,
    disposed: AtomicBool,
}

impl TypeMapScope {
    fn new(bindings: Arc<Bindings>, root: Option<Arc<Self>>, parent: Option<Weak<Self>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            handle: ScopeHandle::next(),
            bindings,
            root,
            parent,
            instances: RwLock::new(SendSyncAnyMap::new()),
            resolved: Mutex::new(ResolvedSet::new()),
            locks: KeyedLocks::new(),
            disposed: AtomicBool::new(false),
        })
    }

    fn arc(&self) -> Result<Arc<Self>, TypeMapErrorKind> {
        self.this.upgrade().ok_or(TypeMapErrorKind::Dropped { scope: self.handle })
    }

    fn ensure_active(&self) -> Result<(), TypeMapErrorKind> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(TypeMapErrorKind::Disposed { scope: self.handle });
        }
        Ok(())
    }

    fn owner(&self, lifetime: Lifetime) -> Result<Arc<Self>, TypeMapErrorKind> {
        match (&self.root, lifetime) {
            (Some(root), Lifetime::Singleton) => Ok(root.clone()),
            _ => self.arc(),
        }
    }

    fn resolve_binding(
        &self,
        service: ServiceId,
        closed: Option<&ClosedGeneric>,
        cx: &Arc<CompositionRoot>,
    ) -> Result<Instance, ResolveErrorKind> {
        self.ensure_active()?;
        let (binding, info) = self.bindings.binding(service)?;
        let owner = self.owner(binding.lifetime)?;

        if binding.lifetime == Lifetime::Transient {
            let _activation = activate(cx, owner.handle, service, info, closed)?;
            return instantiate(cx, owner, info, closed);
        }

        let storage = match closed {
            Some(request) => request.storage,
            None => binding.storage.ok_or(TypeMapErrorKind::Untyped {
                contract: info.contract_type().name(),
            })?,
        };
        owner.get_or_create(service, info, closed, storage, cx)
    }

    fn get_or_create(
        self: &Arc<Self>,
        service: ServiceId,
        info: &ServiceInfo,
        closed: Option<&ClosedGeneric>,
        storage: TypedStorage,
        cx: &Arc<CompositionRoot>,
    ) -> Result<Instance, ResolveErrorKind> {
        self.ensure_active()?;
        let key = CacheKey {
            service,
            closed: closed.map(|request| request.closed().id),
        };

        if let Some(instance) = storage.load(&self.instances.read(), &key) {
            debug!(scope = %self.handle, "Found in type map");
            return Ok(instance);
        }
        debug!(scope = %self.handle, "Not found in type map");

        let _activation = activate(cx, self.handle, service, info, closed)?;
        let lock = self.locks.get(key);
        let _construction = lock.lock();

        if let Some(instance) = storage.load(&self.instances.read(), &key) {
            debug!(scope = %self.handle, "Constructed by another thread");
            return Ok(instance);
        }

        let instance = instantiate(cx, self.clone(), info, closed)?;
        storage.store(&mut self.instances.write(), key, &instance)?;
        debug!(scope = %self.handle, "Stored in type map");

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

impl BackendScope for TypeMapScope {
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
        self.bindings
            .by_contract
            .get(contract)
            .map(|services| services.to_vec())
            .unwrap_or_default()
    }

    fn resolve_registration(&self, service: ServiceId, cx: &Arc<CompositionRoot>) -> Result<Instance, ResolveErrorKind> {
        self.resolve_binding(service, None, cx)
    }

    fn resolve_closed_generic(
        &self,
        request: &ClosedGeneric,
        cx: &Arc<CompositionRoot>,
    ) -> Result<Instance, ResolveErrorKind> {
        self.resolve_binding(request.service(), Some(request), cx)
    }

    fn create_child(&self) -> Result<Arc<dyn BackendScope>, ResolveErrorKind> {
        self.ensure_active()?;
        let root = match &self.root {
            Some(root) => root.clone(),
            None => self.arc()?,
        };
        Ok(Self::new(self.bindings.clone(), Some(root), Some(self.this.clone())))
    }

    fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let owned = self.resolved.lock().take();
        self.instances.write().clear();
        self.locks.clear();

        debug!(scope = %self.handle, owned = owned.0.len(), "Finalizing owned instances");
        owned.finalize();
        true
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for TypeMapScope {
    fn drop(&mut self) {
        self.dispose();
    }
}
