use alloc::{
    sync::{Arc, Weak},
    vec::Vec,
};
use core::{
    any::type_name,
    fmt::{self, Debug, Formatter},
};
use tracing::{debug, error, info, info_span};

use crate::{
    any::{ContractType, Instance, TypeInfo},
    backend::{ambiguous, not_found, typemap::TypedStorage, Backend, BackendScope, ClosedGeneric},
    collection::{ServiceCollection, ServiceId},
    config::Config,
    dependency_resolver::DependencyResolver,
    errors::{BuildErrorKind, ResolveErrorKind},
    instantiator::{boxed_component_factory, GenericComponent},
    scope::{ScopeHandle, ScopeManager},
};

/// State shared by every scope materialized from one [`ServiceCollection`].
pub struct CompositionRoot {
    services: ServiceCollection,
    scopes: ScopeManager,
    backend: &'static str,
}

impl CompositionRoot {
    /// Wrapper of a backend scope, the same one as long as any clone of it is alive.
    pub(crate) fn injector_for(self: &Arc<Self>, scope: Arc<dyn BackendScope>) -> Injector {
        let handle = scope.handle();
        self.scopes.get_or_insert_with(handle, || Injector {
            inner: Arc::new(InjectorInner {
                scope,
                root: self.clone(),
            }),
        })
    }

    #[inline]
    #[must_use]
    pub fn services(&self) -> &ServiceCollection {
        &self.services
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &Config {
        self.services.config()
    }

    #[inline]
    #[must_use]
    pub const fn backend_name(&self) -> &'static str {
        self.backend
    }

    /// Number of scopes with a registered wrapper.
    #[inline]
    #[must_use]
    pub fn live_scopes(&self) -> usize {
        self.scopes.len()
    }
}

pub(crate) struct InjectorInner {
    scope: Arc<dyn BackendScope>,
    root: Arc<CompositionRoot>,
}

impl Drop for InjectorInner {
    fn drop(&mut self) {
        self.root.scopes.prune(self.scope.handle());
    }
}

/// Resolution contract over one scope of a backend.
///
/// Cheap to clone, clones share the scope. The scope is disposed when the last reference to it
/// is dropped, [`Injector::dispose`] does it deterministically.
#[derive(Clone)]
pub struct Injector {
    inner: Arc<InjectorInner>,
}

impl Injector {
    /// Materializes the collection with the backend and returns the root scope's injector.
    ///
    /// # Errors
    /// Returns [`BuildErrorKind`] if the backend can't materialize the collection.
    pub fn new<B: Backend + ?Sized>(services: &ServiceCollection, backend: &B) -> Result<Self, BuildErrorKind> {
        let span = info_span!("materialize", backend = backend.name());
        let _guard = span.enter();

        let scope = backend.materialize(services)?;
        let root = Arc::new(CompositionRoot {
            services: services.clone(),
            scopes: ScopeManager::new(),
            backend: backend.name(),
        });

        info!(services = services.len(), scope = %scope.handle(), "Composition root ready");

        Ok(root.injector_for(scope))
    }

    #[inline]
    pub(crate) fn from_inner(inner: Arc<InjectorInner>) -> Self {
        Self { inner }
    }

    #[inline]
    pub(crate) fn downgrade(&self) -> Weak<InjectorInner> {
        Arc::downgrade(&self.inner)
    }

    #[inline]
    fn cx(&self) -> &Arc<CompositionRoot> {
        &self.inner.root
    }

    fn ensure_active(&self) -> Result<(), ResolveErrorKind> {
        if self.inner.scope.is_disposed() {
            let err = ResolveErrorKind::ObjectDisposed { scope: self.handle() };
            error!("{}", err);
            return Err(err);
        }
        Ok(())
    }

    fn is_injector_contract(contract_type: &ContractType) -> bool {
        !contract_type.is_generic_type_definition() && contract_type.type_info() == TypeInfo::of::<Injector>()
    }

    /// Resolves the single surviving registration of the contract.
    ///
    /// Asking for [`Injector`] returns the wrapper of this scope.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::ObjectDisposed`] if the scope is disposed
    /// - Returns [`ResolveErrorKind::ServiceNotFound`] if nothing is registered for the contract
    /// - Returns [`ResolveErrorKind::Instantiator`] if construction of the service or its dependencies fails
    ///
    /// A dependency failure keeps the chain of the services that needed it, match
    /// [`ResolveErrorKind::root_cause`] to get the underlying [`ResolveErrorKind::ServiceNotFound`] or
    /// [`ResolveErrorKind::ObjectDisposed`].
    pub fn resolve_type(&self, contract_type: &ContractType) -> Result<Instance, ResolveErrorKind> {
        let span = info_span!("resolve", contract = contract_type.name(), scope = %self.handle());
        let _guard = span.enter();

        self.ensure_active()?;
        if Self::is_injector_contract(contract_type) {
            debug!("Current scope");
            return Ok(Instance::new(Arc::new(self.clone())));
        }

        let contract_type = self.services().normalize(*contract_type);
        self.inner.scope.resolve_one(&contract_type, self.cx())
    }

    /// Resolves every surviving registration of the contract, empty when nothing matches.
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind`] if the scope is disposed or any registration fails.
    pub fn resolve_many_type(&self, contract_type: &ContractType) -> Result<Vec<Instance>, ResolveErrorKind> {
        let span = info_span!("resolve_many", contract = contract_type.name(), scope = %self.handle());
        let _guard = span.enter();

        self.ensure_active()?;
        let contract_type = self.services().normalize(*contract_type);
        self.inner.scope.resolve_all(&contract_type, self.cx())
    }

    /// Like [`Self::resolve_type`], but a contract without registrations yields `None`.
    ///
    /// # Errors
    /// Any error other than a missing registration of the contract itself is propagated.
    pub fn try_resolve_type(&self, contract_type: &ContractType) -> Result<Option<Instance>, ResolveErrorKind> {
        if !Self::is_injector_contract(contract_type) && self.registrations(contract_type).is_empty() {
            self.ensure_active()?;
            debug!(contract = contract_type.name(), "No registration");
            return Ok(None);
        }
        self.resolve_type(contract_type).map(Some)
    }

    /// # Errors
    /// See [`Self::resolve_type`], plus [`ResolveErrorKind::IncorrectType`] if the registered
    /// instance isn't an `Arc<C>`.
    pub fn resolve<C>(&self) -> Result<Arc<C>, ResolveErrorKind>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        downcast(&self.resolve_type(&ContractType::of::<C>())?)
    }

    /// # Errors
    /// See [`Self::resolve_many_type`].
    pub fn resolve_many<C>(&self) -> Result<Vec<Arc<C>>, ResolveErrorKind>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.resolve_many_type(&ContractType::of::<C>())?
            .iter()
            .map(downcast)
            .collect()
    }

    /// # Errors
    /// See [`Self::try_resolve_type`].
    pub fn try_resolve<C>(&self) -> Result<Option<Arc<C>>, ResolveErrorKind>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.try_resolve_type(&ContractType::of::<C>())?
            .as_ref()
            .map(downcast)
            .transpose()
    }

    /// Resolves a closed generic.
    ///
    /// A registration of `T` itself wins, otherwise the open registration of `T::Definition`
    /// builds `T` and keeps it per closed type.
    ///
    /// # Errors
    /// See [`Self::resolve_type`].
    pub fn resolve_generic<T: GenericComponent>(&self) -> Result<Arc<T>, ResolveErrorKind> {
        let closed = ContractType::of::<T>();
        if !self.registrations(&closed).is_empty() {
            return self.resolve::<T>();
        }

        let span = info_span!("resolve_generic", contract = closed.name(), scope = %self.handle());
        let _guard = span.enter();

        self.ensure_active()?;
        let definition = ContractType::generic_definition::<T::Definition>();
        let instance = match self.registrations(&definition).as_slice() {
            [] => return Err(not_found(type_name::<T>())),
            [service] => {
                debug!(definition = %definition, "Closing open registration");
                let request = ClosedGeneric {
                    service: *service,
                    closed: TypeInfo::of::<T>(),
                    constructor: boxed_component_factory::<T, T>(|component| component),
                    storage: TypedStorage::of::<T>(),
                };
                self.inner.scope.resolve_closed_generic(&request, self.cx())?
            }
            services => return Err(ambiguous(definition.name(), services, self.services())),
        };
        downcast(&instance)
    }

    /// Resolves any [`DependencyResolver`], such as collections, lazies and tuples.
    ///
    /// # Errors
    /// Returns the error of the failing resolution.
    #[inline]
    pub fn get<R: DependencyResolver>(&self) -> Result<R, ResolveErrorKind> {
        R::resolve(self).map_err(Into::into)
    }

    /// Creates a child scope. Scoped services are per scope, singletons are shared with the root.
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind::ObjectDisposed`] if the scope is disposed.
    pub fn create_scope(&self) -> Result<Injector, ResolveErrorKind> {
        self.ensure_active()?;
        let child = self.inner.scope.create_child()?;

        debug!(parent = %self.handle(), scope = %child.handle(), "Scope created");

        Ok(self.cx().injector_for(child))
    }

    /// Disposes the scope: owned instances are finalized in reverse creation order.
    ///
    /// Disposing again does nothing.
    pub fn dispose(&self) {
        let handle = self.handle();
        if self.inner.scope.dispose() {
            self.cx().scopes.remove(handle);
            debug!(scope = %handle, "Scope disposed");
        } else {
            debug!(scope = %handle, "Scope already disposed");
        }
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> ScopeHandle {
        self.inner.scope.handle()
    }

    #[must_use]
    pub fn parent(&self) -> Option<Injector> {
        self.inner
            .scope
            .parent()
            .map(|parent| self.cx().injector_for(parent))
    }

    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.scope.is_disposed()
    }

    /// Returns `true` if both injectors wrap the same scope through the same wrapper.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[inline]
    #[must_use]
    pub fn composition_root(&self) -> &CompositionRoot {
        self.cx()
    }

    #[inline]
    #[must_use]
    pub fn services(&self) -> &ServiceCollection {
        &self.cx().services
    }

    pub(crate) fn registrations(&self, contract_type: &ContractType) -> Vec<ServiceId> {
        self.inner
            .scope
            .registrations(&self.services().normalize(*contract_type))
    }

    pub(crate) fn resolve_registration(&self, service: ServiceId) -> Result<Instance, ResolveErrorKind> {
        self.ensure_active()?;
        self.inner.scope.resolve_registration(service, self.cx())
    }
}

impl Debug for Injector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("scope", &self.handle())
            .field("backend", &self.cx().backend)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

pub(crate) fn downcast<C>(instance: &Instance) -> Result<Arc<C>, ResolveErrorKind>
where
    C: ?Sized + 'static,
{
    instance.downcast::<C>().ok_or_else(|| {
        let err = ResolveErrorKind::IncorrectType {
            expected: type_name::<C>(),
            actual: instance.type_info().name,
        };
        error!("{}", err);
        err
    })
}
