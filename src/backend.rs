//! Engines materializing a [`ServiceCollection`] behind the [`crate::Injector`] contract.
//!
//! An engine translates registrations into its own primitives once, in [`Backend::materialize`],
//! and serves every resolution through the returned root [`BackendScope`].

pub mod registry;
pub mod slots;
pub mod typemap;

use alloc::{sync::Arc, vec::Vec};
use tracing::error;

use crate::{
    activation::{self, ActivationGuard, ActivationKey},
    any::{ContractType, Instance, TypeInfo},
    collection::{ServiceCollection, ServiceId},
    contract::{call_instantiator, ServiceInfo},
    errors::{AmbiguousServiceDeclaration, BuildErrorKind, ResolveErrorKind},
    injector::CompositionRoot,
    instantiator::BoxedCloneInstantiator,
    scope::ScopeHandle,
};
use typemap::TypedStorage;

pub use registry::RegistryBackend;
pub use slots::SlotBackend;
pub use typemap::TypeMapBackend;

/// Strategy building the root scope of a composition root.
pub trait Backend {
    fn name(&self) -> &'static str;

    /// Translates every registration into the engine's own primitives.
    ///
    /// # Errors
    /// Returns [`BuildErrorKind`] if the collection can't be expressed by the engine.
    fn materialize(&self, services: &ServiceCollection) -> Result<Arc<dyn BackendScope>, BuildErrorKind>;
}

/// Closed request of an open generic registration.
pub struct ClosedGeneric {
    pub(crate) service: ServiceId,
    pub(crate) closed: TypeInfo,
    pub(crate) constructor: BoxedCloneInstantiator,
    pub(crate) storage: TypedStorage,
}

impl ClosedGeneric {
    #[inline]
    #[must_use]
    pub const fn service(&self) -> ServiceId {
        self.service
    }

    #[inline]
    #[must_use]
    pub const fn closed(&self) -> TypeInfo {
        self.closed
    }
}

/// Scope of an engine: owns the instances of its lifetime and their teardown.
pub trait BackendScope: Send + Sync {
    fn handle(&self) -> ScopeHandle;

    /// Navigation only, the parent isn't kept alive by its children.
    fn parent(&self) -> Option<Arc<dyn BackendScope>>;

    /// Registrations of the contract in resolution order.
    fn registrations(&self, contract: &ContractType) -> Vec<ServiceId>;

    /// Resolves one specific registration, building it in the scope owning its lifetime.
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind`] if the scope is disposed or construction fails.
    fn resolve_registration(&self, service: ServiceId, cx: &Arc<CompositionRoot>) -> Result<Instance, ResolveErrorKind>;

    /// # Errors
    /// Returns [`ResolveErrorKind`] if the scope is disposed or construction fails.
    fn resolve_closed_generic(
        &self,
        request: &ClosedGeneric,
        cx: &Arc<CompositionRoot>,
    ) -> Result<Instance, ResolveErrorKind>;

    /// # Errors
    /// Returns [`ResolveErrorKind::ObjectDisposed`] if the scope is disposed.
    fn create_child(&self) -> Result<Arc<dyn BackendScope>, ResolveErrorKind>;

    /// Atomically marks the scope disposed and runs finalizers of its owned instances in reverse
    /// creation order. Returns `false` if it was already disposed.
    fn dispose(&self) -> bool;

    fn is_disposed(&self) -> bool;

    /// # Errors
    /// - Returns [`ResolveErrorKind::ServiceNotFound`] if nothing is registered for the contract
    /// - Returns [`ResolveErrorKind::AmbiguousServiceDeclaration`] if more than one registration survived
    fn resolve_one(&self, contract: &ContractType, cx: &Arc<CompositionRoot>) -> Result<Instance, ResolveErrorKind> {
        match self.registrations(contract).as_slice() {
            [] => Err(not_found(contract.name())),
            [service] => self.resolve_registration(*service, cx),
            services => Err(ambiguous(contract.name(), services, cx.services())),
        }
    }

    /// Resolves every registration of the contract, empty when nothing matches.
    ///
    /// # Errors
    /// Returns the first [`ResolveErrorKind`] raised by a registration.
    fn resolve_all(&self, contract: &ContractType, cx: &Arc<CompositionRoot>) -> Result<Vec<Instance>, ResolveErrorKind> {
        self.registrations(contract)
            .into_iter()
            .map(|service| self.resolve_registration(service, cx))
            .collect()
    }
}

pub(crate) fn not_found(contract: &'static str) -> ResolveErrorKind {
    let err = ResolveErrorKind::ServiceNotFound { contract };
    error!("{}", err);
    err
}

pub(crate) fn ambiguous(contract: &'static str, services: &[ServiceId], collection: &ServiceCollection) -> ResolveErrorKind {
    let infos: Vec<&ServiceInfo> = services.iter().filter_map(|service| collection.get(*service)).collect();
    let err = ResolveErrorKind::AmbiguousServiceDeclaration(AmbiguousServiceDeclaration {
        contract,
        implementations: infos.iter().map(|info| info.implementation_name()).collect(),
        overrides: infos
            .iter()
            .filter(|info| info.is_override())
            .map(|info| info.implementation_name())
            .collect(),
    });
    error!("{}", err);
    err
}

/// Marks the construction as running on this thread when cycle detection is on.
pub(crate) fn activate(
    cx: &CompositionRoot,
    owner: ScopeHandle,
    service: ServiceId,
    info: &ServiceInfo,
    closed: Option<&ClosedGeneric>,
) -> Result<Option<ActivationGuard>, ResolveErrorKind> {
    if !cx.config().detect_cycles {
        return Ok(None);
    }
    activation::enter(ActivationKey {
        owner,
        service,
        closed: closed.map(|request| request.closed.id),
        name: closed.map_or(info.contract_type.name(), |request| request.closed.name),
    })
    .map(Some)
}

/// Builds a new instance with the [`crate::Injector`] of the owning scope.
pub(crate) fn instantiate(
    cx: &Arc<CompositionRoot>,
    owner: Arc<dyn BackendScope>,
    info: &ServiceInfo,
    closed: Option<&ClosedGeneric>,
) -> Result<Instance, ResolveErrorKind> {
    let injector = cx.injector_for(owner);
    match closed {
        Some(request) => call_instantiator(&request.constructor, injector),
        None => info.instantiate(injector),
    }
}
