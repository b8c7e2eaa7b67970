use alloc::{boxed::Box, string::String, sync::Arc};
use core::{
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
};
use tracing::error;

use crate::{
    any::{ContractType, Instance, TypeInfo},
    backend::typemap::TypedStorage,
    dependency_resolver::DependencyResolver,
    errors::{InstantiatorErrorKind, RegistrationErrorKind, ResolveErrorKind},
    finalizer::{boxed_finalizer_factory, BoxedCloneFinalizer, Finalizer},
    injector::Injector,
    instantiator::{boxed_component_factory, boxed_instantiator_factory, BoxedCloneInstantiator, Component, Instantiator},
    metadata::{Metadata, MetadataValue, IS_OVERRIDE, OVERRIDE_PRIORITY, PROCESSING_PRIORITY},
    priority::Priority,
    service::Service as _,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    #[default]
    Transient,
    Scoped,
    Singleton,
}

#[derive(Clone)]
pub(crate) enum Constructor {
    Closed(BoxedCloneInstantiator),
    OpenGeneric,
}

/// Implementation type, constructed through its [`Component`] constructor.
#[derive(Clone)]
pub struct ImplementationType {
    pub(crate) type_info: TypeInfo,
    pub(crate) constructor: Constructor,
}

impl ImplementationType {
    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    #[inline]
    #[must_use]
    pub const fn is_open_generic(&self) -> bool {
        matches!(self.constructor, Constructor::OpenGeneric)
    }
}

/// Factory delegate.
///
/// What a factory builds is only known once it runs, so two factories are the same
/// implementation only when both declare it through [`ServiceInfoBuilder::implemented_by`].
#[derive(Clone)]
pub struct Factory {
    pub(crate) type_info: TypeInfo,
    pub(crate) implementation: Option<TypeInfo>,
    pub(crate) instantiator: BoxedCloneInstantiator,
}

impl Factory {
    /// Type of the callable.
    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    #[inline]
    #[must_use]
    pub const fn implementation(&self) -> Option<TypeInfo> {
        self.implementation
    }
}

#[derive(Clone)]
pub enum InstancingStrategy {
    ImplementationType(ImplementationType),
    FactoryDelegate(Factory),
    FixedInstance(Instance),
}

impl InstancingStrategy {
    /// Type reported as the implementation in diagnostics.
    #[must_use]
    pub const fn implementation_type(&self) -> TypeInfo {
        match self {
            Self::ImplementationType(implementation) => implementation.type_info,
            Self::FactoryDelegate(factory) => match factory.implementation {
                Some(implementation) => implementation,
                None => factory.type_info,
            },
            Self::FixedInstance(instance) => instance.type_info(),
        }
    }

    /// Returns `true` if both strategies build the same implementation.
    ///
    /// Fixed instances are compared by identity, implementation types by type. Factories match
    /// only on equal declared implementations.
    #[must_use]
    pub fn same_implementation(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::FixedInstance(a), Self::FixedInstance(b)) => a.ptr_eq(b),
            (Self::ImplementationType(a), Self::ImplementationType(b)) => a.type_info == b.type_info,
            (Self::FactoryDelegate(a), Self::FactoryDelegate(b)) => {
                matches!((a.implementation, b.implementation), (Some(a), Some(b)) if a == b)
            }
            _ => false,
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::ImplementationType(_) => "ImplementationType",
            Self::FactoryDelegate(_) => "FactoryDelegate",
            Self::FixedInstance(_) => "FixedInstance",
        }
    }
}

impl Debug for InstancingStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple(self.kind()).field(&self.implementation_type().name).finish()
    }
}

/// Unit of registration. Immutable once built.
#[derive(Clone)]
pub struct ServiceInfo {
    pub(crate) contract_type: ContractType,
    pub(crate) contract_declaration_type: TypeInfo,
    pub(crate) instancing_strategy: InstancingStrategy,
    pub(crate) lifetime: Lifetime,
    pub(crate) allow_multiple: bool,
    pub(crate) externally_owned: bool,
    pub(crate) metadata: Metadata,
    pub(crate) finalizer: Option<BoxedCloneFinalizer>,
    /// Typed accessors of the contract's `Arc<C>`, none for open generic definitions.
    pub(crate) storage: Option<TypedStorage>,
}

impl ServiceInfo {
    #[inline]
    #[must_use]
    pub fn builder<C>() -> ServiceInfoBuilder<C>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        ServiceInfoBuilder::new(ContractType::of::<C>(), None, Some(TypedStorage::of::<C>()))
    }

    /// Starts an open generic registration keyed by the `D` definition marker.
    ///
    /// It satisfies every closed request of a [`crate::GenericComponent`] whose `Definition` is `D`.
    #[inline]
    #[must_use]
    pub fn generic<D>() -> ServiceInfoBuilder<D>
    where
        D: ?Sized + 'static,
    {
        let type_info = TypeInfo::of::<D>();
        ServiceInfoBuilder::new(
            ContractType::generic_definition::<D>(),
            Some(InstancingStrategy::ImplementationType(ImplementationType {
                type_info,
                constructor: Constructor::OpenGeneric,
            })),
            None,
        )
    }

    #[inline]
    #[must_use]
    pub const fn contract_type(&self) -> ContractType {
        self.contract_type
    }

    #[inline]
    #[must_use]
    pub const fn contract_declaration_type(&self) -> TypeInfo {
        self.contract_declaration_type
    }

    #[inline]
    #[must_use]
    pub const fn instancing_strategy(&self) -> &InstancingStrategy {
        &self.instancing_strategy
    }

    #[inline]
    #[must_use]
    pub const fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    #[inline]
    #[must_use]
    pub const fn allow_multiple(&self) -> bool {
        self.allow_multiple
    }

    #[inline]
    #[must_use]
    pub const fn is_externally_owned(&self) -> bool {
        self.externally_owned
    }

    #[inline]
    #[must_use]
    pub const fn is_generic_type_definition(&self) -> bool {
        self.contract_type.is_generic_type_definition()
    }

    #[inline]
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    #[inline]
    #[must_use]
    pub fn processing_priority(&self) -> Priority {
        self.metadata.processing_priority()
    }

    #[inline]
    #[must_use]
    pub fn override_priority(&self) -> Priority {
        self.metadata.override_priority()
    }

    #[inline]
    #[must_use]
    pub fn is_override(&self) -> bool {
        self.metadata.is_override()
    }

    #[inline]
    #[must_use]
    pub fn implementation_name(&self) -> &'static str {
        self.instancing_strategy.implementation_type().name
    }

    /// Whether the runtime runs the finalizer of instances built from this registration.
    ///
    /// Transients, fixed instances and externally owned services are never finalized.
    #[must_use]
    pub(crate) fn is_owned(&self) -> bool {
        self.finalizer.is_some()
            && !self.externally_owned
            && self.lifetime != Lifetime::Transient
            && !matches!(self.instancing_strategy, InstancingStrategy::FixedInstance(_))
    }

    pub(crate) fn with_normalized_types(mut self, contract_type: ContractType, declaration_type: TypeInfo) -> Self {
        self.contract_type = contract_type;
        self.contract_declaration_type = declaration_type;
        self
    }

    /// Builds a new instance with the registration's own strategy.
    pub(crate) fn instantiate(&self, injector: Injector) -> Result<Instance, ResolveErrorKind> {
        match &self.instancing_strategy {
            InstancingStrategy::FixedInstance(instance) => Ok(instance.clone()),
            InstancingStrategy::FactoryDelegate(Factory { instantiator, .. })
            | InstancingStrategy::ImplementationType(ImplementationType {
                constructor: Constructor::Closed(instantiator),
                ..
            }) => call_instantiator(instantiator, injector),
            InstancingStrategy::ImplementationType(ImplementationType {
                constructor: Constructor::OpenGeneric,
                ..
            }) => Err(ResolveErrorKind::ServiceNotFound {
                contract: self.contract_type.name(),
            }),
        }
    }
}

pub(crate) fn call_instantiator(
    instantiator: &BoxedCloneInstantiator,
    injector: Injector,
) -> Result<Instance, ResolveErrorKind> {
    match instantiator.clone().call(injector) {
        Ok(instance) => Ok(instance),
        Err(InstantiatorErrorKind::Deps(err)) => {
            error!("{}", err);
            Err(ResolveErrorKind::Instantiator(InstantiatorErrorKind::Deps(Box::new(err))))
        }
        Err(InstantiatorErrorKind::Factory(err)) => {
            error!("{}", err);
            Err(ResolveErrorKind::Instantiator(InstantiatorErrorKind::Factory(err)))
        }
    }
}

impl Debug for ServiceInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInfo")
            .field("contract_type", &self.contract_type)
            .field("contract_declaration_type", &self.contract_declaration_type.name)
            .field("instancing_strategy", &self.instancing_strategy)
            .field("lifetime", &self.lifetime)
            .field("allow_multiple", &self.allow_multiple)
            .field("externally_owned", &self.externally_owned)
            .field("metadata", &self.metadata)
            .field("finalizer", &self.finalizer.is_some())
            .finish()
    }
}

/// Builder of [`ServiceInfo`].
///
/// Misuse such as setting two instancing strategies is recorded and reported by [`Self::build`].
pub struct ServiceInfoBuilder<C: ?Sized> {
    contract_type: ContractType,
    contract_declaration_type: Option<TypeInfo>,
    instancing_strategy: Option<InstancingStrategy>,
    implemented_by: Option<TypeInfo>,
    lifetime: Option<Lifetime>,
    allow_multiple: bool,
    externally_owned: bool,
    metadata: Metadata,
    finalizer: Option<BoxedCloneFinalizer>,
    error: Option<RegistrationErrorKind>,
    storage: Option<TypedStorage>,
    _contract: PhantomData<fn() -> Arc<C>>,
}

impl<C: ?Sized> ServiceInfoBuilder<C> {
    fn new(
        contract_type: ContractType,
        instancing_strategy: Option<InstancingStrategy>,
        storage: Option<TypedStorage>,
    ) -> Self {
        Self {
            contract_type,
            contract_declaration_type: None,
            instancing_strategy,
            implemented_by: None,
            lifetime: None,
            allow_multiple: false,
            externally_owned: false,
            metadata: Metadata::new(),
            finalizer: None,
            error: None,
            storage,
            _contract: PhantomData,
        }
    }

    fn fail(&mut self, error: RegistrationErrorKind) {
        self.error.get_or_insert(error);
    }

    fn set_strategy(mut self, strategy: InstancingStrategy) -> Self {
        let contract = self.contract_type.name();
        if self.contract_type.is_generic_type_definition() {
            self.fail(RegistrationErrorKind::UnsupportedGenericStrategy { contract });
        } else if self.instancing_strategy.is_some() {
            self.fail(RegistrationErrorKind::MultipleInstancingStrategies { contract });
        } else {
            self.instancing_strategy = Some(strategy);
        }
        self
    }

    #[inline]
    #[must_use]
    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    #[inline]
    #[must_use]
    pub fn transient(self) -> Self {
        self.lifetime(Lifetime::Transient)
    }

    #[inline]
    #[must_use]
    pub fn scoped(self) -> Self {
        self.lifetime(Lifetime::Scoped)
    }

    #[inline]
    #[must_use]
    pub fn singleton(self) -> Self {
        self.lifetime(Lifetime::Singleton)
    }

    #[inline]
    #[must_use]
    pub fn allow_multiple(mut self) -> Self {
        self.allow_multiple = true;
        self
    }

    /// The runtime never finalizes instances of this registration.
    #[inline]
    #[must_use]
    pub fn externally_owned(mut self) -> Self {
        self.externally_owned = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn override_priority(mut self, priority: Priority) -> Self {
        self.metadata.insert(OVERRIDE_PRIORITY, priority);
        self
    }

    #[inline]
    #[must_use]
    pub fn processing_priority(mut self, priority: Priority) -> Self {
        self.metadata.insert(PROCESSING_PRIORITY, priority);
        self
    }

    #[inline]
    #[must_use]
    pub fn is_override(mut self) -> Self {
        self.metadata.insert(IS_OVERRIDE, true);
        self
    }

    #[inline]
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// Declares the type a factory builds, used to tell factories apart.
    #[inline]
    #[must_use]
    pub fn implemented_by<I: ?Sized + 'static>(mut self) -> Self {
        self.implemented_by = Some(TypeInfo::of::<I>());
        self
    }

    /// Type carrying the contract's intrinsic metadata, the contract type itself by default.
    #[inline]
    #[must_use]
    pub fn contract_declaration_type<D: ?Sized + 'static>(mut self) -> Self {
        self.contract_declaration_type = Some(TypeInfo::of::<D>());
        self
    }

    /// # Errors
    /// - Returns [`RegistrationErrorKind::MissingInstancingStrategy`] if no strategy was set
    /// - Returns [`RegistrationErrorKind::ScopedFixedInstance`] if a fixed instance is scoped
    /// - Returns [`RegistrationErrorKind::ImplementationOfNonFactory`] if an implementation is declared
    ///   for anything but a factory
    /// - Returns the first misuse recorded while building
    pub fn build(self) -> Result<ServiceInfo, RegistrationErrorKind> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let contract = self.contract_type.name();
        let Some(mut instancing_strategy) = self.instancing_strategy else {
            return Err(RegistrationErrorKind::MissingInstancingStrategy { contract });
        };

        if let Some(implementation) = self.implemented_by {
            let InstancingStrategy::FactoryDelegate(factory) = &mut instancing_strategy else {
                return Err(RegistrationErrorKind::ImplementationOfNonFactory { contract });
            };
            factory.implementation = Some(implementation);
        }

        let lifetime = match (&instancing_strategy, self.lifetime) {
            (InstancingStrategy::FixedInstance(_), Some(Lifetime::Scoped)) => {
                return Err(RegistrationErrorKind::ScopedFixedInstance { contract });
            }
            (InstancingStrategy::FixedInstance(_), None) => Lifetime::Singleton,
            (_, lifetime) => lifetime.unwrap_or_default(),
        };

        Ok(ServiceInfo {
            contract_type: self.contract_type,
            contract_declaration_type: self.contract_declaration_type.unwrap_or(self.contract_type.type_info()),
            instancing_strategy,
            lifetime,
            allow_multiple: self.allow_multiple,
            externally_owned: self.externally_owned,
            metadata: self.metadata,
            finalizer: self.finalizer,
            storage: self.storage,
        })
    }
}

impl<C> ServiceInfoBuilder<C>
where
    C: ?Sized + Send + Sync + 'static,
{
    /// Registers a factory delegate producing `Arc<C>`.
    #[inline]
    #[must_use]
    pub fn factory<Deps, F>(self, factory: F) -> Self
    where
        Deps: DependencyResolver,
        F: Instantiator<Deps, Provides = Arc<C>> + Send + Sync,
    {
        self.set_strategy(InstancingStrategy::FactoryDelegate(Factory {
            type_info: TypeInfo::of::<F>(),
            implementation: None,
            instantiator: boxed_instantiator_factory(factory),
        }))
    }

    /// Registers the `I` implementation type, exposed as `C` through `upcast`.
    #[inline]
    #[must_use]
    pub fn implementation<I: Component>(self, upcast: fn(Arc<I>) -> Arc<C>) -> Self {
        self.set_strategy(InstancingStrategy::ImplementationType(ImplementationType {
            type_info: TypeInfo::of::<I>(),
            constructor: Constructor::Closed(boxed_component_factory(upcast)),
        }))
    }

    /// Registers an instance created outside the runtime. Implicitly singleton.
    #[inline]
    #[must_use]
    pub fn instance(self, value: Arc<C>) -> Self {
        self.set_strategy(InstancingStrategy::FixedInstance(Instance::new(value)))
    }

    #[must_use]
    pub fn finalizer<Fin: Finalizer<C>>(mut self, finalizer: Fin) -> Self {
        if self.contract_type.is_generic_type_definition() {
            let contract = self.contract_type.name();
            self.fail(RegistrationErrorKind::GenericFinalizer { contract });
        } else {
            self.finalizer = Some(boxed_finalizer_factory(finalizer));
        }
        self
    }
}

impl<C: Component> ServiceInfoBuilder<C> {
    /// Registers `C` as its own implementation type.
    #[inline]
    #[must_use]
    pub fn component(self) -> Self {
        self.implementation::<C>(|component| component)
    }
}

#[derive(Debug, Clone)]
pub struct ContractDeclaration {
    pub contract_type: ContractType,
    pub service_info: ServiceInfo,
}

impl From<ServiceInfo> for ContractDeclaration {
    #[inline]
    fn from(service_info: ServiceInfo) -> Self {
        Self {
            contract_type: service_info.contract_type,
            service_info,
        }
    }
}

/// Service reported by a provider as part of the application, with the type declaring its contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppService {
    pub service_type: TypeInfo,
    pub contract_declaration_type: TypeInfo,
}

impl AppService {
    #[inline]
    #[must_use]
    pub fn of<S, D>() -> Self
    where
        S: ?Sized + 'static,
        D: ?Sized + 'static,
    {
        Self {
            service_type: TypeInfo::of::<S>(),
            contract_declaration_type: TypeInfo::of::<D>(),
        }
    }
}
