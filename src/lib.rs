extern crate alloc;

#[macro_use]
pub(crate) mod macros;

pub(crate) mod activation;
pub(crate) mod aggregator;
pub(crate) mod ambiguity;
pub(crate) mod any;
pub mod backend;
pub(crate) mod cache;
pub(crate) mod collection;
pub(crate) mod config;
pub(crate) mod contract;
pub(crate) mod dependency_resolver;
pub(crate) mod errors;
pub(crate) mod finalizer;
pub(crate) mod inject;
pub(crate) mod injector;
pub(crate) mod instantiator;
pub(crate) mod lazy;
pub(crate) mod lock;
pub(crate) mod metadata;
pub(crate) mod priority;
pub(crate) mod provider;
pub(crate) mod scope;
pub(crate) mod service;

pub use any::{ContractType, Instance, TypeInfo};
pub use backend::{Backend, BackendScope, ClosedGeneric, RegistryBackend, SlotBackend, TypeMapBackend};
pub use collection::{ServiceCollection, ServiceCollectionBuilder, ServiceId};
pub use config::{AmbiguousServiceResolutionStrategy, Config};
pub use contract::{
    AppService, ContractDeclaration, Factory, ImplementationType, InstancingStrategy, Lifetime, ServiceInfo,
    ServiceInfoBuilder,
};
pub use dependency_resolver::DependencyResolver;
pub use errors::{
    AmbiguousServiceDeclaration, BuildErrorKind, InstantiateErrorKind, InstantiatorErrorKind, RegistrationErrorKind,
    ResolveErrorKind,
};
pub use finalizer::Finalizer;
pub use inject::{Inject, InjectGeneric};
pub use injector::{CompositionRoot, Injector};
pub use instantiator::{Component, GenericComponent, Instantiator};
pub use lazy::{Export, Lazy, Release};
pub use metadata::{Metadata, MetadataValue, IS_OVERRIDE, OVERRIDE_PRIORITY, PROCESSING_PRIORITY};
pub use priority::Priority;
pub use provider::{distributed_slice, linkme, DeclarationProvider, Declarations, LinkedDeclarations, DECLARATIONS};
pub use scope::ScopeHandle;
