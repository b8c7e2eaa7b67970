use alloc::{boxed::Box, collections::BTreeMap, sync::Arc, vec::Vec};
use core::fmt::{self, Debug, Formatter};
use tracing::{debug, info, warn};

use crate::{
    aggregator::{aggregate, TypeAliases},
    ambiguity,
    any::{ContractType, TypeInfo},
    config::{AmbiguousServiceResolutionStrategy, Config},
    contract::{AppService, ServiceInfo},
    errors::BuildErrorKind,
    provider::DeclarationProvider,
};

/// Index of a registration inside its [`ServiceCollection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceId(pub(crate) usize);

impl ServiceId {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Frozen set of registrations, keyed by normalized contract type.
///
/// Cheap to clone, every clone shares the same registrations.
#[derive(Clone)]
pub struct ServiceCollection {
    inner: Arc<CollectionInner>,
}

struct CollectionInner {
    services: Vec<ServiceInfo>,
    by_contract: BTreeMap<ContractType, Box<[ServiceId]>>,
    app_services: Vec<AppService>,
    aliases: TypeAliases,
    config: Config,
}

impl ServiceCollection {
    #[inline]
    #[must_use]
    pub fn builder() -> ServiceCollectionBuilder {
        ServiceCollectionBuilder::new()
    }

    fn new(services: Vec<ServiceInfo>, app_services: Vec<AppService>, aliases: TypeAliases, config: Config) -> Self {
        let mut by_contract: BTreeMap<ContractType, Vec<ServiceId>> = BTreeMap::new();
        for (index, info) in services.iter().enumerate() {
            by_contract.entry(info.contract_type).or_default().push(ServiceId(index));
        }

        Self {
            inner: Arc::new(CollectionInner {
                services,
                by_contract: by_contract
                    .into_iter()
                    .map(|(contract, ids)| (contract, ids.into_boxed_slice()))
                    .collect(),
                app_services,
                aliases,
                config,
            }),
        }
    }

    /// Collection over already resolved registrations, skipping aggregation.
    #[cfg(test)]
    #[must_use]
    pub(crate) fn from_services(services: Vec<ServiceInfo>) -> Self {
        Self::new(services, Vec::new(), TypeAliases::default(), Config::default())
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.services.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.services.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: ServiceId) -> Option<&ServiceInfo> {
        self.inner.services.get(id.0)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (ServiceId, &ServiceInfo)> + '_ {
        self.inner
            .services
            .iter()
            .enumerate()
            .map(|(index, info)| (ServiceId(index), info))
    }

    /// Surviving registrations of the contract in resolution order, empty when nothing matches.
    #[must_use]
    pub fn registrations(&self, contract_type: &ContractType) -> &[ServiceId] {
        self.inner
            .by_contract
            .get(&self.normalize(*contract_type))
            .map(|ids| &ids[..])
            .unwrap_or(&[])
    }

    #[inline]
    pub fn contracts(&self) -> impl Iterator<Item = &ContractType> + '_ {
        self.inner.by_contract.keys()
    }

    #[inline]
    #[must_use]
    pub fn app_services(&self) -> &[AppService] {
        &self.inner.app_services
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    #[inline]
    #[must_use]
    pub fn normalize(&self, contract_type: ContractType) -> ContractType {
        self.inner.aliases.normalize_contract(contract_type)
    }

    /// Returns `true` if both collections share the same registrations.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Debug for ServiceCollection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCollection")
            .field("services", &self.inner.services)
            .field("app_services", &self.inner.app_services)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Aggregates providers into a [`ServiceCollection`].
///
/// The first successful [`Self::build`] freezes the builder, later changes are ignored.
#[derive(Default)]
pub struct ServiceCollectionBuilder {
    providers: Vec<Box<dyn DeclarationProvider>>,
    aliases: TypeAliases,
    config: Config,
    built: Option<ServiceCollection>,
}

impl ServiceCollectionBuilder {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn is_frozen(&self) -> bool {
        if self.built.is_some() {
            warn!("Collection already built, change ignored");
            return true;
        }
        false
    }

    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        if !self.is_frozen() {
            self.config = config;
        }
        self
    }

    #[inline]
    #[must_use]
    pub fn with_strategy(mut self, strategy: AmbiguousServiceResolutionStrategy) -> Self {
        if !self.is_frozen() {
            self.config.ambiguity_strategy = strategy;
        }
        self
    }

    #[inline]
    #[must_use]
    pub fn with_provider<P: DeclarationProvider + 'static>(mut self, provider: P) -> Self {
        self.add_provider(provider);
        self
    }

    #[inline]
    pub fn add_provider<P: DeclarationProvider + 'static>(&mut self, provider: P) -> &mut Self {
        if !self.is_frozen() {
            self.providers.push(Box::new(provider));
        }
        self
    }

    /// Collapses the `Proxy` type onto `Canonical` wherever a type is declared or requested.
    #[inline]
    #[must_use]
    pub fn with_type_alias<Proxy, Canonical>(mut self) -> Self
    where
        Proxy: ?Sized + 'static,
        Canonical: ?Sized + 'static,
    {
        if !self.is_frozen() {
            self.aliases.insert(TypeInfo::of::<Proxy>(), TypeInfo::of::<Canonical>());
        }
        self
    }

    /// Aggregates every provider and resolves competing declarations.
    ///
    /// Building again returns the same frozen collection.
    ///
    /// # Errors
    /// - Returns [`BuildErrorKind::Provider`] with the error of a failing provider
    /// - Returns [`BuildErrorKind::AmbiguousServiceDeclaration`] if strict resolution finds a tie
    pub fn build(&mut self) -> Result<ServiceCollection, BuildErrorKind> {
        if let Some(collection) = &self.built {
            debug!("Collection already built");
            return Ok(collection.clone());
        }

        let aggregated = aggregate(&self.providers, &self.aliases)?;
        let services = ambiguity::resolve(&aggregated.declarations, self.config.ambiguity_strategy)?;

        info!(
            providers = self.providers.len(),
            declarations = aggregated.declarations.len(),
            services = services.len(),
            "Service collection built"
        );

        let collection = ServiceCollection::new(services, aggregated.app_services, self.aliases.clone(), self.config);
        self.built = Some(collection.clone());
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::{ServiceCollection, ServiceCollectionBuilder};
    use crate::{
        any::ContractType, config::AmbiguousServiceResolutionStrategy, errors::BuildErrorKind,
        priority::Priority, provider::Declarations, InstantiateErrorKind, ServiceInfo,
    };

    use alloc::sync::Arc;
    use tracing_test::traced_test;

    trait Cache: Send + Sync {}

    struct Local;
    struct Remote;
    struct Proxy;

    impl Cache for Local {}
    impl Cache for Remote {}

    fn local() -> ServiceInfo {
        ServiceInfo::builder::<dyn Cache>()
            .factory(|| Ok::<_, InstantiateErrorKind>(Arc::new(Local) as Arc<dyn Cache>))
            .build()
            .unwrap()
    }

    fn remote() -> ServiceInfo {
        ServiceInfo::builder::<dyn Cache>()
            .factory(|| Ok::<_, InstantiateErrorKind>(Arc::new(Remote) as Arc<dyn Cache>))
            .build()
            .unwrap()
    }

    #[test]
    #[traced_test]
    fn test_build_is_idempotent() {
        let mut builder = ServiceCollectionBuilder::new().with_provider(Declarations::new("app").with(local()));

        let first = builder.build().unwrap();
        let second = builder.build().unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(first.len(), 1);

        builder.add_provider(Declarations::new("more").with(remote()));
        let third = builder.build().unwrap();
        assert!(first.ptr_eq(&third));
        assert_eq!(third.len(), 1);
        assert!(logs_contain("Collection already built, change ignored"));
    }

    #[test]
    #[traced_test]
    fn test_strict_build_fails() {
        let mut builder = ServiceCollection::builder()
            .with_strategy(AmbiguousServiceResolutionStrategy::Strict)
            .with_provider(Declarations::new("framework").with(local()))
            .with_provider(Declarations::new("app").with(remote()));

        let Err(BuildErrorKind::AmbiguousServiceDeclaration(err)) = builder.build() else {
            panic!("ambiguity expected");
        };
        assert_eq!(err.implementations.len(), 2);
    }

    #[test]
    #[traced_test]
    fn test_provider_processing_order_decides_tie() {
        let collection = ServiceCollection::builder()
            .with_provider(Declarations::new("app").with(remote()))
            .with_provider(Declarations::new("framework").with_processing_priority(Priority::HIGH).with(local()))
            .build()
            .unwrap();

        let [id] = collection.registrations(&ContractType::of::<dyn Cache>()) else {
            panic!("single registration expected");
        };
        let winner = collection.get(*id).unwrap();
        assert!(winner.implementation_name().contains("remote"));
    }

    #[test]
    #[traced_test]
    fn test_alias_lookup() {
        let collection = ServiceCollection::builder()
            .with_type_alias::<Proxy, Local>()
            .with_provider(
                Declarations::new("app").with(ServiceInfo::builder::<Local>().instance(Arc::new(Local)).build().unwrap()),
            )
            .build()
            .unwrap();

        assert_eq!(collection.registrations(&ContractType::of::<Proxy>()).len(), 1);
        assert!(collection.registrations(&ContractType::of::<Remote>()).is_empty());
    }
}
