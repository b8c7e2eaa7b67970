use alloc::sync::Arc;
use tracing::debug;

use crate::{
    any::Instance,
    dependency_resolver::DependencyResolver,
    errors::{InstantiateErrorKind, InstantiatorErrorKind, ResolveErrorKind},
    injector::Injector,
    service::{service_fn, BoxCloneService},
};

/// Factory delegate, called with dependencies resolved from the [`Injector`] of the scope that owns the lifetime.
pub trait Instantiator<Deps>: Clone + 'static
where
    Deps: DependencyResolver,
{
    type Provides: 'static;
    type Error: Into<InstantiateErrorKind>;

    fn instantiate(&mut self, dependencies: Deps) -> Result<Self::Provides, Self::Error>;
}

/// Implementation type with a known constructor.
///
/// Registered through [`crate::ServiceInfoBuilder::implementation`] or [`crate::ServiceInfoBuilder::component`].
pub trait Component: Sized + Send + Sync + 'static {
    type Deps: DependencyResolver;

    /// # Errors
    /// Returns [`InstantiateErrorKind`] when the component can't be built from its dependencies.
    fn construct(dependencies: Self::Deps) -> Result<Self, InstantiateErrorKind>;
}

/// Member of an open generic family.
///
/// Every closed type sharing one `Definition` marker is satisfied by a single open registration
/// made with [`crate::ServiceInfo::generic`], unless a closed registration for the type itself exists.
pub trait GenericComponent: Component {
    type Definition: ?Sized + 'static;
}

type InstantiatorResult = Result<Instance, InstantiatorErrorKind<ResolveErrorKind, InstantiateErrorKind>>;

pub(crate) type BoxedCloneInstantiator =
    BoxCloneService<Injector, Instance, InstantiatorErrorKind<ResolveErrorKind, InstantiateErrorKind>>;

#[must_use]
pub(crate) fn boxed_instantiator_factory<Inst, Deps, C>(instantiator: Inst) -> BoxedCloneInstantiator
where
    Inst: Instantiator<Deps, Provides = Arc<C>> + Send + Sync,
    Deps: DependencyResolver,
    C: ?Sized + Send + Sync + 'static,
{
    BoxCloneService::new(service_fn({
        move |injector: Injector| -> InstantiatorResult {
            let dependencies = match Deps::resolve(&injector) {
                Ok(dependencies) => dependencies,
                Err(err) => return Err(InstantiatorErrorKind::Deps(err.into())),
            };
            let dependency = match instantiator.clone().instantiate(dependencies) {
                Ok(dependency) => dependency,
                Err(err) => return Err(InstantiatorErrorKind::Factory(err.into())),
            };

            debug!("Resolved");

            Ok(Instance::new(dependency))
        }
    }))
}

#[must_use]
pub(crate) fn boxed_component_factory<I, C>(upcast: fn(Arc<I>) -> Arc<C>) -> BoxedCloneInstantiator
where
    I: Component,
    C: ?Sized + Send + Sync + 'static,
{
    BoxCloneService::new(service_fn(move |injector: Injector| -> InstantiatorResult {
        let dependencies =
            <I::Deps as DependencyResolver>::resolve(&injector).map_err(|err| InstantiatorErrorKind::Deps(err.into()))?;
        let component = I::construct(dependencies).map_err(InstantiatorErrorKind::Factory)?;

        debug!(implementation = core::any::type_name::<I>(), "Constructed");

        Ok(Instance::new(upcast(Arc::new(component))))
    }))
}

macro_rules! impl_instantiator {
    (
        [$($ty:ident),*]
    ) => {
        #[allow(non_snake_case)]
        impl<F, Response, Err, $($ty,)*> Instantiator<($($ty,)*)> for F
        where
            F: FnMut($($ty,)*) -> Result<Response, Err> + Clone + 'static,
            Response: 'static,
            Err: Into<InstantiateErrorKind>,
            $( $ty: DependencyResolver + Send, )*
        {
            type Provides = Response;
            type Error = Err;

            fn instantiate(&mut self, ($($ty,)*): ($($ty,)*)) -> Result<Self::Provides, Self::Error> {
                self($($ty,)*)
            }
        }
    };
}

all_the_tuples!(impl_instantiator);

#[cfg(test)]
mod tests {
    use super::{boxed_component_factory, boxed_instantiator_factory, Component, InstantiateErrorKind, Instantiator};
    use crate::{
        collection::ServiceCollection, errors::InstantiatorErrorKind, inject::Inject, service::Service as _,
        Declarations, DependencyResolver, Injector, RegistryBackend, ServiceInfo,
    };

    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicU8, Ordering};
    use tracing::debug;
    use tracing_test::traced_test;

    struct Config(u8);
    struct Client(Arc<Config>);

    impl Component for Client {
        type Deps = Inject<Config>;

        fn construct(Inject(config): Self::Deps) -> Result<Self, InstantiateErrorKind> {
            Ok(Self(config))
        }
    }

    fn injector() -> Injector {
        let collection = ServiceCollection::builder()
            .with_provider(
                Declarations::new("instantiator-tests")
                    .with(ServiceInfo::builder::<Config>().instance(Arc::new(Config(7))).build().unwrap()),
            )
            .build()
            .unwrap();

        Injector::new(&collection, &RegistryBackend).unwrap()
    }

    #[test]
    #[allow(dead_code)]
    fn test_factory_helper() {
        fn resolver<Deps: DependencyResolver, F: Instantiator<Deps>>(_f: F) {}
        fn resolver_with_dep<C: Send + Sync + 'static>() {
            resolver(|| Ok::<_, InstantiateErrorKind>(()));
            resolver(|Inject(_): Inject<C>| Ok::<_, InstantiateErrorKind>(()));
        }
    }

    #[test]
    #[traced_test]
    fn test_boxed_instantiator_factory() {
        let call_count = Arc::new(AtomicU8::new(0));

        let mut instantiator = boxed_instantiator_factory({
            let call_count = call_count.clone();
            move |Inject(config): Inject<Config>| {
                call_count.fetch_add(1, Ordering::SeqCst);

                debug!("Call instantiator");
                Ok::<_, InstantiateErrorKind>(Arc::new(Client(config)))
            }
        });

        let instance = instantiator.call(injector()).unwrap();
        let client = instance.downcast::<Client>().unwrap();

        assert_eq!(client.0 .0, 7);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[traced_test]
    fn test_boxed_component_factory() {
        let mut instantiator = boxed_component_factory::<Client, Client>(|client| client);

        let instance = instantiator.call(injector()).unwrap();

        assert_eq!(instance.downcast::<Client>().unwrap().0 .0, 7);
    }

    #[test]
    #[traced_test]
    fn test_missing_dependency_reported_as_deps() {
        struct Missing;

        let mut instantiator =
            boxed_instantiator_factory(|Inject(_): Inject<Missing>| Ok::<_, InstantiateErrorKind>(Arc::new(())));

        assert!(matches!(instantiator.call(injector()), Err(InstantiatorErrorKind::Deps(_))));
    }
}
