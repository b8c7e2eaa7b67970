use alloc::sync::Arc;
use core::ops::Deref;

use crate::{dependency_resolver::DependencyResolver, errors::ResolveErrorKind, injector::Injector, instantiator::GenericComponent};

/// Single registration of the `C` contract.
pub struct Inject<C: ?Sized>(pub Arc<C>);

impl<C> DependencyResolver for Inject<C>
where
    C: ?Sized + Send + Sync + 'static,
{
    type Error = ResolveErrorKind;

    #[inline]
    fn resolve(injector: &Injector) -> Result<Self, Self::Error> {
        injector.resolve::<C>().map(Self)
    }
}

impl<C: ?Sized> Deref for Inject<C> {
    type Target = C;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Closed generic `T`, from its own registration or from the open registration of its family.
pub struct InjectGeneric<T>(pub Arc<T>);

impl<T: GenericComponent> DependencyResolver for InjectGeneric<T> {
    type Error = ResolveErrorKind;

    #[inline]
    fn resolve(injector: &Injector) -> Result<Self, Self::Error> {
        injector.resolve_generic::<T>().map(Self)
    }
}

impl<T> Deref for InjectGeneric<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
