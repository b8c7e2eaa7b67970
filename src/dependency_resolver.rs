use alloc::{boxed::Box, collections::VecDeque, sync::Arc, vec::Vec};
use core::any::type_name;
use tracing::debug_span;

use crate::{errors::ResolveErrorKind, injector::Injector};

/// Dependency requested by a factory delegate or a [`crate::Component`] constructor.
pub trait DependencyResolver: Sized {
    type Error: Into<ResolveErrorKind>;

    /// # Errors
    /// Returns the error of the failing resolution.
    fn resolve(injector: &Injector) -> Result<Self, Self::Error>;
}

impl DependencyResolver for Injector {
    type Error = ResolveErrorKind;

    #[inline]
    fn resolve(injector: &Injector) -> Result<Self, Self::Error> {
        Ok(injector.clone())
    }
}

impl<C> DependencyResolver for Option<Arc<C>>
where
    C: ?Sized + Send + Sync + 'static,
{
    type Error = ResolveErrorKind;

    #[inline]
    fn resolve(injector: &Injector) -> Result<Self, Self::Error> {
        injector.try_resolve::<C>()
    }
}

macro_rules! impl_collection_resolver {
    ($($collection:ty),*) => {
        $(
            impl<C> DependencyResolver for $collection
            where
                C: ?Sized + Send + Sync + 'static,
            {
                type Error = ResolveErrorKind;

                fn resolve(injector: &Injector) -> Result<Self, Self::Error> {
                    let span = debug_span!("resolve_collection", collection = type_name::<Self>());
                    let _guard = span.enter();

                    injector.resolve_many::<C>().map(Into::into)
                }
            }
        )*
    };
}

impl_collection_resolver!(Vec<Arc<C>>, VecDeque<Arc<C>>, Box<[Arc<C>]>, Arc<[Arc<C>]>);

macro_rules! impl_dependency_resolver {
    (
        [$($ty:ident),*]
    ) => {
        #[allow(non_snake_case)]
        impl<$($ty,)*> DependencyResolver for ($($ty,)*)
        where
            $( $ty: DependencyResolver, )*
        {
            type Error = ResolveErrorKind;

            #[inline]
            #[allow(unused_variables)]
            fn resolve(injector: &Injector) -> Result<Self, Self::Error> {
                Ok(($($ty::resolve(injector).map_err(Into::into)?,)*))
            }
        }
    };
}

all_the_tuples!(impl_dependency_resolver);
