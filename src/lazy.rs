use alloc::{sync::Arc, vec::Vec};
use core::{
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
};
use tracing::debug;

use crate::{
    any::ContractType,
    backend::{ambiguous, not_found},
    collection::ServiceId,
    dependency_resolver::DependencyResolver,
    errors::ResolveErrorKind,
    injector::{downcast, Injector},
    metadata::Metadata,
};

/// Deferred construction of one registration of `C`, carrying the registration's metadata.
pub struct Lazy<C: ?Sized> {
    injector: Injector,
    service: ServiceId,
    metadata: Metadata,
    _contract: PhantomData<fn() -> Arc<C>>,
}

impl<C> Lazy<C>
where
    C: ?Sized + Send + Sync + 'static,
{
    fn new(injector: &Injector, service: ServiceId) -> Result<Self, ResolveErrorKind> {
        let Some(info) = injector.services().get(service) else {
            return Err(not_found(ContractType::of::<C>().name()));
        };
        Ok(Self {
            injector: injector.clone(),
            service,
            metadata: info.metadata().clone(),
            _contract: PhantomData,
        })
    }

    #[inline]
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Builds the value in a new child scope, released together with the export.
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind`] if the scope is disposed or construction fails.
    pub fn create(&self) -> Result<Export<C>, ResolveErrorKind> {
        let scope = self.injector.create_scope()?;
        match scope
            .resolve_registration(self.service)
            .and_then(|instance| downcast::<C>(&instance))
        {
            Ok(value) => {
                debug!(scope = %scope.handle(), "Export created");
                Ok(Export {
                    value,
                    release: Release { scope: Some(scope) },
                })
            }
            Err(err) => {
                scope.dispose();
                Err(err)
            }
        }
    }
}

impl<C: ?Sized> Clone for Lazy<C> {
    fn clone(&self) -> Self {
        Self {
            injector: self.injector.clone(),
            service: self.service,
            metadata: self.metadata.clone(),
            _contract: PhantomData,
        }
    }
}

impl<C: ?Sized> Debug for Lazy<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("service", &self.service)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl<C> DependencyResolver for Lazy<C>
where
    C: ?Sized + Send + Sync + 'static,
{
    type Error = ResolveErrorKind;

    fn resolve(injector: &Injector) -> Result<Self, Self::Error> {
        let contract = ContractType::of::<C>();
        match injector.registrations(&contract).as_slice() {
            [] => Err(not_found(contract.name())),
            [service] => Self::new(injector, *service),
            services => Err(ambiguous(contract.name(), services, injector.services())),
        }
    }
}

impl<C> DependencyResolver for Vec<Lazy<C>>
where
    C: ?Sized + Send + Sync + 'static,
{
    type Error = ResolveErrorKind;

    fn resolve(injector: &Injector) -> Result<Self, Self::Error> {
        injector
            .registrations(&ContractType::of::<C>())
            .into_iter()
            .map(|service| Lazy::new(injector, service))
            .collect()
    }
}

/// Value created by [`Lazy::create`].
///
/// Dropping it releases the scope it was built in.
pub struct Export<C: ?Sized> {
    value: Arc<C>,
    release: Release,
}

impl<C: ?Sized> Export<C> {
    #[inline]
    #[must_use]
    pub fn value(&self) -> &Arc<C> {
        &self.value
    }

    #[inline]
    pub fn release(self) {
        self.release.release();
    }

    /// Splits the value from the handle releasing its scope.
    #[inline]
    #[must_use]
    pub fn into_parts(self) -> (Arc<C>, Release) {
        (self.value, self.release)
    }
}

impl<C: ?Sized> Debug for Export<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Export").field("release", &self.release).finish_non_exhaustive()
    }
}

/// Disposes the sub-scope of one export, never its parent.
#[derive(Debug)]
pub struct Release {
    scope: Option<Injector>,
}

impl Release {
    #[inline]
    pub fn release(mut self) {
        self.dispose();
    }

    fn dispose(&mut self) {
        if let Some(scope) = self.scope.take() {
            scope.dispose();
            debug!(scope = %scope.handle(), "Export released");
        }
    }
}

impl Drop for Release {
    fn drop(&mut self) {
        self.dispose();
    }
}
