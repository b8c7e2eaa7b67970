use alloc::sync::Arc;
use core::any::type_name;
use tracing::error;

use crate::{
    any::Instance,
    service::{service_fn, BoxCloneService},
};

/// Teardown callback, run when the scope owning the instance is disposed.
pub trait Finalizer<C: ?Sized>: Clone + Send + Sync + 'static {
    fn finalize(&mut self, dependency: Arc<C>);
}

pub(crate) type BoxedCloneFinalizer = BoxCloneService<Instance, (), ()>;

#[must_use]
pub(crate) fn boxed_finalizer_factory<C, Fin>(mut finalizer: Fin) -> BoxedCloneFinalizer
where
    C: ?Sized + Send + Sync + 'static,
    Fin: Finalizer<C>,
{
    BoxCloneService::new(service_fn(move |instance: Instance| {
        let Some(dependency) = instance.downcast::<C>() else {
            error!(
                expected = type_name::<C>(),
                actual = instance.type_info().name,
                "Finalizer skipped, incorrect instance type"
            );
            return Err(());
        };
        finalizer.finalize(dependency);
        Ok(())
    }))
}

impl<F, C> Finalizer<C> for F
where
    F: FnMut(Arc<C>) + Clone + Send + Sync + 'static,
    C: ?Sized,
{
    #[inline]
    fn finalize(&mut self, dependency: Arc<C>) {
        self(dependency);
    }
}
