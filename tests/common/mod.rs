#![allow(dead_code)]

use servitor::{
    Backend, BuildErrorKind, Declarations, Injector, RegistryBackend, ServiceCollection, SlotBackend, TypeMapBackend,
};

pub const BACKENDS: [&(dyn Backend + Sync); 3] = [&RegistryBackend, &SlotBackend, &TypeMapBackend];

/// Runs `check` once per backend over a fresh composition root of the declarations.
pub fn for_each_backend(declarations: impl Fn() -> Declarations, check: impl Fn(Injector)) {
    for backend in BACKENDS {
        let collection = ServiceCollection::builder()
            .with_provider(declarations())
            .build()
            .unwrap();
        check(Injector::new(&collection, backend).unwrap());
    }
}

pub fn materialize(collection: &ServiceCollection) -> Result<Vec<Injector>, BuildErrorKind> {
    BACKENDS
        .iter()
        .map(|backend| Injector::new(collection, *backend))
        .collect()
}
