/// Invalid registration, reported when a [`crate::ServiceInfo`] is built.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationErrorKind {
    #[error("No instancing strategy set for contract {contract}")]
    MissingInstancingStrategy { contract: &'static str },
    #[error("More than one instancing strategy set for contract {contract}")]
    MultipleInstancingStrategies { contract: &'static str },
    #[error("Fixed instance for contract {contract} can't have scoped lifetime")]
    ScopedFixedInstance { contract: &'static str },
    #[error("Open generic contract {contract} only supports implementation types")]
    UnsupportedGenericStrategy { contract: &'static str },
    #[error("Open generic contract {contract} can't carry a finalizer")]
    GenericFinalizer { contract: &'static str },
    #[error("Implementation of contract {contract} can only be declared for a factory")]
    ImplementationOfNonFactory { contract: &'static str },
}
