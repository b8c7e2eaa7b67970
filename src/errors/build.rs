use super::{ambiguity::AmbiguousServiceDeclaration, registration::RegistrationErrorKind};

/// Failure of [`crate::ServiceCollectionBuilder::build`] or of a backend materializing a collection.
#[derive(thiserror::Error, Debug)]
pub enum BuildErrorKind {
    #[error(transparent)]
    Provider(#[from] anyhow::Error),
    #[error(transparent)]
    InvalidRegistration(#[from] RegistrationErrorKind),
    #[error(transparent)]
    AmbiguousServiceDeclaration(#[from] AmbiguousServiceDeclaration),
}
