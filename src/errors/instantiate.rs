use core::convert::Infallible;

use super::dependency_resolver::ResolveErrorKind;

/// Failure raised by a factory delegate or an implementation constructor.
#[derive(thiserror::Error, Debug)]
pub enum InstantiateErrorKind {
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}

impl From<Infallible> for InstantiateErrorKind {
    fn from(value: Infallible) -> Self {
        match value {}
    }
}

impl From<ResolveErrorKind> for InstantiateErrorKind {
    #[inline]
    fn from(value: ResolveErrorKind) -> Self {
        Self::Custom(value.into())
    }
}
