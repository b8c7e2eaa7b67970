use alloc::{boxed::Box, vec::Vec};

use super::{ambiguity::AmbiguousServiceDeclaration, instantiate::InstantiateErrorKind, instantiator::InstantiatorErrorKind};
use crate::scope::ScopeHandle;

#[derive(thiserror::Error, Debug)]
pub enum ResolveErrorKind {
    #[error("Service not found for contract {contract}")]
    ServiceNotFound { contract: &'static str },
    #[error(transparent)]
    AmbiguousServiceDeclaration(#[from] AmbiguousServiceDeclaration),
    #[error("Scope {scope} is disposed")]
    ObjectDisposed { scope: ScopeHandle },
    #[error("Circular dependency detected: {}", .chain.join(" -> "))]
    CircularDependency { chain: Vec<&'static str> },
    #[error("Incorrect instance type. Actual: {actual}, expected: {expected}")]
    IncorrectType { expected: &'static str, actual: &'static str },
    #[error(transparent)]
    Instantiator(InstantiatorErrorKind<Box<ResolveErrorKind>, InstantiateErrorKind>),
}

impl ResolveErrorKind {
    /// Innermost error of a dependency failure chain.
    #[must_use]
    pub fn root_cause(&self) -> &ResolveErrorKind {
        match self {
            Self::Instantiator(InstantiatorErrorKind::Deps(err)) => err.root_cause(),
            err => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InstantiateErrorKind, InstantiatorErrorKind, ResolveErrorKind};

    #[test]
    fn test_root_cause_unwraps_deps_chain() {
        let err = ResolveErrorKind::Instantiator(InstantiatorErrorKind::Deps(Box::new(ResolveErrorKind::Instantiator(
            InstantiatorErrorKind::Deps(Box::new(ResolveErrorKind::ServiceNotFound { contract: "Db" })),
        ))));

        assert!(matches!(err.root_cause(), ResolveErrorKind::ServiceNotFound { contract: "Db" }));
        assert_eq!(err.to_string(), "Service not found for contract Db");
    }

    #[test]
    fn test_factory_error_is_root() {
        let err = ResolveErrorKind::Instantiator(InstantiatorErrorKind::Factory(InstantiateErrorKind::Custom(
            anyhow::anyhow!("boom"),
        )));

        assert!(matches!(err.root_cause(), ResolveErrorKind::Instantiator(InstantiatorErrorKind::Factory(_))));
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_cycle_message() {
        let err = ResolveErrorKind::CircularDependency { chain: vec!["A", "B", "A"] };

        assert_eq!(err.to_string(), "Circular dependency detected: A -> B -> A");
    }
}
