mod ambiguity;
mod build;
mod dependency_resolver;
mod instantiate;
mod instantiator;
mod registration;

pub use ambiguity::AmbiguousServiceDeclaration;
pub use build::BuildErrorKind;
pub use dependency_resolver::ResolveErrorKind;
pub use instantiate::InstantiateErrorKind;
pub use instantiator::InstantiatorErrorKind;
pub use registration::RegistrationErrorKind;
