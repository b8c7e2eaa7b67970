/// Two or more same-rank, single-mode declarations for one contract.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Ambiguous service declaration for contract {contract}. \
    Tied implementations: {implementations:?}, overrides: {overrides:?}"
)]
pub struct AmbiguousServiceDeclaration {
    pub contract: &'static str,
    pub implementations: Vec<&'static str>,
    pub overrides: Vec<&'static str>,
}
