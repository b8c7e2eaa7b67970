/// How the ambiguity resolver treats same-rank declarations of a single-mode contract.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AmbiguousServiceResolutionStrategy {
    /// The best rank wins, ties go to the last-registered declaration.
    #[default]
    ForcePriority,
    /// A tie at the best rank between distinct implementations fails the build.
    Strict,
}

/// Config of a composition root
/// ## Fields
/// - `ambiguity_strategy`:
///   Strategy applied to competing single-mode declarations, see [`AmbiguousServiceResolutionStrategy`].
/// - `detect_cycles`:
///   If `true`, a service that transitively depends on itself fails with
///   [`crate::ResolveErrorKind::CircularDependency`] instead of recursing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub ambiguity_strategy: AmbiguousServiceResolutionStrategy,
    pub detect_cycles: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ambiguity_strategy: AmbiguousServiceResolutionStrategy::default(),
            detect_cycles: true,
        }
    }
}
