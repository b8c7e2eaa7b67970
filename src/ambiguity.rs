use alloc::{collections::BTreeMap, vec::Vec};
use tracing::{debug, warn};

use crate::{
    any::ContractType,
    config::AmbiguousServiceResolutionStrategy,
    contract::{ContractDeclaration, ServiceInfo},
    errors::AmbiguousServiceDeclaration,
};

/// Picks the surviving registrations of every contract.
///
/// Groups keep the order in which their contract first appeared. A group where every declaration
/// allows multiple registrations keeps all of them by processing priority, otherwise exactly one
/// survives by override priority.
///
/// # Errors
/// Returns [`AmbiguousServiceDeclaration`] under [`AmbiguousServiceResolutionStrategy::Strict`] when
/// distinct implementations tie at the best rank.
pub(crate) fn resolve(
    declarations: &[ContractDeclaration],
    strategy: AmbiguousServiceResolutionStrategy,
) -> Result<Vec<ServiceInfo>, AmbiguousServiceDeclaration> {
    let mut groups: Vec<(ContractType, Vec<&ServiceInfo>)> = Vec::new();
    let mut index: BTreeMap<ContractType, usize> = BTreeMap::new();

    for declaration in declarations {
        let position = *index.entry(declaration.contract_type).or_insert_with(|| {
            groups.push((declaration.contract_type, Vec::new()));
            groups.len() - 1
        });
        groups[position].1.push(&declaration.service_info);
    }

    let mut survivors = Vec::with_capacity(declarations.len());
    for (contract, group) in groups {
        if group.iter().all(|info| info.allow_multiple) {
            let mut group = group;
            group.sort_by_key(|info| info.processing_priority());
            survivors.extend(group.into_iter().cloned());
        } else {
            survivors.extend(resolve_single(contract, &group, strategy)?.cloned());
        }
    }

    Ok(survivors)
}

fn resolve_single<'a>(
    contract: ContractType,
    group: &[&'a ServiceInfo],
    strategy: AmbiguousServiceResolutionStrategy,
) -> Result<Option<&'a ServiceInfo>, AmbiguousServiceDeclaration> {
    let best = group
        .iter()
        .map(|info| info.override_priority())
        .min()
        .unwrap_or_default();
    let tied: Vec<&ServiceInfo> = group
        .iter()
        .copied()
        .filter(|info| info.override_priority() == best)
        .collect();

    let Some(winner) = tied.last().copied() else {
        return Ok(None);
    };

    let mut distinct: Vec<&ServiceInfo> = Vec::with_capacity(tied.len());
    for info in tied.iter().copied() {
        if !distinct
            .iter()
            .any(|known| known.instancing_strategy.same_implementation(&info.instancing_strategy))
        {
            distinct.push(info);
        }
    }

    if distinct.len() > 1 {
        if strategy == AmbiguousServiceResolutionStrategy::Strict {
            return Err(AmbiguousServiceDeclaration {
                contract: contract.name(),
                implementations: distinct.iter().map(|info| info.implementation_name()).collect(),
                overrides: group
                    .iter()
                    .filter(|info| info.is_override())
                    .map(|info| info.implementation_name())
                    .collect(),
            });
        }
        warn!(
            contract = contract.name(),
            winner = winner.implementation_name(),
            tied = distinct.len(),
            is_override = winner.is_override(),
            "Tied declarations, last registered wins"
        );
    } else if group.len() > 1 {
        debug!(
            contract = contract.name(),
            winner = winner.implementation_name(),
            priority = %best,
            is_override = winner.is_override(),
            "Declaration replaced by higher priority"
        );
    }

    Ok(Some(winner))
}

#[cfg(test)]
mod tests {
    use super::resolve;
    use crate::{
        any::ContractType,
        config::AmbiguousServiceResolutionStrategy::{ForcePriority, Strict},
        contract::{ContractDeclaration, ServiceInfo},
        instantiator::Component,
        priority::Priority,
        InstantiateErrorKind,
    };

    use alloc::{sync::Arc, vec, vec::Vec};
    use tracing_test::traced_test;

    trait Handler: Send + Sync {}

    macro_rules! handler {
        ($($name:ident),*) => {
            $(
                struct $name;

                impl Handler for $name {}

                impl Component for $name {
                    type Deps = ();

                    fn construct((): ()) -> Result<Self, InstantiateErrorKind> {
                        Ok(Self)
                    }
                }
            )*
        };
    }

    handler!(A, B, C);

    struct Other;

    fn declare<I: Component + Handler>(priority: Priority) -> ContractDeclaration {
        ServiceInfo::builder::<dyn Handler>()
            .implementation::<I>(|handler| handler)
            .override_priority(priority)
            .build()
            .unwrap()
            .into()
    }

    fn multi<I: Component + Handler>(priority: Priority) -> ContractDeclaration {
        ServiceInfo::builder::<dyn Handler>()
            .implementation::<I>(|handler| handler)
            .allow_multiple()
            .processing_priority(priority)
            .build()
            .unwrap()
            .into()
    }

    fn from_factory(make: fn() -> Arc<dyn Handler>) -> ServiceInfo {
        ServiceInfo::builder::<dyn Handler>()
            .factory(move || Ok::<_, InstantiateErrorKind>(make()))
            .build()
            .unwrap()
    }

    fn names(survivors: &[ServiceInfo]) -> Vec<&'static str> {
        survivors
            .iter()
            .map(|info| info.implementation_name().rsplit("::").next().unwrap_or_default())
            .collect()
    }

    #[test]
    #[traced_test]
    fn test_higher_override_wins() {
        let declarations = vec![
            declare::<A>(Priority::NORMAL),
            declare::<B>(Priority::HIGH),
            declare::<C>(Priority::LOW),
        ];

        assert_eq!(names(&resolve(&declarations, ForcePriority).unwrap()), ["B"]);
        assert_eq!(names(&resolve(&declarations, Strict).unwrap()), ["B"]);
    }

    #[test]
    #[traced_test]
    fn test_force_priority_tie_last_wins() {
        let declarations = vec![declare::<A>(Priority::NORMAL), declare::<B>(Priority::NORMAL)];

        assert_eq!(names(&resolve(&declarations, ForcePriority).unwrap()), ["B"]);
        assert!(logs_contain("Tied declarations"));
    }

    #[test]
    #[traced_test]
    fn test_strict_tie_names_every_implementation() {
        let declarations = vec![
            declare::<A>(Priority::NORMAL),
            declare::<C>(Priority::LOW),
            declare::<B>(Priority::NORMAL),
        ];

        let err = resolve(&declarations, Strict).unwrap_err();

        assert_eq!(err.implementations.len(), 2);
        assert!(err.implementations[0].ends_with("::A"));
        assert!(err.implementations[1].ends_with("::B"));
        assert!(err.to_string().contains("::A"));
        assert!(err.to_string().contains("::B"));
    }

    #[test]
    #[traced_test]
    fn test_strict_same_implementation_is_not_ambiguous() {
        let declarations = vec![declare::<A>(Priority::NORMAL), declare::<A>(Priority::NORMAL)];

        assert_eq!(resolve(&declarations, Strict).unwrap().len(), 1);
    }

    #[test]
    #[traced_test]
    fn test_strict_factories_sharing_a_callable_are_distinct() {
        let declarations: Vec<ContractDeclaration> = vec![
            from_factory(|| Arc::new(A)).into(),
            from_factory(|| Arc::new(B)).into(),
        ];

        let err = resolve(&declarations, Strict).unwrap_err();

        assert_eq!(err.implementations.len(), 2);
        assert_eq!(names(&resolve(&declarations, ForcePriority).unwrap()).len(), 1);
    }

    #[test]
    #[traced_test]
    fn test_strict_factories_declaring_one_implementation() {
        let declared = |make: fn() -> Arc<dyn Handler>| -> ContractDeclaration {
            ServiceInfo::builder::<dyn Handler>()
                .factory(move || Ok::<_, InstantiateErrorKind>(make()))
                .implemented_by::<A>()
                .build()
                .unwrap()
                .into()
        };
        let declarations = vec![declared(|| Arc::new(A)), declared(|| Arc::new(A))];

        let survivors = resolve(&declarations, Strict).unwrap();

        assert_eq!(names(&survivors), ["A"]);
    }

    #[test]
    #[traced_test]
    fn test_multiple_ordered_by_processing_priority() {
        let declarations = vec![
            multi::<A>(Priority::LOW),
            multi::<B>(Priority::HIGH),
            multi::<C>(Priority::LOW),
        ];

        assert_eq!(names(&resolve(&declarations, Strict).unwrap()), ["B", "A", "C"]);
    }

    #[test]
    #[traced_test]
    fn test_mixed_multiplicity_resolves_single() {
        let declarations = vec![multi::<A>(Priority::NORMAL), declare::<B>(Priority::NORMAL)];

        assert_eq!(names(&resolve(&declarations, ForcePriority).unwrap()), ["B"]);
    }

    #[test]
    #[traced_test]
    fn test_deterministic_group_order() {
        let other: ContractDeclaration = ServiceInfo::builder::<Other>()
            .factory(|| Ok::<_, InstantiateErrorKind>(Arc::new(Other)))
            .build()
            .unwrap()
            .into();
        let declarations = vec![declare::<A>(Priority::NORMAL), other, declare::<B>(Priority::HIGH)];

        let first = resolve(&declarations, ForcePriority).unwrap();
        let second = resolve(&declarations, ForcePriority).unwrap();

        let contracts = |survivors: &[ServiceInfo]| survivors.iter().map(ServiceInfo::contract_type).collect::<Vec<_>>();
        assert_eq!(contracts(&first), [ContractType::of::<dyn Handler>(), ContractType::of::<Other>()]);
        assert_eq!(names(&first), names(&second));
    }

    #[test]
    #[traced_test]
    fn test_override_reported() {
        let mut replacement = declare::<B>(Priority::NORMAL);
        replacement.service_info = ServiceInfo::builder::<dyn Handler>()
            .implementation::<B>(|handler| handler)
            .is_override()
            .build()
            .unwrap();
        let declarations = vec![declare::<A>(Priority::NORMAL), replacement];

        let err = resolve(&declarations, Strict).unwrap_err();

        assert_eq!(err.overrides.len(), 1);
        assert!(err.overrides[0].ends_with("::B"));
    }
}
