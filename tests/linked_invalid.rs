use servitor::{
    distributed_slice, BuildErrorKind, LinkedDeclarations, RegistrationErrorKind, ServiceCollection, ServiceInfo,
    DECLARATIONS,
};

struct Broken;

fn broken() -> Result<ServiceInfo, RegistrationErrorKind> {
    ServiceInfo::builder::<Broken>().singleton().build()
}

#[distributed_slice(DECLARATIONS)]
static BROKEN: fn() -> Result<ServiceInfo, RegistrationErrorKind> = broken;

#[test]
fn test_invalid_linked_declaration_fails_build() {
    let err = ServiceCollection::builder()
        .with_provider(LinkedDeclarations::new())
        .build()
        .unwrap_err();

    assert!(
        matches!(
            err,
            BuildErrorKind::InvalidRegistration(RegistrationErrorKind::MissingInstancingStrategy { contract })
                if contract.ends_with("Broken")
        ),
        "{err:?}"
    );
}
