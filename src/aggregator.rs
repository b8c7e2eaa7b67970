use alloc::{boxed::Box, collections::BTreeMap, vec::Vec};
use tracing::{debug, info_span, warn};

use crate::{
    any::{ContractType, TypeInfo},
    contract::{AppService, ContractDeclaration},
    errors::{BuildErrorKind, RegistrationErrorKind},
    provider::DeclarationProvider,
};

/// Proxy type → canonical type table applied before any type comparison.
#[derive(Debug, Clone, Default)]
pub(crate) struct TypeAliases(BTreeMap<TypeInfo, TypeInfo>);

impl TypeAliases {
    #[inline]
    pub(crate) fn insert(&mut self, proxy: TypeInfo, canonical: TypeInfo) {
        self.0.insert(proxy, canonical);
    }

    /// Follows alias chains, stopping on loops.
    #[must_use]
    pub(crate) fn normalize(&self, mut type_info: TypeInfo) -> TypeInfo {
        for _ in 0..=self.0.len() {
            match self.0.get(&type_info) {
                Some(canonical) if *canonical != type_info => type_info = *canonical,
                _ => break,
            }
        }
        type_info
    }

    #[inline]
    #[must_use]
    pub(crate) fn normalize_contract(&self, contract_type: ContractType) -> ContractType {
        contract_type.with_type_info(self.normalize(contract_type.type_info()))
    }
}

/// Registration failures keep their own kind even when a provider reports them through `anyhow`.
fn provider_error(err: anyhow::Error) -> BuildErrorKind {
    match err.downcast::<RegistrationErrorKind>() {
        Ok(err) => BuildErrorKind::InvalidRegistration(err),
        Err(err) => BuildErrorKind::Provider(err),
    }
}

pub(crate) struct Aggregated {
    pub(crate) declarations: Vec<ContractDeclaration>,
    pub(crate) app_services: Vec<AppService>,
}

/// Collects declarations of every provider.
///
/// Providers run by processing priority ascending, ties in the order they were added.
/// Declarations keep provider order and aren't deduplicated. App services are deduplicated by
/// normalized service type.
pub(crate) fn aggregate(
    providers: &[Box<dyn DeclarationProvider>],
    aliases: &TypeAliases,
) -> Result<Aggregated, BuildErrorKind> {
    let mut ordered: Vec<&dyn DeclarationProvider> = providers.iter().map(AsRef::as_ref).collect();
    ordered.sort_by_key(|provider| provider.processing_priority());

    let mut declarations = Vec::new();
    let mut app_services: Vec<AppService> = Vec::new();

    for provider in ordered {
        let span = info_span!("provider", name = provider.name(), priority = %provider.processing_priority());
        let _guard = span.enter();

        let provided = provider.app_service_contracts().map_err(provider_error)?;
        debug!(count = provided.len(), "Declarations collected");

        declarations.extend(provided.into_iter().map(|ContractDeclaration { contract_type, service_info }| {
            let contract_type = aliases.normalize_contract(contract_type);
            let declaration_type = aliases.normalize(service_info.contract_declaration_type);
            ContractDeclaration {
                contract_type,
                service_info: service_info.with_normalized_types(contract_type, declaration_type),
            }
        }));

        for AppService {
            service_type,
            contract_declaration_type,
        } in provider.app_services().map_err(provider_error)?
        {
            let app_service = AppService {
                service_type: aliases.normalize(service_type),
                contract_declaration_type: aliases.normalize(contract_declaration_type),
            };
            if app_services
                .iter()
                .any(|known| known.service_type == app_service.service_type)
            {
                debug!(service = app_service.service_type.name, "Duplicate app service skipped");
                continue;
            }
            app_services.push(app_service);
        }
    }

    for app_service in &app_services {
        let declared = declarations.iter().any(|declaration| {
            declaration.service_info.contract_declaration_type == app_service.contract_declaration_type
        });
        if !declared {
            warn!(
                service = app_service.service_type.name,
                contract_declaration = app_service.contract_declaration_type.name,
                "App service has no contract declaration"
            );
        }
    }

    Ok(Aggregated {
        declarations,
        app_services,
    })
}
