use alloc::{string::String, vec::Vec};

use crate::{
    contract::{AppService, ContractDeclaration, ServiceInfo},
    errors::RegistrationErrorKind,
    priority::Priority,
};

pub use linkme::{self, distributed_slice};

/// Registration getters collected at link time.
///
/// ```ignore
/// #[servitor::distributed_slice(servitor::DECLARATIONS)]
/// #[linkme(crate = servitor::linkme)]
/// static CLOCK: fn() -> Result<ServiceInfo, RegistrationErrorKind> = clock_declaration;
/// ```
#[distributed_slice]
pub static DECLARATIONS: [fn() -> Result<ServiceInfo, RegistrationErrorKind>];

/// Source of contract declarations for the aggregator.
pub trait DeclarationProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Providers are processed in ascending order, ties keep the order they were added in.
    fn processing_priority(&self) -> Priority {
        Priority::NORMAL
    }

    /// # Errors
    /// Any error aborts the build and is reported unchanged.
    fn app_service_contracts(&self) -> anyhow::Result<Vec<ContractDeclaration>>;

    /// # Errors
    /// Any error aborts the build and is reported unchanged.
    fn app_services(&self) -> anyhow::Result<Vec<AppService>> {
        Ok(Vec::new())
    }
}

/// Manual registration table.
#[derive(Debug, Clone)]
pub struct Declarations {
    name: String,
    processing_priority: Priority,
    declarations: Vec<ContractDeclaration>,
    app_services: Vec<AppService>,
}

impl Declarations {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            processing_priority: Priority::NORMAL,
            declarations: Vec::new(),
            app_services: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_processing_priority(mut self, priority: Priority) -> Self {
        self.processing_priority = priority;
        self
    }

    #[inline]
    #[must_use]
    pub fn with(mut self, service_info: ServiceInfo) -> Self {
        self.add(service_info);
        self
    }

    #[inline]
    pub fn add(&mut self, service_info: ServiceInfo) -> &mut Self {
        self.declarations.push(service_info.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_app_service<S, D>(mut self) -> Self
    where
        S: ?Sized + 'static,
        D: ?Sized + 'static,
    {
        self.app_services.push(AppService::of::<S, D>());
        self
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

impl DeclarationProvider for Declarations {
    fn name(&self) -> &str {
        &self.name
    }

    fn processing_priority(&self) -> Priority {
        self.processing_priority
    }

    fn app_service_contracts(&self) -> anyhow::Result<Vec<ContractDeclaration>> {
        Ok(self.declarations.clone())
    }

    fn app_services(&self) -> anyhow::Result<Vec<AppService>> {
        Ok(self.app_services.clone())
    }
}

/// Provider over every getter registered into [`DECLARATIONS`].
#[derive(Debug, Clone)]
pub struct LinkedDeclarations {
    processing_priority: Priority,
}

impl LinkedDeclarations {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            processing_priority: Priority::NORMAL,
        }
    }

    #[inline]
    #[must_use]
    pub const fn with_processing_priority(mut self, priority: Priority) -> Self {
        self.processing_priority = priority;
        self
    }
}

impl Default for LinkedDeclarations {
    fn default() -> Self {
        Self::new()
    }
}

impl DeclarationProvider for LinkedDeclarations {
    fn name(&self) -> &str {
        "linked"
    }

    fn processing_priority(&self) -> Priority {
        self.processing_priority
    }

    fn app_service_contracts(&self) -> anyhow::Result<Vec<ContractDeclaration>> {
        DECLARATIONS
            .iter()
            .map(|getter| getter().map(ContractDeclaration::from).map_err(anyhow::Error::from))
            .collect()
    }
}
