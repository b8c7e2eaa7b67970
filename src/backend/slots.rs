use alloc::{
    boxed::Box,
    collections::BTreeMap,
    sync::{Arc, Weak},
    vec::Vec,
};
use core::sync::atomic::{AtomicBool, Ordering};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{activate, instantiate, Backend, BackendScope, ClosedGeneric};
use crate::{
    any::{ContractType, Instance},
    cache::{CacheKey, Resolved, ResolvedSet},
    collection::{ServiceCollection, ServiceId},
    contract::{Lifetime, ServiceInfo},
    errors::{BuildErrorKind, ResolveErrorKind},
    injector::CompositionRoot,
    scope::ScopeHandle,
};

#[derive(thiserror::Error, Debug)]
pub(crate) enum SlotErrorKind {
    #[error("Scope {scope} is disposed")]
    Disposed { scope: ScopeHandle },
    #[error("Scope {scope} is dropped")]
    Dropped { scope: ScopeHandle },
    #[error("Slot {slot} out of table bounds")]
    OutOfBounds { slot: usize },
}

impl From<SlotErrorKind> for ResolveErrorKind {
    fn from(err: SlotErrorKind) -> Self {
        match err {
            SlotErrorKind::Disposed { scope } | SlotErrorKind::Dropped { scope } => {
                ResolveErrorKind::ObjectDisposed { scope }
            }
            SlotErrorKind::OutOfBounds { .. } => ResolveErrorKind::ServiceNotFound {
                contract: "unregistered service",
            },
        }
    }
}

/// Engine compiling registrations into an indexed slot table.
///
/// Every scope owns one cell per slot, reads after the first construction take no lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotBackend;

impl Backend for SlotBackend {
    fn name(&self) -> &'static str {
        "slots"
    }

    fn materialize(&self, services: &ServiceCollection) -> Result<Arc<dyn BackendScope>, BuildErrorKind> {
        let table = Arc::new(SlotTable::compile(services));

        debug!(slots = table.slots.len(), contracts = table.by_contract.len(), "Slot table compiled");

        Ok(SlotScope::new(table, None, None))
    }
}

struct Slot {
    service: ServiceId,
    lifetime: Lifetime,
}

struct SlotTable {
    services: ServiceCollection,
    slots: Box<[Slot]>,
    by_contract: BTreeMap<ContractType, Box<[usize]>>,
}

impl SlotTable {
    fn compile(services: &ServiceCollection) -> Self {
        let slots: Box<[Slot]> = services
            .iter()
            .map(|(service, info)| Slot {
                service,
                lifetime: info.lifetime(),
            })
            .collect();

        let by_contract = services
            .contracts()
            .map(|contract| {
                let indexes: Box<[usize]> = services
                    .registrations(contract)
                    .iter()
                    .map(|service| service.index())
                    .collect();
                (*contract, indexes)
            })
            .collect();

        Self {
            services: services.clone(),
            slots,
            by_contract,
        }
    }

    fn slot(&self, index: usize) -> Result<(&Slot, &ServiceInfo), SlotErrorKind> {
        let slot = self.slots.get(index).ok_or(SlotErrorKind::OutOfBounds { slot: index })?;
        let info = self
            .services
            .get(slot.service)
            .ok_or(SlotErrorKind::OutOfBounds { slot: index })?;
        Ok((slot, info))
    }
}

pub(crate) struct SlotScope {
    this: Weak<SlotScope>,
    handle: ScopeHandle,
    table: Arc<SlotTable>,
    root: Option<Arc<SlotScope>>,
    parent: Option<Weak<SlotScope>>,
    cells: Box<[OnceCell<Instance>]>,
    generic_cells: Mutex<BTreeMap<CacheKey, Arc<OnceCell<Instance>>>>,
    teardown: Mutex<ResolvedSet>,
    disposed: AtomicBool,
}

impl SlotScope {
    fn new(table: Arc<SlotTable>, root: Option<Arc<Self>>, parent: Option<Weak<Self>>) -> Arc<Self> {
        let cells = table.slots.iter().map(|_| OnceCell::new()).collect();
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            handle: ScopeHandle::next(),
            table,
            root,
            parent,
            cells,
            generic_cells: Mutex::new(BTreeMap::new()),
            teardown: Mutex::new(ResolvedSet::new()),
            disposed: AtomicBool::new(false),
        })
    }

    fn arc(&self) -> Result<Arc<Self>, SlotErrorKind> {
        self.this.upgrade().ok_or(SlotErrorKind::Dropped { scope: self.handle })
    }

    fn ensure_active(&self) -> Result<(), SlotErrorKind> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(SlotErrorKind::Disposed { scope: self.handle });
        }
        Ok(())
    }

    fn owner(&self, lifetime: Lifetime) -> Result<Arc<Self>, SlotErrorKind> {
        match (&self.root, lifetime) {
            (Some(root), Lifetime::Singleton) => Ok(root.clone()),
            _ => self.arc(),
        }
    }

    fn resolve_slot(
        &self,
        index: usize,
        closed: Option<&ClosedGeneric>,
        cx: &Arc<CompositionRoot>,
    ) -> Result<Instance, ResolveErrorKind> {
        self.ensure_active()?;
        let (slot, info) = self.table.slot(index)?;
        let owner = self.owner(slot.lifetime)?;

        match (slot.lifetime, closed) {
            (Lifetime::Transient, _) => {
                let _activation = activate(cx, owner.handle, slot.service, info, closed)?;
                instantiate(cx, owner, info, closed)
            }
            (_, None) => {
                owner.ensure_active()?;
                let cell = owner.cells.get(index).ok_or(SlotErrorKind::OutOfBounds { slot: index })?;
                owner.init_cell(cell, slot, info, None, cx)
            }
            (_, Some(request)) => {
                owner.ensure_active()?;
                let key = CacheKey {
                    service: slot.service,
                    closed: Some(request.closed().id),
                };
                let cell = owner.generic_cells.lock().entry(key).or_default().clone();
                owner.init_cell(&cell, slot, info, closed, cx)
            }
        }
    }

    fn init_cell(
        self: &Arc<Self>,
        cell: &OnceCell<Instance>,
        slot: &Slot,
        info: &ServiceInfo,
        closed: Option<&ClosedGeneric>,
        cx: &Arc<CompositionRoot>,
    ) -> Result<Instance, ResolveErrorKind> {
        if let Some(instance) = cell.get() {
            debug!(scope = %self.handle, "Slot initialized");
            return Ok(instance.clone());
        }
        debug!(scope = %self.handle, "Slot empty");

        let _activation = activate(cx, self.handle, slot.service, info, closed)?;
        let mut created = false;
        let instance = cell
            .get_or_try_init(|| {
                created = true;
                instantiate(cx, self.clone(), info, closed)
            })?
            .clone();

        if created {
            if let Some(resolved) = Resolved::owned(info, &instance) {
                self.track(resolved);
            }
        }
        Ok(instance)
    }

    fn track(&self, resolved: Resolved) {
        let mut teardown = self.teardown.lock();
        if self.disposed.load(Ordering::Acquire) {
            drop(teardown);
            warn!(scope = %self.handle, service = resolved.name, "Scope disposed during construction");
            resolved.finalize();
            return;
        }
        teardown.push(resolved);
    }
}

impl BackendScope for SlotScope {
    fn handle(&self) -> ScopeHandle {
        self.handle
    }

    fn parent(&self) -> Option<Arc<dyn BackendScope>> {
        self.parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|parent| parent as Arc<dyn BackendScope>)
    }

    fn registrations(&self, contract: &ContractType) -> Vec<ServiceId> {
        self.table
            .by_contract
            .get(contract)
            .map(|indexes| indexes.iter().map(|index| self.table.slots[*index].service).collect())
            .unwrap_or_default()
    }

    fn resolve_registration(&self, service: ServiceId, cx: &Arc<CompositionRoot>) -> Result<Instance, ResolveErrorKind> {
        self.resolve_slot(service.index(), None, cx)
    }

    fn resolve_closed_generic(
        &self,
        request: &ClosedGeneric,
        cx: &Arc<CompositionRoot>,
    ) -> Result<Instance, ResolveErrorKind> {
        self.resolve_slot(request.service().index(), Some(request), cx)
    }

    fn create_child(&self) -> Result<Arc<dyn BackendScope>, ResolveErrorKind> {
        self.ensure_active()?;
        let root = match &self.root {
            Some(root) => root.clone(),
            None => self.arc()?,
        };
        Ok(Self::new(self.table.clone(), Some(root), Some(self.this.clone())))
    }

    fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let teardown = self.teardown.lock().take();
        self.generic_cells.lock().clear();

        debug!(scope = %self.handle, owned = teardown.0.len(), "Finalizing owned instances");
        teardown.finalize();
        true
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for SlotScope {
    fn drop(&mut self) {
        self.dispose();
    }
}
