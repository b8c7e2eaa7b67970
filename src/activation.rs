use alloc::vec::Vec;
use core::{any::TypeId, cell::RefCell};
use tracing::error;

use crate::{collection::ServiceId, errors::ResolveErrorKind, scope::ScopeHandle};

/// Construction currently running on this thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ActivationKey {
    pub(crate) owner: ScopeHandle,
    pub(crate) service: ServiceId,
    pub(crate) closed: Option<TypeId>,
    pub(crate) name: &'static str,
}

std::thread_local! {
    static ACTIVE: RefCell<Vec<ActivationKey>> = const { RefCell::new(Vec::new()) };
}

/// Pops its key when the construction ends, successfully or not.
#[derive(Debug)]
pub(crate) struct ActivationGuard(());

impl Drop for ActivationGuard {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            active.borrow_mut().pop();
        });
    }
}

/// Marks the key as being constructed on this thread.
///
/// # Errors
/// Returns [`ResolveErrorKind::CircularDependency`] with the chain from the first activation
/// of the key, if it's already being constructed.
pub(crate) fn enter(key: ActivationKey) -> Result<ActivationGuard, ResolveErrorKind> {
    ACTIVE.with(|active| {
        let mut active = active.borrow_mut();
        if let Some(position) = active.iter().position(|entered| *entered == key) {
            let chain: Vec<_> = active[position..]
                .iter()
                .map(|entered| entered.name)
                .chain([key.name])
                .collect();
            let err = ResolveErrorKind::CircularDependency { chain };
            error!("{}", err);
            return Err(err);
        }
        active.push(key);
        Ok(ActivationGuard(()))
    })
}

#[cfg(test)]
mod tests {
    use super::{enter, ActivationKey};
    use crate::{collection::ServiceId, errors::ResolveErrorKind, scope::ScopeHandle};

    use tracing_test::traced_test;

    fn key(owner: ScopeHandle, index: usize, name: &'static str) -> ActivationKey {
        ActivationKey {
            owner,
            service: ServiceId(index),
            closed: None,
            name,
        }
    }

    #[test]
    #[traced_test]
    fn test_cycle_detected() {
        let owner = ScopeHandle::next();

        let _a = enter(key(owner, 0, "A")).unwrap();
        let _b = enter(key(owner, 1, "B")).unwrap();
        let err = enter(key(owner, 0, "A")).unwrap_err();

        assert!(matches!(
            err,
            ResolveErrorKind::CircularDependency { ref chain } if chain == &["A", "B", "A"]
        ));
    }

    #[test]
    #[traced_test]
    fn test_guard_pops() {
        let owner = ScopeHandle::next();

        drop(enter(key(owner, 0, "A")).unwrap());
        let _again = enter(key(owner, 0, "A")).unwrap();

        let other_scope = ScopeHandle::next();
        assert!(enter(key(other_scope, 0, "A")).is_ok());
    }
}
