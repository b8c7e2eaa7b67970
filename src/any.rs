use alloc::sync::Arc;
use core::{
    any::{type_name, Any, TypeId},
    cmp::Ordering,
    fmt::{self, Debug, Display, Formatter},
    hash::{Hash, Hasher},
};

#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub name: &'static str,
    pub id: TypeId,
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl PartialOrd for TypeInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Display for TypeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl TypeInfo {
    #[inline]
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self {
            name: type_name::<T>(),
            id: TypeId::of::<T>(),
        }
    }

    #[inline]
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit_once("::").map_or(self.name, |(_, name)| name)
    }
}

/// Identity of a contract, the type consumers ask an [`crate::Injector`] for.
///
/// A contract is either a closed type (`dyn Greeter`, `Repository<User>`) or the key of an
/// open generic definition, which satisfies every closed request of its family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContractType {
    type_info: TypeInfo,
    generic_definition: bool,
}

impl ContractType {
    #[inline]
    #[must_use]
    pub fn of<C>() -> Self
    where
        C: ?Sized + 'static,
    {
        Self {
            type_info: TypeInfo::of::<C>(),
            generic_definition: false,
        }
    }

    /// Contract keyed by the marker type of an open generic definition.
    #[inline]
    #[must_use]
    pub fn generic_definition<D>() -> Self
    where
        D: ?Sized + 'static,
    {
        Self {
            type_info: TypeInfo::of::<D>(),
            generic_definition: true,
        }
    }

    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.type_info.name
    }

    #[inline]
    #[must_use]
    pub const fn is_generic_type_definition(&self) -> bool {
        self.generic_definition
    }

    #[inline]
    #[must_use]
    pub(crate) const fn with_type_info(self, type_info: TypeInfo) -> Self {
        Self {
            type_info,
            generic_definition: self.generic_definition,
        }
    }
}

impl Display for ContractType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.generic_definition {
            write!(f, "{}<..>", self.type_info.name)
        } else {
            f.write_str(self.type_info.name)
        }
    }
}

/// Type-erased resolved object.
///
/// The payload is always the `Arc<C>` of the contract it was produced for,
/// so trait object contracts survive the erasure.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_info: TypeInfo,
    addr: usize,
}

impl Instance {
    #[must_use]
    pub fn new<C>(value: Arc<C>) -> Self
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let addr = Arc::as_ptr(&value).cast::<()>() as usize;
        Self {
            value: Arc::new(value),
            type_info: TypeInfo::of::<C>(),
            addr,
        }
    }

    #[inline]
    #[must_use]
    pub fn downcast<C>(&self) -> Option<Arc<C>>
    where
        C: ?Sized + 'static,
    {
        self.value.downcast_ref::<Arc<C>>().cloned()
    }

    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    /// Returns `true` if both instances point to the same object.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.addr == other.addr && self.type_info == other.type_info
    }
}

impl Debug for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_info.name)
            .field("addr", &format_args!("{:#x}", self.addr))
            .finish()
    }
}
