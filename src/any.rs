use std::{
    any::{type_name, Any, TypeId},
    sync::Arc,
};

/// Shared handle to a managed bean instance.
///
/// The container owns every cached instance through handles of this type;
/// callers receive clones whose lifetime is bounded by the registry's
/// destruction phase.
pub type BeanHandle = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TypeInfo {
    pub name: &'static str,
    pub id: TypeId,
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
}

/// Wraps a concrete value into a [`BeanHandle`].
#[inline]
#[must_use]
pub fn handle_of<T: Send + Sync + 'static>(value: T) -> BeanHandle {
    Arc::new(value)
}
