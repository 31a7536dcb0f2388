use crate::TypeDescriptor;
use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::hash::{Hash, Hasher};

/// A type-erased value that can live in a typed map.
///
/// Every `T: Any + Send + Sync + Debug + Clone + PartialEq + Hash` is a
/// `Value` through the blanket implementation below, so callers never
/// implement this trait by hand. The erased form keeps enough behavior
/// around for a map to compare, hash, print and copy its entries without
/// knowing their types.
pub trait Value: Any + Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;

    /// Descriptor of the value's own concrete type
    fn type_descriptor(&self) -> TypeDescriptor;

    fn dyn_eq(&self, other: &dyn Value) -> bool;

    fn dyn_hash(&self, state: &mut dyn Hasher);

    fn clone_value(&self) -> Box<dyn Value>;
}

impl<T> Value for T
where
    T: Any + Send + Sync + Debug + Clone + PartialEq + Hash,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }

    fn type_descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::of::<T>()
    }

    fn dyn_eq(&self, other: &dyn Value) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }

    fn clone_value(&self) -> Box<dyn Value> {
        Box::new(self.clone())
    }
}

impl<'a> PartialEq for dyn Value + 'a {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other)
    }
}

impl<'a> Hash for dyn Value + 'a {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dyn_hash(state);
    }
}

impl<'a> dyn Value + 'a {
    /// Returns true if the erased value is a `T`
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// How a requested Rust type is read out of an erased [`Value`].
///
/// Sized value types are extracted by downcasting; `dyn Value` is returned
/// as-is. Implement this for a trait object to read stored values through
/// that trait, which is what makes requests for a declared supertype useful:
///
/// ```
/// use sovran_typedmap::{FromValue, Value};
///
/// trait Number {
///     fn as_i64(&self) -> i64;
/// }
///
/// impl Number for i32 {
///     fn as_i64(&self) -> i64 {
///         i64::from(*self)
///     }
/// }
///
/// impl FromValue for dyn Number {
///     type Owned = Box<dyn Number>;
///
///     fn from_value<'v>(value: &'v (dyn Value + 'static)) -> Option<&'v Self> {
///         value.downcast_ref::<i32>().map(|n| n as &dyn Number)
///     }
///
///     fn from_boxed(value: Box<dyn Value>) -> Option<Self::Owned> {
///         value
///             .into_any()
///             .downcast::<i32>()
///             .ok()
///             .map(|n| n as Box<dyn Number>)
///     }
/// }
///
/// let stored: Box<dyn Value> = Box::new(7i32);
/// assert_eq!(<dyn Number>::from_value(&*stored).map(|n| n.as_i64()), Some(7));
/// ```
pub trait FromValue: 'static {
    /// Owned form handed back when a value leaves the map
    type Owned;

    fn from_value<'v>(value: &'v (dyn Value + 'static)) -> Option<&'v Self>;

    fn from_boxed(value: Box<dyn Value>) -> Option<Self::Owned>;
}

impl<T: Value> FromValue for T {
    type Owned = T;

    fn from_value<'v>(value: &'v (dyn Value + 'static)) -> Option<&'v Self> {
        value.as_any().downcast_ref::<T>()
    }

    fn from_boxed(value: Box<dyn Value>) -> Option<Self::Owned> {
        value.into_any().downcast::<T>().ok().map(|boxed| *boxed)
    }
}

impl FromValue for dyn Value {
    type Owned = Box<dyn Value>;

    fn from_value<'v>(value: &'v (dyn Value + 'static)) -> Option<&'v Self> {
        Some(value)
    }

    fn from_boxed(value: Box<dyn Value>) -> Option<Self::Owned> {
        Some(value)
    }
}
