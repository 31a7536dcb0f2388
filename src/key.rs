use crate::{TypeDescriptor, Value};
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A key ID paired with the type expected at the call site.
///
/// `T` is the Rust view a lookup through this key produces; the descriptor
/// is what the map compares against the entry's declared type. Two keys are
/// equal when both the descriptor and the ID match exactly.
///
/// # Examples
///
/// ```
/// use sovran_typedmap::{TypeDescriptor, TypedKey};
///
/// let name = TypedKey::<String, &str>::new("name");
/// assert_eq!(name.id(), &"name");
/// assert_eq!(name.descriptor(), &TypeDescriptor::of::<String>());
///
/// let other = TypedKey::<String, &str>::with_type(TypeDescriptor::of::<String>(), "name");
/// assert_eq!(name, other);
/// ```
pub struct TypedKey<T: ?Sized, ID> {
    descriptor: TypeDescriptor,
    id: ID,
    _marker: PhantomData<fn() -> *const T>,
}

/// A key whose lookups yield the erased value
pub type AnyKey<ID> = TypedKey<dyn Value, ID>;

impl<T: ?Sized + 'static, ID> TypedKey<T, ID> {
    /// Creates a key declared as `T`
    pub fn new(id: ID) -> Self {
        Self::with_type(TypeDescriptor::of::<T>(), id)
    }
}

impl<T: ?Sized, ID> TypedKey<T, ID> {
    /// Creates a key with an explicit descriptor, for types `T` alone cannot
    /// express (type arguments, declared supertypes)
    pub fn with_type(descriptor: TypeDescriptor, id: ID) -> Self {
        Self {
            descriptor,
            id,
            _marker: PhantomData,
        }
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn id(&self) -> &ID {
        &self.id
    }

    pub fn into_id(self) -> ID {
        self.id
    }

    /// The same descriptor and ID, viewed as the erased value
    pub fn erase(&self) -> AnyKey<ID>
    where
        ID: Clone,
    {
        TypedKey::with_type(self.descriptor.clone(), self.id.clone())
    }
}

impl<T: ?Sized, ID: Clone> Clone for TypedKey<T, ID> {
    fn clone(&self) -> Self {
        Self::with_type(self.descriptor.clone(), self.id.clone())
    }
}

impl<T: ?Sized, ID: PartialEq> PartialEq for TypedKey<T, ID> {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor && self.id == other.id
    }
}

impl<T: ?Sized, ID: Eq> Eq for TypedKey<T, ID> {}

impl<T: ?Sized, ID: Hash> Hash for TypedKey<T, ID> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.descriptor.hash(state);
        self.id.hash(state);
    }
}

impl<T: ?Sized, ID: Debug> Debug for TypedKey<T, ID> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedKey")
            .field("descriptor", &self.descriptor)
            .field("id", &self.id)
            .finish()
    }
}

impl<T: ?Sized, ID: Debug> fmt::Display for TypedKey<T, ID> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.id, self.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_needs_type_and_id() {
        let a = TypedKey::<String, &str>::new("a");
        assert_eq!(a, TypedKey::<String, &str>::new("a"));
        assert_ne!(a, TypedKey::<String, &str>::new("b"));
        assert_ne!(
            a.erase(),
            TypedKey::<i32, &str>::new("a").erase()
        );
    }

    #[test]
    fn test_hash_set_membership() {
        let mut keys = HashSet::new();
        keys.insert(TypedKey::<u8, u32>::new(1));
        keys.insert(TypedKey::<u8, u32>::new(1));
        keys.insert(TypedKey::<u8, u32>::new(2));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_erase_keeps_descriptor() {
        let key = TypedKey::<Vec<String>, String>::new("names".to_string());
        let erased = key.erase();
        assert_eq!(erased.descriptor(), key.descriptor());
        assert_eq!(erased.id(), key.id());
        assert_eq!(erased.to_string(), "\"names\": Vec<String>");
    }
}
