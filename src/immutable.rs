use crate::map::{self, KeyCache, TypedMap};
use crate::{AnyKey, IdentitySupplier, MapError, TypedKey, Value, ValueSupplier};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

/// Canonical empty map per key-ID type
static EMPTY_MAPS: Lazy<Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

struct Frozen<ID> {
    entries: IndexMap<ID, ValueSupplier>,
    keys: KeyCache<ID>,
}

/// A typed map whose composition never changes after construction.
///
/// Cloning is cheap: clones share the same frozen store and the same
/// memoized key view. The map is `Send + Sync` and safe to read from many
/// threads at once.
///
/// # Examples
///
/// ```
/// use sovran_typedmap::{ImmutableTypedMap, MapError, TypedKey, TypedMap};
///
/// let name = TypedKey::<String, &str>::new("name");
/// let port = TypedKey::<u16, &str>::new("port");
///
/// let config = ImmutableTypedMap::of2(&name, "gateway".to_string(), &port, 8080)?;
/// assert_eq!(config.len(), 2);
/// assert_eq!(config.get(&port)?, Some(&8080));
///
/// // The same ID read as the wrong type
/// let wrong = TypedKey::<String, &str>::new("port");
/// assert!(matches!(config.get(&wrong), Err(MapError::TypeMismatch { .. })));
///
/// // An ID that was never stored
/// let missing = TypedKey::<String, &str>::new("host");
/// assert!(matches!(config.get(&missing), Err(MapError::KeyNotFound(_))));
/// # Ok::<(), MapError>(())
/// ```
pub struct ImmutableTypedMap<ID> {
    inner: Arc<Frozen<ID>>,
}

macro_rules! fixed_arity {
    ($($n:literal => $of:ident, $of_raw:ident [$($k:ident $v:ident $t:ident),+];)+) => {
        $(
            #[doc = concat!("Builds a map of ", $n, " entries from typed keys and values.")]
            ///
            /// # Errors
            ///
            /// - Returns `MapError::TypeMismatch` if a value cannot be stored as its key's type
            /// - Returns `MapError::InvalidArgument` if two keys share an ID
            pub fn $of<$($t: Value),+>($($k: &TypedKey<$t, ID>, $v: $t),+) -> Result<Self, MapError> {
                Self::builder()$(.put($k, $v))+.build()
            }

            #[doc = concat!("Builds a map of ", $n, " entries, each typed by its value's own type.")]
            ///
            /// # Errors
            ///
            /// Returns `MapError::InvalidArgument` if two IDs are equal.
            pub fn $of_raw<$($t: Value),+>($($k: ID, $v: $t),+) -> Result<Self, MapError> {
                Self::builder()$(.put_raw($k, $v))+.build()
            }
        )+
    };
}

impl<ID> ImmutableTypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    /// Returns the empty map.
    ///
    /// Every call for the same `ID` type hands back the same shared instance.
    pub fn of() -> Self {
        let mut maps = EMPTY_MAPS.lock().unwrap_or_else(PoisonError::into_inner);
        let shared = maps
            .entry(TypeId::of::<ID>())
            .or_insert_with(|| Box::new(Self::frozen(IndexMap::new())));
        match shared.downcast_ref::<Self>() {
            Some(empty) => empty.clone(),
            None => Self::frozen(IndexMap::new()),
        }
    }

    fixed_arity! {
        1 => of1, of_raw1 [k1 v1 T1];
        2 => of2, of_raw2 [k1 v1 T1, k2 v2 T2];
        3 => of3, of_raw3 [k1 v1 T1, k2 v2 T2, k3 v3 T3];
        4 => of4, of_raw4 [k1 v1 T1, k2 v2 T2, k3 v3 T3, k4 v4 T4];
        5 => of5, of_raw5 [k1 v1 T1, k2 v2 T2, k3 v3 T3, k4 v4 T4, k5 v5 T5];
    }

    /// Starts a builder for maps of any size
    pub fn builder() -> Builder<ID> {
        Builder::new()
    }
}

impl<ID> ImmutableTypedMap<ID> {
    fn frozen(entries: IndexMap<ID, ValueSupplier>) -> Self {
        Self {
            inner: Arc::new(Frozen {
                entries,
                keys: KeyCache::new(),
            }),
        }
    }

    /// Returns true if both maps share the same frozen store
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<ID> TypedMap<ID> for ImmutableTypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
{
    fn delegate(&self) -> &IndexMap<ID, ValueSupplier> {
        &self.inner.entries
    }

    fn keys(&self) -> &[AnyKey<ID>] {
        self.inner.keys.get_or_build(&self.inner.entries)
    }
}

impl<ID> Clone for ImmutableTypedMap<ID> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<ID> Default for ImmutableTypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::of()
    }
}

impl<ID, M> PartialEq<M> for ImmutableTypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
    M: TypedMap<ID>,
{
    fn eq(&self, other: &M) -> bool {
        map::entries_eq(self, other)
    }
}

impl<ID> Eq for ImmutableTypedMap<ID> where ID: Clone + Eq + Hash + Debug + 'static {}

impl<ID> Hash for ImmutableTypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        map::entries_hash(self, state);
    }
}

impl<ID> fmt::Display for ImmutableTypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        map::fmt_entries(self, f)
    }
}

impl<ID> Debug for ImmutableTypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ImmutableTypedMap")?;
        map::fmt_entries(self, f)
    }
}

/// Collects entries for an [`ImmutableTypedMap`].
///
/// Entries keep the order they were added in. Duplicate IDs and values that
/// do not fit their declared type are reported by [`Builder::build`].
pub struct Builder<ID> {
    entries: Vec<(ID, ValueSupplier)>,
    error: Option<MapError>,
}

impl<ID> Builder<ID>
where
    ID: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            error: None,
        }
    }

    /// Adds a value declared as the key's type
    pub fn put<T: Value>(self, key: &TypedKey<T, ID>, value: T) -> Self {
        let supplier = ValueSupplier::immutable(key.descriptor().clone(), Some(value));
        self.push(key.id().clone(), supplier)
    }

    /// Adds a value declared as its own concrete type
    pub fn put_raw<T: Value>(mut self, id: ID, value: T) -> Self {
        self.entries.push((id, IdentitySupplier::new(value).into()));
        self
    }

    /// Adds a holder as is, keeping its kind and declared type
    pub fn put_supplier(mut self, id: ID, supplier: impl Into<ValueSupplier>) -> Self {
        self.entries.push((id, supplier.into()));
        self
    }

    /// Adds every `(id, holder)` pair, in iteration order
    pub fn put_all<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (ID, ValueSupplier)>,
    {
        self.entries.extend(entries);
        self
    }

    fn push(mut self, id: ID, supplier: Result<ValueSupplier, MapError>) -> Self {
        match supplier {
            Ok(supplier) => self.entries.push((id, supplier)),
            Err(error) => {
                self.error.get_or_insert(error);
            }
        }
        self
    }

    /// Freezes the collected entries.
    ///
    /// An empty builder yields the shared [`ImmutableTypedMap::of`] instance.
    ///
    /// # Errors
    ///
    /// - Returns `MapError::TypeMismatch` if a value added with [`Builder::put`]
    ///   cannot be stored as its key's type
    /// - Returns `MapError::InvalidArgument` if two entries share an ID
    pub fn build(self) -> Result<ImmutableTypedMap<ID>, MapError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.entries.is_empty() {
            return Ok(ImmutableTypedMap::of());
        }
        let entries = map::collect_unique(self.entries)?;
        Ok(ImmutableTypedMap::frozen(entries))
    }
}

impl<ID> Default for Builder<ID>
where
    ID: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use crate::TypeDescriptor;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_is_shared() {
        let a = ImmutableTypedMap::<String>::of();
        let b = ImmutableTypedMap::<String>::of();
        let built = ImmutableTypedMap::<String>::builder().build().unwrap();
        assert!(a.ptr_eq(&b));
        assert!(a.ptr_eq(&built));
        assert!(a.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_per_id_type() {
        let strings = ImmutableTypedMap::<String>::of();
        let ints = ImmutableTypedMap::<u32>::of();
        assert!(strings.is_empty());
        assert!(ints.is_empty());
        assert!(ImmutableTypedMap::<u32>::of().ptr_eq(&ints));
    }

    #[test]
    fn test_keys_are_memoized() -> Result<(), MapError> {
        let map = ImmutableTypedMap::of_raw2("a", 1i32, "b", "two".to_string())?;
        let first = map.keys().as_ptr();
        let second = map.keys().as_ptr();
        assert_eq!(first, second);

        let clone = map.clone();
        assert_eq!(clone.keys().as_ptr(), first);
        Ok(())
    }

    #[test]
    fn test_keys_carry_declared_type() -> Result<(), MapError> {
        let map = ImmutableTypedMap::builder()
            .put(&TypedKey::<String, &str>::new("a"), "1".to_string())
            .put_raw("b", 2u8)
            .build()?;

        let keys: Vec<_> = map.keys().iter().map(|k| (*k.id(), k.descriptor().clone())).collect();
        assert_eq!(
            keys,
            vec![
                ("a", TypeDescriptor::of::<String>()),
                ("b", TypeDescriptor::of::<u8>())
            ]
        );
        Ok(())
    }

    #[test]
    fn test_builder_rejects_duplicates_at_build() {
        init_test_logging();
        let builder = ImmutableTypedMap::builder()
            .put_raw("a", 1i32)
            .put_raw("a", 2i32);
        match builder.build() {
            Err(MapError::InvalidArgument(message)) => assert!(message.contains("\"a\"")),
            other => panic!("Should have gotten invalid argument error, got {:?}", other),
        }
    }

    #[test]
    fn test_builder_rejects_value_outside_declared_type() {
        init_test_logging();
        let key = TypedKey::<i64, &str>::with_type(TypeDescriptor::of::<i32>(), "n");
        let result = ImmutableTypedMap::builder()
            .put(&key, 5i64)
            .put_raw("a", 1i32)
            .put_raw("a", 2i32)
            .build();
        match result {
            Err(MapError::TypeMismatch { requested, declared }) => {
                assert_eq!(requested, "i32");
                assert_eq!(declared, "i64");
            }
            other => panic!("Should have gotten type mismatch error, got {:?}", other),
        }
    }

    #[test]
    fn test_display_in_insertion_order() -> Result<(), MapError> {
        let map = ImmutableTypedMap::of_raw2("b", 2i32, "a", "1".to_string())?;
        assert_eq!(map.to_string(), "{\"b\": i32=2, \"a\": String=\"1\"}");
        assert_eq!(ImmutableTypedMap::<&str>::of().to_string(), "{}");
        Ok(())
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ImmutableTypedMap<String>>();
    }
}
