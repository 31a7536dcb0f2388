use crate::{AnyKey, FromValue, MapError, TypeDescriptor, TypedKey, Value, ValueSupplier};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use std::collections::hash_map::DefaultHasher;
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use tracing::debug;

/// Read access shared by every typed map.
///
/// Implementors supply the backing store and a memoized key view; every
/// lookup, type check and derived view is provided on top of those two.
///
/// Lookups through a [`TypedKey`] (or an explicit descriptor) succeed only
/// when the requested type is assignable from the entry's declared type, so
/// asking for a supertype works and asking for a more specific type fails
/// with `MapError::TypeMismatch`. A missing ID is always reported as
/// `MapError::KeyNotFound`. `Ok(None)` means the entry exists but holds no
/// value.
pub trait TypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
{
    /// The backing store, in insertion order
    fn delegate(&self) -> &IndexMap<ID, ValueSupplier>;

    /// One key per entry, carrying the entry's declared type.
    ///
    /// Computed from the backing store on first access and reused after.
    fn keys(&self) -> &[AnyKey<ID>];

    fn len(&self) -> usize {
        self.delegate().len()
    }

    fn is_empty(&self) -> bool {
        self.delegate().is_empty()
    }

    /// Returns true if an entry exists for the key's ID and the key's type
    /// is assignable from the entry's declared type
    fn contains<T: ?Sized>(&self, key: &TypedKey<T, ID>) -> bool {
        self.delegate()
            .get(key.id())
            .is_some_and(|supplier| key.descriptor().is_assignable_from(supplier.descriptor()))
    }

    /// Returns true if any entry exists for `id`, whatever its type
    fn contains_id(&self, id: &ID) -> bool {
        self.delegate().contains_key(id)
    }

    fn contains_value(&self, value: &dyn Value) -> bool {
        self.delegate()
            .values()
            .any(|supplier| supplier.get().is_some_and(|held| held.dyn_eq(value)))
    }

    /// Verifies that `key` could be used to read its entry
    ///
    /// # Errors
    ///
    /// - Returns `MapError::KeyNotFound` if the ID has no entry
    /// - Returns `MapError::TypeMismatch` if the key's type is not assignable from the declared type
    fn check_type<T: ?Sized>(&self, key: &TypedKey<T, ID>) -> Result<(), MapError> {
        self.get_supplier(key).map(|_| ())
    }

    /// Returns the holder behind `key` after checking its type
    ///
    /// # Errors
    ///
    /// - Returns `MapError::KeyNotFound` if the ID has no entry
    /// - Returns `MapError::TypeMismatch` if the key's type is not assignable from the declared type
    fn get_supplier<T: ?Sized>(&self, key: &TypedKey<T, ID>) -> Result<&ValueSupplier, MapError> {
        let supplier = lookup(self.delegate(), key.id())?;
        check_value_type(key.descriptor(), supplier)
    }

    /// Retrieves the value stored under `key`
    ///
    /// # Errors
    ///
    /// - Returns `MapError::KeyNotFound` if the ID has no entry
    /// - Returns `MapError::TypeMismatch` if the key's type is not assignable from the
    ///   declared type, or the stored value cannot be read as `T`
    fn get<T>(&self, key: &TypedKey<T, ID>) -> Result<Option<&T>, MapError>
    where
        T: FromValue + ?Sized,
    {
        self.get_with(key.descriptor(), key.id())
    }

    /// Retrieves a value by ID, checked against an explicit descriptor
    ///
    /// # Errors
    ///
    /// Same as [`TypedMap::get`].
    fn get_with<T>(&self, descriptor: &TypeDescriptor, id: &ID) -> Result<Option<&T>, MapError>
    where
        T: FromValue + ?Sized,
    {
        let supplier = lookup(self.delegate(), id)?;
        let supplier = check_value_type(descriptor, supplier)?;
        extract::<T>(descriptor, supplier)
    }

    /// Retrieves a value by ID without any type check
    ///
    /// # Errors
    ///
    /// Returns `MapError::KeyNotFound` if the ID has no entry.
    fn get_raw(&self, id: &ID) -> Result<Option<&(dyn Value + 'static)>, MapError> {
        lookup(self.delegate(), id).map(ValueSupplier::get)
    }

    /// The raw key IDs, in insertion order
    fn ids(&self) -> indexmap::map::Keys<'_, ID, ValueSupplier> {
        self.delegate().keys()
    }

    /// Typed-key/value pairs, in insertion order
    fn entries(&self) -> Entries<'_, ID> {
        Entries {
            keys: self.keys().iter(),
            suppliers: self.delegate().values(),
        }
    }

    fn values(&self) -> impl Iterator<Item = Option<&(dyn Value + 'static)>> + '_ {
        self.delegate().values().map(ValueSupplier::get)
    }

    fn value_suppliers(&self) -> indexmap::map::Values<'_, ID, ValueSupplier> {
        self.delegate().values()
    }
}

/// One entry of a typed map: the typed key and the value it currently holds
#[derive(Debug, PartialEq)]
pub struct Entry<'a, ID> {
    key: &'a AnyKey<ID>,
    value: Option<&'a (dyn Value + 'static)>,
}

impl<ID> Clone for Entry<'_, ID> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<ID> Copy for Entry<'_, ID> {}

impl<'a, ID> Entry<'a, ID> {
    pub fn key(&self) -> &'a AnyKey<ID> {
        self.key
    }

    pub fn value(&self) -> Option<&'a (dyn Value + 'static)> {
        self.value
    }
}

impl<ID: Debug> fmt::Display for Entry<'_, ID> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(value) => write!(f, "{}={:?}", self.key, value),
            None => write!(f, "{}=None", self.key),
        }
    }
}

/// Iterator returned by [`TypedMap::entries`]
pub struct Entries<'a, ID> {
    keys: std::slice::Iter<'a, AnyKey<ID>>,
    suppliers: indexmap::map::Values<'a, ID, ValueSupplier>,
}

impl<'a, ID> Iterator for Entries<'a, ID> {
    type Item = Entry<'a, ID>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.keys.next()?;
        let supplier = self.suppliers.next()?;
        Some(Entry {
            key,
            value: supplier.get(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

/// Memoized key view over a backing store
pub(crate) struct KeyCache<ID> {
    keys: OnceCell<Vec<AnyKey<ID>>>,
}

impl<ID> KeyCache<ID> {
    pub(crate) fn new() -> Self {
        Self {
            keys: OnceCell::new(),
        }
    }

    /// Drops the cached view; the next access rebuilds it
    pub(crate) fn invalidate(&mut self) {
        self.keys.take();
    }
}

impl<ID: Clone> KeyCache<ID> {
    pub(crate) fn get_or_build(&self, store: &IndexMap<ID, ValueSupplier>) -> &[AnyKey<ID>] {
        self.keys.get_or_init(|| {
            store
                .iter()
                .map(|(id, supplier)| {
                    TypedKey::with_type(supplier.descriptor().clone(), id.clone())
                })
                .collect()
        })
    }
}

pub(crate) fn lookup<'a, ID>(
    store: &'a IndexMap<ID, ValueSupplier>,
    id: &ID,
) -> Result<&'a ValueSupplier, MapError>
where
    ID: Eq + Hash + Debug,
{
    store
        .get(id)
        .ok_or_else(|| MapError::KeyNotFound(format!("{:?}", id)))
}

/// Fails unless `requested` is assignable from the holder's declared type
pub(crate) fn check_value_type<'a>(
    requested: &TypeDescriptor,
    supplier: &'a ValueSupplier,
) -> Result<&'a ValueSupplier, MapError> {
    if !requested.is_assignable_from(supplier.descriptor()) {
        debug!(
            requested = %requested,
            declared = %supplier.descriptor(),
            "rejected typed access"
        );
        return Err(MapError::mismatch(requested, supplier.descriptor()));
    }
    Ok(supplier)
}

pub(crate) fn extract<'a, T>(
    requested: &TypeDescriptor,
    supplier: &'a ValueSupplier,
) -> Result<Option<&'a T>, MapError>
where
    T: FromValue + ?Sized,
{
    let Some(value) = supplier.get() else {
        return Ok(None);
    };
    T::from_value(value)
        .map(Some)
        .ok_or_else(|| MapError::mismatch(requested, supplier.descriptor()))
}

/// Collects builder entries into a backing store, rejecting duplicate IDs
pub(crate) fn collect_unique<ID>(
    entries: Vec<(ID, ValueSupplier)>,
) -> Result<IndexMap<ID, ValueSupplier>, MapError>
where
    ID: Eq + Hash + Debug,
{
    let mut store = IndexMap::with_capacity(entries.len());
    for (id, supplier) in entries {
        if store.contains_key(&id) {
            debug!(id = ?id, "duplicate key ID in typed map construction");
            return Err(MapError::InvalidArgument(format!(
                "duplicate key ID: {:?}",
                id
            )));
        }
        store.insert(id, supplier);
    }
    Ok(store)
}

/// Entry-set equality: same IDs, same declared types, equal values
pub(crate) fn entries_eq<ID, A, B>(a: &A, b: &B) -> bool
where
    ID: Clone + Eq + Hash + Debug + 'static,
    A: TypedMap<ID> + ?Sized,
    B: TypedMap<ID> + ?Sized,
{
    let (a, b) = (a.delegate(), b.delegate());
    a.len() == b.len()
        && a.iter().all(|(id, mine)| {
            b.get(id).is_some_and(|theirs| {
                mine.descriptor() == theirs.descriptor() && values_eq(mine.get(), theirs.get())
            })
        })
}

fn values_eq(a: Option<&dyn Value>, b: Option<&dyn Value>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.dyn_eq(b),
        (None, None) => true,
        _ => false,
    }
}

/// Order-insensitive hash of the entry set
pub(crate) fn entries_hash<ID, M, H>(map: &M, state: &mut H)
where
    ID: Clone + Eq + Hash + Debug + 'static,
    M: TypedMap<ID> + ?Sized,
    H: Hasher,
{
    let mut sum = 0u64;
    for (id, supplier) in map.delegate() {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        supplier.descriptor().hash(&mut hasher);
        supplier.get().hash(&mut hasher);
        sum = sum.wrapping_add(hasher.finish());
    }
    state.write_usize(map.len());
    state.write_u64(sum);
}

/// Writes `{key=value, ...}` in insertion order
pub(crate) fn fmt_entries<ID, M>(map: &M, f: &mut fmt::Formatter<'_>) -> fmt::Result
where
    ID: Clone + Eq + Hash + Debug + 'static,
    M: TypedMap<ID> + ?Sized,
{
    f.write_str("{")?;
    for (i, entry) in map.entries().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", entry)?;
    }
    f.write_str("}")
}
