use crate::map::{self, KeyCache, TypedMap};
use crate::{
    AnyKey, FromValue, IdentitySupplier, MapError, SupplierKind, TypeDescriptor, TypedKey, Value,
    ValueSupplier,
};
use indexmap::IndexMap;
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use tracing::{debug, trace};

/// A typed map whose entries can be added, and whose mutable entries can
/// have their values replaced.
///
/// An entry's declared type is permanent: once an ID is bound to a type,
/// later writes must use a compatible type and removal only clears the value.
/// Only entries backed by a mutable holder accept new values; entries built
/// from identity or immutable holders fail with `MapError::ImmutableEntry`.
///
/// # Examples
///
/// ```
/// use sovran_typedmap::{MapError, SuppliedTypedMap, TypedKey, TypedMap};
///
/// let retries = TypedKey::<u32, &str>::new("retries");
///
/// let mut settings = SuppliedTypedMap::new();
/// assert_eq!(settings.put(&retries, 3)?, None);
/// assert_eq!(settings.put(&retries, 5)?, Some(3));
/// assert_eq!(settings.get(&retries)?, Some(&5));
///
/// // Removal clears the value but keeps the declared type
/// assert_eq!(settings.remove(&retries)?, Some(5));
/// assert_eq!(settings.len(), 1);
/// assert_eq!(settings.get(&retries)?, None);
///
/// let wrong = TypedKey::<String, &str>::new("retries");
/// assert!(matches!(
///     settings.put(&wrong, "many".to_string()),
///     Err(MapError::TypeMismatch { .. })
/// ));
/// # Ok::<(), MapError>(())
/// ```
pub struct SuppliedTypedMap<ID> {
    entries: IndexMap<ID, ValueSupplier>,
    keys: KeyCache<ID>,
}

macro_rules! fixed_arity {
    ($($n:literal => $of:ident, $of_raw:ident [$($k:ident $v:ident $t:ident),+];)+) => {
        $(
            #[doc = concat!("Builds a map of ", $n, " entries from IDs and holders.")]
            ///
            /// # Errors
            ///
            /// Returns `MapError::InvalidArgument` if two IDs are equal.
            pub fn $of<$($t: Into<ValueSupplier>),+>($($k: ID, $v: $t),+) -> Result<Self, MapError> {
                Self::builder()$(.put_supplier($k, $v))+.build()
            }

            #[doc = concat!("Builds a map of ", $n, " fixed entries, each typed by its value's own type.")]
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

impl<ID> SuppliedTypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
{
    pub fn new() -> Self {
        Self::from_store(IndexMap::new())
    }

    /// Copies every holder of `other`, keeping each holder's kind
    pub fn copy_of<M: TypedMap<ID>>(other: &M) -> Self {
        Self::from_store(other.delegate().clone())
    }

    fixed_arity! {
        1 => of1, of_raw1 [k1 v1 T1];
        2 => of2, of_raw2 [k1 v1 T1, k2 v2 T2];
        3 => of3, of_raw3 [k1 v1 T1, k2 v2 T2, k3 v3 T3];
        4 => of4, of_raw4 [k1 v1 T1, k2 v2 T2, k3 v3 T3, k4 v4 T4];
        5 => of5, of_raw5 [k1 v1 T1, k2 v2 T2, k3 v3 T3, k4 v4 T4, k5 v5 T5];
    }

    pub fn builder() -> Builder<ID> {
        Builder::new()
    }

    fn from_store(entries: IndexMap<ID, ValueSupplier>) -> Self {
        Self {
            entries,
            keys: KeyCache::new(),
        }
    }

    /// Declares the type of `key`'s ID without storing a value.
    ///
    /// An absent ID gets an empty mutable holder of the key's type. An ID
    /// that already has an entry keeps it, provided the key's type is
    /// assignable from the declared one.
    ///
    /// # Errors
    ///
    /// Returns `MapError::TypeMismatch` if the existing declared type is not
    /// compatible with the key's type.
    pub fn set_type<T: ?Sized>(&mut self, key: &TypedKey<T, ID>) -> Result<(), MapError> {
        match self.entries.get(key.id()) {
            Some(supplier) => map::check_value_type(key.descriptor(), supplier).map(|_| ()),
            None => {
                trace!(id = ?key.id(), declared = %key.descriptor(), "declared entry type");
                self.insert(key.id().clone(), ValueSupplier::vacant(key.descriptor().clone()));
                Ok(())
            }
        }
    }

    /// Stores `value` under `key`, returning the previous value.
    ///
    /// # Errors
    ///
    /// - Returns `MapError::TypeMismatch` if the entry's declared type and the key's type
    ///   are not compatible in both directions, or a `T` cannot be stored as the
    ///   declared type
    /// - Returns `MapError::ImmutableEntry` if the entry is not backed by a mutable holder
    pub fn put<T: Value>(&mut self, key: &TypedKey<T, ID>, value: T) -> Result<Option<T>, MapError> {
        if !self.entries.contains_key(key.id()) {
            let supplier = ValueSupplier::mutable(key.descriptor().clone(), Some(value))?;
            trace!(id = ?key.id(), declared = %key.descriptor(), "inserted mutable entry");
            self.insert(key.id().clone(), supplier);
            return Ok(None);
        }

        let supplier = self.supplier_mut(key.id())?;
        check_writable(key.descriptor(), supplier)?;
        if supplier.get().is_some_and(|prior| !prior.is::<T>()) {
            return Err(MapError::mismatch(key.descriptor(), supplier.descriptor()));
        }
        let prior = supplier.replace(Some(Box::new(value)))?;
        trace!(id = ?key.id(), "replaced entry value");
        Ok(prior.and_then(T::from_boxed))
    }

    /// Writes every entry of `other` into this map.
    ///
    /// Each entry with a value follows the rules of [`SuppliedTypedMap::put`].
    /// An entry without a value only matters for an ID this map lacks, which
    /// is then declared with the entry's type; an existing value is never
    /// cleared by it. All entries are checked before any is written, so a
    /// failure leaves this map as it was.
    ///
    /// # Errors
    ///
    /// Same as [`SuppliedTypedMap::put`], for the first offending entry.
    pub fn put_all<M: TypedMap<ID>>(&mut self, other: &M) -> Result<(), MapError> {
        for (id, theirs) in other.delegate() {
            let (Some(mine), Some(value)) = (self.entries.get(id), theirs.get()) else {
                continue;
            };
            check_writable(theirs.descriptor(), mine)?;
            mine.check_value(value)?;
        }

        let mut inserted = false;
        for (id, theirs) in other.delegate() {
            let value = theirs.get().map(|value| value.clone_value());
            match self.entries.get_mut(id) {
                Some(mine) => {
                    if value.is_some() {
                        mine.replace(value)?;
                    }
                }
                None => {
                    self.entries.insert(
                        id.clone(),
                        ValueSupplier::from_parts(
                            theirs.descriptor().clone(),
                            value,
                            SupplierKind::Mutable,
                        ),
                    );
                    inserted = true;
                }
            }
        }
        if inserted {
            self.keys.invalidate();
        }
        trace!(count = other.len(), "copied entries");
        Ok(())
    }

    /// Clears the value under `key`, returning it.
    ///
    /// The ID and its declared type stay in the map.
    ///
    /// # Errors
    ///
    /// - Returns `MapError::KeyNotFound` if the ID has no entry
    /// - Returns `MapError::TypeMismatch` if the key's type is not assignable from the declared type
    /// - Returns `MapError::ImmutableEntry` if the entry is not backed by a mutable holder
    pub fn remove<T>(&mut self, key: &TypedKey<T, ID>) -> Result<Option<T::Owned>, MapError>
    where
        T: FromValue + ?Sized,
    {
        self.remove_with::<T>(key.descriptor(), key.id())
    }

    /// Same as [`SuppliedTypedMap::remove`], with an explicit descriptor
    ///
    /// # Errors
    ///
    /// Same as [`SuppliedTypedMap::remove`].
    pub fn remove_with<T>(
        &mut self,
        descriptor: &TypeDescriptor,
        id: &ID,
    ) -> Result<Option<T::Owned>, MapError>
    where
        T: FromValue + ?Sized,
    {
        let supplier = self.supplier_mut(id)?;
        map::check_value_type(descriptor, supplier)?;
        supplier.ensure_mutable()?;
        if supplier.get().is_some_and(|prior| T::from_value(prior).is_none()) {
            return Err(MapError::mismatch(descriptor, supplier.descriptor()));
        }
        let prior = supplier.replace(None)?;
        trace!(id = ?id, "cleared entry value");
        Ok(prior.and_then(T::from_boxed))
    }

    /// Clears the value under `id` without any type check
    ///
    /// # Errors
    ///
    /// - Returns `MapError::KeyNotFound` if the ID has no entry
    /// - Returns `MapError::ImmutableEntry` if the entry is not backed by a mutable holder
    pub fn remove_raw(&mut self, id: &ID) -> Result<Option<Box<dyn Value>>, MapError> {
        let prior = self.supplier_mut(id)?.replace(None)?;
        trace!(id = ?id, "cleared entry value");
        Ok(prior)
    }

    /// Clears every value, keeping all IDs and declared types.
    ///
    /// Nothing is cleared unless every entry is backed by a mutable holder.
    ///
    /// # Errors
    ///
    /// Returns `MapError::ImmutableEntry` if any entry is not backed by a
    /// mutable holder.
    pub fn clear(&mut self) -> Result<(), MapError> {
        for supplier in self.entries.values() {
            supplier.ensure_mutable()?;
        }
        for supplier in self.entries.values_mut() {
            supplier.replace(None)?;
        }
        trace!(count = self.entries.len(), "cleared all entry values");
        Ok(())
    }

    /// Mutable access to the value under `key`, with the same checks as
    /// [`SuppliedTypedMap::put`]
    ///
    /// # Errors
    ///
    /// Same as [`SuppliedTypedMap::put`], plus `MapError::KeyNotFound` if the
    /// ID has no entry.
    pub fn get_mut<T: Value>(&mut self, key: &TypedKey<T, ID>) -> Result<Option<&mut T>, MapError> {
        let supplier = self.supplier_mut(key.id())?;
        check_writable(key.descriptor(), supplier)?;
        if supplier.get().is_some_and(|value| !value.is::<T>()) {
            return Err(MapError::mismatch(key.descriptor(), supplier.descriptor()));
        }
        Ok(supplier
            .value_mut()
            .and_then(|value| value.as_any_mut().downcast_mut::<T>()))
    }

    fn supplier_mut(&mut self, id: &ID) -> Result<&mut ValueSupplier, MapError> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| MapError::KeyNotFound(format!("{:?}", id)))
    }

    fn insert(&mut self, id: ID, supplier: ValueSupplier) {
        self.entries.insert(id, supplier);
        self.keys.invalidate();
    }
}

/// A write through `requested` needs both types to accept each other and a
/// mutable holder
fn check_writable(requested: &TypeDescriptor, supplier: &ValueSupplier) -> Result<(), MapError> {
    map::check_value_type(requested, supplier)?;
    if !supplier.descriptor().is_assignable_from(requested) {
        debug!(
            requested = %requested,
            declared = %supplier.descriptor(),
            "rejected write of a wider type"
        );
        return Err(MapError::mismatch(requested, supplier.descriptor()));
    }
    if !supplier.is_mutable() {
        debug!(
            declared = %supplier.descriptor(),
            kind = ?supplier.kind(),
            "rejected write to fixed entry"
        );
    }
    supplier.ensure_mutable()
}

impl<ID> TypedMap<ID> for SuppliedTypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
{
    fn delegate(&self) -> &IndexMap<ID, ValueSupplier> {
        &self.entries
    }

    fn keys(&self) -> &[AnyKey<ID>] {
        self.keys.get_or_build(&self.entries)
    }
}

impl<ID> Default for SuppliedTypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<ID> Clone for SuppliedTypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
{
    fn clone(&self) -> Self {
        Self::from_store(self.entries.clone())
    }
}

impl<ID, M> PartialEq<M> for SuppliedTypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
    M: TypedMap<ID>,
{
    fn eq(&self, other: &M) -> bool {
        map::entries_eq(self, other)
    }
}

impl<ID> Eq for SuppliedTypedMap<ID> where ID: Clone + Eq + Hash + Debug + 'static {}

impl<ID> Hash for SuppliedTypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        map::entries_hash(self, state);
    }
}

impl<ID> fmt::Display for SuppliedTypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        map::fmt_entries(self, f)
    }
}

impl<ID> Debug for SuppliedTypedMap<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SuppliedTypedMap")?;
        map::fmt_entries(self, f)
    }
}

/// Collects entries for a [`SuppliedTypedMap`].
pub struct Builder<ID> {
    entries: Vec<(ID, ValueSupplier)>,
    error: Option<MapError>,
}

impl<ID> Builder<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            error: None,
        }
    }

    /// Adds a replaceable value declared as the key's type
    pub fn put<T: Value>(mut self, key: &TypedKey<T, ID>, value: T) -> Self {
        match ValueSupplier::mutable(key.descriptor().clone(), Some(value)) {
            Ok(supplier) => self.entries.push((key.id().clone(), supplier)),
            Err(error) => {
                self.error.get_or_insert(error);
            }
        }
        self
    }

    /// Adds a fixed value declared as its own concrete type
    pub fn put_raw<T: Value>(mut self, id: ID, value: T) -> Self {
        self.entries.push((id, IdentitySupplier::new(value).into()));
        self
    }

    /// Adds a holder as is. Only mutable holders accept later writes.
    pub fn put_supplier(mut self, id: ID, supplier: impl Into<ValueSupplier>) -> Self {
        self.entries.push((id, supplier.into()));
        self
    }

    /// Adds every `(id, holder)` pair, keeping each holder's kind
    pub fn put_all<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (ID, ValueSupplier)>,
    {
        self.entries.extend(entries);
        self
    }

    /// # Errors
    ///
    /// - Returns `MapError::TypeMismatch` if a value added with [`Builder::put`]
    ///   cannot be stored as its key's type
    /// - Returns `MapError::InvalidArgument` if two entries share an ID
    pub fn build(self) -> Result<SuppliedTypedMap<ID>, MapError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let entries = map::collect_unique(self.entries)?;
        Ok(SuppliedTypedMap::from_store(entries))
    }
}

impl<ID> Default for Builder<ID>
where
    ID: Clone + Eq + Hash + Debug + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
