use crate::{MapError, TypeDescriptor, Value};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A value paired with the type it was declared as.
///
/// The descriptor is fixed when the holder is created and never changes,
/// even for holders whose value can be replaced.
pub trait TypedSupplier<T: ?Sized> {
    fn descriptor(&self) -> &TypeDescriptor;

    /// The held value, `None` if the holder is empty
    fn get(&self) -> Option<&T>;
}

/// The holder variants, distinguished by whether and how their value can change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupplierKind {
    /// Fixed, always-present value whose type usually comes from the value itself
    Identity,
    /// Fixed value (possibly absent) with an explicit declared type
    Immutable,
    /// Replaceable value with an explicit declared type
    Mutable,
    /// Value produced on first read by a source function, then kept
    Delegating,
}

/// Fails unless a `T` may be stored under `descriptor`
fn check_declared<T: Value>(descriptor: &TypeDescriptor) -> Result<(), MapError> {
    let actual = TypeDescriptor::of::<T>();
    if descriptor.admits(&actual) {
        return Ok(());
    }
    debug!(declared = %descriptor, value = %actual, "rejected value for declared type");
    Err(MapError::mismatch(descriptor, &actual))
}

/// A holder for a value that is always present.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentitySupplier<T> {
    descriptor: TypeDescriptor,
    value: T,
}

impl<T: Value> IdentitySupplier<T> {
    /// Creates a holder whose declared type is the value's own type
    pub fn new(value: T) -> Self {
        Self {
            descriptor: value.type_descriptor(),
            value,
        }
    }

    /// Creates a holder declared as `descriptor`
    ///
    /// # Errors
    ///
    /// Returns `MapError::TypeMismatch` if a `T` cannot be stored as `descriptor`.
    pub fn with_type(descriptor: TypeDescriptor, value: T) -> Result<Self, MapError> {
        check_declared::<T>(&descriptor)?;
        Ok(Self { descriptor, value })
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Value> TypedSupplier<T> for IdentitySupplier<T> {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn get(&self) -> Option<&T> {
        Some(&self.value)
    }
}

/// A holder for a fixed value that may be absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ImmutableSupplier<T> {
    descriptor: TypeDescriptor,
    value: Option<T>,
}

impl<T: Value> ImmutableSupplier<T> {
    /// Creates a holder declared as `descriptor`. `None` makes an entry that
    /// exists but never has a value.
    ///
    /// # Errors
    ///
    /// Returns `MapError::TypeMismatch` if a `T` cannot be stored as `descriptor`.
    pub fn new(descriptor: TypeDescriptor, value: Option<T>) -> Result<Self, MapError> {
        check_declared::<T>(&descriptor)?;
        Ok(Self { descriptor, value })
    }

    pub fn into_inner(self) -> Option<T> {
        self.value
    }
}

impl<T: Value> TypedSupplier<T> for ImmutableSupplier<T> {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

/// A holder whose value can be replaced any number of times.
///
/// # Examples
///
/// ```
/// use sovran_typedmap::{MapError, MutableSupplier, TypeDescriptor, TypedSupplier};
///
/// let mut count = MutableSupplier::<u32>::new(TypeDescriptor::of::<u32>(), None)?;
/// assert_eq!(count.get(), None);
/// assert_eq!(count.set(1), None);
/// assert_eq!(count.set(2), Some(1));
/// assert_eq!(count.take(), Some(2));
/// assert_eq!(count.descriptor(), &TypeDescriptor::of::<u32>());
///
/// // A u32 holder cannot be declared as a String
/// assert!(MutableSupplier::<u32>::new(TypeDescriptor::of::<String>(), None).is_err());
/// # Ok::<(), MapError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MutableSupplier<T> {
    descriptor: TypeDescriptor,
    value: Option<T>,
}

impl<T: Value> MutableSupplier<T> {
    /// Creates a holder declared as `descriptor`, starting with `value`
    ///
    /// # Errors
    ///
    /// Returns `MapError::TypeMismatch` if a `T` cannot be stored as `descriptor`.
    pub fn new(descriptor: TypeDescriptor, value: Option<T>) -> Result<Self, MapError> {
        check_declared::<T>(&descriptor)?;
        Ok(Self { descriptor, value })
    }

    /// Replaces the held value, returning the previous one
    pub fn set(&mut self, value: T) -> Option<T> {
        self.value.replace(value)
    }

    /// Empties the holder, returning the previous value
    pub fn take(&mut self) -> Option<T> {
        self.value.take()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    pub fn into_inner(self) -> Option<T> {
        self.value
    }
}

impl<T: Value> TypedSupplier<T> for MutableSupplier<T> {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

type Source<T> = Arc<dyn Fn() -> Option<T> + Send + Sync>;

/// A holder that asks a source function for its value.
///
/// The source runs on the first read and its result is kept, so every later
/// read sees the same value until [`DelegatingSupplier::refresh`] drops it.
/// Maps treat the entry as fixed: writes and removals fail with
/// `MapError::ImmutableEntry`.
///
/// # Examples
///
/// ```
/// use sovran_typedmap::{DelegatingSupplier, MapError, TypeDescriptor, TypedSupplier};
///
/// let home = DelegatingSupplier::new(TypeDescriptor::of::<String>(), || {
///     Some("/home/demo".to_string())
/// })?;
/// assert_eq!(home.get().map(String::as_str), Some("/home/demo"));
/// # Ok::<(), MapError>(())
/// ```
pub struct DelegatingSupplier<T> {
    descriptor: TypeDescriptor,
    source: Source<T>,
    memo: OnceCell<Option<T>>,
}

impl<T: Value> DelegatingSupplier<T> {
    /// Creates a holder declared as `descriptor` that reads through `source`
    ///
    /// # Errors
    ///
    /// Returns `MapError::TypeMismatch` if a `T` cannot be stored as `descriptor`.
    pub fn new<F>(descriptor: TypeDescriptor, source: F) -> Result<Self, MapError>
    where
        F: Fn() -> Option<T> + Send + Sync + 'static,
    {
        check_declared::<T>(&descriptor)?;
        Ok(Self {
            descriptor,
            source: Arc::new(source),
            memo: OnceCell::new(),
        })
    }

    /// Drops the kept value; the next read calls the source again
    pub fn refresh(&mut self) {
        self.memo.take();
    }

    /// Returns true once the source has been called
    pub fn is_resolved(&self) -> bool {
        self.memo.get().is_some()
    }
}

impl<T: Value> TypedSupplier<T> for DelegatingSupplier<T> {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn get(&self) -> Option<&T> {
        self.memo.get_or_init(|| (self.source)()).as_ref()
    }
}

impl<T: Clone> Clone for DelegatingSupplier<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            source: Arc::clone(&self.source),
            memo: self.memo.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DelegatingSupplier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatingSupplier")
            .field("descriptor", &self.descriptor)
            .field("memo", &self.memo.get())
            .finish()
    }
}

enum Slot {
    Stored(Option<Box<dyn Value>>),
    Deferred {
        source: Source<Box<dyn Value>>,
        memo: OnceCell<Option<Box<dyn Value>>>,
    },
}

impl Slot {
    fn get(&self) -> Option<&(dyn Value + 'static)> {
        match self {
            Slot::Stored(value) => value.as_deref(),
            Slot::Deferred { source, memo } => memo.get_or_init(|| source()).as_deref(),
        }
    }
}

impl Clone for Slot {
    fn clone(&self) -> Self {
        match self {
            Slot::Stored(value) => Slot::Stored(value.as_deref().map(|v| v.clone_value())),
            Slot::Deferred { source, memo } => {
                let copy = OnceCell::new();
                if let Some(resolved) = memo.get() {
                    let _ = copy.set(resolved.as_deref().map(|v| v.clone_value()));
                }
                Slot::Deferred {
                    source: Arc::clone(source),
                    memo: copy,
                }
            }
        }
    }
}

/// The type-erased holder stored by every typed map.
///
/// Built from one of the typed holders (or directly with the constructors
/// below), it remembers which variant it came from so a map can refuse to
/// replace values that were never meant to change.
pub struct ValueSupplier {
    descriptor: TypeDescriptor,
    slot: Slot,
    kind: SupplierKind,
}

impl ValueSupplier {
    /// An identity holder typed by the value's own concrete type
    pub fn identity<T: Value>(value: T) -> Self {
        IdentitySupplier::new(value).into()
    }

    /// # Errors
    ///
    /// Returns `MapError::TypeMismatch` if a `T` cannot be stored as `descriptor`.
    pub fn immutable<T: Value>(
        descriptor: TypeDescriptor,
        value: Option<T>,
    ) -> Result<Self, MapError> {
        ImmutableSupplier::new(descriptor, value).map(Self::from)
    }

    /// # Errors
    ///
    /// Returns `MapError::TypeMismatch` if a `T` cannot be stored as `descriptor`.
    pub fn mutable<T: Value>(
        descriptor: TypeDescriptor,
        value: Option<T>,
    ) -> Result<Self, MapError> {
        MutableSupplier::new(descriptor, value).map(Self::from)
    }

    /// An empty mutable holder that only declares a type
    pub fn vacant(descriptor: TypeDescriptor) -> Self {
        Self::from_parts(descriptor, None, SupplierKind::Mutable)
    }

    pub(crate) fn from_parts(
        descriptor: TypeDescriptor,
        value: Option<Box<dyn Value>>,
        kind: SupplierKind,
    ) -> Self {
        Self {
            descriptor,
            slot: Slot::Stored(value),
            kind,
        }
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// The held value. A delegating holder calls its source on first use.
    pub fn get(&self) -> Option<&(dyn Value + 'static)> {
        self.slot.get()
    }

    pub fn kind(&self) -> SupplierKind {
        self.kind
    }

    pub fn is_mutable(&self) -> bool {
        self.kind == SupplierKind::Mutable
    }

    pub(crate) fn value_mut(&mut self) -> Option<&mut (dyn Value + 'static)> {
        match &mut self.slot {
            Slot::Stored(value) => value.as_deref_mut(),
            Slot::Deferred { memo, .. } => memo.get_mut().and_then(|v| v.as_deref_mut()),
        }
    }

    /// Replaces the held value, returning the previous one.
    ///
    /// # Errors
    ///
    /// - Returns `MapError::ImmutableEntry` unless the holder is the mutable kind
    /// - Returns `MapError::TypeMismatch` if the new value cannot be stored as
    ///   the declared type
    pub fn replace(
        &mut self,
        value: Option<Box<dyn Value>>,
    ) -> Result<Option<Box<dyn Value>>, MapError> {
        self.ensure_mutable()?;
        if let Some(value) = value.as_deref() {
            self.check_value(value)?;
        }
        if let Slot::Stored(held) = &mut self.slot {
            return Ok(std::mem::replace(held, value));
        }
        Err(self.immutable_error())
    }

    /// Fails with `MapError::ImmutableEntry` unless the holder accepts
    /// value replacement
    pub fn ensure_mutable(&self) -> Result<(), MapError> {
        if self.is_mutable() {
            return Ok(());
        }
        Err(self.immutable_error())
    }

    /// Fails with `MapError::TypeMismatch` unless `value` may be stored as
    /// the declared type
    pub(crate) fn check_value(&self, value: &dyn Value) -> Result<(), MapError> {
        let actual = value.type_descriptor();
        if self.descriptor.admits(&actual) {
            return Ok(());
        }
        debug!(declared = %self.descriptor, value = %actual, "rejected value for declared type");
        Err(MapError::mismatch(&self.descriptor, &actual))
    }

    fn immutable_error(&self) -> MapError {
        MapError::ImmutableEntry(format!("{:?} holder of {}", self.kind, self.descriptor))
    }
}

impl TypedSupplier<dyn Value> for ValueSupplier {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn get(&self) -> Option<&(dyn Value + 'static)> {
        self.slot.get()
    }
}

impl Clone for ValueSupplier {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            slot: self.slot.clone(),
            kind: self.kind,
        }
    }
}

impl PartialEq for ValueSupplier {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.descriptor == other.descriptor
            && self.get() == other.get()
    }
}

impl fmt::Debug for ValueSupplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSupplier")
            .field("descriptor", &self.descriptor)
            .field("value", &self.get())
            .field("kind", &self.kind)
            .finish()
    }
}

impl<T: Value> From<IdentitySupplier<T>> for ValueSupplier {
    fn from(supplier: IdentitySupplier<T>) -> Self {
        Self::from_parts(
            supplier.descriptor,
            Some(Box::new(supplier.value)),
            SupplierKind::Identity,
        )
    }
}

impl<T: Value> From<ImmutableSupplier<T>> for ValueSupplier {
    fn from(supplier: ImmutableSupplier<T>) -> Self {
        Self::from_parts(
            supplier.descriptor,
            supplier.value.map(|v| Box::new(v) as Box<dyn Value>),
            SupplierKind::Immutable,
        )
    }
}

impl<T: Value> From<MutableSupplier<T>> for ValueSupplier {
    fn from(supplier: MutableSupplier<T>) -> Self {
        Self::from_parts(
            supplier.descriptor,
            supplier.value.map(|v| Box::new(v) as Box<dyn Value>),
            SupplierKind::Mutable,
        )
    }
}

impl<T: Value> From<DelegatingSupplier<T>> for ValueSupplier {
    fn from(supplier: DelegatingSupplier<T>) -> Self {
        let typed = supplier.source;
        let source: Source<Box<dyn Value>> =
            Arc::new(move || typed().map(|v| Box::new(v) as Box<dyn Value>));
        let memo = OnceCell::new();
        if let Some(resolved) = supplier.memo.into_inner() {
            let _ = memo.set(resolved.map(|v| Box::new(v) as Box<dyn Value>));
        }
        Self {
            descriptor: supplier.descriptor,
            slot: Slot::Deferred { source, memo },
            kind: SupplierKind::Delegating,
        }
    }
}
