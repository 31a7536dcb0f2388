//! # sovran-typedmap
//!
//! A heterogeneous map whose entries each carry their own declared type.
//!
//! `sovran-typedmap` stores values of arbitrarily different types under keys
//! of one ID type, and checks every typed read against the type the entry was
//! declared with. Asking for a declared supertype succeeds; asking for a more
//! specific or unrelated type fails with a type mismatch instead of handing
//! back something you did not expect.
//!
//! ## Key Features
//!
//! - **Per-entry typing**: every entry binds its ID to a [`TypeDescriptor`] for life
//! - **Checked reads**: a missing ID and a wrong type are distinct errors
//! - **Two flavors**: [`ImmutableTypedMap`] is frozen and shareable across threads,
//!   [`SuppliedTypedMap`] accepts new entries and value replacement
//! - **Deferred values**: a [`DelegatingSupplier`] computes its value on first read
//! - **Map ergonomics**: ordered iteration, typed key views, equality and hashing
//!   that work across both flavors
//!
//! Read access lives on the [`TypedMap`] trait, so bring it into scope.
//!
//! ## Usage Examples
//!
//! ### Basic Usage
//!
//! ```rust
//! use sovran_typedmap::{ImmutableTypedMap, MapError, TypedKey, TypedMap};
//!
//! fn main() -> Result<(), MapError> {
//!     let host = TypedKey::<String, &str>::new("host");
//!     let port = TypedKey::<u16, &str>::new("port");
//!
//!     let config = ImmutableTypedMap::of2(&host, "localhost".to_string(), &port, 8080)?;
//!     println!("{}", config);
//!
//!     if let Some(port) = config.get(&port)? {
//!         println!("Listening on {}", port);
//!     }
//!
//!     // The wrong type for an existing ID
//!     match config.get(&TypedKey::<i64, &str>::new("port")) {
//!         Ok(value) => println!("Port: {:?}", value),
//!         Err(MapError::TypeMismatch { requested, declared }) => {
//!             println!("Asked for {} but the entry is {}", requested, declared)
//!         }
//!         Err(e) => println!("Other error: {}", e),
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Reading Through a Supertype
//!
//! Rust has no subclassing, so a descriptor records the supertypes it may be
//! read as, and [`FromValue`] tells the map how to produce that view.
//!
//! ```rust
//! use sovran_typedmap::{FromValue, ImmutableTypedMap, MapError, TypeDescriptor, TypedKey, TypedMap, Value};
//!
//! trait Number {
//!     fn as_f64(&self) -> f64;
//! }
//!
//! impl Number for i32 {
//!     fn as_f64(&self) -> f64 {
//!         f64::from(*self)
//!     }
//! }
//!
//! impl FromValue for dyn Number {
//!     type Owned = Box<dyn Number>;
//!
//!     fn from_value<'v>(value: &'v (dyn Value + 'static)) -> Option<&'v Self> {
//!         value.downcast_ref::<i32>().map(|n| n as &dyn Number)
//!     }
//!
//!     fn from_boxed(value: Box<dyn Value>) -> Option<Self::Owned> {
//!         value.into_any().downcast::<i32>().ok().map(|n| n as Box<dyn Number>)
//!     }
//! }
//!
//! fn main() -> Result<(), MapError> {
//!     let number = TypeDescriptor::of::<dyn Number>();
//!     let int = TypeDescriptor::of::<i32>().extends(number.clone());
//!
//!     let a = TypedKey::<String, &str>::new("a");
//!     let b = TypedKey::<i32, &str>::with_type(int, "b");
//!     let c = TypedKey::<i32, &str>::with_type(number.clone(), "c");
//!
//!     let map = ImmutableTypedMap::builder()
//!         .put(&a, "1".to_string())
//!         .put(&b, 2)
//!         .put(&c, 3)
//!         .build()?;
//!
//!     // "b" is an i32 that may be read as a Number
//!     let as_number = TypedKey::<dyn Number, &str>::with_type(number, "b");
//!     assert_eq!(map.get(&as_number)?.map(|n| n.as_f64()), Some(2.0));
//!     assert_eq!(map.get(&TypedKey::<i32, &str>::new("b"))?, Some(&2));
//!
//!     // "c" was declared as a Number, so reading it as i32 is too specific
//!     assert!(matches!(
//!         map.get(&TypedKey::<i32, &str>::new("c")),
//!         Err(MapError::TypeMismatch { .. })
//!     ));
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Mutable Entries
//!
//! ```rust
//! use sovran_typedmap::{MapError, SuppliedTypedMap, TypedKey, TypedMap};
//!
//! fn main() -> Result<(), MapError> {
//!     let visits = TypedKey::<u64, String>::new("visits".to_string());
//!     let tags = TypedKey::<Vec<String>, String>::new("tags".to_string());
//!
//!     let mut state = SuppliedTypedMap::new();
//!     state.put(&visits, 0)?;
//!     state.set_type(&tags)?;
//!     assert_eq!(state.get(&tags)?, None);
//!
//!     if let Some(count) = state.get_mut(&visits)? {
//!         *count += 1;
//!     }
//!     state.put(&tags, vec!["new".to_string()])?;
//!
//!     for entry in state.entries() {
//!         println!("{}", entry);
//!     }
//!
//!     // Removing clears the value; the ID keeps its type
//!     state.remove(&visits)?;
//!     assert_eq!(state.len(), 2);
//!     assert!(state.contains(&visits));
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Values Computed on First Read
//!
//! ```rust
//! use sovran_typedmap::{DelegatingSupplier, ImmutableTypedMap, MapError, TypeDescriptor, TypedKey, TypedMap};
//!
//! fn main() -> Result<(), MapError> {
//!     let workers = DelegatingSupplier::new(TypeDescriptor::of::<usize>(), || {
//!         let configured = std::env::var("WORKERS").ok().and_then(|n| n.parse().ok());
//!         configured.or(Some(4))
//!     })?;
//!
//!     let runtime = ImmutableTypedMap::builder()
//!         .put_supplier("workers", workers)
//!         .build()?;
//!
//!     // The source runs here, once
//!     let count = runtime.get(&TypedKey::<usize, &str>::new("workers"))?;
//!     assert!(count.is_some_and(|n| *n >= 1));
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Fixed Entries Stay Fixed
//!
//! ```rust
//! use sovran_typedmap::{MapError, SuppliedTypedMap, TypedKey, TypedMap};
//!
//! let mut map = SuppliedTypedMap::of_raw1("version", 3u32).expect("single entry");
//!
//! match map.put(&TypedKey::<u32, &str>::new("version"), 4) {
//!     Ok(prior) => println!("Replaced {:?}", prior),
//!     Err(MapError::ImmutableEntry(detail)) => println!("Cannot replace: {}", detail),
//!     Err(e) => println!("Other error: {}", e),
//! }
//!
//! match map.get(&TypedKey::<u32, &str>::new("release")) {
//!     Ok(value) => println!("Release: {:?}", value),
//!     Err(MapError::KeyNotFound(id)) => println!("No entry for {}", id),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```

mod descriptor;
mod error;
mod immutable;
mod key;
mod map;
mod supplied;
mod supplier;
mod value;

pub use descriptor::TypeDescriptor;
pub use error::MapError;
pub use immutable::{Builder as ImmutableBuilder, ImmutableTypedMap};
pub use key::{AnyKey, TypedKey};
pub use map::{Entries, Entry, TypedMap};
pub use supplied::{Builder as SuppliedBuilder, SuppliedTypedMap};
pub use supplier::{
    DelegatingSupplier, IdentitySupplier, ImmutableSupplier, MutableSupplier, SupplierKind,
    TypedSupplier, ValueSupplier,
};
pub use value::{FromValue, Value};
