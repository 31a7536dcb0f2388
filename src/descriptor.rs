use crate::value::Value;
use once_cell::sync::Lazy;
use std::any::{type_name, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

/// Declared supertypes, shared by every descriptor of the same type
static SUPERTYPES: Lazy<RwLock<HashMap<TypeId, Vec<TypeDescriptor>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

#[derive(Clone)]
struct Descriptor {
    type_id: TypeId,
    name: &'static str,
    args: Vec<TypeDescriptor>,
}

/// A reified, comparable description of a (possibly generic) type.
///
/// Rust erases nothing at runtime for concrete types, but a map that holds
/// values of many types still needs a value-level token to compare declared
/// types and decide whether one can stand in for another. `TypeDescriptor`
/// is that token: a `TypeId` plus optional type arguments.
///
/// Supertypes belong to the type itself. Once `i32` is declared to extend
/// `dyn Number`, every descriptor of `i32` (and of any parameterization of a
/// generic type) sees that declaration, so equal descriptors always answer
/// [`TypeDescriptor::is_assignable_from`] the same way.
///
/// # Examples
///
/// ```
/// use sovran_typedmap::TypeDescriptor;
///
/// trait Number {}
/// struct List;
///
/// let number = TypeDescriptor::of::<dyn Number>();
/// let int = TypeDescriptor::of::<i32>().extends(number.clone());
/// assert!(number.is_assignable_from(&int));
/// assert!(!int.is_assignable_from(&number));
///
/// let strings = TypeDescriptor::of::<List>().parameterized([TypeDescriptor::of::<String>()]);
/// assert_eq!(strings.to_string(), "List<String>");
/// assert!(TypeDescriptor::of::<List>().is_assignable_from(&strings));
/// ```
#[derive(Clone)]
pub struct TypeDescriptor(Arc<Descriptor>);

impl TypeDescriptor {
    /// Describes `T`, which may be unsized (for example a trait object)
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(Arc::new(Descriptor {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
            args: Vec::new(),
        }))
    }

    /// The top type: assignable from every other descriptor
    pub fn any() -> Self {
        Self::of::<dyn Value>()
    }

    /// Attaches type arguments to this (raw) descriptor
    pub fn parameterized<I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = TypeDescriptor>,
    {
        Arc::make_mut(&mut self.0).args.extend(args);
        self
    }

    /// Records `supertype` as a type this one may be treated as.
    ///
    /// The declaration is process-wide: it applies to every descriptor with
    /// the same `TypeId`, including ones created before this call.
    pub fn extends(self, supertype: TypeDescriptor) -> Self {
        let mut registry = SUPERTYPES.write().unwrap_or_else(PoisonError::into_inner);
        let declared = registry.entry(self.0.type_id).or_default();
        if !declared.contains(&supertype) {
            trace!(subtype = %self, supertype = %supertype, "declared supertype");
            declared.push(supertype);
        }
        drop(registry);
        self
    }

    /// The same type with its type arguments dropped
    pub fn raw(&self) -> Self {
        if self.0.args.is_empty() {
            return self.clone();
        }
        let mut raw = (*self.0).clone();
        raw.args.clear();
        Self(Arc::new(raw))
    }

    /// `TypeId` of the described Rust type, ignoring type arguments
    pub fn type_id(&self) -> TypeId {
        self.0.type_id
    }

    /// Fully qualified name of the underlying Rust type
    pub fn name(&self) -> &'static str {
        self.0.name
    }

    /// Type arguments attached with [`TypeDescriptor::parameterized`]
    pub fn args(&self) -> &[TypeDescriptor] {
        &self.0.args
    }

    /// Supertypes declared for this type so far, in declaration order
    pub fn supertypes(&self) -> Vec<TypeDescriptor> {
        SUPERTYPES
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&self.0.type_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns true for the top type, [`TypeDescriptor::any`]
    pub fn is_any(&self) -> bool {
        self.0.type_id == TypeId::of::<dyn Value>() && self.0.args.is_empty()
    }

    /// Returns true if no type arguments are attached
    pub fn is_raw(&self) -> bool {
        self.0.args.is_empty()
    }

    /// Returns true if a value declared as `other` may be used where `self`
    /// is expected.
    ///
    /// The relation holds when `self` is the top type, when both describe
    /// the same type, when `self` is the raw form of a parameterized `other`,
    /// or when it holds for any of `other`'s declared supertypes. Type
    /// arguments are compared exactly.
    pub fn is_assignable_from(&self, other: &TypeDescriptor) -> bool {
        if self.is_any() {
            return true;
        }
        let mut pending = vec![other.clone()];
        let mut visited = HashSet::new();
        while let Some(candidate) = pending.pop() {
            if self.accepts(&candidate) {
                return true;
            }
            if visited.insert(candidate.0.type_id) {
                pending.extend(candidate.supertypes());
            }
        }
        false
    }

    /// Returns true if a value whose own type is `value_type` may be stored
    /// under this declared type.
    ///
    /// Type arguments are not checked against the value, so `List<String>`
    /// admits a `List`.
    pub fn admits(&self, value_type: &TypeDescriptor) -> bool {
        self.raw().is_assignable_from(value_type)
    }

    fn accepts(&self, other: &TypeDescriptor) -> bool {
        self == other
            || (self.is_raw() && !other.is_raw() && self.0.type_id == other.0.type_id)
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.type_id == other.0.type_id && self.0.args == other.0.args)
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.type_id.hash(state);
        self.0.args.hash(state);
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&short_name(self.0.name))?;
        if let Some((first, rest)) = self.0.args.split_first() {
            write!(f, "<{}", first)?;
            for arg in rest {
                write!(f, ", {}", arg)?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeDescriptor")
            .field(&format_args!("{}", self))
            .finish()
    }
}

/// Strips module paths from every path segment of a `type_name` string
fn short_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut path = String::new();
    for c in full.chars() {
        if c.is_alphanumeric() || c == '_' || c == ':' {
            path.push(c);
        } else {
            flush_path(&mut out, &mut path);
            out.push(c);
        }
    }
    flush_path(&mut out, &mut path);
    out
}

fn flush_path(out: &mut String, path: &mut String) {
    if let Some(last) = path.rsplit("::").next() {
        out.push_str(last);
    }
    path.clear();
}
