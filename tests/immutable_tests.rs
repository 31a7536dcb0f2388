use pretty_assertions::assert_eq;
use sovran_typedmap::{
    FromValue, ImmutableSupplier, ImmutableTypedMap, MapError, SuppliedTypedMap, TypeDescriptor,
    TypedKey, TypedMap, Value, ValueSupplier,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

mod common;
use common::init_logging;

trait Number {
    fn as_i64(&self) -> i64;
}

impl Number for i32 {
    fn as_i64(&self) -> i64 {
        i64::from(*self)
    }
}

impl FromValue for dyn Number {
    type Owned = Box<dyn Number>;

    fn from_value<'v>(value: &'v (dyn Value + 'static)) -> Option<&'v Self> {
        value.downcast_ref::<i32>().map(|n| n as &dyn Number)
    }

    fn from_boxed(value: Box<dyn Value>) -> Option<Self::Owned> {
        value
            .into_any()
            .downcast::<i32>()
            .ok()
            .map(|n| n as Box<dyn Number>)
    }
}

/// `dyn Number`, with `i32` registered as one of its implementors
fn number() -> TypeDescriptor {
    let number = TypeDescriptor::of::<dyn Number>();
    TypeDescriptor::of::<i32>().extends(number.clone());
    number
}

fn integer() -> TypeDescriptor {
    TypeDescriptor::of::<i32>().extends(number())
}

/// `{("a": String) -> "1", ("b": i32 as Number) -> 2}`
fn sample() -> Result<ImmutableTypedMap<&'static str>, MapError> {
    ImmutableTypedMap::of2(
        &TypedKey::<String, &str>::new("a"),
        "1".to_string(),
        &TypedKey::<i32, &str>::with_type(integer(), "b"),
        2,
    )
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn test_sample_map_lookups() -> Result<(), MapError> {
    init_logging();
    let map = sample()?;

    assert_eq!(
        map.get(&TypedKey::<String, &str>::new("a"))?,
        Some(&"1".to_string())
    );

    let as_number = TypedKey::<dyn Number, &str>::with_type(number(), "b");
    assert_eq!(map.get(&as_number)?.map(|n| n.as_i64()), Some(2));

    match map.get(&TypedKey::<String, &str>::new("b")) {
        Err(MapError::TypeMismatch { requested, declared }) => {
            assert_eq!(requested, "String");
            assert_eq!(declared, "i32");
        }
        other => panic!("Should have gotten type mismatch error, got {:?}", other),
    }

    match map.get(&TypedKey::<String, &str>::new("z")) {
        Err(MapError::KeyNotFound(id)) => assert_eq!(id, "\"z\""),
        other => panic!("Should have gotten key not found error, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_too_specific_request_fails() -> Result<(), MapError> {
    let map = ImmutableTypedMap::builder()
        .put(&TypedKey::<i32, &str>::with_type(number(), "n"), 5)
        .build()?;

    let as_number = TypedKey::<dyn Number, &str>::with_type(number(), "n");
    assert_eq!(map.get(&as_number)?.map(|n| n.as_i64()), Some(5));
    assert!(matches!(
        map.get(&TypedKey::<i32, &str>::new("n")),
        Err(MapError::TypeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_builder_refuses_unrelated_value_type() {
    init_logging();
    let key = TypedKey::<String, &str>::with_type(number(), "n");
    assert!(matches!(
        ImmutableTypedMap::of1(&key, "five".to_string()),
        Err(MapError::TypeMismatch { .. })
    ));
}

#[test]
fn test_equal_maps_read_the_same_through_supertypes() -> Result<(), MapError> {
    let plain = ImmutableTypedMap::of_raw1("b", 2i32)?;
    let typed = ImmutableTypedMap::of1(&TypedKey::<i32, &str>::with_type(integer(), "b"), 2)?;
    assert_eq!(plain, typed);
    assert_eq!(hash_of(&plain), hash_of(&typed));

    let as_number = TypedKey::<dyn Number, &str>::with_type(number(), "b");
    assert!(plain.contains(&as_number));
    assert!(typed.contains(&as_number));
    assert_eq!(plain.get(&as_number)?.map(|n| n.as_i64()), Some(2));
    Ok(())
}

#[test]
fn test_missing_ids() -> Result<(), MapError> {
    let map = sample()?;
    let missing = TypedKey::<String, &str>::new("missing");

    assert!(!map.contains(&missing));
    assert!(!map.contains_id(&"missing"));
    assert!(matches!(map.get(&missing), Err(MapError::KeyNotFound(_))));
    assert!(matches!(map.get_raw(&"missing"), Err(MapError::KeyNotFound(_))));
    assert!(matches!(map.check_type(&missing), Err(MapError::KeyNotFound(_))));
    Ok(())
}

#[test]
fn test_every_pair_retrievable() -> Result<(), MapError> {
    let keys: Vec<TypedKey<u64, String>> = (0..20)
        .map(|i| TypedKey::new(format!("key{}", i)))
        .collect();

    let builder = keys
        .iter()
        .enumerate()
        .fold(ImmutableTypedMap::builder(), |builder, (i, key)| {
            builder.put(key, i as u64 * 10)
        });
    let map = builder.build()?;

    assert_eq!(map.len(), keys.len());
    for (i, key) in keys.iter().enumerate() {
        assert!(map.contains(key));
        assert_eq!(map.get(key)?, Some(&(i as u64 * 10)));
    }
    Ok(())
}

#[test]
fn test_fixed_arity_rejects_duplicates() {
    init_logging();
    let key = TypedKey::<i32, &str>::new("x");
    assert!(matches!(
        ImmutableTypedMap::of2(&key, 1, &key, 2),
        Err(MapError::InvalidArgument(_))
    ));
    assert!(matches!(
        ImmutableTypedMap::of_raw3("a", 1u8, "b", 2u8, "a", 3u8),
        Err(MapError::InvalidArgument(_))
    ));
}

#[test]
fn test_canonical_empty_map() -> Result<(), MapError> {
    let first = ImmutableTypedMap::<&str>::of();
    let second = ImmutableTypedMap::<&str>::of();
    let built = ImmutableTypedMap::<&str>::builder().build()?;

    assert!(first.ptr_eq(&second));
    assert!(first.ptr_eq(&built));
    assert_eq!(first, SuppliedTypedMap::<&str>::new());
    assert_eq!(first.keys().len(), 0);
    Ok(())
}

#[test]
fn test_raw_construction_uses_value_types() -> Result<(), MapError> {
    let map = ImmutableTypedMap::of_raw3(
        1u32,
        "text".to_string(),
        2u32,
        vec![1i64, 2],
        3u32,
        true,
    )?;

    let declared: Vec<String> = map
        .keys()
        .iter()
        .map(|key| key.descriptor().to_string())
        .collect();
    assert_eq!(declared, vec!["String", "Vec<i64>", "bool"]);
    assert_eq!(map.get(&TypedKey::<Vec<i64>, u32>::new(2))?, Some(&vec![1, 2]));
    Ok(())
}

#[test]
fn test_any_key_reads_everything() -> Result<(), MapError> {
    let map = sample()?;
    for key in map.keys() {
        let erased = map.get(&TypedKey::<dyn Value, &str>::with_type(TypeDescriptor::any(), *key.id()))?;
        assert!(erased.is_some());
        assert!(map.get(key)?.is_some());
    }
    Ok(())
}

#[test]
fn test_absent_value_is_not_missing() -> Result<(), MapError> {
    let map = ImmutableTypedMap::builder()
        .put_supplier(
            "empty",
            ImmutableSupplier::<String>::new(TypeDescriptor::of::<String>(), None)?,
        )
        .build()?;

    let key = TypedKey::<String, &str>::new("empty");
    assert!(map.contains(&key));
    assert_eq!(map.get(&key)?, None);
    assert_eq!(map.to_string(), "{\"empty\": String=None}");
    Ok(())
}

#[test]
fn test_views_follow_insertion_order() -> Result<(), MapError> {
    let map = ImmutableTypedMap::of_raw3("c", 3i32, "a", 1i32, "b", 2i32)?;

    let ids: Vec<&str> = map.ids().copied().collect();
    assert_eq!(ids, vec!["c", "a", "b"]);

    let values: Vec<i32> = map
        .values()
        .filter_map(|value| value.and_then(|v| v.downcast_ref::<i32>()).copied())
        .collect();
    assert_eq!(values, vec![3, 1, 2]);

    let entries: Vec<String> = map.entries().map(|entry| entry.to_string()).collect();
    assert_eq!(entries, vec!["\"c\": i32=3", "\"a\": i32=1", "\"b\": i32=2"]);

    assert!(map.contains_value(&2i32));
    assert!(!map.contains_value(&2i64));
    assert_eq!(map.value_suppliers().count(), 3);
    Ok(())
}

#[test]
fn test_equality_and_hash_across_flavors() -> Result<(), MapError> {
    let immutable = ImmutableTypedMap::of_raw2("x", 1i32, "y", "two".to_string())?;

    let mut supplied = SuppliedTypedMap::new();
    supplied.put(&TypedKey::<String, &str>::new("y"), "two".to_string())?;
    supplied.put(&TypedKey::<i32, &str>::new("x"), 1)?;

    assert_eq!(immutable, supplied);
    assert_eq!(supplied, immutable);
    assert_eq!(hash_of(&immutable), hash_of(&supplied));

    supplied.put(&TypedKey::<i32, &str>::new("x"), 2)?;
    assert!(immutable != supplied);

    let retyped = ImmutableTypedMap::of_raw2("x", 1i64, "y", "two".to_string())?;
    assert!(immutable != retyped);
    Ok(())
}

#[test]
fn test_explicit_descriptor_lookup() -> Result<(), MapError> {
    let map = sample()?;
    assert_eq!(
        map.get_with::<String>(&TypeDescriptor::of::<String>(), &"a")?,
        Some(&"1".to_string())
    );
    assert!(matches!(
        map.get_with::<String>(&TypeDescriptor::of::<String>(), &"b"),
        Err(MapError::TypeMismatch { .. })
    ));

    let supplier: &ValueSupplier = map.get_supplier(&TypedKey::<i32, &str>::new("b"))?;
    assert_eq!(supplier.descriptor(), &integer());
    Ok(())
}

#[test]
fn test_concurrent_reads() -> Result<(), MapError> {
    let key = TypedKey::<Vec<u32>, String>::new("shared".to_string());
    let map = ImmutableTypedMap::of1(&key, (0..100).collect::<Vec<u32>>())?;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let map = map.clone();
            let key = key.clone();
            thread::spawn(move || -> Result<u32, MapError> {
                Ok(map.get(&key)?.map(|v| v.iter().sum()).unwrap_or(0))
            })
        })
        .collect();

    for handle in handles {
        let sum = handle.join().expect("reader thread panicked")?;
        assert_eq!(sum, 4950);
    }
    Ok(())
}
