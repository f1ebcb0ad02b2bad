// Key model and hash registry suite.
//
// Verified here:
// - Hash determinism: equal keys hash identically, across calls and clones.
// - Disambiguation: colliding extensible keys are told apart by equality.
// - Errors: unregistered extensible types and mismatched payload reads
//   surface as TableError values from the table's operations.
use hybrid_table::{HashKey, HashRegistry, HybridTable, Key, KeyKind, TableError, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// Two-field key; the hash only reads `a`, equality reads both fields.
#[derive(Clone, Debug, PartialEq)]
struct Pair {
    a: i32,
    b: i32,
}

impl HashKey for Pair {
    fn hash_key(&self) -> u64 {
        self.a as u64
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Unregistered(u8);

fn pair_registry() -> Arc<HashRegistry> {
    let mut r = HashRegistry::new();
    r.register::<Pair>();
    Arc::new(r)
}

// Test: hash determinism for built-in kinds.
// Verifies: equal keys built separately produce the same hash every time.
#[test]
fn equal_builtin_keys_hash_identically() {
    let r = HashRegistry::new();
    let pairs = [
        (Key::from(42), Key::Integer(42)),
        (Key::from(-7i8), Key::Integer(-7)),
        (Key::from(0.5f32), Key::Number(0.5)),
        (Key::from(0.0), Key::Number(-0.0)),
        (Key::from("abc"), Key::String("abc".to_string())),
        (Key::OpaqueCursor(0xdead), Key::OpaqueCursor(0xdead)),
    ];
    for (x, y) in pairs {
        assert_eq!(x, y);
        assert_eq!(x.hash(&r).unwrap(), y.hash(&r).unwrap(), "{x:?}");
        assert_eq!(x.hash(&r).unwrap(), x.hash(&r).unwrap());
    }
}

// Test: hash determinism for extensible keys.
// Verifies: the registered function runs once per key instance; clones
// carry the cached hash; equal instances agree.
#[test]
fn extensible_hash_is_cached_per_key() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    let mut r = HashRegistry::new();
    r.register_with::<Pair, _>(|p| {
        CALLS.fetch_add(1, Ordering::Relaxed);
        p.a as u64 * 31 + 1
    });

    let k = Key::extensible(Pair { a: 3, b: 4 });
    let first = k.hash(&r).unwrap();
    assert_eq!(first, 94);
    assert_eq!(k.hash(&r).unwrap(), first);
    assert_eq!(CALLS.load(Ordering::Relaxed), 1);

    let cloned = k.clone();
    assert_eq!(cloned.hash(&r).unwrap(), first);
    assert_eq!(CALLS.load(Ordering::Relaxed), 1);

    let fresh = Key::extensible(Pair { a: 3, b: 4 });
    assert_eq!(fresh, k);
    assert_eq!(fresh.hash(&r).unwrap(), first);
    assert_eq!(CALLS.load(Ordering::Relaxed), 2);
}

// Test: colliding extensible keys scenario.
// Verifies: two keys sharing a hash but differing in the second field are
// independently stored, retrieved and erased.
#[test]
fn colliding_extensible_keys_are_disambiguated() {
    let mut t: HybridTable<&str> = HybridTable::with_registry(pair_registry());
    let k1 = Key::extensible(Pair { a: 5, b: 1 });
    let k2 = Key::extensible(Pair { a: 5, b: 2 });
    assert_eq!(k1.hash(t.registry()).unwrap(), k2.hash(t.registry()).unwrap());
    assert_ne!(k1, k2);

    t.insert(k1.clone(), "one").unwrap();
    t.insert(k2.clone(), "two").unwrap();
    assert_eq!(t.len(), 2);
    assert_eq!(t.query(&k1).unwrap(), Some(&"one"));
    assert_eq!(t.query(&k2).unwrap(), Some(&"two"));
    assert_eq!(t.query(&Key::extensible(Pair { a: 5, b: 3 })).unwrap(), None);

    t.erase(&k1).unwrap();
    assert_eq!(t.query(&k1).unwrap(), None);
    assert_eq!(t.query(&k2).unwrap(), Some(&"two"));
}

// Test: extensible keys never equal built-in keys.
// Verifies: an extensible key hashing like Integer(5) is still a distinct key.
#[test]
fn extensible_and_builtin_keys_do_not_mix() {
    let mut t: HybridTable<i32> = HybridTable::with_registry(pair_registry());
    t.insert(Key::from(-5), 1).unwrap();
    t.insert(Key::extensible(Pair { a: 4, b: 0 }), 2).unwrap();
    assert_eq!(t.query(&Key::from(-5)).unwrap(), Some(&1));
    assert_eq!(t.query(&Key::extensible(Pair { a: 4, b: 0 })).unwrap(), Some(&2));
}

// Test: unregistered extensible type.
// Verifies: every table operation that needs the hash reports the type.
#[test]
fn unregistered_type_is_an_error() {
    let mut t: HybridTable<i32> = HybridTable::with_registry(pair_registry());
    let k = Key::extensible(Unregistered(1));
    let expected = TableError::UnregisteredHashType {
        type_name: std::any::type_name::<Unregistered>(),
    };
    assert_eq!(t.insert(k.clone(), 1), Err(expected.clone()));
    assert_eq!(t.query(&k), Err(expected.clone()));
    assert_eq!(t.erase(&k), Err(expected.clone()));
    assert_eq!(t.get_or_insert_default(k.clone()).map(|v| *v), Err(expected));
    assert!(t.is_empty());

    let msg = t.contains_key(&k).unwrap_err().to_string();
    assert!(msg.contains("Unregistered"), "{msg}");
}

// Test: registry key builder.
// Verifies: building a key through the registry validates the type up front.
#[test]
fn registry_key_validates_registration() {
    let r = pair_registry();
    assert!(r.is_registered::<Pair>());
    assert!(!r.is_registered::<Unregistered>());
    assert_eq!(r.len(), 1);

    let k = r.key(Pair { a: 9, b: 9 }).unwrap();
    assert_eq!(k.kind(), KeyKind::Extensible);
    assert!(matches!(
        r.key(Unregistered(0)),
        Err(TableError::UnregisteredHashType { .. })
    ));
}

// Test: typed payload access on keys.
// Verifies: downcasting an extensible payload to the wrong type is a TypeMismatch.
#[test]
fn extensible_payload_downcast() {
    let Key::Extensible(ext) = Key::extensible(Pair { a: 1, b: 2 }) else {
        panic!("expected an extensible key");
    };
    assert_eq!(ext.downcast_ref::<Pair>().unwrap(), &Pair { a: 1, b: 2 });
    assert!(matches!(
        ext.downcast_ref::<Unregistered>(),
        Err(TableError::TypeMismatch { .. })
    ));
}

// Test: integer payload accessor.
// Verifies: reading the integer of an Integer key works; any other kind panics.
#[test]
fn integer_accessor() {
    assert_eq!(Key::from(12u16).integer(), 12);
    assert_eq!(Key::from("x").as_integer(), None);
    let res = std::panic::catch_unwind(|| Key::from(1.5).integer());
    assert!(res.is_err());
}

// Test: values of a table of Values.
// Verifies: reading a stored Value as the wrong type is a TypeMismatch.
#[test]
fn value_type_mismatch() {
    let mut t: HybridTable<Value> = HybridTable::new();
    t.set(Key::from(1), String::from("s")).unwrap();
    let v = t.query(&Key::from(1)).unwrap().unwrap();
    assert!(v.is::<String>());
    assert!(matches!(
        v.downcast_ref::<u64>(),
        Err(TableError::TypeMismatch { .. })
    ));
}
