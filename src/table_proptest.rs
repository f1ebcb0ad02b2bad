#![cfg(test)]

// Property tests for HybridTable kept inside the crate so every step can run
// the raw engine's structural invariant check.

use crate::key::Key;
use crate::registry::{HashKey, HashRegistry};
use crate::table::HybridTable;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

// Two-field key whose hash only looks at the first field, so keys sharing
// `bucket` always collide.
#[derive(Clone, Debug, PartialEq)]
struct Collider {
    bucket: u8,
    tag: u8,
}

impl HashKey for Collider {
    fn hash_key(&self) -> u64 {
        self.bucket as u64 + 1
    }
}

// Hashable stand-in for `Key` on the model side.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum ModelKey {
    Int(i64),
    // Quarter steps, stored as the numerator to keep Eq/Hash exact.
    Quarter(i32),
    Str(String),
    Ext(u8, u8),
}

impl ModelKey {
    fn to_key(&self) -> Key {
        match self {
            ModelKey::Int(i) => Key::Integer(*i),
            ModelKey::Quarter(q) => Key::Number(*q as f64 / 4.0),
            ModelKey::Str(s) => Key::String(s.clone()),
            ModelKey::Ext(bucket, tag) => Key::extensible(Collider {
                bucket: *bucket,
                tag: *tag,
            }),
        }
    }
}

fn arb_model_key() -> impl Strategy<Value = ModelKey> {
    prop_oneof![
        4 => (-8i64..64).prop_map(ModelKey::Int),
        1 => (1i64 << 40..(1i64 << 40) + 4).prop_map(ModelKey::Int),
        // Odd numerators only: never an integral value, never zero.
        1 => (-20i32..20).prop_map(|q| ModelKey::Quarter(q * 2 + 1)),
        2 => "[a-d]{0,3}".prop_map(ModelKey::Str),
        2 => (0u8..3, 0u8..6).prop_map(|(b, t)| ModelKey::Ext(b, t)),
    ]
}

#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    Erase(usize),
    Query(usize),
    AddDefault(usize, i32),
    Iterate,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<ModelKey>, Vec<Op>)> {
    proptest::collection::vec(arb_model_key(), 1..=24).prop_flat_map(|pool| {
        let idx = 0..pool.len();
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Insert(i, v)),
            2 => idx.clone().prop_map(Op::Erase),
            2 => idx.clone().prop_map(Op::Query),
            1 => (idx.clone(), -100i32..100).prop_map(|(i, d)| Op::AddDefault(i, d)),
            1 => Just(Op::Iterate),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn registry() -> Arc<HashRegistry> {
    let mut r = HashRegistry::new();
    r.register::<Collider>();
    Arc::new(r)
}

// Property: state-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - insert-then-query returns the inserted value; equal keys overwrite.
// - erase-then-query is not-found; erase of an absent key changes nothing.
// - get_or_insert_default starts from 0 and accumulates in place.
// - iteration yields the model's key set exactly once per key.
// - after every step: array-range integers never sit in the hash segment,
//   chains are rooted at their main positions, and `len` matches the model.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let mut sut: HybridTable<i32> = HybridTable::with_registry(registry());
        let mut model: HashMap<ModelKey, i32> = HashMap::new();

        for op in ops {
            match op {
                Op::Insert(i, v) => {
                    sut.insert(pool[i].to_key(), v).unwrap();
                    model.insert(pool[i].clone(), v);
                    prop_assert_eq!(sut.query(&pool[i].to_key()).unwrap(), Some(&v));
                }
                Op::Erase(i) => {
                    let removed = sut.erase(&pool[i].to_key()).unwrap();
                    prop_assert_eq!(removed, model.remove(&pool[i]));
                    prop_assert_eq!(sut.query(&pool[i].to_key()).unwrap(), None);
                }
                Op::Query(i) => {
                    let got = sut.query(&pool[i].to_key()).unwrap().copied();
                    prop_assert_eq!(got, model.get(&pool[i]).copied());
                    prop_assert_eq!(sut.contains_key(&pool[i].to_key()).unwrap(), got.is_some());
                }
                Op::AddDefault(i, d) => {
                    let v = sut.get_or_insert_default(pool[i].to_key()).unwrap();
                    *v = v.wrapping_add(d);
                    let m = model.entry(pool[i].clone()).or_insert(0);
                    *m = m.wrapping_add(d);
                }
                Op::Iterate => {
                    let seen: Vec<Key> = sut.iter().map(|(k, _)| k.into_owned()).collect();
                    prop_assert_eq!(seen.len(), model.len());
                    let expected: BTreeSet<ModelKey> = model.keys().cloned().collect();
                    let found: BTreeSet<ModelKey> = expected
                        .iter()
                        .filter(|mk| seen.contains(&mk.to_key()))
                        .cloned()
                        .collect();
                    prop_assert_eq!(found, expected);
                }
            }

            prop_assert_eq!(sut.len(), model.len());
            if let Err(violation) = sut.raw().check_invariants(sut.registry()) {
                prop_assert!(false, "invariant violated: {}", violation);
            }
        }

        for (mk, v) in &model {
            prop_assert_eq!(sut.query(&mk.to_key()).unwrap(), Some(v));
        }
    }
}

// Property: every resize preserves the live entry count, whatever mix of
// keys forced it. Tracks each insert of a new key and checks len afterwards.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_resize_keeps_every_entry(keys in proptest::collection::vec(arb_model_key(), 1..200)) {
        let mut sut: HybridTable<usize> = HybridTable::with_registry(registry());
        let mut model: HashMap<ModelKey, usize> = HashMap::new();
        for (n, mk) in keys.iter().enumerate() {
            let before = sut.stats();
            sut.insert(mk.to_key(), n).unwrap();
            model.insert(mk.clone(), n);
            let after = sut.stats();
            prop_assert_eq!(after.len, model.len());
            prop_assert!(after.len == before.len || after.len == before.len + 1);
            prop_assert_eq!(after.array_len + after.hash_len, after.len);
        }
        for (mk, v) in &model {
            prop_assert_eq!(sut.query(&mk.to_key()).unwrap(), Some(v));
        }
        if let Err(violation) = sut.raw().check_invariants(sut.registry()) {
            prop_assert!(false, "invariant violated: {}", violation);
        }
    }
}

// Property: a sequence of sequential integer inserts ends up entirely in the
// array segment once it is dense enough.
proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_dense_integers_migrate_to_array(n in 8i64..2000) {
        let mut sut: HybridTable<i64> = HybridTable::new();
        for k in 1..=n {
            sut.insert(Key::Integer(k), k).unwrap();
        }
        let stats = sut.stats();
        prop_assert_eq!(stats.len as i64, n);
        // The array segment holds more than half of its slots.
        prop_assert!(stats.array_len * 2 > stats.array_size);
        for k in 1..=n {
            prop_assert_eq!(sut.query(&Key::Integer(k)).unwrap(), Some(&k));
        }
        if let Err(violation) = sut.raw().check_invariants(sut.registry()) {
            prop_assert!(false, "invariant violated: {}", violation);
        }
    }
}
