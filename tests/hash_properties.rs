//! Content Hash Property Tests
//!
//! - Insertion order never changes the hash
//! - Validity bounds are not part of the content
//! - Different content or identity gives a different hash

use std::collections::BTreeSet;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use timelinedb::identity::Normalizer;
use timelinedb::model::{FieldMap, Timestamp, Value};
use timelinedb::TimelineConfig;

fn mtime() -> Timestamp {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn normalizer() -> Normalizer {
    Normalizer::new(&TimelineConfig::default()).unwrap()
}

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<i64>().prop_map(Value::Int),
        any::<bool>().prop_map(Value::Bool),
        "[a-z ]{0,12}".prop_map(Value::Text),
        (0i64..4_000_000_000).prop_map(|s| Value::Timestamp(Utc.timestamp_opt(s, 0).unwrap())),
    ];
    leaf.prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            proptest::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

/// Unique user keys with values, in generation order.
fn arb_fields() -> impl Strategy<Value = Vec<(String, Value)>> {
    proptest::collection::vec(("[a-z][a-z0-9]{0,8}", arb_value()), 0..8).prop_map(|pairs| {
        let mut seen = BTreeSet::new();
        pairs
            .into_iter()
            .filter(|(k, _)| seen.insert(k.clone()))
            .collect()
    })
}

fn build(oid: i64, pairs: impl Iterator<Item = (String, Value)>) -> FieldMap {
    let mut map = FieldMap::new();
    for (key, value) in pairs {
        map.insert(key, value);
    }
    map.insert("_oid".into(), Value::Int(oid));
    map
}

proptest! {
    /// Same content inserted in any order hashes the same.
    #[test]
    fn prop_hash_ignores_insertion_order(oid in any::<i64>(), pairs in arb_fields()) {
        let forward = build(oid, pairs.clone().into_iter());
        let backward = build(oid, pairs.into_iter().rev());

        let n = normalizer();
        let a = n.normalize(forward, mtime()).unwrap();
        let b = n.normalize(backward, mtime()).unwrap();
        prop_assert_eq!(a.hash, b.hash);
    }

    /// `_start` and `_end` do not take part in the hash.
    #[test]
    fn prop_hash_ignores_validity(pairs in arb_fields(), start in 0i64..1_000_000, len in 1i64..1_000_000) {
        let plain = build(1, pairs.clone().into_iter());
        let mut bounded = build(1, pairs.into_iter());
        bounded.insert("_start".into(), Value::Int(start));
        bounded.insert("_end".into(), Value::Int(start + len));

        let n = normalizer();
        let a = n.normalize(plain, mtime()).unwrap();
        let b = n.normalize(bounded, mtime()).unwrap();
        prop_assert_eq!(a.hash, b.hash);
    }

    /// Changing one value or the oid changes the hash.
    #[test]
    fn prop_hash_tracks_content(pairs in arb_fields(), x in any::<i64>(), oid in 0i64..1000) {
        let n = normalizer();
        let base = n.normalize(build(oid, pairs.clone().into_iter().chain([("zz".to_string(), Value::Int(x))])), mtime()).unwrap();
        let changed = n.normalize(build(oid, pairs.clone().into_iter().chain([("zz".to_string(), Value::Int(x.wrapping_add(1)))])), mtime()).unwrap();
        let moved = n.normalize(build(oid + 1, pairs.into_iter().chain([("zz".to_string(), Value::Int(x))])), mtime()).unwrap();

        prop_assert_ne!(&base.hash, &changed.hash);
        prop_assert_ne!(&base.hash, &moved.hash);
    }
}

/// Integral floats and integers are the same content.
#[test]
fn test_integral_float_hashes_as_int() {
    let n = normalizer();
    let int = n
        .normalize(build(1, [("x".to_string(), Value::Int(3))].into_iter()), mtime())
        .unwrap();
    let float = n
        .normalize(build(1, [("x".to_string(), Value::Float(3.0))].into_iter()), mtime())
        .unwrap();
    let text = n
        .normalize(build(1, [("x".to_string(), Value::from("3"))].into_iter()), mtime())
        .unwrap();
    assert_eq!(int.hash, float.hash);
    assert_ne!(int.hash, text.hash);
}
