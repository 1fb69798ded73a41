//! Property-based tests against the public API (spec §8 "Testable
//! Properties"), cross-checked against `std::collections::HashMap` the way
//! `alyssaverkade-stampede_map` in the reference pack tests its own map.

use std::collections::HashMap as StdHashMap;

use extendible_swiss_map::{Map, MapBuilder};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Insert(u16, u32),
    Remove(u16),
    Get(u16),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<u16>(), any::<u32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        any::<u16>().prop_map(Op::Remove),
        any::<u16>().prop_map(Op::Get),
    ]
}

fn run_against_model(ops: Vec<Op>, map: &mut Map<u16, u32>) {
    let mut model: StdHashMap<u16, u32> = StdHashMap::new();
    for op in ops {
        match op {
            Op::Insert(k, v) => {
                let got = map.insert(k, v);
                let expected = model.insert(k, v);
                assert_eq!(got, expected);
            }
            Op::Remove(k) => {
                let got = map.remove(&k);
                let expected = model.remove(&k);
                assert_eq!(got, expected);
            }
            Op::Get(k) => {
                assert_eq!(map.get(&k), model.get(&k));
            }
        }
    }
    assert_eq!(map.len(), model.len());
    for (k, v) in &model {
        assert_eq!(map.get(k), Some(v));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Universal properties: the map always agrees with a reference
    /// `HashMap` across an arbitrary sequence of insert/remove/get, for any
    /// default-configured map.
    #[test]
    fn agrees_with_std_hashmap(ops in prop::collection::vec(op_strategy(), 0..500)) {
        let mut map: Map<u16, u32> = Map::default();
        run_against_model(ops, &mut map);
    }

    /// Small `max_bucket_capacity` forces splits on nearly every insert,
    /// exercising directory growth and the degenerate split fallbacks.
    #[test]
    fn agrees_with_std_hashmap_tiny_buckets(ops in prop::collection::vec(op_strategy(), 0..500)) {
        let mut map: Map<u16, u32> = MapBuilder::new().with_max_bucket_capacity(7).build();
        run_against_model(ops, &mut map);
    }

    /// A degenerate constant hasher collapses every key onto the same
    /// bucket slot order, exercising worst-case probe-chain handling.
    #[test]
    fn agrees_with_std_hashmap_degenerate_hasher(ops in prop::collection::vec(op_strategy(), 0..300)) {
        let mut map: Map<u16, u32, _, extendible_swiss_map::Global> =
            MapBuilder::new()
                .with_hash(|_: &u16, _seed: u64| 7u64)
                .with_max_bucket_capacity(63)
                .build();
        run_against_model(ops, &mut map);
    }
}
