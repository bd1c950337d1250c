//! Property-based tests for `SkipVec`.
//!
//! These verify the container's laws for all inputs, using differential
//! testing against `BTreeMap` as an oracle. The sentinel is `i64::MIN` and
//! generated values avoid it, so `has(k)` must agree with
//! `get(k) != INVALID` throughout.

use proptest::prelude::*;
use skipvec::SkipVec;
use std::collections::{BTreeMap, BTreeSet};

/// Sentinel for all property maps; value strategies never produce it.
const INVALID: i64 = i64::MIN;

// ============================================================================
//  Strategies
// ============================================================================

/// Keys drawn from regimes the block layout treats differently: one shared
/// window, a handful of adjacent windows, wide strides, and raw u64s
/// (including the top window).
fn any_key() -> impl Strategy<Value = u64> {
    prop_oneof![
        4 => 0u64..32,
        4 => 0u64..1024,
        2 => (0u64..64).prop_map(|k| k * 100),
        1 => any::<u64>(),
        1 => (0u64..64).prop_map(|off| u64::MAX - off),
    ]
}

/// Values excluding the sentinel.
fn any_value() -> impl Strategy<Value = i64> {
    any::<i64>().prop_filter("sentinel is reserved", |&v| v != INVALID)
}

/// Operations for random sequences.
#[derive(Debug, Clone)]
enum Op {
    Set(u64, i64),
    Erase(u64),
    Get(u64),
    Has(u64),
}

fn operations(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            4 => (any_key(), any_value()).prop_map(|(k, v)| Op::Set(k, v)),
            2 => any_key().prop_map(Op::Erase),
            2 => any_key().prop_map(Op::Get),
            1 => any_key().prop_map(Op::Has),
        ],
        0..=max_ops,
    )
}

// ============================================================================
//  Round-trip laws
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// `set(k, v); get(k) == v`.
    #[test]
    fn set_then_get(key in any_key(), value in any_value()) {
        let mut map: SkipVec<i64> = SkipVec::new(INVALID);
        map.set(key, value);

        prop_assert_eq!(map.get(key), value);
        prop_assert!(map.has(key));
        prop_assert_eq!(map.width(), 1);
    }

    /// `set(k, v); erase(k); get(k) == invalid`.
    #[test]
    fn set_erase_reads_invalid(key in any_key(), value in any_value()) {
        let mut map: SkipVec<i64> = SkipVec::new(INVALID);
        map.set(key, value);

        prop_assert!(map.erase(key));
        prop_assert_eq!(map.get(key), INVALID);
        prop_assert!(!map.has(key));
        prop_assert_eq!(map.width(), 0);
    }

    /// The second erase of the same key reports absence.
    #[test]
    fn erase_is_idempotent(key in any_key(), value in any_value()) {
        let mut map: SkipVec<i64> = SkipVec::new(INVALID);
        map.set(key, value);

        prop_assert!(map.erase(key));
        prop_assert!(!map.erase(key));
    }

    /// The last write wins.
    #[test]
    fn overwrite_last_wins(key in any_key(), v1 in any_value(), v2 in any_value()) {
        let mut map: SkipVec<i64> = SkipVec::new(INVALID);
        map.set(key, v1);
        map.set(key, v2);

        prop_assert_eq!(map.get(key), v2);
        prop_assert_eq!(map.width(), 1);
    }

    /// Reads of a never-written key are invalid regardless of other content.
    #[test]
    fn missing_reads_are_invalid(
        written in any_key(),
        probed in any_key(),
        value in any_value(),
    ) {
        prop_assume!(written != probed);

        let mut map: SkipVec<i64> = SkipVec::new(INVALID);
        map.set(written, value);

        prop_assert_eq!(map.get(probed), INVALID);
        prop_assert!(!map.has(probed));
    }
}

// ============================================================================
//  Window partitioning
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Two keys share a block exactly when they share a 32-wide window.
    #[test]
    fn window_partitioning(k1 in any_key(), k2 in any_key(), v in any_value()) {
        prop_assume!(k1 != k2);

        let mut map: SkipVec<i64> = SkipVec::new(INVALID);
        map.set(k1, v);
        map.set(k2, v);

        let expected: u64 = if k1 >> 5 == k2 >> 5 { 1 } else { 2 };
        prop_assert_eq!(map.width(), expected);
    }
}

// ============================================================================
//  Differential testing against BTreeMap
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Random operation sequences match BTreeMap behavior, and the block
    /// structure stays sound.
    #[test]
    fn differential_random_ops(ops in operations(300)) {
        let mut map: SkipVec<i64> = SkipVec::new(INVALID);
        let mut oracle: BTreeMap<u64, i64> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Set(key, value) => {
                    map.set(key, value);
                    oracle.insert(key, value);
                }

                Op::Erase(key) => {
                    let present: bool = map.erase(key);
                    prop_assert_eq!(
                        present,
                        oracle.remove(&key).is_some(),
                        "erase mismatch for key {}",
                        key
                    );
                }

                Op::Get(key) => {
                    let expected: i64 = oracle.get(&key).copied().unwrap_or(INVALID);
                    prop_assert_eq!(map.get(key), expected, "get mismatch for key {}", key);
                }

                Op::Has(key) => {
                    prop_assert_eq!(
                        map.has(key),
                        oracle.contains_key(&key),
                        "has mismatch for key {}",
                        key
                    );
                }
            }
        }

        // Full sweep: every oracle key readable, width matches the number of
        // distinct populated windows, invariants hold.
        for (&key, &value) in &oracle {
            prop_assert_eq!(map.get(key), value);
        }

        let windows: BTreeSet<u64> = oracle.keys().map(|k| k >> 5).collect();
        prop_assert_eq!(map.width(), windows.len() as u64);

        map.check_invariants();
    }

    /// Mutable indexing agrees with set/get semantics: a fresh slot reads as
    /// the sentinel and assignments stick.
    #[test]
    fn index_mut_matches_set(keys in prop::collection::vec(any_key(), 1..50)) {
        let mut map: SkipVec<i64> = SkipVec::new(INVALID);
        let mut oracle: BTreeMap<u64, i64> = BTreeMap::new();

        for (i, &key) in keys.iter().enumerate() {
            let fresh: bool = !oracle.contains_key(&key);
            {
                let slot: &mut i64 = &mut map[key];
                if fresh {
                    prop_assert_eq!(*slot, INVALID, "fresh slot not sentinel at {}", key);
                }
                *slot = i as i64;
            }
            oracle.insert(key, i as i64);
        }

        for (&key, &value) in &oracle {
            prop_assert_eq!(map.get(key), value);
        }

        let windows: BTreeSet<u64> = oracle.keys().map(|k| k >> 5).collect();
        prop_assert_eq!(map.width(), windows.len() as u64);
        map.check_invariants();
    }
}

// ============================================================================
//  Seed independence
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Observable content is independent of the RNG seed; only the internal
    /// block topology may differ.
    #[test]
    fn content_is_seed_independent(ops in operations(150), seed in any::<u64>()) {
        let mut a: SkipVec<i64> = SkipVec::new(INVALID);
        let mut b: SkipVec<i64> = SkipVec::with_seed(INVALID, seed);

        for op in &ops {
            match *op {
                Op::Set(key, value) => {
                    a.set(key, value);
                    b.set(key, value);
                }

                Op::Erase(key) => {
                    prop_assert_eq!(a.erase(key), b.erase(key));
                }

                Op::Get(key) => {
                    prop_assert_eq!(a.get(key), b.get(key));
                }

                Op::Has(key) => {
                    prop_assert_eq!(a.has(key), b.has(key));
                }
            }
        }

        prop_assert_eq!(a.width(), b.width());
        a.check_invariants();
        b.check_invariants();
    }
}
