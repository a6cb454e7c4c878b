//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use proptest::prelude::*;
use std::collections::BTreeMap;
use tristore_codec::Value;
use tristore_core::{Change, Operator};

/// Strategy for generating valid logical keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_.:-]{0,23}").expect("Invalid regex")
}

/// Strategy for generating namespaces, including characters that need
/// escaping.
pub fn namespace_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z%:]{1,8}").expect("Invalid regex")
}

/// Strategy for generating scalar values. Floats are finite.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e12..1.0e12f64).prop_map(Value::Float),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::Text),
    ]
}

/// Strategy for generating nested values with text map keys.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..6).prop_map(|pairs| {
                Value::map(pairs.into_iter().map(|(k, v)| (Value::Text(k), v)).collect())
            }),
        ]
    })
}

/// Strategy for generating time-series points with distinct timestamps on
/// a `freq` grid starting at `origin`, over `slots` grid positions.
///
/// Returns the points in ascending timestamp order.
pub fn grid_points_strategy(
    origin: i64,
    freq: i64,
    slots: usize,
) -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::btree_set(0..slots, 1..=slots).prop_map(move |positions| {
        positions
            .into_iter()
            .map(|p| {
                let offset = i64::try_from(p).expect("slot fits in i64");
                (origin + offset * freq, offset)
            })
            .collect()
    })
}

/// One step of an event-sequence scenario.
#[derive(Debug, Clone)]
pub struct EventStep {
    /// Timestamp of the event.
    pub timestamp: i64,
    /// Changes per item.
    pub changes: BTreeMap<String, Change>,
}

/// Strategy for generating one integer change to one of a few items.
///
/// Every operation except assignment can fail on replay when the item is
/// unset; callers decide what to do with refused steps.
pub fn integer_change_strategy() -> impl Strategy<Value = Change> {
    prop_oneof![
        3 => (-100i64..100).prop_map(Change::from),
        1 => Just(Change::delete()),
        1 => Just(Change::negate()),
        1 => (-100i64..100).prop_map(|n| Change::op(Operator::Add, n)),
        1 => (-100i64..100).prop_map(|n| Change::op(Operator::Subtract, n)),
        1 => (-10i64..10).prop_map(|n| Change::op(Operator::Multiply, n)),
        1 => (1i64..10).prop_map(|n| Change::op(Operator::FloorDivide, n)),
        1 => (1i64..10).prop_map(|n| Change::op(Operator::Modulo, n)),
    ]
}

/// Strategy for generating event steps at distinct timestamps in
/// `0..horizon`, in random order.
pub fn event_steps_strategy(max_steps: usize, horizon: i64) -> impl Strategy<Value = Vec<EventStep>> {
    let item = prop::sample::select(vec!["a", "b", "c"]);
    let changes = prop::collection::btree_map(item.prop_map(str::to_string), integer_change_strategy(), 0..3);
    prop::collection::btree_map(0..horizon, changes, 1..=max_steps)
        .prop_map(|by_time| {
            by_time
                .into_iter()
                .map(|(timestamp, changes)| EventStep { timestamp, changes })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests, such as ones that touch files.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
