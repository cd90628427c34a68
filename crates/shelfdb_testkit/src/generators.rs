//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random keys, values and operation
//! sequences, plus a reference model to check the engine against.

use proptest::prelude::*;
use serde_json::{json, Value as Json};
use shelfdb_codec::{encode_key, Key};
use std::collections::BTreeMap;

/// Strategy for finite numbers, including negatives and zero.
pub fn number_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        any::<i32>().prop_map(f64::from),
        (-1.0e12f64..1.0e12f64),
        Just(0.0),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
    ]
}

/// Strategy for keys of a single, non-array type.
pub fn scalar_key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        number_strategy().prop_map(Key::Number),
        (-8.64e15f64..8.64e15f64).prop_map(Key::Date),
        ".{0,12}".prop_map(Key::String),
        prop::collection::vec(any::<u8>(), 0..12).prop_map(Key::Binary),
    ]
}

/// Strategy for any valid key, including nested arrays.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    scalar_key_strategy().prop_recursive(3, 16, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(Key::Array)
    })
}

/// Strategy for valid store names.
pub fn store_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for small JSON documents.
pub fn value_strategy() -> impl Strategy<Value = Json> {
    prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        "[a-z ]{0,16}".prop_map(|s| json!(s)),
        (any::<bool>(), "[a-z]{0,8}", any::<i32>())
            .prop_map(|(flag, name, n)| json!({ "flag": flag, "name": name, "n": n })),
    ]
}

/// A mutation applied to a set of stores.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Insert or replace a record.
    Put {
        /// Store name.
        store: String,
        /// Record key.
        key: Key,
        /// Record value.
        value: Json,
    },
    /// Remove a record.
    Delete {
        /// Store name.
        store: String,
        /// Record key.
        key: Key,
    },
    /// Remove every record of a store.
    Clear {
        /// Store name.
        store: String,
    },
}

/// Strategy for operations over stores `a` and `b` and a small key space,
/// so that puts and deletes collide often.
pub fn store_operation_strategy() -> impl Strategy<Value = StoreOperation> {
    let store = prop::sample::select(vec!["a", "b"]).prop_map(String::from);
    let key = prop_oneof![
        (0i32..16).prop_map(Key::from),
        "[a-d]".prop_map(Key::String),
    ];
    prop_oneof![
        6 => (store.clone(), key.clone(), value_strategy())
            .prop_map(|(store, key, value)| StoreOperation::Put { store, key, value }),
        3 => (store.clone(), key).prop_map(|(store, key)| StoreOperation::Delete { store, key }),
        1 => store.prop_map(|store| StoreOperation::Clear { store }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(store_operation_strategy(), min_ops..max_ops)
}

/// What a sequence of operations should leave behind, keyed by store and
/// encoded key.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Model {
    stores: BTreeMap<String, BTreeMap<Vec<u8>, Json>>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one operation.
    pub fn apply(&mut self, op: &StoreOperation) {
        match op {
            StoreOperation::Put { store, key, value } => {
                self.stores
                    .entry(store.clone())
                    .or_default()
                    .insert(encoded(key), value.clone());
            }
            StoreOperation::Delete { store, key } => {
                if let Some(records) = self.stores.get_mut(store) {
                    records.remove(&encoded(key));
                }
            }
            StoreOperation::Clear { store } => {
                self.stores.remove(store);
            }
        }
    }

    /// The records of `store` in key order.
    pub fn records(&self, store: &str) -> Vec<(Vec<u8>, Json)> {
        self.stores
            .get(store)
            .map(|records| records.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// The value under `key`, if any.
    pub fn get(&self, store: &str, key: &Key) -> Option<&Json> {
        self.stores.get(store)?.get(&encoded(key))
    }

    /// Total number of live records.
    pub fn len(&self) -> usize {
        self.stores.values().map(BTreeMap::len).sum()
    }

    /// Whether no records are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn encoded(key: &Key) -> Vec<u8> {
    encode_key(key).expect("generated keys are valid")
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
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
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
