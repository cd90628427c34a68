//! Benchmark utilities.

#![warn(missing_docs)]

use rand::Rng;
use serde_json::{json, Value as Json};
use shelfdb_codec::Key;

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` distinct number keys in random order.
pub fn shuffled_number_keys(count: u32) -> Vec<Key> {
    let mut rng = rand::thread_rng();
    let mut keys: Vec<Key> = (0..count).map(Key::from).collect();
    for i in (1..keys.len()).rev() {
        keys.swap(i, rng.gen_range(0..=i));
    }
    keys
}

/// A small JSON document carrying `payload_size` bytes of text.
pub fn document(index: u32, payload_size: usize) -> Json {
    json!({
        "index": index,
        "payload": "x".repeat(payload_size),
    })
}

/// One key of each type, plus a nested array key.
pub fn mixed_keys() -> Vec<(&'static str, Key)> {
    vec![
        ("number", Key::Number(-1234.5)),
        ("date", Key::Date(1_700_000_000_000.0)),
        ("string", Key::from("user/alice@example.com")),
        ("binary", Key::Binary(random_data(32))),
        (
            "array",
            Key::Array(vec![
                Key::from("orders"),
                Key::Number(42.0),
                Key::Array(vec![Key::from("line"), Key::Number(7.0)]),
            ]),
        ),
    ]
}
