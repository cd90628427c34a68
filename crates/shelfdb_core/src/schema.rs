//! Object store definitions and key paths.

use crate::error::{CoreError, CoreResult};
use crate::value::ValueFormat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use shelfdb_codec::Key;
use std::collections::BTreeMap;

/// Where an in-line key lives inside a stored value.
///
/// A path is a dot-separated list of property names. The empty path refers
/// to the value itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPath {
    /// One path; yields a single key.
    Single(String),
    /// Several paths; yields an array key.
    Compound(Vec<String>),
}

impl KeyPath {
    /// Reads the key named by this path out of a value.
    ///
    /// Returns `Ok(None)` when a property along the path is missing.
    ///
    /// # Errors
    ///
    /// Returns a `DataError` when the path resolves to something that is not
    /// a valid key.
    pub fn extract(&self, value: &Json) -> CoreResult<Option<Key>> {
        match self {
            Self::Single(path) => extract_one(value, path),
            Self::Compound(paths) => {
                let mut parts = Vec::with_capacity(paths.len());
                for path in paths {
                    match extract_one(value, path)? {
                        Some(key) => parts.push(key),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Key::Array(parts)))
            }
        }
    }

    /// Writes `key` into `value` at this path, creating intermediate objects.
    ///
    /// # Errors
    ///
    /// Returns a `DataError` for compound or empty paths, or when an
    /// intermediate property exists but is not an object.
    pub fn inject(&self, value: &mut Json, key: &Key) -> CoreResult<()> {
        let Self::Single(path) = self else {
            return Err(CoreError::data("cannot inject a key through a compound key path"));
        };
        if path.is_empty() {
            return Err(CoreError::data("cannot inject a key through the empty key path"));
        }
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments.pop().unwrap_or_default();
        let mut target = value;
        for segment in segments {
            let object = as_object(target, path)?;
            target = object
                .entry(segment.to_string())
                .or_insert_with(|| Json::Object(Map::new()));
        }
        as_object(target, path)?.insert(last.to_string(), key.to_json());
        Ok(())
    }

    /// Whether a key generator can write keys through this path.
    #[must_use]
    pub fn supports_generated_keys(&self) -> bool {
        matches!(self, Self::Single(path) if !path.is_empty())
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        Self::Single(path.to_string())
    }
}

impl From<String> for KeyPath {
    fn from(path: String) -> Self {
        Self::Single(path)
    }
}

impl From<Vec<&str>> for KeyPath {
    fn from(paths: Vec<&str>) -> Self {
        Self::Compound(paths.into_iter().map(str::to_string).collect())
    }
}

fn extract_one(value: &Json, path: &str) -> CoreResult<Option<Key>> {
    let mut current = value;
    if !path.is_empty() {
        for segment in path.split('.') {
            match current.get(segment) {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
    }
    Key::from_json(current)
        .map(Some)
        .map_err(|e| CoreError::data(format!("key path {path:?}: {e}")))
}

fn as_object<'a>(value: &'a mut Json, path: &str) -> CoreResult<&'a mut Map<String, Json>> {
    value
        .as_object_mut()
        .ok_or_else(|| CoreError::data(format!("cannot write key path {path:?} into a non-object")))
}

/// Options for creating an object store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreParams {
    /// In-line key path, if any.
    pub key_path: Option<KeyPath>,
    /// Whether missing keys are generated.
    pub auto_increment: bool,
}

impl StoreParams {
    /// Out-of-line keys, no generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the in-line key path.
    #[must_use]
    pub fn key_path(mut self, path: impl Into<KeyPath>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    /// Enables or disables the key generator.
    #[must_use]
    pub fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }
}

/// The persisted definition of one object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSchema {
    /// Store name.
    pub name: String,
    /// In-line key path.
    #[serde(default)]
    pub key_path: Option<KeyPath>,
    /// Key generator enabled.
    #[serde(default)]
    pub auto_increment: bool,
}

impl StoreSchema {
    /// Builds a store definition, checking the parameter combination.
    ///
    /// # Errors
    ///
    /// Returns a `TypeError` when `auto_increment` is combined with a
    /// compound or empty key path.
    pub fn new(name: impl Into<String>, params: StoreParams) -> CoreResult<Self> {
        if params.auto_increment {
            if let Some(path) = &params.key_path {
                if !path.supports_generated_keys() {
                    return Err(CoreError::type_error(
                        "autoIncrement requires an out-of-line key or a non-empty single key path",
                    ));
                }
            }
        }
        Ok(Self {
            name: name.into(),
            key_path: params.key_path,
            auto_increment: params.auto_increment,
        })
    }
}

/// The set of object stores in a database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    value_format: ValueFormat,
    stores: BTreeMap<String, StoreSchema>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaFile {
    #[serde(default)]
    value_format: ValueFormat,
    stores: Vec<StoreSchema>,
}

impl Schema {
    /// Creates an empty schema whose values use `value_format`.
    #[must_use]
    pub fn new(value_format: ValueFormat) -> Self {
        Self {
            value_format,
            stores: BTreeMap::new(),
        }
    }

    /// The value encoding recorded for this database.
    #[must_use]
    pub fn value_format(&self) -> ValueFormat {
        self.value_format
    }

    /// Looks up a store.
    #[must_use]
    pub fn store(&self, name: &str) -> Option<&StoreSchema> {
        self.stores.get(name)
    }

    /// Whether a store exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    /// Store names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    /// Iterates over store definitions in name order.
    pub fn stores(&self) -> impl Iterator<Item = &StoreSchema> {
        self.stores.values()
    }

    /// Adds a store.
    ///
    /// # Errors
    ///
    /// Returns a `ConstraintError` if the name is taken.
    pub fn add(&mut self, store: StoreSchema) -> CoreResult<()> {
        if self.stores.contains_key(&store.name) {
            return Err(CoreError::constraint(format!(
                "object store {:?} already exists",
                store.name
            )));
        }
        self.stores.insert(store.name.clone(), store);
        Ok(())
    }

    /// Removes a store.
    ///
    /// # Errors
    ///
    /// Returns a `NotFoundError` if no such store exists.
    pub fn remove(&mut self, name: &str) -> CoreResult<StoreSchema> {
        self.stores
            .remove(name)
            .ok_or_else(|| CoreError::store_not_found(name))
    }

    /// Serializes to the `schema.json` sidecar form.
    ///
    /// # Errors
    ///
    /// Returns a serialization error on failure.
    pub fn to_json_bytes(&self) -> CoreResult<Vec<u8>> {
        let file = SchemaFile {
            value_format: self.value_format,
            stores: self.stores.values().cloned().collect(),
        };
        serde_json::to_vec_pretty(&file).map_err(CoreError::serialization)
    }

    /// Parses the `schema.json` sidecar form.
    ///
    /// # Errors
    ///
    /// Returns an invalid format error if the bytes are not a schema.
    pub fn from_json_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let file: SchemaFile = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::invalid_format(format!("schema.json: {e}")))?;
        let mut schema = Self::new(file.value_format);
        for store in file.stores {
            schema.add(store)?;
        }
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_simple_and_nested() {
        let value = json!({"id": 4, "meta": {"slug": "a-b"}});
        assert_eq!(
            KeyPath::from("id").extract(&value).unwrap(),
            Some(Key::from(4))
        );
        assert_eq!(
            KeyPath::from("meta.slug").extract(&value).unwrap(),
            Some(Key::from("a-b"))
        );
        assert_eq!(KeyPath::from("meta.missing").extract(&value).unwrap(), None);
    }

    #[test]
    fn empty_path_is_the_value_itself() {
        assert_eq!(
            KeyPath::from("").extract(&json!("whole")).unwrap(),
            Some(Key::from("whole"))
        );
    }

    #[test]
    fn compound_path_yields_array_key() {
        let value = json!({"last": "Doe", "first": "Jo"});
        let key = KeyPath::from(vec!["last", "first"]).extract(&value).unwrap();
        assert_eq!(
            key,
            Some(Key::Array(vec![Key::from("Doe"), Key::from("Jo")]))
        );
    }

    #[test]
    fn extract_rejects_non_key_values() {
        let value = json!({"id": true});
        assert!(matches!(
            KeyPath::from("id").extract(&value),
            Err(CoreError::Data { .. })
        ));
    }

    #[test]
    fn inject_creates_intermediate_objects() {
        let mut value = json!({"name": "x"});
        KeyPath::from("a.b")
            .inject(&mut value, &Key::from(9))
            .unwrap();
        assert_eq!(value, json!({"name": "x", "a": {"b": 9}}));
    }

    #[test]
    fn inject_into_scalar_fails() {
        let mut value = json!(5);
        assert!(KeyPath::from("id").inject(&mut value, &Key::from(1)).is_err());
    }

    #[test]
    fn auto_increment_needs_single_path() {
        let bad = StoreParams::new()
            .key_path(vec!["a", "b"])
            .auto_increment(true);
        assert!(StoreSchema::new("s", bad).is_err());
        let empty = StoreParams::new().key_path("").auto_increment(true);
        assert!(StoreSchema::new("s", empty).is_err());
        let ok = StoreParams::new().key_path("id").auto_increment(true);
        assert!(StoreSchema::new("s", ok).is_ok());
    }

    #[test]
    fn duplicate_store_is_constraint_error() {
        let mut schema = Schema::default();
        schema
            .add(StoreSchema::new("kv", StoreParams::new()).unwrap())
            .unwrap();
        let err = schema
            .add(StoreSchema::new("kv", StoreParams::new()).unwrap())
            .unwrap_err();
        assert!(matches!(err, CoreError::Constraint { .. }));
    }

    #[test]
    fn sidecar_round_trip() {
        let mut schema = Schema::new(ValueFormat::Cbor);
        schema
            .add(StoreSchema::new("kv", StoreParams::new()).unwrap())
            .unwrap();
        schema
            .add(
                StoreSchema::new(
                    "people",
                    StoreParams::new().key_path(vec!["last", "first"]),
                )
                .unwrap(),
            )
            .unwrap();
        let bytes = schema.to_json_bytes().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"keyPath\""));
        assert!(text.contains("\"autoIncrement\""));
        assert_eq!(Schema::from_json_bytes(&bytes).unwrap(), schema);
    }

    #[test]
    fn sidecar_without_format_defaults_to_json() {
        let bytes = br#"{"stores":[{"name":"kv","keyPath":null,"autoIncrement":false}]}"#;
        let schema = Schema::from_json_bytes(bytes).unwrap();
        assert_eq!(schema.value_format(), ValueFormat::Json);
        assert_eq!(schema.names(), vec!["kv".to_string()]);
    }
}
