//! Value serialization boundary.
//!
//! Stored values are opaque bytes to the backend. On the way in they pass
//! through a JSON view (so key paths can be read and generated keys written
//! back) and are then encoded with the database's [`ValueFormat`].

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Byte encoding for stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    /// UTF-8 JSON text.
    #[default]
    Json,
    /// CBOR.
    Cbor,
}

impl ValueFormat {
    /// Encodes a JSON view of a value.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the encoder fails.
    pub fn encode(self, value: &Json) -> CoreResult<Vec<u8>> {
        match self {
            Self::Json => serde_json::to_vec(value).map_err(CoreError::serialization),
            Self::Cbor => {
                let mut buf = Vec::new();
                ciborium::into_writer(value, &mut buf).map_err(CoreError::serialization)?;
                Ok(buf)
            }
        }
    }

    /// Decodes stored bytes into `T`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the bytes do not describe a `T`.
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> CoreResult<T> {
        match self {
            Self::Json => serde_json::from_slice(bytes).map_err(CoreError::serialization),
            Self::Cbor => ciborium::from_reader(bytes).map_err(CoreError::serialization),
        }
    }
}

/// Serializes any value into its JSON view.
///
/// # Errors
///
/// Returns a serialization error for values JSON cannot express (maps with
/// non-string keys, non-finite floats).
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> CoreResult<Json> {
    serde_json::to_value(value).map_err(CoreError::serialization)
}
