//! The key type.

use crate::error::{CodecError, CodecResult};
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::fmt;

/// A primary key in an object store.
///
/// Keys of different kinds order as `Number < Date < String < Binary < Array`.
/// Within a kind, numbers and dates compare by value, strings by code point,
/// binary keys bytewise and arrays element by element with a shorter prefix
/// sorting first.
///
/// NaN is not a valid number or date; [`crate::encode_key`] rejects it.
#[derive(Debug, Clone)]
pub enum Key {
    /// A finite or infinite number.
    Number(f64),
    /// Milliseconds since the Unix epoch.
    Date(f64),
    /// A text key.
    String(String),
    /// An opaque byte key.
    Binary(Vec<u8>),
    /// A composite key.
    Array(Vec<Key>),
}

impl Key {
    /// Creates a binary key.
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Binary(bytes.into())
    }

    /// Creates a date key from epoch milliseconds.
    #[must_use]
    pub fn date(millis: f64) -> Self {
        Self::Date(millis)
    }

    /// Returns the number if this is a number key.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the text if this is a string key.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Checks that the key (and every nested element) can be encoded.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKey`] for NaN numbers or dates.
    pub fn validate(&self) -> CodecResult<()> {
        match self {
            Self::Number(n) if n.is_nan() => Err(CodecError::invalid_key("number is NaN")),
            Self::Date(d) if d.is_nan() => Err(CodecError::invalid_key("date is NaN")),
            Self::Array(items) => items.iter().try_for_each(Self::validate),
            _ => Ok(()),
        }
    }

    /// Converts a JSON value into a key.
    ///
    /// Numbers become [`Key::Number`], strings [`Key::String`] and arrays
    /// [`Key::Array`] (recursively). Everything else is not a key.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKey`] for null, booleans, objects, or
    /// arrays containing them.
    pub fn from_json(value: &Json) -> CodecResult<Self> {
        match value {
            Json::Number(n) => n
                .as_f64()
                .map(Self::Number)
                .ok_or_else(|| CodecError::invalid_key(format!("number {n} is not representable"))),
            Json::String(s) => Ok(Self::String(s.clone())),
            Json::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<CodecResult<Vec<_>>>()
                .map(Self::Array),
            Json::Null => Err(CodecError::invalid_key("null is not a key")),
            Json::Bool(_) => Err(CodecError::invalid_key("booleans are not keys")),
            Json::Object(_) => Err(CodecError::invalid_key("objects are not keys")),
        }
    }

    /// Converts the key into JSON, e.g. to write a generated key back into a
    /// value.
    ///
    /// Whole numbers are emitted as JSON integers. Dates become their epoch
    /// milliseconds and binary keys a hex string, so those two do not survive
    /// a trip back through [`Key::from_json`].
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Number(n) | Self::Date(n) => number_to_json(*n),
            Self::String(s) => Json::String(s.clone()),
            Self::Binary(bytes) => Json::String(hex::encode(bytes)),
            Self::Array(items) => Json::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Date(_) => 1,
            Self::String(_) => 2,
            Self::Binary(_) => 3,
            Self::Array(_) => 4,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn number_to_json(n: f64) -> Json {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Json::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Json::Null, Json::Number)
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    // -0.0 and 0.0 are the same key.
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) | (Self::Date(a), Self::Date(b)) => cmp_f64(*a, *b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Binary(a), Self::Binary(b)) => a.cmp(b),
            (Self::Array(a), Self::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Date(d) => write!(f, "Date({d})"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Binary(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

macro_rules! number_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Key {
                fn from(n: $t) -> Self {
                    Self::Number(f64::from(n))
                }
            }
        )*
    };
}

number_from!(i8, i16, i32, u8, u16, u32, f32, f64);

impl From<i64> for Key {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<u64> for Key {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: u64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Self::Array(items)
    }
}
