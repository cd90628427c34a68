//! Key ranges and scan direction.

use crate::error::{CoreError, CoreResult};
use shelfdb_codec::{encode_key, Key};

/// A contiguous interval of keys, each end optionally open.
///
/// A missing bound is unbounded on that side.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyRange {
    lower: Option<Key>,
    upper: Option<Key>,
    lower_open: bool,
    upper_open: bool,
}

impl KeyRange {
    /// The range containing every key.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// The range containing exactly `key`.
    #[must_use]
    pub fn only(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self {
            lower: Some(key.clone()),
            upper: Some(key),
            lower_open: false,
            upper_open: false,
        }
    }

    /// Keys above `key` (or at it, unless `open`).
    #[must_use]
    pub fn lower_bound(key: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: Some(key.into()),
            lower_open: open,
            ..Self::default()
        }
    }

    /// Keys below `key` (or at it, unless `open`).
    #[must_use]
    pub fn upper_bound(key: impl Into<Key>, open: bool) -> Self {
        Self {
            upper: Some(key.into()),
            upper_open: open,
            ..Self::default()
        }
    }

    /// Keys between `lower` and `upper`.
    ///
    /// # Errors
    ///
    /// Returns a `DataError` if `lower > upper`, or if they are equal and
    /// either end is open (the range would be empty).
    pub fn bound(
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> CoreResult<Self> {
        let (lower, upper) = (lower.into(), upper.into());
        if lower > upper || (lower == upper && (lower_open || upper_open)) {
            return Err(CoreError::data(format!(
                "lower bound {lower} is not below upper bound {upper}"
            )));
        }
        Ok(Self {
            lower: Some(lower),
            upper: Some(upper),
            lower_open,
            upper_open,
        })
    }

    /// Returns the lower bound.
    #[must_use]
    pub fn lower(&self) -> Option<&Key> {
        self.lower.as_ref()
    }

    /// Returns the upper bound.
    #[must_use]
    pub fn upper(&self) -> Option<&Key> {
        self.upper.as_ref()
    }

    /// Whether the lower bound excludes its key.
    #[must_use]
    pub fn lower_open(&self) -> bool {
        self.lower_open
    }

    /// Whether the upper bound excludes its key.
    #[must_use]
    pub fn upper_open(&self) -> bool {
        self.upper_open
    }

    /// Whether `key` lies inside the range.
    #[must_use]
    pub fn includes(&self, key: &Key) -> bool {
        let above = match &self.lower {
            None => true,
            Some(lower) if self.lower_open => key > lower,
            Some(lower) => key >= lower,
        };
        let below = match &self.upper {
            None => true,
            Some(upper) if self.upper_open => key < upper,
            Some(upper) => key <= upper,
        };
        above && below
    }

    /// Encodes both bounds for a backend scan.
    ///
    /// # Errors
    ///
    /// Returns a `DataError` if a bound is not a valid key.
    pub fn encode(&self) -> CoreResult<EncodedRange> {
        Ok(EncodedRange {
            lower: self.lower.as_ref().map(encode_key).transpose()?,
            upper: self.upper.as_ref().map(encode_key).transpose()?,
            lower_open: self.lower_open,
            upper_open: self.upper_open,
        })
    }
}

impl From<Key> for KeyRange {
    fn from(key: Key) -> Self {
        Self::only(key)
    }
}

/// A [`KeyRange`] with bounds already passed through the key codec.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedRange {
    /// Encoded lower bound.
    pub lower: Option<Vec<u8>>,
    /// Encoded upper bound.
    pub upper: Option<Vec<u8>>,
    /// Lower bound excluded.
    pub lower_open: bool,
    /// Upper bound excluded.
    pub upper_open: bool,
}

impl EncodedRange {
    /// The unbounded range.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether the encoded key is above the lower bound.
    #[must_use]
    pub fn above_lower(&self, key: &[u8]) -> bool {
        match &self.lower {
            None => true,
            Some(lower) if self.lower_open => key > lower.as_slice(),
            Some(lower) => key >= lower.as_slice(),
        }
    }

    /// Whether the encoded key is below the upper bound.
    #[must_use]
    pub fn below_upper(&self, key: &[u8]) -> bool {
        match &self.upper {
            None => true,
            Some(upper) if self.upper_open => key < upper.as_slice(),
            Some(upper) => key <= upper.as_slice(),
        }
    }

    /// Whether the encoded key lies inside the range.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.above_lower(key) && self.below_upper(key)
    }
}

/// Iteration order of a scan or cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending keys.
    #[default]
    Next,
    /// Ascending; identical to `Next` for object stores, whose keys are unique.
    NextUnique,
    /// Descending keys.
    Prev,
    /// Descending; identical to `Prev` for object stores.
    PrevUnique,
}

impl Direction {
    /// Whether keys are visited in descending order.
    #[must_use]
    pub fn is_reverse(self) -> bool {
        matches!(self, Self::Prev | Self::PrevUnique)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_includes_just_that_key() {
        let range = KeyRange::only(2);
        assert!(range.includes(&Key::from(2)));
        assert!(!range.includes(&Key::from(1)));
        assert!(!range.includes(&Key::from("2")));
    }

    #[test]
    fn open_lower_bound_excludes_key() {
        let range = KeyRange::lower_bound(2, true);
        assert!(!range.includes(&Key::from(2)));
        assert!(range.includes(&Key::from(3)));
        assert!(range.includes(&Key::from("anything")));
    }

    #[test]
    fn upper_bound() {
        let range = KeyRange::upper_bound("m", false);
        assert!(range.includes(&Key::from(100)));
        assert!(range.includes(&Key::from("m")));
        assert!(!range.includes(&Key::from("n")));
    }

    #[test]
    fn bound_rejects_inverted_or_empty() {
        assert!(KeyRange::bound(3, 1, false, false).is_err());
        assert!(KeyRange::bound(1, 1, true, false).is_err());
        assert!(KeyRange::bound(1, 1, false, false).is_ok());
    }

    #[test]
    fn encoded_range_agrees_with_key_range() {
        let range = KeyRange::bound(1, "b", true, true).unwrap();
        let encoded = range.encode().unwrap();
        for key in [
            Key::from(0),
            Key::from(1),
            Key::from(2),
            Key::from("a"),
            Key::from("b"),
            Key::from("c"),
        ] {
            let bytes = encode_key(&key).unwrap();
            assert_eq!(encoded.contains(&bytes), range.includes(&key), "{key}");
        }
    }

    #[test]
    fn nan_bound_fails_to_encode() {
        let range = KeyRange::only(Key::Number(f64::NAN));
        assert!(range.encode().is_err());
    }

    #[test]
    fn direction_reverse() {
        assert!(!Direction::Next.is_reverse());
        assert!(!Direction::NextUnique.is_reverse());
        assert!(Direction::Prev.is_reverse());
        assert!(Direction::PrevUnique.is_reverse());
    }
}
