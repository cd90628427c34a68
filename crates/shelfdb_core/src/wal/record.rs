//! Log entry types and their line encoding.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// One line of the log.
///
/// Keys are encoded with the key codec and values with the database's value
/// format; both are written as lower-case hex so every line stays plain
/// ASCII JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum LogEntry {
    /// Insert or replace a record.
    Put {
        /// Store name.
        store: String,
        /// Encoded key.
        #[serde(with = "hex_bytes")]
        key: Vec<u8>,
        /// Encoded value.
        #[serde(with = "hex_bytes")]
        value: Vec<u8>,
    },
    /// Remove a record.
    Del {
        /// Store name.
        store: String,
        /// Encoded key.
        #[serde(with = "hex_bytes")]
        key: Vec<u8>,
    },
    /// Several puts and deletes that apply together or not at all.
    Batch {
        /// The grouped entries, in order.
        ops: Vec<LogEntry>,
    },
}

impl LogEntry {
    /// Creates a put entry.
    pub fn put(store: impl Into<String>, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self::Put {
            store: store.into(),
            key,
            value,
        }
    }

    /// Creates a delete entry.
    pub fn del(store: impl Into<String>, key: Vec<u8>) -> Self {
        Self::Del {
            store: store.into(),
            key,
        }
    }

    /// Encodes the entry as one newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if JSON encoding fails.
    pub fn encode_line(&self) -> CoreResult<Vec<u8>> {
        let mut line = serde_json::to_vec(self).map_err(CoreError::serialization)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Parses one line, without its terminating newline.
    ///
    /// # Errors
    ///
    /// Returns an invalid format error if the line is not a log entry.
    pub fn parse_line(line: &[u8]) -> CoreResult<Self> {
        serde_json::from_slice(line).map_err(|e| CoreError::invalid_format(format!("log line: {e}")))
    }

    /// Number of primitive puts and deletes in this entry.
    #[must_use]
    pub fn op_count(&self) -> usize {
        match self {
            Self::Put { .. } | Self::Del { .. } => 1,
            Self::Batch { ops } => ops.iter().map(Self::op_count).sum(),
        }
    }
}

mod hex_bytes {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&shelfdb_codec::to_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        shelfdb_codec::from_hex(&text).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_line_shape() {
        let line = LogEntry::put("kv", vec![0x30, 0x61], b"1".to_vec())
            .encode_line()
            .unwrap();
        assert_eq!(
            line,
            b"{\"op\":\"put\",\"store\":\"kv\",\"key\":\"3061\",\"value\":\"31\"}\n"
        );
    }

    #[test]
    fn del_line_shape() {
        let line = LogEntry::del("kv", vec![0xff]).encode_line().unwrap();
        assert_eq!(line, b"{\"op\":\"del\",\"store\":\"kv\",\"key\":\"ff\"}\n");
    }

    #[test]
    fn batch_parses_back() {
        let entry = LogEntry::Batch {
            ops: vec![
                LogEntry::put("a", vec![1], vec![2]),
                LogEntry::del("b", vec![3]),
            ],
        };
        let line = entry.encode_line().unwrap();
        let parsed = LogEntry::parse_line(&line[..line.len() - 1]).unwrap();
        assert_eq!(parsed, entry);
        assert_eq!(parsed.op_count(), 2);
    }

    #[test]
    fn rejects_bad_lines() {
        for bad in [
            &b"not json"[..],
            br#"{"op":"zap","store":"kv"}"#,
            br#"{"op":"put","store":"kv","key":"zz","value":"00"}"#,
            br#"{"op":"del","store":"kv"}"#,
        ] {
            assert!(LogEntry::parse_line(bad).is_err());
        }
    }
}
