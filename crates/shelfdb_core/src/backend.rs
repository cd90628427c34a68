//! The durable ordered key-value backend.
//!
//! [`WalBackend`] keeps every store as a sorted vector of encoded records
//! in memory and mirrors each mutation into the [`WalLog`] before applying
//! it. Keys arrive already encoded by the key codec, so byte order is key
//! order and a binary search is enough for lookups and range scans.

use crate::error::CoreResult;
use crate::range::{Direction, EncodedRange};
use crate::wal::{LogEntry, ReplayReport, WalLog};
use shelfdb_storage::{InMemoryBackend, StorageBackend};
use std::collections::{BTreeMap, BTreeSet};

/// An encoded `(key, value)` pair.
pub type Record = (Vec<u8>, Vec<u8>);

/// One write in a committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert or replace.
    Put {
        /// Store name.
        store: String,
        /// Encoded key.
        key: Vec<u8>,
        /// Encoded value.
        value: Vec<u8>,
    },
    /// Remove one key.
    Delete {
        /// Store name.
        store: String,
        /// Encoded key.
        key: Vec<u8>,
    },
    /// Remove every key inside a range.
    DeleteRange {
        /// Store name.
        store: String,
        /// Encoded range.
        range: EncodedRange,
    },
    /// Remove every key in a store.
    Clear {
        /// Store name.
        store: String,
    },
}

impl WriteOp {
    /// The store this operation writes to.
    #[must_use]
    pub fn store(&self) -> &str {
        match self {
            Self::Put { store, .. }
            | Self::Delete { store, .. }
            | Self::DeleteRange { store, .. }
            | Self::Clear { store } => store,
        }
    }
}

/// Counters describing the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Lines applied during the last replay.
    pub replayed_entries: usize,
    /// Malformed lines skipped during the last replay.
    pub skipped_entries: usize,
    /// Log lines appended since open.
    pub appended_entries: u64,
    /// Live records across all stores.
    pub live_records: usize,
    /// Current log size in bytes.
    pub log_bytes: u64,
    /// Completed compactions since open.
    pub compactions: u64,
}

/// Result of [`WalBackend::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
    /// Records written to the new log.
    pub live_records: usize,
}

/// Ordered stores held in memory, made durable by an append-only log.
#[derive(Debug)]
pub struct WalBackend {
    log: WalLog,
    stores: BTreeMap<String, Vec<Record>>,
    replay: ReplayReport,
    appended: u64,
    compactions: u64,
}

impl WalBackend {
    /// Opens a backend over `storage`, replaying whatever log it holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read or the torn tail
    /// cannot be truncated.
    pub fn open(storage: Box<dyn StorageBackend>, sync_on_write: bool) -> CoreResult<Self> {
        let mut backend = Self {
            log: WalLog::new(storage, sync_on_write),
            stores: BTreeMap::new(),
            replay: ReplayReport::default(),
            appended: 0,
            compactions: 0,
        };

        let mut entries = Vec::new();
        backend.replay = backend.log.replay(|entry| entries.push(entry))?;
        for entry in entries {
            backend.apply(entry);
        }

        tracing::debug!(
            applied = backend.replay.applied,
            skipped = backend.replay.skipped,
            records = backend.live_records(),
            "log replayed"
        );
        Ok(backend)
    }

    /// Opens an empty backend that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            log: WalLog::new(Box::new(InMemoryBackend::new()), false),
            stores: BTreeMap::new(),
            replay: ReplayReport::default(),
            appended: 0,
            compactions: 0,
        }
    }

    /// Inserts or replaces a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the log append fails; memory is left unchanged.
    pub fn put(&mut self, store: &str, key: Vec<u8>, value: Vec<u8>) -> CoreResult<()> {
        self.log_and_apply(LogEntry::put(store, key, value))
    }

    /// Removes a record, appending a `del` line first.
    ///
    /// A missing key is not an error and appends nothing: a `del` line for
    /// an absent key would replay to the same state.
    ///
    /// Returns whether the key existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the log append fails.
    pub fn delete(&mut self, store: &str, key: &[u8]) -> CoreResult<bool> {
        if !self.contains(store, key) {
            return Ok(false);
        }
        self.log_and_apply(LogEntry::del(store, key.to_vec()))?;
        Ok(true)
    }

    /// Removes every record of a store, logging one delete per key.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a log append fails. Deletes logged before the
    /// failure stay applied.
    pub fn clear(&mut self, store: &str) -> CoreResult<usize> {
        self.delete_range(store, &EncodedRange::all())
    }

    /// Removes every record whose key lies in `range`, one delete per key.
    ///
    /// # Errors
    ///
    /// Returns an error if a log append fails.
    pub fn delete_range(&mut self, store: &str, range: &EncodedRange) -> CoreResult<usize> {
        let keys = self.keys_in(store, range);
        for key in &keys {
            self.log_and_apply(LogEntry::del(store, key.clone()))?;
        }
        Ok(keys.len())
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, store: &str, key: &[u8]) -> Option<Vec<u8>> {
        let records = self.stores.get(store)?;
        let index = Self::search(records, key).ok()?;
        Some(records[index].1.clone())
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains(&self, store: &str, key: &[u8]) -> bool {
        self.stores
            .get(store)
            .is_some_and(|records| Self::search(records, key).is_ok())
    }

    /// Returns the records inside `range` in the requested order.
    #[must_use]
    pub fn scan(&self, store: &str, range: &EncodedRange, direction: Direction) -> Vec<Record> {
        let mut records: Vec<Record> = self.slice(store, range).to_vec();
        if direction.is_reverse() {
            records.reverse();
        }
        records
    }

    /// Returns the keys inside `range`, ascending.
    #[must_use]
    pub fn keys_in(&self, store: &str, range: &EncodedRange) -> Vec<Vec<u8>> {
        self.slice(store, range)
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Counts the records inside `range`.
    #[must_use]
    pub fn count(&self, store: &str, range: &EncodedRange) -> usize {
        self.slice(store, range).len()
    }

    /// The largest key strictly below `bound`.
    #[must_use]
    pub fn last_key_before(&self, store: &str, bound: &[u8]) -> Option<Vec<u8>> {
        let records = self.stores.get(store)?;
        let end = records.partition_point(|(key, _)| key.as_slice() < bound);
        end.checked_sub(1).map(|i| records[i].0.clone())
    }

    /// Applies a group of writes as one atomic log entry.
    ///
    /// Range deletes and clears are expanded against the state the earlier
    /// operations in the group leave behind, so the log only ever holds
    /// primitive puts and deletes. Returns the number of primitive
    /// operations written.
    ///
    /// # Errors
    ///
    /// Returns an error if the log append fails; memory is left unchanged.
    pub fn apply_batch(&mut self, ops: Vec<WriteOp>) -> CoreResult<usize> {
        let entries = self.expand(ops);
        let count = entries.len();
        match count {
            0 => {}
            1 => {
                let entry = entries.into_iter().next();
                if let Some(entry) = entry {
                    self.log_and_apply(entry)?;
                }
            }
            _ => self.log_and_apply(LogEntry::Batch { ops: entries })?,
        }
        Ok(count)
    }

    /// Rewrites the log to hold exactly one put per live record.
    ///
    /// The swap is atomic: a crash leaves either the old log or the new one.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewrite fails; the old log stays in place.
    pub fn compact(&mut self) -> CoreResult<CompactionReport> {
        let bytes_before = self.log.size()?;
        let entries: Vec<LogEntry> = self
            .stores
            .iter()
            .flat_map(|(store, records)| {
                records
                    .iter()
                    .map(|(key, value)| LogEntry::put(store.clone(), key.clone(), value.clone()))
            })
            .collect();
        let bytes_after = self.log.rewrite(&entries)?;
        self.compactions += 1;

        tracing::info!(
            bytes_before,
            bytes_after,
            records = entries.len(),
            "log compacted"
        );
        Ok(CompactionReport {
            bytes_before,
            bytes_after,
            live_records: entries.len(),
        })
    }

    /// Names of stores that currently hold records.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        self.stores
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of records in a store.
    #[must_use]
    pub fn len(&self, store: &str) -> usize {
        self.stores.get(store).map_or(0, Vec::len)
    }

    /// Whether a store holds no records.
    #[must_use]
    pub fn is_empty(&self, store: &str) -> bool {
        self.len(store) == 0
    }

    /// Current counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size cannot be read.
    pub fn stats(&self) -> CoreResult<BackendStats> {
        Ok(BackendStats {
            replayed_entries: self.replay.applied,
            skipped_entries: self.replay.skipped,
            appended_entries: self.appended,
            live_records: self.live_records(),
            log_bytes: self.log.size()?,
            compactions: self.compactions,
        })
    }

    /// What the last replay found.
    #[must_use]
    pub fn replay_report(&self) -> ReplayReport {
        self.replay
    }

    /// Syncs the log to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.log.sync()
    }

    fn live_records(&self) -> usize {
        self.stores.values().map(Vec::len).sum()
    }

    fn log_and_apply(&mut self, entry: LogEntry) -> CoreResult<()> {
        self.log.append(&entry)?;
        self.appended += 1;
        self.apply(entry);
        Ok(())
    }

    fn apply(&mut self, entry: LogEntry) {
        match entry {
            LogEntry::Put { store, key, value } => {
                let records = self.stores.entry(store).or_default();
                match Self::search(records, &key) {
                    Ok(i) => records[i].1 = value,
                    Err(i) => records.insert(i, (key, value)),
                }
            }
            LogEntry::Del { store, key } => {
                if let Some(records) = self.stores.get_mut(&store) {
                    if let Ok(i) = Self::search(records, &key) {
                        records.remove(i);
                    }
                }
            }
            LogEntry::Batch { ops } => {
                for op in ops {
                    self.apply(op);
                }
            }
        }
    }

    fn expand(&self, ops: Vec<WriteOp>) -> Vec<LogEntry> {
        // Keys touched earlier in the group: true if present after that op.
        let mut staged: BTreeMap<(String, Vec<u8>), bool> = BTreeMap::new();
        let mut entries = Vec::with_capacity(ops.len());

        for op in ops {
            match op {
                WriteOp::Put { store, key, value } => {
                    staged.insert((store.clone(), key.clone()), true);
                    entries.push(LogEntry::put(store, key, value));
                }
                WriteOp::Delete { store, key } => {
                    staged.insert((store.clone(), key.clone()), false);
                    entries.push(LogEntry::del(store, key));
                }
                WriteOp::DeleteRange { store, range } => {
                    self.expand_range(&store, &range, &mut staged, &mut entries);
                }
                WriteOp::Clear { store } => {
                    self.expand_range(&store, &EncodedRange::all(), &mut staged, &mut entries);
                }
            }
        }
        entries
    }

    fn expand_range(
        &self,
        store: &str,
        range: &EncodedRange,
        staged: &mut BTreeMap<(String, Vec<u8>), bool>,
        entries: &mut Vec<LogEntry>,
    ) {
        let mut victims: BTreeSet<Vec<u8>> = self
            .keys_in(store, range)
            .into_iter()
            .filter(|key| staged.get(&(store.to_string(), key.clone())) != Some(&false))
            .collect();
        victims.extend(
            staged
                .iter()
                .filter(|((s, key), present)| **present && s == store && range.contains(key))
                .map(|((_, key), _)| key.clone()),
        );
        for key in victims {
            staged.insert((store.to_string(), key.clone()), false);
            entries.push(LogEntry::del(store, key));
        }
    }

    fn slice(&self, store: &str, range: &EncodedRange) -> &[Record] {
        let Some(records) = self.stores.get(store) else {
            return &[];
        };
        let start = records.partition_point(|(key, _)| !range.above_lower(key));
        let end = records.partition_point(|(key, _)| range.below_upper(key));
        if start >= end {
            return &[];
        }
        &records[start..end]
    }

    fn search(records: &[Record], key: &[u8]) -> Result<usize, usize> {
        records.binary_search_by(|(probe, _)| probe.as_slice().cmp(key))
    }
}
