//! Append-only operation log.
//!
//! Every mutation is appended to the log before it is applied in memory,
//! and the in-memory state is rebuilt on open by replaying the log from the
//! start.
//!
//! ## Line Format
//!
//! One JSON object per line:
//!
//! ```text
//! {"op":"put","store":"kv","key":"<hex>","value":"<hex>"}
//! {"op":"del","store":"kv","key":"<hex>"}
//! {"op":"batch","ops":[ ...puts and dels... ]}
//! ```
//!
//! A batch line is written for each committed transaction, so a crash
//! leaves either all of its operations or none.
//!
//! ## Recovery Policy
//!
//! - **Malformed complete line**: skipped with a warning; replay continues.
//! - **Unterminated final line**: an interrupted append. Dropped, and the
//!   file is truncated back to the last newline.
//!
//! ## Invariants
//!
//! - The log is **append-only** except for compaction, which swaps the whole
//!   file atomically
//! - Each append is **flushed before the operation is acknowledged**
//! - Replay is **deterministic**: the same log always yields the same state

mod record;
mod writer;

pub use record::LogEntry;
pub use writer::{ReplayReport, WalLog};
