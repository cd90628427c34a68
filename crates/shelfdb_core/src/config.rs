//! Database configuration.

use crate::value::ValueFormat;

/// Configuration for a [`crate::Factory`] and the databases it opens.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether `open` may create a database directory that does not exist.
    pub create_if_missing: bool,

    /// Whether each log append is followed by `fsync` instead of a plain
    /// flush. Safer against power loss, slower.
    pub sync_on_write: bool,

    /// Encoding used for stored values.
    pub value_format: ValueFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: false,
            value_format: ValueFormat::Json,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether every log append is synced to disk.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the value encoding.
    #[must_use]
    pub const fn value_format(mut self, format: ValueFormat) -> Self {
        self.value_format = format;
        self
    }
}
