//! Error types for ShelfDB core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse classification of a [`CoreError`], mirroring the exception names
/// of the object-store API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or unusable key.
    Data,
    /// Duplicate key on `add`, or duplicate store name.
    Constraint,
    /// Mutation attempted in a read-only transaction.
    ReadOnly,
    /// Operation on an aborted transaction, or a request rejected by abort.
    Abort,
    /// Unknown store.
    NotFound,
    /// Operation on a transaction that already committed.
    TransactionInactive,
    /// Call made in a state that does not allow it.
    InvalidState,
    /// Argument of the wrong shape.
    Type,
    /// Storage, I/O, serialization or format failure.
    Internal,
}

/// Errors that can occur in ShelfDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No key was supplied and none could be derived, or the key is invalid.
    #[error("DataError: {message}")]
    Data {
        /// What was wrong with the key.
        message: String,
    },

    /// A uniqueness constraint was violated.
    #[error("ConstraintError: {message}")]
    Constraint {
        /// Which constraint.
        message: String,
    },

    /// A mutating call was made on a read-only transaction.
    #[error("ReadOnlyError: {operation} is not allowed in a readonly transaction")]
    ReadOnly {
        /// The rejected operation.
        operation: &'static str,
    },

    /// The transaction was aborted.
    #[error("AbortError: {reason}")]
    Aborted {
        /// Why the transaction was aborted.
        reason: String,
    },

    /// A store name is not part of the schema or the transaction scope.
    #[error("NotFoundError: object store {name:?} not found")]
    StoreNotFound {
        /// Name of the store.
        name: String,
    },

    /// The transaction has already committed.
    #[error("TransactionInactiveError: transaction has already committed")]
    TransactionInactive,

    /// Operation not permitted in the current state.
    #[error("InvalidStateError: {message}")]
    InvalidState {
        /// Why the operation is invalid.
        message: String,
    },

    /// An argument had an unusable value.
    #[error("TypeError: {message}")]
    Type {
        /// Description of the bad argument.
        message: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] shelfdb_storage::StorageError),

    /// Key codec error.
    #[error("DataError: {0}")]
    Codec(#[from] shelfdb_codec::CodecError),

    /// I/O error outside the log backend (sidecars, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A value could not be serialized or deserialized.
    #[error("serialization failed: {message}")]
    Serialization {
        /// Description from the serializer.
        message: String,
    },

    /// Another handle holds the database directory lock.
    #[error("database locked: another handle has exclusive access")]
    DatabaseLocked,

    /// A sidecar file is unreadable.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },
}

impl CoreError {
    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates an abort error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Creates a not-found error for a store.
    pub fn store_not_found(name: impl Into<String>) -> Self {
        Self::StoreNotFound { name: name.into() }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl std::fmt::Display) -> Self {
        Self::Serialization {
            message: message.to_string(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Data { .. } | Self::Codec(_) => ErrorKind::Data,
            Self::Constraint { .. } => ErrorKind::Constraint,
            Self::ReadOnly { .. } => ErrorKind::ReadOnly,
            Self::Aborted { .. } => ErrorKind::Abort,
            Self::StoreNotFound { .. } => ErrorKind::NotFound,
            Self::TransactionInactive => ErrorKind::TransactionInactive,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Type { .. } => ErrorKind::Type,
            Self::Storage(_)
            | Self::Io(_)
            | Self::Serialization { .. }
            | Self::DatabaseLocked
            | Self::InvalidFormat { .. } => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(CoreError::data("x").kind(), ErrorKind::Data);
        assert_eq!(
            CoreError::from(shelfdb_codec::CodecError::invalid_key("nan")).kind(),
            ErrorKind::Data
        );
        assert_eq!(CoreError::aborted("x").kind(), ErrorKind::Abort);
        assert_eq!(CoreError::store_not_found("s").kind(), ErrorKind::NotFound);
        assert_eq!(
            CoreError::ReadOnly { operation: "put" }.kind(),
            ErrorKind::ReadOnly
        );
        assert_eq!(CoreError::DatabaseLocked.kind(), ErrorKind::Internal);
    }

    #[test]
    fn messages_name_the_exception() {
        let err = CoreError::store_not_found("kv");
        assert_eq!(err.to_string(), "NotFoundError: object store \"kv\" not found");
        assert!(CoreError::constraint("dup").to_string().starts_with("ConstraintError"));
    }
}
