use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A document read inside a transaction changed before commit.
    ///
    /// `expected`/`actual` are `None` when the document was (or is) absent.
    #[error(
        "Concurrency conflict on {collection}/{id}: expected version {expected:?}, found {actual:?}"
    )]
    ConcurrencyConflict {
        collection: String,
        id: String,
        expected: Option<Version>,
        actual: Option<Version>,
    },

    /// A create write targeted a document that already exists.
    #[error("Document already exists: {collection}/{id}")]
    AlreadyExists { collection: String, id: String },

    /// The write batch is malformed.
    #[error("Invalid write batch: {0}")]
    InvalidBatch(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if re-running the whole transaction may succeed.
    ///
    /// `AlreadyExists` is not a conflict: a create racing another writer on a
    /// key it observed absent fails its precondition first and surfaces as
    /// `ConcurrencyConflict`.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for document store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_version_conflicts_are_retryable() {
        let conflict = StoreError::ConcurrencyConflict {
            collection: "pedidos".into(),
            id: "PED-1".into(),
            expected: None,
            actual: Some(Version::new(1)),
        };
        assert!(conflict.is_conflict());

        let exists = StoreError::AlreadyExists {
            collection: "pedidos".into(),
            id: "PED-1".into(),
        };
        assert!(!exists.is_conflict());
    }
}
