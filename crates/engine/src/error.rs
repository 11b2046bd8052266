//! Engine error types.

use doc_store::StoreError;
use domain::DomainError;
use thiserror::Error;

/// Errors that can occur while dispatching a production event.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A domain rule, reference or integrity check failed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The event declares a type no handler is registered for.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// The payload's type tag disagrees with the declared event type.
    #[error("Schema mismatch: event declared {declared} but payload is tagged {found}")]
    SchemaMismatch { declared: String, found: String },

    /// Every transaction attempt lost to a concurrent writer.
    #[error("Concurrency conflict persisted after {attempts} attempts")]
    ConcurrencyConflict { attempts: u32 },

    /// An error occurred in the document store.
    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Domain(DomainError::validation(message))
    }

    /// Short, stable name used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Domain(e) => e.kind(),
            EngineError::UnknownEventType(_) => "unknown_event_type",
            EngineError::SchemaMismatch { .. } => "schema_mismatch",
            EngineError::ConcurrencyConflict { .. } => "concurrency_conflict",
            EngineError::Store(e) if e.is_conflict() => "concurrency_conflict",
            EngineError::Store(_) => "store",
            EngineError::Serialization(_) => "serialization",
        }
    }

    /// Returns true if re-running the transaction from scratch may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Domain(e) => e.is_retryable(),
            EngineError::Store(e) => e.is_conflict(),
            _ => false,
        }
    }

    /// Returns true if the event can never succeed as recorded.
    ///
    /// Fatal failures are receipted as failed right away. Validation
    /// failures and exhausted conflicts are deferred and polled again later.
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::Domain(e) => matches!(
                e,
                DomainError::ReferenceNotFound { .. } | DomainError::Integrity(_)
            ),
            EngineError::UnknownEventType(_) | EngineError::SchemaMismatch { .. } => true,
            _ => false,
        }
    }
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let mismatch = EngineError::SchemaMismatch {
            declared: "conclusao_montagem_kit".into(),
            found: "inicio_producao".into(),
        };
        assert!(mismatch.is_fatal());
        assert!(!mismatch.is_retryable());
        assert_eq!(mismatch.kind(), "schema_mismatch");

        let conflict = EngineError::from(StoreError::ConcurrencyConflict {
            collection: "grupos_montagem".into(),
            id: "G1".into(),
            expected: None,
            actual: None,
        });
        assert!(conflict.is_retryable());
        assert!(!conflict.is_fatal());

        let missing = EngineError::from(DomainError::not_found("AssemblyGroup", "G404"));
        assert!(missing.is_fatal());
        assert_eq!(missing.kind(), "reference_not_found");

        let invalid = EngineError::validation("grupoId is blank");
        assert!(!invalid.is_fatal());
        assert_eq!(invalid.kind(), "validation");
    }
}
