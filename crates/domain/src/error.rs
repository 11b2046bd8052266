//! Domain error types.

use doc_store::StoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A payload or entity field is missing or malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A group, order, event or catalog entry could not be found.
    #[error("{kind} not found: {id}")]
    ReferenceNotFound { kind: &'static str, id: String },

    /// The data itself is inconsistent (BOM cycle, impossible quantity).
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// A state machine refused a transition.
    #[error("Invalid transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    /// An error occurred in the document store.
    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        DomainError::ReferenceNotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        DomainError::Integrity(message.into())
    }

    /// Short, stable name used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Validation(_) | DomainError::InvalidTransition { .. } => "validation",
            DomainError::ReferenceNotFound { .. } => "reference_not_found",
            DomainError::Integrity(_) => "integrity",
            DomainError::Store(e) if e.is_conflict() => "concurrency_conflict",
            DomainError::Store(_) => "store",
            DomainError::Serialization(_) => "serialization",
        }
    }

    /// Returns true if re-running the transaction from scratch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::Store(e) if e.is_conflict())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_retryable() {
        let err = DomainError::from(StoreError::ConcurrencyConflict {
            collection: "pedidos".into(),
            id: "PED-1".into(),
            expected: None,
            actual: None,
        });
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "concurrency_conflict");
    }

    #[test]
    fn duplicate_create_is_not_retried() {
        let err = DomainError::from(StoreError::AlreadyExists {
            collection: "pedidos".into(),
            id: "PED-1".into(),
        });
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "store");
    }

    #[test]
    fn invalid_transition_is_a_validation_failure() {
        let err = DomainError::InvalidTransition {
            entity: "AssemblyGroup",
            id: "G1".into(),
            from: "aguardando".into(),
            to: "montado".into(),
        };
        assert_eq!(err.kind(), "validation");
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Invalid transition for AssemblyGroup G1: aguardando -> montado"
        );
    }

    #[test]
    fn not_found_message() {
        let err = DomainError::not_found("Order", "PED-9");
        assert_eq!(err.to_string(), "Order not found: PED-9");
        assert_eq!(err.kind(), "reference_not_found");
    }
}
