//! Core aggregate trait and transactional persistence helpers.

use async_trait::async_trait;
use doc_store::Transaction;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::DomainError;

/// Trait for aggregates persisted as documents.
///
/// An aggregate is a cluster of domain objects that can be treated as a single unit.
/// Each aggregate lives in one document of its collection; every mutation
/// rewrites the whole document inside the caller's transaction.
pub trait Aggregate: Serialize + DeserializeOwned + Send + Sync {
    /// Returns the aggregate type name, used in errors and logs.
    fn aggregate_type() -> &'static str;

    /// Collection holding documents of this aggregate.
    fn collection() -> &'static str;

    /// Returns the aggregate's identifier.
    fn id(&self) -> &str;
}

/// Loads and saves aggregates through a [`Transaction`].
#[async_trait]
pub trait AggregateStore: Send {
    /// Loads an aggregate, returning None if it doesn't exist.
    async fn load<A: Aggregate>(&mut self, id: &str) -> Result<Option<A>, DomainError>;

    /// Loads an aggregate, failing with `ReferenceNotFound` if it doesn't exist.
    async fn require<A: Aggregate>(&mut self, id: &str) -> Result<A, DomainError> {
        self.load(id)
            .await?
            .ok_or_else(|| DomainError::not_found(A::aggregate_type(), id))
    }

    /// Stages a new aggregate; the commit fails if it already exists.
    fn insert<A: Aggregate>(&mut self, aggregate: &A) -> Result<(), DomainError>;

    /// Stages the current state of an aggregate.
    fn save<A: Aggregate>(&mut self, aggregate: &A) -> Result<(), DomainError>;
}

#[async_trait]
impl AggregateStore for Transaction<'_> {
    async fn load<A: Aggregate>(&mut self, id: &str) -> Result<Option<A>, DomainError> {
        Ok(self.get_as(A::collection(), id).await?)
    }

    fn insert<A: Aggregate>(&mut self, aggregate: &A) -> Result<(), DomainError> {
        self.create(A::collection(), aggregate.id(), aggregate)?;
        Ok(())
    }

    fn save<A: Aggregate>(&mut self, aggregate: &A) -> Result<(), DomainError> {
        self.put(A::collection(), aggregate.id(), aggregate)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_store::{DocumentStoreExt, InMemoryDocumentStore};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestAggregate {
        id: String,
        value: i32,
    }

    impl Aggregate for TestAggregate {
        fn aggregate_type() -> &'static str {
            "TestAggregate"
        }

        fn collection() -> &'static str {
            "testes"
        }

        fn id(&self) -> &str {
            &self.id
        }
    }

    #[tokio::test]
    async fn insert_then_load() {
        let store = InMemoryDocumentStore::new();
        let mut tx = Transaction::begin(&store);
        tx.insert(&TestAggregate {
            id: "T1".into(),
            value: 1,
        })
        .unwrap();
        tx.commit().await.unwrap();

        let mut tx = Transaction::begin(&store);
        let loaded: TestAggregate = tx.require("T1").await.unwrap();
        assert_eq!(loaded.value, 1);
    }

    #[tokio::test]
    async fn require_missing_is_reference_not_found() {
        let store = InMemoryDocumentStore::new();
        let mut tx = Transaction::begin(&store);
        let result = tx.require::<TestAggregate>("T404").await;
        assert!(matches!(
            result,
            Err(DomainError::ReferenceNotFound {
                kind: "TestAggregate",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn save_overwrites() {
        let store = InMemoryDocumentStore::new();
        let mut tx = Transaction::begin(&store);
        let mut agg = TestAggregate {
            id: "T1".into(),
            value: 1,
        };
        tx.insert(&agg).unwrap();
        tx.commit().await.unwrap();

        let mut tx = Transaction::begin(&store);
        agg.value = 2;
        tx.save(&agg).unwrap();
        tx.commit().await.unwrap();

        let stored: TestAggregate = store.get_as("testes", "T1").await.unwrap().unwrap();
        assert_eq!(stored.value, 2);
    }
}
