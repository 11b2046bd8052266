use std::collections::HashSet;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use serde::de::DeserializeOwned;

use crate::{Document, DocumentKey, DocumentQuery, Result, StoreError, Version};

/// A single staged write.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Creates a document; fails with `AlreadyExists` if the key is taken.
    Create {
        key: DocumentKey,
        body: serde_json::Value,
    },

    /// Creates or replaces a document, bumping its version.
    Put {
        key: DocumentKey,
        body: serde_json::Value,
    },
}

impl WriteOp {
    /// Returns the key this write targets.
    pub fn key(&self) -> &DocumentKey {
        match self {
            WriteOp::Create { key, .. } | WriteOp::Put { key, .. } => key,
        }
    }

    /// Returns the body being written.
    pub fn body(&self) -> &serde_json::Value {
        match self {
            WriteOp::Create { body, .. } | WriteOp::Put { body, .. } => body,
        }
    }
}

/// A read recorded by a transaction, re-checked at commit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub key: DocumentKey,

    /// Version observed when the document was read; `None` if it was absent.
    pub expected: Option<Version>,
}

/// Everything a transaction wants to commit, applied all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub preconditions: Vec<Precondition>,
    pub writes: Vec<WriteOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a precondition.
    pub fn require(mut self, key: DocumentKey, expected: Option<Version>) -> Self {
        self.preconditions.push(Precondition { key, expected });
        self
    }

    /// Adds a create write.
    pub fn create(mut self, key: DocumentKey, body: serde_json::Value) -> Self {
        self.writes.push(WriteOp::Create { key, body });
        self
    }

    /// Adds a put write.
    pub fn put(mut self, key: DocumentKey, body: serde_json::Value) -> Self {
        self.writes.push(WriteOp::Put { key, body });
        self
    }

    /// Returns true if the batch carries no writes.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Outcome of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    /// Number of documents written.
    pub written: usize,

    /// When the commit was applied.
    pub committed_at: DateTime<Utc>,
}

/// A stream of documents.
pub type DocumentStream = Pin<Box<dyn Stream<Item = Result<Document>> + Send>>;

/// Core trait for document store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads a single document.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Retrieves documents matching a query, in insertion order.
    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>>;

    /// Streams every document of a collection in insertion order.
    async fn stream_collection(&self, collection: &str) -> Result<DocumentStream>;

    /// Applies a batch atomically.
    ///
    /// Every precondition must still hold and every write must apply;
    /// otherwise nothing is written and `ConcurrencyConflict` (or
    /// `AlreadyExists`) is returned.
    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt>;
}

/// Extension trait providing convenience methods for document stores.
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    /// Reads a document and deserializes its body.
    async fn get_as<T: DeserializeOwned + Send>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>> {
        match self.get(collection, id).await? {
            Some(doc) => Ok(Some(doc.into_body()?)),
            None => Ok(None),
        }
    }

    /// Checks if a document exists.
    async fn exists(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self.get(collection, id).await?.is_some())
    }

    /// Writes a single document outside of any transaction.
    ///
    /// Intended for seeding reference data such as the catalog.
    async fn put_document(
        &self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
    ) -> Result<CommitReceipt> {
        self.commit(WriteBatch::new().put(DocumentKey::new(collection, id), body))
            .await
    }
}

// Blanket implementation for all DocumentStore implementations
impl<T: DocumentStore + ?Sized> DocumentStoreExt for T {}

/// Validates a batch before it reaches the backend.
pub fn validate_batch(batch: &WriteBatch) -> Result<()> {
    let mut seen = HashSet::new();

    for write in &batch.writes {
        let key = write.key();
        if key.collection.trim().is_empty() || key.id.trim().is_empty() {
            return Err(StoreError::InvalidBatch(format!(
                "write with blank collection or id: {key}"
            )));
        }
        if !seen.insert(key) {
            return Err(StoreError::InvalidBatch(format!(
                "document written more than once in the same batch: {key}"
            )));
        }
    }

    let mut required = HashSet::new();
    for precondition in &batch.preconditions {
        if !required.insert(&precondition.key) {
            return Err(StoreError::InvalidBatch(format!(
                "duplicate precondition: {}",
                precondition.key
            )));
        }
    }

    Ok(())
}
