use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    Document, DocumentQuery, Result, StoreError, Version,
    store::{CommitReceipt, DocumentStore, DocumentStream, WriteBatch, WriteOp, validate_batch},
};

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, BTreeMap<String, Document>>,
    next_sequence: i64,
    injected_conflicts: u32,
    commits: u64,
}

impl MemoryState {
    fn lookup(&self, collection: &str, id: &str) -> Option<&Document> {
        self.collections.get(collection).and_then(|c| c.get(id))
    }

    fn version_of(&self, collection: &str, id: &str) -> Option<Version> {
        self.lookup(collection, id).map(|d| d.version)
    }
}

/// In-memory document store implementation for testing.
///
/// This implementation keeps every collection in memory and provides
/// the same commit semantics as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` non-empty commits fail with a concurrency
    /// conflict, as if another writer had won the race.
    pub async fn inject_conflicts(&self, count: u32) {
        self.state.write().await.injected_conflicts = count;
    }

    /// Returns the total number of documents stored.
    pub async fn document_count(&self) -> usize {
        let state = self.state.read().await;
        state.collections.values().map(BTreeMap::len).sum()
    }

    /// Returns the number of documents in one collection.
    pub async fn collection_len(&self, collection: &str) -> usize {
        let state = self.state.read().await;
        state.collections.get(collection).map_or(0, BTreeMap::len)
    }

    /// Returns the number of successful commits.
    pub async fn commit_count(&self) -> u64 {
        self.state.read().await.commits
    }

    /// Clears all documents.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.collections.clear();
        state.commits = 0;
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let state = self.state.read().await;
        Ok(state.lookup(collection, id).cloned())
    }

    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        let state = self.state.read().await;
        let mut documents: Vec<_> = state
            .collections
            .get(&query.collection)
            .map(|c| c.values().filter(|d| query.matches(d)).cloned().collect())
            .unwrap_or_default();

        documents.sort_by_key(|d| d.sequence);

        let offset = query.offset.unwrap_or(0);
        let documents = documents.into_iter().skip(offset);
        let documents = match query.limit {
            Some(limit) => documents.take(limit).collect(),
            None => documents.collect(),
        };

        Ok(documents)
    }

    async fn stream_collection(&self, collection: &str) -> Result<DocumentStream> {
        use futures_util::stream;

        let documents = self
            .query(DocumentQuery::collection(collection))
            .await?;
        let stream = stream::iter(documents.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt> {
        validate_batch(&batch)?;

        let mut state = self.state.write().await;

        if !batch.is_empty() && state.injected_conflicts > 0 {
            state.injected_conflicts -= 1;
            let key = batch.writes[0].key();
            let actual = state.version_of(&key.collection, &key.id);
            return Err(StoreError::ConcurrencyConflict {
                collection: key.collection.clone(),
                id: key.id.clone(),
                expected: actual,
                actual: actual.map(|v| v.next()),
            });
        }

        // Validate everything before touching any document
        for precondition in &batch.preconditions {
            let key = &precondition.key;
            let actual = state.version_of(&key.collection, &key.id);
            if actual != precondition.expected {
                return Err(StoreError::ConcurrencyConflict {
                    collection: key.collection.clone(),
                    id: key.id.clone(),
                    expected: precondition.expected,
                    actual,
                });
            }
        }

        for write in &batch.writes {
            if let WriteOp::Create { key, .. } = write
                && state.lookup(&key.collection, &key.id).is_some()
            {
                return Err(StoreError::AlreadyExists {
                    collection: key.collection.clone(),
                    id: key.id.clone(),
                });
            }
        }

        let now = Utc::now();
        let written = batch.writes.len();

        for write in batch.writes {
            let (key, body) = match write {
                WriteOp::Create { key, body } | WriteOp::Put { key, body } => (key, body),
            };

            let existing = state
                .lookup(&key.collection, &key.id)
                .map(|d| (d.version, d.sequence, d.created_at));

            let document = match existing {
                Some((version, sequence, created_at)) => Document {
                    collection: key.collection.clone(),
                    id: key.id.clone(),
                    version: version.next(),
                    sequence,
                    created_at,
                    updated_at: now,
                    body,
                },
                None => {
                    state.next_sequence += 1;
                    Document {
                        collection: key.collection.clone(),
                        id: key.id.clone(),
                        version: Version::first(),
                        sequence: state.next_sequence,
                        created_at: now,
                        updated_at: now,
                        body,
                    }
                }
            };

            state
                .collections
                .entry(key.collection)
                .or_default()
                .insert(key.id, document);
        }

        state.commits += 1;

        Ok(CommitReceipt {
            written,
            committed_at: now,
        })
    }
}
