//! Optimistic read-modify-write transactions.

use std::collections::HashMap;

use serde::{Serialize, de::DeserializeOwned};

use crate::store::{CommitReceipt, DocumentStore, WriteBatch, WriteOp};
use crate::{Document, DocumentKey, DocumentQuery, Result, StoreError, Version};

/// A buffered transaction against a [`DocumentStore`].
///
/// Reads go to the store and record the version they observed. Writes are
/// only staged; nothing reaches the store until [`Transaction::commit`],
/// which re-checks every recorded version. Dropping a transaction discards
/// its staged writes.
///
/// A read of a key already written in this transaction returns the staged
/// body.
pub struct Transaction<'a> {
    store: &'a dyn DocumentStore,
    reads: HashMap<DocumentKey, Option<Document>>,
    writes: Vec<WriteOp>,
    write_index: HashMap<DocumentKey, usize>,
}

impl<'a> Transaction<'a> {
    /// Starts a new transaction.
    pub fn begin(store: &'a dyn DocumentStore) -> Self {
        Self {
            store,
            reads: HashMap::new(),
            writes: Vec::new(),
            write_index: HashMap::new(),
        }
    }

    /// Reads a document, recording its version for commit-time validation.
    ///
    /// A key written earlier in this transaction comes back with the staged
    /// body and the version the commit will give it.
    pub async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>> {
        let key = DocumentKey::new(collection, id);
        if let Some(staged) = self.staged(&key) {
            return Ok(Some(staged));
        }
        if let Some(cached) = self.reads.get(&key) {
            return Ok(cached.clone());
        }

        let document = self.store.get(collection, id).await?;
        self.reads.insert(key, document.clone());
        Ok(document)
    }

    /// Reads a document and deserializes its body.
    pub async fn get_as<T: DeserializeOwned>(
        &mut self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>> {
        match self.get(collection, id).await? {
            Some(doc) => Ok(Some(doc.into_body()?)),
            None => Ok(None),
        }
    }

    /// Runs a query and records every returned document as a read.
    ///
    /// Only the returned documents are validated at commit; documents that
    /// start matching the query concurrently are not detected.
    pub async fn query(&mut self, query: DocumentQuery) -> Result<Vec<Document>> {
        let documents = self.store.query(query).await?;
        for doc in &documents {
            self.reads
                .entry(doc.key())
                .or_insert_with(|| Some(doc.clone()));
        }
        Ok(documents)
    }

    /// Stages the creation of a new document.
    ///
    /// Fails right away when the key is already staged or was read as
    /// present in this transaction.
    pub fn create<T: Serialize>(&mut self, collection: &str, id: &str, value: &T) -> Result<()> {
        let key = DocumentKey::new(collection, id);
        let observed = matches!(self.reads.get(&key), Some(Some(_)));
        if observed || self.write_index.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                collection: key.collection,
                id: key.id,
            });
        }

        let body = serde_json::to_value(value)?;
        self.stage(WriteOp::Create { key, body });
        Ok(())
    }

    /// Stages a create-or-replace of a document.
    ///
    /// Writing the same key twice keeps the last body; a staged create stays
    /// a create.
    pub fn put<T: Serialize>(&mut self, collection: &str, id: &str, value: &T) -> Result<()> {
        let key = DocumentKey::new(collection, id);
        let body = serde_json::to_value(value)?;

        if let Some(&index) = self.write_index.get(&key) {
            self.writes[index] = match &self.writes[index] {
                WriteOp::Create { .. } => WriteOp::Create { key, body },
                WriteOp::Put { .. } => WriteOp::Put { key, body },
            };
            return Ok(());
        }

        self.stage(WriteOp::Put { key, body });
        Ok(())
    }

    /// Returns the writes staged so far, in staging order.
    pub fn pending_writes(&self) -> &[WriteOp] {
        &self.writes
    }

    /// Returns the staged writes targeting one collection.
    pub fn pending_in<'s>(&'s self, collection: &'s str) -> impl Iterator<Item = &'s WriteOp> {
        self.writes
            .iter()
            .filter(move |w| w.key().collection == collection)
    }

    /// Returns true if nothing has been staged.
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    /// Version observed for a key, if it was read.
    pub fn observed_version(&self, collection: &str, id: &str) -> Option<Version> {
        self.reads
            .get(&DocumentKey::new(collection, id))
            .and_then(|doc| doc.as_ref().map(|d| d.version))
    }

    /// Commits staged writes, validating every read.
    ///
    /// A read-only transaction commits without touching the store.
    pub async fn commit(self) -> Result<CommitReceipt> {
        if self.writes.is_empty() {
            return Ok(CommitReceipt {
                written: 0,
                committed_at: chrono::Utc::now(),
            });
        }

        let mut batch = WriteBatch::new();
        for (key, doc) in self.reads {
            batch = batch.require(key, doc.map(|d| d.version));
        }
        batch.writes = self.writes;

        self.store.commit(batch).await
    }

    fn staged(&self, key: &DocumentKey) -> Option<Document> {
        let &index = self.write_index.get(key)?;
        let observed = self.reads.get(key).and_then(Option::as_ref);
        let now = chrono::Utc::now();

        Some(Document {
            collection: key.collection.clone(),
            id: key.id.clone(),
            version: observed.map_or_else(Version::first, |d| d.version.next()),
            sequence: observed.map_or(0, |d| d.sequence),
            created_at: observed.map_or(now, |d| d.created_at),
            updated_at: now,
            body: self.writes[index].body().clone(),
        })
    }

    fn stage(&mut self, write: WriteOp) {
        self.write_index
            .insert(write.key().clone(), self.writes.len());
        self.writes.push(write);
    }
}
