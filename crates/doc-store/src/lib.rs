//! Transactional document store for the production event engine.
//!
//! Documents are JSON bodies addressed by collection and id. Writes go
//! through optimistic [`Transaction`]s that commit all-or-nothing.

pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;
pub mod transaction;

pub use document::{Document, DocumentKey, Version};
pub use error::{Result, StoreError};
pub use memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use query::{DocumentQuery, FieldFilter};
pub use store::{
    CommitReceipt, DocumentStore, DocumentStoreExt, DocumentStream, Precondition, WriteBatch,
    WriteOp,
};
pub use transaction::Transaction;
