use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Version number of a document, used for optimistic concurrency control.
///
/// A document is created at version 1 and every write bumps it by one.
/// Version 0 never exists in the store; it stands for "not yet written".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) of a document that does not exist.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version (1) assigned on creation.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// Address of a document: collection name plus document id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub collection: String,
    pub id: String,
}

impl DocumentKey {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A stored document with its bookkeeping fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Collection the document belongs to.
    pub collection: String,

    /// Document id, unique within the collection.
    pub id: String,

    /// Current version of the document.
    pub version: Version,

    /// Store-assigned, strictly increasing insertion sequence.
    ///
    /// Queries return documents in this order, which is the order in which
    /// they were first created.
    pub sequence: i64,

    /// When the document was created.
    pub created_at: DateTime<Utc>,

    /// When the document was last written.
    pub updated_at: DateTime<Utc>,

    /// The document body as JSON.
    pub body: serde_json::Value,
}

impl Document {
    /// Returns the key addressing this document.
    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(self.collection.clone(), self.id.clone())
    }

    /// Deserializes the body into a concrete type.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }

    /// Consumes the document and deserializes its body.
    pub fn into_body<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body)
    }
}
