use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a document in the store.
///
/// Catalog entries, orders and assembly groups are keyed by free-form
/// strings coming from the dashboard, so this wraps a `String` rather than
/// a UUID. Identifiers generated by the engine are random UUIDs rendered
/// as strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a new random document ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing identifier.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Who triggered a production event.
///
/// Events that cannot be attributed to a person are recorded as
/// [`ActorId::SYSTEM`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Actor recorded when no user can be attributed.
    pub const SYSTEM: &'static str = "sistema";

    /// Creates an actor ID. Blank input falls back to the system actor.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.trim().is_empty() {
            Self::system()
        } else {
            Self(id)
        }
    }

    /// The system actor.
    pub fn system() -> Self {
        Self(Self::SYSTEM.to_string())
    }

    /// Returns the actor ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the system actor.
    pub fn is_system(&self) -> bool {
        self.0 == Self::SYSTEM
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::system()
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Option<String>> for ActorId {
    fn from(id: Option<String>) -> Self {
        id.map(Self::new).unwrap_or_default()
    }
}
