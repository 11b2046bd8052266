//! Shared identifier types for the production engine.

mod types;

pub use types::{ActorId, DocumentId};
