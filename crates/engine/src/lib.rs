//! Production event engine.
//!
//! This crate provides:
//! - the [`ProductionEvent`] envelope and its tagged payloads
//! - one transactional [`EventHandler`] per event type
//! - the [`EventDispatcher`], which decodes events, runs their handler in a
//!   retried optimistic transaction, writes receipts and chains successors

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod handlers;
pub mod receipt;

pub use config::EngineConfig;
pub use dispatch::{DispatchOutcome, DispatchStatus, EventDispatcher, PendingReport};
pub use error::{EngineError, Result};
pub use event::{EventPayload, EventType, ProductionEvent};
pub use handlers::{EventHandler, HandlerContext, HandlerOutcome};
pub use receipt::{ProcessedReceipt, ReceiptStatus};
