//! One transactional handler per event type.
//!
//! A handler reads the aggregates it needs through the transaction it is
//! given, checks the idempotency guard before anything else, and stages
//! every write (aggregate updates, ledger entries) in that same
//! transaction. It never commits; the dispatcher does, and retries the
//! whole handler if the commit loses a race.

mod assembly;
mod intake;
mod kit;
mod packaging;
mod production;
mod status;
mod support;

use std::sync::Arc;

use async_trait::async_trait;
use doc_store::Transaction;
use domain::{Catalog, LedgerItem};

use crate::error::Result;
use crate::event::{EventPayload, EventType, ProductionEvent};

pub use assembly::AssemblyHandler;
pub use intake::OrderIntakeHandler;
pub use kit::KitAssemblyHandler;
pub use packaging::{KitPackagingEntryHandler, PackagingConcludedHandler};
pub use production::{ConcludeProductionHandler, StartProductionHandler};
pub use status::{StatusReversalHandler, StatusUpdateHandler};

/// What a handler sees besides the transaction.
pub struct HandlerContext<'a> {
    pub event: &'a ProductionEvent,
    pub catalog: &'a dyn Catalog,
}

/// What a handler staged, for the dispatcher to act on after commit.
#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    /// False when the guard found the event already applied.
    pub applied: bool,

    /// Follow-up events to persist in the same transaction.
    pub successors: Vec<EventPayload>,

    /// Items debited, checked for negative balances after commit.
    pub debited: Vec<(LedgerItem, String)>,

    /// Order line items whose BOM expanded to nothing.
    pub zero_component_items: Vec<usize>,
}

impl HandlerOutcome {
    pub fn applied() -> Self {
        Self {
            applied: true,
            ..Self::default()
        }
    }

    pub fn noop() -> Self {
        Self::default()
    }

    pub fn debit(&mut self, item: LedgerItem, id: impl Into<String>) {
        let id = id.into();
        if !self.debited.iter().any(|(i, d)| *i == item && *d == id) {
            self.debited.push((item, id));
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// The event type this handler is registered for.
    fn event_type(&self) -> EventType;

    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        tx: &mut Transaction<'_>,
        payload: &EventPayload,
    ) -> Result<HandlerOutcome>;
}

/// A handler for every event type.
pub fn default_handlers() -> Vec<Arc<dyn EventHandler>> {
    vec![
        Arc::new(OrderIntakeHandler),
        Arc::new(StartProductionHandler),
        Arc::new(ConcludeProductionHandler),
        Arc::new(AssemblyHandler::piece()),
        Arc::new(AssemblyHandler::model()),
        Arc::new(KitAssemblyHandler),
        Arc::new(KitPackagingEntryHandler),
        Arc::new(StatusUpdateHandler),
        Arc::new(StatusReversalHandler),
        Arc::new(PackagingConcludedHandler),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_event_type_has_exactly_one_handler() {
        let handlers = default_handlers();
        let types: HashSet<_> = handlers.iter().map(|h| h.event_type()).collect();
        assert_eq!(handlers.len(), EventType::ALL.len());
        assert_eq!(types.len(), EventType::ALL.len());
    }

    #[test]
    fn debits_are_deduplicated() {
        let mut outcome = HandlerOutcome::applied();
        outcome.debit(LedgerItem::Product, "M1");
        outcome.debit(LedgerItem::Product, "M1");
        outcome.debit(LedgerItem::Supply, "M1");
        assert_eq!(outcome.debited.len(), 2);
    }
}
