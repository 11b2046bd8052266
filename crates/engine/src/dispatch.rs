//! Routes production events to their handlers inside retried transactions.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::DocumentId;
use doc_store::{
    DocumentKey, DocumentQuery, DocumentStore, DocumentStoreExt, StoreError, Transaction,
    WriteBatch,
};
use domain::ledger::current_stock;
use domain::{Catalog, DomainError, InMemoryCatalog, LedgerItem, collections};
use futures_util::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::clock::MonotonicClock;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::event::{EventPayload, EventType, ProductionEvent};
use crate::handlers::{EventHandler, HandlerContext, default_handlers};
use crate::receipt::{ProcessedReceipt, ReceiptStatus};

/// How a dispatched event ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// The handler changed state and the receipt was written.
    Applied,
    /// The guard found the transition already applied; only the receipt was
    /// written.
    Noop,
    /// A receipt for this event id already existed; nothing was written.
    Duplicate,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Applied => "applied",
            DispatchStatus::Noop => "noop",
            DispatchStatus::Duplicate => "duplicate",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub event_id: String,
    pub status: DispatchStatus,
    /// Transaction attempts it took, conflicts included.
    pub attempts: u32,
    /// Follow-up events committed with this one.
    pub successors: Vec<ProductionEvent>,
    /// Order line items whose BOM expanded to nothing (intake only).
    pub zero_component_items: Vec<usize>,
}

/// Summary of one [`EventDispatcher::dispatch_pending`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingReport {
    pub listed: usize,
    pub applied: usize,
    pub noop: usize,
    pub duplicate: usize,
    pub failed: usize,
}

const PENDING_CURSOR: &str = "eventos_pendentes";

/// Sequence of the last event before which every event is settled.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct PendingCursor {
    sequence: i64,
}

/// Dispatches production events to the handler registered for their type.
///
/// Each event runs in its own optimistic transaction: the handler stages
/// its writes, the dispatcher adds the successor events and the receipt,
/// and the whole batch commits at once. A commit that loses a race is
/// retried from scratch up to `max_tx_attempts` times.
pub struct EventDispatcher<S: DocumentStore> {
    store: S,
    catalog: RwLock<Arc<dyn Catalog>>,
    handlers: HashMap<EventType, Arc<dyn EventHandler>>,
    config: EngineConfig,
    clock: MonotonicClock,
}

impl<S: DocumentStore> EventDispatcher<S> {
    /// Creates a dispatcher with a handler for every event type.
    pub fn new(store: S, catalog: Arc<dyn Catalog>, config: EngineConfig) -> Self {
        let handlers = default_handlers()
            .into_iter()
            .map(|h| (h.event_type(), h))
            .collect();
        Self {
            store,
            catalog: RwLock::new(catalog),
            handlers,
            config,
            clock: MonotonicClock::new(),
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The catalog snapshot handlers currently expand against.
    pub async fn catalog(&self) -> Arc<dyn Catalog> {
        self.catalog.read().await.clone()
    }

    /// Swaps the catalog snapshot. Events already running keep the old one.
    pub async fn set_catalog(&self, catalog: Arc<dyn Catalog>) {
        *self.catalog.write().await = catalog;
    }

    /// Snapshots the `produtos` collection and swaps it in.
    pub async fn reload_catalog(&self) -> Result<usize> {
        let catalog = InMemoryCatalog::load(&self.store).await?;
        let products = catalog.len();
        self.set_catalog(Arc::new(catalog)).await;
        Ok(products)
    }

    /// Records a new event with a server-assigned timestamp, then dispatches
    /// it. An event without an id gets a generated one.
    ///
    /// Submitting an id that is already recorded dispatches the stored copy,
    /// which is a duplicate once it has been handled.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn submit(&self, event: ProductionEvent) -> Result<DispatchOutcome> {
        let mut event = event.at(self.clock.now());
        if event.id.trim().is_empty() {
            event.id = DocumentId::new().to_string();
        }
        let batch = WriteBatch::new().create(
            DocumentKey::new(collections::EVENTOS_PRODUCAO, &event.id),
            serde_json::to_value(&event)?,
        );

        match self.store.commit(batch).await {
            Ok(_) => self.dispatch(&event).await,
            Err(StoreError::AlreadyExists { .. }) => {
                tracing::info!("event already recorded, dispatching the stored copy");
                let stored = self
                    .store
                    .get(collections::EVENTOS_PRODUCAO, &event.id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("ProductionEvent", &event.id))?;
                self.dispatch(&ProductionEvent::from_document(stored)?).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Dispatches one recorded event and, when configured, the successors
    /// it emits.
    ///
    /// Successor failures are logged, not returned: successors are already
    /// recorded and the next pending pass picks them up again.
    pub async fn dispatch(&self, event: &ProductionEvent) -> Result<DispatchOutcome> {
        let outcome = self.dispatch_single(event).await?;

        if self.config.chain_successors && !outcome.successors.is_empty() {
            let mut queue: VecDeque<ProductionEvent> = outcome.successors.iter().cloned().collect();
            while let Some(next) = queue.pop_front() {
                match self.dispatch_single(&next).await {
                    Ok(chained) => queue.extend(chained.successors),
                    Err(error) => tracing::warn!(
                        event_id = %next.id,
                        %error,
                        "chained dispatch failed, left for the next pending pass"
                    ),
                }
            }
        }

        Ok(outcome)
    }

    /// Lists recorded events that are not settled yet, oldest first.
    ///
    /// Events with a deferred receipt are listed once their next attempt is
    /// due. The scan starts after the pending cursor, which moves past every
    /// leading event that is settled and older than `cursor_settle`.
    pub async fn pending_events(&self, limit: usize) -> Result<Vec<ProductionEvent>> {
        let start = self
            .store
            .get_as::<PendingCursor>(collections::CURSORES, PENDING_CURSOR)
            .await?
            .unwrap_or_default();
        let documents = self
            .store
            .query(
                DocumentQuery::collection(collections::EVENTOS_PRODUCAO)
                    .after_sequence(start.sequence),
            )
            .await?;

        let now = Utc::now();
        let settled_before = now - to_chrono(self.config.cursor_settle);
        let mut cursor = start.sequence;
        let mut leading = true;
        let mut pending = Vec::new();

        for document in documents {
            if pending.len() >= limit {
                break;
            }
            let (sequence, created_at) = (document.sequence, document.created_at);
            let document_id = document.id.clone();

            let settled = match ProductionEvent::from_document(document) {
                Ok(event) => {
                    let receipt: Option<ProcessedReceipt> = self
                        .store
                        .get_as(collections::EVENTOS_PROCESSADOS, &event.id)
                        .await?;
                    match receipt {
                        Some(receipt) if receipt.status.is_settled() => true,
                        Some(receipt) => {
                            if receipt.is_due(now) {
                                pending.push(event);
                            }
                            false
                        }
                        None => {
                            pending.push(event);
                            false
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(event_id = %document_id, %error, "skipping unreadable event");
                    true
                }
            };

            leading &= settled && created_at <= settled_before;
            if leading {
                cursor = sequence;
            }
        }

        if cursor > start.sequence {
            match self.advance_cursor(cursor).await {
                Ok(()) => metrics::gauge!("production_pending_cursor").set(cursor as f64),
                Err(error) => tracing::debug!(%error, "pending cursor not advanced"),
            }
        }

        Ok(pending)
    }

    /// Dispatches up to `limit` pending events, `max_concurrent_dispatches`
    /// at a time.
    #[tracing::instrument(skip(self))]
    pub async fn dispatch_pending(&self, limit: usize) -> Result<PendingReport> {
        let events = self.pending_events(limit).await?;
        let mut report = PendingReport {
            listed: events.len(),
            ..PendingReport::default()
        };
        if events.is_empty() {
            return Ok(report);
        }

        let this = self;
        let results: Vec<Result<DispatchOutcome>> = stream::iter(events)
            .map(|event| async move { this.dispatch(&event).await })
            .buffer_unordered(self.config.max_concurrent_dispatches.max(1))
            .collect()
            .await;

        for result in results {
            match result {
                Ok(outcome) => match outcome.status {
                    DispatchStatus::Applied => report.applied += 1,
                    DispatchStatus::Noop => report.noop += 1,
                    DispatchStatus::Duplicate => report.duplicate += 1,
                },
                Err(_) => report.failed += 1,
            }
        }

        tracing::info!(
            listed = report.listed,
            applied = report.applied,
            noop = report.noop,
            failed = report.failed,
            "pending events dispatched"
        );
        Ok(report)
    }

    #[tracing::instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    async fn dispatch_single(&self, event: &ProductionEvent) -> Result<DispatchOutcome> {
        let started = Instant::now();
        let result = self.process(event).await;
        metrics::histogram!("production_dispatch_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => {
                metrics::counter!(
                    "production_events_dispatched_total",
                    "event_type" => event.event_type.clone(),
                    "status" => outcome.status.as_str()
                )
                .increment(1);
                if outcome.status != DispatchStatus::Applied {
                    metrics::counter!("production_events_noop_total").increment(1);
                }
            }
            Err(error) => {
                metrics::counter!(
                    "production_events_failed_total",
                    "event_type" => event.event_type.clone(),
                    "kind" => error.kind()
                )
                .increment(1);

                if error.is_fatal() {
                    tracing::error!(
                        %error,
                        kind = error.kind(),
                        actor_id = %event.actor_id,
                        payload = %event.payload,
                        "event failed permanently"
                    );
                } else {
                    tracing::warn!(%error, kind = error.kind(), "event not applied");
                }
                if let Err(receipt_error) = self.record_failure(event, error).await {
                    tracing::warn!(error = %receipt_error, "could not record failure receipt");
                }
            }
        }

        result
    }

    async fn process(&self, event: &ProductionEvent) -> Result<DispatchOutcome> {
        let (kind, payload) = event.decode()?;
        let handler = self
            .handlers
            .get(&kind)
            .cloned()
            .ok_or_else(|| EngineError::UnknownEventType(event.event_type.clone()))?;
        let catalog = self.catalog().await;
        let max_attempts = self.config.max_tx_attempts.max(1);

        let mut attempt = 0;
        let (outcome, debited) = loop {
            attempt += 1;
            match self
                .attempt(handler.as_ref(), catalog.as_ref(), event, &payload, attempt)
                .await
            {
                Ok(result) => break result,
                Err(error) if error.is_retryable() => {
                    if attempt >= max_attempts {
                        return Err(EngineError::ConcurrencyConflict { attempts: attempt });
                    }
                    metrics::counter!("production_tx_retries_total").increment(1);
                    tracing::warn!(attempt, %error, "transaction lost a race, retrying");
                    tokio::task::yield_now().await;
                }
                Err(error) => return Err(error),
            }
        };

        if outcome.status == DispatchStatus::Applied {
            self.warn_on_overdebits(&debited).await;
        }
        Ok(outcome)
    }

    async fn attempt(
        &self,
        handler: &dyn EventHandler,
        catalog: &dyn Catalog,
        event: &ProductionEvent,
        payload: &EventPayload,
        attempt: u32,
    ) -> Result<(DispatchOutcome, Vec<(LedgerItem, String)>)> {
        let mut tx = Transaction::begin(&self.store);

        let prior: Option<ProcessedReceipt> =
            tx.get_as(collections::EVENTOS_PROCESSADOS, &event.id).await?;
        if prior.as_ref().is_some_and(|r| r.status.is_settled()) {
            tracing::debug!("receipt found, skipping");
            let outcome = DispatchOutcome {
                event_id: event.id.clone(),
                status: DispatchStatus::Duplicate,
                attempts: attempt,
                successors: Vec::new(),
                zero_component_items: Vec::new(),
            };
            return Ok((outcome, Vec::new()));
        }

        let ctx = HandlerContext { event, catalog };
        let handled = handler.handle(&ctx, &mut tx, payload).await?;

        let mut successors = Vec::with_capacity(handled.successors.len());
        for (n, successor) in handled.successors.iter().enumerate() {
            let id = successor_id(&event.id, successor.event_type(), n);
            let next = ProductionEvent::new(id, successor)?
                .by(event.actor_id.clone())
                .at(self.clock.now());
            tx.create(collections::EVENTOS_PRODUCAO, &next.id, &next)?;
            successors.push(next);
        }

        let (status, receipt_status) = if handled.applied {
            (DispatchStatus::Applied, ReceiptStatus::Applied)
        } else {
            (DispatchStatus::Noop, ReceiptStatus::Noop)
        };
        let mut receipt =
            ProcessedReceipt::new(&event.id, &event.event_type, receipt_status, self.clock.now());
        receipt.attempts = attempt;
        receipt.successors = successors.iter().map(|s| s.id.clone()).collect();
        match prior {
            Some(deferred) => {
                receipt.failures = deferred.failures;
                tx.put(collections::EVENTOS_PROCESSADOS, &event.id, &receipt)?;
            }
            None => tx.create(collections::EVENTOS_PROCESSADOS, &event.id, &receipt)?,
        }

        let committed = tx.commit().await?;
        tracing::info!(
            status = status.as_str(),
            written = committed.written,
            successors = successors.len(),
            attempt,
            "event committed"
        );

        let outcome = DispatchOutcome {
            event_id: event.id.clone(),
            status,
            attempts: attempt,
            successors,
            zero_component_items: handled.zero_component_items,
        };
        Ok((outcome, handled.debited))
    }

    /// Receipts a failed dispatch. Fatal failures settle as `failed` at
    /// once; other failures are deferred with a growing delay until
    /// `max_deferrals` is reached.
    async fn record_failure(
        &self,
        event: &ProductionEvent,
        error: &EngineError,
    ) -> Result<ReceiptStatus> {
        let mut tx = Transaction::begin(&self.store);
        let prior: Option<ProcessedReceipt> =
            tx.get_as(collections::EVENTOS_PROCESSADOS, &event.id).await?;
        if let Some(settled) = prior.as_ref().filter(|r| r.status.is_settled()) {
            return Ok(settled.status);
        }

        let failures = prior.as_ref().map_or(0, |r| r.failures) + 1;
        let now = self.clock.now();
        let mut receipt = if error.is_fatal() || failures >= self.config.max_deferrals {
            ProcessedReceipt::failed(&event.id, &event.event_type, now, error.kind(), error.to_string())
        } else {
            let next_attempt_at = Utc::now() + to_chrono(self.config.backoff_after(failures));
            ProcessedReceipt::deferred(
                &event.id,
                &event.event_type,
                now,
                error.kind(),
                error.to_string(),
                next_attempt_at,
            )
        };
        receipt.failures = failures;

        if prior.is_some() {
            tx.put(collections::EVENTOS_PROCESSADOS, &event.id, &receipt)?;
        } else {
            tx.create(collections::EVENTOS_PROCESSADOS, &event.id, &receipt)?;
        }
        tx.commit().await?;

        match receipt.status {
            ReceiptStatus::Deferred => {
                metrics::counter!("production_events_deferred_total").increment(1);
                tracing::info!(failures, next_attempt_at = ?receipt.next_attempt_at, "event deferred");
            }
            _ if !error.is_fatal() => {
                tracing::error!(failures, kind = error.kind(), "event gave up after repeated failures");
            }
            _ => {}
        }
        Ok(receipt.status)
    }

    async fn advance_cursor(&self, sequence: i64) -> Result<()> {
        let mut tx = Transaction::begin(&self.store);
        let current: Option<PendingCursor> = tx.get_as(collections::CURSORES, PENDING_CURSOR).await?;
        if current.is_some_and(|c| c.sequence >= sequence) {
            return Ok(());
        }
        tx.put(collections::CURSORES, PENDING_CURSOR, &PendingCursor { sequence })?;
        tx.commit().await?;
        Ok(())
    }

    /// The ledger never refuses a debit; a negative balance after commit is
    /// reported instead.
    async fn warn_on_overdebits(&self, debited: &[(LedgerItem, String)]) {
        for (item, item_id) in debited {
            match current_stock(&self.store, *item, item_id, None).await {
                Ok(balance) if balance.is_negative() => {
                    metrics::counter!("stock_overdebit_warnings_total").increment(1);
                    tracing::warn!(
                        item_id = %item_id,
                        ledger = item.collection(),
                        balance = %balance.total(),
                        "stock balance is negative"
                    );
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(item_id = %item_id, %error, "could not read stock balance")
                }
            }
        }
    }
}

fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(1))
}

/// Deterministic id of the `n`-th successor of an event, so that a
/// re-run emits the same ids.
fn successor_id(event_id: &str, kind: EventType, n: usize) -> String {
    if n == 0 {
        format!("{event_id}:{kind}")
    } else {
        format!("{event_id}:{kind}:{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_ids_are_deterministic() {
        assert_eq!(
            successor_id("E1", EventType::EntradaKitEmbalagem, 0),
            "E1:entrada_kit_embalagem"
        );
        assert_eq!(
            successor_id("E1", EventType::EntradaKitEmbalagem, 2),
            "E1:entrada_kit_embalagem:2"
        );
    }
}
