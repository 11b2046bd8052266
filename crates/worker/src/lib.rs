//! Trigger layer of the production engine.
//!
//! Polls the document store for recorded events that have no receipt yet and
//! hands them to the [`EventDispatcher`] in bounded batches.

pub mod config;
pub mod error;

use std::future::Future;
use std::sync::Arc;

use doc_store::DocumentStore;
use domain::InMemoryCatalog;
use engine::{EventDispatcher, PendingReport};
use tokio::time::MissedTickBehavior;

use crate::config::WorkerConfig;
use crate::error::Result;

/// Runs one poll: refreshes the catalog snapshot, then dispatches up to
/// `batch_size` pending events.
///
/// A catalog that fails to load leaves the previous snapshot in place.
pub async fn poll_once<S: DocumentStore>(
    dispatcher: &EventDispatcher<S>,
    batch_size: usize,
) -> Result<PendingReport> {
    match dispatcher.reload_catalog().await {
        Ok(products) => tracing::debug!(products, "catalog snapshot refreshed"),
        Err(error) => tracing::warn!(%error, "catalog reload failed, keeping previous snapshot"),
    }

    let report = dispatcher.dispatch_pending(batch_size).await?;
    metrics::counter!("worker_poll_cycles_total").increment(1);
    if report.listed > 0 {
        metrics::histogram!("worker_batch_events").record(report.listed as f64);
    }
    Ok(report)
}

/// Polls every `poll_interval` until `shutdown` resolves and returns the
/// number of completed polls.
///
/// A failed poll is logged and retried on the next tick. An in-flight batch
/// finishes before shutdown is observed.
pub async fn run<S, F>(dispatcher: &EventDispatcher<S>, config: &WorkerConfig, shutdown: F) -> u64
where
    S: DocumentStore,
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut polls = 0;
    loop {
        tokio::select! {
            () = &mut shutdown => {
                tracing::info!(polls, "stopping poll loop");
                break;
            }
            _ = ticker.tick() => {
                match poll_once(dispatcher, config.batch_size).await {
                    Ok(report) if report.failed > 0 => tracing::warn!(
                        failed = report.failed,
                        applied = report.applied,
                        "some pending events were not applied"
                    ),
                    Ok(_) => {}
                    Err(error) => tracing::warn!(%error, "poll failed"),
                }
                polls += 1;
            }
        }
    }
    polls
}

/// Builds a dispatcher over `store` and runs the poll loop on it.
pub async fn serve<S, F>(store: S, config: &WorkerConfig, shutdown: F) -> Result<u64>
where
    S: DocumentStore,
    F: Future<Output = ()>,
{
    let dispatcher = EventDispatcher::new(
        store,
        Arc::new(InMemoryCatalog::new()),
        config.engine.clone(),
    );
    let products = dispatcher.reload_catalog().await?;
    tracing::info!(
        products,
        batch_size = config.batch_size,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "worker started"
    );

    Ok(run(&dispatcher, config, shutdown).await)
}
