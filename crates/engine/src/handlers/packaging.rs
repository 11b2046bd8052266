//! `entrada_kit_embalagem` and `conclusao_embalagem`.

use async_trait::async_trait;
use doc_store::Transaction;
use domain::{
    AggregateStore, AssemblyGroup, EntryIds, GroupTransition, PackagingEntry, ServiceKind,
    StockMovement,
};
use rust_decimal::Decimal;

use super::support::{
    consume_supplies, debit_product, record_time, transition_group, unexpected_payload,
};
use super::{EventHandler, HandlerContext, HandlerOutcome};
use crate::error::{EngineError, Result};
use crate::event::{EventPayload, EventType};

/// Registers an assembled kit in the packaging queue.
pub struct KitPackagingEntryHandler;

#[async_trait]
impl EventHandler for KitPackagingEntryHandler {
    fn event_type(&self) -> EventType {
        EventType::EntradaKitEmbalagem
    }

    #[tracing::instrument(skip_all, fields(handler = "KitPackagingEntry", event_id = %ctx.event.id))]
    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        tx: &mut Transaction<'_>,
        payload: &EventPayload,
    ) -> Result<HandlerOutcome> {
        let EventPayload::EntradaKitEmbalagem(entry) = payload else {
            return Err(unexpected_payload(self.event_type(), payload));
        };

        let group: AssemblyGroup = tx.require(&entry.grupo_id).await?;
        if group.assembly_instance_id != entry.assembly_instance_id {
            return Err(EngineError::validation(format!(
                "group {} belongs to assembly instance {}, not {}",
                group.id, group.assembly_instance_id, entry.assembly_instance_id
            )));
        }

        if tx
            .load::<PackagingEntry>(&entry.assembly_instance_id)
            .await?
            .is_some()
        {
            return Ok(HandlerOutcome::noop());
        }

        tx.insert(&PackagingEntry::new(
            &entry.assembly_instance_id,
            &entry.kit_id,
            entry.quantidade,
            &entry.grupo_id,
            entry.pedido_id.clone().or(group.order_id),
            ctx.event.timestamp,
        ))?;

        Ok(HandlerOutcome::applied())
    }
}

/// Ships a packaged unit.
///
/// Debits packaging supplies and the shipped units, records packaging time,
/// completes the root group (and through it the line item and order) and
/// closes the queue entry.
pub struct PackagingConcludedHandler;

#[async_trait]
impl EventHandler for PackagingConcludedHandler {
    fn event_type(&self) -> EventType {
        EventType::ConclusaoEmbalagem
    }

    #[tracing::instrument(skip_all, fields(handler = "PackagingConcluded", event_id = %ctx.event.id))]
    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        tx: &mut Transaction<'_>,
        payload: &EventPayload,
    ) -> Result<HandlerOutcome> {
        let EventPayload::ConclusaoEmbalagem(concluded) = payload else {
            return Err(unexpected_payload(self.event_type(), payload));
        };

        let mut entry: PackagingEntry = tx.require(&concluded.assembly_instance_id).await?;
        if entry.is_done() {
            return Ok(HandlerOutcome::noop());
        }
        let mut group: AssemblyGroup = tx.require(&entry.grupo_id).await?;

        let mut ids = EntryIds::for_event(&ctx.event.id);
        let mut outcome = HandlerOutcome::applied();

        consume_supplies(tx, ctx, &mut ids, &mut outcome, &concluded.consumo_embalagem)?;
        record_time(
            tx,
            ctx,
            &mut ids,
            &group,
            ServiceKind::Embalagem,
            concluded.tempo_embalagem_minutos.unwrap_or(Decimal::ZERO),
        )?;

        let shipped = StockMovement::saida("", &entry.produto_id, entry.quantidade)
            .of_type(group.target_product_type)
            .destined_to("expedicao");
        debit_product(tx, ctx, &mut ids, &mut outcome, shipped)?;

        transition_group(tx, ctx, &mut group, GroupTransition::Complete, None).await?;

        entry.complete(ctx.event.timestamp);
        tx.save(&entry)?;

        Ok(outcome)
    }
}
