//! `conclusao_montagem_peca` and `conclusao_montagem_modelo`.

use async_trait::async_trait;
use doc_store::Transaction;
use domain::{
    AggregateStore, EntryIds, GroupTransition, Guard, PackagingEntry, ProductType, ServiceKind,
    StockMovement,
};

use super::support::{
    credit_product, debit_product, load_group, minutes_or_estimate, record_time,
    transition_group, unexpected_payload,
};
use super::{EventHandler, HandlerContext, HandlerOutcome};
use crate::error::Result;
use crate::event::{EventPayload, EventType};

/// Concludes assembly of a piece or model group.
///
/// Debits every required component at its planned quantity (parts printed
/// by the group itself excepted), credits the assembled units and marks the
/// group `montado`. A root group also enters the packaging queue, since no
/// kit event will do it.
pub struct AssemblyHandler {
    kind: ProductType,
}

impl AssemblyHandler {
    pub fn piece() -> Self {
        Self {
            kind: ProductType::Peca,
        }
    }

    pub fn model() -> Self {
        Self {
            kind: ProductType::Modelo,
        }
    }
}

#[async_trait]
impl EventHandler for AssemblyHandler {
    fn event_type(&self) -> EventType {
        match self.kind {
            ProductType::Peca => EventType::ConclusaoMontagemPeca,
            _ => EventType::ConclusaoMontagemModelo,
        }
    }

    #[tracing::instrument(skip_all, fields(handler = "Assembly", event_id = %ctx.event.id))]
    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        tx: &mut Transaction<'_>,
        payload: &EventPayload,
    ) -> Result<HandlerOutcome> {
        let concluded = match (self.kind, payload) {
            (ProductType::Peca, EventPayload::ConclusaoMontagemPeca(p))
            | (ProductType::Modelo, EventPayload::ConclusaoMontagemModelo(p)) => p,
            _ => return Err(unexpected_payload(self.event_type(), payload)),
        };

        let mut group = load_group(tx, &concluded.grupo_id, &[self.kind]).await?;
        if group.guard(GroupTransition::ConcludeAssembly)? == Guard::AlreadyApplied {
            return Ok(HandlerOutcome::noop());
        }

        let mut ids = EntryIds::for_event(&ctx.event.id);
        let mut outcome = HandlerOutcome::applied();

        for debit in group.assembly_debits() {
            let movement = StockMovement::saida("", debit.component_id, debit.quantidade)
                .of_type(debit.component_type)
                .at(debit.locais);
            debit_product(tx, ctx, &mut ids, &mut outcome, movement)?;
        }

        let credit = StockMovement::entrada("", &group.target_product_id, group.quantidade)
            .of_type(group.target_product_type)
            .at(concluded.locais.clone());
        credit_product(tx, ctx, &mut ids, credit)?;

        let estimate = ctx
            .catalog
            .product(&group.target_product_id)
            .map(|p| p.tempo_montagem_estimado);
        let minutes = minutes_or_estimate(concluded.tempo_montagem_minutos, estimate, group.quantidade);
        record_time(tx, ctx, &mut ids, &group, ServiceKind::Montagem, minutes)?;

        transition_group(tx, ctx, &mut group, GroupTransition::ConcludeAssembly, None).await?;

        if group.is_root() && group.order_id.is_some() {
            let queued = tx.load::<PackagingEntry>(&group.assembly_instance_id).await?;
            if queued.is_none() {
                tx.insert(&PackagingEntry::new(
                    &group.assembly_instance_id,
                    &group.target_product_id,
                    group.quantidade,
                    &group.id,
                    group.order_id.clone(),
                    ctx.event.timestamp,
                ))?;
            }
        }

        Ok(outcome)
    }
}
