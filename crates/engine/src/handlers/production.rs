//! `inicio_producao` and `conclusao_producao`.

use async_trait::async_trait;
use doc_store::Transaction;
use domain::{EntryIds, GroupTransition, Guard, ProductType, ServiceKind, StockMovement};

use super::support::{
    consume_supplies, credit_product, load_group, minutes_or_estimate, record_time,
    transition_group, unexpected_payload,
};
use super::{EventHandler, HandlerContext, HandlerOutcome};
use crate::error::Result;
use crate::event::{EventPayload, EventType, OverageDestination};

/// Moves a piece group from `aguardando` to `em_producao`.
pub struct StartProductionHandler;

#[async_trait]
impl EventHandler for StartProductionHandler {
    fn event_type(&self) -> EventType {
        EventType::InicioProducao
    }

    #[tracing::instrument(skip_all, fields(handler = "StartProduction", event_id = %ctx.event.id))]
    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        tx: &mut Transaction<'_>,
        payload: &EventPayload,
    ) -> Result<HandlerOutcome> {
        let EventPayload::InicioProducao(started) = payload else {
            return Err(unexpected_payload(self.event_type(), payload));
        };

        let mut group = load_group(tx, &started.grupo_id, &[ProductType::Peca]).await?;
        let guard = transition_group(
            tx,
            ctx,
            &mut group,
            GroupTransition::StartProduction,
            started.observacao.clone(),
        )
        .await?;

        Ok(match guard {
            Guard::Apply => HandlerOutcome::applied(),
            Guard::AlreadyApplied => HandlerOutcome::noop(),
        })
    }
}

/// Closes a print run: debits the recorded consumption, logs print time,
/// credits overage sent to stock and marks the group `produzido`.
pub struct ConcludeProductionHandler;

#[async_trait]
impl EventHandler for ConcludeProductionHandler {
    fn event_type(&self) -> EventType {
        EventType::ConclusaoProducao
    }

    #[tracing::instrument(skip_all, fields(handler = "ConcludeProduction", event_id = %ctx.event.id))]
    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        tx: &mut Transaction<'_>,
        payload: &EventPayload,
    ) -> Result<HandlerOutcome> {
        let EventPayload::ConclusaoProducao(concluded) = payload else {
            return Err(unexpected_payload(self.event_type(), payload));
        };

        let mut group = load_group(tx, &concluded.grupo_id, &[ProductType::Peca]).await?;
        if group.guard(GroupTransition::ConcludeProduction)? == Guard::AlreadyApplied {
            return Ok(HandlerOutcome::noop());
        }

        let mut ids = EntryIds::for_event(&ctx.event.id);
        let mut outcome = HandlerOutcome::applied();

        consume_supplies(tx, ctx, &mut ids, &mut outcome, &concluded.consumo_insumos)?;

        let product = ctx.catalog.product(&group.target_product_id);
        let minutes = minutes_or_estimate(
            concluded.tempo_impressao_minutos,
            product.map(|p| p.tempo_impressao_estimado),
            group.quantidade,
        );
        record_time(tx, ctx, &mut ids, &group, ServiceKind::Impressao, minutes)?;

        for overage in &concluded.excedentes {
            if overage.destino != OverageDestination::Estoque {
                continue;
            }
            let mut movement = StockMovement::entrada("", &overage.produto_id, overage.quantidade)
                .at(overage.locais.clone())
                .destined_to(overage.destino.as_str());
            if let Some(tipo) = ctx.catalog.product(&overage.produto_id).map(|p| p.tipo) {
                movement = movement.of_type(tipo);
            }
            credit_product(tx, ctx, &mut ids, movement)?;
        }

        transition_group(tx, ctx, &mut group, GroupTransition::ConcludeProduction, None).await?;
        Ok(outcome)
    }
}
