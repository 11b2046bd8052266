//! `atualizacao_status_grupo_otimizado` and `reversao_status_grupo_otimizado`.

use async_trait::async_trait;
use doc_store::Transaction;
use domain::{GroupTransition, Guard, ProductType};

use super::support::{load_group, transition_group, unexpected_payload};
use super::{EventHandler, HandlerContext, HandlerOutcome};
use crate::error::Result;
use crate::event::{EventPayload, EventType};

fn outcome_for(guard: Guard) -> HandlerOutcome {
    match guard {
        Guard::Apply => HandlerOutcome::applied(),
        Guard::AlreadyApplied => HandlerOutcome::noop(),
    }
}

/// Moves a group to a later status of its lifecycle with no stock effects.
///
/// `montado` and `concluido` are refused; the assembly and packaging events
/// own those states.
pub struct StatusUpdateHandler;

#[async_trait]
impl EventHandler for StatusUpdateHandler {
    fn event_type(&self) -> EventType {
        EventType::AtualizacaoStatusGrupoOtimizado
    }

    #[tracing::instrument(skip_all, fields(handler = "StatusUpdate", event_id = %ctx.event.id))]
    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        tx: &mut Transaction<'_>,
        payload: &EventPayload,
    ) -> Result<HandlerOutcome> {
        let EventPayload::AtualizacaoStatusGrupoOtimizado(update) = payload else {
            return Err(unexpected_payload(self.event_type(), payload));
        };

        let mut group = load_group(tx, &update.grupo_id, &[]).await?;
        let guard = transition_group(
            tx,
            ctx,
            &mut group,
            GroupTransition::AdvanceTo(update.status),
            update.observacao.clone(),
        )
        .await?;
        Ok(outcome_for(guard))
    }
}

/// Sends a piece group back from `em_producao` to `aguardando`.
///
/// The line item keeps its status: items never move backwards.
pub struct StatusReversalHandler;

#[async_trait]
impl EventHandler for StatusReversalHandler {
    fn event_type(&self) -> EventType {
        EventType::ReversaoStatusGrupoOtimizado
    }

    #[tracing::instrument(skip_all, fields(handler = "StatusReversal", event_id = %ctx.event.id))]
    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        tx: &mut Transaction<'_>,
        payload: &EventPayload,
    ) -> Result<HandlerOutcome> {
        let EventPayload::ReversaoStatusGrupoOtimizado(reversal) = payload else {
            return Err(unexpected_payload(self.event_type(), payload));
        };

        let mut group = load_group(tx, &reversal.grupo_id, &[ProductType::Peca]).await?;
        let guard = transition_group(
            tx,
            ctx,
            &mut group,
            GroupTransition::Revert,
            reversal.motivo.clone(),
        )
        .await?;

        if guard == Guard::Apply {
            tracing::info!(grupo_id = %group.id, "production reverted");
        }
        Ok(outcome_for(guard))
    }
}
