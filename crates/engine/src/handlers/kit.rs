//! `conclusao_montagem_kit`.

use async_trait::async_trait;
use doc_store::Transaction;
use domain::{EntryIds, GroupTransition, Guard, ProductType, ServiceKind, StockMovement};

use super::support::{
    credit_product, debit_product, load_group, minutes_or_estimate, record_time,
    transition_group, unexpected_payload,
};
use super::{EventHandler, HandlerContext, HandlerOutcome};
use crate::error::Result;
use crate::event::{EventPayload, EventType, KitToPackaging};

/// Concludes assembly of a kit group.
///
/// In one transaction: debits the required models at the group's recorded
/// fulfillment detail, credits the kits with no location, marks the group
/// `montado` (which moves the line item to `pronto_para_embalagem` and rolls
/// the order up) and emits the single `entrada_kit_embalagem` successor.
pub struct KitAssemblyHandler;

#[async_trait]
impl EventHandler for KitAssemblyHandler {
    fn event_type(&self) -> EventType {
        EventType::ConclusaoMontagemKit
    }

    #[tracing::instrument(skip_all, fields(handler = "KitAssembly", event_id = %ctx.event.id))]
    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        tx: &mut Transaction<'_>,
        payload: &EventPayload,
    ) -> Result<HandlerOutcome> {
        let EventPayload::ConclusaoMontagemKit(concluded) = payload else {
            return Err(unexpected_payload(self.event_type(), payload));
        };

        let mut group = load_group(tx, &concluded.grupo_id, &[ProductType::Kit]).await?;
        if group.guard(GroupTransition::ConcludeAssembly)? == Guard::AlreadyApplied {
            tracing::debug!(grupo_id = %group.id, status = %group.status, "kit already assembled");
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
            .of_type(ProductType::Kit);
        credit_product(tx, ctx, &mut ids, credit)?;

        let estimate = ctx
            .catalog
            .product(&group.target_product_id)
            .map(|p| p.tempo_montagem_estimado);
        let minutes = minutes_or_estimate(concluded.tempo_montagem_minutos, estimate, group.quantidade);
        record_time(tx, ctx, &mut ids, &group, ServiceKind::Montagem, minutes)?;

        transition_group(tx, ctx, &mut group, GroupTransition::ConcludeAssembly, None).await?;

        if group.is_root() {
            outcome
                .successors
                .push(EventPayload::EntradaKitEmbalagem(KitToPackaging {
                    kit_id: group.target_product_id.clone(),
                    quantidade: group.quantidade,
                    assembly_instance_id: group.assembly_instance_id.clone(),
                    pedido_id: group.order_id.clone(),
                    grupo_id: group.id.clone(),
                }));
        }

        Ok(outcome)
    }
}
