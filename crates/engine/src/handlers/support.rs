//! Pieces shared by several handlers.

use doc_store::Transaction;
use domain::ledger::{record_product_movement, record_service_time, record_supply_movement};
use domain::{
    AggregateStore, AssemblyGroup, ChangeContext, EntryIds, GroupTransition, Guard, LedgerItem,
    LineItemPatch, Order, ProductType, ServiceKind, ServiceTimeEntry, StockMovement,
    SupplyMovement, apply_patch,
};
use rust_decimal::Decimal;

use super::{HandlerContext, HandlerOutcome};
use crate::error::{EngineError, Result};
use crate::event::{EventPayload, EventType, SupplyConsumption};

pub(super) fn unexpected_payload(expected: EventType, payload: &EventPayload) -> EngineError {
    EngineError::SchemaMismatch {
        declared: expected.as_str().to_string(),
        found: payload.event_type().as_str().to_string(),
    }
}

pub(super) fn change_context(ctx: &HandlerContext<'_>, note: Option<String>) -> ChangeContext {
    ChangeContext::new(ctx.event.id.clone(), ctx.event.actor_id.clone(), ctx.event.timestamp)
        .with_note(note)
}

/// Loads a group, rejecting it if it builds a product of another kind.
pub(super) async fn load_group(
    tx: &mut Transaction<'_>,
    grupo_id: &str,
    accepted: &[ProductType],
) -> Result<AssemblyGroup> {
    let group: AssemblyGroup = tx.require(grupo_id).await?;
    if !accepted.is_empty() && !accepted.contains(&group.target_product_type) {
        return Err(EngineError::validation(format!(
            "group {grupo_id} builds a {}, expected one of {:?}",
            group.target_product_type, accepted
        )));
    }
    Ok(group)
}

/// Applies a transition, saves the group and mirrors its status onto the
/// order line item it builds.
pub(super) async fn transition_group(
    tx: &mut Transaction<'_>,
    ctx: &HandlerContext<'_>,
    group: &mut AssemblyGroup,
    transition: GroupTransition,
    note: Option<String>,
) -> Result<Guard> {
    let guard = group.apply(transition, &change_context(ctx, note))?;
    if guard == Guard::AlreadyApplied {
        return Ok(guard);
    }

    tx.save(&*group)?;
    sync_order(tx, ctx, group).await?;
    Ok(guard)
}

/// Pushes a group's status into its order through the line item reducer.
async fn sync_order(
    tx: &mut Transaction<'_>,
    ctx: &HandlerContext<'_>,
    group: &AssemblyGroup,
) -> Result<()> {
    let (Some(order_id), Some(patch)) = (&group.order_id, LineItemPatch::for_group(group)) else {
        return Ok(());
    };

    let order: Order = tx.require(order_id).await?;
    let before = order.clone();
    let mut order = apply_patch(order, patch)?;
    if order != before {
        order.updated_at = ctx.event.timestamp;
        tx.save(&order)?;
        tracing::debug!(
            order_id = %order.id,
            item_index = patch.item_index,
            status = %order.status,
            "order rolled up"
        );
    }
    Ok(())
}

pub(super) fn product_entry(
    ctx: &HandlerContext<'_>,
    ids: &mut EntryIds,
    movement: StockMovement,
) -> StockMovement {
    let movement = StockMovement {
        id: ids.next_id(),
        ..movement
    };
    movement
        .by(ctx.event.actor_id.clone())
        .at_time(ctx.event.timestamp)
        .for_event(ctx.event.id.clone())
}

/// Records a product credit.
pub(super) fn credit_product(
    tx: &mut Transaction<'_>,
    ctx: &HandlerContext<'_>,
    ids: &mut EntryIds,
    movement: StockMovement,
) -> Result<()> {
    record_product_movement(tx, &product_entry(ctx, ids, movement))?;
    Ok(())
}

/// Records a product debit and remembers it for the over-debit check.
pub(super) fn debit_product(
    tx: &mut Transaction<'_>,
    ctx: &HandlerContext<'_>,
    ids: &mut EntryIds,
    outcome: &mut HandlerOutcome,
    movement: StockMovement,
) -> Result<()> {
    let movement = product_entry(ctx, ids, movement);
    record_product_movement(tx, &movement)?;
    outcome.debit(LedgerItem::Product, movement.produto_id);
    Ok(())
}

/// Records one supply debit per consumption line.
pub(super) fn consume_supplies(
    tx: &mut Transaction<'_>,
    ctx: &HandlerContext<'_>,
    ids: &mut EntryIds,
    outcome: &mut HandlerOutcome,
    consumption: &[SupplyConsumption],
) -> Result<()> {
    for line in consumption {
        let movement = SupplyMovement::saida(ids.next_id(), &line.insumo_id, line.quantidade)
            .at(line.locais.clone())
            .by(ctx.event.actor_id.clone())
            .at_time(ctx.event.timestamp)
            .for_event(ctx.event.id.clone());
        record_supply_movement(tx, &movement)?;
        outcome.debit(LedgerItem::Supply, line.insumo_id.clone());
    }
    Ok(())
}

/// Records service time for a group, unless there is none to record.
pub(super) fn record_time(
    tx: &mut Transaction<'_>,
    ctx: &HandlerContext<'_>,
    ids: &mut EntryIds,
    group: &AssemblyGroup,
    servico: ServiceKind,
    minutos: Decimal,
) -> Result<()> {
    if minutos <= Decimal::ZERO {
        return Ok(());
    }
    let entry = ServiceTimeEntry::new(ids.next_id(), servico, minutos)
        .for_group(group.id.clone(), group.target_product_id.clone())
        .by(ctx.event.actor_id.clone())
        .at_time(ctx.event.timestamp)
        .for_event(ctx.event.id.clone());
    record_service_time(tx, &entry)?;
    Ok(())
}

/// Reported minutes, or the catalog estimate for the whole batch.
pub(super) fn minutes_or_estimate(
    reported: Option<Decimal>,
    estimate_per_unit: Option<Decimal>,
    quantidade: Decimal,
) -> Decimal {
    reported.unwrap_or_else(|| estimate_per_unit.unwrap_or(Decimal::ZERO) * quantidade)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reported_minutes_win_over_estimate() {
        let q = Decimal::from(4);
        assert_eq!(
            minutes_or_estimate(Some(Decimal::from(90)), Some(Decimal::from(30)), q),
            Decimal::from(90)
        );
        assert_eq!(
            minutes_or_estimate(None, Some(Decimal::from(30)), q),
            Decimal::from(120)
        );
        assert_eq!(minutes_or_estimate(None, None, q), Decimal::ZERO);
    }
}
