//! `criacao_pedido`: order intake and BOM expansion into assembly groups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use doc_store::Transaction;
use domain::bom::ROOT_NODE;
use domain::{
    AggregateStore, AssemblyGroup, BomExpansion, BomResolver, Fulfillment, FulfillmentSource,
    LineItem, Order, ProductType, RequiredComponent,
};

use super::support::unexpected_payload;
use super::{EventHandler, HandlerContext, HandlerOutcome};
use crate::error::{EngineError, Result};
use crate::event::{EventPayload, EventType};

/// Creates the order and one assembly group per node of each line item's
/// BOM above the part level.
///
/// Expansion is strict: a cycle or impossible quantity anywhere aborts the
/// whole intake before anything is staged.
pub struct OrderIntakeHandler;

#[async_trait]
impl EventHandler for OrderIntakeHandler {
    fn event_type(&self) -> EventType {
        EventType::CriacaoPedido
    }

    #[tracing::instrument(skip_all, fields(handler = "OrderIntake", event_id = %ctx.event.id))]
    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        tx: &mut Transaction<'_>,
        payload: &EventPayload,
    ) -> Result<HandlerOutcome> {
        let EventPayload::CriacaoPedido(intake) = payload else {
            return Err(unexpected_payload(self.event_type(), payload));
        };

        if tx.load::<Order>(&intake.pedido_id).await?.is_some() {
            tracing::debug!(order_id = %intake.pedido_id, "order already exists");
            return Ok(HandlerOutcome::noop());
        }

        let resolver = BomResolver::new(ctx.catalog);
        let mut outcome = HandlerOutcome::applied();
        let mut produtos = Vec::with_capacity(intake.produtos.len());
        let mut groups = Vec::new();

        for (index, item) in intake.produtos.iter().enumerate() {
            let expansion = resolver.expand(&item.produto_id, item.quantidade)?;
            if !expansion.root_type.has_assembly_group() {
                return Err(EngineError::validation(format!(
                    "product {} is a {} and cannot be ordered",
                    item.produto_id, expansion.root_type
                )));
            }
            if expansion.is_empty() {
                outcome.zero_component_items.push(index);
                tracing::warn!(
                    order_id = %intake.pedido_id,
                    item_index = index,
                    produto_id = %item.produto_id,
                    "line item expanded to zero components"
                );
            }

            let item_groups = groups_for_item(&intake.pedido_id, index, &expansion, ctx.event.timestamp);
            let mut line = LineItem::new(&item.produto_id, expansion.root_type, item.quantidade);
            line.grupo_montagem_id = item_groups.first().map(|g| g.id.clone());

            produtos.push(line);
            groups.extend(item_groups);
        }

        for group in &groups {
            tx.insert(group)?;
        }

        let numero = intake.numero.clone().unwrap_or_else(|| intake.pedido_id.clone());
        let mut order = Order::new(&intake.pedido_id, numero, produtos);
        order.created_at = ctx.event.timestamp;
        order.updated_at = ctx.event.timestamp;
        tx.insert(&order)?;

        tracing::info!(
            order_id = %order.id,
            items = order.produtos.len(),
            groups = groups.len(),
            "order intake staged"
        );
        Ok(outcome)
    }
}

fn group_id(order_id: &str, index: usize, node: &str) -> String {
    format!("{order_id}-{index}-{node}")
}

/// Builds the root group of a line item followed by its sub-groups.
///
/// Every group of the item shares one assembly instance id. Children that
/// are parts are printed by their piece group; any other child is built by
/// its own group.
fn groups_for_item(
    order_id: &str,
    index: usize,
    expansion: &BomExpansion,
    at: DateTime<Utc>,
) -> Vec<AssemblyGroup> {
    let instance = format!("{order_id}-{index}");

    let root = AssemblyGroup::new(
        group_id(order_id, index, ROOT_NODE),
        &expansion.root_id,
        expansion.root_type,
        expansion.requested_quantity,
        &instance,
    )
    .with_components(required_components(order_id, index, expansion, ROOT_NODE))
    .with_warnings(expansion.warnings.clone());

    let mut groups = vec![root];
    for component in &expansion.components {
        if !component.component_type.has_assembly_group() {
            continue;
        }
        groups.push(
            AssemblyGroup::new(
                group_id(order_id, index, &component.node),
                &component.component_id,
                component.component_type,
                component.total_quantity,
                &instance,
            )
            .with_parent(group_id(order_id, index, &component.parent_node))
            .with_components(required_components(order_id, index, expansion, &component.node)),
        );
    }

    groups
        .into_iter()
        .map(|g| {
            let mut g = g.for_order(order_id, index);
            g.created_at = at;
            g.updated_at = at;
            g
        })
        .collect()
}

fn required_components(
    order_id: &str,
    index: usize,
    expansion: &BomExpansion,
    node: &str,
) -> Vec<RequiredComponent> {
    expansion
        .children_of(node)
        .map(|child| {
            let fulfillment = if child.component_type == ProductType::Parte {
                Fulfillment {
                    origem: FulfillmentSource::Impressao,
                    grupo_id: None,
                    quantidade: child.total_quantity,
                    locais: Vec::new(),
                }
            } else {
                Fulfillment {
                    origem: FulfillmentSource::Producao,
                    grupo_id: Some(group_id(order_id, index, &child.node)),
                    quantidade: child.total_quantity,
                    locais: Vec::new(),
                }
            };
            RequiredComponent {
                component_id: child.component_id.clone(),
                component_type: child.component_type,
                quantidade_necessaria: child.total_quantity,
                fulfillment: vec![fulfillment],
            }
        })
        .collect()
}
