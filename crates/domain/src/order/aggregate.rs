//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::aggregate::Aggregate;
use crate::assembly_group::AssemblyGroup;
use crate::catalog::ProductType;
use crate::collections;
use crate::error::DomainError;

use super::{ItemStatus, OrderStatus};

/// One product line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub produto_id: String,
    pub tipo: ProductType,
    pub quantidade: Decimal,

    /// Derived from the item's assembly groups; never set directly.
    #[serde(default)]
    pub status_producao_item: ItemStatus,

    /// Root assembly group building this item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grupo_montagem_id: Option<String>,
}

impl LineItem {
    pub fn new(produto_id: impl Into<String>, tipo: ProductType, quantidade: Decimal) -> Self {
        Self {
            produto_id: produto_id.into(),
            tipo,
            quantidade,
            status_producao_item: ItemStatus::Aguardando,
            grupo_montagem_id: None,
        }
    }
}

/// A requested change to one line item's production status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineItemPatch {
    pub item_index: usize,
    pub status: ItemStatus,
}

impl LineItemPatch {
    pub fn new(item_index: usize, status: ItemStatus) -> Self {
        Self { item_index, status }
    }

    /// Patch mirroring a group's status onto the line item it builds.
    ///
    /// None when the group is not tied to an order line or its status does
    /// not move the item.
    pub fn for_group(group: &AssemblyGroup) -> Option<Self> {
        let item_index = group.item_index?;
        group.order_id.as_ref()?;
        let status = ItemStatus::for_group_status(group.is_root(), group.status)?;
        Some(Self { item_index, status })
    }
}

/// Customer order aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,

    /// Human-facing order number; older documents store it as a number.
    #[serde(deserialize_with = "string_or_number")]
    pub numero: String,

    #[serde(default)]
    pub status: OrderStatus,

    #[serde(default)]
    pub produtos: Vec<LineItem>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Aggregate for Order {
    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn collection() -> &'static str {
        collections::PEDIDOS
    }

    fn id(&self) -> &str {
        &self.id
    }
}

impl Order {
    /// Creates an order with every item waiting for production.
    pub fn new(id: impl Into<String>, numero: impl Into<String>, produtos: Vec<LineItem>) -> Self {
        let now = Utc::now();
        let mut order = Self {
            id: id.into(),
            numero: numero.into(),
            status: OrderStatus::Aguardando,
            produtos,
            created_at: now,
            updated_at: now,
        };
        order.status = rollup_status(order.status, &order.item_statuses());
        order
    }

    pub fn item_statuses(&self) -> Vec<ItemStatus> {
        self.produtos.iter().map(|p| p.status_producao_item).collect()
    }

    pub fn line_item(&self, index: usize) -> Option<&LineItem> {
        self.produtos.get(index)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Order status as a pure function of its line items.
///
/// A concluded order stays concluded. Otherwise: all items shipped is
/// `concluido`; all items ready or shipped is `processando_embalagem`; any
/// item not yet started is `aguardando`; anything else is `em_producao`.
pub fn rollup_status(current: OrderStatus, items: &[ItemStatus]) -> OrderStatus {
    if current == OrderStatus::Concluido {
        return OrderStatus::Concluido;
    }
    if items.is_empty() {
        return current;
    }
    if items.iter().all(|s| *s == ItemStatus::Concluido) {
        OrderStatus::Concluido
    } else if items.iter().all(ItemStatus::is_packaging_ready) {
        OrderStatus::ProcessandoEmbalagem
    } else if items.iter().any(ItemStatus::is_pre_production) {
        OrderStatus::Aguardando
    } else {
        OrderStatus::EmProducao
    }
}

/// The single reducer every order mutation goes through.
///
/// Items only move forward; a patch to an earlier or equal status leaves the
/// item unchanged. The order status is recomputed from the full
/// post-patch item list.
pub fn apply_patch(mut order: Order, patch: LineItemPatch) -> Result<Order, DomainError> {
    let count = order.produtos.len();
    let item = order.produtos.get_mut(patch.item_index).ok_or_else(|| {
        DomainError::validation(format!(
            "order {} has no line item {} ({} items)",
            order.id, patch.item_index, count
        ))
    })?;

    if patch.status.rank() > item.status_producao_item.rank() {
        item.status_producao_item = patch.status;
    }

    order.status = rollup_status(order.status, &order.item_statuses());
    Ok(order)
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}
