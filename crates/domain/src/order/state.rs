//! Order and line item statuses.

use serde::{Deserialize, Serialize};

use crate::assembly_group::GroupStatus;

/// The status of an order, always derived from its line items.
///
/// ```text
/// aguardando ──► em_producao ──► processando_embalagem ──► concluido
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// At least one line item has not started production.
    #[default]
    Aguardando,

    /// Every item started, some still being built.
    EmProducao,

    /// Every item is ready for packaging or shipped.
    ProcessandoEmbalagem,

    /// Shipped (terminal state).
    Concluido,
}

impl OrderStatus {
    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Concluido)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Aguardando => "aguardando",
            OrderStatus::EmProducao => "em_producao",
            OrderStatus::ProcessandoEmbalagem => "processando_embalagem",
            OrderStatus::Concluido => "concluido",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Production status of one line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Aguardando,
    EmProducao,
    ProntoParaEmbalagem,
    Concluido,
}

impl ItemStatus {
    /// Position on the forward-only item lifecycle.
    pub fn rank(&self) -> u8 {
        match self {
            ItemStatus::Aguardando => 0,
            ItemStatus::EmProducao => 1,
            ItemStatus::ProntoParaEmbalagem => 2,
            ItemStatus::Concluido => 3,
        }
    }

    /// Returns true if the item has not started production.
    pub fn is_pre_production(&self) -> bool {
        matches!(self, ItemStatus::Aguardando)
    }

    /// Returns true if the item is ready to ship or already shipped.
    pub fn is_packaging_ready(&self) -> bool {
        matches!(self, ItemStatus::ProntoParaEmbalagem | ItemStatus::Concluido)
    }

    /// Item status mirrored from the status of an assembly group.
    ///
    /// Sub-groups only ever move their item into production; readiness for
    /// packaging is decided by the root group alone.
    pub fn for_group_status(is_root: bool, status: GroupStatus) -> Option<Self> {
        match status {
            GroupStatus::Aguardando | GroupStatus::AguardandoMontagem => None,
            GroupStatus::EmProducao | GroupStatus::Produzido => Some(ItemStatus::EmProducao),
            GroupStatus::Montado if is_root => Some(ItemStatus::ProntoParaEmbalagem),
            GroupStatus::Concluido if is_root => Some(ItemStatus::Concluido),
            GroupStatus::Montado | GroupStatus::Concluido => Some(ItemStatus::EmProducao),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Aguardando => "aguardando",
            ItemStatus::EmProducao => "em_producao",
            ItemStatus::ProntoParaEmbalagem => "pronto_para_embalagem",
            ItemStatus::Concluido => "concluido",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
