//! Assembly group aggregate implementation.

use chrono::{DateTime, Utc};
use common::ActorId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::bom::BomWarning;
use crate::catalog::ProductType;
use crate::collections;
use crate::error::DomainError;
use crate::ledger::LocationAllocation;

use super::GroupStatus;

/// Where a required component comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentSource {
    /// Built by another assembly group, then credited to stock.
    Producao,
    /// Taken from existing stock.
    Estoque,
    /// Printed in this group's own run; never enters stock.
    Impressao,
}

/// One source supplying part of a required component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fulfillment {
    pub origem: FulfillmentSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grupo_id: Option<String>,

    pub quantidade: Decimal,

    #[serde(default)]
    pub locais: Vec<LocationAllocation>,
}

/// A component the group consumes, at batch quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredComponent {
    pub component_id: String,
    pub component_type: ProductType,
    pub quantidade_necessaria: Decimal,

    #[serde(default)]
    pub fulfillment: Vec<Fulfillment>,
}

impl RequiredComponent {
    /// Returns true if the component is printed as part of the group itself.
    pub fn is_printed_in_group(&self) -> bool {
        !self.fulfillment.is_empty()
            && self
                .fulfillment
                .iter()
                .all(|f| f.origem == FulfillmentSource::Impressao)
    }
}

/// A stock debit the group owes when it completes assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedDebit {
    pub component_id: String,
    pub component_type: ProductType,
    pub quantidade: Decimal,
    pub locais: Vec<LocationAllocation>,
}

/// One entry of the status audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub de: GroupStatus,
    pub para: GroupStatus,
    pub evento_id: String,
    pub actor_id: ActorId,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observacao: Option<String>,
}

/// A requested status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupTransition {
    StartProduction,
    ConcludeProduction,
    ConcludeAssembly,
    Complete,
    /// `em_producao` back to `aguardando`.
    Revert,
    /// A strictly later state on the group's path that carries no stock
    /// effects (see [`GroupStatus::is_side_effect_free`]).
    AdvanceTo(GroupStatus),
}

impl GroupTransition {
    /// Status the group ends up in.
    pub fn target(&self) -> GroupStatus {
        match self {
            GroupTransition::StartProduction => GroupStatus::EmProducao,
            GroupTransition::ConcludeProduction => GroupStatus::Produzido,
            GroupTransition::ConcludeAssembly => GroupStatus::Montado,
            GroupTransition::Complete => GroupStatus::Concluido,
            GroupTransition::Revert => GroupStatus::Aguardando,
            GroupTransition::AdvanceTo(status) => *status,
        }
    }

    fn allowed_from(&self, status: GroupStatus) -> bool {
        match self {
            GroupTransition::StartProduction => status.can_start_production(),
            GroupTransition::ConcludeProduction => status.can_conclude_production(),
            GroupTransition::ConcludeAssembly => status.can_conclude_assembly(),
            GroupTransition::Complete => status.can_complete(),
            GroupTransition::Revert => status.can_revert(),
            GroupTransition::AdvanceTo(_) => true,
        }
    }
}

/// Outcome of the idempotency guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// The transition must be applied.
    Apply,
    /// The group is already in (or past) the target state; replaying is a no-op.
    AlreadyApplied,
}

/// Who and what caused a status change.
#[derive(Debug, Clone)]
pub struct ChangeContext {
    pub event_id: String,
    pub actor: ActorId,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

impl ChangeContext {
    pub fn new(event_id: impl Into<String>, actor: ActorId, at: DateTime<Utc>) -> Self {
        Self {
            event_id: event_id.into(),
            actor,
            at,
            note: None,
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }
}

/// One batch of identical pieces, models or kits built together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyGroup {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,

    /// Index of the order line item this group builds for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_index: Option<usize>,

    pub target_product_id: String,
    pub target_product_type: ProductType,

    /// Units of the target product in this batch.
    pub quantidade: Decimal,

    pub status: GroupStatus,

    #[serde(default)]
    pub required_components: Vec<RequiredComponent>,

    pub assembly_instance_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_group_id: Option<String>,

    #[serde(default)]
    pub warnings: Vec<BomWarning>,

    #[serde(default)]
    pub status_history: Vec<StatusChange>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Aggregate for AssemblyGroup {
    fn aggregate_type() -> &'static str {
        "AssemblyGroup"
    }

    fn collection() -> &'static str {
        collections::GRUPOS_MONTAGEM
    }

    fn id(&self) -> &str {
        &self.id
    }
}

// Construction
impl AssemblyGroup {
    /// Creates a group in the initial status for its product type.
    pub fn new(
        id: impl Into<String>,
        target_product_id: impl Into<String>,
        target_product_type: ProductType,
        quantidade: Decimal,
        assembly_instance_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            order_id: None,
            item_index: None,
            target_product_id: target_product_id.into(),
            target_product_type,
            quantidade,
            status: GroupStatus::initial_for(target_product_type),
            required_components: Vec::new(),
            assembly_instance_id: assembly_instance_id.into(),
            parent_group_id: None,
            warnings: Vec::new(),
            status_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn for_order(mut self, order_id: impl Into<String>, item_index: usize) -> Self {
        self.order_id = Some(order_id.into());
        self.item_index = Some(item_index);
        self
    }

    pub fn with_parent(mut self, parent_group_id: impl Into<String>) -> Self {
        self.parent_group_id = Some(parent_group_id.into());
        self
    }

    pub fn with_components(mut self, components: Vec<RequiredComponent>) -> Self {
        self.required_components = components;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<BomWarning>) -> Self {
        self.warnings = warnings;
        self
    }
}

// Query methods
impl AssemblyGroup {
    /// Returns true if the group builds an order line item directly.
    pub fn is_root(&self) -> bool {
        self.parent_group_id.is_none()
    }

    /// Debits owed on assembly: every required component at its planned
    /// quantity, except what the group printed itself.
    ///
    /// Each fulfillment entry becomes its own debit at the recorded
    /// locations; any unfulfilled remainder is debited without location.
    pub fn assembly_debits(&self) -> Vec<PlannedDebit> {
        let mut debits = Vec::new();

        for component in &self.required_components {
            if component.is_printed_in_group() {
                continue;
            }

            let mut remaining = component.quantidade_necessaria;
            for fulfillment in &component.fulfillment {
                if fulfillment.origem == FulfillmentSource::Impressao
                    || fulfillment.quantidade <= Decimal::ZERO
                {
                    continue;
                }
                let quantidade = fulfillment.quantidade.min(remaining);
                if quantidade <= Decimal::ZERO {
                    break;
                }

                let allocated: Decimal = fulfillment.locais.iter().map(|l| l.quantidade).sum();
                let locais = if allocated == quantidade {
                    fulfillment.locais.clone()
                } else {
                    Vec::new()
                };

                debits.push(PlannedDebit {
                    component_id: component.component_id.clone(),
                    component_type: component.component_type,
                    quantidade,
                    locais,
                });
                remaining -= quantidade;
            }

            if remaining > Decimal::ZERO {
                debits.push(PlannedDebit {
                    component_id: component.component_id.clone(),
                    component_type: component.component_type,
                    quantidade: remaining,
                    locais: Vec::new(),
                });
            }
        }

        debits
    }
}

// Command methods
impl AssemblyGroup {
    /// The centralized idempotency guard.
    ///
    /// A replay against a group already in or past the target state is
    /// `AlreadyApplied`. A reversal is a no-op only once the group is back
    /// at `aguardando`; a generic advance rejects regressions and never
    /// reaches `montado` or `concluido`.
    pub fn guard(&self, transition: GroupTransition) -> Result<Guard, DomainError> {
        let target = transition.target();
        let tipo = self.target_product_type;

        if let GroupTransition::Revert = transition {
            return match self.status {
                GroupStatus::Aguardando => Ok(Guard::AlreadyApplied),
                status if status.can_revert() => Ok(Guard::Apply),
                _ => Err(self.invalid(target)),
            };
        }

        let (Some(current), Some(wanted)) = (self.status.position(tipo), target.position(tipo))
        else {
            return Err(self.invalid(target));
        };

        if let GroupTransition::AdvanceTo(_) = transition {
            if !target.is_side_effect_free() {
                return Err(self.invalid(target));
            }
            return match current.cmp(&wanted) {
                std::cmp::Ordering::Equal => Ok(Guard::AlreadyApplied),
                std::cmp::Ordering::Greater => Err(self.invalid(target)),
                std::cmp::Ordering::Less => Ok(Guard::Apply),
            };
        }

        if current >= wanted {
            Ok(Guard::AlreadyApplied)
        } else if transition.allowed_from(self.status) {
            Ok(Guard::Apply)
        } else {
            Err(self.invalid(target))
        }
    }

    /// Applies a transition after passing it through [`AssemblyGroup::guard`].
    pub fn apply(
        &mut self,
        transition: GroupTransition,
        change: &ChangeContext,
    ) -> Result<Guard, DomainError> {
        let guard = self.guard(transition)?;
        if guard == Guard::AlreadyApplied {
            return Ok(guard);
        }

        let target = transition.target();
        self.status_history.push(StatusChange {
            de: self.status,
            para: target,
            evento_id: change.event_id.clone(),
            actor_id: change.actor.clone(),
            timestamp: change.at,
            observacao: change.note.clone(),
        });
        self.status = target;
        self.updated_at = change.at;

        Ok(Guard::Apply)
    }

    fn invalid(&self, target: GroupStatus) -> DomainError {
        DomainError::InvalidTransition {
            entity: "AssemblyGroup",
            id: self.id.clone(),
            from: self.status.to_string(),
            to: target.to_string(),
        }
    }
}
