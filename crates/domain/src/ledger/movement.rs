//! Append-only ledger records.

use chrono::{DateTime, Utc};
use common::ActorId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::ProductType;
use crate::error::DomainError;

/// Direction of a movement. Quantities are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Entrada,
    Saida,
    /// Inventory correction. Counted as an increase; shortfalls found during
    /// a count are recorded as `saida`.
    Ajuste,
}

impl MovementType {
    /// Sign applied to the quantity when computing balances.
    pub fn sign(&self) -> Decimal {
        match self {
            MovementType::Entrada | MovementType::Ajuste => Decimal::ONE,
            MovementType::Saida => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Entrada => "entrada",
            MovementType::Saida => "saida",
            MovementType::Ajuste => "ajuste",
        }
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where (part of) a movement physically happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationAllocation {
    pub local_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipiente_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub divisao: Option<String>,

    pub quantidade: Decimal,
}

impl LocationAllocation {
    pub fn new(local_id: impl Into<String>, quantidade: Decimal) -> Self {
        Self {
            local_id: local_id.into(),
            recipiente_id: None,
            divisao: None,
            quantidade,
        }
    }
}

/// Checks the positive-quantity invariant and that allocations add up.
pub fn validate_quantities(
    item_id: &str,
    quantidade: Decimal,
    locais: &[LocationAllocation],
) -> Result<(), DomainError> {
    if item_id.trim().is_empty() {
        return Err(DomainError::validation("movement without item id"));
    }
    if quantidade <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "movement quantity for {item_id} must be positive, got {quantidade}"
        )));
    }
    if locais.is_empty() {
        return Ok(());
    }

    for local in locais {
        if local.local_id.trim().is_empty() || local.quantidade <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "invalid location allocation for {item_id}: {:?}",
                local
            )));
        }
    }

    let allocated: Decimal = locais.iter().map(|l| l.quantidade).sum();
    if allocated != quantidade {
        return Err(DomainError::validation(format!(
            "allocations for {item_id} add up to {allocated}, movement is {quantidade}"
        )));
    }

    Ok(())
}

/// Movement of a finished or intermediate product (`lancamentos_produtos`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: String,
    pub produto_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo_produto: Option<ProductType>,

    pub tipo_movimento: MovementType,
    pub quantidade: Decimal,

    #[serde(default)]
    pub locais: Vec<LocationAllocation>,

    pub timestamp: DateTime<Utc>,
    pub actor_id: ActorId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observacao: Option<String>,

    /// Destination of produced overage (`estoque` or `montagem`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destino: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evento_id: Option<String>,
}

impl StockMovement {
    pub fn new(
        id: impl Into<String>,
        produto_id: impl Into<String>,
        tipo_movimento: MovementType,
        quantidade: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            produto_id: produto_id.into(),
            tipo_produto: None,
            tipo_movimento,
            quantidade,
            locais: Vec::new(),
            timestamp: Utc::now(),
            actor_id: ActorId::system(),
            observacao: None,
            destino: None,
            evento_id: None,
        }
    }

    pub fn entrada(id: impl Into<String>, produto_id: impl Into<String>, quantidade: Decimal) -> Self {
        Self::new(id, produto_id, MovementType::Entrada, quantidade)
    }

    pub fn saida(id: impl Into<String>, produto_id: impl Into<String>, quantidade: Decimal) -> Self {
        Self::new(id, produto_id, MovementType::Saida, quantidade)
    }

    pub fn of_type(mut self, tipo: ProductType) -> Self {
        self.tipo_produto = Some(tipo);
        self
    }

    pub fn at(mut self, locais: Vec<LocationAllocation>) -> Self {
        self.locais = locais;
        self
    }

    pub fn by(mut self, actor: ActorId) -> Self {
        self.actor_id = actor;
        self
    }

    pub fn at_time(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn for_event(mut self, event_id: impl Into<String>) -> Self {
        self.evento_id = Some(event_id.into());
        self
    }

    pub fn note(mut self, observacao: impl Into<String>) -> Self {
        self.observacao = Some(observacao.into());
        self
    }

    pub fn destined_to(mut self, destino: impl Into<String>) -> Self {
        self.destino = Some(destino.into());
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validate_quantities(&self.produto_id, self.quantidade, &self.locais)
    }
}

/// Movement of a raw material (`lancamentos_insumos`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyMovement {
    pub id: String,
    pub insumo_id: String,
    pub tipo_movimento: MovementType,
    pub quantidade: Decimal,

    #[serde(default)]
    pub locais: Vec<LocationAllocation>,

    pub timestamp: DateTime<Utc>,
    pub actor_id: ActorId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observacao: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evento_id: Option<String>,
}

impl SupplyMovement {
    pub fn new(
        id: impl Into<String>,
        insumo_id: impl Into<String>,
        tipo_movimento: MovementType,
        quantidade: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            insumo_id: insumo_id.into(),
            tipo_movimento,
            quantidade,
            locais: Vec::new(),
            timestamp: Utc::now(),
            actor_id: ActorId::system(),
            observacao: None,
            evento_id: None,
        }
    }

    pub fn saida(id: impl Into<String>, insumo_id: impl Into<String>, quantidade: Decimal) -> Self {
        Self::new(id, insumo_id, MovementType::Saida, quantidade)
    }

    pub fn at(mut self, locais: Vec<LocationAllocation>) -> Self {
        self.locais = locais;
        self
    }

    pub fn by(mut self, actor: ActorId) -> Self {
        self.actor_id = actor;
        self
    }

    pub fn at_time(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn for_event(mut self, event_id: impl Into<String>) -> Self {
        self.evento_id = Some(event_id.into());
        self
    }

    pub fn note(mut self, observacao: impl Into<String>) -> Self {
        self.observacao = Some(observacao.into());
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validate_quantities(&self.insumo_id, self.quantidade, &self.locais)
    }
}

/// Kind of labour recorded in a service-time entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Impressao,
    Montagem,
    Embalagem,
}

/// Machine or labour time spent on a group (`lancamentos_servicos`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTimeEntry {
    pub id: String,
    pub servico: ServiceKind,
    pub minutos: Decimal,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grupo_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produto_id: Option<String>,

    pub timestamp: DateTime<Utc>,
    pub actor_id: ActorId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evento_id: Option<String>,
}

impl ServiceTimeEntry {
    pub fn new(id: impl Into<String>, servico: ServiceKind, minutos: Decimal) -> Self {
        Self {
            id: id.into(),
            servico,
            minutos,
            grupo_id: None,
            produto_id: None,
            timestamp: Utc::now(),
            actor_id: ActorId::system(),
            evento_id: None,
        }
    }

    pub fn for_group(mut self, grupo_id: impl Into<String>, produto_id: impl Into<String>) -> Self {
        self.grupo_id = Some(grupo_id.into());
        self.produto_id = Some(produto_id.into());
        self
    }

    pub fn by(mut self, actor: ActorId) -> Self {
        self.actor_id = actor;
        self
    }

    pub fn at_time(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn for_event(mut self, event_id: impl Into<String>) -> Self {
        self.evento_id = Some(event_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.minutos <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "service time must be positive, got {}",
                self.minutos
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[test]
    fn movement_type_signs() {
        assert_eq!(MovementType::Entrada.sign(), dec(1));
        assert_eq!(MovementType::Ajuste.sign(), dec(1));
        assert_eq!(MovementType::Saida.sign(), dec(-1));
    }

    #[test]
    fn rejects_non_positive_quantities() {
        assert!(StockMovement::saida("L1", "K1", dec(0)).validate().is_err());
        assert!(StockMovement::saida("L1", "K1", dec(-2)).validate().is_err());
        assert!(SupplyMovement::saida("L1", "PLA", dec(3)).validate().is_ok());
    }

    #[test]
    fn allocations_must_add_up() {
        let ok = StockMovement::entrada("L1", "P1", dec(5)).at(vec![
            LocationAllocation::new("A1", dec(2)),
            LocationAllocation::new("A2", dec(3)),
        ]);
        assert!(ok.validate().is_ok());

        let short = StockMovement::entrada("L1", "P1", dec(5))
            .at(vec![LocationAllocation::new("A1", dec(2))]);
        assert!(short.validate().is_err());
    }

    #[test]
    fn service_time_must_be_positive() {
        assert!(ServiceTimeEntry::new("S1", ServiceKind::Impressao, dec(0)).validate().is_err());
        assert!(ServiceTimeEntry::new("S1", ServiceKind::Montagem, dec(12)).validate().is_ok());
    }

    #[test]
    fn serializes_with_dashboard_field_names() {
        let movement = StockMovement::saida("L1", "M1", dec(2)).for_event("E1");
        let json = serde_json::to_value(&movement).unwrap();
        assert_eq!(json["produtoId"], "M1");
        assert_eq!(json["tipoMovimento"], "saida");
        assert_eq!(json["eventoId"], "E1");
        assert_eq!(json["actorId"], "sistema");
    }
}
