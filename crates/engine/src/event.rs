//! The production event envelope and its typed payloads.

use chrono::{DateTime, Utc};
use common::ActorId;
use doc_store::Document;
use domain::{GroupStatus, LocationAllocation};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};

/// Kinds of production events, one handler each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CriacaoPedido,
    InicioProducao,
    ConclusaoProducao,
    ConclusaoMontagemPeca,
    ConclusaoMontagemModelo,
    ConclusaoMontagemKit,
    EntradaKitEmbalagem,
    AtualizacaoStatusGrupoOtimizado,
    ReversaoStatusGrupoOtimizado,
    ConclusaoEmbalagem,
}

impl EventType {
    pub const ALL: [EventType; 10] = [
        EventType::CriacaoPedido,
        EventType::InicioProducao,
        EventType::ConclusaoProducao,
        EventType::ConclusaoMontagemPeca,
        EventType::ConclusaoMontagemModelo,
        EventType::ConclusaoMontagemKit,
        EventType::EntradaKitEmbalagem,
        EventType::AtualizacaoStatusGrupoOtimizado,
        EventType::ReversaoStatusGrupoOtimizado,
        EventType::ConclusaoEmbalagem,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == raw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CriacaoPedido => "criacao_pedido",
            EventType::InicioProducao => "inicio_producao",
            EventType::ConclusaoProducao => "conclusao_producao",
            EventType::ConclusaoMontagemPeca => "conclusao_montagem_peca",
            EventType::ConclusaoMontagemModelo => "conclusao_montagem_modelo",
            EventType::ConclusaoMontagemKit => "conclusao_montagem_kit",
            EventType::EntradaKitEmbalagem => "entrada_kit_embalagem",
            EventType::AtualizacaoStatusGrupoOtimizado => "atualizacao_status_grupo_otimizado",
            EventType::ReversaoStatusGrupoOtimizado => "reversao_status_grupo_otimizado",
            EventType::ConclusaoEmbalagem => "conclusao_embalagem",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable production event as stored in `eventos_producao`.
///
/// `event_type` is kept raw so that events written with a type this engine
/// does not know can still be read, reported and receipted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionEvent {
    pub id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub actor_id: ActorId,

    pub payload: Value,
}

/// Stored shape tolerated on read: id and timestamp may be left to the store.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEvent {
    #[serde(default)]
    id: Option<String>,
    event_type: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    actor_id: Option<String>,
    #[serde(default)]
    payload: Value,
}

impl ProductionEvent {
    /// Creates an event carrying `payload`, typed after it.
    pub fn new(id: impl Into<String>, payload: &EventPayload) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            event_type: payload.event_type().as_str().to_string(),
            timestamp: Utc::now(),
            actor_id: ActorId::system(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Creates an event from raw parts, without checking them.
    pub fn raw(id: impl Into<String>, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            actor_id: ActorId::system(),
            payload,
        }
    }

    pub fn by(mut self, actor: ActorId) -> Self {
        self.actor_id = actor;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Reads an event document, filling id and timestamp from the document
    /// when the body omits them.
    pub fn from_document(document: Document) -> Result<Self> {
        let stored: StoredEvent = document.body_as().map_err(|e| {
            EngineError::validation(format!("event {} is malformed: {e}", document.id))
        })?;
        Ok(Self {
            id: stored.id.unwrap_or_else(|| document.id.clone()),
            event_type: stored.event_type,
            timestamp: stored.timestamp.unwrap_or(document.created_at),
            actor_id: ActorId::from(stored.actor_id),
            payload: stored.payload,
        })
    }

    /// Resolves the declared type and decodes the payload against it.
    ///
    /// Checks, in order: the type is known, the payload carries a `type`
    /// tag, the tag matches the declared type, the payload has the shape of
    /// that type and its fields are valid.
    pub fn decode(&self) -> Result<(EventType, EventPayload)> {
        let kind = EventType::parse(&self.event_type)
            .ok_or_else(|| EngineError::UnknownEventType(self.event_type.clone()))?;

        let tag = self
            .payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EngineError::validation(format!("payload of event {} has no type tag", self.id))
            })?;
        if tag != kind.as_str() {
            return Err(EngineError::SchemaMismatch {
                declared: kind.as_str().to_string(),
                found: tag.to_string(),
            });
        }

        let payload: EventPayload = serde_json::from_value(self.payload.clone()).map_err(|e| {
            EngineError::validation(format!("payload of event {} ({kind}): {e}", self.id))
        })?;
        payload.validate()?;

        Ok((kind, payload))
    }
}

/// Payload of every event type, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    CriacaoPedido(OrderIntake),
    InicioProducao(ProductionStarted),
    ConclusaoProducao(ProductionConcluded),
    ConclusaoMontagemPeca(AssemblyConcluded),
    ConclusaoMontagemModelo(AssemblyConcluded),
    ConclusaoMontagemKit(AssemblyConcluded),
    EntradaKitEmbalagem(KitToPackaging),
    AtualizacaoStatusGrupoOtimizado(StatusUpdate),
    ReversaoStatusGrupoOtimizado(StatusReversal),
    ConclusaoEmbalagem(PackagingConcluded),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::CriacaoPedido(_) => EventType::CriacaoPedido,
            EventPayload::InicioProducao(_) => EventType::InicioProducao,
            EventPayload::ConclusaoProducao(_) => EventType::ConclusaoProducao,
            EventPayload::ConclusaoMontagemPeca(_) => EventType::ConclusaoMontagemPeca,
            EventPayload::ConclusaoMontagemModelo(_) => EventType::ConclusaoMontagemModelo,
            EventPayload::ConclusaoMontagemKit(_) => EventType::ConclusaoMontagemKit,
            EventPayload::EntradaKitEmbalagem(_) => EventType::EntradaKitEmbalagem,
            EventPayload::AtualizacaoStatusGrupoOtimizado(_) => {
                EventType::AtualizacaoStatusGrupoOtimizado
            }
            EventPayload::ReversaoStatusGrupoOtimizado(_) => EventType::ReversaoStatusGrupoOtimizado,
            EventPayload::ConclusaoEmbalagem(_) => EventType::ConclusaoEmbalagem,
        }
    }

    /// Field checks serde cannot express.
    pub fn validate(&self) -> Result<()> {
        match self {
            EventPayload::CriacaoPedido(p) => {
                require_id("pedidoId", &p.pedido_id)?;
                if p.produtos.is_empty() {
                    return Err(EngineError::validation("order has no products"));
                }
                for (index, item) in p.produtos.iter().enumerate() {
                    require_id(&format!("produtos[{index}].produtoId"), &item.produto_id)?;
                    require_positive(&format!("produtos[{index}].quantidade"), item.quantidade)?;
                }
                Ok(())
            }
            EventPayload::InicioProducao(p) => require_id("grupoId", &p.grupo_id),
            EventPayload::ConclusaoProducao(p) => {
                require_id("grupoId", &p.grupo_id)?;
                validate_consumption("consumoInsumos", &p.consumo_insumos)?;
                if let Some(minutes) = p.tempo_impressao_minutos {
                    require_positive("tempoImpressaoMinutos", minutes)?;
                }
                for (index, overage) in p.excedentes.iter().enumerate() {
                    require_id(&format!("excedentes[{index}].produtoId"), &overage.produto_id)?;
                    require_positive(&format!("excedentes[{index}].quantidade"), overage.quantidade)?;
                }
                Ok(())
            }
            EventPayload::ConclusaoMontagemPeca(p)
            | EventPayload::ConclusaoMontagemModelo(p)
            | EventPayload::ConclusaoMontagemKit(p) => {
                require_id("grupoId", &p.grupo_id)?;
                if let Some(minutes) = p.tempo_montagem_minutos {
                    require_positive("tempoMontagemMinutos", minutes)?;
                }
                Ok(())
            }
            EventPayload::EntradaKitEmbalagem(p) => {
                require_id("kitId", &p.kit_id)?;
                require_id("assemblyInstanceId", &p.assembly_instance_id)?;
                require_id("grupoId", &p.grupo_id)?;
                require_positive("quantidade", p.quantidade)
            }
            EventPayload::AtualizacaoStatusGrupoOtimizado(p) => require_id("grupoId", &p.grupo_id),
            EventPayload::ReversaoStatusGrupoOtimizado(p) => require_id("grupoId", &p.grupo_id),
            EventPayload::ConclusaoEmbalagem(p) => {
                require_id("assemblyInstanceId", &p.assembly_instance_id)?;
                validate_consumption("consumoEmbalagem", &p.consumo_embalagem)?;
                if let Some(minutes) = p.tempo_embalagem_minutos {
                    require_positive("tempoEmbalagemMinutos", minutes)?;
                }
                Ok(())
            }
        }
    }
}

fn require_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(format!("{field} is blank")));
    }
    Ok(())
}

fn require_positive(field: &str, value: Decimal) -> Result<()> {
    if value <= Decimal::ZERO {
        return Err(EngineError::validation(format!(
            "{field} must be positive, got {value}"
        )));
    }
    Ok(())
}

fn validate_consumption(field: &str, consumption: &[SupplyConsumption]) -> Result<()> {
    for (index, c) in consumption.iter().enumerate() {
        require_id(&format!("{field}[{index}].insumoId"), &c.insumo_id)?;
        domain::ledger::validate_quantities(&c.insumo_id, c.quantidade, &c.locais)?;
    }
    Ok(())
}

/// One line of an incoming order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeItem {
    pub produto_id: String,
    pub quantidade: Decimal,
}

/// `criacao_pedido`: a new order from the intake form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderIntake {
    pub pedido_id: String,

    /// Defaults to the order id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numero: Option<String>,

    pub produtos: Vec<IntakeItem>,
}

/// `inicio_producao`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionStarted {
    pub grupo_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observacao: Option<String>,
}

/// Raw material actually consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyConsumption {
    pub insumo_id: String,
    pub quantidade: Decimal,

    #[serde(default)]
    pub locais: Vec<LocationAllocation>,
}

/// Where printed overage goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverageDestination {
    /// Credited to stock.
    Estoque,
    /// Used up by the assembly itself; no ledger entry.
    Montagem,
}

impl OverageDestination {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverageDestination::Estoque => "estoque",
            OverageDestination::Montagem => "montagem",
        }
    }
}

/// Parts printed beyond what the group needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overage {
    pub produto_id: String,
    pub quantidade: Decimal,
    pub destino: OverageDestination,

    #[serde(default)]
    pub locais: Vec<LocationAllocation>,
}

/// `conclusao_producao`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionConcluded {
    pub grupo_id: String,

    #[serde(default)]
    pub consumo_insumos: Vec<SupplyConsumption>,

    /// Falls back to the catalog estimate when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo_impressao_minutos: Option<Decimal>,

    #[serde(default)]
    pub excedentes: Vec<Overage>,
}

/// `conclusao_montagem_peca`, `conclusao_montagem_modelo` and
/// `conclusao_montagem_kit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyConcluded {
    pub grupo_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo_montagem_minutos: Option<Decimal>,

    /// Where the assembled units are stored. Ignored for kits, which go
    /// straight to packaging.
    #[serde(default)]
    pub locais: Vec<LocationAllocation>,
}

/// `entrada_kit_embalagem`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KitToPackaging {
    pub kit_id: String,
    pub quantidade: Decimal,
    pub assembly_instance_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pedido_id: Option<String>,

    pub grupo_id: String,
}

/// `atualizacao_status_grupo_otimizado`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub grupo_id: String,
    pub status: GroupStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observacao: Option<String>,
}

/// `reversao_status_grupo_otimizado`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReversal {
    pub grupo_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motivo: Option<String>,
}

/// `conclusao_embalagem`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagingConcluded {
    pub assembly_instance_id: String,

    #[serde(default)]
    pub consumo_embalagem: Vec<SupplyConsumption>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo_embalagem_minutos: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_type_names_round_trip_through_parse() {
        for kind in EventType::ALL {
            assert_eq!(EventType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventType::parse("conclusao_montagem_nave"), None);
    }

    #[test]
    fn new_event_tags_payload() {
        let payload = EventPayload::InicioProducao(ProductionStarted {
            grupo_id: "G1".into(),
            observacao: None,
        });
        let event = ProductionEvent::new("E1", &payload).unwrap();
        assert_eq!(event.event_type, "inicio_producao");
        assert_eq!(event.payload["type"], "inicio_producao");
        assert_eq!(event.payload["grupoId"], "G1");

        let (kind, decoded) = event.decode().unwrap();
        assert_eq!(kind, EventType::InicioProducao);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn unknown_type_is_rejected_first() {
        let event = ProductionEvent::raw("E1", "teletransporte", json!({"type": "teletransporte"}));
        assert!(matches!(event.decode(), Err(EngineError::UnknownEventType(t)) if t == "teletransporte"));
    }

    #[test]
    fn mismatched_tag_is_a_schema_mismatch() {
        let event = ProductionEvent::raw(
            "E1",
            "conclusao_montagem_kit",
            json!({"type": "conclusao_montagem_peca", "grupoId": "G1"}),
        );
        assert!(matches!(event.decode(), Err(EngineError::SchemaMismatch { .. })));
    }

    #[test]
    fn missing_tag_or_field_is_a_validation_error() {
        let untagged = ProductionEvent::raw("E1", "inicio_producao", json!({"grupoId": "G1"}));
        let err = untagged.decode().unwrap_err();
        assert_eq!(err.kind(), "validation");

        let missing = ProductionEvent::raw("E2", "inicio_producao", json!({"type": "inicio_producao"}));
        assert_eq!(missing.decode().unwrap_err().kind(), "validation");

        let blank = ProductionEvent::raw(
            "E3",
            "inicio_producao",
            json!({"type": "inicio_producao", "grupoId": "  "}),
        );
        assert_eq!(blank.decode().unwrap_err().kind(), "validation");
    }

    #[test]
    fn consumption_allocations_must_add_up() {
        let event = ProductionEvent::raw(
            "E1",
            "conclusao_producao",
            json!({
                "type": "conclusao_producao",
                "grupoId": "G1",
                "consumoInsumos": [
                    {"insumoId": "PLA", "quantidade": 10, "locais": [{"localId": "A1", "quantidade": 4}]}
                ]
            }),
        );
        assert_eq!(event.decode().unwrap_err().kind(), "validation");
    }

    #[test]
    fn from_document_fills_gaps() {
        let document = Document {
            collection: "eventos_producao".into(),
            id: "E9".into(),
            version: doc_store::Version::first(),
            sequence: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            body: json!({
                "eventType": "inicio_producao",
                "actorId": "",
                "payload": {"type": "inicio_producao", "grupoId": "G1"}
            }),
        };
        let created_at = document.created_at;
        let event = ProductionEvent::from_document(document).unwrap();
        assert_eq!(event.id, "E9");
        assert_eq!(event.timestamp, created_at);
        assert!(event.actor_id.is_system());
    }
}
