//! Packaging queue entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::collections;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PackagingStatus {
    #[default]
    AguardandoEmbalagem,
    Concluido,
}

/// A finished unit waiting to be packaged, keyed by its assembly instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagingEntry {
    /// The assembly instance id of the build that produced the unit.
    pub id: String,
    pub produto_id: String,
    pub quantidade: Decimal,
    pub grupo_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pedido_id: Option<String>,

    #[serde(default)]
    pub status: PackagingStatus,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concluido_em: Option<DateTime<Utc>>,
}

impl Aggregate for PackagingEntry {
    fn aggregate_type() -> &'static str {
        "PackagingEntry"
    }

    fn collection() -> &'static str {
        collections::EMBALAGENS
    }

    fn id(&self) -> &str {
        &self.id
    }
}

impl PackagingEntry {
    pub fn new(
        assembly_instance_id: impl Into<String>,
        produto_id: impl Into<String>,
        quantidade: Decimal,
        grupo_id: impl Into<String>,
        pedido_id: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: assembly_instance_id.into(),
            produto_id: produto_id.into(),
            quantidade,
            grupo_id: grupo_id.into(),
            pedido_id,
            status: PackagingStatus::AguardandoEmbalagem,
            created_at: at,
            concluido_em: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == PackagingStatus::Concluido
    }

    /// Marks the entry packaged. Returns false if it already was.
    pub fn complete(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_done() {
            return false;
        }
        self.status = PackagingStatus::Concluido;
        self.concluido_em = Some(at);
        true
    }
}
