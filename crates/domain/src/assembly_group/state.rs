//! Assembly group state machine.

use serde::{Deserialize, Serialize};

use crate::catalog::ProductType;

/// The status of an assembly group.
///
/// Printed pieces and assembled models/kits follow different paths:
/// ```text
/// peca:         aguardando ──► em_producao ──► produzido ──► montado ──► concluido
///                    ▲              │
///                    └── reversal ──┘
/// modelo / kit: aguardando_montagem ──────────────────────► montado ──► concluido
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Waiting to be printed.
    Aguardando,

    /// Printing in progress.
    EmProducao,

    /// Printed, waiting for assembly.
    Produzido,

    /// Waiting for its components before assembly.
    AguardandoMontagem,

    /// Assembled.
    Montado,

    /// Packaged and shipped (terminal state).
    Concluido,
}

const PRINTED_PATH: &[GroupStatus] = &[
    GroupStatus::Aguardando,
    GroupStatus::EmProducao,
    GroupStatus::Produzido,
    GroupStatus::Montado,
    GroupStatus::Concluido,
];

const ASSEMBLY_PATH: &[GroupStatus] = &[
    GroupStatus::AguardandoMontagem,
    GroupStatus::Montado,
    GroupStatus::Concluido,
];

impl GroupStatus {
    /// Initial status for a group building `tipo`.
    pub fn initial_for(tipo: ProductType) -> Self {
        if tipo.is_printed() {
            GroupStatus::Aguardando
        } else {
            GroupStatus::AguardandoMontagem
        }
    }

    /// The ordered statuses a group building `tipo` goes through.
    pub fn lifecycle(tipo: ProductType) -> &'static [GroupStatus] {
        if tipo.is_printed() {
            PRINTED_PATH
        } else {
            ASSEMBLY_PATH
        }
    }

    /// Position of this status on the lifecycle of `tipo`.
    pub fn position(&self, tipo: ProductType) -> Option<usize> {
        Self::lifecycle(tipo).iter().position(|s| s == self)
    }

    /// Returns true if production can start in this state.
    pub fn can_start_production(&self) -> bool {
        matches!(self, GroupStatus::Aguardando)
    }

    /// Returns true if production can be concluded in this state.
    pub fn can_conclude_production(&self) -> bool {
        matches!(self, GroupStatus::EmProducao)
    }

    /// Returns true if assembly can be concluded in this state.
    pub fn can_conclude_assembly(&self) -> bool {
        matches!(self, GroupStatus::Produzido | GroupStatus::AguardandoMontagem)
    }

    /// Returns true if the group can be completed in this state.
    pub fn can_complete(&self) -> bool {
        matches!(self, GroupStatus::Montado)
    }

    /// Returns true if production can be reverted in this state.
    pub fn can_revert(&self) -> bool {
        matches!(self, GroupStatus::EmProducao)
    }

    /// Returns true if a plain status update may move a group here.
    ///
    /// `montado` and `concluido` carry stock effects and are reached only
    /// through the assembly and packaging events.
    pub fn is_side_effect_free(&self) -> bool {
        !matches!(self, GroupStatus::Montado | GroupStatus::Concluido)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, GroupStatus::Concluido)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Aguardando => "aguardando",
            GroupStatus::EmProducao => "em_producao",
            GroupStatus::Produzido => "produzido",
            GroupStatus::AguardandoMontagem => "aguardando_montagem",
            GroupStatus::Montado => "montado",
            GroupStatus::Concluido => "concluido",
        }
    }
}

impl std::fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
