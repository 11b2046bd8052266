//! Collection names in the document store.

/// Immutable production events.
pub const EVENTOS_PRODUCAO: &str = "eventos_producao";
pub const GRUPOS_MONTAGEM: &str = "grupos_montagem";
pub const PEDIDOS: &str = "pedidos";
pub const LANCAMENTOS_PRODUTOS: &str = "lancamentos_produtos";
pub const LANCAMENTOS_INSUMOS: &str = "lancamentos_insumos";
pub const LANCAMENTOS_SERVICOS: &str = "lancamentos_servicos";
/// Packaging queue, keyed by assembly instance.
pub const EMBALAGENS: &str = "embalagens";
/// One receipt per handled event.
pub const EVENTOS_PROCESSADOS: &str = "eventos_processados";
/// Product catalog.
pub const PRODUTOS: &str = "produtos";
/// Polling positions, one document per cursor.
pub const CURSORES: &str = "cursores";
