//! Product catalog: the read-only input of BOM expansion.

use std::collections::HashMap;

use doc_store::DocumentStore;
use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::collections;
use crate::error::DomainError;

/// Kind of catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    /// Sellable bundle of models and pieces.
    Kit,
    /// Assembled from pieces.
    Modelo,
    /// Printed; may be composite and list internal parts.
    Peca,
    /// Internal part of a composite piece, printed with it.
    Parte,
}

impl ProductType {
    /// Returns true if items of this type are built by an assembly group.
    pub fn has_assembly_group(&self) -> bool {
        !matches!(self, ProductType::Parte)
    }

    /// Returns true if groups of this type print before assembling.
    pub fn is_printed(&self) -> bool {
        matches!(self, ProductType::Peca)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Kit => "kit",
            ProductType::Modelo => "modelo",
            ProductType::Peca => "peca",
            ProductType::Parte => "parte",
        }
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A raw material consumed per unit produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyRequirement {
    pub insumo_id: String,
    pub quantidade: Decimal,
}

/// A catalog entry as stored in the `produtos` collection.
///
/// Component references are kept raw: the dashboard has written them in
/// several shapes over time, and they are only normalized by the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDefinition {
    /// Falls back to the document id when absent.
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub nome: String,

    pub tipo: ProductType,

    #[serde(default)]
    pub custo_unitario: Decimal,

    /// Minutes of printing per unit.
    #[serde(default)]
    pub tempo_impressao_estimado: Decimal,

    /// Minutes of assembly per unit.
    #[serde(default)]
    pub tempo_montagem_estimado: Decimal,

    #[serde(default)]
    pub insumos_necessarios: Vec<SupplyRequirement>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub componentes: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modelos: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pecas: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partes: Vec<serde_json::Value>,
}

impl ProductDefinition {
    /// Creates a definition with no components and zero costs.
    pub fn new(id: impl Into<String>, tipo: ProductType) -> Self {
        let id = id.into();
        Self {
            nome: id.clone(),
            id,
            tipo,
            custo_unitario: Decimal::ZERO,
            tempo_impressao_estimado: Decimal::ZERO,
            tempo_montagem_estimado: Decimal::ZERO,
            insumos_necessarios: Vec::new(),
            componentes: Vec::new(),
            modelos: Vec::new(),
            pecas: Vec::new(),
            partes: Vec::new(),
        }
    }

    /// Adds a component reference in the `{ "id", "quantidade" }` shape.
    pub fn with_component(mut self, id: &str, quantidade: u32) -> Self {
        self.componentes
            .push(serde_json::json!({ "id": id, "quantidade": quantidade }));
        self
    }

    /// Adds a raw component reference as-is.
    pub fn with_raw_component(mut self, reference: serde_json::Value) -> Self {
        self.componentes.push(reference);
        self
    }

    pub fn with_supply(mut self, insumo_id: &str, quantidade: Decimal) -> Self {
        self.insumos_necessarios.push(SupplyRequirement {
            insumo_id: insumo_id.to_string(),
            quantidade,
        });
        self
    }

    pub fn with_times(mut self, impressao: Decimal, montagem: Decimal) -> Self {
        self.tempo_impressao_estimado = impressao;
        self.tempo_montagem_estimado = montagem;
        self
    }

    pub fn with_cost(mut self, custo_unitario: Decimal) -> Self {
        self.custo_unitario = custo_unitario;
        self
    }

    /// Every component reference, whichever list it was written to.
    pub fn component_refs(&self) -> impl Iterator<Item = &serde_json::Value> {
        self.componentes
            .iter()
            .chain(&self.modelos)
            .chain(&self.pecas)
            .chain(&self.partes)
    }
}

/// Read access to product definitions.
pub trait Catalog: Send + Sync {
    fn product(&self, id: &str) -> Option<&ProductDefinition>;
}

/// Catalog held in memory, usually a snapshot of the `produtos` collection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: HashMap<String, ProductDefinition>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_products(products: impl IntoIterator<Item = ProductDefinition>) -> Self {
        let mut catalog = Self::new();
        for product in products {
            catalog.insert(product);
        }
        catalog
    }

    pub fn insert(&mut self, product: ProductDefinition) {
        self.products.insert(product.id.clone(), product);
    }

    pub fn with(mut self, product: ProductDefinition) -> Self {
        self.insert(product);
        self
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Snapshots the `produtos` collection.
    ///
    /// Entries that do not parse as a product definition are skipped with a
    /// warning; the resolver reports references to them as unresolvable.
    pub async fn load(store: &dyn DocumentStore) -> Result<Self, DomainError> {
        let mut catalog = Self::new();
        let mut skipped = 0usize;

        let mut documents = store.stream_collection(collections::PRODUTOS).await?;
        while let Some(document) = documents.next().await {
            let document = document?;
            match document.body_as::<ProductDefinition>() {
                Ok(mut product) => {
                    if product.id.trim().is_empty() {
                        product.id = document.id.clone();
                    }
                    catalog.insert(product);
                }
                Err(error) => {
                    skipped += 1;
                    tracing::warn!(product_id = %document.id, %error, "skipping malformed catalog entry");
                }
            }
        }

        tracing::debug!(products = catalog.len(), skipped, "catalog loaded");
        Ok(catalog)
    }
}

impl Catalog for InMemoryCatalog {
    fn product(&self, id: &str) -> Option<&ProductDefinition> {
        self.products.get(id)
    }
}
