//! Recursive BOM expansion.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::bom::reference::normalize;
use crate::catalog::{Catalog, ProductDefinition, ProductType, SupplyRequirement};
use crate::error::DomainError;

/// Node id of the expanded unit itself.
pub const ROOT_NODE: &str = "0";

/// Default bound on tree depth; deeper trees are reported as an integrity issue.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// One occurrence of a component in the expanded tree.
///
/// `total_quantity` is already multiplied through every level above it, and
/// `insumos_necessarios` holds totals for that quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedComponent {
    pub component_id: String,
    pub component_type: ProductType,
    pub total_quantity: Decimal,
    pub custo_unitario: Decimal,
    pub tempo_impressao_estimado: Decimal,
    pub tempo_montagem_estimado: Decimal,
    pub insumos_necessarios: Vec<SupplyRequirement>,

    /// Position in the tree, e.g. `"0.1.0"`. Stable for a given catalog.
    pub node: String,
    pub parent_node: String,
    pub parent_id: String,
    pub depth: usize,
}

/// A reference that was skipped during expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BomWarning {
    pub parent_id: String,
    pub reference: serde_json::Value,
    pub reason: String,
}

/// A data-integrity failure found during expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityIssue {
    /// Product ids from the root down to the offending component.
    pub path: Vec<String>,
    pub reason: String,
}

/// Result of expanding one sellable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BomExpansion {
    pub root_id: String,
    pub root_type: ProductType,
    pub requested_quantity: Decimal,
    pub components: Vec<ResolvedComponent>,
    pub warnings: Vec<BomWarning>,
    pub integrity_issues: Vec<IntegrityIssue>,
}

impl BomExpansion {
    /// Total quantity of a component across every branch of the tree.
    pub fn total_for(&self, component_id: &str) -> Decimal {
        self.components
            .iter()
            .filter(|c| c.component_id == component_id)
            .map(|c| c.total_quantity)
            .sum()
    }

    /// Quantities merged by component id, in first-seen order.
    pub fn totals(&self) -> Vec<(String, ProductType, Decimal)> {
        let mut totals: Vec<(String, ProductType, Decimal)> = Vec::new();
        for component in &self.components {
            match totals.iter_mut().find(|(id, _, _)| id == &component.component_id) {
                Some((_, _, quantity)) => *quantity += component.total_quantity,
                None => totals.push((
                    component.component_id.clone(),
                    component.component_type,
                    component.total_quantity,
                )),
            }
        }
        totals
    }

    /// Direct children of a node.
    pub fn children_of<'s>(&'s self, node: &'s str) -> impl Iterator<Item = &'s ResolvedComponent> {
        self.components.iter().filter(move |c| c.parent_node == node)
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn has_integrity_issues(&self) -> bool {
        !self.integrity_issues.is_empty()
    }
}

/// Expands products through the catalog.
///
/// [`BomResolver::resolve`] is lenient: unresolvable references become
/// warnings, integrity problems are collected, and resolution carries on
/// with the siblings. [`BomResolver::expand`] runs the same walk and turns
/// any integrity problem into a fatal [`DomainError::Integrity`].
pub struct BomResolver<'a> {
    catalog: &'a dyn Catalog,
    max_depth: usize,
}

impl<'a> BomResolver<'a> {
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self {
            catalog,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Expands `quantity` units of `root_id`, collecting every problem.
    pub fn resolve(&self, root_id: &str, quantity: Decimal) -> Result<BomExpansion, DomainError> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "requested quantity for {root_id} must be positive, got {quantity}"
            )));
        }

        let root = self
            .catalog
            .product(root_id)
            .ok_or_else(|| DomainError::not_found("Product", root_id))?;

        let mut expansion = BomExpansion {
            root_id: root.id.clone(),
            root_type: root.tipo,
            requested_quantity: quantity,
            components: Vec::new(),
            warnings: Vec::new(),
            integrity_issues: Vec::new(),
        };

        let mut path = vec![root.id.clone()];
        self.walk(root, ROOT_NODE, quantity, 0, &mut path, &mut expansion);

        if !expansion.warnings.is_empty() {
            metrics::counter!("bom_expansion_warnings_total")
                .increment(expansion.warnings.len() as u64);
            for warning in &expansion.warnings {
                tracing::warn!(
                    root_id,
                    parent_id = %warning.parent_id,
                    reference = %warning.reference,
                    reason = %warning.reason,
                    "skipped BOM reference"
                );
            }
        }

        Ok(expansion)
    }

    /// Expands `quantity` units of `root_id`, failing on any integrity issue.
    pub fn expand(&self, root_id: &str, quantity: Decimal) -> Result<BomExpansion, DomainError> {
        let expansion = self.resolve(root_id, quantity)?;

        if expansion.has_integrity_issues() {
            let reasons: Vec<_> = expansion
                .integrity_issues
                .iter()
                .map(|issue| issue.reason.as_str())
                .collect();
            return Err(DomainError::integrity(format!(
                "BOM of {root_id}: {}",
                reasons.join("; ")
            )));
        }

        Ok(expansion)
    }

    fn walk(
        &self,
        product: &ProductDefinition,
        node: &str,
        multiplier: Decimal,
        depth: usize,
        path: &mut Vec<String>,
        out: &mut BomExpansion,
    ) {
        for (index, raw) in product.component_refs().enumerate() {
            let reference = match normalize(raw) {
                Ok(reference) => reference,
                Err(issue) if issue.is_integrity() => {
                    out.integrity_issues.push(IntegrityIssue {
                        path: path.clone(),
                        reason: issue.to_string(),
                    });
                    continue;
                }
                Err(issue) => {
                    out.warnings.push(BomWarning {
                        parent_id: product.id.clone(),
                        reference: raw.clone(),
                        reason: issue.to_string(),
                    });
                    continue;
                }
            };

            let Some(child) = self.catalog.product(&reference.id) else {
                out.warnings.push(BomWarning {
                    parent_id: product.id.clone(),
                    reference: raw.clone(),
                    reason: format!("component {} not found in catalog", reference.id),
                });
                continue;
            };

            if path.contains(&reference.id) {
                let mut cycle = path.clone();
                cycle.push(reference.id.clone());
                out.integrity_issues.push(IntegrityIssue {
                    reason: format!("cycle detected: {}", cycle.join(" -> ")),
                    path: cycle,
                });
                continue;
            }

            if depth + 1 > self.max_depth {
                out.integrity_issues.push(IntegrityIssue {
                    path: path.clone(),
                    reason: format!(
                        "component {} exceeds maximum BOM depth {}",
                        reference.id, self.max_depth
                    ),
                });
                continue;
            }

            let total_quantity = multiplier * reference.quantity;
            let child_node = format!("{node}.{index}");

            out.components.push(ResolvedComponent {
                component_id: child.id.clone(),
                component_type: child.tipo,
                total_quantity,
                custo_unitario: child.custo_unitario,
                tempo_impressao_estimado: child.tempo_impressao_estimado,
                tempo_montagem_estimado: child.tempo_montagem_estimado,
                insumos_necessarios: child
                    .insumos_necessarios
                    .iter()
                    .map(|s| SupplyRequirement {
                        insumo_id: s.insumo_id.clone(),
                        quantidade: s.quantidade * total_quantity,
                    })
                    .collect(),
                node: child_node.clone(),
                parent_node: node.to_string(),
                parent_id: product.id.clone(),
                depth: depth + 1,
            });

            path.push(child.id.clone());
            self.walk(child, &child_node, total_quantity, depth + 1, path, out);
            path.pop();
        }
    }
}
