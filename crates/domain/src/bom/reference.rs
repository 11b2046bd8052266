//! Normalization of heterogeneous component references.

use rust_decimal::Decimal;
use serde_json::{Map, Value};

/// Field names that have been used to carry a component id.
const ID_FIELDS: &[&str] = &[
    "id",
    "produtoId",
    "componenteId",
    "modeloId",
    "pecaId",
    "parteId",
];

/// Field names holding an embedded component object (or its bare id).
const EMBEDDED_FIELDS: &[&str] = &["produto", "componente", "modelo", "peca", "parte"];

const QUANTITY_FIELDS: &[&str] = &["quantidade", "quantity", "qtd"];

/// A component reference reduced to its id and per-unit multiplier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRef {
    pub id: String,
    pub quantity: Decimal,
}

/// Why a raw reference could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefIssue {
    /// No usable id field. Recoverable: the reference is skipped.
    MissingId,
    /// Shape is neither a string nor an object. Recoverable.
    UnsupportedShape(&'static str),
    /// The quantity is present but not a number.
    MalformedQuantity(String),
    /// The quantity is zero or negative. This is an integrity problem.
    NonPositiveQuantity { id: String, quantity: Decimal },
}

impl RefIssue {
    /// Returns true if the issue is a data-integrity failure rather than a
    /// skippable reference.
    pub fn is_integrity(&self) -> bool {
        matches!(self, RefIssue::NonPositiveQuantity { .. })
    }
}

impl std::fmt::Display for RefIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefIssue::MissingId => write!(f, "reference has no id"),
            RefIssue::UnsupportedShape(shape) => write!(f, "unsupported reference shape: {shape}"),
            RefIssue::MalformedQuantity(raw) => write!(f, "malformed quantity: {raw}"),
            RefIssue::NonPositiveQuantity { id, quantity } => {
                write!(f, "component {id} has non-positive quantity {quantity}")
            }
        }
    }
}

/// Normalizes one raw reference.
///
/// Accepted shapes: a bare id string (`"P1"`, quantity 1), an object with an
/// id field (`{"id": "P1", "quantidade": 3}` or `{"pecaId": "P1"}`), or an
/// object embedding the component (`{"peca": {"id": "P1"}, "quantidade": 3}`).
pub fn normalize(raw: &Value) -> Result<ComponentRef, RefIssue> {
    match raw {
        Value::String(id) => {
            let id = id.trim();
            if id.is_empty() {
                return Err(RefIssue::MissingId);
            }
            Ok(ComponentRef {
                id: id.to_string(),
                quantity: Decimal::ONE,
            })
        }
        Value::Object(fields) => {
            let id = object_id(fields).ok_or(RefIssue::MissingId)?;
            let quantity = object_quantity(fields)?.unwrap_or(Decimal::ONE);
            if quantity <= Decimal::ZERO {
                return Err(RefIssue::NonPositiveQuantity { id, quantity });
            }
            Ok(ComponentRef { id, quantity })
        }
        Value::Null => Err(RefIssue::UnsupportedShape("null")),
        Value::Bool(_) => Err(RefIssue::UnsupportedShape("boolean")),
        Value::Number(_) => Err(RefIssue::UnsupportedShape("number")),
        Value::Array(_) => Err(RefIssue::UnsupportedShape("array")),
    }
}

fn non_blank(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn object_id(fields: &Map<String, Value>) -> Option<String> {
    if let Some(id) = ID_FIELDS
        .iter()
        .find_map(|name| fields.get(*name).and_then(non_blank))
    {
        return Some(id);
    }

    EMBEDDED_FIELDS.iter().find_map(|name| match fields.get(*name)? {
        Value::Object(embedded) => object_id(embedded),
        other => non_blank(other),
    })
}

fn object_quantity(fields: &Map<String, Value>) -> Result<Option<Decimal>, RefIssue> {
    let Some(raw) = QUANTITY_FIELDS.iter().find_map(|name| fields.get(*name)) else {
        return Ok(None);
    };

    let parsed = match raw {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s.trim()),
        Value::Null => return Ok(None),
        _ => None,
    };

    parsed
        .map(Some)
        .ok_or_else(|| RefIssue::MalformedQuantity(raw.to_string()))
}

/// Plain or exponent notation (`1e1`, `2.5E-1`).
fn parse_decimal(text: &str) -> Option<Decimal> {
    text.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(text).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[test]
    fn bare_string() {
        let r = normalize(&json!(" P1 ")).unwrap();
        assert_eq!(r.id, "P1");
        assert_eq!(r.quantity, dec(1));
    }

    #[test]
    fn object_with_id_and_quantity() {
        let r = normalize(&json!({"id": "M1", "quantidade": 2})).unwrap();
        assert_eq!(r, ComponentRef { id: "M1".into(), quantity: dec(2) });
    }

    #[test]
    fn differently_named_id_field() {
        let r = normalize(&json!({"pecaId": "P1", "quantidade": "3"})).unwrap();
        assert_eq!(r.id, "P1");
        assert_eq!(r.quantity, dec(3));
    }

    #[test]
    fn embedded_object() {
        let r = normalize(&json!({"modelo": {"id": "M7", "nome": "x"}, "quantidade": 4})).unwrap();
        assert_eq!(r.id, "M7");
        assert_eq!(r.quantity, dec(4));
    }

    #[test]
    fn fractional_quantity() {
        let r = normalize(&json!({"id": "P1", "quantidade": 0.5})).unwrap();
        assert_eq!(r.quantity, Decimal::new(5, 1));
    }

    #[test]
    fn exponent_quantity() {
        let value: Value = serde_json::from_str(r#"{"id": "P1", "quantidade": 1e1}"#).unwrap();
        assert_eq!(normalize(&value).unwrap().quantity, dec(10));

        let r = normalize(&json!({"id": "P1", "qtd": "2.5E-1"})).unwrap();
        assert_eq!(r.quantity, Decimal::new(25, 2));
    }

    #[test]
    fn missing_id() {
        assert_eq!(normalize(&json!({"quantidade": 2})), Err(RefIssue::MissingId));
        assert_eq!(normalize(&json!("")), Err(RefIssue::MissingId));
        assert_eq!(normalize(&json!({"id": "  "})), Err(RefIssue::MissingId));
    }

    #[test]
    fn unsupported_shapes() {
        assert!(matches!(normalize(&json!(null)), Err(RefIssue::UnsupportedShape("null"))));
        assert!(matches!(normalize(&json!(42)), Err(RefIssue::UnsupportedShape("number"))));
    }

    #[test]
    fn non_positive_quantity_is_integrity() {
        let issue = normalize(&json!({"id": "P1", "quantidade": 0})).unwrap_err();
        assert!(issue.is_integrity());

        let issue = normalize(&json!({"id": "P1", "quantidade": "abc"})).unwrap_err();
        assert!(!issue.is_integrity());
    }
}
