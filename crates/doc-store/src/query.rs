use serde_json::Value;

use crate::Document;

/// Equality filter on a field of the document body.
///
/// `field` is a dotted path such as `"origem.tipo"`; each segment names an
/// object member. Array indexing is not supported.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    /// Splits the dotted field path into its segments.
    pub fn path(&self) -> Vec<String> {
        self.field.split('.').map(str::to_string).collect()
    }

    /// Returns true if the body holds `value` at `field`.
    pub fn matches(&self, body: &Value) -> bool {
        let mut current = body;
        for segment in self.field.split('.') {
            match current.get(segment) {
                Some(next) => current = next,
                None => return false,
            }
        }
        current == &self.value
    }
}

/// Builder for constructing document queries.
///
/// Results are always ordered by insertion sequence.
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    /// Collection to read from.
    pub collection: String,

    /// Equality filters, all of which must match.
    pub filters: Vec<FieldFilter>,

    /// Maximum number of documents to return.
    pub limit: Option<usize>,

    /// Number of documents to skip.
    pub offset: Option<usize>,

    /// Only documents with a sequence strictly greater than this.
    pub after_sequence: Option<i64>,
}

impl DocumentQuery {
    /// Creates a query over a whole collection.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    /// Adds an equality filter on a body field.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Limits the number of documents returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips this many documents before returning results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Resumes after a known insertion sequence.
    pub fn after_sequence(mut self, sequence: i64) -> Self {
        self.after_sequence = Some(sequence);
        self
    }

    /// Returns true if the document satisfies every filter of this query.
    pub fn matches(&self, document: &Document) -> bool {
        document.collection == self.collection
            && self.after_sequence.is_none_or(|after| document.sequence > after)
            && self.filters.iter().all(|f| f.matches(&document.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_builder_chain() {
        let query = DocumentQuery::collection("lancamentos_produtos")
            .where_eq("produtoId", "K1")
            .limit(100)
            .offset(10);

        assert_eq!(query.collection, "lancamentos_produtos");
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.filters[0].value, json!("K1"));
        assert_eq!(query.limit, Some(100));
        assert_eq!(query.offset, Some(10));
    }

    #[test]
    fn after_sequence_skips_older_documents() {
        let document = |sequence| Document {
            collection: "eventos_producao".into(),
            id: format!("E{sequence}"),
            version: crate::Version::first(),
            sequence,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            body: json!({}),
        };
        let query = DocumentQuery::collection("eventos_producao").after_sequence(3);

        assert!(!query.matches(&document(2)));
        assert!(!query.matches(&document(3)));
        assert!(query.matches(&document(4)));
    }

    #[test]
    fn filter_matches_nested_path() {
        let filter = FieldFilter {
            field: "origem.tipo".to_string(),
            value: json!("estoque"),
        };
        assert!(filter.matches(&json!({"origem": {"tipo": "estoque"}})));
        assert!(!filter.matches(&json!({"origem": {"tipo": "producao"}})));
        assert!(!filter.matches(&json!({"origem": "estoque"})));
        assert_eq!(filter.path(), vec!["origem", "tipo"]);
    }
}
