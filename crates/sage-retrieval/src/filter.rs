//! Typed metadata filters for similarity search.
//!
//! Filters are built as a small expression tree and serialized to the
//! `$and`/`$or`/`$eq` query shape most document stores accept, so the core
//! never assembles filter JSON by hand.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A metadata filter over chunk metadata fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataFilter {
    /// Field equals value.
    Eq {
        /// Metadata field name.
        field: String,
        /// Value to match.
        value: Value,
    },
    /// All sub-filters must match.
    And(Vec<MetadataFilter>),
    /// At least one sub-filter must match.
    Or(Vec<MetadataFilter>),
}

impl MetadataFilter {
    /// Equality on a single field.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Conjunction of filters.
    pub fn and(filters: Vec<MetadataFilter>) -> Self {
        Self::And(filters)
    }

    /// Disjunction of filters.
    pub fn or(filters: Vec<MetadataFilter>) -> Self {
        Self::Or(filters)
    }

    /// Scope to a project and an explicit set of document ids.
    ///
    /// One id produces a plain equality; several become an `$or` list.
    /// Returns `None` for an empty id list (no filter means no retrieval,
    /// not unrestricted retrieval).
    pub fn for_documents(project_id: i64, document_ids: &[i64]) -> Option<Self> {
        let doc_filter = match document_ids {
            [] => return None,
            [single] => Self::eq("document_id", *single),
            many => Self::or(many.iter().map(|id| Self::eq("document_id", *id)).collect()),
        };
        Some(Self::and(vec![
            Self::eq("project_id", project_id),
            doc_filter,
        ]))
    }

    /// Render as the `$and`/`$or`/`$eq` wire shape.
    pub fn to_query_value(&self) -> Value {
        match self {
            Self::Eq { field, value } => {
                let mut object = serde_json::Map::new();
                object.insert(field.clone(), json!({ "$eq": value }));
                Value::Object(object)
            }
            Self::And(filters) => json!({
                "$and": filters.iter().map(|f| f.to_query_value()).collect::<Vec<_>>()
            }),
            Self::Or(filters) => json!({
                "$or": filters.iter().map(|f| f.to_query_value()).collect::<Vec<_>>()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_wire_shape() {
        let filter = MetadataFilter::eq("project_id", 7);
        assert_eq!(
            filter.to_query_value(),
            json!({"project_id": {"$eq": 7}})
        );
    }

    #[test]
    fn test_single_document_filter() {
        let filter = MetadataFilter::for_documents(1, &[42]).unwrap();
        assert_eq!(
            filter.to_query_value(),
            json!({"$and": [
                {"project_id": {"$eq": 1}},
                {"document_id": {"$eq": 42}},
            ]})
        );
    }

    #[test]
    fn test_multi_document_filter() {
        let filter = MetadataFilter::for_documents(1, &[2, 3]).unwrap();
        assert_eq!(
            filter.to_query_value(),
            json!({"$and": [
                {"project_id": {"$eq": 1}},
                {"$or": [
                    {"document_id": {"$eq": 2}},
                    {"document_id": {"$eq": 3}},
                ]},
            ]})
        );
    }

    #[test]
    fn test_empty_document_list_is_no_filter() {
        assert!(MetadataFilter::for_documents(1, &[]).is_none());
    }
}
