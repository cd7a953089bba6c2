//! Declarative document queries

use serde_json::Value;

/// Sort direction for a field ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Equality filter on a top-level field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

/// Result ordering
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOrder {
    /// Order by a scalar field
    Field {
        field: String,
        direction: SortDirection,
    },
    /// Nearest first by vector distance to a probe vector
    VectorDistance { field: String, vector: Vec<f32> },
}

/// Filter, order and top-K over one container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    pub filters: Vec<FieldFilter>,
    pub order: Option<QueryOrder>,
    pub top: Option<usize>,
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nearest neighbors of `vector` on the indexed `field`
    pub fn nearest(field: impl Into<String>, vector: Vec<f32>, top: usize) -> Self {
        Self::new()
            .order_by_vector(field, vector)
            .with_top(top)
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order = Some(QueryOrder::Field {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn order_by_vector(mut self, field: impl Into<String>, vector: Vec<f32>) -> Self {
        self.order = Some(QueryOrder::VectorDistance {
            field: field.into(),
            vector,
        });
        self
    }

    pub fn with_top(mut self, top: usize) -> Self {
        self.top = Some(top);
        self
    }

    /// Whether a document body passes every filter
    pub fn matches(&self, document: &Value) -> bool {
        self.filters
            .iter()
            .all(|f| document.get(&f.field) == Some(&f.value))
    }
}

/// One document returned by a query
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub document: Value,
    /// Cosine similarity to the probe, set for vector-ordered queries
    pub similarity: Option<f32>,
}

impl QueryHit {
    pub fn new(document: Value) -> Self {
        Self {
            document,
            similarity: None,
        }
    }

    pub fn with_similarity(mut self, similarity: f32) -> Self {
        self.similarity = Some(similarity);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nearest_query() {
        let query = DocumentQuery::nearest("embedding", vec![1.0, 0.0], 1);

        assert_eq!(query.top, Some(1));
        assert!(matches!(
            query.order,
            Some(QueryOrder::VectorDistance { ref field, .. }) if field == "embedding"
        ));
    }

    #[test]
    fn test_filter_matching() {
        let query = DocumentQuery::new().filter_eq("user_id", "abc");

        assert!(query.matches(&json!({"user_id": "abc", "turns": []})));
        assert!(!query.matches(&json!({"user_id": "xyz"})));
        assert!(!query.matches(&json!({"turns": []})));
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(DocumentQuery::new().matches(&json!({})));
    }
}
