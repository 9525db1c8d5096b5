use common::storage::vector_index::SearchFilters;
use serde::{Deserialize, Serialize};

/// Filters a caller may attach to a question. Same shape as the search filters.
pub type QueryFilters = SearchFilters;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub session_id: String,
    #[serde(default)]
    pub filters: QueryFilters,
}

impl Query {
    pub fn new(text: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: session_id.into(),
            filters: QueryFilters::default(),
        }
    }

    pub fn with_filters(mut self, filters: QueryFilters) -> Self {
        self.filters = filters;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub documents_retrieved: usize,
    pub chunks_used: usize,
    pub processing_time_ms: u64,
    pub model: String,
}
