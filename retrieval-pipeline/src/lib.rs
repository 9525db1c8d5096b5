pub mod indexing;
pub mod pipeline;
pub mod scoring;

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{types::text_chunk::TextChunk, vector_index::SearchFilters, vector_index::VectorIndex},
    utils::embedding::Embedder,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

pub use pipeline::{
    PipelineStageTimings, RetrievalConfig, RetrievalStrategy, RetrievalTuning, StageKind,
};

// A context chunk plus the score it was ranked by.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

/// What to search for. Built by the caller from the classified intent.
#[derive(Debug, Clone, Default)]
pub struct RetrievalRequest {
    /// The user's original question.
    pub query: String,
    /// Search-optimized rewrites; the first one drives single searches.
    pub search_queries: Vec<String>,
    /// Parties, members, bills and topics named in the question.
    pub entity_terms: Vec<String>,
    pub filters: SearchFilters,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// First non-blank rewrite, falling back to the original question.
    pub fn primary_query(&self) -> &str {
        self.search_queries
            .iter()
            .map(|q| q.trim())
            .find(|q| !q.is_empty())
            .unwrap_or(self.query.as_str())
    }
}

/// Provenance of one document that contributed context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub document_id: String,
    pub source_name: String,
    pub source_url: Option<String>,
    pub source_date: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub chunks: Vec<RetrievedChunk>,
    pub documents_retrieved: usize,
    pub chunks_used: usize,
    /// Whether at least the configured minimum of chunks came back.
    pub sufficient: bool,
    pub vector_queries: u64,
    pub embedding_tokens: u64,
}

impl RetrievalResult {
    pub fn new(
        chunks: Vec<RetrievedChunk>,
        min_chunks: usize,
        vector_queries: u64,
        embedding_tokens: u64,
    ) -> Self {
        let documents_retrieved = chunks
            .iter()
            .map(|c| c.chunk.document_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        let chunks_used = chunks.len();
        Self {
            chunks,
            documents_retrieved,
            chunks_used,
            sufficient: chunks_used >= min_chunks,
            vector_queries,
            embedding_tokens,
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.chunk.text.clone()).collect()
    }

    /// Distinct source documents in retrieval order.
    pub fn sources(&self) -> Vec<SourceDocument> {
        let mut seen = HashSet::new();
        self.chunks
            .iter()
            .filter(|c| seen.insert(c.chunk.document_id.clone()))
            .map(|c| SourceDocument {
                document_id: c.chunk.document_id.clone(),
                source_name: c.chunk.source_name.clone(),
                source_url: c.chunk.source_url.clone(),
                source_date: c.chunk.source_date.clone(),
            })
            .collect()
    }
}

/// Intent-driven context retrieval.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        strategy: RetrievalStrategy,
        request: RetrievalRequest,
    ) -> Result<RetrievalResult, AppError>;
}

/// Runs the strategy pipelines against an embedder and a vector index.
#[derive(Clone)]
pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    tuning: RetrievalTuning,
}

impl ContextRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        tuning: RetrievalTuning,
    ) -> Self {
        Self {
            embedder,
            index,
            tuning,
        }
    }

    pub fn tuning(&self) -> &RetrievalTuning {
        &self.tuning
    }
}

#[async_trait]
impl Retriever for ContextRetriever {
    #[instrument(skip_all, fields(%strategy))]
    async fn retrieve(
        &self,
        strategy: RetrievalStrategy,
        request: RetrievalRequest,
    ) -> Result<RetrievalResult, AppError> {
        let config = RetrievalConfig::new(strategy, self.tuning.clone());
        let run = pipeline::run_pipeline(
            self.embedder.as_ref(),
            self.index.as_ref(),
            request,
            config,
        )
        .await?;
        Ok(run.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::text_chunk::DocumentMeta;

    fn chunk(document_id: &str, text: &str) -> RetrievedChunk {
        let meta = DocumentMeta {
            document_id: document_id.to_string(),
            source_name: format!("{document_id} source"),
            ..DocumentMeta::default()
        };
        RetrievedChunk {
            chunk: TextChunk::new(&meta, 0, text.to_string(), vec![1.0]),
            score: 0.5,
        }
    }

    #[test]
    fn result_reports_coverage_and_sources() {
        let result = RetrievalResult::new(
            vec![chunk("a", "one"), chunk("b", "two"), chunk("a", "three")],
            3,
            1,
            4,
        );
        assert_eq!(result.documents_retrieved, 2);
        assert_eq!(result.chunks_used, 3);
        assert!(result.sufficient);

        let sources = result.sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].document_id, "a");
        assert_eq!(sources[1].document_id, "b");
        assert_eq!(result.texts(), vec!["one", "two", "three"]);
    }

    #[test]
    fn few_chunks_are_insufficient() {
        let result = RetrievalResult::new(vec![chunk("a", "one")], 3, 1, 1);
        assert!(!result.sufficient);
    }

    #[test]
    fn primary_query_falls_back_to_the_question() {
        let mut request = RetrievalRequest::new("original question");
        assert_eq!(request.primary_query(), "original question");
        request.search_queries = vec!["  ".into(), "rewritten".into()];
        assert_eq!(request.primary_query(), "rewritten");
    }
}
