use std::{collections::HashSet, sync::Mutex};

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{
        types::text_chunk::{DocumentMeta, TextChunk},
        vector_index::{cosine_similarity, ScoredChunk, SearchFilters, VectorIndex},
    },
    utils::embedding::{Embedder, EmbeddingProvider},
};

use super::*;
use crate::{RetrievalRequest, RetrievedChunk};

const DIM: usize = 64;

struct MemoryIndex {
    chunks: Vec<TextChunk>,
    calls: Mutex<Vec<usize>>,
}

impl MemoryIndex {
    async fn with_documents(docs: &[(&str, Option<&str>, &[&str])]) -> Self {
        let embedder = EmbeddingProvider::new_hashed(DIM);
        let mut chunks = Vec::new();
        for (document_id, date, texts) in docs {
            let meta = DocumentMeta {
                document_id: (*document_id).to_string(),
                source_name: "Hansard".to_string(),
                source_date: date.map(str::to_string),
                document_type: Some("debate".to_string()),
                ..DocumentMeta::default()
            };
            for (position, text) in texts.iter().enumerate() {
                let embedding = embedder.embed_single(text).await.expect("embed");
                chunks.push(TextChunk::new(
                    &meta,
                    position as u32,
                    (*text).to_string(),
                    embedding,
                ));
            }
        }
        Self {
            chunks,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<usize> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        self.calls.lock().expect("calls lock").push(k);
        let mut hits: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .filter(|chunk| filters.matches(chunk))
            .map(|chunk| ScoredChunk {
                score: cosine_similarity(vector, &chunk.embedding),
                chunk: chunk.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}

struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        Err(AppError::Provider("embedding service unavailable".into()))
    }
}

fn tuning(top_k: usize) -> RetrievalTuning {
    RetrievalTuning {
        top_k,
        ..RetrievalTuning::default()
    }
}

fn document_ids(chunks: &[RetrievedChunk]) -> Vec<&str> {
    chunks.iter().map(|c| c.chunk.document_id.as_str()).collect()
}

#[tokio::test]
async fn single_focus_runs_one_search() {
    let index = MemoryIndex::with_documents(&[
        ("budget", Some("2024-03-01"), &["The budget vote passed with 310 votes"]),
        ("health", Some("2024-04-01"), &["Health committee hearing on waiting lists"]),
    ])
    .await;
    let embedder = EmbeddingProvider::new_hashed(DIM);
    let mut request = RetrievalRequest::new("budget vote");
    request.search_queries = vec!["budget vote result".into()];

    let run = run_pipeline(
        &embedder,
        &index,
        request,
        RetrievalConfig::new(RetrievalStrategy::SingleFocus, tuning(5)),
    )
    .await
    .expect("retrieval");

    assert_eq!(index.calls(), vec![5]);
    let result = run.results;
    assert_eq!(result.vector_queries, 1);
    assert_eq!(result.embedding_tokens, 3);
    assert_eq!(result.chunks[0].chunk.document_id, "budget");
    assert_eq!(result.documents_retrieved, 2);
    assert!(!result.sufficient);
    assert!(run.stage_timings.into_vec().len() >= 5);
}

#[tokio::test]
async fn multi_entity_searches_each_entity_and_dedupes() {
    let index = MemoryIndex::with_documents(&[
        ("labour", None, &["Labour party position on housing", "Labour housing pledge"]),
        ("green", None, &["Green party position on housing"]),
    ])
    .await;
    let embedder = EmbeddingProvider::new_hashed(DIM);
    let request = RetrievalRequest {
        query: "Compare Labour and Green housing policy".into(),
        search_queries: vec!["housing policy".into()],
        entity_terms: vec!["Labour".into(), "Green".into(), " ".into()],
        filters: SearchFilters::default(),
    };

    let run = run_pipeline(
        &embedder,
        &index,
        request,
        RetrievalConfig::new(RetrievalStrategy::MultiEntity, tuning(10)),
    )
    .await
    .expect("retrieval");

    assert_eq!(index.calls().len(), 2);
    let result = run.results;
    assert_eq!(result.vector_queries, 2);
    let ids: HashSet<&str> = result.chunks.iter().map(|c| c.chunk.id.as_str()).collect();
    assert_eq!(ids.len(), result.chunks.len());
    assert_eq!(result.chunks_used, 3);
    assert!(result.sufficient);
}

#[test]
fn multi_entity_without_entities_uses_rewrites() {
    let request = RetrievalRequest {
        query: "what happened".into(),
        search_queries: vec!["first rewrite".into(), "second rewrite".into()],
        ..RetrievalRequest::default()
    };
    let searches = stages::plan_searches(
        &request,
        &RetrievalConfig::with_strategy(RetrievalStrategy::MultiEntity),
    );
    let texts: Vec<&str> = searches.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, vec!["first rewrite", "second rewrite"]);
}

#[tokio::test]
async fn chronological_orders_oldest_first() {
    let index = MemoryIndex::with_documents(&[
        ("late", Some("2024-06-01"), &["Bill third reading vote"]),
        ("undated", None, &["Bill committee stage vote"]),
        ("early", Some("2023-01-15"), &["Bill first reading vote"]),
    ])
    .await;
    let embedder = EmbeddingProvider::new_hashed(DIM);

    let run = run_pipeline(
        &embedder,
        &index,
        RetrievalRequest::new("bill reading vote"),
        RetrievalConfig::new(RetrievalStrategy::Chronological, tuning(10)),
    )
    .await
    .expect("retrieval");

    assert_eq!(
        document_ids(&run.results.chunks),
        vec!["early", "late", "undated"]
    );
}

#[tokio::test]
async fn chronological_respects_date_filters() {
    let index = MemoryIndex::with_documents(&[
        ("late", Some("2024-06-01"), &["Bill third reading vote"]),
        ("early", Some("2023-01-15"), &["Bill first reading vote"]),
    ])
    .await;
    let embedder = EmbeddingProvider::new_hashed(DIM);
    let request = RetrievalRequest {
        query: "bill vote".into(),
        filters: SearchFilters {
            date_from: Some("2024-01-01".into()),
            ..SearchFilters::default()
        },
        ..RetrievalRequest::default()
    };

    let run = run_pipeline(
        &embedder,
        &index,
        request,
        RetrievalConfig::new(RetrievalStrategy::Chronological, tuning(10)),
    )
    .await
    .expect("retrieval");

    assert_eq!(document_ids(&run.results.chunks), vec!["late"]);
}

#[tokio::test]
async fn broad_caps_chunks_per_document() {
    let index = MemoryIndex::with_documents(&[
        (
            "dominant",
            None,
            &[
                "climate debate part one",
                "climate debate part two",
                "climate debate part three",
                "climate debate part four",
            ],
        ),
        ("minor", None, &["climate committee report"]),
    ])
    .await;
    let embedder = EmbeddingProvider::new_hashed(DIM);
    let config = RetrievalConfig::new(
        RetrievalStrategy::Broad,
        RetrievalTuning {
            top_k: 3,
            broad_multiplier: 2,
            max_chunks_per_document: 2,
            ..RetrievalTuning::default()
        },
    );

    let run = run_pipeline(&embedder, &index, RetrievalRequest::new("climate debate"), config)
        .await
        .expect("retrieval");

    assert_eq!(index.calls(), vec![6]);
    let ids = document_ids(&run.results.chunks);
    assert_eq!(ids.iter().filter(|id| **id == "dominant").count(), 2);
    assert!(ids.contains(&"minor"));
}

#[tokio::test]
async fn embedding_failures_surface() {
    let index = MemoryIndex::with_documents(&[]).await;
    let result = run_pipeline(
        &FailingEmbedder,
        &index,
        RetrievalRequest::new("anything"),
        RetrievalConfig::default(),
    )
    .await;

    assert!(matches!(result, Err(AppError::Provider(_))));
    assert!(index.calls().is_empty());
}

struct StalledEmbedder;

#[async_trait]
impl Embedder for StalledEmbedder {
    async fn embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        std::future::pending().await
    }
}

struct StalledIndex;

#[async_trait]
impl VectorIndex for StalledIndex {
    async fn search(
        &self,
        _vector: &[f32],
        _k: usize,
        _filters: &SearchFilters,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        std::future::pending().await
    }
}

fn impatient() -> RetrievalTuning {
    RetrievalTuning {
        provider_timeout: Duration::from_millis(20),
        ..RetrievalTuning::default()
    }
}

#[tokio::test]
async fn stalled_embedding_times_out() {
    let index = MemoryIndex::with_documents(&[]).await;
    let result = run_pipeline(
        &StalledEmbedder,
        &index,
        RetrievalRequest::new("anything"),
        RetrievalConfig::new(RetrievalStrategy::SingleFocus, impatient()),
    )
    .await;

    assert!(matches!(result, Err(AppError::Timeout(_))));
    assert!(index.calls().is_empty());
}

#[tokio::test]
async fn stalled_vector_search_times_out() {
    let embedder = EmbeddingProvider::new_hashed(DIM);
    let result = run_pipeline(
        &embedder,
        &StalledIndex,
        RetrievalRequest::new("anything"),
        RetrievalConfig::new(RetrievalStrategy::MultiEntity, impatient()),
    )
    .await;

    assert!(matches!(result, Err(AppError::Timeout(_))));
}
