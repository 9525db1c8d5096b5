use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{text_chunk::TextChunk, StoredObject},
    },
};

/// Restrictions applied inside a similarity search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub document_types: Vec<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.document_types.is_empty()
            && self.date_from.is_none()
            && self.date_to.is_none()
            && self.sources.is_empty()
            && self.member_ids.is_empty()
    }

    /// Whether `chunk` satisfies every populated filter.
    pub fn matches(&self, chunk: &TextChunk) -> bool {
        let type_ok = self.document_types.is_empty()
            || chunk
                .document_type
                .as_ref()
                .is_some_and(|kind| self.document_types.contains(kind));
        let from_ok = self.date_from.as_ref().map_or(true, |from| {
            chunk
                .source_date
                .as_ref()
                .is_some_and(|date| date.as_str() >= from.as_str())
        });
        let to_ok = self.date_to.as_ref().map_or(true, |to| {
            chunk
                .source_date
                .as_ref()
                .is_some_and(|date| date.as_str() <= to.as_str())
        });
        let source_ok = self.sources.is_empty() || self.sources.contains(&chunk.source_name);
        let member_ok = self.member_ids.is_empty()
            || chunk
                .member_ids
                .iter()
                .any(|member| self.member_ids.contains(member));

        type_ok && from_ok && to_ok && source_ok && member_ok
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

/// Similarity search over stored chunks, best match first.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredChunk>, AppError>;
}

/// Candidate pool size used by the HNSW operator.
const HNSW_EF: usize = 40;

pub struct SurrealVectorIndex {
    db: Arc<SurrealDbClient>,
}

impl SurrealVectorIndex {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }
}

fn filter_clause(filters: &SearchFilters) -> String {
    let mut clauses = Vec::new();
    if !filters.document_types.is_empty() {
        clauses.push("document_type IN $document_types");
    }
    if filters.date_from.is_some() {
        clauses.push("source_date >= $date_from");
    }
    if filters.date_to.is_some() {
        clauses.push("source_date <= $date_to");
    }
    if !filters.sources.is_empty() {
        clauses.push("source_name IN $sources");
    }
    if !filters.member_ids.is_empty() {
        clauses.push("member_ids CONTAINSANY $member_ids");
    }
    clauses
        .iter()
        .map(|clause| format!(" AND {clause}"))
        .collect()
}

#[async_trait]
impl VectorIndex for SurrealVectorIndex {
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT *, vector::distance::knn() AS distance FROM {table} \
             WHERE embedding <|{k},{HNSW_EF}|> $embedding{filters} ORDER BY distance ASC",
            table = TextChunk::table_name(),
            filters = filter_clause(filters),
        );

        let rows: Vec<TextChunk> = self
            .db
            .client
            .query(sql)
            .bind(("embedding", vector.to_vec()))
            .bind(("document_types", filters.document_types.clone()))
            .bind(("date_from", filters.date_from.clone()))
            .bind(("date_to", filters.date_to.clone()))
            .bind(("sources", filters.sources.clone()))
            .bind(("member_ids", filters.member_ids.clone()))
            .await?
            .take(0)?;

        debug!(k, returned = rows.len(), "Vector index search completed");

        let mut scored: Vec<ScoredChunk> = rows
            .into_iter()
            .map(|chunk| ScoredChunk {
                score: cosine_similarity(vector, &chunk.embedding),
                chunk,
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(scored)
    }
}

/// Cosine similarity clamped to `[0, 1]`; mismatched or zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}
