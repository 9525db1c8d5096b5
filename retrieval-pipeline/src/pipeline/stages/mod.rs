use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{
        types::text_chunk::TextChunk,
        vector_index::{SearchFilters, VectorIndex},
    },
    utils::{
        embedding::{estimate_tokens, Embedder},
        retry::with_timeout,
    },
};
use futures::{stream, StreamExt, TryStreamExt};
use std::{cmp::Ordering, collections::HashMap};
use tracing::{debug, instrument};

use crate::{
    scoring::{
        extract_keywords, fuse_scores, lexical_overlap_score, merge_scored_by_id,
        sort_by_fused_desc, FusionWeights, Scored,
    },
    RetrievalRequest, RetrievalResult, RetrievedChunk,
};

use super::{
    config::{RetrievalConfig, RetrievalStrategy},
    PipelineStage, PipelineStageTimings, StageKind,
};

/// One similarity search the strategy decided to run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSearch {
    pub text: String,
    pub k: usize,
    pub filters: SearchFilters,
}

pub struct PipelineContext<'a> {
    pub embedder: &'a dyn Embedder,
    pub index: &'a dyn VectorIndex,
    pub request: RetrievalRequest,
    pub config: RetrievalConfig,
    pub searches: Vec<PlannedSearch>,
    pub search_embeddings: Vec<Vec<f32>>,
    pub candidates: HashMap<String, Scored<TextChunk>>,
    pub ranked: Vec<Scored<TextChunk>>,
    pub chunk_results: Vec<RetrievedChunk>,
    pub vector_queries: u64,
    pub embedding_tokens: u64,
    stage_timings: PipelineStageTimings,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        index: &'a dyn VectorIndex,
        request: RetrievalRequest,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            request,
            config,
            searches: Vec::new(),
            search_embeddings: Vec::new(),
            candidates: HashMap::new(),
            ranked: Vec::new(),
            chunk_results: Vec::new(),
            vector_queries: 0,
            embedding_tokens: 0,
            stage_timings: PipelineStageTimings::default(),
        }
    }

    pub fn take_stage_timings(&mut self) -> PipelineStageTimings {
        std::mem::take(&mut self.stage_timings)
    }

    pub fn record_stage_duration(&mut self, kind: StageKind, duration: std::time::Duration) {
        self.stage_timings.record(kind, duration);
    }

    pub fn take_result(&mut self) -> RetrievalResult {
        RetrievalResult::new(
            std::mem::take(&mut self.chunk_results),
            self.config.tuning.min_chunks_for_sufficiency,
            self.vector_queries,
            self.embedding_tokens,
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlanStage;

#[async_trait]
impl PipelineStage for PlanStage {
    fn kind(&self) -> StageKind {
        StageKind::Plan
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        ctx.searches = plan_searches(&ctx.request, &ctx.config);
        debug!(searches = ctx.searches.len(), "Planned similarity searches");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EmbedStage;

#[async_trait]
impl PipelineStage for EmbedStage {
    fn kind(&self) -> StageKind {
        StageKind::Embed
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        embed(ctx).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchStage;

#[async_trait]
impl PipelineStage for SearchStage {
    fn kind(&self) -> StageKind {
        StageKind::Search
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        search(ctx).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RankStage;

#[async_trait]
impl PipelineStage for RankStage {
    fn kind(&self) -> StageKind {
        StageKind::Rank
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        rank(ctx);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiversifyStage;

#[async_trait]
impl PipelineStage for DiversifyStage {
    fn kind(&self) -> StageKind {
        StageKind::Diversify
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        diversify(ctx);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AssembleStage;

#[async_trait]
impl PipelineStage for AssembleStage {
    fn kind(&self) -> StageKind {
        StageKind::Assemble
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        assemble(ctx);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChronologicalOrderStage;

#[async_trait]
impl PipelineStage for ChronologicalOrderStage {
    fn kind(&self) -> StageKind {
        StageKind::Order
    }

    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
        order_chronologically(&mut ctx.chunk_results);
        Ok(())
    }
}

/// Decides which searches a strategy runs and how many chunks each asks for.
pub fn plan_searches(request: &RetrievalRequest, config: &RetrievalConfig) -> Vec<PlannedSearch> {
    let tuning = &config.tuning;
    let primary = request.primary_query().to_string();
    let single = |text: String, k: usize| PlannedSearch {
        text,
        k,
        filters: request.filters.clone(),
    };

    match config.strategy {
        RetrievalStrategy::SingleFocus | RetrievalStrategy::Chronological => {
            vec![single(primary, tuning.top_k.max(1))]
        }
        RetrievalStrategy::Broad => vec![single(primary, tuning.broad_k())],
        RetrievalStrategy::MultiEntity => {
            let mut texts: Vec<String> = request
                .entity_terms
                .iter()
                .map(|term| term.trim())
                .filter(|term| !term.is_empty())
                .map(|term| format!("{term} {primary}"))
                .collect();
            if texts.is_empty() {
                texts = request
                    .search_queries
                    .iter()
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty())
                    .collect();
            }
            if texts.is_empty() {
                texts.push(primary);
            }
            texts.dedup();
            texts
                .into_iter()
                .map(|text| single(text, tuning.top_k.max(1)))
                .collect()
        }
    }
}

#[instrument(level = "trace", skip_all)]
pub async fn embed(ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
    let texts: Vec<String> = ctx.searches.iter().map(|s| s.text.clone()).collect();
    if texts.is_empty() {
        return Ok(());
    }

    debug!(count = texts.len(), "Embedding search queries");
    ctx.embedding_tokens = texts.iter().map(|t| estimate_tokens(t)).sum();
    let embeddings = with_timeout(
        ctx.config.tuning.provider_timeout,
        "query embedding",
        ctx.embedder.embed(texts),
    )
    .await?;
    if embeddings.len() != ctx.searches.len() {
        return Err(AppError::Provider(format!(
            "embedder returned {} vectors for {} queries",
            embeddings.len(),
            ctx.searches.len()
        )));
    }
    ctx.search_embeddings = embeddings;
    Ok(())
}

#[instrument(level = "trace", skip_all)]
pub async fn search(ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
    let index = ctx.index;
    let concurrency = ctx.config.tuning.entity_concurrency.max(1);
    let limit = ctx.config.tuning.provider_timeout;
    let jobs: Vec<(PlannedSearch, Vec<f32>)> = ctx
        .searches
        .iter()
        .cloned()
        .zip(std::mem::take(&mut ctx.search_embeddings))
        .collect();
    ctx.vector_queries = jobs.len() as u64;

    // `buffered` yields in submission order so merging stays deterministic
    let batches: Vec<Vec<Scored<TextChunk>>> = stream::iter(jobs)
        .map(|(search, vector)| async move {
            let hits = with_timeout(
                limit,
                "vector search",
                index.search(&vector, search.k, &search.filters),
            )
            .await?;
            Ok::<_, AppError>(
                hits.into_iter()
                    .filter(|hit| search.filters.matches(&hit.chunk))
                    .map(|hit| Scored::new(hit.chunk).with_vector_score(hit.score))
                    .collect(),
            )
        })
        .buffered(concurrency)
        .try_collect()
        .await?;

    for batch in batches {
        merge_scored_by_id(&mut ctx.candidates, batch);
    }
    debug!(
        searches = ctx.vector_queries,
        candidates = ctx.candidates.len(),
        "Collected chunk candidates"
    );
    Ok(())
}

#[instrument(level = "trace", skip_all)]
pub fn rank(ctx: &mut PipelineContext<'_>) {
    let weights = FusionWeights {
        lexical: ctx.config.tuning.lexical_match_weight,
        ..FusionWeights::default()
    };
    let terms = extract_keywords(&ctx.request.query);

    let mut ranked: Vec<Scored<TextChunk>> = ctx
        .candidates
        .drain()
        .map(|(_, candidate)| {
            let lexical = lexical_overlap_score(&terms, &candidate.item.text);
            let mut scored = candidate.with_lexical_score(lexical);
            let fused = fuse_scores(&scored.scores, weights);
            scored.update_fused(fused);
            scored
        })
        .collect();
    sort_by_fused_desc(&mut ranked);
    ctx.ranked = ranked;
}

/// Caps how many chunks one document may contribute, keeping rank order.
#[instrument(level = "trace", skip_all)]
pub fn diversify(ctx: &mut PipelineContext<'_>) {
    let cap = ctx.config.tuning.max_chunks_per_document.max(1);
    let before = ctx.ranked.len();
    let mut per_document: HashMap<String, usize> = HashMap::new();
    ctx.ranked.retain(|candidate| {
        let seen = per_document
            .entry(candidate.item.document_id.clone())
            .or_insert(0);
        *seen = seen.saturating_add(1);
        *seen <= cap
    });
    debug!(before, after = ctx.ranked.len(), cap, "Applied per-document cap");
}

#[instrument(level = "trace", skip_all)]
pub fn assemble(ctx: &mut PipelineContext<'_>) {
    let limit = ctx.config.tuning.result_limit(ctx.config.strategy);
    let mut ranked = std::mem::take(&mut ctx.ranked);
    ranked.truncate(limit);
    ctx.chunk_results = ranked
        .into_iter()
        .map(|scored| RetrievedChunk {
            chunk: scored.item,
            score: scored.fused,
        })
        .collect();
}

/// Oldest first; undated chunks go last. Ties keep their rank order.
pub fn order_chronologically(chunks: &mut [RetrievedChunk]) {
    chunks.sort_by(|a, b| {
        match (&a.chunk.source_date, &b.chunk.source_date) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}
