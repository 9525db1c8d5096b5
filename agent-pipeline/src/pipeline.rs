use std::{sync::Arc, time::Instant};

use common::{
    billing::cost::{CostBreakdown, ResourceUsage},
    cache::{query_fingerprint, ResultCache},
    error::AppError,
    storage::vector_index::SearchFilters,
    utils::llm::{LanguageModel, TokenUsage},
};
use retrieval_pipeline::{RetrievalRequest, RetrievalStrategy, Retriever, SourceDocument};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    composer::{LlmResponseComposer, ResponseComposer},
    config::AgentTuning,
    extractor::{extract_all, DataExtractor, LlmDataExtractor},
    planner::{LlmQueryPlanner, QueryPlanner},
    schemas::ExtractionSchemaRegistry,
    types::{
        component::{Component, Layout},
        intent::IntentResult,
        query::{Query, QueryMetadata},
        verification::VerificationResult,
    },
    verifier::{LlmResponseVerifier, ResponseVerifier},
};

/// Everything one answered question produced. Also the cached representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub layout: Layout,
    pub components: Vec<Component>,
    pub cost: CostBreakdown,
    pub cached: bool,
    pub metadata: QueryMetadata,
    pub sources: Vec<SourceDocument>,
    #[serde(default)]
    pub verification: Option<VerificationResult>,
}

/// Language models per agent role.
pub struct AgentModels {
    pub planner: Arc<dyn LanguageModel>,
    pub extractor: Arc<dyn LanguageModel>,
    pub composer: Arc<dyn LanguageModel>,
    pub verifier: Arc<dyn LanguageModel>,
}

/// Planner, retriever, extractor, composer and verifier run in sequence, with a result cache in
/// front.
pub struct QueryPipeline {
    planner: Arc<dyn QueryPlanner>,
    retriever: Arc<dyn Retriever>,
    extractor: Arc<dyn DataExtractor>,
    composer: Arc<dyn ResponseComposer>,
    verifier: Option<Arc<dyn ResponseVerifier>>,
    cache: Arc<dyn ResultCache>,
    tuning: AgentTuning,
    model_name: String,
}

impl QueryPipeline {
    pub fn new(
        planner: Arc<dyn QueryPlanner>,
        retriever: Arc<dyn Retriever>,
        extractor: Arc<dyn DataExtractor>,
        composer: Arc<dyn ResponseComposer>,
        cache: Arc<dyn ResultCache>,
        tuning: AgentTuning,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            planner,
            retriever,
            extractor,
            composer,
            verifier: None,
            cache,
            tuning,
            model_name: model_name.into(),
        }
    }

    /// Wires the model-backed agents.
    pub fn with_language_models(
        models: AgentModels,
        schemas: Arc<ExtractionSchemaRegistry>,
        retriever: Arc<dyn Retriever>,
        cache: Arc<dyn ResultCache>,
        tuning: AgentTuning,
    ) -> Self {
        let model_name = models.composer.model_name().to_string();
        let verifier = LlmResponseVerifier::new(models.verifier)
            .with_context_limit(tuning.verifier_context_chars);
        Self::new(
            Arc::new(LlmQueryPlanner::new(models.planner)),
            retriever,
            Arc::new(LlmDataExtractor::new(models.extractor, schemas)),
            Arc::new(LlmResponseComposer::new(models.composer)),
            cache,
            tuning,
            model_name,
        )
        .with_verifier(Arc::new(verifier))
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn ResponseVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Answers `query` and caches a fresh outcome right away.
    ///
    /// Billed callers use [`QueryPipeline::answer`] and [`QueryPipeline::publish`] instead so that
    /// nothing is cached before the invocation is paid for.
    pub async fn execute(&self, query: &Query) -> Result<QueryOutcome, AppError> {
        let outcome = self.answer(query).await?;
        self.publish(query, &outcome).await;
        Ok(outcome)
    }

    /// Answers `query` from the cache or by running every stage. Never writes the cache.
    #[instrument(skip_all, fields(session = %query.session_id))]
    pub async fn answer(&self, query: &Query) -> Result<QueryOutcome, AppError> {
        let started = Instant::now();
        if query.text.trim().is_empty() {
            return Err(AppError::Validation("query text is empty".to_string()));
        }

        let cache_key = query_fingerprint(&query.text, &query.filters)?;
        if let Some(mut outcome) = self.cached(&cache_key).await {
            outcome.cached = true;
            outcome.cost = CostBreakdown::zero();
            outcome.metadata.processing_time_ms = elapsed_ms(started);
            info!("Answered from cache");
            return Ok(outcome);
        }

        let mut llm_usage = TokenUsage::default();

        let (intent, planner_usage) = self.planner.analyze(&query.text).await;
        llm_usage.add(planner_usage);

        let request = retrieval_request(query, &intent);
        let retrieval = self
            .retriever
            .retrieve(intent.retrieval_strategy, request)
            .await?;
        let context = retrieval.texts();

        let (extractions, extraction_usage) = extract_all(
            self.extractor.as_ref(),
            &intent.expected_components,
            &context,
            &intent,
            self.tuning.extraction_concurrency,
        )
        .await;
        llm_usage.add(extraction_usage);

        let (layout, components, composer_usage) = self
            .composer
            .compose(&query.text, &intent, &extractions, retrieval.sufficient)
            .await?;
        llm_usage.add(composer_usage);

        let verification = match (&self.verifier, self.tuning.verifier_enabled) {
            (Some(verifier), true) => {
                let (result, usage) = verifier.verify(&layout, &components, &context).await;
                llm_usage.add(usage);
                if !result.is_valid {
                    warn!(
                        errors = result.error_count(),
                        "Response contains unsupported claims"
                    );
                }
                Some(result)
            }
            _ => None,
        };

        let usage = ResourceUsage {
            embedding_tokens: retrieval.embedding_tokens,
            llm_input_tokens: llm_usage.input_tokens,
            llm_output_tokens: llm_usage.output_tokens,
            vector_queries: retrieval.vector_queries,
        };
        let cost = CostBreakdown::calculate(usage, self.tuning.cost_margin);

        let outcome = QueryOutcome {
            layout,
            components,
            cost,
            cached: false,
            metadata: QueryMetadata {
                documents_retrieved: retrieval.documents_retrieved,
                chunks_used: retrieval.chunks_used,
                processing_time_ms: elapsed_ms(started),
                model: self.model_name.clone(),
            },
            sources: retrieval.sources(),
            verification,
        };

        info!(
            query_type = %intent.query_type,
            strategy = %intent.retrieval_strategy,
            components = outcome.components.len(),
            total_credits = cost.total_credits,
            ms = outcome.metadata.processing_time_ms,
            "Query answered"
        );
        Ok(outcome)
    }

    /// Cache lookups never fail a query; errors and unreadable entries count as misses.
    async fn cached(&self, key: &str) -> Option<QueryOutcome> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<QueryOutcome>(&raw) {
                Ok(outcome) => Some(outcome),
                Err(err) => {
                    warn!(error = %err, "Ignoring unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "Result cache unavailable; treating as miss");
                None
            }
        }
    }

    /// Caches a freshly computed outcome. Best effort; cache hits are not written back.
    pub async fn publish(&self, query: &Query, outcome: &QueryOutcome) {
        if outcome.cached {
            return;
        }
        let key = match query_fingerprint(&query.text, &query.filters) {
            Ok(key) => key,
            Err(err) => {
                warn!(error = %err, "Could not fingerprint query for caching");
                return;
            }
        };
        let serialized = match serde_json::to_string(outcome) {
            Ok(serialized) => serialized,
            Err(err) => {
                warn!(error = %err, "Could not serialize outcome for caching");
                return;
            }
        };
        match self
            .cache
            .set(&key, serialized, self.tuning.cache_ttl)
            .await
        {
            Ok(()) => debug!("Cached query outcome"),
            Err(err) => warn!(error = %err, "Failed to cache query outcome"),
        }
    }
}

fn retrieval_request(query: &Query, intent: &IntentResult) -> RetrievalRequest {
    RetrievalRequest {
        query: query.text.clone(),
        search_queries: intent.rewritten_queries.clone(),
        entity_terms: intent.entities.search_terms(),
        filters: search_filters(&query.filters, intent),
    }
}

/// Caller filters win; the chronological strategy fills open date bounds from the intent.
fn search_filters(filters: &SearchFilters, intent: &IntentResult) -> SearchFilters {
    let mut filters = filters.clone();
    if intent.retrieval_strategy == RetrievalStrategy::Chronological {
        if filters.date_from.is_none() {
            filters.date_from.clone_from(&intent.entities.date_from);
        }
        if filters.date_to.is_none() {
            filters.date_to.clone_from(&intent.entities.date_to);
        }
    }
    filters
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
