mod config;
mod stages;
mod strategies;

pub use config::{RetrievalConfig, RetrievalStrategy, RetrievalTuning};
pub use stages::{PipelineContext, PlannedSearch};

use crate::{RetrievalRequest, RetrievalResult};
use async_trait::async_trait;
use common::{error::AppError, storage::vector_index::VectorIndex, utils::embedding::Embedder};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use strategies::{BroadDriver, ChronologicalDriver, MultiEntityDriver, SingleFocusDriver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Plan,
    Embed,
    Search,
    Rank,
    Order,
    Diversify,
    Assemble,
}

#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn kind(&self) -> StageKind;
    async fn execute(&self, ctx: &mut PipelineContext<'_>) -> Result<(), AppError>;
}

pub type BoxedStage = Box<dyn PipelineStage>;

pub trait StrategyDriver: Send + Sync {
    type Output;

    fn stages(&self) -> Vec<BoxedStage>;
    fn finalize(&self, ctx: &mut PipelineContext<'_>) -> Result<Self::Output, AppError>;
}

#[derive(Debug, Default, Clone)]
pub struct PipelineStageTimings {
    timings: Vec<(StageKind, Duration)>,
}

impl PipelineStageTimings {
    pub fn record(&mut self, kind: StageKind, duration: Duration) {
        self.timings.push((kind, duration));
    }

    pub fn into_vec(self) -> Vec<(StageKind, Duration)> {
        self.timings
    }

    pub fn total_ms(&self) -> u128 {
        self.timings.iter().map(|(_, d)| d.as_millis()).sum()
    }
}

pub struct PipelineRunOutput<T> {
    pub results: T,
    pub stage_timings: PipelineStageTimings,
}

pub async fn run_pipeline(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    request: RetrievalRequest,
    config: RetrievalConfig,
) -> Result<PipelineRunOutput<RetrievalResult>, AppError> {
    let input_chars = request.query.chars().count();
    let preview: String = request.query.chars().take(120).collect();
    let preview_clean = preview.replace('\n', " ");
    info!(
        input_chars,
        preview_truncated = input_chars > preview_clean.chars().count(),
        preview = %preview_clean,
        strategy = %config.strategy,
        entity_terms = request.entity_terms.len(),
        "Starting retrieval pipeline"
    );

    let strategy = config.strategy;
    let ctx = PipelineContext::new(embedder, index, request, config);
    let run = match strategy {
        RetrievalStrategy::SingleFocus => run_with_driver(SingleFocusDriver, ctx).await?,
        RetrievalStrategy::MultiEntity => run_with_driver(MultiEntityDriver, ctx).await?,
        RetrievalStrategy::Chronological => run_with_driver(ChronologicalDriver, ctx).await?,
        RetrievalStrategy::Broad => run_with_driver(BroadDriver, ctx).await?,
    };

    for (kind, duration) in run.stage_timings.clone().into_vec() {
        debug!(stage = ?kind, ms = duration.as_millis(), "Retrieval stage finished");
    }
    info!(
        documents = run.results.documents_retrieved,
        chunks = run.results.chunks_used,
        sufficient = run.results.sufficient,
        total_ms = run.stage_timings.total_ms(),
        "Retrieval pipeline finished"
    );

    Ok(run)
}

async fn run_with_driver<D: StrategyDriver>(
    driver: D,
    mut ctx: PipelineContext<'_>,
) -> Result<PipelineRunOutput<D::Output>, AppError> {
    for stage in driver.stages() {
        let start = Instant::now();
        stage.execute(&mut ctx).await?;
        ctx.record_stage_duration(stage.kind(), start.elapsed());
    }

    let stage_timings = ctx.take_stage_timings();
    let results = driver.finalize(&mut ctx)?;

    Ok(PipelineRunOutput {
        results,
        stage_timings,
    })
}

#[cfg(test)]
mod tests;
