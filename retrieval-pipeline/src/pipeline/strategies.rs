use super::{
    stages::{
        AssembleStage, ChronologicalOrderStage, DiversifyStage, EmbedStage, PipelineContext,
        PlanStage, RankStage, SearchStage,
    },
    BoxedStage, StrategyDriver,
};
use crate::RetrievalResult;
use common::error::AppError;

fn search_stages() -> Vec<BoxedStage> {
    vec![
        Box::new(PlanStage),
        Box::new(EmbedStage),
        Box::new(SearchStage),
        Box::new(RankStage),
    ]
}

pub struct SingleFocusDriver;

impl StrategyDriver for SingleFocusDriver {
    type Output = RetrievalResult;

    fn stages(&self) -> Vec<BoxedStage> {
        let mut stages = search_stages();
        stages.push(Box::new(AssembleStage));
        stages
    }

    fn finalize(&self, ctx: &mut PipelineContext<'_>) -> Result<Self::Output, AppError> {
        Ok(ctx.take_result())
    }
}

/// Same stages as single focus; the plan fans out one search per entity.
pub struct MultiEntityDriver;

impl StrategyDriver for MultiEntityDriver {
    type Output = RetrievalResult;

    fn stages(&self) -> Vec<BoxedStage> {
        let mut stages = search_stages();
        stages.push(Box::new(AssembleStage));
        stages
    }

    fn finalize(&self, ctx: &mut PipelineContext<'_>) -> Result<Self::Output, AppError> {
        Ok(ctx.take_result())
    }
}

pub struct ChronologicalDriver;

impl StrategyDriver for ChronologicalDriver {
    type Output = RetrievalResult;

    fn stages(&self) -> Vec<BoxedStage> {
        let mut stages = search_stages();
        stages.push(Box::new(AssembleStage));
        stages.push(Box::new(ChronologicalOrderStage));
        stages
    }

    fn finalize(&self, ctx: &mut PipelineContext<'_>) -> Result<Self::Output, AppError> {
        Ok(ctx.take_result())
    }
}

pub struct BroadDriver;

impl StrategyDriver for BroadDriver {
    type Output = RetrievalResult;

    fn stages(&self) -> Vec<BoxedStage> {
        let mut stages = search_stages();
        stages.push(Box::new(DiversifyStage));
        stages.push(Box::new(AssembleStage));
        stages
    }

    fn finalize(&self, ctx: &mut PipelineContext<'_>) -> Result<Self::Output, AppError> {
        Ok(ctx.take_result())
    }
}
