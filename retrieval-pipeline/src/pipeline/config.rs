use common::utils::config::AppConfig;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// One search over the query text
    #[default]
    SingleFocus,
    /// One search per named entity, merged
    MultiEntity,
    /// Date-filtered search ordered oldest first
    Chronological,
    /// Wider search capped per source document
    Broad,
}

impl std::str::FromStr for RetrievalStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single_focus" => Ok(Self::SingleFocus),
            "multi_entity" => Ok(Self::MultiEntity),
            "chronological" => Ok(Self::Chronological),
            "broad" => Ok(Self::Broad),
            other => Err(format!("unknown retrieval strategy '{other}'")),
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RetrievalStrategy::SingleFocus => "single_focus",
            RetrievalStrategy::MultiEntity => "multi_entity",
            RetrievalStrategy::Chronological => "chronological",
            RetrievalStrategy::Broad => "broad",
        };
        f.write_str(label)
    }
}

/// Tunable parameters that govern each retrieval stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalTuning {
    /// Chunks requested per similarity search.
    pub top_k: usize,
    /// Broad searches ask for `top_k * broad_multiplier` chunks.
    pub broad_multiplier: usize,
    /// Per-document cap applied by the broad strategy.
    pub max_chunks_per_document: usize,
    /// Fewer chunks than this marks the result as insufficient.
    pub min_chunks_for_sufficiency: usize,
    /// Concurrent sub-searches issued by the multi-entity strategy.
    pub entity_concurrency: usize,
    /// Weight of query-term overlap added on top of vector similarity.
    pub lexical_match_weight: f32,
    /// Bound on each embedding and similarity-search call.
    pub provider_timeout: Duration,
}

impl Default for RetrievalTuning {
    fn default() -> Self {
        Self {
            top_k: 20,
            broad_multiplier: 2,
            max_chunks_per_document: 3,
            min_chunks_for_sufficiency: 3,
            entity_concurrency: 4,
            lexical_match_weight: 0.1,
            provider_timeout: Duration::from_secs(30),
        }
    }
}

impl RetrievalTuning {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            top_k: config.agent_default_top_k.max(1),
            min_chunks_for_sufficiency: config.agent_min_chunks,
            provider_timeout: Duration::from_secs(config.agent_provider_timeout_secs.max(1)),
            ..Self::default()
        }
    }

    /// Number of chunks a strategy keeps after ranking.
    pub fn result_limit(&self, strategy: RetrievalStrategy) -> usize {
        match strategy {
            RetrievalStrategy::Broad => self.broad_k(),
            _ => self.top_k.max(1),
        }
    }

    pub fn broad_k(&self) -> usize {
        self.top_k.max(1).saturating_mul(self.broad_multiplier.max(1))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalConfig {
    pub strategy: RetrievalStrategy,
    pub tuning: RetrievalTuning,
}

impl RetrievalConfig {
    pub fn new(strategy: RetrievalStrategy, tuning: RetrievalTuning) -> Self {
        Self { strategy, tuning }
    }

    pub fn with_strategy(strategy: RetrievalStrategy) -> Self {
        Self::new(strategy, RetrievalTuning::default())
    }
}
