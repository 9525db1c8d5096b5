use std::time::Duration;

use common::{billing::cost::DEFAULT_MARGIN, utils::config::AppConfig};

/// Knobs for the agent stages and the orchestration around them.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTuning {
    pub verifier_enabled: bool,
    /// Concurrent extraction calls per query.
    pub extraction_concurrency: usize,
    pub cost_margin: f64,
    pub cache_ttl: Duration,
    /// Maximum characters of context the verifier sees.
    pub verifier_context_chars: usize,
}

impl Default for AgentTuning {
    fn default() -> Self {
        Self {
            verifier_enabled: true,
            extraction_concurrency: 4,
            cost_margin: DEFAULT_MARGIN,
            cache_ttl: Duration::from_secs(3600),
            verifier_context_chars: 24_000,
        }
    }
}

impl AgentTuning {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            verifier_enabled: config.agent_verifier_enabled,
            extraction_concurrency: config.agent_extraction_concurrency.max(1),
            cost_margin: config.agent_cost_margin.max(0.0),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            ..Self::default()
        }
    }
}
