pub mod composer;
pub mod config;
pub mod extractor;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod schemas;
pub mod service;
pub mod types;
pub mod verifier;

#[cfg(test)]
mod test_support;

pub use config::AgentTuning;
pub use pipeline::{AgentModels, QueryOutcome, QueryPipeline};
pub use schemas::ExtractionSchemaRegistry;
pub use service::{QueryResponse, QueryService};
pub use types::query::{Query, QueryFilters};
