use std::sync::Arc;

use async_trait::async_trait;
use common::utils::{
    json::strip_code_fence,
    llm::{ChatMessage, LanguageModel, TokenUsage},
};
use futures::{stream, StreamExt};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{
    prompts,
    schemas::ExtractionSchemaRegistry,
    types::{component::ComponentType, extraction::ExtractionResult, intent::IntentResult},
};

pub const NO_CONTEXT: &str = "No context available";

/// Pulls grounded facts for one component type out of the retrieved context.
///
/// Implementations never fail; problems come back as an empty result with a warning.
#[async_trait]
pub trait DataExtractor: Send + Sync {
    async fn extract(
        &self,
        component_type: &ComponentType,
        context: &[String],
        intent: &IntentResult,
    ) -> (ExtractionResult, TokenUsage);
}

pub struct LlmDataExtractor {
    model: Arc<dyn LanguageModel>,
    schemas: Arc<ExtractionSchemaRegistry>,
}

impl LlmDataExtractor {
    pub fn new(model: Arc<dyn LanguageModel>, schemas: Arc<ExtractionSchemaRegistry>) -> Self {
        Self { model, schemas }
    }

    fn build_prompt(
        &self,
        component_type: &ComponentType,
        context: &[String],
        intent: &IntentResult,
    ) -> String {
        let template = self.schemas.template_for(component_type);
        let entities = if intent.entities.parties.is_empty() {
            "entities mentioned in context".to_string()
        } else {
            intent.entities.parties.join(", ")
        };
        let query_focus = intent.entities.query_focus();
        let joined = prompts::join_context(context);

        // Context goes last so text inside it is never mistaken for a placeholder.
        prompts::render(
            template,
            &[
                ("grounding_rules", prompts::GROUNDING_RULES),
                ("component_type", component_type.as_str()),
                ("entities", entities.as_str()),
                ("query_focus", query_focus.as_str()),
                ("context", joined.as_str()),
            ],
        )
    }
}

#[async_trait]
impl DataExtractor for LlmDataExtractor {
    #[instrument(skip_all, fields(%component_type, chunks = context.len()))]
    async fn extract(
        &self,
        component_type: &ComponentType,
        context: &[String],
        intent: &IntentResult,
    ) -> (ExtractionResult, TokenUsage) {
        if context.is_empty() {
            debug!("Skipping extraction without context");
            return (
                ExtractionResult::empty(component_type.clone(), NO_CONTEXT),
                TokenUsage::default(),
            );
        }

        let messages = [
            ChatMessage::system(prompts::EXTRACTOR_SYSTEM),
            ChatMessage::user(self.build_prompt(component_type, context, intent)),
        ];

        let completion = match self.model.complete(&messages).await {
            Ok(completion) => completion,
            Err(err) => {
                warn!(error = %err, "Extraction call failed");
                return (
                    ExtractionResult::empty(component_type.clone(), err.to_string()),
                    TokenUsage::default(),
                );
            }
        };

        let parsed = serde_json::from_str::<Value>(strip_code_fence(&completion.content))
            .map_err(|e| format!("Parse error: {e}"))
            .and_then(|payload| {
                self.schemas
                    .validate(component_type, payload)
                    .map_err(|e| e.to_string())
            });

        match parsed {
            Ok(result) => {
                debug!(
                    completeness = result.completeness,
                    warnings = result.warnings.len(),
                    "Extraction finished"
                );
                (result, completion.usage)
            }
            Err(reason) => {
                warn!(%reason, "Extraction output unusable");
                (
                    ExtractionResult::empty(component_type.clone(), reason),
                    completion.usage,
                )
            }
        }
    }
}

/// Runs one extraction per expected component with bounded concurrency.
///
/// Results follow `component_types` order whatever order the calls finish in.
pub async fn extract_all(
    extractor: &dyn DataExtractor,
    component_types: &[ComponentType],
    context: &[String],
    intent: &IntentResult,
    concurrency: usize,
) -> (Vec<ExtractionResult>, TokenUsage) {
    let calls: Vec<_> = component_types
        .iter()
        .map(|component_type| extractor.extract(component_type, context, intent))
        .collect();
    let outcomes: Vec<(ExtractionResult, TokenUsage)> = stream::iter(calls)
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut usage = TokenUsage::default();
    let results = outcomes
        .into_iter()
        .map(|(result, call_usage)| {
            usage.add(call_usage);
            result
        })
        .collect();
    (results, usage)
}
