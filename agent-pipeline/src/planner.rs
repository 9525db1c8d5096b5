use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{
    error::AppError,
    utils::{
        json::parse_json_payload,
        llm::{ChatMessage, LanguageModel, TokenUsage},
    },
};
use retrieval_pipeline::RetrievalStrategy;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{
    prompts,
    types::{
        component::{coerce_number, ComponentType},
        intent::{ExtractedEntities, IntentResult, QueryType, ResponseDepth},
    },
};

const DEFAULT_CONFIDENCE: f32 = 0.8;

/// Classifies a question into an intent. Never fails; falls back to
/// [`IntentResult::default_factual`].
#[async_trait]
pub trait QueryPlanner: Send + Sync {
    async fn analyze(&self, query: &str) -> (IntentResult, TokenUsage);
}

pub struct LlmQueryPlanner {
    model: Arc<dyn LanguageModel>,
}

impl LlmQueryPlanner {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl QueryPlanner for LlmQueryPlanner {
    #[instrument(skip_all, fields(model = %self.model.model_name()))]
    async fn analyze(&self, query: &str) -> (IntentResult, TokenUsage) {
        let messages = [
            ChatMessage::system(prompts::PLANNER_SYSTEM),
            ChatMessage::user(prompts::render(
                prompts::PLANNER_PROMPT,
                &[("query", query)],
            )),
        ];

        let completion = match self.model.complete(&messages).await {
            Ok(completion) => completion,
            Err(err) => {
                warn!(error = %err, "Planner call failed; using default intent");
                return (IntentResult::default_factual(query), TokenUsage::default());
            }
        };

        match parse_intent(&completion.content, query) {
            Ok(intent) => {
                debug!(
                    query_type = %intent.query_type,
                    strategy = %intent.retrieval_strategy,
                    components = intent.expected_components.len(),
                    "Classified query"
                );
                (intent, completion.usage)
            }
            Err(err) => {
                warn!(error = %err, "Planner output unusable; using default intent");
                (IntentResult::default_factual(query), completion.usage)
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PlannerOutput {
    #[serde(default)]
    query_type: Option<String>,
    #[serde(default)]
    entities: Option<ExtractedEntities>,
    #[serde(default)]
    expected_components: Option<Vec<String>>,
    #[serde(default)]
    retrieval_strategy: Option<String>,
    #[serde(default)]
    rewritten_queries: Option<Vec<String>>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default)]
    response_depth: Option<String>,
}

/// Parses planner JSON into an intent, replacing every invalid field with its default.
///
/// Only an unparseable payload is an error.
pub fn parse_intent(content: &str, query: &str) -> Result<IntentResult, AppError> {
    let output: PlannerOutput = parse_json_payload(content)?;

    let query_type = parse_or_default::<QueryType>(output.query_type.as_deref(), "query_type");
    let retrieval_strategy = parse_or_default::<RetrievalStrategy>(
        output.retrieval_strategy.as_deref(),
        "retrieval_strategy",
    );
    let response_depth =
        parse_or_default::<ResponseDepth>(output.response_depth.as_deref(), "response_depth");

    let mut expected_components: Vec<ComponentType> = Vec::new();
    for raw in output.expected_components.unwrap_or_default() {
        if raw.trim().is_empty() {
            continue;
        }
        let component_type = ComponentType::parse(&raw);
        if !expected_components.contains(&component_type) {
            expected_components.push(component_type);
        }
    }
    if expected_components.is_empty() {
        expected_components.push(ComponentType::TextBlock);
    }

    let mut rewritten_queries = clean_list(output.rewritten_queries.unwrap_or_default());
    if rewritten_queries.is_empty() {
        rewritten_queries.push(query.to_string());
    }

    #[allow(clippy::cast_possible_truncation)]
    let confidence = output
        .confidence
        .as_ref()
        .and_then(coerce_number)
        .map_or(DEFAULT_CONFIDENCE, |c| c as f32);
    let confidence = if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        DEFAULT_CONFIDENCE
    };

    Ok(IntentResult {
        query_type,
        entities: clean_entities(output.entities.unwrap_or_default()),
        expected_components,
        retrieval_strategy,
        rewritten_queries,
        confidence,
        response_depth,
    })
}

fn parse_or_default<T>(raw: Option<&str>, field: &str) -> T
where
    T: std::str::FromStr<Err = String> + Default,
{
    match raw {
        Some(raw) => raw.parse().unwrap_or_else(|err: String| {
            warn!(field, error = %err, "Invalid planner field; using default");
            T::default()
        }),
        None => T::default(),
    }
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for value in values {
        let value = value.trim();
        if !value.is_empty() && !cleaned.iter().any(|v| v == value) {
            cleaned.push(value.to_string());
        }
    }
    cleaned
}

fn clean_date(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) => Some(date.format("%Y-%m-%d").to_string()),
        Err(_) => {
            if !value.is_empty() && !value.eq_ignore_ascii_case("null") {
                debug!(value, "Discarding planner date that is not YYYY-MM-DD");
            }
            None
        }
    }
}

fn clean_entities(entities: ExtractedEntities) -> ExtractedEntities {
    ExtractedEntities {
        parties: clean_list(entities.parties),
        members: clean_list(entities.members),
        bills: clean_list(entities.bills),
        topics: clean_list(entities.topics),
        date_from: clean_date(entities.date_from),
        date_to: clean_date(entities.date_to),
        document_types: clean_list(entities.document_types),
    }
}
