use std::collections::HashMap;

use common::error::AppError;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    prompts,
    types::{
        component::{coerce_number, ComponentType},
        extraction::{ExtractionResult, SourceQuote},
    },
};

const BOOKKEEPING_KEYS: [&str; 3] = ["source_quotes", "completeness", "warnings"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Integer,
    List,
    /// List of objects; the named keys inside each object are numeric at any depth.
    ObjectList(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

/// Declared output of one component's extraction prompt.
#[derive(Debug, Clone)]
pub struct ExtractionSchema {
    pub component_type: ComponentType,
    pub fields: Vec<FieldSpec>,
    pub template: &'static str,
}

/// Schema lookup by component type, built once at start-up and shared.
#[derive(Debug, Clone)]
pub struct ExtractionSchemaRegistry {
    schemas: HashMap<ComponentType, ExtractionSchema>,
}

impl Default for ExtractionSchemaRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ExtractionSchemaRegistry {
    pub fn empty() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        use FieldKind::{Integer, List, ObjectList, Text};

        let mut registry = Self::empty();
        registry.register(
            ComponentType::VotingBreakdown,
            prompts::VOTING_EXTRACTION,
            vec![
                field("bill_name", Text),
                field("vote_date", Text),
                field("result", Text),
                field("votes_for", Integer),
                field("votes_against", Integer),
                field("total_abstentions", Integer),
                field(
                    "party_breakdown",
                    ObjectList(&["votes_for", "votes_against", "abstentions", "not_voting"]),
                ),
            ],
        );
        registry.register(
            ComponentType::Chart,
            prompts::CHART_EXTRACTION,
            vec![
                field("chart_type", Text),
                field("title", Text),
                field("series", ObjectList(&["value"])),
                field("x_axis_label", Text),
                field("y_axis_label", Text),
            ],
        );
        registry.register(
            ComponentType::Timeline,
            prompts::TIMELINE_EXTRACTION,
            vec![field("title", Text), field("events", ObjectList(&[]))],
        );
        registry.register(
            ComponentType::Comparison,
            prompts::COMPARISON_EXTRACTION,
            vec![
                field("title", Text),
                field("items", ObjectList(&[])),
                field("attributes", ObjectList(&[])),
            ],
        );
        registry.register(
            ComponentType::DataTable,
            prompts::DATA_TABLE_EXTRACTION,
            vec![
                field("title", Text),
                field("columns", ObjectList(&[])),
                field("rows", ObjectList(&[])),
            ],
        );
        registry.register(
            ComponentType::MemberProfiles,
            prompts::MEMBER_PROFILES_EXTRACTION,
            vec![field("title", Text), field("members", ObjectList(&[]))],
        );
        registry.register(
            ComponentType::TextBlock,
            prompts::TEXT_BLOCK_EXTRACTION,
            vec![
                field("title", Text),
                field("key_points", List),
                field("summary_focus", Text),
            ],
        );
        registry.register(
            ComponentType::Notice,
            prompts::NOTICE_EXTRACTION,
            vec![field("notices", ObjectList(&[]))],
        );
        registry
    }

    pub fn register(
        &mut self,
        component_type: ComponentType,
        template: &'static str,
        fields: Vec<FieldSpec>,
    ) {
        self.schemas.insert(
            component_type.clone(),
            ExtractionSchema {
                component_type,
                fields,
                template,
            },
        );
    }

    pub fn get(&self, component_type: &ComponentType) -> Option<&ExtractionSchema> {
        self.schemas.get(component_type)
    }

    pub fn template_for(&self, component_type: &ComponentType) -> &'static str {
        self.get(component_type)
            .map_or(prompts::GENERIC_EXTRACTION, |schema| schema.template)
    }

    /// Turns a parsed model payload into an extraction result.
    ///
    /// Declared fields are kept and coerced; anything else is dropped. Types without a schema
    /// keep every field except the bookkeeping keys.
    pub fn validate(
        &self,
        component_type: &ComponentType,
        payload: Value,
    ) -> Result<ExtractionResult, AppError> {
        let Value::Object(mut object) = payload else {
            return Err(AppError::LLMParsing(format!(
                "{component_type} extraction is not a JSON object"
            )));
        };

        let source_quotes = object
            .remove("source_quotes")
            .map(parse_source_quotes)
            .unwrap_or_default();
        let completeness = object
            .remove("completeness")
            .and_then(|value| coerce_number(&value))
            .unwrap_or(1.0);
        let mut warnings = object
            .remove("warnings")
            .map(parse_warnings)
            .unwrap_or_default();

        let data = match self.get(component_type) {
            Some(schema) => schema.coerce(object, &mut warnings),
            None => {
                debug!(%component_type, "No schema registered; keeping all fields");
                object
            }
        };

        #[allow(clippy::cast_possible_truncation)]
        let completeness = completeness as f32;
        Ok(ExtractionResult::new(
            component_type.clone(),
            data,
            source_quotes,
            completeness,
            warnings,
        ))
    }
}

impl ExtractionSchema {
    fn coerce(
        &self,
        mut object: Map<String, Value>,
        warnings: &mut Vec<String>,
    ) -> Map<String, Value> {
        let mut data = Map::new();
        for spec in &self.fields {
            let Some(value) = object.remove(spec.name) else {
                continue;
            };
            let coerced = match spec.kind {
                FieldKind::Text => coerce_text(value),
                FieldKind::Number => coerce_numeric(spec.name, value, false, warnings),
                FieldKind::Integer => coerce_numeric(spec.name, value, true, warnings),
                FieldKind::List => coerce_list(value),
                FieldKind::ObjectList(numeric_keys) => {
                    let mut list = coerce_list(value);
                    coerce_nested(&mut list, numeric_keys, spec.name, warnings);
                    list
                }
            };
            data.insert(spec.name.to_string(), coerced);
        }
        for key in object
            .keys()
            .filter(|k| !BOOKKEEPING_KEYS.contains(&k.as_str()))
        {
            debug!(component_type = %self.component_type, field = %key, "Dropping undeclared field");
        }
        data
    }
}

fn coerce_text(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        other => other,
    }
}

fn coerce_numeric(field: &str, value: Value, integer: bool, warnings: &mut Vec<String>) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match coerce_number(&value) {
        Some(number) if integer => Value::from(number.round() as i64),
        Some(number) => serde_json::Number::from_f64(number).map_or(Value::Null, Value::Number),
        None => {
            warnings.push(format!("{field}: expected a number, got {value}"));
            Value::Null
        }
    }
}

fn coerce_list(value: Value) -> Value {
    match value {
        Value::Array(_) | Value::Null => value,
        other => Value::Array(vec![other]),
    }
}

fn coerce_nested(value: &mut Value, numeric_keys: &[&str], path: &str, warnings: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                coerce_nested(item, numeric_keys, path, warnings);
            }
        }
        Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                if numeric_keys.contains(&key.as_str()) {
                    let taken = std::mem::take(inner);
                    *inner = coerce_numeric(&format!("{path}.{key}"), taken, false, warnings);
                } else {
                    coerce_nested(inner, numeric_keys, path, warnings);
                }
            }
        }
        _ => {}
    }
}

fn parse_source_quotes(value: Value) -> Vec<SourceQuote> {
    let Value::Array(items) = value else {
        return match value {
            Value::String(text) => vec![SourceQuote::new(text)],
            _ => Vec::new(),
        };
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(SourceQuote::new(text)),
            Value::Object(map) => {
                let text = map.get("text").and_then(Value::as_str)?.to_string();
                Some(SourceQuote {
                    text,
                    chunk_index: map
                        .get("chunk_index")
                        .and_then(Value::as_u64)
                        .and_then(|i| usize::try_from(i).ok()),
                    document_id: map
                        .get("document_id")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            }
            _ => None,
        })
        .filter(|quote| !quote.text.trim().is_empty())
        .collect()
}

fn parse_warnings(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    }
}
