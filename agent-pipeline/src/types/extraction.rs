use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::component::ComponentType;

/// Literal text span backing an extracted fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceQuote {
    pub text: String,
    #[serde(default)]
    pub chunk_index: Option<usize>,
    #[serde(default)]
    pub document_id: Option<String>,
}

impl SourceQuote {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            chunk_index: None,
            document_id: None,
        }
    }
}

/// Grounded facts for one expected component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub component_type: ComponentType,
    pub extracted_data: Map<String, Value>,
    pub source_quotes: Vec<SourceQuote>,
    pub completeness: f32,
    pub warnings: Vec<String>,
}

impl ExtractionResult {
    pub const COMPLETENESS_THRESHOLD: f32 = 0.5;

    /// Builds a result with completeness clamped to `[0, 1]` and forced to zero without data.
    pub fn new(
        component_type: ComponentType,
        extracted_data: Map<String, Value>,
        source_quotes: Vec<SourceQuote>,
        completeness: f32,
        warnings: Vec<String>,
    ) -> Self {
        let completeness = if has_values(&extracted_data) && completeness.is_finite() {
            completeness.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            component_type,
            extracted_data,
            source_quotes,
            completeness,
            warnings,
        }
    }

    pub fn empty(component_type: ComponentType, reason: impl Into<String>) -> Self {
        Self {
            component_type,
            extracted_data: Map::new(),
            source_quotes: Vec::new(),
            completeness: 0.0,
            warnings: vec![reason.into()],
        }
    }

    pub fn has_data(&self) -> bool {
        has_values(&self.extracted_data)
    }

    pub fn is_complete(&self) -> bool {
        self.completeness >= Self::COMPLETENESS_THRESHOLD && self.has_data()
    }

    /// Whether the composer owes the reader a limited-data notice for this extraction.
    pub fn needs_notice(&self) -> bool {
        self.completeness < Self::COMPLETENESS_THRESHOLD || !self.warnings.is_empty()
    }
}

/// True when at least one field carries something other than null or an empty collection.
pub fn has_values(data: &Map<String, Value>) -> bool {
    data.values().any(|value| match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    })
}
