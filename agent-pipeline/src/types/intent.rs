use std::{fmt, str::FromStr};

use retrieval_pipeline::RetrievalStrategy;
use serde::{Deserialize, Deserializer, Serialize};

use super::component::ComponentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Who, what, when lookups
    #[default]
    Factual,
    Comparative,
    Timeline,
    Voting,
    /// Why and how questions
    Analytical,
}

impl FromStr for QueryType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "factual" => Ok(Self::Factual),
            "comparative" => Ok(Self::Comparative),
            "timeline" => Ok(Self::Timeline),
            "voting" => Ok(Self::Voting),
            "analytical" => Ok(Self::Analytical),
            other => Err(format!("unknown query type '{other}'")),
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Factual => "factual",
            Self::Comparative => "comparative",
            Self::Timeline => "timeline",
            Self::Voting => "voting",
            Self::Analytical => "analytical",
        };
        f.write_str(label)
    }
}

/// How much room the composer has. Brief answers get 1-2 sections, standard 2-4 and
/// comprehensive 4-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseDepth {
    Brief,
    #[default]
    Standard,
    Comprehensive,
}

impl ResponseDepth {
    pub const fn section_range(self) -> (usize, usize) {
        match self {
            Self::Brief => (1, 2),
            Self::Standard => (2, 4),
            Self::Comprehensive => (4, 8),
        }
    }
}

impl FromStr for ResponseDepth {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "brief" => Ok(Self::Brief),
            "standard" => Ok(Self::Standard),
            "comprehensive" => Ok(Self::Comprehensive),
            other => Err(format!("unknown response depth '{other}'")),
        }
    }
}

impl fmt::Display for ResponseDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Brief => "brief",
            Self::Standard => "standard",
            Self::Comprehensive => "comprehensive",
        };
        f.write_str(label)
    }
}

/// Parties, members, bills and topics named or implied by a question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub parties: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub members: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub bills: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub topics: Vec<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub document_types: Vec<String>,
}

// Models write `null` for lists they found nothing for.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ExtractedEntities {
    /// Terms the multi-entity strategy searches for, one search each.
    pub fn search_terms(&self) -> Vec<String> {
        self.parties
            .iter()
            .chain(&self.members)
            .chain(&self.bills)
            .chain(&self.topics)
            .cloned()
            .collect()
    }

    /// One-line summary handed to the extractor, e.g. `Parties: Labor, Greens; Topics: housing`.
    pub fn query_focus(&self) -> String {
        let groups = [
            ("Parties", &self.parties),
            ("Members", &self.members),
            ("Bills", &self.bills),
            ("Topics", &self.topics),
        ];
        let parts: Vec<String> = groups
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(label, values)| format!("{label}: {}", values.join(", ")))
            .collect();
        if parts.is_empty() {
            "General query".to_string()
        } else {
            parts.join("; ")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub query_type: QueryType,
    pub entities: ExtractedEntities,
    /// Never empty; planner output without components falls back to a single text block.
    pub expected_components: Vec<ComponentType>,
    pub retrieval_strategy: RetrievalStrategy,
    /// Never empty; falls back to the original question.
    pub rewritten_queries: Vec<String>,
    pub confidence: f32,
    pub response_depth: ResponseDepth,
}

impl IntentResult {
    /// Intent used whenever classification fails.
    pub fn default_factual(query: &str) -> Self {
        Self {
            query_type: QueryType::Factual,
            entities: ExtractedEntities::default(),
            expected_components: vec![ComponentType::TextBlock],
            retrieval_strategy: RetrievalStrategy::SingleFocus,
            rewritten_queries: vec![query.to_string()],
            confidence: 0.5,
            response_depth: ResponseDepth::Brief,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_intent_is_usable() {
        let intent = IntentResult::default_factual("Who is the treasurer?");
        assert_eq!(intent.query_type, QueryType::Factual);
        assert_eq!(intent.retrieval_strategy, RetrievalStrategy::SingleFocus);
        assert_eq!(intent.rewritten_queries, vec!["Who is the treasurer?"]);
        assert_eq!(intent.expected_components, vec![ComponentType::TextBlock]);
        assert!((intent.confidence - 0.5).abs() < f32::EPSILON);
        assert_eq!(intent.response_depth, ResponseDepth::Brief);
    }

    #[test]
    fn query_focus_lists_populated_groups() {
        let entities = ExtractedEntities {
            parties: vec!["Labor".into(), "Greens".into()],
            topics: vec!["housing".into()],
            ..ExtractedEntities::default()
        };
        assert_eq!(
            entities.query_focus(),
            "Parties: Labor, Greens; Topics: housing"
        );
        assert_eq!(ExtractedEntities::default().query_focus(), "General query");
    }

    #[test]
    fn date_bounds_alone_are_not_entities() {
        let entities = ExtractedEntities {
            date_from: Some("2024-01-01".into()),
            ..ExtractedEntities::default()
        };
        assert!(entities.search_terms().is_empty());
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("Voting".parse::<QueryType>(), Ok(QueryType::Voting));
        assert!("opinion".parse::<QueryType>().is_err());
        assert_eq!(
            "COMPREHENSIVE".parse::<ResponseDepth>(),
            Ok(ResponseDepth::Comprehensive)
        );
        assert_eq!(ResponseDepth::Brief.section_range(), (1, 2));
    }
}
