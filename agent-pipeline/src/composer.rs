use std::sync::Arc;

use async_trait::async_trait;
use common::{
    error::AppError,
    utils::{
        json::parse_json_payload,
        llm::{ChatMessage, LanguageModel, TokenUsage},
    },
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::{
    prompts,
    types::{
        component::{
            Component, ComponentBody, ComponentType, Layout, NoticeLevel, Section, SectionLayout,
        },
        extraction::ExtractionResult,
        intent::IntentResult,
    },
};

/// Output of a successful composition.
pub type Composition = (Layout, Vec<Component>, TokenUsage);

/// Turns extracted data into a layout of typed components.
///
/// Only a response with no usable component at all is an error.
#[async_trait]
pub trait ResponseComposer: Send + Sync {
    async fn compose(
        &self,
        query: &str,
        intent: &IntentResult,
        extractions: &[ExtractionResult],
        retrieval_sufficient: bool,
    ) -> Result<Composition, AppError>;
}

pub struct LlmResponseComposer {
    model: Arc<dyn LanguageModel>,
}

impl LlmResponseComposer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    fn build_prompt(
        query: &str,
        intent: &IntentResult,
        extractions: &[ExtractionResult],
    ) -> Result<String, AppError> {
        let (low, high) = intent.response_depth.section_range();
        let section_range = format!("{low}-{high}");
        let depth = intent.response_depth.to_string();
        let intent_summary = serde_json::to_string(&json!({
            "query_type": intent.query_type,
            "entities": intent.entities,
            "response_depth": intent.response_depth,
        }))?;
        let extracted_data = serde_json::to_string_pretty(extractions)?;

        Ok(prompts::render(
            prompts::COMPOSER_PROMPT,
            &[
                ("section_range", section_range.as_str()),
                ("depth", depth.as_str()),
                ("query", query),
                ("intent", intent_summary.as_str()),
                ("extracted_data", extracted_data.as_str()),
            ],
        ))
    }
}

#[async_trait]
impl ResponseComposer for LlmResponseComposer {
    #[instrument(skip_all, fields(model = %self.model.model_name(), extractions = extractions.len()))]
    async fn compose(
        &self,
        query: &str,
        intent: &IntentResult,
        extractions: &[ExtractionResult],
        retrieval_sufficient: bool,
    ) -> Result<Composition, AppError> {
        let messages = [
            ChatMessage::system(prompts::COMPOSER_SYSTEM),
            ChatMessage::user(Self::build_prompt(query, intent, extractions)?),
        ];
        let completion = self.model.complete(&messages).await?;
        let draft: DraftLayout = parse_json_payload(&completion.content)?;

        let (layout, components) = finalize(draft, query, extractions, retrieval_sufficient)?;
        debug!(
            sections = layout.sections.len(),
            components = components.len(),
            "Composed response"
        );
        Ok((layout, components, completion.usage))
    }
}

#[derive(Debug, Default, Deserialize)]
struct DraftLayout {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default)]
    sections: Option<Vec<DraftSection>>,
}

#[derive(Debug, Default, Deserialize)]
struct DraftSection {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    layout: Option<String>,
    #[serde(default)]
    components: Option<Vec<Value>>,
}

const NOTES_SECTION: &str = "About this answer";

/// Maps model output onto components and enforces the layout guarantees the renderer relies on.
fn finalize(
    draft: DraftLayout,
    query: &str,
    extractions: &[ExtractionResult],
    retrieval_sufficient: bool,
) -> Result<(Layout, Vec<Component>), AppError> {
    let title = draft
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| query.to_string());
    let subtitle = draft
        .subtitle
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let mut components: Vec<Component> = Vec::new();
    let mut sections: Vec<Section> = Vec::new();
    for draft_section in draft.sections.unwrap_or_default() {
        let mut component_ids = Vec::new();
        for raw in draft_section.components.unwrap_or_default() {
            match Component::from_model_value(&raw) {
                Some(component) => {
                    component_ids.push(component.id.clone());
                    components.push(component);
                }
                None => {
                    let raw_type = raw
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("<missing>");
                    warn!(component_type = raw_type, "Dropping unsupported component");
                }
            }
        }
        if component_ids.is_empty() {
            continue;
        }
        sections.push(Section {
            title: draft_section.title.filter(|t| !t.trim().is_empty()),
            component_ids,
            layout: match draft_section.layout.as_deref().map(str::trim) {
                Some(l) if l.eq_ignore_ascii_case("grid") => SectionLayout::Grid,
                _ => SectionLayout::Stack,
            },
        });
    }

    if components.is_empty() {
        return Err(AppError::Processing(
            "composer produced no usable components".to_string(),
        ));
    }

    ensure_leading_text_block(&mut components, &mut sections, &title, subtitle.as_deref());

    let mut notes = Vec::new();
    let model_notices = components
        .iter()
        .any(|c| matches!(c.body, ComponentBody::Notice(_)));
    if !model_notices {
        notes.extend(
            extractions
                .iter()
                .filter(|e| e.needs_notice())
                .map(data_notice),
        );
    }
    if !retrieval_sufficient {
        notes.push(Component::notice(
            NoticeLevel::Info,
            Some("Limited sources".to_string()),
            "Only a few source documents matched this question, so the answer may be incomplete.",
        ));
    }
    if !notes.is_empty() {
        sections.push(Section {
            title: Some(NOTES_SECTION.to_string()),
            component_ids: notes.iter().map(|n| n.id.clone()).collect(),
            layout: SectionLayout::Stack,
        });
        components.extend(notes);
    }

    Ok((
        Layout {
            title,
            subtitle,
            sections,
        },
        components,
    ))
}

/// Makes the first component in reading order a text block, moving or synthesizing one.
fn ensure_leading_text_block(
    components: &mut Vec<Component>,
    sections: &mut Vec<Section>,
    title: &str,
    subtitle: Option<&str>,
) {
    let Some(first_section) = sections.first() else {
        return;
    };
    let first_is_text = first_section
        .component_ids
        .first()
        .and_then(|id| components.iter().find(|c| &c.id == id))
        .is_some_and(|c| c.component_type() == ComponentType::TextBlock);
    if first_is_text {
        return;
    }

    let existing = sections
        .iter()
        .flat_map(|s| s.component_ids.iter())
        .find(|id| {
            components
                .iter()
                .any(|c| &c.id == *id && c.component_type() == ComponentType::TextBlock)
        })
        .cloned();

    let leading_id = if let Some(id) = existing {
        for section in sections.iter_mut() {
            section
                .component_ids
                .retain(|existing_id| existing_id != &id);
        }
        id
    } else {
        let block = Component::text_block(None, subtitle.unwrap_or(title));
        let id = block.id.clone();
        components.insert(0, block);
        id
    };

    if let Some(first) = sections.first_mut() {
        first.component_ids.insert(0, leading_id);
    }
    // Moving a block can empty the section it came from.
    sections.retain(|section| !section.component_ids.is_empty());
    reorder(components, sections);
}

/// Keeps the component list in section reading order.
fn reorder(components: &mut Vec<Component>, sections: &[Section]) {
    let mut ordered = Vec::with_capacity(components.len());
    for id in sections.iter().flat_map(|s| s.component_ids.iter()) {
        if let Some(position) = components.iter().position(|c| &c.id == id) {
            ordered.push(components.swap_remove(position));
        }
    }
    ordered.append(components);
    *components = ordered;
}

fn data_notice(extraction: &ExtractionResult) -> Component {
    let level = if extraction.is_complete() {
        NoticeLevel::Info
    } else {
        NoticeLevel::Warning
    };
    let mut message = format!(
        "Limited data was available for the {} component.",
        extraction.component_type
    );
    if !extraction.warnings.is_empty() {
        message.push(' ');
        message.push_str(&extraction.warnings.join(" "));
    }
    Component::notice(level, Some("Limited data".to_string()), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedModel, REPLY_USAGE};
    use serde_json::Map;
    use std::collections::HashSet;

    fn extraction(component_type: ComponentType, completeness: f32) -> ExtractionResult {
        let mut data = Map::new();
        data.insert("total_for".into(), json!(310));
        ExtractionResult::new(component_type, data, Vec::new(), completeness, Vec::new())
    }

    fn composer(reply: &str) -> LlmResponseComposer {
        LlmResponseComposer::new(Arc::new(ScriptedModel::new("composer").reply(reply)))
    }

    fn assert_well_formed(layout: &Layout, components: &[Component]) {
        let ids: HashSet<&str> = components.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), components.len(), "component ids are unique");
        for section in &layout.sections {
            assert!(!section.component_ids.is_empty());
            for id in &section.component_ids {
                assert!(ids.contains(id.as_str()), "section references {id}");
            }
        }
        assert_eq!(
            components.first().map(Component::component_type),
            Some(ComponentType::TextBlock)
        );
    }

    const VOTE_LAYOUT: &str = r#"{
      "title": "Housing Bill vote",
      "subtitle": "The bill passed 310 to 120",
      "sections": [
        {"title": "Summary", "layout": "stack", "components": [
          {"type": "text_block", "content": "The Housing Bill passed its third reading."},
          {"type": "Vote", "total_for": "310", "total_against": 120, "result": "passed"}
        ]},
        {"title": "Extras", "components": [{"type": "map", "regions": []}]}
      ]
    }"#;

    #[tokio::test]
    async fn maps_components_and_drops_unknown_types() {
        let extractions = vec![extraction(ComponentType::VotingBreakdown, 0.9)];
        let intent = IntentResult::default_factual("How did the vote go?");

        let (layout, components, usage) = composer(VOTE_LAYOUT)
            .compose("How did the vote go?", &intent, &extractions, true)
            .await
            .expect("composed");

        assert_eq!(layout.title, "Housing Bill vote");
        assert_eq!(
            layout.sections.len(),
            1,
            "section with only unknown components is removed"
        );
        assert_eq!(components.len(), 2);
        match &components[1].body {
            ComponentBody::VotingBreakdown(vote) => assert_eq!(vote.total_for, 310),
            other => panic!("unexpected component {other:?}"),
        }
        assert_eq!(usage, REPLY_USAGE);
        assert_well_formed(&layout, &components);
    }

    #[tokio::test]
    async fn low_completeness_adds_limited_data_notice() {
        let extractions = vec![extraction(ComponentType::VotingBreakdown, 0.3)];
        let intent = IntentResult::default_factual("How did the vote go?");

        let (layout, components, _) = composer(VOTE_LAYOUT)
            .compose("How did the vote go?", &intent, &extractions, true)
            .await
            .expect("composed");

        let notice = components
            .iter()
            .find_map(|c| match &c.body {
                ComponentBody::Notice(notice) => Some(notice),
                _ => None,
            })
            .expect("notice present");
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert!(notice.message.contains("Limited data"));
        assert_eq!(
            layout.sections.last().and_then(|s| s.title.as_deref()),
            Some(NOTES_SECTION)
        );
        assert_well_formed(&layout, &components);
    }

    #[tokio::test]
    async fn model_notices_are_not_duplicated() {
        let reply = r#"{"title": "Vote", "sections": [{"components": [
            {"type": "text_block", "content": "Partial record."},
            {"type": "notice", "level": "warning", "message": "Only partial vote data was found."}
        ]}]}"#;
        let extractions = vec![extraction(ComponentType::VotingBreakdown, 0.3)];
        let intent = IntentResult::default_factual("q");

        let (_, components, _) = composer(reply)
            .compose("q", &intent, &extractions, true)
            .await
            .expect("composed");

        let notices = components
            .iter()
            .filter(|c| c.component_type() == ComponentType::Notice)
            .count();
        assert_eq!(notices, 1);
    }

    #[tokio::test]
    async fn insufficient_retrieval_adds_notice() {
        let reply = r#"{"title": "Vote", "sections": [{"components": [{"type": "text_block", "content": "x"}]}]}"#;
        let intent = IntentResult::default_factual("q");

        let (_, components, _) = composer(reply)
            .compose("q", &intent, &[], false)
            .await
            .expect("composed");

        assert!(components.iter().any(|c| matches!(
            &c.body,
            ComponentBody::Notice(n) if n.title.as_deref() == Some("Limited sources")
        )));
    }

    #[tokio::test]
    async fn missing_text_block_is_synthesized_from_subtitle() {
        let reply = r#"{"title": "Vote", "subtitle": "Passed 310 to 120", "sections": [
            {"components": [{"type": "voting_breakdown", "total_for": 310, "total_against": 120}]}
        ]}"#;
        let intent = IntentResult::default_factual("q");

        let (layout, components, _) = composer(reply)
            .compose("q", &intent, &[], true)
            .await
            .expect("composed");

        match &components[0].body {
            ComponentBody::TextBlock(block) => assert_eq!(block.content, "Passed 310 to 120"),
            other => panic!("unexpected component {other:?}"),
        }
        assert_well_formed(&layout, &components);
    }

    #[tokio::test]
    async fn later_text_block_is_moved_to_the_front() {
        let reply = r#"{"title": "Vote", "sections": [
            {"components": [{"type": "chart", "series": []}]},
            {"components": [{"type": "text_block", "content": "Context first."}]}
        ]}"#;
        let intent = IntentResult::default_factual("q");

        let (layout, components, _) = composer(reply)
            .compose("q", &intent, &[], true)
            .await
            .expect("composed");

        assert_eq!(components.len(), 2);
        assert_eq!(layout.sections.len(), 1);
        assert_well_formed(&layout, &components);
    }

    #[tokio::test]
    async fn unusable_output_is_an_error() {
        let intent = IntentResult::default_factual("q");
        let unparseable = composer("Here is your answer!")
            .compose("q", &intent, &[], true)
            .await;
        assert!(matches!(unparseable, Err(AppError::LLMParsing(_))));

        let empty =
            composer(r#"{"title": "t", "sections": [{"components": [{"type": "hologram"}]}]}"#)
                .compose("q", &intent, &[], true)
                .await;
        assert!(matches!(empty, Err(AppError::Processing(_))));
    }
}
