use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use common::utils::{
    json::parse_json_payload,
    llm::{ChatMessage, LanguageModel, TokenUsage},
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::{
    prompts,
    types::{
        component::{coerce_number, Component, ComponentBody, Layout},
        verification::{Severity, UnsupportedClaim, VerificationResult},
    },
};

/// Checks a composed response against the context it was built from.
///
/// Verification is advisory. Failures degrade to a passing result with a warning.
#[async_trait]
pub trait ResponseVerifier: Send + Sync {
    async fn verify(
        &self,
        layout: &Layout,
        components: &[Component],
        context: &[String],
    ) -> (VerificationResult, TokenUsage);
}

pub struct LlmResponseVerifier {
    model: Arc<dyn LanguageModel>,
    context_chars: usize,
}

impl LlmResponseVerifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            context_chars: 24_000,
        }
    }

    /// Caps how much of the retrieved context goes into the prompt.
    pub fn with_context_limit(mut self, chars: usize) -> Self {
        self.context_chars = chars;
        self
    }

    fn build_prompt(
        &self,
        layout: &Layout,
        components: &[Component],
        context: &[String],
    ) -> Result<String, serde_json::Error> {
        let context: String = prompts::join_context(context)
            .chars()
            .take(self.context_chars)
            .collect();
        let response = serde_json::to_string_pretty(&json!({
            "title": layout.title,
            "subtitle": layout.subtitle,
            "components": components
                .iter()
                .map(|c| json!({
                    "id": c.id,
                    "type": c.component_type(),
                    "claims": c.claim_texts(),
                }))
                .collect::<Vec<_>>(),
        }))?;
        Ok(prompts::render(
            prompts::VERIFIER_PROMPT,
            &[
                ("response", response.as_str()),
                ("context", context.as_str()),
            ],
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
struct VerifierOutput {
    #[serde(default)]
    unsupported_claims: Option<Vec<RawClaim>>,
    #[serde(default)]
    confidence_score: Option<Value>,
    #[serde(default)]
    warnings: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawClaim {
    #[serde(default)]
    claim_text: Option<String>,
    #[serde(default)]
    component_id: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl VerifierOutput {
    // The model's own `is_valid` is ignored; validity follows from claim severities.
    fn into_result(self) -> VerificationResult {
        let claims = self
            .unsupported_claims
            .unwrap_or_default()
            .into_iter()
            .filter_map(|raw| {
                let claim_text = raw.claim_text?.trim().to_string();
                if claim_text.is_empty() {
                    return None;
                }
                let severity = match raw.severity.as_deref().map(str::trim) {
                    Some(s) if s.eq_ignore_ascii_case("error") => Severity::Error,
                    _ => Severity::Warning,
                };
                Some(UnsupportedClaim {
                    claim_text,
                    component_id: raw.component_id.filter(|id| !id.trim().is_empty()),
                    severity,
                    reason: raw.reason,
                })
            })
            .collect();
        #[allow(clippy::cast_possible_truncation)]
        let confidence = self
            .confidence_score
            .as_ref()
            .and_then(coerce_number)
            .map_or(1.0, |c| c as f32);
        VerificationResult::from_claims(claims, confidence, self.warnings.unwrap_or_default())
    }
}

#[async_trait]
impl ResponseVerifier for LlmResponseVerifier {
    #[instrument(skip_all, fields(model = %self.model.model_name(), components = components.len()))]
    async fn verify(
        &self,
        layout: &Layout,
        components: &[Component],
        context: &[String],
    ) -> (VerificationResult, TokenUsage) {
        let prompt = match self.build_prompt(layout, components, context) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(error = %err, "Could not render verification prompt");
                return (
                    VerificationResult::skipped(format!("Verification skipped: {err}")),
                    TokenUsage::default(),
                );
            }
        };
        let messages = [
            ChatMessage::system(prompts::VERIFIER_SYSTEM),
            ChatMessage::user(prompt),
        ];

        let completion = match self.model.complete(&messages).await {
            Ok(completion) => completion,
            Err(err) => {
                warn!(error = %err, "Verifier call failed");
                return (
                    VerificationResult::skipped(format!("Verification skipped: {err}")),
                    TokenUsage::default(),
                );
            }
        };

        match parse_json_payload::<VerifierOutput>(&completion.content) {
            Ok(output) => {
                let result = output.into_result();
                debug!(
                    is_valid = result.is_valid,
                    claims = result.unsupported_claims.len(),
                    "Verified response"
                );
                (result, completion.usage)
            }
            Err(err) => {
                warn!(error = %err, "Verifier output unusable");
                (
                    VerificationResult::skipped(format!("Verification skipped: {err}")),
                    completion.usage,
                )
            }
        }
    }
}

/// Flags numbers and dates shown in the response that never occur in the context.
///
/// Runs without a model call. Notices are skipped since they describe the answer rather than
/// the sources. Zero is ignored because it is what missing counts default to.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroundingRuleVerifier;

impl GroundingRuleVerifier {
    pub fn check(components: &[Component], context: &[String]) -> VerificationResult {
        let grounded: HashSet<String> = context
            .iter()
            .flat_map(|chunk| numeric_tokens(chunk))
            .collect();

        let mut claims = Vec::new();
        let mut checked = 0_usize;
        let mut unsupported = 0_usize;
        for component in components {
            if matches!(component.body, ComponentBody::Notice(_)) {
                continue;
            }
            for claim_text in component.claim_texts() {
                let missing: Vec<String> = numeric_tokens(&claim_text)
                    .into_iter()
                    .filter(|token| token != "0")
                    .inspect(|_| checked = checked.saturating_add(1))
                    .filter(|token| !grounded.contains(token))
                    .collect();
                if missing.is_empty() {
                    continue;
                }
                unsupported = unsupported.saturating_add(missing.len());
                claims.push(UnsupportedClaim {
                    claim_text,
                    component_id: Some(component.id.clone()),
                    severity: Severity::Error,
                    reason: Some(format!("Not found in sources: {}", missing.join(", "))),
                });
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let confidence = if checked == 0 {
            1.0
        } else {
            checked.saturating_sub(unsupported) as f32 / checked as f32
        };
        VerificationResult::from_claims(claims, confidence, Vec::new())
    }
}

#[async_trait]
impl ResponseVerifier for GroundingRuleVerifier {
    async fn verify(
        &self,
        _layout: &Layout,
        components: &[Component],
        context: &[String],
    ) -> (VerificationResult, TokenUsage) {
        (Self::check(components, context), TokenUsage::default())
    }
}

/// Numbers and dates in `text`, with thousands separators removed. Written dates such as
/// "15 March 2024" are normalized to ISO form so they compare equal to "2024-03-15".
fn numeric_tokens(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut tokens = Vec::new();
    let mut index = 0_usize;
    while let Some(word) = words.get(index) {
        let window = words
            .get(index..index.saturating_add(3))
            .unwrap_or_default();
        if let Some(date) = written_date(window) {
            tokens.push(date);
            index = index.saturating_add(3);
            continue;
        }
        scan_word(&mut tokens, word);
        index = index.saturating_add(1);
    }
    tokens
}

/// Day-month-year or month-day-year spelled out over three words.
fn written_date(words: &[&str]) -> Option<String> {
    if words.len() != 3 {
        return None;
    }
    let cleaned: Vec<&str> = words
        .iter()
        .map(|word| {
            let word = word.trim_matches(|c: char| !c.is_ascii_alphanumeric());
            ["st", "nd", "rd", "th"]
                .iter()
                .find_map(|suffix| {
                    word.strip_suffix(suffix)
                        .filter(|day| !day.is_empty() && day.chars().all(|c| c.is_ascii_digit()))
                })
                .unwrap_or(word)
        })
        .collect();
    let joined = cleaned.join(" ");
    ["%d %B %Y", "%B %d %Y"]
        .iter()
        .find_map(|format| chrono::NaiveDate::parse_from_str(&joined, format).ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
}

fn scan_word(tokens: &mut Vec<String>, word: &str) {
    let mut current = String::new();
    for c in word.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_digit() || (!current.is_empty() && matches!(c, ',' | '.' | '-' | '/')) {
            current.push(c);
            continue;
        }
        if !current.is_empty() {
            push_tokens(tokens, &current);
            current.clear();
        }
    }
}

fn push_tokens(tokens: &mut Vec<String>, raw: &str) {
    let raw = raw.trim_end_matches(|c: char| !c.is_ascii_digit());
    if is_iso_date(raw) {
        tokens.push(raw.to_string());
        return;
    }
    for part in raw.split(['-', '/']) {
        let part = part
            .trim_end_matches(|c: char| !c.is_ascii_digit())
            .replace(',', "");
        let part = part.strip_suffix(".0").unwrap_or(&part);
        if !part.is_empty() {
            tokens.push(part.to_string());
        }
    }
}

fn is_iso_date(raw: &str) -> bool {
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_support::{ScriptedModel, REPLY_USAGE},
        types::component::{NoticeLevel, TextBlock, VotingBreakdown},
    };
    use common::error::AppError;

    fn layout() -> Layout {
        Layout {
            title: "Housing Bill".into(),
            subtitle: None,
            sections: Vec::new(),
        }
    }

    fn vote(total_for: u32) -> Component {
        Component::new(ComponentBody::VotingBreakdown(VotingBreakdown {
            title: None,
            date: Some("2024-03-15".into()),
            result: None,
            total_for,
            total_against: 120,
            total_abstentions: 0,
            party_breakdown: Vec::new(),
            caption: None,
        }))
    }

    fn context() -> Vec<String> {
        vec!["On 2024-03-15 the Housing Bill passed with 310 votes to 120.".into()]
    }

    #[test]
    fn tokens_cover_numbers_and_dates() {
        assert_eq!(
            numeric_tokens("On 2024-03-15, 1,204 members voted 310-120 (45.5%)."),
            vec!["2024-03-15", "1204", "310", "120", "45.5"]
        );
        assert!(numeric_tokens("no digits here").is_empty());
        assert_eq!(
            numeric_tokens("Passed on 15 March 2024, then March 2nd, 2024 (310 votes)."),
            vec!["2024-03-15", "2024-03-02", "310"]
        );
    }

    #[test]
    fn written_and_iso_dates_ground_each_other() {
        let prose =
            vec!["The Housing Bill passed on 15 March 2024 with 310 votes to 120.".to_string()];
        let result = GroundingRuleVerifier::check(&[vote(310)], &prose);
        assert!(result.is_valid, "{:?}", result.unsupported_claims);

        let written = Component::new(ComponentBody::TextBlock(TextBlock {
            title: None,
            content: "The bill passed on 15 March 2024.".into(),
        }));
        let result = GroundingRuleVerifier::check(std::slice::from_ref(&written), &context());
        assert!(result.is_valid, "{:?}", result.unsupported_claims);

        let wrong_day =
            vec!["The Housing Bill passed on 16 March 2024 with 310 votes to 120.".to_string()];
        let result = GroundingRuleVerifier::check(&[vote(310)], &wrong_day);
        assert_eq!(result.error_count(), 1);
    }

    #[test]
    fn mismatched_vote_count_is_an_error() {
        let components = vec![
            Component::text_block(None, "The bill passed with 320 votes."),
            vote(310),
        ];

        let result = GroundingRuleVerifier::check(&components, &context());

        assert!(!result.is_valid);
        assert_eq!(result.error_count(), 1);
        let claim = &result.unsupported_claims[0];
        assert_eq!(claim.severity, Severity::Error);
        assert!(claim.claim_text.contains("320 votes"));
        assert_eq!(
            claim.component_id.as_deref(),
            Some(components[0].id.as_str())
        );
    }

    #[test]
    fn grounded_response_passes() {
        let components = vec![
            Component::text_block(None, "Passed on 2024-03-15 by 310 to 120."),
            vote(310),
            Component::notice(NoticeLevel::Info, None, "Completeness 30 of 100"),
        ];

        let result = GroundingRuleVerifier::check(&components, &context());

        assert!(result.is_valid);
        assert!(result.unsupported_claims.is_empty());
        assert!((result.confidence_score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn model_claims_decide_validity() {
        let model = ScriptedModel::new("verifier").reply(
            r#"{"is_valid": true, "confidence_score": "0.4", "warnings": [],
                "unsupported_claims": [
                  {"claim_text": "320 votes for", "severity": "ERROR", "reason": "context says 310"},
                  {"claim_text": "a landslide", "severity": "warning"},
                  {"claim_text": "  "}
                ]}"#,
        );
        let verifier = LlmResponseVerifier::new(Arc::new(model));

        let (result, usage) = verifier.verify(&layout(), &[vote(320)], &context()).await;

        assert!(
            !result.is_valid,
            "error claim overrides the model's verdict"
        );
        assert_eq!(result.unsupported_claims.len(), 2);
        assert_eq!(result.error_count(), 1);
        assert!((result.confidence_score - 0.4).abs() < 1e-6);
        assert_eq!(usage, REPLY_USAGE);
    }

    #[tokio::test]
    async fn prompt_carries_claims_and_truncated_context() {
        let model = Arc::new(ScriptedModel::new("verifier").reply(r#"{"unsupported_claims": []}"#));
        let verifier = LlmResponseVerifier::new(Arc::clone(&model) as Arc<dyn LanguageModel>)
            .with_context_limit(10);

        let (result, _) = verifier.verify(&layout(), &[vote(310)], &context()).await;

        assert!(result.is_valid);
        let prompt = model.prompts().pop().unwrap_or_default();
        assert!(prompt.contains("310 votes for, 120 votes against"));
        assert!(prompt.contains("On 2024-03"));
        assert!(!prompt.contains("Housing Bill passed"));
    }

    #[tokio::test]
    async fn failures_degrade_to_skipped() {
        let failing = LlmResponseVerifier::new(Arc::new(
            ScriptedModel::new("verifier").fail(AppError::Timeout("verifier".into())),
        ));
        let (result, usage) = failing.verify(&layout(), &[vote(310)], &context()).await;
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(usage.is_empty());

        let garbled = LlmResponseVerifier::new(Arc::new(
            ScriptedModel::new("verifier").reply("looks fine to me"),
        ));
        let (result, usage) = garbled.verify(&layout(), &[vote(310)], &context()).await;
        assert!(result.is_valid);
        assert!(result.warnings[0].starts_with("Verification skipped"));
        assert_eq!(usage, REPLY_USAGE);
    }
}
