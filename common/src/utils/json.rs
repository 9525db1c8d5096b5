use serde::de::DeserializeOwned;

use crate::error::AppError;

const FENCE: &str = "```";

/// Returns the interior of the first triple-backtick block, skipping an optional language tag.
/// Content without a fence is returned trimmed.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(start) = trimmed.find(FENCE) else {
        return trimmed;
    };

    let after_open = trimmed.get(start + FENCE.len()..).unwrap_or_default();
    // Drop the language tag (```json) up to the first line break.
    let body = match after_open.find('\n') {
        Some(newline) if is_language_tag(after_open.get(..newline).unwrap_or_default()) => {
            after_open.get(newline + 1..).unwrap_or_default()
        }
        _ => after_open,
    };

    match body.find(FENCE) {
        Some(end) => body.get(..end).unwrap_or_default().trim(),
        None => body.trim(),
    }
}

fn is_language_tag(candidate: &str) -> bool {
    candidate
        .trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Strips fences and deserializes the payload, reporting failures as `LLMParsing`.
pub fn parse_json_payload<T: DeserializeOwned>(content: &str) -> Result<T, AppError> {
    let payload = strip_code_fence(content);
    serde_json::from_str(payload)
        .map_err(|e| AppError::LLMParsing(format!("Failed to parse model JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn bare_json_is_returned_as_is() {
        assert_eq!(strip_code_fence("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn language_tagged_fence_is_unwrapped() {
        let content = "Here you go:\n```json\n{\"query_type\": \"voting\"}\n```\nThanks";
        assert_eq!(strip_code_fence(content), "{\"query_type\": \"voting\"}");
    }

    #[test]
    fn untagged_fence_is_unwrapped() {
        let content = "```\n[1, 2, 3]\n```";
        assert_eq!(strip_code_fence(content), "[1, 2, 3]");
    }

    #[test]
    fn single_line_fence_keeps_payload() {
        assert_eq!(strip_code_fence("```{\"x\": true}```"), "{\"x\": true}");
    }

    #[test]
    fn unterminated_fence_uses_remaining_content() {
        assert_eq!(strip_code_fence("```json\n{\"x\": 2}"), "{\"x\": 2}");
    }

    #[test]
    fn parse_reports_llm_parsing_errors() {
        let parsed: Value = parse_json_payload("```json\n{\"ok\": true}\n```").expect("valid");
        assert_eq!(parsed["ok"], Value::Bool(true));

        let err = parse_json_payload::<Value>("not json at all").expect_err("invalid");
        assert!(matches!(err, AppError::LLMParsing(_)));
    }
}
