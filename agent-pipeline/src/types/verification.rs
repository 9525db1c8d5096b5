use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Characterizations and interpretations without clear support.
    #[default]
    Warning,
    /// Numbers, counts or dates that disagree with the sources.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedClaim {
    pub claim_text: String,
    #[serde(default)]
    pub component_id: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub is_valid: bool,
    pub unsupported_claims: Vec<UnsupportedClaim>,
    pub confidence_score: f32,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl VerificationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            unsupported_claims: Vec::new(),
            confidence_score: 1.0,
            warnings: Vec::new(),
        }
    }

    /// Passing result noting that no check actually ran.
    pub fn skipped(reason: impl Into<String>) -> Self {
        let mut result = Self::valid();
        result.warnings.push(reason.into());
        result
    }

    /// Builds a result whose validity follows from the claim severities alone.
    pub fn from_claims(
        claims: Vec<UnsupportedClaim>,
        confidence_score: f32,
        warnings: Vec<String>,
    ) -> Self {
        let is_valid = !claims.iter().any(|c| c.severity == Severity::Error);
        Self {
            is_valid,
            unsupported_claims: claims,
            confidence_score: if confidence_score.is_finite() {
                confidence_score.clamp(0.0, 1.0)
            } else {
                0.0
            },
            warnings,
        }
    }

    pub fn error_count(&self) -> usize {
        self.unsupported_claims
            .iter()
            .filter(|c| c.severity == Severity::Error)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(severity: Severity) -> UnsupportedClaim {
        UnsupportedClaim {
            claim_text: "claim".into(),
            component_id: None,
            severity,
            reason: None,
        }
    }

    #[test]
    fn validity_follows_error_claims() {
        let warnings_only =
            VerificationResult::from_claims(vec![claim(Severity::Warning)], 0.8, vec![]);
        assert!(warnings_only.is_valid);

        let with_error = VerificationResult::from_claims(
            vec![claim(Severity::Warning), claim(Severity::Error)],
            0.9,
            vec![],
        );
        assert!(!with_error.is_valid);
        assert_eq!(with_error.error_count(), 1);
    }

    #[test]
    fn skipped_is_valid_with_warning() {
        let result = VerificationResult::skipped("Verification skipped: timeout");
        assert!(result.is_valid);
        assert_eq!(result.confidence_score, 1.0);
        assert_eq!(result.warnings.len(), 1);
    }
}
