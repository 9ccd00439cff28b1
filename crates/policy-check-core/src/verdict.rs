//! Verdict schema validation.
//!
//! Generation output is an untyped payload until it passes
//! [`Verdict::parse_strict`]. A payload that fails is reported as
//! [`ComplianceError::ModelOutputContract`]; no default verdict is ever
//! substituted.

use crate::error::ComplianceError;
use crate::models::{RiskLevel, Verdict};

impl Verdict {
    /// Parse and validate a raw model response.
    ///
    /// Required: `overall_risk` (one of `NONE`, `LOW`, `MEDIUM`, `HIGH`),
    /// `issues` (array), and `explanation` on every issue. `suggested_text`,
    /// `policy_reference`, and `excerpt` may be null or absent. Unknown extra
    /// fields are ignored.
    pub fn parse_strict(raw: &str) -> Result<Verdict, ComplianceError> {
        let value: serde_json::Value = serde_json::from_str(raw.trim())
            .map_err(|e| ComplianceError::ModelOutputContract(format!("invalid JSON: {}", e)))?;

        if !value.is_object() {
            return Err(ComplianceError::ModelOutputContract(
                "expected a JSON object".to_string(),
            ));
        }

        let verdict: Verdict = serde_json::from_value(value)
            .map_err(|e| ComplianceError::ModelOutputContract(e.to_string()))?;
        verdict.validate()?;
        Ok(verdict)
    }

    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ComplianceError> {
        if !self.issues.is_empty() && self.overall_risk == RiskLevel::None {
            return Err(ComplianceError::ModelOutputContract(format!(
                "overall_risk is NONE but {} issue(s) were reported",
                self.issues.len()
            )));
        }

        if let Some(pos) = self
            .issues
            .iter()
            .position(|i| i.explanation.trim().is_empty())
        {
            return Err(ComplianceError::ModelOutputContract(format!(
                "issue {} has an empty explanation",
                pos
            )));
        }

        Ok(())
    }
}
