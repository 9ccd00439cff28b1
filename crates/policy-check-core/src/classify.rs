//! Department and policy-type inference from free text.
//!
//! Used only to fill in retrieval filters the caller left out. The result is
//! a hint: an unusable answer degrades to "no hint" instead of failing the
//! request.

use std::sync::Arc;

use serde_json::Value;

use crate::error::ComplianceError;
use crate::generation::Generator;
use crate::models::PolicyCategory;

const CLASSIFIER_SYSTEM: &str =
    "You classify workplace messages so the right company policies can be retrieved.";

/// Inferred filter values. Either field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub department: Option<String>,
    pub category: Option<PolicyCategory>,
}

pub struct ContextClassifier {
    generator: Arc<dyn Generator>,
}

impl ContextClassifier {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Ask the model for a department and policy type.
    ///
    /// Generation transport errors propagate. A malformed answer is logged
    /// and yields an empty [`Classification`].
    pub async fn classify(&self, text: &str) -> Result<Classification, ComplianceError> {
        let prompt = build_prompt(text);
        let raw = self
            .generator
            .generate(CLASSIFIER_SYSTEM, &prompt, true)
            .await?;

        match parse_classification(&raw) {
            Some(c) => Ok(c),
            None => {
                tracing::warn!(
                    target: "policy_check::model_output",
                    "classifier returned unparseable output; continuing without hint"
                );
                Ok(Classification::default())
            }
        }
    }
}

fn build_prompt(text: &str) -> String {
    let categories = PolicyCategory::ALL
        .iter()
        .map(|c| format!("\"{}\"", c.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"Read the message below and decide which company department it concerns and
which policy area is most relevant.

- department: the department name if the message makes it clear, otherwise null
- policy_type: exactly one of [{categories}], or null if none applies

Return ONLY a JSON object with exactly these two fields:

{{"department": "Sales", "policy_type": "confidentiality"}}

Message:
"""{text}""""#
    )
}

/// Returns `None` only when the payload is not a JSON object.
fn parse_classification(raw: &str) -> Option<Classification> {
    let value: Value = serde_json::from_str(raw.trim()).ok()?;
    let obj = value.as_object()?;

    let department = obj
        .get("department")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let category = obj
        .get("policy_type")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<PolicyCategory>().ok());

    Some(Classification {
        department,
        category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_answer() {
        let c = parse_classification(r#"{"department": "HR", "policy_type": "hr"}"#).unwrap();
        assert_eq!(c.department.as_deref(), Some("HR"));
        assert_eq!(c.category, Some(PolicyCategory::Hr));
    }

    #[test]
    fn test_unknown_category_coerced_to_none() {
        let c = parse_classification(r#"{"department": "Finance", "policy_type": "tax"}"#)
            .unwrap();
        assert_eq!(c.department.as_deref(), Some("Finance"));
        assert_eq!(c.category, None);
    }

    #[test]
    fn test_nulls_and_blanks() {
        let c = parse_classification(r#"{"department": "  ", "policy_type": null}"#).unwrap();
        assert_eq!(c, Classification::default());
        let c = parse_classification(r#"{"department": 7}"#).unwrap();
        assert_eq!(c, Classification::default());
    }

    #[test]
    fn test_non_json_is_none() {
        assert!(parse_classification("HR, probably").is_none());
        assert!(parse_classification("[\"hr\"]").is_none());
    }

    #[test]
    fn test_prompt_lists_every_category() {
        let prompt = build_prompt("hello");
        for c in PolicyCategory::ALL {
            assert!(prompt.contains(c.as_str()));
        }
        assert!(prompt.contains("\"\"\"hello\"\"\""));
    }
}
