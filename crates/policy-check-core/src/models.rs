//! Core data models used throughout Policy Check.
//!
//! These types represent the policy documents, chunks, verdicts, and audit
//! records that flow through the ingestion and analysis pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ComplianceError;

/// Closed set of policy subject areas.
///
/// Stored and transmitted in lower snake case (`"data_privacy"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCategory {
    Confidentiality,
    ExternalCommunication,
    DataPrivacy,
    Security,
    Hr,
}

impl PolicyCategory {
    pub const ALL: [PolicyCategory; 5] = [
        PolicyCategory::Confidentiality,
        PolicyCategory::ExternalCommunication,
        PolicyCategory::DataPrivacy,
        PolicyCategory::Security,
        PolicyCategory::Hr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyCategory::Confidentiality => "confidentiality",
            PolicyCategory::ExternalCommunication => "external_communication",
            PolicyCategory::DataPrivacy => "data_privacy",
            PolicyCategory::Security => "security",
            PolicyCategory::Hr => "hr",
        }
    }
}

impl fmt::Display for PolicyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PolicyCategory {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        PolicyCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ComplianceError::InvalidInput(format!("unknown policy type: '{}'", s)))
    }
}

/// Overall risk of a piece of text against the retrieved policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::None => "NONE",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Case-insensitive parse, used for user-supplied filters.
///
/// Model output is deserialized strictly through serde instead.
impl FromStr for RiskLevel {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(RiskLevel::None),
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            _ => Err(ComplianceError::InvalidInput(format!(
                "unknown risk level: '{}'",
                s
            ))),
        }
    }
}

/// A registered policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub id: String,
    pub title: String,
    pub file_path: String,
    #[serde(rename = "policy_type")]
    pub category: PolicyCategory,
    pub department: Option<String>,
    pub version: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the caller when registering a document.
#[derive(Debug, Clone)]
pub struct NewPolicyDocument {
    pub title: String,
    pub category: PolicyCategory,
    pub department: Option<String>,
    pub version: Option<String>,
}

/// A chunk of a policy document's extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyChunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub section_title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Metadata denormalized into every vector record so that retrieval can
/// filter and rebuild context without touching the relational store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub chunk_id: String,
    pub category: PolicyCategory,
    pub department: Option<String>,
    pub text: String,
}

/// A vector record as written to the index.
#[derive(Debug, Clone)]
pub struct ChunkVectorRecord {
    pub chunk_id: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// One retrieval hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMatch {
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// A single compliance problem found in the user's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: String,
    #[serde(default)]
    pub policy_reference: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    pub explanation: String,
}

/// Structured result of one analysis.
///
/// Construct model-produced verdicts with [`Verdict::parse_strict`] so the
/// schema invariants are checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub overall_risk: RiskLevel,
    pub issues: Vec<Issue>,
    pub suggested_text: Option<String>,
}

impl Verdict {
    /// The verdict recorded when retrieval finds no policy context.
    pub fn no_match() -> Self {
        Self {
            overall_risk: RiskLevel::None,
            issues: Vec::new(),
            suggested_text: None,
        }
    }
}

/// An audit log entry for one analyzer invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceCheckRecord {
    pub id: String,
    pub input_text: String,
    pub department: Option<String>,
    #[serde(rename = "policy_type")]
    pub category: Option<PolicyCategory>,
    pub overall_risk: RiskLevel,
    pub issues: Vec<Issue>,
    pub suggested_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields written by the analyzer; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewComplianceCheck {
    pub input_text: String,
    pub department: Option<String>,
    pub category: Option<PolicyCategory>,
    pub verdict: Verdict,
}

/// Filters for listing compliance logs.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    /// Exact, case-sensitive department match.
    pub department: Option<String>,
    pub risk: Option<RiskLevel>,
    pub limit: usize,
}
