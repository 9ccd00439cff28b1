//! Retrieval-augmented compliance analyzer.
//!
//! One call to [`Analyzer::analyze`] walks an explicit state machine:
//!
//! ```text
//! Start ─▶ FiltersResolved ─▶ Retrieved ─┬─▶ NoMatch                      (terminal)
//!                                        └─▶ ContextBuilt ─▶ Generated ─▶ Validated (terminal)
//!
//! any non-terminal state ─▶ Failed                                         (terminal)
//! ```
//!
//! A successful terminal is entered only once exactly one
//! [`ComplianceCheckRecord`] has been persisted. `Failed` persists nothing.
//!
//! Policy decisions:
//!
//! - An empty retrieval short-circuits to a `NONE` verdict without calling
//!   the generative model.
//! - A failed log write fails the whole call with
//!   [`ComplianceError::Persistence`]; a verdict is never returned without
//!   its audit record.
//! - Nothing is retried here. Retries belong to the gateways.
//!
//! [`ComplianceCheckRecord`]: crate::models::ComplianceCheckRecord

use std::fmt;
use std::sync::Arc;

use crate::classify::ContextClassifier;
use crate::error::ComplianceError;
use crate::generation::Generator;
use crate::index::VectorIndexGateway;
use crate::models::{ChunkMatch, NewComplianceCheck, PolicyCategory, Verdict};
use crate::store::{ComplianceLog, PolicyStore, RetrievalFilter};

/// Longest accepted input text, in characters.
pub const MAX_TEXT_CHARS: usize = 8000;
pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 20;

const SYSTEM_INSTRUCTION: &str = "You are a strict compliance reviewer.";

/// Pipeline states. See the module docs for the transition graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisState {
    Start,
    FiltersResolved,
    Retrieved,
    NoMatch,
    ContextBuilt,
    Generated,
    Validated,
    Failed,
}

impl AnalysisState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AnalysisState::NoMatch | AnalysisState::Validated | AnalysisState::Failed
        )
    }

    /// Whether `self → to` is an edge of the state graph.
    pub fn can_advance_to(self, to: AnalysisState) -> bool {
        use AnalysisState::*;
        match to {
            Failed => !self.is_terminal(),
            _ => matches!(
                (self, to),
                (Start, FiltersResolved)
                    | (FiltersResolved, Retrieved)
                    | (Retrieved, NoMatch)
                    | (Retrieved, ContextBuilt)
                    | (ContextBuilt, Generated)
                    | (Generated, Validated)
            ),
        }
    }
}

impl fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalysisState::Start => "start",
            AnalysisState::FiltersResolved => "filters_resolved",
            AnalysisState::Retrieved => "retrieved",
            AnalysisState::NoMatch => "no_match",
            AnalysisState::ContextBuilt => "context_built",
            AnalysisState::Generated => "generated",
            AnalysisState::Validated => "validated",
            AnalysisState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Input to one analysis.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub text: String,
    pub department: Option<String>,
    pub category: Option<PolicyCategory>,
    pub top_k: usize,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            department: None,
            category: None,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn category(mut self, category: PolicyCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    fn validate(&self, max_top_k: usize) -> Result<(), ComplianceError> {
        if self.text.trim().is_empty() {
            return Err(ComplianceError::InvalidInput(
                "text must not be empty".to_string(),
            ));
        }
        let len = self.text.chars().count();
        if len > MAX_TEXT_CHARS {
            return Err(ComplianceError::InvalidInput(format!(
                "text is {} characters; the limit is {}",
                len, MAX_TEXT_CHARS
            )));
        }
        if self.top_k == 0 || self.top_k > max_top_k {
            return Err(ComplianceError::InvalidInput(format!(
                "top_k must be between 1 and {}",
                max_top_k
            )));
        }
        Ok(())
    }
}

/// Result of a successful analysis.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    /// Id of the persisted audit record.
    pub record_id: String,
    pub verdict: Verdict,
    /// The filters actually used for retrieval.
    pub filter: RetrievalFilter,
    pub matched_chunks: usize,
    /// Every state visited, ending in the terminal one.
    pub path: Vec<AnalysisState>,
}

impl AnalysisOutcome {
    pub fn terminal_state(&self) -> AnalysisState {
        self.path.last().copied().unwrap_or(AnalysisState::Start)
    }
}

/// Tracks the state of one run.
struct Run {
    path: Vec<AnalysisState>,
}

impl Run {
    fn new() -> Self {
        Self {
            path: vec![AnalysisState::Start],
        }
    }

    fn state(&self) -> AnalysisState {
        self.path.last().copied().unwrap_or(AnalysisState::Start)
    }

    fn advance(&mut self, to: AnalysisState) {
        let from = self.state();
        debug_assert!(from.can_advance_to(to), "illegal transition {from} -> {to}");
        tracing::debug!(%from, %to, "analysis transition");
        self.path.push(to);
    }
}

pub struct Analyzer {
    documents: Arc<dyn PolicyStore>,
    index: Arc<VectorIndexGateway>,
    generator: Arc<dyn Generator>,
    classifier: Option<ContextClassifier>,
    log: Arc<dyn ComplianceLog>,
    max_top_k: usize,
}

impl Analyzer {
    /// Build an analyzer. The classifier is disabled until
    /// [`with_classifier`](Self::with_classifier) is called.
    pub fn new(
        documents: Arc<dyn PolicyStore>,
        index: Arc<VectorIndexGateway>,
        generator: Arc<dyn Generator>,
        log: Arc<dyn ComplianceLog>,
    ) -> Self {
        Self {
            documents,
            index,
            generator,
            classifier: None,
            log,
            max_top_k: MAX_TOP_K,
        }
    }

    pub fn with_classifier(mut self, classifier: ContextClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_max_top_k(mut self, max_top_k: usize) -> Self {
        self.max_top_k = max_top_k.max(1);
        self
    }

    /// Analyze `request.text` against the indexed policies.
    ///
    /// # Errors
    ///
    /// - [`ComplianceError::InvalidInput`] for empty/oversized text or an
    ///   out-of-range `top_k`.
    /// - [`ComplianceError::NoPolicyCorpus`] when no documents exist; no
    ///   retrieval or generation is attempted.
    /// - [`ComplianceError::RetrievalService`] when the index is unreachable.
    /// - [`ComplianceError::GenerationService`] when the model call fails.
    /// - [`ComplianceError::ModelOutputContract`] when the model answer does
    ///   not match the verdict schema. No record is written.
    /// - [`ComplianceError::Persistence`] when the audit record cannot be
    ///   written.
    pub async fn analyze(
        &self,
        request: AnalysisRequest,
    ) -> Result<AnalysisOutcome, ComplianceError> {
        let mut run = Run::new();
        match self.drive(&mut run, &request).await {
            Ok(outcome) => {
                tracing::info!(
                    record_id = %outcome.record_id,
                    risk = %outcome.verdict.overall_risk,
                    issues = outcome.verdict.issues.len(),
                    matched_chunks = outcome.matched_chunks,
                    terminal = %outcome.terminal_state(),
                    "compliance check complete"
                );
                Ok(outcome)
            }
            Err(err) => {
                let at = run.state();
                run.advance(AnalysisState::Failed);
                match &err {
                    ComplianceError::ModelOutputContract(detail) => tracing::warn!(
                        target: "policy_check::model_output",
                        %detail,
                        "model output rejected"
                    ),
                    ComplianceError::InvalidInput(_) | ComplianceError::NoPolicyCorpus => {
                        tracing::info!(state = %at, error = %err, "compliance check rejected")
                    }
                    _ => tracing::warn!(state = %at, error = %err, "compliance check failed"),
                }
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        run: &mut Run,
        request: &AnalysisRequest,
    ) -> Result<AnalysisOutcome, ComplianceError> {
        request.validate(self.max_top_k)?;

        if self.documents.count_documents().await? == 0 {
            return Err(ComplianceError::NoPolicyCorpus);
        }

        let filter = self.resolve_filter(request).await?;
        run.advance(AnalysisState::FiltersResolved);

        let matches = self
            .index
            .query(&request.text, request.top_k, &filter)
            .await?;
        run.advance(AnalysisState::Retrieved);

        let (verdict, terminal) = if matches.is_empty() {
            (Verdict::no_match(), AnalysisState::NoMatch)
        } else {
            let context = build_context(&matches);
            run.advance(AnalysisState::ContextBuilt);

            let prompt = build_prompt(&request.text, &context);
            let raw = self
                .generator
                .generate(SYSTEM_INSTRUCTION, &prompt, true)
                .await?;
            run.advance(AnalysisState::Generated);

            (Verdict::parse_strict(&raw)?, AnalysisState::Validated)
        };

        let check = NewComplianceCheck {
            input_text: request.text.clone(),
            department: filter.department.clone(),
            category: filter.category,
            verdict: verdict.clone(),
        };
        let record_id = self.log.append(&check).await.map_err(|e| match e {
            ComplianceError::Persistence(_) => e,
            other => ComplianceError::Persistence(other.to_string()),
        })?;
        run.advance(terminal);

        Ok(AnalysisOutcome {
            record_id,
            verdict,
            filter,
            matched_chunks: matches.len(),
            path: run.path.clone(),
        })
    }

    /// Merge caller values with classifier inference, field by field.
    async fn resolve_filter(
        &self,
        request: &AnalysisRequest,
    ) -> Result<RetrievalFilter, ComplianceError> {
        let mut filter = RetrievalFilter {
            department: request.department.clone(),
            category: request.category,
        };

        if filter.department.is_some() && filter.category.is_some() {
            return Ok(filter);
        }

        if let Some(classifier) = &self.classifier {
            let hint = classifier.classify(&request.text).await?;
            if filter.department.is_none() {
                filter.department = hint.department;
            }
            if filter.category.is_none() {
                filter.category = hint.category;
            }
        }

        Ok(filter)
    }
}

/// Render retrieved chunks as prompt context, preserving relevance order.
pub fn build_context(matches: &[ChunkMatch]) -> String {
    matches
        .iter()
        .map(|m| {
            format!(
                "[doc_id={}, chunk_id={}] {}",
                m.metadata.document_id, m.metadata.chunk_id, m.metadata.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The analysis prompt. Deterministic for a given text and context.
pub fn build_prompt(text: &str, context: &str) -> String {
    format!(
        r#"You are a compliance assistant. Given:

1) The user's text (draft message)
2) Relevant policy excerpts

Decide:
- overall_risk: one of ["NONE", "LOW", "MEDIUM", "HIGH"]
- issues: list (possibly empty) of:
  - type (e.g. "Confidentiality", "External Communication", "Data Privacy")
  - policy_reference (if you can infer it from the excerpt, otherwise null)
  - excerpt (the risky part of the user text, otherwise null)
  - explanation (why it is a problem)

If you report any issue, overall_risk must not be "NONE".
Then propose a fully rewritten version of the text that is compliant.

Return ONLY a JSON object with this structure:

{{
  "overall_risk": "LOW",
  "issues": [
    {{
      "type": "Confidentiality",
      "policy_reference": "Security Policy §3.2",
      "excerpt": "some text from the user message",
      "explanation": "short explanation"
    }}
  ],
  "suggested_text": "rewritten compliant text"
}}

User text:
"""{text}"""

Policy context:
"""{context}""""#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn hit(doc: &str, chunk: &str, text: &str, score: f32) -> ChunkMatch {
        ChunkMatch {
            score,
            metadata: ChunkMetadata {
                document_id: doc.to_string(),
                chunk_id: chunk.to_string(),
                category: PolicyCategory::Security,
                department: None,
                text: text.to_string(),
            },
        }
    }

    #[test]
    fn test_context_preserves_order_and_separator() {
        let ctx = build_context(&[
            hit("d1", "c9", "Never share passwords.", 0.9),
            hit("d2", "c1", "Report phishing.", 0.4),
        ]);
        assert_eq!(
            ctx,
            "[doc_id=d1, chunk_id=c9] Never share passwords.\n\n[doc_id=d2, chunk_id=c1] Report phishing."
        );
    }

    #[test]
    fn test_prompt_embeds_text_and_context() {
        let p = build_prompt("send the roadmap to acme", "[doc_id=d1, chunk_id=c1] x");
        assert!(p.contains("\"\"\"send the roadmap to acme\"\"\""));
        assert!(p.contains("\"\"\"[doc_id=d1, chunk_id=c1] x\"\"\""));
        assert!(p.contains("\"NONE\", \"LOW\", \"MEDIUM\", \"HIGH\""));
        assert_eq!(p, build_prompt("send the roadmap to acme", "[doc_id=d1, chunk_id=c1] x"));
    }

    #[test]
    fn test_state_graph() {
        use AnalysisState::*;
        assert!(Start.can_advance_to(FiltersResolved));
        assert!(Retrieved.can_advance_to(NoMatch));
        assert!(Retrieved.can_advance_to(ContextBuilt));
        assert!(!Retrieved.can_advance_to(Generated));
        assert!(!NoMatch.can_advance_to(ContextBuilt));
        assert!(Generated.can_advance_to(Failed));
        assert!(!Validated.can_advance_to(Failed));
        assert!(NoMatch.is_terminal() && Validated.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn test_request_validation() {
        assert!(AnalysisRequest::new("ok").validate(MAX_TOP_K).is_ok());
        assert!(AnalysisRequest::new("   ").validate(MAX_TOP_K).is_err());
        assert!(AnalysisRequest::new("x".repeat(MAX_TEXT_CHARS + 1))
            .validate(MAX_TOP_K)
            .is_err());
        assert!(AnalysisRequest::new("ok").top_k(0).validate(MAX_TOP_K).is_err());
        assert!(AnalysisRequest::new("ok")
            .top_k(MAX_TOP_K + 1)
            .validate(MAX_TOP_K)
            .is_err());
    }
}
