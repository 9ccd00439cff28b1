//! Error taxonomy for the analysis pipeline.
//!
//! Every failure is local to one request. The variants map one-to-one onto
//! the outcomes the HTTP layer distinguishes, see [`ComplianceError::code`].

/// Errors raised by gateways, stores, and the analyzer.
#[derive(Debug, thiserror::Error)]
pub enum ComplianceError {
    /// No policy documents exist; the user must upload one first.
    #[error("no policy documents have been ingested")]
    NoPolicyCorpus,

    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    /// The vector index (or the query embedding it needs) is unavailable.
    /// Never treated as "no matches".
    #[error("retrieval service error: {0}")]
    RetrievalService(String),

    #[error("generation service error: {0}")]
    GenerationService(String),

    /// The generative model answered, but not in the requested schema.
    #[error("model output violated the verdict schema: {0}")]
    ModelOutputContract(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ComplianceError {
    /// Machine-readable error code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ComplianceError::NoPolicyCorpus => "no_policy_corpus",
            ComplianceError::EmbeddingService(_) | ComplianceError::RetrievalService(_) => {
                "service_unavailable"
            }
            ComplianceError::GenerationService(_) => "generation_failed",
            ComplianceError::ModelOutputContract(_) => "model_output_invalid",
            ComplianceError::Persistence(_) => "persistence_failed",
            ComplianceError::NotFound(_) => "not_found",
            ComplianceError::InvalidInput(_) => "bad_request",
        }
    }

    /// Whether a caller may reasonably retry the same request later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ComplianceError::EmbeddingService(_)
                | ComplianceError::RetrievalService(_)
                | ComplianceError::GenerationService(_)
        )
    }

    /// Re-tag an embedding failure raised while encoding a query.
    pub(crate) fn into_retrieval(self) -> Self {
        match self {
            ComplianceError::EmbeddingService(msg) => ComplianceError::RetrievalService(msg),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_for_contract_and_outage() {
        let contract = ComplianceError::ModelOutputContract("missing overall_risk".into());
        let outage = ComplianceError::GenerationService("503".into());
        assert_ne!(contract.code(), outage.code());
        assert!(!contract.is_transient());
        assert!(outage.is_transient());
    }

    #[test]
    fn test_embedding_failure_becomes_retrieval_failure() {
        let err = ComplianceError::EmbeddingService("timed out".into()).into_retrieval();
        assert!(matches!(err, ComplianceError::RetrievalService(m) if m == "timed out"));
    }
}
