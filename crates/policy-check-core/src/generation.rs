//! Generation gateway trait.
//!
//! The analyzer and classifier only ever see raw text coming back from
//! [`Generator::generate`]; turning that text into typed data is their job.

use async_trait::async_trait;

use crate::error::ComplianceError;

/// A single-turn generative model call.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Run one completion.
    ///
    /// When `json_output` is set the provider must be asked for strictly
    /// machine-parseable JSON. Transport failures and timeouts are
    /// [`ComplianceError::GenerationService`].
    async fn generate(
        &self,
        system_instruction: &str,
        user_prompt: &str,
        json_output: bool,
    ) -> Result<String, ComplianceError>;
}
