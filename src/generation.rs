//! Generation gateway over an OpenAI-compatible chat completions API.
//!
//! Sends a system instruction plus one user message with temperature 0 and,
//! when structured output is requested, `response_format: json_object`.
//! The reply text is returned untouched; schema checks happen in the core.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use policy_check_core::generation::Generator;
use policy_check_core::ComplianceError;

use crate::config::GenerationConfig;
use crate::retry::post_json_with_retry;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";

/// Build the generator named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAiGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// Generator used when `generation.provider = "disabled"`. Every call fails.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(
        &self,
        _system_instruction: &str,
        _user_prompt: &str,
        _json_output: bool,
    ) -> Result<String, ComplianceError> {
        Err(ComplianceError::GenerationService(
            "generation provider is disabled".to_string(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    max_retries: u32,
}

impl OpenAiGenerator {
    /// Reads `OPENAI_API_KEY` once, here.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string()),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }
}

/// Request body for one chat completion.
fn build_request(
    model: &str,
    system_instruction: &str,
    user_prompt: &str,
    json_output: bool,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "temperature": 0,
        "messages": [
            {"role": "system", "content": system_instruction},
            {"role": "user", "content": user_prompt},
        ],
    });
    if json_output {
        body["response_format"] = serde_json::json!({"type": "json_object"});
    }
    body
}

/// First choice's message content.
fn parse_response(json: serde_json::Value) -> Result<String, ComplianceError> {
    let response: ChatResponse = serde_json::from_value(json).map_err(|e| {
        ComplianceError::GenerationService(format!("invalid chat completion response: {}", e))
    })?;
    let choice = response.choices.into_iter().next().ok_or_else(|| {
        ComplianceError::GenerationService("no choices returned".to_string())
    })?;
    if choice.finish_reason.as_deref() == Some("length") {
        tracing::warn!("generation stopped at the token limit");
    }
    Ok(choice.message.content.unwrap_or_default())
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        system_instruction: &str,
        user_prompt: &str,
        json_output: bool,
    ) -> Result<String, ComplianceError> {
        let body = build_request(&self.model, system_instruction, user_prompt, json_output);
        let json = post_json_with_retry(
            &self.client,
            &format!("{}/chat/completions", self.url.trim_end_matches('/')),
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI chat",
        )
        .await
        .map_err(ComplianceError::GenerationService)?;

        parse_response(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_asks_for_json_object() {
        let body = build_request("gpt-4.1-mini", "sys", "user", true);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
        assert_eq!(body["temperature"], 0);

        let body = build_request("gpt-4.1-mini", "sys", "user", false);
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_parse_first_choice() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"a\":1}"}, "finish_reason": "stop"}]
        });
        assert_eq!(parse_response(json).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_parse_without_choices_is_service_error() {
        let err = parse_response(serde_json::json!({"choices": []})).unwrap_err();
        assert!(matches!(err, ComplianceError::GenerationService(_)));
    }
}
