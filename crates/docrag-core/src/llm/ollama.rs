use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerateParams, LlmClient};
use crate::error::{Error, Result};

#[derive(Serialize)]
struct OllamaOptions<'a> {
    temperature: f32,
    num_predict: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions<'a>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

/// LLM client for an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    default_model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, default_model: &str, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| Error::Permanent(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: default_model.to_string(),
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<String> {
        let model = params.model.as_deref().unwrap_or(&self.default_model);
        debug!(model, prompt_chars = prompt.len(), "llm generate");

        let request = OllamaRequest {
            model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens as i64,
                stop: params.stop.as_deref(),
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(Error::Transient(format!("llm server error: {status} {body}")));
            }
            return Err(Error::Permanent(format!(
                "llm request rejected: {status} {body}"
            )));
        }

        let parsed: OllamaResponse = response.json().await?;
        Ok(parsed.response)
    }
}
