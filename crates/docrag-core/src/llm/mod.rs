pub mod ollama;
pub mod stub;

pub use ollama::OllamaClient;
pub use stub::StubLlmClient;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::Settings;
use crate::error::Result;

/// Recognized generation options. Timeouts and retries are the caller's
/// responsibility (the RAG engine wraps the call), not the client's.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub stop: Option<Vec<String>>,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.1,
            max_tokens: 512,
            stop: None,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<String>;
}

/// Select the LLM backend: Ollama-compatible HTTP server when `LLM_URL` is
/// set, otherwise a deterministic stub that answers from the prompt's
/// context block (used in tests and offline runs).
pub fn select_llm_client(settings: &Settings) -> Result<Arc<dyn LlmClient>> {
    match &settings.llm_url {
        Some(url) => {
            let client = OllamaClient::new(url, &settings.llm_model, settings.llm_timeout_seconds)?;
            info!(url = %url, model = %settings.llm_model, "llm adapter: ollama");
            Ok(Arc::new(client))
        }
        None => {
            info!("llm adapter: local stub");
            Ok(Arc::new(StubLlmClient::default()))
        }
    }
}
