use async_trait::async_trait;

use super::{GenerateParams, LlmClient};
use crate::error::Result;

/// Deterministic fallback client: answers by quoting the context block of
/// the prompt. Lets the whole service (and its tests) run without a model
/// server while keeping `/ask` responses reproducible.
#[derive(Default)]
pub struct StubLlmClient;

impl StubLlmClient {
    fn context_excerpt(prompt: &str, max_chars: usize) -> Option<String> {
        let start = prompt.find("Context:")?;
        let after = &prompt[start + "Context:".len()..];
        let end = after.find("\n---").unwrap_or(after.len());
        let excerpt: String = after[..end]
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if excerpt.is_empty() {
            return None;
        }
        let mut excerpt = excerpt;
        if excerpt.len() > max_chars {
            let cut = excerpt
                .char_indices()
                .take_while(|(i, _)| *i < max_chars)
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            excerpt.truncate(cut);
            excerpt.push('…');
        }
        Some(excerpt)
    }
}

#[async_trait]
impl LlmClient for StubLlmClient {
    async fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<String> {
        let max_chars = params.max_tokens.saturating_mul(4).max(80);
        Ok(match Self::context_excerpt(prompt, max_chars) {
            Some(excerpt) => format!("Based on the retrieved context: {excerpt}"),
            None => "I could not find relevant context for this question.".to_string(),
        })
    }
}
