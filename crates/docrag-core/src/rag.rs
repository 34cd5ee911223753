use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::llm::GenerateParams;
use crate::model::{ChatMessage, ChatRole, MessageSource};
use crate::util::with_retries;
use crate::vectorstore::{ScoredPoint, SearchFilter};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

const INSTRUCTION: &str = "Answer the question using only the numbered context passages below. \
If the context does not contain the answer, say that you do not know.";

/// Fixed reply for a workspace with nothing indexed; returned without
/// calling the LLM.
pub const NO_DOCUMENTS_ANSWER: &str =
    "No documents found in this workspace. Upload a document before asking questions.";

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub workspace_id: Uuid,
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<MessageSource>,
    pub session_id: Uuid,
}

/// Retrieval-augmented answering over one workspace: embed the question,
/// search the workspace's vectors, assemble a prompt with recent dialogue,
/// call the LLM, and persist the exchange.
pub struct RagEngine {
    context: Arc<AppContext>,
}

impl RagEngine {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    pub async fn ask(&self, request: AskRequest) -> Result<AskResponse> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(Error::Validation("question must not be empty".into()));
        }
        let top_k = match request.top_k {
            Some(0) => return Err(Error::Validation("top_k must be positive".into())),
            Some(k) => k,
            None => self.context.settings.rag_top_k_default,
        };

        let repository = &self.context.repository;
        repository.get_workspace(request.workspace_id).await?;

        let session_id = match request.session_id {
            Some(session_id) => {
                let session = repository.get_session(session_id).await?;
                if session.workspace_id != request.workspace_id {
                    return Err(Error::not_found("session", session_id.to_string()));
                }
                session_id
            }
            None => repository.create_session(request.workspace_id).await?.id,
        };

        debug!(%session_id, workspace_id = %request.workspace_id, "embedding question");
        let embedder = self.context.embedder.clone();
        let question_owned = question.to_string();
        let embedding = with_retries("embed_question", RETRY_ATTEMPTS, RETRY_BASE_DELAY, || {
            let embedder = embedder.clone();
            let question = question_owned.clone();
            async move {
                let mut vectors = embedder.encode(std::slice::from_ref(&question)).await?;
                vectors
                    .pop()
                    .ok_or_else(|| Error::Internal("embedder returned no vector".into()))
            }
        })
        .await?;

        let vector_store = self.context.vector_store.clone();
        let filter = SearchFilter::workspace(request.workspace_id);
        let candidates = with_retries("vector_search", RETRY_ATTEMPTS, RETRY_BASE_DELAY, || {
            let vector_store = vector_store.clone();
            let embedding = embedding.clone();
            let filter = filter.clone();
            async move { vector_store.search(&embedding, top_k, &filter).await }
        })
        .await?;

        if candidates.is_empty() {
            info!(workspace_id = %request.workspace_id, "no indexed documents, answering without llm");
            repository
                .record_exchange(session_id, question, NO_DOCUMENTS_ANSWER, &[])
                .await?;
            return Ok(AskResponse {
                answer: NO_DOCUMENTS_ANSWER.to_string(),
                sources: Vec::new(),
                session_id,
            });
        }

        let sources = dedupe_sources(&candidates);
        let history = repository
            .recent_messages(session_id, self.context.settings.rag_history_n)
            .await?;
        let prompt = build_prompt(question, &sources, &history);

        let llm = self.context.llm.clone();
        let params = GenerateParams {
            model: None,
            temperature: 0.1,
            max_tokens: self.context.settings.rag_max_tokens,
            stop: None,
        };
        let answer = with_retries("llm_generate", RETRY_ATTEMPTS, RETRY_BASE_DELAY, || {
            let llm = llm.clone();
            let prompt = prompt.clone();
            let params = params.clone();
            async move { llm.generate(&prompt, &params).await }
        })
        .await?;

        repository
            .record_exchange(session_id, question, &answer, &sources)
            .await?;

        Ok(AskResponse {
            answer,
            sources,
            session_id,
        })
    }
}

/// Collapse candidate passages that cover the same document span, keeping
/// the first (highest-scoring) occurrence. Search results arrive ordered
/// by decreasing similarity, so order encodes rank.
fn dedupe_sources(candidates: &[ScoredPoint]) -> Vec<MessageSource> {
    let mut seen: HashSet<(Uuid, i64, i64)> = HashSet::new();
    let mut sources = Vec::new();
    for candidate in candidates {
        let payload = &candidate.payload;
        if seen.insert((payload.document_id, payload.page_start, payload.page_end)) {
            sources.push(MessageSource {
                source_id: payload.document_id,
                document_name: payload.document_name.clone(),
                page_start: payload.page_start,
                page_end: payload.page_end,
                snippet: payload.snippet.clone(),
            });
        }
    }
    sources
}

/// Prompt layout: instruction, numbered passages, recent dialogue
/// (oldest first), then the new question.
fn build_prompt(question: &str, sources: &[MessageSource], history: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    prompt.push_str(INSTRUCTION);
    prompt.push_str("\n---\nContext:\n");

    for (i, source) in sources.iter().enumerate() {
        prompt.push_str(&format!(
            "[{}] {} (pages {}-{}):\n{}\n",
            i + 1,
            source.document_name,
            source.page_start,
            source.page_end,
            source.snippet
        ));
    }

    if !history.is_empty() {
        prompt.push_str("---\nConversation so far:\n");
        for message in history {
            let speaker = match message.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{speaker}: {}\n", message.content));
        }
    }

    prompt.push_str("---\nQuestion:\n");
    prompt.push_str(question);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorstore::VectorPayload;
    use chrono::Utc;

    fn scored(document_id: Uuid, page_start: i64, page_end: i64, score: f32) -> ScoredPoint {
        ScoredPoint {
            score,
            payload: VectorPayload {
                workspace_id: Uuid::new_v4(),
                document_id,
                document_name: "doc.pdf".to_string(),
                page_start,
                page_end,
                snippet: format!("pages {page_start}-{page_end} score {score}"),
            },
        }
    }

    #[test]
    fn dedupe_keeps_highest_scoring_span() {
        let doc = Uuid::new_v4();
        let candidates = vec![
            scored(doc, 1, 2, 0.9),
            scored(doc, 1, 2, 0.5),
            scored(doc, 2, 3, 0.4),
        ];
        let sources = dedupe_sources(&candidates);
        assert_eq!(sources.len(), 2);
        assert!(sources[0].snippet.contains("0.9"));
        assert_eq!(sources[1].page_start, 2);
    }

    #[test]
    fn prompt_numbers_passages_and_includes_history() {
        let doc = Uuid::new_v4();
        let sources = dedupe_sources(&[scored(doc, 1, 1, 0.8), scored(doc, 2, 2, 0.6)]);
        let history = vec![
            ChatMessage {
                id: Uuid::new_v4(),
                session_id: Uuid::new_v4(),
                role: ChatRole::User,
                content: "earlier question".to_string(),
                created_at: Utc::now(),
            },
            ChatMessage {
                id: Uuid::new_v4(),
                session_id: Uuid::new_v4(),
                role: ChatRole::Assistant,
                content: "earlier answer".to_string(),
                created_at: Utc::now(),
            },
        ];

        let prompt = build_prompt("what is on page 2?", &sources, &history);
        assert!(prompt.contains("[1] doc.pdf (pages 1-1):"));
        assert!(prompt.contains("[2] doc.pdf (pages 2-2):"));
        assert!(prompt.contains("User: earlier question"));
        assert!(prompt.contains("Assistant: earlier answer"));
        assert!(prompt.ends_with("what is on page 2?"));
        // History must come after the passages, question last.
        let ctx = prompt.find("Context:").unwrap();
        let conv = prompt.find("Conversation so far:").unwrap();
        let q = prompt.find("Question:").unwrap();
        assert!(ctx < conv && conv < q);
    }

    #[test]
    fn prompt_without_history_omits_conversation_block() {
        let prompt = build_prompt("q", &[], &[]);
        assert!(!prompt.contains("Conversation so far:"));
        assert!(prompt.contains("Question:"));
    }
}
