use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing status of a document. `SKIPPED` is reserved for documents
/// whose pipeline was intentionally bypassed (e.g. duplicates requeued by
/// an operator); stage events reuse the same codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Pending,
    Queued,
    Processing,
    Success,
    Failed,
    Skipped,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "QUEUED" => Self::Queued,
            "PROCESSING" => Self::Processing,
            "SUCCESS" => Self::Success,
            "FAILED" => Self::Failed,
            "SKIPPED" => Self::Skipped,
            _ => Self::Pending,
        }
    }
}

/// Pipeline stages tracked per document. At most one event row exists per
/// (document, stage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStage {
    Extracting,
    LangDetect,
    Chunking,
    Embedding,
    Classification,
}

impl DocumentStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extracting => "EXTRACTING",
            Self::LangDetect => "LANG_DETECT",
            Self::Chunking => "CHUNKING",
            Self::Embedding => "EMBEDDING",
            Self::Classification => "CLASSIFICATION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "assistant" => Self::Assistant,
            _ => Self::User,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub document_name: String,
    pub media_type: String,
    pub sha256: String,
    pub raw_storage_path: String,
    pub size_bytes: i64,
    pub page_count: Option<i64>,
    pub author: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub detected_language: Option<String>,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub ingested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Observable progress of one pipeline stage for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEvent {
    pub id: Uuid,
    pub document_id: Uuid,
    pub stage: DocumentStage,
    pub status: DocumentStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A retrieval source attached to an assistant message. `source_id` is the
/// id of the document the passage came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSource {
    pub source_id: Uuid,
    pub document_name: String,
    pub page_start: i64,
    pub page_end: i64,
    pub snippet: String,
}
