use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::any::AnyRow;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use super::DbPool;
use crate::error::{Error, Result};
use crate::model::{
    ChatMessage, ChatRole, ChatSession, Document, DocumentEvent, DocumentStage, DocumentStatus,
    MessageSource, Workspace,
};

/// Structured metadata access for every entity. The repository is the
/// single source of truth for status transitions; every multi-row write
/// runs in one transaction so it is applied fully or not at all.
pub struct Repository {
    pool: DbPool,
}

// Timestamps are stored as fixed-width RFC 3339 UTC strings, which sort
// lexicographically in chronological order on both backends.
fn fmt_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Permanent(format!("corrupt timestamp '{raw}': {e}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Permanent(format!("corrupt uuid '{raw}': {e}")))
}

fn opt_time(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_time).transpose()
}

fn workspace_from_row(row: &AnyRow) -> Result<Workspace> {
    Ok(Workspace {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        created_at: parse_time(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn document_from_row(row: &AnyRow) -> Result<Document> {
    Ok(Document {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        workspace_id: parse_uuid(&row.try_get::<String, _>("workspace_id")?)?,
        document_name: row.try_get("document_name")?,
        media_type: row.try_get("media_type")?,
        sha256: row.try_get("sha256")?,
        raw_storage_path: row.try_get("raw_storage_path")?,
        size_bytes: row.try_get("size_bytes")?,
        page_count: row.try_get("page_count")?,
        author: row.try_get("author")?,
        creation_date: opt_time(row.try_get("creation_date")?)?,
        detected_language: row.try_get("detected_language")?,
        status: DocumentStatus::parse(&row.try_get::<String, _>("status")?),
        error_message: row.try_get("error_message")?,
        ingested_at: opt_time(row.try_get("ingested_at")?)?,
        created_at: parse_time(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn session_from_row(row: &AnyRow) -> Result<ChatSession> {
    Ok(ChatSession {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        workspace_id: parse_uuid(&row.try_get::<String, _>("workspace_id")?)?,
        created_at: parse_time(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn message_from_row(row: &AnyRow) -> Result<ChatMessage> {
    Ok(ChatMessage {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        session_id: parse_uuid(&row.try_get::<String, _>("session_id")?)?,
        role: ChatRole::parse(&row.try_get::<String, _>("role")?),
        content: row.try_get("content")?,
        created_at: parse_time(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn event_from_row(row: &AnyRow) -> Result<DocumentEvent> {
    let stage = match row.try_get::<String, _>("stage")?.as_str() {
        "EXTRACTING" => DocumentStage::Extracting,
        "LANG_DETECT" => DocumentStage::LangDetect,
        "CHUNKING" => DocumentStage::Chunking,
        "EMBEDDING" => DocumentStage::Embedding,
        _ => DocumentStage::Classification,
    };
    Ok(DocumentEvent {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        document_id: parse_uuid(&row.try_get::<String, _>("document_id")?)?,
        stage,
        status: DocumentStatus::parse(&row.try_get::<String, _>("status")?),
        started_at: parse_time(&row.try_get::<String, _>("started_at")?)?,
        finished_at: opt_time(row.try_get("finished_at")?)?,
        duration_ms: row.try_get("duration_ms")?,
    })
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create missing tables and indexes. Idempotent, run at startup.
    pub async fn ensure_schema(&self) -> Result<()> {
        let pool = self.pool.inner();

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS workspaces (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                document_name TEXT NOT NULL,
                media_type TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                raw_storage_path TEXT NOT NULL,
                size_bytes BIGINT NOT NULL,
                page_count BIGINT,
                author TEXT,
                creation_date TEXT,
                detected_language TEXT,
                status TEXT NOT NULL,
                error_message TEXT,
                ingested_at TEXT,
                created_at TEXT NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS document_events (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                duration_ms BIGINT,
                CONSTRAINT uq_document_stage UNIQUE (document_id, stage)
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_sessions (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_message_sources (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                document_name TEXT NOT NULL,
                page_start BIGINT NOT NULL,
                page_end BIGINT NOT NULL,
                snippet TEXT NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_workspace ON documents(workspace_id)",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_documents_ws_sha ON documents(workspace_id, sha256)",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_session ON chat_messages(session_id, created_at)",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_workspace ON chat_sessions(workspace_id)",
        )
        .execute(pool)
        .await?;

        debug!("database schema ensured");
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.pool.inner()).await?;
        Ok(())
    }

    // ---- workspaces ----

    pub async fn create_workspace(&self, name: &str) -> Result<Workspace> {
        let workspace = Workspace {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        sqlx::query("INSERT INTO workspaces (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(workspace.id.to_string())
            .bind(&workspace.name)
            .bind(fmt_time(workspace.created_at))
            .execute(self.pool.inner())
            .await
            .map_err(|e| match Error::from(e) {
                Error::Conflict(_) => {
                    Error::Conflict(format!("workspace name '{name}' already exists"))
                }
                other => other,
            })?;
        Ok(workspace)
    }

    pub async fn get_workspace(&self, id: Uuid) -> Result<Workspace> {
        let row = sqlx::query("SELECT id, name, created_at FROM workspaces WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(self.pool.inner())
            .await?
            .ok_or_else(|| Error::not_found("workspace", id.to_string()))?;
        workspace_from_row(&row)
    }

    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM workspaces ORDER BY created_at")
            .fetch_all(self.pool.inner())
            .await?;
        rows.iter().map(workspace_from_row).collect()
    }

    /// Remove every row owned by the workspace in one transaction, the
    /// workspace itself last so interrupted cascades can be retried.
    pub async fn delete_workspace_cascade(&self, id: Uuid) -> Result<()> {
        let id = id.to_string();
        let mut tx = self.pool.inner().begin().await?;

        sqlx::query(
            r#"DELETE FROM chat_message_sources WHERE message_id IN (
                 SELECT id FROM chat_messages WHERE session_id IN (
                   SELECT id FROM chat_sessions WHERE workspace_id = $1))"#,
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"DELETE FROM chat_messages WHERE session_id IN (
                 SELECT id FROM chat_sessions WHERE workspace_id = $1)"#,
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM chat_sessions WHERE workspace_id = $1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"DELETE FROM document_events WHERE document_id IN (
                 SELECT id FROM documents WHERE workspace_id = $1)"#,
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM documents WHERE workspace_id = $1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM workspaces WHERE id = $1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // ---- documents ----

    pub async fn create_document(&self, document: &Document) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO documents
               (id, workspace_id, document_name, media_type, sha256, raw_storage_path,
                size_bytes, page_count, author, creation_date, detected_language,
                status, error_message, ingested_at, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"#,
        )
        .bind(document.id.to_string())
        .bind(document.workspace_id.to_string())
        .bind(&document.document_name)
        .bind(&document.media_type)
        .bind(&document.sha256)
        .bind(&document.raw_storage_path)
        .bind(document.size_bytes)
        .bind(document.page_count)
        .bind(document.author.as_deref())
        .bind(document.creation_date.map(fmt_time))
        .bind(document.detected_language.as_deref())
        .bind(document.status.as_str())
        .bind(document.error_message.as_deref())
        .bind(document.ingested_at.map(fmt_time))
        .bind(fmt_time(document.created_at))
        .execute(self.pool.inner())
        .await
        .map_err(|e| match Error::from(e) {
            Error::Conflict(_) => Error::Conflict(format!(
                "document with identical content already exists in workspace {}",
                document.workspace_id
            )),
            other => other,
        })?;
        Ok(())
    }

    pub async fn get_document(&self, id: Uuid) -> Result<Document> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(self.pool.inner())
            .await?
            .ok_or_else(|| Error::not_found("document", id.to_string()))?;
        document_from_row(&row)
    }

    pub async fn list_documents(&self, workspace_id: Uuid) -> Result<Vec<Document>> {
        let rows =
            sqlx::query("SELECT * FROM documents WHERE workspace_id = $1 ORDER BY created_at")
                .bind(workspace_id.to_string())
                .fetch_all(self.pool.inner())
                .await?;
        rows.iter().map(document_from_row).collect()
    }

    pub async fn update_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE documents SET status = $1, error_message = $2 WHERE id = $3",
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(id.to_string())
        .execute(self.pool.inner())
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(Error::not_found("document", id.to_string()));
        }
        Ok(())
    }

    /// Claim a document for processing. The guard on the current status is
    /// what keeps two workers from running the same pipeline: only one
    /// UPDATE can win.
    pub async fn try_claim_for_processing(&self, id: Uuid) -> Result<bool> {
        let updated = sqlx::query(
            r#"UPDATE documents SET status = 'PROCESSING', error_message = NULL
               WHERE id = $1 AND status IN ('PENDING', 'QUEUED', 'FAILED')"#,
        )
        .bind(id.to_string())
        .execute(self.pool.inner())
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    /// Final pipeline commit: metadata and SUCCESS in one statement.
    pub async fn commit_document_success(
        &self,
        id: Uuid,
        page_count: i64,
        author: Option<&str>,
        creation_date: Option<DateTime<Utc>>,
        detected_language: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE documents
               SET status = 'SUCCESS', error_message = NULL, page_count = $1,
                   author = $2, creation_date = $3, detected_language = $4, ingested_at = $5
               WHERE id = $6"#,
        )
        .bind(page_count)
        .bind(author)
        .bind(creation_date.map(fmt_time))
        .bind(detected_language)
        .bind(fmt_time(Utc::now()))
        .bind(id.to_string())
        .execute(self.pool.inner())
        .await?;
        Ok(())
    }

    pub async fn delete_document(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.inner().begin().await?;
        sqlx::query("DELETE FROM document_events WHERE document_id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    // ---- stage events ----

    pub async fn upsert_stage_event(
        &self,
        document_id: Uuid,
        stage: DocumentStage,
        status: DocumentStatus,
        started_at: DateTime<Utc>,
        finished_at: Option<DateTime<Utc>>,
        duration_ms: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO document_events
               (id, document_id, stage, status, started_at, finished_at, duration_ms)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (document_id, stage) DO UPDATE SET
                   status = EXCLUDED.status,
                   started_at = EXCLUDED.started_at,
                   finished_at = EXCLUDED.finished_at,
                   duration_ms = EXCLUDED.duration_ms"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(document_id.to_string())
        .bind(stage.as_str())
        .bind(status.as_str())
        .bind(fmt_time(started_at))
        .bind(finished_at.map(fmt_time))
        .bind(duration_ms)
        .execute(self.pool.inner())
        .await?;
        Ok(())
    }

    pub async fn list_stage_events(&self, document_id: Uuid) -> Result<Vec<DocumentEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM document_events WHERE document_id = $1 ORDER BY started_at",
        )
        .bind(document_id.to_string())
        .fetch_all(self.pool.inner())
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    // ---- chat sessions and messages ----

    pub async fn create_session(&self, workspace_id: Uuid) -> Result<ChatSession> {
        let session = ChatSession {
            id: Uuid::new_v4(),
            workspace_id,
            created_at: Utc::now(),
        };
        sqlx::query("INSERT INTO chat_sessions (id, workspace_id, created_at) VALUES ($1, $2, $3)")
            .bind(session.id.to_string())
            .bind(session.workspace_id.to_string())
            .bind(fmt_time(session.created_at))
            .execute(self.pool.inner())
            .await?;
        Ok(session)
    }

    pub async fn get_session(&self, id: Uuid) -> Result<ChatSession> {
        let row = sqlx::query("SELECT id, workspace_id, created_at FROM chat_sessions WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(self.pool.inner())
            .await?
            .ok_or_else(|| Error::not_found("session", id.to_string()))?;
        session_from_row(&row)
    }

    pub async fn list_sessions(&self, workspace_id: Uuid) -> Result<Vec<ChatSession>> {
        let rows = sqlx::query(
            "SELECT id, workspace_id, created_at FROM chat_sessions WHERE workspace_id = $1 ORDER BY created_at",
        )
        .bind(workspace_id.to_string())
        .fetch_all(self.pool.inner())
        .await?;
        rows.iter().map(session_from_row).collect()
    }

    pub async fn delete_session(&self, id: Uuid) -> Result<()> {
        let id = id.to_string();
        let mut tx = self.pool.inner().begin().await?;
        sqlx::query(
            r#"DELETE FROM chat_message_sources WHERE message_id IN (
                 SELECT id FROM chat_messages WHERE session_id = $1)"#,
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM chat_messages WHERE session_id = $1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chat_sessions WHERE id = $1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// All messages of a session, oldest first. The role tiebreak keeps a
    /// user message ahead of its assistant reply if both carry the same
    /// timestamp.
    pub async fn list_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"SELECT id, session_id, role, content, created_at FROM chat_messages
               WHERE session_id = $1 ORDER BY created_at ASC, role DESC"#,
        )
        .bind(session_id.to_string())
        .fetch_all(self.pool.inner())
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    /// The `limit` most recent messages, returned oldest first for prompt
    /// assembly.
    pub async fn recent_messages(&self, session_id: Uuid, limit: usize) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"SELECT id, session_id, role, content, created_at FROM chat_messages
               WHERE session_id = $1 ORDER BY created_at DESC, role ASC LIMIT $2"#,
        )
        .bind(session_id.to_string())
        .bind(limit as i64)
        .fetch_all(self.pool.inner())
        .await?;
        let mut messages: Vec<ChatMessage> =
            rows.iter().map(message_from_row).collect::<Result<_>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Persist one completed `/ask` exchange: the user question, the
    /// assistant answer and its sources, all-or-nothing.
    pub async fn record_exchange(
        &self,
        session_id: Uuid,
        question: &str,
        answer: &str,
        sources: &[MessageSource],
    ) -> Result<ChatMessage> {
        let now = Utc::now();
        let user_message = ChatMessage {
            id: Uuid::new_v4(),
            session_id,
            role: ChatRole::User,
            content: question.to_string(),
            created_at: now,
        };
        let assistant_message = ChatMessage {
            id: Uuid::new_v4(),
            session_id,
            role: ChatRole::Assistant,
            content: answer.to_string(),
            created_at: now + chrono::Duration::microseconds(1),
        };

        let mut tx = self.pool.inner().begin().await?;
        for message in [&user_message, &assistant_message] {
            sqlx::query(
                "INSERT INTO chat_messages (id, session_id, role, content, created_at) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(message.id.to_string())
            .bind(message.session_id.to_string())
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(fmt_time(message.created_at))
            .execute(&mut *tx)
            .await?;
        }
        for source in sources {
            sqlx::query(
                r#"INSERT INTO chat_message_sources
                   (id, message_id, source_id, document_name, page_start, page_end, snippet)
                   VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(assistant_message.id.to_string())
            .bind(source.source_id.to_string())
            .bind(&source.document_name)
            .bind(source.page_start)
            .bind(source.page_end)
            .bind(&source.snippet)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(assistant_message)
    }

    pub async fn list_message_sources(&self, message_id: Uuid) -> Result<Vec<MessageSource>> {
        let rows = sqlx::query(
            r#"SELECT source_id, document_name, page_start, page_end, snippet
               FROM chat_message_sources WHERE message_id = $1"#,
        )
        .bind(message_id.to_string())
        .fetch_all(self.pool.inner())
        .await?;
        rows.iter()
            .map(|row| {
                Ok(MessageSource {
                    source_id: parse_uuid(&row.try_get::<String, _>("source_id")?)?,
                    document_name: row.try_get("document_name")?,
                    page_start: row.try_get("page_start")?,
                    page_end: row.try_get("page_end")?,
                    snippet: row.try_get("snippet")?,
                })
            })
            .collect()
    }
}
