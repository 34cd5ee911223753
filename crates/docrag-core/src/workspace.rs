use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::model::Workspace;
use crate::util::with_retries;
use crate::vectorstore::SearchFilter;

const PURGE_ATTEMPTS: u32 = 5;
const PURGE_BASE_DELAY: Duration = Duration::from_millis(500);

/// Workspace lifecycle. Creation and listing are synchronous; deletion is
/// accepted immediately and the purge runs as a background job.
pub struct WorkspaceService<'a> {
    context: &'a AppContext,
}

impl<'a> WorkspaceService<'a> {
    pub fn new(context: &'a AppContext) -> Self {
        Self { context }
    }

    pub async fn create(&self, name: &str) -> Result<Workspace> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("workspace name must not be empty".into()));
        }
        if name.len() > 200 {
            return Err(Error::Validation(
                "workspace name must be at most 200 characters".into(),
            ));
        }
        self.context.repository.create_workspace(name).await
    }

    pub async fn list(&self) -> Result<Vec<Workspace>> {
        self.context.repository.list_workspaces().await
    }
}

/// Remove everything a workspace owns: vectors first, blobs second, rows
/// last. Each step is idempotent and retried, and the workspace row goes
/// last so an interrupted purge can always be retried by id.
pub async fn purge_workspace(context: &AppContext, workspace_id: Uuid) -> Result<()> {
    info!(%workspace_id, "purging workspace");

    let vector_store = context.vector_store.clone();
    with_retries("purge.vectors", PURGE_ATTEMPTS, PURGE_BASE_DELAY, || {
        let vector_store = vector_store.clone();
        async move {
            vector_store
                .delete_by_filter(&SearchFilter::workspace(workspace_id))
                .await
        }
    })
    .await?;

    let raw_storage = context.raw_storage.clone();
    with_retries("purge.blobs", PURGE_ATTEMPTS, PURGE_BASE_DELAY, || {
        let raw_storage = raw_storage.clone();
        async move { raw_storage.delete_prefix(&format!("{workspace_id}/")).await }
    })
    .await?;

    let repository = context.repository.clone();
    with_retries("purge.rows", PURGE_ATTEMPTS, PURGE_BASE_DELAY, || {
        let repository = repository.clone();
        async move { repository.delete_workspace_cascade(workspace_id).await }
    })
    .await?;

    info!(%workspace_id, "workspace purged");
    Ok(())
}
