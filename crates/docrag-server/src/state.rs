use std::sync::Arc;

use docrag_core::pipeline::JobQueue;
use docrag_core::AppContext;

/// Application state shared across handlers: the adapter context built at
/// startup plus the job queue feeding the ingestion workers.
#[derive(Clone)]
pub struct AppState {
    pub context: Arc<AppContext>,
    pub queue: JobQueue,
}
