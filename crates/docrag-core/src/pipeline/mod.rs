pub mod processor;

pub use processor::DocumentProcessor;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::workspace::purge_workspace;

/// Work accepted from the HTTP layer and executed independently of the
/// request lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Ingest { document_id: Uuid },
    PurgeWorkspace { workspace_id: Uuid },
}

/// Bounded in-memory job queue. The bound is the back-pressure mechanism:
/// when all slots are taken, `submit` blocks up to its deadline and then
/// fails with a transient error the HTTP layer maps to 503.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
}

pub struct JobReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
}

impl Clone for JobReceiver {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self { tx },
            JobReceiver {
                rx: Arc::new(Mutex::new(rx)),
            },
        )
    }

    pub async fn submit(&self, job: Job, deadline: Duration) -> Result<()> {
        self.tx.send_timeout(job, deadline).await.map_err(|e| match e {
            mpsc::error::SendTimeoutError::Timeout(_) => {
                Error::Transient("ingestion queue is full".into())
            }
            mpsc::error::SendTimeoutError::Closed(_) => {
                Error::Internal("ingestion queue is closed".into())
            }
        })
    }
}

impl JobReceiver {
    /// Next job, or `None` once every producer is gone. Multiple workers
    /// share one receiver; a job is handled by exactly one of them.
    pub async fn consume(&self) -> Option<Job> {
        self.rx.lock().await.recv().await
    }
}

/// Worker loop: drain the queue until shutdown. Failures are recorded on
/// the affected document/workspace and never tear the worker down.
pub async fn run_worker(worker_id: usize, context: Arc<AppContext>, receiver: JobReceiver) {
    let processor = DocumentProcessor::new(context.clone());
    info!(worker_id, "ingestion worker started");

    while let Some(job) = receiver.consume().await {
        match job {
            Job::Ingest { document_id } => {
                if let Err(e) = processor.process_document(document_id).await {
                    error!(worker_id, %document_id, error = %e, "document processing failed");
                }
            }
            Job::PurgeWorkspace { workspace_id } => {
                if let Err(e) = purge_workspace(&context, workspace_id).await {
                    error!(worker_id, %workspace_id, error = %e, "workspace purge failed");
                }
            }
        }
    }

    info!(worker_id, "ingestion worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_blocks_then_times_out_when_full() {
        let (queue, _receiver) = JobQueue::new(1);
        let job = Job::Ingest {
            document_id: Uuid::new_v4(),
        };
        queue.submit(job, Duration::from_millis(10)).await.unwrap();

        let err = queue
            .submit(job, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn jobs_are_delivered_once() {
        let (queue, receiver) = JobQueue::new(4);
        let a = Job::Ingest {
            document_id: Uuid::new_v4(),
        };
        let b = Job::PurgeWorkspace {
            workspace_id: Uuid::new_v4(),
        };
        queue.submit(a, Duration::from_millis(10)).await.unwrap();
        queue.submit(b, Duration::from_millis(10)).await.unwrap();

        assert_eq!(receiver.consume().await, Some(a));
        assert_eq!(receiver.consume().await, Some(b));

        drop(queue);
        assert_eq!(receiver.consume().await, None);
    }

    #[tokio::test]
    async fn consuming_frees_a_slot_for_blocked_producers() {
        let (queue, receiver) = JobQueue::new(1);
        let first = Job::Ingest {
            document_id: Uuid::new_v4(),
        };
        let second = Job::Ingest {
            document_id: Uuid::new_v4(),
        };
        queue.submit(first, Duration::from_millis(10)).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.submit(second, Duration::from_secs(1)).await })
        };
        assert_eq!(receiver.consume().await, Some(first));
        producer.await.unwrap().unwrap();
        assert_eq!(receiver.consume().await, Some(second));
    }
}
