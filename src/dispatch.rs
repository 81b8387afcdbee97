//! Task dispatch: bounded work queue and the background worker pool.
//!
//! Uploads and chat queries are accepted by the HTTP layer, converted into
//! work items, and pushed onto a bounded queue drained by a fixed pool of
//! worker tasks. Submission never waits for pipeline completion; a full
//! queue is reported to the caller instead of spawning unmanaged work.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, mpsc};
use uuid::Uuid;

use crate::chat::QueryAnswerer;
use crate::config::Config;
use crate::jobs::{JobOrchestrator, StagedUpload};

/// Errors raised while submitting work.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The bounded queue is at capacity.
    #[error("work queue is full")]
    QueueFull,
    /// The worker pool has shut down.
    #[error("workers are no longer running")]
    Closed,
}

/// One unit of background work.
enum WorkItem {
    /// Run the ingestion pipeline for a staged upload.
    Ingest(StagedUpload),
    /// Answer a chat query and publish the result under its handle.
    Query {
        handle: Uuid,
        owner: Option<String>,
        text: String,
    },
}

/// Outcome of a submitted query, observable by polling.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    /// Work accepted, answer not yet available.
    Pending,
    /// Final answer produced by the model.
    Answered(String),
    /// The unit of work failed; carries the captured message.
    Failed(String),
}

/// Poll-able map of query handles to their outcomes.
#[derive(Default)]
pub struct QueryResults {
    inner: RwLock<HashMap<Uuid, QueryOutcome>>,
}

impl QueryResults {
    async fn mark_pending(&self, handle: Uuid) {
        self.inner.write().await.insert(handle, QueryOutcome::Pending);
    }

    async fn publish(&self, handle: Uuid, outcome: QueryOutcome) {
        self.inner.write().await.insert(handle, outcome);
    }

    /// Current outcome for a handle, `None` when the handle is unknown.
    pub async fn fetch(&self, handle: Uuid) -> Option<QueryOutcome> {
        self.inner.read().await.get(&handle).cloned()
    }
}

/// Handle for submitting work and polling query results.
#[derive(Clone)]
pub struct Dispatcher {
    sender: mpsc::Sender<WorkItem>,
    results: Arc<QueryResults>,
}

impl Dispatcher {
    /// Spawn the worker pool and return the submission handle.
    pub fn start(
        config: &Config,
        orchestrator: Arc<JobOrchestrator>,
        answerer: Arc<QueryAnswerer>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let results = Arc::new(QueryResults::default());

        for worker in 0..config.worker_count {
            let receiver = receiver.clone();
            let orchestrator = orchestrator.clone();
            let answerer = answerer.clone();
            let results = results.clone();
            tokio::spawn(async move {
                tracing::debug!(worker, "Worker started");
                run_worker(receiver, orchestrator, answerer, results).await;
                tracing::debug!(worker, "Worker stopped");
            });
        }

        Self { sender, results }
    }

    /// Enqueue a staged upload for background ingestion.
    pub fn submit_ingest(&self, upload: StagedUpload) -> Result<(), DispatchError> {
        self.sender.try_send(WorkItem::Ingest(upload)).map_err(into_dispatch_error)
    }

    /// Enqueue a chat query, returning the handle to poll for its result.
    pub async fn submit_query(
        &self,
        owner: Option<String>,
        text: String,
    ) -> Result<Uuid, DispatchError> {
        let handle = Uuid::new_v4();
        self.results.mark_pending(handle).await;
        self.sender
            .try_send(WorkItem::Query { handle, owner, text })
            .map_err(into_dispatch_error)?;
        Ok(handle)
    }

    /// Poll the outcome of a previously submitted query.
    pub async fn fetch_result(&self, handle: Uuid) -> Option<QueryOutcome> {
        self.results.fetch(handle).await
    }
}

fn into_dispatch_error(err: mpsc::error::TrySendError<WorkItem>) -> DispatchError {
    match err {
        mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
        mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
    }
}

async fn run_worker(
    receiver: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    orchestrator: Arc<JobOrchestrator>,
    answerer: Arc<QueryAnswerer>,
    results: Arc<QueryResults>,
) {
    loop {
        let item = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(item) = item else {
            break;
        };

        match item {
            WorkItem::Ingest(upload) => {
                let job_id = upload.job_id;
                // Step failures live in the job record; only store faults land here.
                if let Err(err) = orchestrator.run(upload).await {
                    tracing::error!(%job_id, error = %err, "Job store failure during pipeline run");
                }
            }
            WorkItem::Query { handle, owner, text } => {
                let outcome = match answerer.answer(owner, &text).await {
                    Ok(answer) => QueryOutcome::Answered(answer),
                    Err(err) => {
                        tracing::warn!(%handle, error = %err, "Query answering failed");
                        QueryOutcome::Failed(err.to_string())
                    }
                };
                results.publish(handle, outcome).await;
            }
        }
    }
}
