// Queue management module for background ingestion
// Owns job lifecycles: schedule, observe, cancel, await, drain


use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::{AbortReason, IngestionJob, IngestionOutcome};
use crate::{RagError, Result};

/// Observable state of the latest job scheduled for a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Completed { chunks_indexed: usize },
    Aborted { chunks_indexed: usize, reason: AbortReason },
    Failed { error: String },
}

impl JobStatus {
    #[inline]
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "Queued"),
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Completed { chunks_indexed } => {
                write!(f, "Completed ({} chunks)", chunks_indexed)
            }
            JobStatus::Aborted {
                chunks_indexed,
                reason,
            } => write!(f, "Aborted: {} ({} chunks)", reason, chunks_indexed),
            JobStatus::Failed { error } => write!(f, "Failed: {}", error),
        }
    }
}

impl From<&Result<IngestionOutcome>> for JobStatus {
    #[inline]
    fn from(result: &Result<IngestionOutcome>) -> Self {
        match result {
            Ok(IngestionOutcome::Completed { chunks_indexed, .. }) => JobStatus::Completed {
                chunks_indexed: *chunks_indexed,
            },
            Ok(IngestionOutcome::Aborted {
                chunks_indexed,
                reason,
            }) => JobStatus::Aborted {
                chunks_indexed: *chunks_indexed,
                reason: *reason,
            },
            Err(e) => JobStatus::Failed {
                error: e.to_string(),
            },
        }
    }
}

#[derive(Debug)]
struct JobEntry {
    status: JobStatus,
    cancel: Arc<AtomicBool>,
}

type JobTable = Arc<RwLock<HashMap<i64, JobEntry>>>;

struct QueuedJob {
    job: IngestionJob,
    reply: oneshot::Sender<Result<IngestionOutcome>>,
}

/// Awaitable result of a scheduled job
#[derive(Debug)]
pub struct JobHandle {
    document_id: i64,
    receiver: oneshot::Receiver<Result<IngestionOutcome>>,
}

impl JobHandle {
    #[inline]
    pub fn document_id(&self) -> i64 {
        self.document_id
    }

    /// Wait for the job to finish
    #[inline]
    pub async fn wait(self) -> Result<IngestionOutcome> {
        self.receiver.await.map_err(|_| {
            RagError::Ingestion(format!(
                "Ingestion job for document {} ended without reporting",
                self.document_id
            ))
        })?
    }
}

/// Runs ingestion jobs concurrently on a dispatcher task.
///
/// Jobs for different documents run in parallel. Scheduling a second job for
/// the same document is allowed; status and cancellation then track the newest.
pub struct IngestionQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<QueuedJob>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    jobs: JobTable,
}

impl std::fmt::Debug for IngestionQueue {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionQueue").finish_non_exhaustive()
    }
}

impl IngestionQueue {
    /// Start the dispatcher. Must be called from within a tokio runtime.
    #[inline]
    pub fn start() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let jobs: JobTable = Arc::new(RwLock::new(HashMap::new()));
        let dispatcher = tokio::spawn(dispatch(receiver, Arc::clone(&jobs)));

        info!("Ingestion queue started");

        Self {
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            jobs,
        }
    }

    /// Hand a job to the dispatcher
    #[inline]
    pub async fn schedule(&self, job: IngestionJob) -> Result<JobHandle> {
        let document_id = job.document_id();
        let (reply, receiver) = oneshot::channel();

        let sender = self.sender.lock().await.clone().ok_or_else(|| {
            RagError::Ingestion("Ingestion queue is shut down".to_string())
        })?;

        self.jobs.write().await.insert(
            document_id,
            JobEntry {
                status: JobStatus::Queued,
                cancel: job.cancel_flag(),
            },
        );

        sender.send(QueuedJob { job, reply }).map_err(|_| {
            RagError::Ingestion("Ingestion dispatcher has stopped".to_string())
        })?;

        debug!("Scheduled ingestion for document {}", document_id);
        Ok(JobHandle {
            document_id,
            receiver,
        })
    }

    /// Raise the cancel flag of the document's job. Returns false if no
    /// unfinished job exists.
    #[inline]
    pub async fn cancel(&self, document_id: i64) -> bool {
        let jobs = self.jobs.read().await;
        match jobs.get(&document_id) {
            Some(entry) if !entry.status.is_finished() => {
                entry.cancel.store(true, Ordering::SeqCst);
                info!("Cancelling ingestion for document {}", document_id);
                true
            }
            _ => false,
        }
    }

    /// Cancel the document's job if it is unfinished and drop its entry.
    /// Returns false if no entry existed.
    #[inline]
    pub async fn forget(&self, document_id: i64) -> bool {
        let Some(entry) = self.jobs.write().await.remove(&document_id) else {
            return false;
        };
        if !entry.status.is_finished() {
            entry.cancel.store(true, Ordering::SeqCst);
            info!("Cancelling ingestion for document {}", document_id);
        }
        true
    }

    /// Number of tracked jobs, finished or not
    #[inline]
    pub async fn tracked_jobs(&self) -> usize {
        self.jobs.read().await.len()
    }

    #[inline]
    pub async fn status(&self, document_id: i64) -> Option<JobStatus> {
        self.jobs
            .read()
            .await
            .get(&document_id)
            .map(|entry| entry.status.clone())
    }

    /// Number of queued or running jobs
    #[inline]
    pub async fn active_jobs(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|entry| !entry.status.is_finished())
            .count()
    }

    /// Stop accepting jobs and wait for every scheduled job to finish
    #[inline]
    pub async fn shutdown(&self) {
        drop(self.sender.lock().await.take());

        let dispatcher = self.dispatcher.lock().await.take();
        if let Some(dispatcher) = dispatcher {
            info!("Draining ingestion queue");
            if let Err(e) = dispatcher.await {
                error!("Ingestion dispatcher failed: {}", e);
            }
        }
    }
}

async fn set_status(jobs: &JobTable, document_id: i64, cancel: &Arc<AtomicBool>, status: JobStatus) {
    let mut jobs = jobs.write().await;
    // a newer job for the same document owns the entry
    match jobs.get_mut(&document_id) {
        Some(entry) if Arc::ptr_eq(&entry.cancel, cancel) => entry.status = status,
        _ => {}
    }
}

async fn run_job(queued: QueuedJob, jobs: JobTable) {
    let QueuedJob { job, reply } = queued;
    let document_id = job.document_id();
    let cancel = job.cancel_flag();

    set_status(&jobs, document_id, &cancel, JobStatus::Running).await;

    let result = job.run().await;
    if let Err(e) = &result {
        error!("Ingestion of document {} failed: {}", document_id, e);
    }

    set_status(&jobs, document_id, &cancel, JobStatus::from(&result)).await;

    if reply.send(result).is_err() {
        debug!("Nobody is waiting on the job for document {}", document_id);
    }
}

async fn dispatch(mut receiver: mpsc::UnboundedReceiver<QueuedJob>, jobs: JobTable) {
    let mut running = JoinSet::new();

    loop {
        tokio::select! {
            queued = receiver.recv() => match queued {
                Some(queued) => {
                    running.spawn(run_job(queued, Arc::clone(&jobs)));
                }
                None => break,
            },
            Some(joined) = running.join_next(), if !running.is_empty() => {
                if let Err(e) = joined {
                    warn!("Ingestion task panicked: {}", e);
                }
            }
        }
    }

    debug!("Waiting for {} in-flight ingestion jobs", running.len());
    while let Some(joined) = running.join_next().await {
        if let Err(e) = joined {
            warn!("Ingestion task panicked: {}", e);
        }
    }
    info!("Ingestion queue drained");
}
