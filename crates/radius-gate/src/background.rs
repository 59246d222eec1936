//! Fire-and-forget work off the authorization path
//!
//! Plugins push slow side effects (audit marks, request dumps) onto a
//! [`BackgroundQueue`]. Jobs run one at a time, in submission order, on the
//! blocking thread pool, so file appends from different plugins never
//! interleave. Each submission returns a [`JobHandle`] carrying the job's
//! result; dropping the handle is fine. [`BackgroundQueue::flush`] waits for
//! everything submitted before it.
//!
//! The queue is bounded. A submission that finds it full is dropped and
//! counted instead of waiting for the worker.

use crate::module::PluginError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// Default number of jobs waiting for the worker
pub const DEFAULT_CAPACITY: usize = 10_000;

type Job = Box<dyn FnOnce() -> Result<(), PluginError> + Send + 'static>;

struct Envelope {
    job: Job,
    done: oneshot::Sender<Result<(), PluginError>>,
}

#[derive(Clone)]
pub struct BackgroundQueue {
    tx: mpsc::Sender<Envelope>,
    dropped: Arc<AtomicU64>,
}

impl std::fmt::Debug for BackgroundQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundQueue")
            .field("closed", &self.tx.is_closed())
            .field("capacity", &self.tx.max_capacity())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl BackgroundQueue {
    /// Start the worker with [`DEFAULT_CAPACITY`]. Must be called from within a Tokio runtime.
    pub fn spawn() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Start the worker with room for `capacity` waiting jobs (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Envelope>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(Envelope { job, done }) = rx.recv().await {
                let result = match tokio::task::spawn_blocking(job).await {
                    Ok(result) => result,
                    Err(e) => Err(PluginError::Background(e.to_string())),
                };
                if let Err(ref e) = result {
                    warn!(error = %e, "Background job failed");
                }
                // Nobody waiting is the common case
                let _ = done.send(result);
            }
            debug!("Background queue closed");
        });

        BackgroundQueue {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue a job; never blocks
    ///
    /// When the queue is full the job is dropped and its handle reports
    /// [`PluginError::QueueFull`].
    pub fn submit<F>(&self, job: F) -> JobHandle
    where
        F: FnOnce() -> Result<(), PluginError> + Send + 'static,
    {
        let (done, rx) = oneshot::channel();
        let envelope = Envelope {
            job: Box::new(job),
            done,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => trace!("Background job submitted"),
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Background queue full, job dropped");
                let _ = envelope.done.send(Err(PluginError::QueueFull));
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Background queue closed, dropping job");
            }
        }
        JobHandle { rx }
    }

    /// Jobs dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait until every job submitted before this call has finished
    ///
    /// Unlike [`submit`](Self::submit) this waits for room in the queue.
    pub async fn flush(&self) {
        let (done, rx) = oneshot::channel();
        let envelope = Envelope {
            job: Box::new(|| Ok(())),
            done,
        };
        if self.tx.send(envelope).await.is_err() {
            return;
        }
        let _ = JobHandle { rx }.wait().await;
    }
}

/// Completion signal of one background job
pub struct JobHandle {
    rx: oneshot::Receiver<Result<(), PluginError>>,
}

impl JobHandle {
    pub async fn wait(self) -> Result<(), PluginError> {
        self.rx.await.unwrap_or(Err(PluginError::QueueClosed))
    }
}
