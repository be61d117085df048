//! Fixed-size pool of batch writers.

use sqlx::AnyPool;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::writer::write_batch;
use crate::parameter::PreparedOperation;

type Batch = Vec<PreparedOperation>;

/// How often shutdown re-checks whether the workers have finished.
const TERMINATION_POLL: Duration = Duration::from_millis(500);

/// What the writers have done so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStats {
    /// Batches committed.
    pub batches: u64,
    /// Batches rolled back.
    pub failed_batches: u64,
    /// Events written by committed batches.
    pub events: u64,
    /// Size of the largest batch handed to a writer.
    pub largest_batch: usize,
}

#[derive(Debug, Default)]
struct WriterStats {
    batches: AtomicU64,
    failed_batches: AtomicU64,
    events: AtomicU64,
    largest_batch: AtomicUsize,
}

impl WriterStats {
    fn snapshot(&self) -> BatchStats {
        BatchStats {
            batches: self.batches.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            largest_batch: self.largest_batch.load(Ordering::Relaxed),
        }
    }
}

/// `threads` tasks writing batches taken from a bounded submission channel.
///
/// The channel holds at most `threads` waiting batches. Once it is full, or after
/// shutdown, submissions are rejected and the batch is handed back to the caller.
pub(crate) struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Batch>>>,
    workers: tokio::sync::Mutex<JoinSet<()>>,
    stats: Arc<WriterStats>,
}

impl WorkerPool {
    /// Spawn the workers. Must be called from within a Tokio runtime.
    pub(crate) fn spawn(threads: usize, pool: AnyPool) -> Self {
        let (tx, rx) = mpsc::channel::<Batch>(threads);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let stats = Arc::new(WriterStats::default());

        let mut workers = JoinSet::new();
        for worker in 0..threads {
            workers.spawn(run_worker(
                worker,
                pool.clone(),
                Arc::clone(&rx),
                Arc::clone(&stats),
            ));
        }

        Self {
            sender: Mutex::new(Some(tx)),
            workers: tokio::sync::Mutex::new(workers),
            stats,
        }
    }

    pub(crate) fn stats(&self) -> BatchStats {
        self.stats.snapshot()
    }

    /// Submit without waiting. Returns the batch when the pool is saturated or shut down.
    pub(crate) fn try_submit(&self, batch: Batch) -> Result<(), Batch> {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        match sender.as_ref() {
            Some(tx) => tx.try_send(batch).map_err(|e| match e {
                TrySendError::Full(batch) | TrySendError::Closed(batch) => batch,
            }),
            None => Err(batch),
        }
    }

    /// Submit, waiting for room in the pool. Returns the batch only when the pool
    /// has been shut down.
    pub(crate) async fn submit(&self, batch: Batch) -> Result<(), Batch> {
        let tx = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match tx {
            Some(tx) => tx.send(batch).await.map_err(|e| e.0),
            None => Err(batch),
        }
    }

    /// Stop accepting batches, let the workers finish what was already submitted and
    /// wait for them until `deadline`. Workers still running after that are aborted.
    pub(crate) async fn shutdown(&self, deadline: Instant) {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let mut workers = self.workers.lock().await;
        while !workers.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                tracing::error!(
                    remaining = workers.len(),
                    "Unable to terminate the audit worker pool in time, aborting workers"
                );
                workers.abort_all();
                break;
            }

            let wait = TERMINATION_POLL.min(deadline - now);
            match tokio::time::timeout(wait, workers.join_next()).await {
                Ok(Some(Err(e))) if e.is_panic() => {
                    tracing::error!(error = %e, "Audit worker panicked");
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => tracing::debug!("Waiting to terminate the audit worker pool"),
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    pool: AnyPool,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Batch>>>,
    stats: Arc<WriterStats>,
) {
    loop {
        let batch = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(batch) = batch else {
            tracing::debug!(worker, "Audit worker stopped");
            break;
        };

        let topic = batch
            .first()
            .map(|op| op.topic().to_string())
            .unwrap_or_default();
        let batch_size = batch.len();
        stats.largest_batch.fetch_max(batch_size, Ordering::Relaxed);

        match write_batch(&pool, batch).await {
            Ok(outcome) => {
                stats.batches.fetch_add(1, Ordering::Relaxed);
                stats
                    .events
                    .fetch_add(outcome.written as u64, Ordering::Relaxed);
                tracing::debug!(
                    worker,
                    topic = %topic,
                    written = outcome.written,
                    skipped = outcome.skipped,
                    "Audit batch committed"
                );
            }
            Err(e) => {
                stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    worker,
                    topic = %topic,
                    batch_size,
                    error = %e,
                    "Unable to create audit events"
                );
            }
        }
    }
}
