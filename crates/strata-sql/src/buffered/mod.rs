//! Buffered executor: asynchronous, batched creates.
//!
//! `create` places the prepared insert on a bounded queue and returns. A timer
//! drains the queue every `write_interval`, grouping up to `max_batched_events`
//! items that share a statement template into one batch, and hands each batch to a
//! fixed pool of writers. Each batch is written in its own transaction.
//!
//! Reads and queries are never buffered; they go straight to the delegate.
//!
//! Failure handling:
//! - a full queue makes producers wait (backpressure), it never drops events;
//! - a saturated worker pool puts the drained batch back at the head of the queue;
//! - a failed batch is rolled back and logged, later batches are still written;
//! - producers are never told about write failures once `create` has returned.
//!
//! On `close` the executor stops accepting events, flushes the queue when
//! `auto_flush` is set (otherwise discards it), and waits for in-flight batches.
//! All of this shares a single `shutdown_timeout` deadline.

mod pool;
mod queue;
mod writer;

use async_trait::async_trait;
use sqlx::AnyPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_core::BufferingConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::StrataError;
use crate::executor::{AuditEventExecutor, Row};
use crate::parameter::PreparedOperation;

use pool::WorkerPool;
use queue::EventQueue;

pub use pool::BatchStats;
pub use writer::{write_batch, BatchOutcome};

/// Shared between the executor, its timer and the flush path.
struct Pipeline {
    queue: EventQueue,
    workers: WorkerPool,
    max_batched_events: usize,
    stop_requested: AtomicBool,
}

impl Pipeline {
    /// One timer tick: drain while there is work, stopping at the first rejection.
    fn drain_available(&self) {
        while !self.stop_requested.load(Ordering::Acquire) && !self.queue.is_empty() {
            let batch = self.queue.drain_batch(self.max_batched_events);
            let size = batch.len();
            if size == 0 {
                break;
            }
            match self.workers.try_submit(batch) {
                Ok(()) => self.queue.release(size),
                Err(batch) => {
                    tracing::debug!(
                        topic = %batch[0].topic(),
                        batch_size = size,
                        "Audit worker pool is busy, returning batch to the queue"
                    );
                    self.queue.requeue(batch);
                    break;
                }
            }
        }
    }

    /// Drain until the queue is empty, waiting for worker capacity as needed.
    async fn flush(&self) {
        loop {
            let batch = self.queue.drain_batch(self.max_batched_events);
            let size = batch.len();
            if size == 0 {
                break;
            }
            match self.workers.submit(batch).await {
                Ok(()) => self.queue.release(size),
                Err(batch) => {
                    tracing::error!(
                        topic = %batch[0].topic(),
                        queued = self.queue.len() + size,
                        "Unable to flush remaining audit events, worker pool is shut down"
                    );
                    self.queue.requeue(batch);
                    break;
                }
            }
        }
    }
}

/// Executor that buffers creates and writes them in batches.
pub struct BufferedExecutor {
    pipeline: Arc<Pipeline>,
    delegate: Arc<dyn AuditEventExecutor>,
    auto_flush: bool,
    shutdown_timeout: Duration,
    stop_tx: watch::Sender<bool>,
    timer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl BufferedExecutor {
    /// Start the drain timer and writer pool. Must be called from within a Tokio
    /// runtime. Batches are written on connections from `pool`; reads and queries
    /// go to `delegate`.
    pub fn new(
        config: &BufferingConfig,
        delegate: Arc<dyn AuditEventExecutor>,
        pool: AnyPool,
    ) -> Result<Self, StrataError> {
        config.validate()?;

        let pipeline = Arc::new(Pipeline {
            queue: EventQueue::new(config.max_size),
            workers: WorkerPool::spawn(config.writer_threads, pool),
            max_batched_events: config.max_batched_events,
            stop_requested: AtomicBool::new(false),
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        let timer = tokio::spawn(run_timer(
            Arc::clone(&pipeline),
            config.write_interval,
            stop_rx,
        ));

        tracing::debug!(
            capacity = config.max_size,
            writer_threads = config.writer_threads,
            max_batched_events = config.max_batched_events,
            write_interval_ms = config.write_interval.as_millis() as u64,
            "Buffered audit executor started"
        );

        Ok(Self {
            pipeline,
            delegate,
            auto_flush: config.auto_flush,
            shutdown_timeout: config.shutdown_timeout,
            stop_tx,
            timer: tokio::sync::Mutex::new(Some(timer)),
        })
    }

    /// Submit every queued event to the writers, waiting for writer capacity when
    /// needed. Returns once the queue is empty; submitted batches may still be in
    /// flight.
    pub async fn flush(&self) {
        self.pipeline.flush().await;
    }

    /// Number of events waiting in the queue.
    pub fn queued(&self) -> usize {
        self.pipeline.queue.len()
    }

    /// Configured queue capacity.
    pub fn capacity(&self) -> usize {
        self.pipeline.queue.capacity()
    }

    /// Batches and events handled by the writers so far.
    pub fn stats(&self) -> BatchStats {
        self.pipeline.workers.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.pipeline.stop_requested.load(Ordering::Acquire)
    }
}

#[async_trait]
impl AuditEventExecutor for BufferedExecutor {
    async fn create(&self, operation: PreparedOperation) -> Result<(), StrataError> {
        if self.is_closed() {
            return Err(StrataError::ExecutorClosed);
        }
        self.pipeline.queue.push(operation).await
    }

    async fn read(&self, operation: PreparedOperation) -> Result<Vec<Row>, StrataError> {
        self.delegate.read(operation).await
    }

    async fn query(&self, operation: PreparedOperation) -> Result<Vec<Row>, StrataError> {
        self.delegate.query(operation).await
    }

    async fn close(&self) {
        if self.pipeline.stop_requested.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pipeline.queue.close();
        let _ = self.stop_tx.send(true);

        let deadline = Instant::now() + self.shutdown_timeout;

        if let Some(mut timer) = self.timer.lock().await.take()
            && tokio::time::timeout_at(deadline, &mut timer).await.is_err()
        {
            tracing::error!("Audit drain timer did not stop in time, aborting it");
            timer.abort();
        }

        if self.auto_flush {
            if tokio::time::timeout_at(deadline, self.pipeline.flush())
                .await
                .is_err()
            {
                tracing::error!(
                    queued = self.pipeline.queue.len(),
                    "Unable to flush audit events before the shutdown timeout"
                );
            }
        } else {
            let discarded = self.pipeline.queue.discard();
            if discarded > 0 {
                tracing::warn!(discarded, "Discarding queued audit events on shutdown");
            }
        }

        self.pipeline.workers.shutdown(deadline).await;
        self.delegate.close().await;
    }
}

async fn run_timer(pipeline: Arc<Pipeline>, interval: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => pipeline.drain_available(),
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::Parameter;
    use sqlx::any::AnyPoolOptions;

    async fn memory_pool() -> AnyPool {
        sqlx::any::install_default_drivers();
        AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    fn op(n: i64) -> PreparedOperation {
        PreparedOperation::new(
            "access",
            "INSERT INTO access (n) VALUES (?)",
            vec![Parameter::number(n)],
        )
    }

    #[tokio::test]
    async fn test_rejected_batch_goes_back_to_the_queue() {
        let pool = memory_pool().await;
        let pipeline = Pipeline {
            queue: EventQueue::new(4),
            workers: WorkerPool::spawn(1, pool),
            max_batched_events: 2,
            stop_requested: AtomicBool::new(false),
        };
        pipeline
            .workers
            .shutdown(Instant::now() + Duration::from_secs(1))
            .await;

        for n in 0..3 {
            pipeline.queue.push(op(n)).await.unwrap();
        }
        pipeline.drain_available();
        assert_eq!(pipeline.queue.len(), 3);
        assert_eq!(pipeline.queue.available(), 1);

        pipeline.flush().await;
        assert_eq!(pipeline.queue.len(), 3);

        let order: Vec<_> = pipeline
            .queue
            .drain_batch(3)
            .iter()
            .map(|o| o.parameters()[0].value.clone())
            .collect();
        assert_eq!(order, [0, 1, 2]);
    }

    #[tokio::test]
    async fn test_create_after_close_is_rejected() {
        let pool = memory_pool().await;
        let delegate = Arc::new(crate::executor::DirectExecutor::new(pool.clone()));
        let config = BufferingConfig {
            enabled: true,
            ..BufferingConfig::default()
        };
        let executor = BufferedExecutor::new(&config, delegate, pool).unwrap();

        executor.close().await;
        assert!(executor.is_closed());
        assert!(matches!(
            executor.create(op(1)).await,
            Err(StrataError::ExecutorClosed)
        ));
        // Closing twice is a no-op
        executor.close().await;
    }

    #[tokio::test]
    async fn test_close_gives_up_on_stuck_writers_at_the_timeout() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE access (n INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        // Writers cannot get a connection while this one is held
        let mut held = pool.acquire().await.unwrap();

        let delegate = Arc::new(crate::executor::DirectExecutor::new(pool.clone()));
        let config = BufferingConfig {
            enabled: true,
            max_size: 8,
            writer_threads: 1,
            max_batched_events: 1,
            write_interval: Duration::from_secs(60),
            shutdown_timeout: Duration::from_millis(600),
            auto_flush: true,
        };
        let executor = BufferedExecutor::new(&config, delegate, pool.clone()).unwrap();
        for n in 0..4 {
            executor.create(op(n)).await.unwrap();
        }

        let started = std::time::Instant::now();
        executor.close().await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(500), "closed after {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1100), "closed after {:?}", elapsed);

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM access")
            .fetch_one(&mut *held)
            .await
            .unwrap();
        assert_eq!(stored, 0);
        assert_eq!(executor.stats().batches, 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_rejected() {
        let pool = memory_pool().await;
        let delegate = Arc::new(crate::executor::DirectExecutor::new(pool.clone()));
        let config = BufferingConfig {
            max_size: 0,
            ..BufferingConfig::default()
        };
        let err = BufferedExecutor::new(&config, delegate, pool)
            .err()
            .expect("zero capacity must be refused");
        assert!(err.is_configuration());
    }
}
