//! Bounded worker pool — a fixed set of tokio tasks draining one queue.
//!
//! ```text
//! submit ──▶ [ bounded mpsc queue ] ──▶ worker-0
//!                                   ──▶ worker-1
//!                                   ──▶ ...
//! ```
//!
//! When the queue is full, `Block` makes `submit` wait for space (until
//! shutdown starts) and `Reject` fails immediately with `QueueFull`.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use actionbot_core::config::{BackpressurePolicy, DispatcherConfig};
use actionbot_core::error::{ActionBotError, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// A unit of work queued on the pool.
pub type Job = BoxFuture<'static, ()>;

/// Pool counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub queue_capacity: usize,
    pub submitted: u64,
    pub completed: u64,
    pub rejected: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
}

pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closing: watch::Sender<bool>,
    counters: Arc<Counters>,
    worker_count: usize,
    capacity: usize,
    policy: BackpressurePolicy,
}

impl WorkerPool {
    /// Spawn `workers` tasks over a queue of `capacity`. Must be called inside
    /// a tokio runtime. Zero values are raised to one.
    pub fn new(workers: usize, capacity: usize, policy: BackpressurePolicy) -> Self {
        let workers = workers.max(1);
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel::<Job>(capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let handles = (0..workers)
            .map(|id| tokio::spawn(run_worker(id, rx.clone(), counters.clone())))
            .collect();

        tracing::info!("👷 Worker pool started: {workers} workers, queue {capacity} ({policy:?})");
        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
            closing: watch::channel(false).0,
            counters,
            worker_count: workers,
            capacity,
            policy,
        }
    }

    pub fn from_config(config: &DispatcherConfig) -> Self {
        Self::new(config.workers, config.queue_capacity, config.backpressure)
    }

    /// Queue a job according to the backpressure policy.
    pub async fn submit(&self, job: Job) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ActionBotError::PoolClosed)?;

        match self.policy {
            BackpressurePolicy::Reject => match sender.try_send(job) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("📛 Worker queue full ({}), job rejected", self.capacity);
                    return Err(ActionBotError::QueueFull(self.capacity));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(ActionBotError::PoolClosed);
                }
            },
            BackpressurePolicy::Block => {
                let mut closing = self.closing.subscribe();
                tokio::select! {
                    sent = sender.send(job) => sent.map_err(|_| ActionBotError::PoolClosed)?,
                    _ = closing.wait_for(|closing| *closing) => {
                        return Err(ActionBotError::PoolClosed);
                    }
                }
            }
        }

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Stop accepting work, then wait for queued and running jobs.
    /// With a timeout, workers still busy at the deadline are aborted.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> Result<()> {
        self.closing.send_replace(true);
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return Ok(());
        }
        drop(sender);

        let handles: Vec<_> = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let drain = futures::future::join_all(handles);

        match timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, drain).await.is_err() {
                    aborts.iter().for_each(|h| h.abort());
                    tracing::warn!("⏱️ Worker pool shutdown timed out after {limit:?}");
                    return Err(ActionBotError::Other(format!(
                        "worker pool shutdown timed out after {limit:?}"
                    )));
                }
            }
            None => {
                drain.await;
            }
        }

        tracing::info!("👷 Worker pool stopped ({} jobs completed)", self.stats().completed);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        *self.closing.borrow()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.worker_count,
            queue_capacity: self.capacity,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(
    id: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    counters: Arc<Counters>,
) {
    loop {
        let job = queue.lock().await.recv().await;
        let Some(job) = job else { break };
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            tracing::error!("💥 Job panicked on worker {id}");
        }
        counters.completed.fetch_add(1, Ordering::Relaxed);
    }
    tracing::debug!("Worker {id} exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_job(counter: &Arc<AtomicUsize>, delay: Duration) -> Job {
        let counter = counter.clone();
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_runs_all_jobs_before_shutdown_returns() {
        let pool = WorkerPool::new(3, 10, BackpressurePolicy::Block);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            pool.submit(counting_job(&done, Duration::from_millis(20)))
                .await
                .unwrap();
        }
        pool.shutdown(None).await.unwrap();

        assert_eq!(done.load(Ordering::SeqCst), 8);
        let stats = pool.stats();
        assert_eq!(stats.submitted, 8);
        assert_eq!(stats.completed, 8);
        assert_eq!(stats.rejected, 0);
    }

    #[tokio::test]
    async fn test_reject_policy_when_full() {
        let pool = WorkerPool::new(1, 1, BackpressurePolicy::Reject);
        let done = Arc::new(AtomicUsize::new(0));

        // one job occupies the worker, one fills the queue
        pool.submit(counting_job(&done, Duration::from_millis(200)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.submit(counting_job(&done, Duration::ZERO)).await.unwrap();

        let err = pool
            .submit(counting_job(&done, Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionBotError::QueueFull(1)));
        assert_eq!(pool.stats().rejected, 1);

        pool.shutdown(None).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_block_policy_waits_for_space() {
        let pool = WorkerPool::new(1, 1, BackpressurePolicy::Block);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            pool.submit(counting_job(&done, Duration::from_millis(10)))
                .await
                .unwrap();
        }
        pool.shutdown(None).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_blocked_submit_aborts_on_shutdown() {
        let pool = Arc::new(WorkerPool::new(1, 1, BackpressurePolicy::Block));
        let done = Arc::new(AtomicUsize::new(0));
        pool.submit(counting_job(&done, Duration::from_millis(200)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.submit(counting_job(&done, Duration::ZERO)).await.unwrap();

        let blocked = {
            let pool = pool.clone();
            let done = done.clone();
            tokio::spawn(async move { pool.submit(counting_job(&done, Duration::ZERO)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.shutdown(None).await.unwrap();
        let result = blocked.await.unwrap();
        assert!(matches!(result, Err(ActionBotError::PoolClosed)));
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let pool = WorkerPool::new(2, 4, BackpressurePolicy::Block);
        pool.shutdown(None).await.unwrap();
        assert!(pool.is_closed());
        let err = pool.submit(Box::pin(async {})).await.unwrap_err();
        assert!(matches!(err, ActionBotError::PoolClosed));
        // second shutdown is a no-op
        pool.shutdown(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_timeout() {
        let pool = WorkerPool::new(1, 2, BackpressurePolicy::Block);
        let done = Arc::new(AtomicUsize::new(0));
        pool.submit(counting_job(&done, Duration::from_secs(5)))
            .await
            .unwrap();
        let result = pool.shutdown(Some(Duration::from_millis(50))).await;
        assert!(result.is_err());
        assert_eq!(done.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1, 4, BackpressurePolicy::Block);
        let done = Arc::new(AtomicUsize::new(0));
        pool.submit(Box::pin(async { panic!("boom") })).await.unwrap();
        pool.submit(counting_job(&done, Duration::ZERO)).await.unwrap();
        pool.shutdown(None).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().completed, 2);
    }
}
