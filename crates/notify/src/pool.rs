//! Bounded async task pool.
//!
//! [`AsyncTaskPool`] runs a fixed number of worker tasks that drain one
//! bounded queue of zero-argument async callbacks. Callbacks are
//! fire-and-forget: their errors are logged, never returned to the caller,
//! and a panic inside a callback is caught at the worker so the worker keeps
//! serving the queue.
//!
//! Lifecycle: `Running -> ShutdownRequested -> Draining -> Stopped`.
//! [`AsyncTaskPool::shutdown`] stops intake, signals the workers, waits for
//! them up to a deadline, then runs whatever is still queued on the calling
//! task.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default number of worker tasks.
pub const DEFAULT_WORKERS: usize = 8;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 512;

/// How long the drain pass waits for the queue lock after the workers stop.
const DRAIN_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Result type returned by pool callbacks.
pub type TaskResult = anyhow::Result<()>;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, TaskResult> + Send>;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Running,
    ShutdownRequested,
    Draining,
    Stopped,
}

impl PoolState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::ShutdownRequested,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::ShutdownRequested => 1,
            Self::Draining => 2,
            Self::Stopped => 3,
        }
    }
}

/// Sizing of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// AsyncTaskPool
// ---------------------------------------------------------------------------

/// Fixed-size pool of workers over a bounded callback queue.
///
/// Must be started inside a Tokio runtime. Share it via `Arc` to enqueue
/// from several producers.
pub struct AsyncTaskPool {
    name: String,
    sender: mpsc::Sender<Job>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    state: AtomicU8,
    cancel: CancellationToken,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl AsyncTaskPool {
    /// Spawn the workers and return the running pool.
    ///
    /// A zero worker count or capacity is raised to one.
    pub fn start(name: impl Into<String>, config: PoolConfig) -> Self {
        let name = name.into();
        if config.workers == 0 || config.queue_capacity == 0 {
            tracing::warn!(
                pool = %name,
                workers = config.workers,
                queue_capacity = config.queue_capacity,
                "Task pool sized with zero, using one"
            );
        }
        let workers = config.workers.max(1);
        let capacity = config.queue_capacity.max(1);

        let (sender, receiver) = mpsc::channel::<Job>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let cancel = CancellationToken::new();

        let handles = (0..workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    name.clone(),
                    worker_id,
                    Arc::clone(&receiver),
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::info!(pool = %name, workers, capacity, "Task pool started");

        Self {
            name,
            sender,
            receiver,
            state: AtomicU8::new(PoolState::Running.as_u8()),
            cancel,
            workers: std::sync::Mutex::new(handles),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of callbacks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Schedule a callback.
    ///
    /// Once shutdown has begun the callback is dropped with a log line and
    /// this returns immediately. Before that, a full queue makes the caller
    /// wait for room; the wait is logged as a backlog warning.
    pub async fn enqueue<F, Fut>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        if self.state() != PoolState::Running {
            tracing::warn!(pool = %self.name, "Task pool is shutting down, dropping task");
            return;
        }

        let job: Job = Box::new(move || task().boxed());

        match self.sender.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                let started = Instant::now();
                tokio::select! {
                    sent = self.sender.send(job) => {
                        let waited_ms = started.elapsed().as_millis() as u64;
                        match sent {
                            Ok(()) => tracing::warn!(
                                pool = %self.name,
                                waited_ms,
                                "Task pool backlog, enqueue had to wait"
                            ),
                            Err(_) => tracing::warn!(
                                pool = %self.name,
                                "Task pool queue closed, dropping task"
                            ),
                        }
                    }
                    _ = self.cancel.cancelled() => {
                        tracing::warn!(
                            pool = %self.name,
                            "Task pool shut down while waiting for room, dropping task"
                        );
                    }
                }
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(pool = %self.name, "Task pool queue closed, dropping task");
            }
        }
    }

    /// Stop the pool.
    ///
    /// Returns `true` when every worker stopped before `timeout` elapsed,
    /// `false` otherwise. Queued callbacks are run on the calling task after
    /// the workers stop (or the deadline passes). Calling this again is a
    /// no-op that returns `true`.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        if self
            .state
            .compare_exchange(
                PoolState::Running.as_u8(),
                PoolState::ShutdownRequested.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return true;
        }

        tracing::info!(pool = %self.name, timeout_ms = timeout.as_millis() as u64, "Task pool shutting down");
        self.cancel.cancel();

        let handles = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        let joined = tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_ok();
        if !joined {
            tracing::warn!(pool = %self.name, "Task pool workers did not stop before the deadline");
        }

        self.set_state(PoolState::Draining);
        let drained = self.drain().await;
        self.set_state(PoolState::Stopped);

        tracing::info!(pool = %self.name, drained, clean = joined, "Task pool stopped");
        joined
    }

    fn set_state(&self, state: PoolState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Run every callback still sitting in the queue. Returns how many ran.
    async fn drain(&self) -> usize {
        let mut receiver = match tokio::time::timeout(DRAIN_LOCK_TIMEOUT, self.receiver.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!(pool = %self.name, "Task pool queue busy, skipping drain");
                return 0;
            }
        };
        receiver.close();

        let mut count = 0;
        while let Ok(job) = receiver.try_recv() {
            run_job(&self.name, job).await;
            count += 1;
        }
        count
    }
}

impl Drop for AsyncTaskPool {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

async fn worker_loop(
    pool: String,
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    cancel: CancellationToken,
) {
    loop {
        let job = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                job = rx.recv() => job,
            }
        };

        match job {
            Some(job) => run_job(&pool, job).await,
            None => break,
        }
    }
    tracing::debug!(pool = %pool, worker_id, "Task pool worker stopped");
}

async fn run_job(pool: &str, job: Job) {
    let outcome = AssertUnwindSafe(async move { job().await })
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(pool, error = %e, "Pool task failed"),
        Err(payload) => tracing::error!(
            pool,
            panic = %panic_message(payload.as_ref()),
            "Pool task panicked"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
