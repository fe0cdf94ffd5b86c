//! Bounded worker pool.
//!
//! A [`WorkerPool`] owns `worker_count` long-lived tokio tasks parked on a
//! shared job queue. [`WorkerPool::execute`] submits a batch of independent
//! [`Task`]s and resolves once every one of them has produced a result,
//! returning the results in submission order.
//!
//! Each task runs with its own [`ExecutionContext`]: a child of the
//! caller's [`CancellationToken`] and a deadline `task_timeout` after the
//! task starts. The pool turns the three ways a task can end without
//! producing a value into ordinary errors:
//!
//! - the deadline passes: [`MuninError::Timeout`]
//! - the caller's token is cancelled: [`MuninError::Cancelled`]
//! - the task panics: [`MuninError::Panicked`]
//!
//! A panicking task never takes its worker (or sibling tasks) down with it.
//! The pool has no notion of dependencies; callers submit batches that are
//! safe to run concurrently.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::executor::ExecutionContext;
use crate::telemetry;
use crate::{MuninError, Result};

/// Default number of workers.
pub const DEFAULT_WORKERS: usize = 5;

/// Default per-task time budget: 5 minutes.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);

type Job = BoxFuture<'static, ()>;
type TaskFn<T> = Box<dyn FnOnce(ExecutionContext) -> BoxFuture<'static, Result<T>> + Send>;

/// A unit of work for the pool.
///
/// The label identifies the task in logs (the engine uses the component id).
pub struct Task<T> {
    label: String,
    run: TaskFn<T>,
}

impl<T> Task<T> {
    pub fn new<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(ExecutionContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            label: label.into(),
            run: Box::new(move |ctx| Box::pin(f(ctx))),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("label", &self.label).finish()
    }
}

/// Fixed-size pool of long-lived workers.
///
/// Dropping the pool closes the queue; workers finish the job they hold
/// and exit.
#[derive(Debug)]
pub struct WorkerPool {
    queue: mpsc::UnboundedSender<Job>,
    worker_count: usize,
    task_timeout: Duration,
}

impl WorkerPool {
    /// Spawn `worker_count` workers on the current tokio runtime.
    ///
    /// Fails with [`MuninError::Configuration`] when `worker_count` or
    /// `task_timeout` is zero, or when called outside a tokio runtime.
    pub fn new(worker_count: usize, task_timeout: Duration) -> Result<Self> {
        if worker_count == 0 {
            return Err(MuninError::Configuration(
                "worker pool needs at least one worker".into(),
            ));
        }
        if task_timeout.is_zero() {
            return Err(MuninError::Configuration(
                "task timeout must be greater than zero".into(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            MuninError::Configuration("worker pool must be created inside a tokio runtime".into())
        })?;

        let (queue, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        for worker_id in 0..worker_count {
            runtime.spawn(worker_loop(worker_id, Arc::clone(&receiver)));
        }
        debug!(worker_count, ?task_timeout, "worker pool started");

        Ok(Self {
            queue,
            worker_count,
            task_timeout,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    /// Run `tasks` concurrently (at most `worker_count` at a time) and
    /// return their results in the order the tasks were given.
    ///
    /// Cancelling `cancel` cancels every task of this batch: queued tasks
    /// resolve to [`MuninError::Cancelled`] without running and in-flight
    /// tasks are dropped at their next suspension point.
    pub async fn execute<T>(&self, tasks: Vec<Task<T>>, cancel: &CancellationToken) -> Vec<Result<T>>
    where
        T: Send + 'static,
    {
        let mut slots: Vec<Option<Result<T>>> = Vec::with_capacity(tasks.len());
        slots.resize_with(tasks.len(), || None);
        if tasks.is_empty() {
            return Vec::new();
        }

        let (results_tx, mut results_rx) = mpsc::unbounded_channel::<(usize, Result<T>)>();
        for (index, task) in tasks.into_iter().enumerate() {
            let results_tx = results_tx.clone();
            let token = cancel.child_token();
            let timeout = self.task_timeout;
            let job: Job = Box::pin(async move {
                let result = run_task(task, token, timeout).await;
                let _ = results_tx.send((index, result));
            });
            if self.queue.send(job).is_err() {
                slots[index] = Some(Err(MuninError::Configuration(
                    "worker pool is shut down".into(),
                )));
            }
        }
        drop(results_tx);

        while let Some((index, result)) = results_rx.recv().await {
            slots[index] = Some(result);
        }

        // A job dropped without reporting (runtime shutting down) counts as
        // cancelled.
        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(MuninError::Cancelled)))
            .collect()
    }
}

async fn worker_loop(worker_id: usize, queue: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>) {
    loop {
        let job = {
            let mut queue = queue.lock().await;
            queue.recv().await
        };
        match job {
            Some(job) => job.await,
            None => break,
        }
    }
    debug!(worker_id, "worker stopped");
}

async fn run_task<T>(task: Task<T>, token: CancellationToken, timeout: Duration) -> Result<T> {
    if token.is_cancelled() {
        return Err(MuninError::Cancelled);
    }

    let Task { label, run } = task;
    let ctx = ExecutionContext::new(token.clone(), Instant::now() + timeout);

    // The closure itself may panic before handing back a future.
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| run(ctx))) {
        Ok(future) => future,
        Err(payload) => return Err(panicked(&label, payload)),
    };

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(MuninError::Cancelled),
        outcome = tokio::time::timeout(timeout, AssertUnwindSafe(future).catch_unwind()) => outcome,
    };

    match outcome {
        Err(_) => {
            token.cancel();
            Err(MuninError::Timeout(timeout))
        }
        Ok(Err(payload)) => Err(panicked(&label, payload)),
        Ok(Ok(result)) => result,
    }
}

fn panicked(label: &str, payload: Box<dyn Any + Send>) -> MuninError {
    let message = panic_message(payload.as_ref());
    metrics::counter!(telemetry::TASK_PANICS_TOTAL).increment(1);
    error!(task = label, panic = %message, "task panicked");
    MuninError::Panicked(message)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
