use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::TaskId;
use super::events::{ProgressEvent, ProgressSender};
use super::registry::ProgressRegistry;
use crate::config::WorkerPoolConfig;
use crate::observability::Metrics;

pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Time a cancelled job gets to clean up before it is aborted
const CANCEL_GRACE: Duration = Duration::from_secs(10);

/// Floor for the heartbeat interval; a zero period would spin
const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("task queue is full, try again later")]
    QueueFull,

    #[error("worker pool is shut down")]
    Closed,
}

/// Everything a job needs while it runs
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub progress: ProgressSender,
    pub cancel: CancellationToken,
}

/// A unit of background work
///
/// `run` returns the resulting local file name, which becomes the task's
/// `completed` event. Jobs publish intermediate events themselves but never
/// terminal ones; the runner owns the end of the channel.
#[async_trait]
pub trait TaskJob: Send + 'static {
    fn kind(&self) -> &'static str;

    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<String, TaskError>;
}

/// Queued job together with its channel endpoints
struct TaskEnvelope {
    task_id: TaskId,
    job: Box<dyn TaskJob>,
    progress: ProgressSender,
    cancel: CancellationToken,
}

/// Bounded worker pool executing [`TaskJob`]s
///
/// Architecture:
/// 1. API calls `runner.submit(job)`
/// 2. Runner creates the progress channel and gets a fresh task id
/// 3. The envelope goes into one bounded mpsc queue shared by all workers
/// 4. An idle worker picks it up and runs it under supervision
/// 5. A full queue rejects the submission instead of blocking the caller
/// 6. While a job is quiet its last event is repeated every heartbeat
pub struct TaskRunner {
    registry: Arc<ProgressRegistry>,
    queue: mpsc::Sender<TaskEnvelope>,
    metrics: Arc<Metrics>,
    workers: usize,
}

impl TaskRunner {
    /// Spawns the worker loops on the current tokio runtime.
    pub fn start(
        registry: Arc<ProgressRegistry>,
        config: &WorkerPoolConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        let workers = config.workers.max(1);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        info!(
            workers,
            queue_capacity = config.queue_capacity,
            "Starting task worker pool"
        );

        let timing = WorkerTiming {
            unclaimed_ttl: config.stream_idle_timeout(),
            heartbeat: config.heartbeat().max(MIN_HEARTBEAT),
        };
        for worker_id in 0..workers {
            tokio::spawn(worker_loop(
                worker_id,
                rx.clone(),
                registry.clone(),
                timing,
                metrics.clone(),
            ));
        }

        Self {
            registry,
            queue: tx,
            metrics,
            workers,
        }
    }

    /// Queues a job and returns its id without waiting for it to start.
    pub fn submit(&self, job: Box<dyn TaskJob>) -> Result<TaskId, RunnerError> {
        let task_id = TaskId::generate();
        let kind = job.kind();
        let (progress, cancel) = self.registry.create(task_id.clone());

        let envelope = TaskEnvelope {
            task_id: task_id.clone(),
            job,
            progress,
            cancel,
        };

        match self.queue.try_send(envelope) {
            Ok(()) => {
                self.metrics.task_submitted();
                info!(%task_id, kind, "Task queued");
                Ok(task_id)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.registry.remove(&task_id);
                self.metrics.task_rejected();
                warn!(%task_id, kind, "Task queue full, rejecting task");
                Err(RunnerError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.registry.remove(&task_id);
                error!(%task_id, kind, "Worker pool closed, rejecting task");
                Err(RunnerError::Closed)
            }
        }
    }

    pub fn registry(&self) -> &Arc<ProgressRegistry> {
        &self.registry
    }

    pub fn num_workers(&self) -> usize {
        self.workers
    }

    /// True while the workers are still draining the queue
    pub fn health_check(&self) -> bool {
        !self.queue.is_closed()
    }
}

#[derive(Debug, Clone, Copy)]
struct WorkerTiming {
    unclaimed_ttl: Duration,
    heartbeat: Duration,
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<TaskEnvelope>>>,
    registry: Arc<ProgressRegistry>,
    timing: WorkerTiming,
    metrics: Arc<Metrics>,
) {
    debug!(worker_id, "Worker started");

    loop {
        // Lock is held only while waiting, never while a job runs
        let next = { queue.lock().await.recv().await };

        let Some(envelope) = next else {
            break;
        };

        let task_id = envelope.task_id.clone();
        let span = info_span!("task", worker_id, task_id = %task_id);
        execute(envelope, timing.heartbeat, &metrics)
            .instrument(span)
            .await;
        tokio::spawn(reap_unclaimed(
            registry.clone(),
            task_id,
            timing.unclaimed_ttl,
        ));
    }

    debug!(worker_id, "Worker stopped");
}

/// Runs one job and always closes its channel with a terminal event and the
/// sentinel, whether the job succeeds, fails, panics or is cancelled.
async fn execute(envelope: TaskEnvelope, heartbeat: Duration, metrics: &Metrics) {
    let TaskEnvelope {
        task_id,
        job,
        progress,
        cancel,
    } = envelope;
    let kind = job.kind();

    let terminal = if cancel.is_cancelled() {
        info!(kind, "Task cancelled before start");
        Outcome::Cancelled
    } else {
        let ctx = TaskContext {
            task_id,
            progress: progress.clone(),
            cancel: cancel.clone(),
        };

        info!(kind, "Task started");
        let mut handle = tokio::spawn(async move { job.run(ctx).await });
        let mut beat = time::interval_at(time::Instant::now() + heartbeat, heartbeat);
        beat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let joined = loop {
            tokio::select! {
                joined = &mut handle => break joined,
                _ = cancel.cancelled() => {
                    break match time::timeout(CANCEL_GRACE, &mut handle).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            warn!(kind, "Cancelled task ignored its token, aborting");
                            handle.abort();
                            (&mut handle).await
                        }
                    };
                }
                _ = beat.tick() => progress.heartbeat(),
            }
        };

        match joined {
            Ok(Ok(video_path)) => Outcome::Completed(video_path),
            Ok(Err(_)) | Err(_) if cancel.is_cancelled() => Outcome::Cancelled,
            Ok(Err(err)) => Outcome::Failed(err.to_string()),
            Err(join_err) => {
                error!(kind, error = %join_err, "Task panicked");
                Outcome::Failed("task failed unexpectedly".to_string())
            }
        }
    };

    let event = match terminal {
        Outcome::Completed(video_path) => {
            metrics.task_completed();
            info!(kind, video_path = %video_path, "Task completed");
            ProgressEvent::Completed { video_path }
        }
        Outcome::Failed(message) => {
            metrics.task_failed();
            warn!(kind, error = %message, "Task failed");
            ProgressEvent::error(message)
        }
        Outcome::Cancelled => {
            metrics.task_cancelled();
            info!(kind, "Task cancelled");
            ProgressEvent::error("task cancelled")
        }
    };

    progress.send(event);
    progress.finish();
}

/// Drops the channel of a finished task nobody ever subscribed to.
async fn reap_unclaimed(registry: Arc<ProgressRegistry>, task_id: TaskId, ttl: Duration) {
    tokio::time::sleep(ttl).await;

    if registry.get(&task_id).is_some_and(|channel| !channel.is_claimed()) {
        debug!(%task_id, "Reaping unclaimed progress channel");
        registry.remove(&task_id);
    }
}

enum Outcome {
    Completed(String),
    Failed(String),
    Cancelled,
}
