//! Executor pool — runs submitted sub-tasks on a bounded worker pool.
//!
//! Submission is fire-and-forget: [`ExecutorPool::submit`] allocates a
//! handle and enqueues, and the finished sub-task comes back later as a
//! [`Completion`] on the pool's outbound channel, in whatever order tasks
//! happen to finish. A workload failure (or panic) becomes an error-shaped
//! result payload, never a lost completion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};

use dray_core::config::ExecutorSettings;
use dray_core::wire::codes;

use crate::service::{SubTask, TaskFailure, TaskHandle, TaskPool, Workload};
use crate::session::ConnId;

/// One finished sub-task, ready to be routed back to its session.
#[derive(Debug)]
pub struct Completion {
    pub conn: ConnId,
    pub handle: TaskHandle,
    pub result: Value,
}

struct Submission {
    conn: ConnId,
    handle: TaskHandle,
    task: SubTask,
}

/// Submission handle to the pool. Cheap to clone; all clones feed the same
/// worker loop.
#[derive(Clone)]
pub struct ExecutorPool {
    submit_tx: mpsc::UnboundedSender<Submission>,
    next_handle: Arc<AtomicU64>,
}

impl TaskPool for ExecutorPool {
    fn submit(&self, conn: ConnId, task: SubTask) -> TaskHandle {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        // The receiver only drops at shutdown; a failed send means the
        // daemon is already going down and the sub-task can be dropped.
        let _ = self.submit_tx.send(Submission { conn, handle, task });
        handle
    }
}

impl ExecutorPool {
    /// Spawn the pool's worker loop. Finished sub-tasks are reported on
    /// `done_tx`.
    pub fn spawn(
        workload: Arc<dyn Workload>,
        settings: ExecutorSettings,
        done_tx: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        tokio::spawn(run(workload, settings, submit_rx, done_tx));
        Self {
            submit_tx,
            next_handle: Arc::new(AtomicU64::new(1)),
        }
    }
}

/// Runs until the submission channel closes.
async fn run(
    workload: Arc<dyn Workload>,
    settings: ExecutorSettings,
    mut submit_rx: mpsc::UnboundedReceiver<Submission>,
    done_tx: mpsc::UnboundedSender<Completion>,
) {
    let max_tasks = if settings.max_concurrent_tasks == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    } else {
        settings.max_concurrent_tasks as usize
    };

    let semaphore = Arc::new(Semaphore::new(max_tasks));

    tracing::info!(max_concurrent = max_tasks, "executor pool started");

    while let Some(submission) = submit_rx.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => break, // semaphore closed
        };

        let workload = workload.clone();
        let done_tx = done_tx.clone();

        tokio::spawn(async move {
            let Submission { conn, handle, task } = submission;
            let guid = task.guid;
            let name = task.descriptor.name.clone();

            let start = Instant::now();
            let descriptor = task.descriptor;
            let ran = tokio::task::spawn_blocking(move || workload.run(&descriptor)).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            let result = match ran {
                Ok(Ok(value)) => value,
                Ok(Err(failure)) => failure.to_payload(),
                Err(join_err) => {
                    TaskFailure::new(codes::TASK_ERROR, format!("workload panicked: {join_err}"))
                        .to_payload()
                }
            };

            tracing::debug!(conn, handle, guid = %guid, name = %name, elapsed_ms, "sub-task finished");

            let _ = done_tx.send(Completion {
                conn,
                handle,
                result,
            });

            drop(permit);
        });
    }
}
