//! Collaborator seams — task submission, reply delivery, and the workload
//! capability.
//!
//! Intentionally minimal. The dispatcher and aggregator see the executor
//! pool and the transport only through these traits, so tests and embedders
//! can swap either side out.

use bytes::Bytes;
use serde_json::Value;

use dray_core::message::TaskDescriptor;

use crate::session::ConnId;

/// Sub-task submission handle. Allocated by the pool, unique for the life
/// of the daemon; the aggregator correlates completions back to sessions
/// with it.
pub type TaskHandle = u64;

/// One unit of work handed to the executor pool.
#[derive(Debug, Clone)]
pub struct SubTask {
    /// Correlation token of the owning request. Carried for logging; the
    /// pool does not route on it.
    pub guid: String,
    /// What to run.
    pub descriptor: TaskDescriptor,
}

/// Submission seam implemented by the executor pool.
pub trait TaskPool: Send + Sync {
    /// Enqueue a sub-task. Must not block: the completion arrives later as
    /// an independent event, in whatever order tasks finish.
    fn submit(&self, conn: ConnId, task: SubTask) -> TaskHandle;
}

/// Reply-delivery seam implemented by the transport.
pub trait ReplySink: Send + Sync {
    /// Queue one encoded frame for delivery to a connection. Frames for
    /// connections that have already closed are silently dropped.
    fn send(&self, conn: ConnId, frame: Bytes);
}

/// The pluggable capability a sub-task executes.
///
/// Implementations are supplied by the embedding application; the core has
/// no opinion about what a task computes. `run` is called on the blocking
/// pool and may do synchronous I/O.
pub trait Workload: Send + Sync {
    fn run(&self, task: &TaskDescriptor) -> Result<Value, TaskFailure>;
}

/// Typed failure raised by a workload.
///
/// A failure does not abort aggregation: the executor converts it into an
/// error-shaped payload delivered to the caller as that sub-task's result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TaskFailure {
    /// Caller-visible status code, at or above `wire::codes::TASK_ERROR`.
    pub code: u32,
    pub message: String,
}

impl TaskFailure {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The error-shaped result payload this failure is delivered as.
    pub fn to_payload(&self) -> Value {
        serde_json::json!({
            "code": self.code,
            "msg": self.message,
            "data": Value::Null,
        })
    }
}
