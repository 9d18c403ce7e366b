//! Session store — per-connection bookkeeping for one in-flight request.
//!
//! Concurrency contract: all access to a given connection's session goes
//! through the map's per-shard locks, and callers do their mutations under a
//! single `entry`/`get_mut` guard. That serializes the dispatcher's
//! pending-task writes against the aggregator's completions for the same
//! connection; different connections never contend beyond shard granularity.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde_json::Value;

use dray_core::message::{RequestMessage, TaskMode};

use crate::service::TaskHandle;

/// Connection identifier assigned by the transport. Monotonic per daemon,
/// never reused while the daemon runs.
pub type ConnId = u64;

/// State for the one open request on a connection.
///
/// Lives from the moment a valid sync request is accepted until its terminal
/// reply is sent, the connection closes, or a newer request replaces it.
#[derive(Debug)]
pub struct Session {
    /// The request that opened this session.
    pub request: RequestMessage,
    /// Parsed completion mode of `request`.
    pub mode: TaskMode,
    /// Submission handle → sub-task key, for sub-tasks not yet completed.
    pub pending: HashMap<TaskHandle, String>,
    /// Sub-task key → result, accumulated as completions arrive.
    pub results: BTreeMap<String, Value>,
    /// When the session was opened.
    pub opened_at: Instant,
}

impl Session {
    pub fn new(request: RequestMessage, mode: TaskMode) -> Self {
        Self {
            request,
            mode,
            pending: HashMap::new(),
            results: BTreeMap::new(),
            opened_at: Instant::now(),
        }
    }
}

/// The session store — shared across the dispatcher, aggregator, and
/// transport close handler.
pub type SessionStore = Arc<DashMap<ConnId, Session>>;

/// Create a new empty session store.
pub fn new_session_store() -> SessionStore {
    Arc::new(DashMap::new())
}
