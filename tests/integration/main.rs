//! Dray integration test harness.
//!
//! Drives the dispatcher and aggregator through their public seams: a
//! manual task pool that records submissions without executing anything,
//! and a recording sink that decodes every reply. Tests complete sub-tasks
//! by invoking the aggregator directly, which is exactly what the daemon's
//! completion loop does.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use dray_core::message::{Api, RequestMessage, ResponseMessage, TaskDescriptor};
use dray_core::wire;
use dray_services::{
    new_session_store, Aggregator, ConnId, Dispatcher, ReplySink, SessionStore, SubTask,
    TaskHandle, TaskPool,
};

mod dispatch;
mod pipeline;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Records submissions; executes nothing.
#[derive(Default)]
pub struct ManualPool {
    next: AtomicU64,
    submitted: Mutex<Vec<(ConnId, TaskHandle, SubTask)>>,
}

impl ManualPool {
    /// Handles allocated for `conn`, in submission order.
    pub fn handles(&self, conn: ConnId) -> Vec<TaskHandle> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _, _)| *c == conn)
            .map(|(_, h, _)| *h)
            .collect()
    }

    pub fn submission_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

impl TaskPool for ManualPool {
    fn submit(&self, conn: ConnId, task: SubTask) -> TaskHandle {
        let handle = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        self.submitted.lock().unwrap().push((conn, handle, task));
        handle
    }
}

/// Decodes and stores every reply the core sends.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(ConnId, ResponseMessage)>>,
}

impl RecordingSink {
    /// Replies sent to `conn`, in send order.
    pub fn replies(&self, conn: ConnId) -> Vec<ResponseMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == conn)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl ReplySink for RecordingSink {
    fn send(&self, conn: ConnId, frame: Bytes) {
        let msg = wire::decode_response(&frame).expect("sink received an invalid frame");
        self.sent.lock().unwrap().push((conn, msg));
    }
}

pub struct Rig {
    pub dispatcher: Dispatcher,
    pub aggregator: Aggregator,
    pub sessions: SessionStore,
    pub pool: Arc<ManualPool>,
    pub sink: Arc<RecordingSink>,
}

pub fn rig() -> Rig {
    let sessions = new_session_store();
    let pool = Arc::new(ManualPool::default());
    let sink = Arc::new(RecordingSink::default());
    Rig {
        dispatcher: Dispatcher::new(sessions.clone(), pool.clone(), sink.clone()),
        aggregator: Aggregator::new(sessions.clone(), sink.clone()),
        sessions,
        pool,
        sink,
    }
}

// ── Request builders ──────────────────────────────────────────────────────────

pub fn frame(mode: &str, guid: &str, api: Api) -> Vec<u8> {
    let req = RequestMessage {
        mode: mode.to_string(),
        guid: guid.to_string(),
        api,
    };
    wire::encode_request(&req)
        .expect("request must encode")
        .to_vec()
}

pub fn one(name: &str, params: serde_json::Value) -> Api {
    Api::One(TaskDescriptor {
        name: name.to_string(),
        params,
    })
}

pub fn many(entries: &[(&str, serde_json::Value)]) -> Api {
    let map: BTreeMap<String, TaskDescriptor> = entries
        .iter()
        .map(|(key, params)| {
            (
                key.to_string(),
                TaskDescriptor {
                    name: "echo".to_string(),
                    params: params.clone(),
                },
            )
        })
        .collect();
    Api::Many(map)
}
