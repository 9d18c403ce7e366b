//! Full-pipeline scenarios: real executor pool feeding the aggregator's
//! completion loop, the same wiring the daemon uses minus the TCP layer.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use dray_core::config::ExecutorSettings;
use dray_core::message::{Api, ResponseMessage, TaskDescriptor};
use dray_core::wire::codes;
use dray_services::{
    new_session_store, Aggregator, ConnId, Dispatcher, ExecutorPool, SessionStore, TaskFailure,
    TaskPool, Workload,
};

use crate::{frame, many, one, RecordingSink};

/// Echoes params back; descriptors named "fail" raise a typed failure.
struct Echo;

impl Workload for Echo {
    fn run(&self, task: &TaskDescriptor) -> Result<Value, TaskFailure> {
        if task.name == "fail" {
            Err(TaskFailure::new(codes::TASK_ERROR, "boom"))
        } else {
            Ok(task.params.clone())
        }
    }
}

fn pipeline() -> (Dispatcher, Arc<RecordingSink>, SessionStore) {
    let sessions = new_session_store();
    let sink = Arc::new(RecordingSink::default());

    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    let pool = ExecutorPool::spawn(Arc::new(Echo), ExecutorSettings::default(), done_tx);
    let pool: Arc<dyn TaskPool> = Arc::new(pool);

    let dispatcher = Dispatcher::new(sessions.clone(), pool, sink.clone());
    let aggregator = Aggregator::new(sessions.clone(), sink.clone());
    tokio::spawn(async move {
        while let Some(c) = done_rx.recv().await {
            aggregator.on_task_complete(c.conn, c.handle, c.result);
        }
    });

    (dispatcher, sink, sessions)
}

async fn wait_for_replies(sink: &RecordingSink, conn: ConnId, n: usize) -> Vec<ResponseMessage> {
    for _ in 0..500 {
        let replies = sink.replies(conn);
        if replies.len() >= n {
            return replies;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {n} replies on conn {conn}");
}

#[tokio::test]
async fn multi_sync_echo_flows_end_to_end() {
    let (dispatcher, sink, sessions) = pipeline();

    dispatcher.on_message(
        1,
        &frame("SSM", "g1", many(&[("a", json!(1)), ("b", json!(2))])),
    );

    let replies = wait_for_replies(&sink, 1, 1).await;
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].code, codes::OK);
    assert_eq!(replies[0].data, json!({ "a": 1, "b": 2 }));
    assert_eq!(replies[0].guid.as_deref(), Some("g1"));
    assert!(!sessions.contains_key(&1));
}

#[tokio::test]
async fn failed_sub_task_is_delivered_as_its_result() {
    let (dispatcher, sink, _sessions) = pipeline();

    let mut api = BTreeMap::new();
    api.insert(
        "bad".to_string(),
        TaskDescriptor {
            name: "fail".to_string(),
            params: Value::Null,
        },
    );
    api.insert(
        "good".to_string(),
        TaskDescriptor {
            name: "echo".to_string(),
            params: json!("fine"),
        },
    );
    dispatcher.on_message(1, &frame("SSM", "g1", Api::Many(api)));

    let replies = wait_for_replies(&sink, 1, 1).await;
    assert_eq!(replies[0].code, codes::OK, "aggregation itself succeeds");
    assert_eq!(replies[0].data["good"], "fine");
    assert_eq!(replies[0].data["bad"]["code"], codes::TASK_ERROR);
    assert_eq!(replies[0].data["bad"]["msg"], "boom");
}

#[tokio::test]
async fn async_single_acks_before_the_task_runs() {
    let (dispatcher, sink, sessions) = pipeline();

    dispatcher.on_message(1, &frame("SRS", "g1", one("echo", json!("x"))));

    let replies = wait_for_replies(&sink, 1, 1).await;
    assert_eq!(replies[0].code, codes::ACCEPTED);
    assert!(!sessions.contains_key(&1));

    // Give the sub-task time to finish; its completion must stay silent.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.replies(1).len(), 1);
}
