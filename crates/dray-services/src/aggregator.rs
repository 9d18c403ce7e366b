//! Aggregator — correlates task completions back to sessions and replies.
//!
//! Completions may arrive in any order relative to submission, and may
//! outlive their session entirely (connection closed, request superseded).
//! An unroutable completion is an expected race, never a fault: it is
//! discarded at debug level and the executor's work is simply lost.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use serde_json::Value;

use dray_core::message::{ResponseMessage, TaskMode};
use dray_core::wire;

use crate::service::{ReplySink, TaskHandle};
use crate::session::{ConnId, SessionStore};

pub struct Aggregator {
    sessions: SessionStore,
    sink: Arc<dyn ReplySink>,
}

/// What one completion means for its session.
enum Outcome {
    /// The mode's completion condition is met; reply and clear.
    Terminal,
    /// More sub-tasks outstanding; keep waiting.
    Wait,
    /// An async-mode session holds no pending handles; whatever this is,
    /// clear it.
    Stale,
}

impl Aggregator {
    pub fn new(sessions: SessionStore, sink: Arc<dyn ReplySink>) -> Self {
        Self { sessions, sink }
    }

    /// Handle one completion event from the executor pool.
    pub fn on_task_complete(&self, conn: ConnId, handle: TaskHandle, result: Value) {
        if result.is_null() {
            // A completion with no result means the bookkeeping for this
            // connection can't be trusted any more. Drop whatever is open.
            self.sessions.remove(&conn);
            return;
        }

        // Mutation, the terminal decision, and removal all happen inside one
        // shard-lock critical section, so a racing new request on the same
        // connection cannot be clobbered by a stale removal.
        let reply = match self.sessions.entry(conn) {
            Entry::Vacant(_) => {
                tracing::debug!(conn, handle, "completion with no session, discarding");
                return;
            }
            Entry::Occupied(mut occupied) => {
                let outcome = {
                    let session = occupied.get_mut();
                    let Some(key) = session.pending.remove(&handle) else {
                        // Duplicate, or a handle from a superseded request.
                        tracing::debug!(conn, handle, "unexpected completion handle, discarding");
                        return;
                    };
                    session.results.insert(key, result);

                    match session.mode {
                        TaskMode::SyncSingle => Outcome::Terminal,
                        TaskMode::SyncMulti if session.pending.is_empty() => Outcome::Terminal,
                        TaskMode::SyncMulti => Outcome::Wait,
                        TaskMode::AsyncSingle | TaskMode::AsyncMulti => Outcome::Stale,
                    }
                };

                match outcome {
                    Outcome::Wait => return,
                    Outcome::Stale => {
                        occupied.remove();
                        return;
                    }
                    Outcome::Terminal => {
                        let session = occupied.remove();
                        let guid = session.request.guid;
                        let data = match session.mode {
                            // Exactly one sub-task ever existed; its result
                            // is the reply payload.
                            TaskMode::SyncSingle => {
                                session.results.into_values().next().unwrap_or(Value::Null)
                            }
                            // The full key → result map.
                            _ => Value::Object(session.results.into_iter().collect()),
                        };
                        ResponseMessage::ok(data).with_guid(guid)
                    }
                }
            }
        };

        tracing::debug!(conn, handle, "session complete, replying");
        self.reply(conn, reply);
    }

    fn reply(&self, conn: ConnId, msg: ResponseMessage) {
        match wire::encode_response(&msg) {
            Ok(frame) => self.sink.send(conn, frame),
            Err(e) => tracing::warn!(conn, error = %e, "failed to encode reply"),
        }
    }
}
