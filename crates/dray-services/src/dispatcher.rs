//! Dispatcher — turns one inbound frame into sub-task submissions.
//!
//! `on_message` is the whole inbound path: decode, validate, open the
//! session, fan the work out per the request's completion mode. Protocol
//! errors are always answered on the same connection; only orphaned
//! completions (handled by the aggregator) go unanswered.

use std::sync::Arc;

use dray_core::message::{RequestMessage, ResponseMessage, TaskDescriptor, TaskMode, SINGLE_KEY};
use dray_core::wire::{self, codes};

use crate::service::{ReplySink, SubTask, TaskPool};
use crate::session::{ConnId, Session, SessionStore};

pub struct Dispatcher {
    sessions: SessionStore,
    pool: Arc<dyn TaskPool>,
    sink: Arc<dyn ReplySink>,
}

impl Dispatcher {
    pub fn new(sessions: SessionStore, pool: Arc<dyn TaskPool>, sink: Arc<dyn ReplySink>) -> Self {
        Self {
            sessions,
            pool,
            sink,
        }
    }

    /// Handle one complete envelope received on `conn`.
    pub fn on_message(&self, conn: ConnId, raw: &[u8]) {
        let req = match wire::decode_request(raw) {
            Ok(req) => req,
            Err(e) => {
                tracing::debug!(conn, error = %e, "rejecting undecodable frame");
                self.reply(conn, ResponseMessage::status(e.status_code(), e.to_string()));
                return;
            }
        };

        if req.api.is_empty() {
            self.reply(
                conn,
                ResponseMessage::status(codes::API_MISSING, "param api is empty"),
            );
            return;
        }

        let mode = match TaskMode::try_from(req.mode.as_str()) {
            Ok(mode) => mode,
            Err(e) => {
                // An invalid request still supersedes whatever was open.
                self.sessions.remove(&conn);
                self.reply(conn, ResponseMessage::status(codes::UNKNOWN_TYPE, e.to_string()));
                return;
            }
        };

        tracing::debug!(conn, guid = %req.guid, tag = %req.mode, "request accepted");

        if mode.is_sync() {
            self.dispatch_sync(conn, req, mode);
        } else {
            self.dispatch_async(conn, req, mode);
        }
    }

    /// SYNC modes: open (or replace) the session, submit every sub-task,
    /// and record its handle. No reply until the aggregator sees the last
    /// completion.
    ///
    /// Submission and bookkeeping happen under the session's shard-lock
    /// guard, so a completion can never observe a submitted-but-unrecorded
    /// handle.
    fn dispatch_sync(&self, conn: ConnId, req: RequestMessage, mode: TaskMode) {
        let guid = req.guid.clone();
        let entries = sub_tasks(&req, mode);

        let mut session = self.sessions.entry(conn).insert(Session::new(req, mode));
        for (key, descriptor) in entries {
            let handle = self.pool.submit(
                conn,
                SubTask {
                    guid: guid.clone(),
                    descriptor,
                },
            );
            session.pending.insert(handle, key);
        }
    }

    /// ASYNC modes: submit every sub-task, acknowledge receipt immediately,
    /// and keep no bookkeeping — the caller expects no second reply, so
    /// completions for these sub-tasks are unroutable by design.
    fn dispatch_async(&self, conn: ConnId, req: RequestMessage, mode: TaskMode) {
        for (_, descriptor) in sub_tasks(&req, mode) {
            self.pool.submit(
                conn,
                SubTask {
                    guid: req.guid.clone(),
                    descriptor,
                },
            );
        }

        // Also clears any session this request superseded.
        self.sessions.remove(&conn);
        self.reply(
            conn,
            ResponseMessage::status(codes::ACCEPTED, "task accepted").with_guid(req.guid),
        );
    }

    fn reply(&self, conn: ConnId, msg: ResponseMessage) {
        match wire::encode_response(&msg) {
            Ok(frame) => self.sink.send(conn, frame),
            Err(e) => tracing::warn!(conn, error = %e, "failed to encode reply"),
        }
    }
}

/// The sub-tasks a request spawns. SINGLE modes run exactly one — the
/// request's primary descriptor under the synthetic key — no matter how the
/// `api` field was shaped; MULTI modes run one per key.
fn sub_tasks(req: &RequestMessage, mode: TaskMode) -> Vec<(String, TaskDescriptor)> {
    match mode {
        TaskMode::SyncSingle | TaskMode::AsyncSingle => req
            .api
            .primary()
            .map(|task| vec![(SINGLE_KEY.to_string(), task.clone())])
            .unwrap_or_default(),
        TaskMode::SyncMulti | TaskMode::AsyncMulti => req.api.entries(),
    }
}
