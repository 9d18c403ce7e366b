//! Message schema for the dray RPC protocol.
//!
//! Requests travel client → daemon, responses daemon → client, both inside
//! the envelope defined in [`crate::wire`]. The `type` tag stays a raw
//! string on the wire and is parsed with [`TaskMode::try_from`] so an
//! unrecognized tag is a protocol-level error the daemon can answer, not a
//! deserialization failure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Completion modes ──────────────────────────────────────────────────────────

/// Completion mode — cardinality (single/multi) crossed with reply timing
/// (sync/async).
///
/// Sync requests get one reply once every sub-task has completed. Async
/// requests get an immediate receipt acknowledgement and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    /// One sub-task; reply carries its result.
    SyncSingle,
    /// One sub-task; reply acknowledges receipt only.
    AsyncSingle,
    /// A keyed set of sub-tasks; reply carries the full result map.
    SyncMulti,
    /// A keyed set of sub-tasks; reply acknowledges receipt only.
    AsyncMulti,
}

impl TaskMode {
    /// The wire tag for this mode.
    pub fn tag(&self) -> &'static str {
        match self {
            TaskMode::SyncSingle => "SSS",
            TaskMode::AsyncSingle => "SRS",
            TaskMode::SyncMulti => "SSM",
            TaskMode::AsyncMulti => "SRM",
        }
    }

    /// True for the modes that defer their reply until completion.
    pub fn is_sync(&self) -> bool {
        matches!(self, TaskMode::SyncSingle | TaskMode::SyncMulti)
    }
}

impl TryFrom<&str> for TaskMode {
    type Error = UnknownMode;

    fn try_from(tag: &str) -> Result<Self, Self::Error> {
        match tag {
            "SSS" => Ok(TaskMode::SyncSingle),
            "SRS" => Ok(TaskMode::AsyncSingle),
            "SSM" => Ok(TaskMode::SyncMulti),
            "SRM" => Ok(TaskMode::AsyncMulti),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// The request's `type` tag named none of the four completion modes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task type {0:?}")]
pub struct UnknownMode(pub String);

// ── Request ───────────────────────────────────────────────────────────────────

/// One inbound request.
///
/// Every field is defaulted so a structurally valid but incomplete request
/// still decodes; the dispatcher then answers a missing `api` or an unknown
/// `type` with its specific status code instead of a generic decode error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    /// Raw completion-mode tag. Parse with [`TaskMode::try_from`].
    #[serde(rename = "type", default)]
    pub mode: String,
    /// Opaque caller-chosen correlation token, echoed in replies.
    #[serde(default)]
    pub guid: String,
    /// What to run: one descriptor, or a keyed map of them.
    #[serde(default)]
    pub api: Api,
}

/// A task descriptor names a workload and carries its parameters verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Workload name the executor routes on.
    pub name: String,
    /// Opaque parameters passed through to the workload. Structure is
    /// defined by the workload, not the protocol.
    #[serde(default)]
    pub params: Value,
}

/// The `api` field of a request.
///
/// Map keys are the sub-task keys results are reported under. Iteration
/// order of the map (sorted keys) is the MULTI submission order; completion
/// order is whatever the executor pool produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Api {
    /// Exactly one task.
    One(TaskDescriptor),
    /// Sub-task key → descriptor.
    Many(BTreeMap<String, TaskDescriptor>),
}

impl Api {
    /// True when there is nothing to run.
    pub fn is_empty(&self) -> bool {
        match self {
            Api::One(_) => false,
            Api::Many(map) => map.is_empty(),
        }
    }

    /// The descriptor a single-task request runs: the bare descriptor, or
    /// the first entry of a map that arrived under a SINGLE mode.
    pub fn primary(&self) -> Option<&TaskDescriptor> {
        match self {
            Api::One(task) => Some(task),
            Api::Many(map) => map.values().next(),
        }
    }

    /// All (key, descriptor) pairs in submission order. A bare descriptor
    /// gets the synthetic key [`SINGLE_KEY`].
    pub fn entries(&self) -> Vec<(String, TaskDescriptor)> {
        match self {
            Api::One(task) => vec![(SINGLE_KEY.to_string(), task.clone())],
            Api::Many(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

impl Default for Api {
    /// An empty map: the shape an absent `api` field takes, rejected by the
    /// dispatcher as "api missing".
    fn default() -> Self {
        Api::Many(BTreeMap::new())
    }
}

/// Synthetic sub-task key used when a request carries one bare descriptor.
pub const SINGLE_KEY: &str = "one";

// ── Response ──────────────────────────────────────────────────────────────────

/// One outbound reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Status code. `0` is success; see [`crate::wire::codes`].
    pub code: u32,
    /// Human-readable status text.
    pub msg: String,
    /// Result payload. Null when the reply carries only a status.
    #[serde(default)]
    pub data: Value,
    /// The originating request's correlation token, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
}

impl ResponseMessage {
    /// A status-only reply with no payload.
    pub fn status(code: u32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: Value::Null,
            guid: None,
        }
    }

    /// A success reply carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            code: crate::wire::codes::OK,
            msg: "OK".to_string(),
            data,
            guid: None,
        }
    }

    /// Attach the originating request's correlation token.
    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = Some(guid.into());
        self
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
