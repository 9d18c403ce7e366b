//! Dray wire format — the length-prefixed envelope every message travels in.
//!
//! This module IS the protocol. One envelope is a 4-byte unsigned big-endian
//! length followed by exactly that many bytes of JSON payload. The status
//! codes below are part of the wire contract; changing any value after
//! clients exist is a breaking change.

use bytes::{BufMut, Bytes, BytesMut};

use crate::message::{RequestMessage, ResponseMessage};

/// Size of the length prefix in bytes.
pub const LEN_PREFIX: usize = 4;

/// Maximum payload the daemon accepts: 2 MiB.
/// The transport drops the connection on a larger declared length rather
/// than buffering it.
pub const MAX_PAYLOAD: usize = 2 * 1024 * 1024;

/// Reserved status codes.
///
/// `0` is success. Everything in the 100000 range is a protocol-level
/// status; workloads report their own failures at or above [`codes::TASK_ERROR`].
pub mod codes {
    /// Success.
    pub const OK: u32 = 0;
    /// Async request accepted. The receipt acknowledgement is the only reply.
    pub const ACCEPTED: u32 = 100_001;
    /// The request's `type` tag is not a known completion mode.
    pub const UNKNOWN_TYPE: u32 = 100_002;
    /// The request carries no usable `api` field.
    pub const API_MISSING: u32 = 100_003;
    /// Declared envelope length does not match the payload byte count.
    pub const BAD_FRAME: u32 = 100_007;
    /// Envelope payload is not a decodable message.
    pub const BAD_PAYLOAD: u32 = 100_008;
    /// Start of the range reserved for task-level failures.
    /// Workloads supply their own codes at or above this value.
    pub const TASK_ERROR: u32 = 100_100;
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when framing or unframing an envelope.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("declared length {declared} does not match payload length {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("frame shorter than the {LEN_PREFIX}-byte length prefix")]
    Truncated,

    #[error("payload is not a decodable message: {0}")]
    Payload(#[from] serde_json::Error),
}

impl WireError {
    /// The reserved status code reported to the peer for this error.
    pub fn status_code(&self) -> u32 {
        match self {
            WireError::LengthMismatch { .. } | WireError::Truncated => codes::BAD_FRAME,
            WireError::Payload(_) => codes::BAD_PAYLOAD,
        }
    }
}

// ── Encode ────────────────────────────────────────────────────────────────────

fn frame(body: Vec<u8>) -> Bytes {
    let mut out = BytesMut::with_capacity(LEN_PREFIX + body.len());
    out.put_u32(body.len() as u32);
    out.put_slice(&body);
    out.freeze()
}

/// Serialize a response and prefix it with its 4-byte big-endian length.
pub fn encode_response(msg: &ResponseMessage) -> Result<Bytes, WireError> {
    Ok(frame(serde_json::to_vec(msg)?))
}

/// Serialize a request the same way. Used by clients and tests.
pub fn encode_request(msg: &RequestMessage) -> Result<Bytes, WireError> {
    Ok(frame(serde_json::to_vec(msg)?))
}

// ── Decode ────────────────────────────────────────────────────────────────────

/// Strip and verify the length prefix, returning the payload bytes.
fn payload(raw: &[u8]) -> Result<&[u8], WireError> {
    if raw.len() < LEN_PREFIX {
        return Err(WireError::Truncated);
    }
    let declared = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    let body = &raw[LEN_PREFIX..];
    if declared != body.len() {
        return Err(WireError::LengthMismatch {
            declared,
            actual: body.len(),
        });
    }
    Ok(body)
}

/// Decode one complete inbound envelope into a request.
pub fn decode_request(raw: &[u8]) -> Result<RequestMessage, WireError> {
    Ok(serde_json::from_slice(payload(raw)?)?)
}

/// Decode one complete envelope into a response. The client-side mirror of
/// [`decode_request`].
pub fn decode_response(raw: &[u8]) -> Result<ResponseMessage, WireError> {
    Ok(serde_json::from_slice(payload(raw)?)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
