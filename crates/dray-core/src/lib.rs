//! dray-core — wire format, message schema, and configuration.
//! All other dray crates depend on this one.

pub mod config;
pub mod message;
pub mod wire;

pub use message::{Api, RequestMessage, ResponseMessage, TaskDescriptor, TaskMode};
