//! dray-services — session store, dispatcher, aggregator, and executor pool.
//!
//! Everything here is transport-agnostic: the daemon injects a [`ReplySink`]
//! and consumes [`Completion`] events; nothing in this crate performs
//! network I/O.

pub mod aggregator;
pub mod dispatcher;
pub mod executor;
pub mod service;
pub mod session;

pub use aggregator::Aggregator;
pub use dispatcher::Dispatcher;
pub use executor::{Completion, ExecutorPool};
pub use service::{ReplySink, SubTask, TaskFailure, TaskHandle, TaskPool, Workload};
pub use session::{new_session_store, ConnId, Session, SessionStore};
