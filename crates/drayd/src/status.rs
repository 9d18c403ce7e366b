//! HTTP status endpoint — exposes daemon state as JSON.

use std::time::Instant;

use axum::routing::get;
use axum::{extract::State, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;

use dray_services::SessionStore;

use crate::transport::ConnTable;

#[derive(Clone)]
pub struct StatusState {
    pub sessions: SessionStore,
    pub conns: ConnTable,
    pub workloads: Vec<String>,
    pub started_at: Instant,
}

// ── /status ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub connections: usize,
    pub open_sessions: usize,
    pub workloads: Vec<String>,
    pub uptime_secs: u64,
}

async fn handle_status(State(state): State<StatusState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        connections: state.conns.len(),
        open_sessions: state.sessions.len(),
        workloads: state.workloads.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

// ── /sessions ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionInfo>,
}

#[derive(Serialize)]
pub struct SessionInfo {
    pub conn: u64,
    pub guid: String,
    pub mode: String,
    pub pending: usize,
    pub completed: usize,
    pub open_secs: u64,
}

async fn handle_sessions(State(state): State<StatusState>) -> Json<SessionsResponse> {
    let sessions = state
        .sessions
        .iter()
        .map(|e| {
            let s = e.value();
            SessionInfo {
                conn: *e.key(),
                guid: s.request.guid.clone(),
                mode: s.mode.tag().to_string(),
                pending: s.pending.len(),
                completed: s.results.len(),
                open_secs: s.opened_at.elapsed().as_secs(),
            }
        })
        .collect();

    Json(SessionsResponse { sessions })
}

// ── Router ────────────────────────────────────────────────────────────────────

pub async fn serve(state: StatusState, port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/status", get(handle_status))
        .route("/sessions", get(handle_sessions))
        .with_state(state);

    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "status endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}
