//! drayd — task-offload RPC daemon.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use dray_core::config::DrayConfig;
use dray_services::{
    new_session_store, Aggregator, Dispatcher, ExecutorPool, ReplySink, TaskPool,
};

mod status;
mod transport;
mod workloads;

use transport::{ConnTable, Listener};
use workloads::WorkloadRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = DrayConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = DrayConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        DrayConfig::default()
    });

    tracing::info!(
        port = config.network.port,
        api_port = config.network.api_port,
        "drayd starting"
    );

    // Shared state
    let sessions = new_session_store();
    let conns = ConnTable::new();
    let sink: Arc<dyn ReplySink> = Arc::new(conns.clone());

    // Workloads
    let registry = WorkloadRegistry::from_config(&config);
    let workload_names = registry.names();
    tracing::info!(workloads = ?workload_names, "workloads enabled");

    // Executor pool and its completion channel
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let pool = ExecutorPool::spawn(Arc::new(registry), config.executor.clone(), done_tx);
    let pool: Arc<dyn TaskPool> = Arc::new(pool);

    let dispatcher = Arc::new(Dispatcher::new(sessions.clone(), pool, sink.clone()));
    let aggregator = Aggregator::new(sessions.clone(), sink);

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    // One consumer serializes all completions through the aggregator.
    let aggregate_task = tokio::spawn(async move {
        while let Some(completion) = done_rx.recv().await {
            aggregator.on_task_complete(completion.conn, completion.handle, completion.result);
        }
    });

    let rpc_socket = TcpListener::bind((config.network.listen_addr.as_str(), config.network.port))
        .await
        .context("failed to bind rpc listener")?;

    let listener_task = tokio::spawn(
        Listener::new(
            rpc_socket,
            config.max_frame_bytes(),
            conns.clone(),
            sessions.clone(),
            dispatcher,
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    // Status HTTP endpoint
    let status_task = {
        let state = status::StatusState {
            sessions: sessions.clone(),
            conns: conns.clone(),
            workloads: workload_names,
            started_at: Instant::now(),
        };
        let api_port = config.network.api_port;
        tokio::spawn(async move {
            if let Err(e) = status::serve(state, api_port).await {
                tracing::error!(error = %e, "status server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = aggregate_task     => tracing::error!("aggregator task exited: {:?}", r),
        r = listener_task      => tracing::error!("rpc listener exited: {:?}", r),
        r = status_task        => tracing::error!("status server exited: {:?}", r),
    }

    Ok(())
}
