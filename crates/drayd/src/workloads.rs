//! Built-in workloads — the demo capabilities shipped with the daemon.
//!
//! The registry routes on the descriptor's `name`; embedders replace or
//! extend it by constructing their own registry before spawning the
//! executor pool.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use dray_core::config::DrayConfig;
use dray_core::message::TaskDescriptor;
use dray_core::wire::codes;
use dray_services::{TaskFailure, Workload};

/// Routes descriptors by name to registered workloads.
/// Unknown names fail with a task-level error.
#[derive(Default)]
pub struct WorkloadRegistry {
    inner: HashMap<String, Arc<dyn Workload>>,
}

impl WorkloadRegistry {
    pub fn register(&mut self, name: impl Into<String>, workload: Arc<dyn Workload>) {
        self.inner.insert(name.into(), workload);
    }

    /// Registered workload names, for the status endpoint.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the registry the config enables.
    pub fn from_config(config: &DrayConfig) -> Self {
        let mut registry = Self::default();
        if config.workloads.echo {
            registry.register("echo", Arc::new(EchoWorkload));
        }
        if config.workloads.shell {
            registry.register(
                "shell",
                Arc::new(ShellWorkload {
                    work_dir: config.executor.work_dir.clone(),
                }),
            );
        }
        registry
    }
}

impl Workload for WorkloadRegistry {
    fn run(&self, task: &TaskDescriptor) -> Result<Value, TaskFailure> {
        match self.inner.get(&task.name) {
            Some(workload) => workload.run(task),
            None => Err(TaskFailure::new(
                codes::TASK_ERROR,
                format!("no workload registered for '{}'", task.name),
            )),
        }
    }
}

// ── echo ──────────────────────────────────────────────────────────────────────

/// Returns its parameters unchanged. Useful for smoke tests and latency
/// measurements.
struct EchoWorkload;

impl Workload for EchoWorkload {
    fn run(&self, task: &TaskDescriptor) -> Result<Value, TaskFailure> {
        Ok(task.params.clone())
    }
}

// ── shell ─────────────────────────────────────────────────────────────────────

/// Runs `{"cmd": "...", "args": ["..."]}` as a subprocess in the executor
/// work dir. Disabled by default; enable via `[workloads] shell = true`.
struct ShellWorkload {
    work_dir: PathBuf,
}

impl Workload for ShellWorkload {
    fn run(&self, task: &TaskDescriptor) -> Result<Value, TaskFailure> {
        let cmd = task
            .params
            .get("cmd")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TaskFailure::new(codes::TASK_ERROR, "params missing \"cmd\" string"))?;

        let args: Vec<&str> = task
            .params
            .get("args")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let _ = std::fs::create_dir_all(&self.work_dir);

        let output = std::process::Command::new(cmd)
            .args(&args)
            .current_dir(&self.work_dir)
            .output()
            .map_err(|e| {
                TaskFailure::new(codes::TASK_ERROR, format!("failed to spawn '{}': {}", cmd, e))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            Ok(serde_json::json!({
                "exit_code": 0,
                "stdout": stdout,
                "stderr": stderr,
            }))
        } else {
            let code = output.status.code().unwrap_or(-1);
            Err(TaskFailure::new(
                codes::TASK_ERROR,
                format!(
                    "exit code {}: {}",
                    code,
                    if stderr.is_empty() { &stdout } else { &stderr }
                ),
            ))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
