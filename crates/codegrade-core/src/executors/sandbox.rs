//! Lifecycle shared by both executors: working directory, environment
//! creation, bounded wait, log collection and unconditional teardown.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use crate::errors::EngineError;
use crate::models::PerformanceMetrics;
use crate::runtime::{ContainerLogs, ContainerRuntime, EnvironmentDescriptor};

const LOG_PREVIEW_CHARS: usize = 500;

pub(crate) fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

pub(crate) fn preview(text: &str) -> String {
    if text.chars().count() > LOG_PREVIEW_CHARS {
        let cut: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Creates a per-execution directory under `root`, world-writable so the
/// container user can write result files into it.
pub(crate) fn create_working_dir(root: &Path, prefix: &str) -> Result<TempDir, EngineError> {
    std::fs::create_dir_all(root)?;
    let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(root)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o777))?;
    }

    log::debug!("Created working directory {}", dir.path().display());
    Ok(dir)
}

/// Deletes the working directory, logging instead of failing.
pub(crate) fn remove_working_dir(dir: TempDir) {
    let path = dir.path().to_path_buf();
    if let Err(e) = dir.close() {
        log::warn!("Failed to delete working directory {}: {}", path.display(), e);
    }
}

/// Owns a created environment until it is torn down. If the owning future is
/// dropped before `teardown` runs, removal is handed to the runtime in the
/// background.
pub(crate) struct EnvironmentGuard {
    runtime: Arc<dyn ContainerRuntime>,
    id: String,
    released: bool,
}

impl EnvironmentGuard {
    pub(crate) fn new(runtime: Arc<dyn ContainerRuntime>, id: String) -> Self {
        Self {
            runtime,
            id,
            released: false,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    /// Hands ownership of the environment to the caller.
    pub(crate) fn disarm(mut self) -> String {
        self.released = true;
        std::mem::take(&mut self.id)
    }

    pub(crate) async fn teardown(mut self) {
        self.released = true;
        if let Err(e) = self.runtime.remove_container(&self.id).await {
            log::warn!("Failed to remove container {}: {}", self.id, e);
        }
    }
}

impl Drop for EnvironmentGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let runtime = self.runtime.clone();
        let id = std::mem::take(&mut self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = runtime.remove_container(&id).await {
                        log::warn!("Failed to remove abandoned container {}: {}", id, e);
                    }
                });
            }
            Err(_) => log::error!("Container {} leaked: no runtime available for removal", id),
        }
    }
}

/// How the wait for an environment ended.
#[derive(Debug)]
pub(crate) enum RunOutcome {
    Completed {
        exit_code: i64,
        logs: ContainerLogs,
        elapsed_ms: u64,
    },
    TimedOut {
        logs: ContainerLogs,
    },
}

/// Best-effort log collection; failures yield empty output.
pub(crate) async fn collect_logs(runtime: &dyn ContainerRuntime, id: &str) -> ContainerLogs {
    match runtime.collect_logs(id).await {
        Ok(logs) => {
            log::debug!("Container {} stdout: {}", id, preview(&logs.stdout));
            log::debug!("Container {} stderr: {}", id, preview(&logs.stderr));
            logs
        }
        Err(e) => {
            log::warn!("Failed to collect logs from {}: {}", id, e);
            ContainerLogs::default()
        }
    }
}

/// Runs one environment from image check to removal. The environment is
/// removed exactly once whatever happens after it was created.
pub(crate) async fn run_environment(
    runtime: &Arc<dyn ContainerRuntime>,
    descriptor: &EnvironmentDescriptor,
    deadline: Duration,
    metrics: &mut PerformanceMetrics,
) -> Result<RunOutcome, EngineError> {
    let startup = Instant::now();
    runtime.ensure_image(&descriptor.image).await?;
    let id = runtime.create_container(descriptor).await?;
    let guard = EnvironmentGuard::new(runtime.clone(), id);

    let outcome = drive(runtime.as_ref(), guard.id(), deadline, startup, metrics).await;

    let cleanup = Instant::now();
    guard.teardown().await;
    metrics.cleanup_ms += elapsed_ms(cleanup);
    outcome
}

async fn drive(
    runtime: &dyn ContainerRuntime,
    id: &str,
    deadline: Duration,
    startup: Instant,
    metrics: &mut PerformanceMetrics,
) -> Result<RunOutcome, EngineError> {
    let started = runtime.start_container(id).await;
    metrics.environment_startup_ms += elapsed_ms(startup);
    started?;

    let execution = Instant::now();
    let waited = tokio::time::timeout(deadline, runtime.wait_container(id)).await;
    let elapsed = elapsed_ms(execution);

    let outcome = match waited {
        Ok(Ok(exit_code)) => {
            let logs = collect_logs(runtime, id).await;
            Ok(RunOutcome::Completed {
                exit_code,
                logs,
                elapsed_ms: elapsed,
            })
        }
        Ok(Err(e)) => Err(EngineError::ExecutionFailure(e.to_string())),
        Err(_) => {
            log::warn!("Container {} exceeded its {} ms deadline", id, deadline.as_millis());
            let logs = collect_logs(runtime, id).await;
            Ok(RunOutcome::TimedOut { logs })
        }
    };
    metrics.execution_ms += elapsed_ms(execution);
    outcome
}
