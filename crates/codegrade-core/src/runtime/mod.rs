//! Container platform abstraction.
//!
//! Executors and the pool only talk to a `ContainerRuntime`. Production wires
//! in [`docker::DockerRuntime`]; tests substitute an in-memory runtime.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::errors::RuntimeError;

pub mod docker;

pub use docker::DockerRuntime;

/// Everything needed to create one isolated environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDescriptor {
    pub image: String,
    pub name: String,
    pub memory_limit_mb: u64,
    /// CPU quota in units of 1e-9 CPUs.
    pub nano_cpus: Option<i64>,
    pub host_dir: PathBuf,
    pub mount_point: String,
    pub working_dir: String,
    pub command: Vec<String>,
    pub user: Option<String>,
}

impl EnvironmentDescriptor {
    pub fn memory_bytes(&self) -> i64 {
        i64::try_from(self.memory_limit_mb)
            .unwrap_or(i64::MAX)
            .saturating_mul(1024 * 1024)
    }

    /// Bind specification in `host:container` form.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host_dir.display(), self.mount_point)
    }
}

/// Builds the usual `sh -c <script>` entry command.
pub fn shell_command(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerLogs {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Make sure `image` is present locally, pulling it if needed.
    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Create (but do not start) a container; returns its id.
    async fn create_container(&self, descriptor: &EnvironmentDescriptor) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Block until the container exits and return its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError>;

    async fn collect_logs(&self, id: &str) -> Result<ContainerLogs, RuntimeError>;

    /// Run `command` inside a running container.
    async fn exec(
        &self,
        id: &str,
        command: &[String],
        working_dir: Option<&str>,
    ) -> Result<ExecOutput, RuntimeError>;

    /// Force-remove the container.
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;
}
