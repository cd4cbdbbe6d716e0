//! In-memory container runtime for unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::errors::RuntimeError;
use crate::runtime::{ContainerLogs, ContainerRuntime, EnvironmentDescriptor, ExecOutput};

#[derive(Default)]
struct State {
    next_id: usize,
    descriptors: Vec<EnvironmentDescriptor>,
    host_dirs: HashMap<String, PathBuf>,
    created: Vec<String>,
    removed: Vec<String>,
    exec_calls: Vec<(String, Vec<String>)>,
    staged: HashMap<String, String>,
}

/// Records every call and replays scripted behaviour. Failure switches apply
/// to every call of the matching operation.
#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<State>,
    stdout: String,
    stderr: String,
    exit_code: i64,
    results_file: Option<(String, String)>,
    capture_files: bool,
    hang_wait: bool,
    hang_exec: bool,
    fail_image: bool,
    fail_create: bool,
    fail_start: bool,
    fail_wait: bool,
    fail_exec: bool,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, stdout: &str, stderr: &str, exit_code: i64) -> Self {
        self.stdout = stdout.to_string();
        self.stderr = stderr.to_string();
        self.exit_code = exit_code;
        self
    }

    /// Writes `content` into the bound host directory when the workload runs.
    pub fn with_results_file(mut self, name: &str, content: &str) -> Self {
        self.results_file = Some((name.to_string(), content.to_string()));
        self
    }

    /// Snapshots the host directory's files at creation time.
    pub fn capturing_files(mut self) -> Self {
        self.capture_files = true;
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang_wait = true;
        self
    }

    pub fn hanging_exec(mut self) -> Self {
        self.hang_exec = true;
        self
    }

    pub fn failing_image_pull(mut self) -> Self {
        self.fail_image = true;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_wait(mut self) -> Self {
        self.fail_wait = true;
        self
    }

    pub fn failing_exec(mut self) -> Self {
        self.fail_exec = true;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn created(&self) -> Vec<String> {
        self.state().created.clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state().removed.clone()
    }

    pub fn descriptors(&self) -> Vec<EnvironmentDescriptor> {
        self.state().descriptors.clone()
    }

    pub fn exec_calls(&self) -> Vec<(String, Vec<String>)> {
        self.state().exec_calls.clone()
    }

    pub fn staged_file(&self, name: &str) -> Option<String> {
        self.state().staged.get(name).cloned()
    }

    fn host_dir(&self, id: &str) -> Option<PathBuf> {
        self.state().host_dirs.get(id).cloned()
    }

    fn write_results(&self, id: &str) {
        if let (Some((name, content)), Some(dir)) = (&self.results_file, self.host_dir(id)) {
            std::fs::write(dir.join(name), content).unwrap();
        }
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError> {
        if self.fail_image {
            return Err(RuntimeError::ImagePullFailed {
                image: image.to_string(),
                reason: "registry unreachable".to_string(),
            });
        }
        Ok(())
    }

    async fn create_container(&self, descriptor: &EnvironmentDescriptor) -> Result<String, RuntimeError> {
        if self.fail_create {
            return Err(RuntimeError::StartFailed(descriptor.name.clone(), "create refused".to_string()));
        }
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("mock-{}", state.next_id);
        state.descriptors.push(descriptor.clone());
        state.host_dirs.insert(id.clone(), descriptor.host_dir.clone());
        state.created.push(id.clone());

        if self.capture_files {
            for entry in std::fs::read_dir(&descriptor.host_dir).unwrap().flatten() {
                if let Ok(content) = std::fs::read_to_string(entry.path()) {
                    state
                        .staged
                        .insert(entry.file_name().to_string_lossy().into_owned(), content);
                }
            }
        }
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        if self.fail_start {
            return Err(RuntimeError::StartFailed(id.to_string(), "start refused".to_string()));
        }
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError> {
        if self.hang_wait {
            std::future::pending::<()>().await;
        }
        if self.fail_wait {
            return Err(RuntimeError::ContainerNotFound(id.to_string()));
        }
        self.write_results(id);
        Ok(self.exit_code)
    }

    async fn collect_logs(&self, _id: &str) -> Result<ContainerLogs, RuntimeError> {
        Ok(ContainerLogs {
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        })
    }

    async fn exec(
        &self,
        id: &str,
        command: &[String],
        _working_dir: Option<&str>,
    ) -> Result<ExecOutput, RuntimeError> {
        self.state().exec_calls.push((id.to_string(), command.to_vec()));
        if self.hang_exec {
            std::future::pending::<()>().await;
        }
        if self.fail_exec {
            return Err(RuntimeError::ExecFailed {
                container: id.to_string(),
                reason: "exec refused".to_string(),
            });
        }

        if command.join(" ").contains("rm -rf") {
            if let Some(dir) = self.host_dir(id) {
                for entry in std::fs::read_dir(dir).unwrap().flatten() {
                    std::fs::remove_file(entry.path()).ok();
                }
            }
            return Ok(ExecOutput::default());
        }

        self.write_results(id);
        Ok(ExecOutput {
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            exit_code: self.exit_code,
        })
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.state().removed.push(id.to_string());
        Ok(())
    }
}
