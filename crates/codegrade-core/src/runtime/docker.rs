// src/runtime/docker.rs
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    CreateImageOptions as BollardCreateImageOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::time::Duration;

use super::{ContainerLogs, ContainerRuntime, EnvironmentDescriptor, ExecOutput};
use crate::config::DockerConfig;
use crate::errors::RuntimeError;

/// `ContainerRuntime` backed by the Docker Engine API.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(config: &DockerConfig) -> Result<Self, RuntimeError> {
        let docker = match &config.socket {
            Some(socket) => {
                log::info!("Connecting to Docker at {}", socket);
                Docker::connect_with_socket(socket, config.timeout_secs, bollard::API_DEFAULT_VERSION)?
            }
            None => Docker::connect_with_local_defaults()?
                .with_timeout(Duration::from_secs(config.timeout_secs)),
        };
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        log::info!("Pulling image {}", image);
        let pull_options = Some(BollardCreateImageOptionsQuery {
            from_image: Some(image.to_string()),
            ..Default::default()
        });

        let mut pull_stream = self.docker.create_image(pull_options, None, None);
        while let Some(result) = pull_stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        log::debug!("{}: {}", image, status);
                    }
                }
                Err(e) => {
                    return Err(RuntimeError::ImagePullFailed {
                        image: image.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }
        log::info!("Pulled image {}", image);
        Ok(())
    }
}

fn append_log(output: LogOutput, stdout: &mut String, stderr: &mut String) {
    match output {
        LogOutput::StdOut { message } => stdout.push_str(&String::from_utf8_lossy(&message)),
        LogOutput::StdErr { message } => stderr.push_str(&String::from_utf8_lossy(&message)),
        LogOutput::Console { message } => stdout.push_str(&String::from_utf8_lossy(&message)),
        _ => {}
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => {
                self.pull_image(image).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create_container(&self, descriptor: &EnvironmentDescriptor) -> Result<String, RuntimeError> {
        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(descriptor.name.clone()),
            ..Default::default()
        });

        let memory = descriptor.memory_bytes();
        let config = ContainerCreateBody {
            image: Some(descriptor.image.clone()),
            cmd: Some(descriptor.command.clone()),
            working_dir: Some(descriptor.working_dir.clone()),
            user: descriptor.user.clone(),
            host_config: Some(bollard::models::HostConfig {
                binds: Some(vec![descriptor.bind()]),
                memory: Some(memory),
                // equal to memory: no swap
                memory_swap: Some(memory),
                nano_cpus: descriptor.nano_cpus,
                auto_remove: Some(false),
                ..Default::default()
            }),
            tty: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let container = self.docker.create_container(options, config).await?;
        for warning in &container.warnings {
            log::warn!("Container {} created with warning: {}", descriptor.name, warning);
        }
        log::debug!("Created container {} ({})", descriptor.name, container.id);
        Ok(container.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<BollardStartContainerOptionsQuery>)
            .await
            .map_err(|e| RuntimeError::StartFailed(id.to_string(), e.to_string()))?;
        log::debug!("Started container {}", id);
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError> {
        let mut wait_stream = self
            .docker
            .wait_container(id, None::<BollardWaitContainerOptionsQuery>);

        match wait_stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Non-zero exits surface as an error carrying the code.
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(RuntimeError::ContainerNotFound(id.to_string())),
        }
    }

    async fn collect_logs(&self, id: &str) -> Result<ContainerLogs, RuntimeError> {
        let mut output_stream = self.docker.logs(
            id,
            Some(BollardLogsOptionsQuery {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut logs = ContainerLogs::default();
        while let Some(log_result) = output_stream.next().await {
            append_log(log_result?, &mut logs.stdout, &mut logs.stderr);
        }
        Ok(logs)
    }

    async fn exec(
        &self,
        id: &str,
        command: &[String],
        working_dir: Option<&str>,
    ) -> Result<ExecOutput, RuntimeError> {
        let exec_failed = |reason: String| RuntimeError::ExecFailed {
            container: id.to_string(),
            reason,
        };

        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(command.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: working_dir.map(str::to_string),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| exec_failed(e.to_string()))?;

        let mut output = ExecOutput::default();
        match self
            .docker
            .start_exec(&exec.id, None::<StartExecOptions>)
            .await
            .map_err(|e| exec_failed(e.to_string()))?
        {
            StartExecResults::Attached { output: mut stream, .. } => {
                while let Some(chunk) = stream.next().await {
                    append_log(chunk?, &mut output.stdout, &mut output.stderr);
                }
            }
            StartExecResults::Detached => {
                return Err(exec_failed("exec started detached".to_string()));
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| exec_failed(e.to_string()))?;
        output.exit_code = inspect.exit_code.unwrap_or(-1);
        Ok(output)
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(
                id,
                Some(BollardRemoveContainerOptionsQuery {
                    force: true,
                    ..Default::default()
                }),
            )
            .await?;
        log::debug!("Removed container {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::shell_command;

    // Requires a running Docker daemon and network access for the image pull.
    #[tokio::test]
    #[ignore]
    async fn test_docker_round_trip() {
        let runtime = DockerRuntime::new(&DockerConfig::default()).unwrap();
        runtime.ensure_image("alpine:latest").await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let descriptor = EnvironmentDescriptor {
            image: "alpine:latest".to_string(),
            name: format!("codegrade-test-{}", uuid::Uuid::new_v4()),
            memory_limit_mb: 64,
            nano_cpus: None,
            host_dir: dir.path().to_path_buf(),
            mount_point: "/work".to_string(),
            working_dir: "/work".to_string(),
            command: shell_command("echo hello; echo oops >&2; exit 3"),
            user: None,
        };

        let id = runtime.create_container(&descriptor).await.unwrap();
        runtime.start_container(&id).await.unwrap();
        let exit_code = runtime.wait_container(&id).await.unwrap();
        let logs = runtime.collect_logs(&id).await.unwrap();
        runtime.remove_container(&id).await.unwrap();

        assert_eq!(exit_code, 3);
        assert_eq!(logs.stdout.trim(), "hello");
        assert_eq!(logs.stderr.trim(), "oops");
    }
}
