use async_trait::async_trait;
use std::path::Path;

use super::{LanguageStrategy, RunStrategy, CODE_MOUNT_POINT, CONTAINER_WORKDIR, RUN_CODE_SCRIPT};
use crate::models::{ExecutionResult, Language};
use crate::runtime::{shell_command, EnvironmentDescriptor};

/// Written by runner images when the source had to be compiled first.
pub const COMPILATION_OUTPUT_FILE: &str = "compilation.txt";

/// Ad-hoc strategy: one source file in the working directory, executed by the
/// image's `run-code.sh`.
#[derive(Debug, Clone)]
pub struct ContainerRunStrategy {
    language: Language,
    name: &'static str,
    source_file: &'static str,
    image: String,
    memory_limit_mb: u64,
}

impl ContainerRunStrategy {
    pub fn typescript(image: &str) -> Self {
        Self::build(Language::TypeScript, "typescript-run", "index.ts", image, 128)
    }

    pub fn javascript(image: &str) -> Self {
        Self::build(Language::JavaScript, "javascript-run", "index.js", image, 128)
    }

    /// The .NET runtime needs more headroom than the script runners.
    pub fn csharp(image: &str) -> Self {
        Self::build(Language::CSharp, "csharp-run", "Program.cs", image, 256)
    }

    pub fn python(image: &str) -> Self {
        Self::build(Language::Python, "python-run", "main.py", image, 128)
    }

    fn build(
        language: Language,
        name: &'static str,
        source_file: &'static str,
        image: &str,
        memory_limit_mb: u64,
    ) -> Self {
        Self {
            language,
            name,
            source_file,
            image: image.to_string(),
            memory_limit_mb,
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }
}

impl LanguageStrategy for ContainerRunStrategy {
    fn language(&self) -> Language {
        self.language
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[async_trait]
impl RunStrategy for ContainerRunStrategy {
    fn source_file_name(&self, _code: &str) -> &'static str {
        self.source_file
    }

    fn build_environment(&self, name: &str, working_dir: &Path, _language: &str) -> EnvironmentDescriptor {
        EnvironmentDescriptor {
            image: self.image.clone(),
            name: name.to_string(),
            memory_limit_mb: self.memory_limit_mb,
            nano_cpus: None,
            host_dir: working_dir.to_path_buf(),
            mount_point: CODE_MOUNT_POINT.to_string(),
            working_dir: CONTAINER_WORKDIR.to_string(),
            command: shell_command(RUN_CODE_SCRIPT),
            user: Some("root".to_string()),
        }
    }

    async fn parse_result(
        &self,
        stdout: String,
        stderr: String,
        exit_code: i64,
        elapsed_ms: u64,
        working_dir: &Path,
    ) -> ExecutionResult {
        let compilation_output = match tokio::fs::read_to_string(working_dir.join(COMPILATION_OUTPUT_FILE)).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                log::warn!("Could not read {}: {}", COMPILATION_OUTPUT_FILE, e);
                None
            }
        };

        log::debug!(
            "{} finished: exit code {}, {} ms",
            self.name,
            exit_code,
            elapsed_ms
        );

        ExecutionResult {
            success: exit_code == 0,
            stdout,
            stderr,
            exit_code,
            execution_time_ms: elapsed_ms,
            compilation_output,
            ..Default::default()
        }
    }
}
