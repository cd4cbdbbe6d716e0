//! Per-language strategies for the ad-hoc and graded flows.
//!
//! A strategy knows three things about its language: how to lay files out in
//! the working directory, which environment runs them, and how to turn the
//! framework's raw output into a uniform result. Parsing never fails: a
//! missing or malformed result file becomes a failed single-entry result.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::config::LanguageImages;
use crate::errors::EngineError;
use crate::models::{ExecutionResult, Language, Lesson, TestCaseResult, TestConfig, TestResult};
use crate::runtime::EnvironmentDescriptor;

pub mod jest;
pub mod pytest;
pub mod run;
pub mod xunit;

pub use jest::JestTestStrategy;
pub use pytest::PytestTestStrategy;
pub use run::ContainerRunStrategy;
pub use xunit::XunitTestStrategy;

/// Structured result file written by every test image.
pub const RESULTS_FILE: &str = "results.json";
/// Where graded runs see their working directory.
pub const TEST_MOUNT_POINT: &str = "/app/test";
/// Where ad-hoc runs see their working directory.
pub const CODE_MOUNT_POINT: &str = "/app/code";
pub const CONTAINER_WORKDIR: &str = "/app";
pub const RUN_TESTS_SCRIPT: &str = "/app/run-tests.sh";
pub const RUN_CODE_SCRIPT: &str = "/app/run-code.sh";

pub trait LanguageStrategy: Send + Sync {
    fn language(&self) -> Language;

    fn supports(&self, language: &str) -> bool {
        self.language().matches(language)
    }

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Strategy for the ad-hoc flow.
#[async_trait]
pub trait RunStrategy: LanguageStrategy {
    fn source_file_name(&self, code: &str) -> &'static str;

    fn build_environment(&self, name: &str, working_dir: &Path, language: &str) -> EnvironmentDescriptor;

    async fn parse_result(
        &self,
        stdout: String,
        stderr: String,
        exit_code: i64,
        elapsed_ms: u64,
        working_dir: &Path,
    ) -> ExecutionResult;
}

/// Strategy for the graded flow.
#[async_trait]
pub trait TestStrategy: LanguageStrategy {
    async fn prepare_files(&self, working_dir: &Path, user_code: &str, lesson: &Lesson) -> Result<(), EngineError>;

    fn build_environment(&self, name: &str, working_dir: &Path, lesson: &Lesson) -> EnvironmentDescriptor;

    async fn parse_result(
        &self,
        stdout: &str,
        stderr: &str,
        exit_code: i64,
        elapsed_ms: u64,
        working_dir: &Path,
        test_config: &TestConfig,
    ) -> TestResult;
}

/// Ordered strategies for one flow; the first that supports a language wins.
pub struct StrategyRegistry<S: ?Sized> {
    strategies: Vec<Arc<S>>,
}

pub type RunStrategyRegistry = StrategyRegistry<dyn RunStrategy>;
pub type TestStrategyRegistry = StrategyRegistry<dyn TestStrategy>;

impl<S: ?Sized + LanguageStrategy> StrategyRegistry<S> {
    pub fn new(strategies: Vec<Arc<S>>) -> Self {
        Self { strategies }
    }

    pub fn get_strategy(&self, language: &str) -> Result<Arc<S>, EngineError> {
        if language.trim().is_empty() {
            return Err(EngineError::InvalidInput { param: "language" });
        }
        let strategy = self
            .strategies
            .iter()
            .find(|s| s.supports(language))
            .cloned()
            .ok_or_else(|| EngineError::UnsupportedLanguage(language.to_string()))?;
        log::info!("Using {} strategy for language '{}'", strategy.name(), language);
        Ok(strategy)
    }

    pub fn languages(&self) -> Vec<Language> {
        self.strategies.iter().map(|s| s.language()).collect()
    }
}

impl StrategyRegistry<dyn RunStrategy> {
    /// TypeScript, JavaScript, C# and Python run strategies.
    pub fn with_images(images: &LanguageImages) -> Self {
        Self::new(vec![
            Arc::new(ContainerRunStrategy::typescript(&images.typescript)),
            Arc::new(ContainerRunStrategy::javascript(&images.javascript)),
            Arc::new(ContainerRunStrategy::csharp(&images.csharp)),
            Arc::new(ContainerRunStrategy::python(&images.python)),
        ])
    }
}

impl StrategyRegistry<dyn TestStrategy> {
    /// Jest for TypeScript and JavaScript, xUnit for C#, pytest for Python.
    pub fn with_images(images: &LanguageImages) -> Self {
        Self::new(vec![
            Arc::new(JestTestStrategy::typescript(&images.typescript)),
            Arc::new(JestTestStrategy::javascript(&images.javascript)),
            Arc::new(XunitTestStrategy::new(&images.csharp)),
            Arc::new(PytestTestStrategy::new(&images.python)),
        ])
    }
}

/// Descriptor shared by the graded strategies: working directory at
/// [`TEST_MOUNT_POINT`], lesson memory limit with swap disabled.
pub(crate) fn test_environment(image: &str, name: &str, working_dir: &Path, lesson: &Lesson) -> EnvironmentDescriptor {
    EnvironmentDescriptor {
        image: image.to_string(),
        name: name.to_string(),
        memory_limit_mb: lesson.test_config.memory_limit_mb,
        nano_cpus: None,
        host_dir: working_dir.to_path_buf(),
        mount_point: TEST_MOUNT_POINT.to_string(),
        working_dir: CONTAINER_WORKDIR.to_string(),
        command: crate::runtime::shell_command(RUN_TESTS_SCRIPT),
        user: Some("root".to_string()),
    }
}

/// Outcome of looking for the structured result file.
pub(crate) enum ResultsFile {
    Missing,
    Present(String),
    Unreadable(String),
}

pub(crate) async fn read_results_file(working_dir: &Path) -> ResultsFile {
    let path = working_dir.join(RESULTS_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => {
            log::debug!("Read {} ({} bytes)", path.display(), content.len());
            ResultsFile::Present(content)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ResultsFile::Missing,
        Err(e) => ResultsFile::Unreadable(e.to_string()),
    }
}

pub(crate) const NO_RESULTS_MESSAGE: &str = "No test results found. The tests may have failed to run.";

pub(crate) fn parser_error() -> TestCaseResult {
    TestCaseResult::failed("Parser Error", format!("Failed to parse test results from {}", RESULTS_FILE))
}

pub(crate) fn parse_exception(reason: impl std::fmt::Display) -> TestCaseResult {
    TestCaseResult::failed("Exception", format!("Error parsing test results: {}", reason))
}

pub(crate) fn default_test() -> TestCaseResult {
    TestCaseResult::failed("Default Test", "Tests did not produce any results")
}

pub(crate) async fn write_file(dir: &Path, file_name: &str, content: &str) -> Result<(), EngineError> {
    let path = dir.join(file_name);
    tokio::fs::write(&path, content).await.map_err(|e| {
        EngineError::EnvironmentPreparation(format!("Failed to write {}: {}", path.display(), e))
    })?;
    log::debug!("Wrote {} ({} bytes)", path.display(), content.len());
    Ok(())
}
