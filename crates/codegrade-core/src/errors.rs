//! Error types for the execution engine
//!
//! Two layers of failure are modelled here. `EngineError` is the taxonomy the
//! rest of the crate speaks: only `InvalidInput` and `SecurityViolation` are
//! ever returned to a caller of the service facades, everything else is folded
//! into a failed result carrying `EngineError::label()`. `RuntimeError` covers
//! the container backend and is converted into `EnvironmentPreparation` as soon
//! as it crosses into the orchestrator.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("{param} cannot be null or empty")]
    InvalidInput { param: &'static str },
    #[error("Language '{0}' is not supported")]
    UnsupportedLanguage(String),
    #[error("{message}")]
    SecurityViolation { pattern: String, message: String },
    #[error("Error setting up execution environment: {0}")]
    EnvironmentPreparation(String),
    #[error("Execution timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("Error during container execution: {0}")]
    ExecutionFailure(String),
    #[error("Unexpected error: {0}")]
    SystemError(String),
    #[error("Lesson '{0}' not found")]
    LessonNotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl EngineError {
    /// Short label shown as the test name / result tag for a failed run.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::InvalidInput { .. } => "Request Validation",
            EngineError::UnsupportedLanguage(_) => "Language Error",
            EngineError::SecurityViolation { .. } => "Security Error",
            EngineError::EnvironmentPreparation(_) | EngineError::Io(_) => "Environment Error",
            EngineError::Timeout { .. } => "Timeout Error",
            EngineError::ExecutionFailure(_) => "Execution Error",
            EngineError::LessonNotFound(_) => "Lesson Error",
            EngineError::SystemError(_) | EngineError::Config(_) => "System Error",
        }
    }

    pub(crate) fn security_violation(language_label: Option<&str>, pattern: &str) -> Self {
        let message = match language_label {
            Some(label) => format!("{} code contains potentially unsafe operation: {}", label, pattern),
            None => format!("Code contains potentially unsafe operation: {}", pattern),
        };
        EngineError::SecurityViolation {
            pattern: pattern.to_string(),
            message,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

impl From<RuntimeError> for EngineError {
    fn from(err: RuntimeError) -> Self {
        EngineError::EnvironmentPreparation(err.to_string())
    }
}

// Specific error for the container backend
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Bollard (Docker client) error: {0}")]
    BollardError(#[from] bollard::errors::Error),
    #[error("Image '{0}' is not available locally")]
    ImageNotFound(String),
    #[error("Failed to pull image {image}: {reason}")]
    ImagePullFailed { image: String, reason: String },
    #[error("Container '{0}' failed to start: {1}")]
    StartFailed(String, String),
    #[error("Exec in container '{container}' failed: {reason}")]
    ExecFailed { container: String, reason: String },
    #[error("Container '{0}' not found")]
    ContainerNotFound(String),
    #[error("I/O error during container operation: {0}")]
    IoError(#[from] std::io::Error),
}
