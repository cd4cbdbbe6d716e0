//! Sandboxed execution and grading of untrusted, multi-language code.
//!
//! Submissions are screened by a static sanitizer, staged into a private
//! working directory, and executed inside a short-lived container whose
//! output is folded into a uniform, JSON-serializable result.
//!
//! # Architecture Overview
//!
//! - **Sanitizer chain**: per-language forbidden-pattern screening before anything runs
//! - **Strategies**: per-language file layout, environment shape and result parsing
//! - **Executors**: the environment lifecycle with a hard deadline and guaranteed cleanup
//! - **Environment pool**: warm containers reused across graded runs
//! - **Keyword validation**: lesson-level keyword requirements
//! - **Services**: the caller-facing facades tying all of the above together

pub mod config;
pub mod errors;
pub mod executors;
pub mod keywords;
pub mod models;
pub mod pool;
pub mod runtime;
pub mod sanitizer;
pub mod service;
pub mod strategies;

pub use config::*;
pub use errors::{EngineError, RuntimeError};
pub use executors::{CodeExecutor, TestExecutor};
pub use keywords::{KeywordRequirement, KeywordValidationResult, KeywordValidator};
pub use models::*;
pub use pool::ContainerPool;
pub use runtime::{ContainerRuntime, DockerRuntime};
pub use sanitizer::SanitizerRegistry;
pub use service::{CodeExecutionService, CodeTestService, CompletionTracker, Engine, InMemoryLessons, LessonProvider};

#[cfg(test)]
pub mod test_utils;
