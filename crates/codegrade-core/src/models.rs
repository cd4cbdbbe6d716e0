//! Data model shared by the sanitizer, strategies, executors and pool.
//!
//! Every result type serializes to camelCase JSON so an outer HTTP layer can
//! hand it to clients unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::keywords::{KeywordRequirement, KeywordValidationResult};

/// Default per-lesson test timeout; strategies only write a timeout override
/// file when the lesson asks for something else.
pub const DEFAULT_TEST_TIMEOUT_MS: u64 = 5000;

/// Placeholder in a lesson test template that is replaced by user code.
pub const USER_CODE_PLACEHOLDER: &str = "__USER_CODE__";

/// The closed set of languages known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    JavaScript,
    CSharp,
    Python,
    Go,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::TypeScript,
        Language::JavaScript,
        Language::CSharp,
        Language::Python,
        Language::Go,
    ];

    /// Case-insensitive lookup of a language key.
    pub fn parse(key: &str) -> Option<Language> {
        Language::ALL
            .into_iter()
            .find(|language| language.key().eq_ignore_ascii_case(key.trim()))
    }

    /// Key used in requests, lesson definitions and pool keys.
    pub fn key(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::CSharp => "csharp",
            Language::Python => "python",
            Language::Go => "go",
        }
    }

    /// Human readable name used in messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::TypeScript => "TypeScript",
            Language::JavaScript => "JavaScript",
            Language::CSharp => "C#",
            Language::Python => "Python",
            Language::Go => "Go",
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        self.key().eq_ignore_ascii_case(key.trim())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input: serde_json::Value,
    #[serde(default)]
    pub expected: serde_json::Value,
}

impl TestCase {
    /// Name used when a framework produced no usable name for this case.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| self.description.as_deref().filter(|d| !d.is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConfig {
    pub framework: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    #[serde(default)]
    pub test_template: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub main_function: Option<String>,
    #[serde(default)]
    pub keyword_requirements: Vec<KeywordRequirement>,
}

impl TestConfig {
    pub fn new(framework: impl Into<String>, test_template: impl Into<String>) -> Self {
        Self {
            framework: framework.into(),
            timeout_ms: default_timeout_ms(),
            memory_limit_mb: default_memory_limit_mb(),
            test_template: test_template.into(),
            test_cases: Vec::new(),
            main_function: None,
            keyword_requirements: Vec::new(),
        }
    }
}

/// The slice of a lesson the engine needs. Lessons are owned and persisted by
/// an outer collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub language: String,
    pub test_config: TestConfig,
}

/// Wall-clock cost of each execution phase in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub file_preparation_ms: u64,
    pub environment_startup_ms: u64,
    pub execution_ms: u64,
    pub cleanup_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compilation_output: Option<String>,
    pub performance_metrics: PerformanceMetrics,
}

impl ExecutionResult {
    /// A failed result carrying only an error message on stderr.
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stderr: stderr.into(),
            exit_code: 1,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResult {
    pub test_name: String,
    pub passed: bool,
    pub message: String,
}

impl TestCaseResult {
    pub fn passed(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            passed: true,
            message: "Test passed".to_string(),
        }
    }

    pub fn failed(test_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            passed: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub success: bool,
    pub test_results: Vec<TestCaseResult>,
    pub performance_metrics: PerformanceMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_validation: Option<KeywordValidationResult>,
}

impl TestResult {
    /// A failed result with a single labelled failure case.
    pub fn failure(test_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            test_results: vec![TestCaseResult::failed(test_name, message)],
            ..Default::default()
        }
    }
}

/// A warm container kept alive by the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolEntry {
    pub id: String,
    pub name: String,
    pub language: String,
    pub framework: String,
    pub base_image: String,
    pub created_at: DateTime<Utc>,
    /// Host directory bound into the container at `mount_point`.
    pub workspace: PathBuf,
    pub mount_point: String,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TEST_TIMEOUT_MS
}

fn default_memory_limit_mb() -> u64 {
    256
}
