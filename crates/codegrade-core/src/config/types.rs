//! Configuration type definitions for the execution engine
//!
//! Every section defaults sensibly, so an empty YAML document is a valid
//! configuration that runs against the local Docker daemon with the stock
//! execution images and no warm pool.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::EngineError;
use crate::models::Language;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Unix socket or named pipe; local defaults when unset.
    #[serde(default)]
    pub socket: Option<String>,
    #[serde(default = "default_docker_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: None,
            timeout_secs: default_docker_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_playground_timeout_ms")]
    pub playground_timeout_ms: u64,
    #[serde(default = "default_playground_grace_ms")]
    pub playground_grace_ms: u64,
    #[serde(default = "default_test_grace_ms")]
    pub test_grace_ms: u64,
    /// Parent of the per-execution working directories.
    #[serde(default)]
    pub work_root: Option<PathBuf>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            playground_timeout_ms: default_playground_timeout_ms(),
            playground_grace_ms: default_playground_grace_ms(),
            test_grace_ms: default_test_grace_ms(),
            work_root: None,
        }
    }
}

impl ExecutionConfig {
    pub fn work_root(&self) -> PathBuf {
        self.work_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("codegrade"))
    }

    /// Hard deadline for an ad-hoc run.
    pub fn playground_deadline(&self) -> Duration {
        Duration::from_millis(self.playground_timeout_ms.saturating_add(self.playground_grace_ms))
    }

    /// Hard deadline for a graded run with the given lesson timeout. Lesson
    /// timeouts are untrusted input, so the sum saturates.
    pub fn test_deadline(&self, lesson_timeout_ms: u64) -> Duration {
        Duration::from_millis(lesson_timeout_ms.saturating_add(self.test_grace_ms))
    }
}

/// One image reference per language that has an execution image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageImages {
    pub typescript: String,
    pub javascript: String,
    pub csharp: String,
    pub python: String,
}

impl LanguageImages {
    pub fn get(&self, language: Language) -> Option<&str> {
        match language {
            Language::TypeScript => Some(&self.typescript),
            Language::JavaScript => Some(&self.javascript),
            Language::CSharp => Some(&self.csharp),
            Language::Python => Some(&self.python),
            Language::Go => None,
        }
    }

    fn entries(&self) -> [(&'static str, &str); 4] {
        [
            ("typescript", &self.typescript),
            ("javascript", &self.javascript),
            ("csharp", &self.csharp),
            ("python", &self.python),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_run_images")]
    pub run: LanguageImages,
    #[serde(default = "default_test_images")]
    pub test: LanguageImages,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            run: default_run_images(),
            test: default_test_images(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolWarmup {
    pub language: String,
    pub framework: String,
    #[serde(default = "default_min_per_pool")]
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_min_per_pool")]
    pub min_per_pool: usize,
    #[serde(default = "default_max_per_pool")]
    pub max_per_pool: usize,
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_warmup_parallelism")]
    pub warmup_parallelism: usize,
    /// Memory limit for every warm environment.
    #[serde(default = "default_pool_memory_limit_mb")]
    pub memory_limit_mb: u64,
    /// Base image per `language/framework` key.
    #[serde(default = "default_pool_images")]
    pub images: BTreeMap<String, String>,
    #[serde(default)]
    pub warmup: Vec<PoolWarmup>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_per_pool: default_min_per_pool(),
            max_per_pool: default_max_per_pool(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            warmup_parallelism: default_warmup_parallelism(),
            memory_limit_mb: default_pool_memory_limit_mb(),
            images: default_pool_images(),
            warmup: Vec::new(),
        }
    }
}

impl PoolConfig {
    pub fn image_for(&self, language: &str, framework: &str) -> Option<&str> {
        self.images
            .get(&pool_image_key(language, framework))
            .map(String::as_str)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

pub fn pool_image_key(language: &str, framework: &str) -> String {
    format!(
        "{}/{}",
        language.trim().to_ascii_lowercase(),
        framework.trim().to_ascii_lowercase()
    )
}

impl EngineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.docker.timeout_secs == 0 {
            return Err(EngineError::Config("docker.timeout_secs must be greater than 0".to_string()));
        }

        let execution = &self.execution;
        if execution.playground_timeout_ms == 0 {
            return Err(EngineError::Config(
                "execution.playground_timeout_ms must be greater than 0".to_string(),
            ));
        }

        for (section, images) in [("run", &self.images.run), ("test", &self.images.test)] {
            for (language, image) in images.entries() {
                if image.trim().is_empty() {
                    return Err(EngineError::Config(format!(
                        "images.{}.{} cannot be empty",
                        section, language
                    )));
                }
            }
        }

        let pool = &self.pool;
        if pool.max_per_pool == 0 {
            return Err(EngineError::Config("pool.max_per_pool must be greater than 0".to_string()));
        }
        if pool.min_per_pool > pool.max_per_pool {
            return Err(EngineError::Config(format!(
                "pool.min_per_pool ({}) cannot exceed pool.max_per_pool ({})",
                pool.min_per_pool, pool.max_per_pool
            )));
        }
        if pool.maintenance_interval_secs == 0 || pool.idle_timeout_secs == 0 {
            return Err(EngineError::Config(
                "pool maintenance interval and idle timeout must be greater than 0".to_string(),
            ));
        }
        if pool.warmup_parallelism == 0 {
            return Err(EngineError::Config("pool.warmup_parallelism must be greater than 0".to_string()));
        }
        for warmup in &pool.warmup {
            if pool.image_for(&warmup.language, &warmup.framework).is_none() {
                return Err(EngineError::Config(format!(
                    "pool warm-up entry {} has no image configured",
                    pool_image_key(&warmup.language, &warmup.framework)
                )));
            }
            if warmup.count > pool.max_per_pool {
                return Err(EngineError::Config(format!(
                    "pool warm-up count {} for {} exceeds max_per_pool",
                    warmup.count,
                    pool_image_key(&warmup.language, &warmup.framework)
                )));
            }
        }

        Ok(())
    }
}

fn default_docker_timeout_secs() -> u64 {
    120
}

fn default_playground_timeout_ms() -> u64 {
    10_000
}

fn default_playground_grace_ms() -> u64 {
    1_000
}

fn default_test_grace_ms() -> u64 {
    5_000
}

fn default_pool_memory_limit_mb() -> u64 {
    256
}

fn default_min_per_pool() -> usize {
    2
}

fn default_max_per_pool() -> usize {
    10
}

fn default_maintenance_interval_secs() -> u64 {
    60
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_warmup_parallelism() -> usize {
    4
}

fn default_run_images() -> LanguageImages {
    LanguageImages {
        typescript: "jhypki/ascenddev-typescript-runner:latest".to_string(),
        javascript: "jhypki/ascenddev-javascript-runner:latest".to_string(),
        csharp: "jhypki/ascenddev-csharp-runner:latest".to_string(),
        python: "jhypki/ascenddev-python-runner:latest".to_string(),
    }
}

fn default_test_images() -> LanguageImages {
    LanguageImages {
        typescript: "jhypki/ascenddev-typescript-runner:latest".to_string(),
        javascript: "jhypki/ascenddev-typescript-runner:latest".to_string(),
        csharp: "jhypki/ascenddev-csharp-tester:latest".to_string(),
        python: "jhypki/ascenddev-python-tester:latest".to_string(),
    }
}

fn default_pool_images() -> BTreeMap<String, String> {
    [
        ("typescript/jest", "jhypki/ascenddev-typescript-runner:latest"),
        ("javascript/jest", "jhypki/ascenddev-typescript-runner:latest"),
        ("python/pytest", "jhypki/ascenddev-python-tester:latest"),
        ("csharp/xunit", "jhypki/ascenddev-csharp-tester:latest"),
    ]
    .into_iter()
    .map(|(key, image)| (key.to_string(), image.to_string()))
    .collect()
}
