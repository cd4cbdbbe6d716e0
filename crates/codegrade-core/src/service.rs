//! Entry points for callers: ad-hoc execution and lesson grading.
//!
//! Both facades validate input, run the sanitizer and only then hand the code
//! to an executor. `InvalidInput` and `SecurityViolation` are the only errors
//! a caller ever sees; every later failure is reported inside the result.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::executors::{elapsed_ms, CodeExecutor, TestExecutor};
use crate::keywords::KeywordValidator;
use crate::models::{ExecutionResult, Lesson, TestResult};
use crate::pool::ContainerPool;
use crate::runtime::ContainerRuntime;
use crate::sanitizer::SanitizerRegistry;
use crate::strategies::{RunStrategyRegistry, TestStrategyRegistry};

/// Looks lessons up by id.
#[async_trait]
pub trait LessonProvider: Send + Sync {
    async fn get_lesson(&self, lesson_id: &str) -> Result<Option<Lesson>, EngineError>;
}

/// Told about every successful graded submission that carries a user id.
#[async_trait]
pub trait CompletionTracker: Send + Sync {
    async fn mark_completed(&self, user_id: Uuid, lesson_id: &str, code: &str) -> Result<(), EngineError>;
}

/// Lessons held in memory, keyed by id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLessons {
    lessons: HashMap<String, Lesson>,
}

impl InMemoryLessons {
    pub fn new(lessons: impl IntoIterator<Item = Lesson>) -> Self {
        Self {
            lessons: lessons.into_iter().map(|l| (l.id.clone(), l)).collect(),
        }
    }

    pub fn insert(&mut self, lesson: Lesson) {
        self.lessons.insert(lesson.id.clone(), lesson);
    }
}

#[async_trait]
impl LessonProvider for InMemoryLessons {
    async fn get_lesson(&self, lesson_id: &str) -> Result<Option<Lesson>, EngineError> {
        Ok(self.lessons.get(lesson_id).cloned())
    }
}

fn require(value: &str, param: &'static str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        Err(EngineError::InvalidInput { param })
    } else {
        Ok(())
    }
}

/// Errors that stop a request before any execution.
fn is_rejection(error: &EngineError) -> bool {
    matches!(
        error,
        EngineError::InvalidInput { .. } | EngineError::SecurityViolation { .. }
    )
}

pub struct CodeExecutionService {
    sanitizers: Arc<SanitizerRegistry>,
    executor: CodeExecutor,
}

impl CodeExecutionService {
    pub fn new(sanitizers: Arc<SanitizerRegistry>, executor: CodeExecutor) -> Self {
        Self { sanitizers, executor }
    }

    pub async fn execute_code(&self, language: &str, code: &str) -> Result<ExecutionResult, EngineError> {
        require(language, "language")?;
        require(code, "code")?;

        let code = match self.sanitizers.sanitize(code, language) {
            Ok(code) => code,
            Err(e) if is_rejection(&e) => return Err(e),
            Err(e) => {
                log::warn!("Cannot execute {} code: {}", language, e);
                return Ok(ExecutionResult::failure(e.to_string()));
            }
        };

        log::info!("Executing {} code ({} bytes)", language, code.len());
        Ok(self.executor.execute(language, code).await)
    }
}

pub struct CodeTestService {
    lessons: Arc<dyn LessonProvider>,
    sanitizers: Arc<SanitizerRegistry>,
    keywords: KeywordValidator,
    executor: TestExecutor,
    tracker: Option<Arc<dyn CompletionTracker>>,
}

impl CodeTestService {
    pub fn new(lessons: Arc<dyn LessonProvider>, sanitizers: Arc<SanitizerRegistry>, executor: TestExecutor) -> Self {
        Self {
            lessons,
            sanitizers,
            keywords: KeywordValidator::default(),
            executor,
            tracker: None,
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn CompletionTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub async fn run_tests(
        &self,
        lesson_id: &str,
        user_code: &str,
        user_id: Option<Uuid>,
    ) -> Result<TestResult, EngineError> {
        require(lesson_id, "lessonId")?;
        require(user_code, "code")?;
        let started = Instant::now();

        let lesson = match self.lessons.get_lesson(lesson_id).await {
            Ok(Some(lesson)) => lesson,
            Ok(None) => {
                let e = EngineError::LessonNotFound(lesson_id.to_string());
                log::warn!("{}", e);
                return Ok(finish(TestResult::failure(e.label(), e.to_string()), started));
            }
            Err(e) => {
                log::error!("Failed to load lesson {}: {}", lesson_id, e);
                return Ok(finish(TestResult::failure(e.label(), e.to_string()), started));
            }
        };

        let code = match self.sanitizers.sanitize(user_code, &lesson.language) {
            Ok(code) => code,
            Err(e) if is_rejection(&e) => return Err(e),
            Err(e) => {
                log::warn!("Cannot grade lesson {}: {}", lesson_id, e);
                return Ok(finish(TestResult::failure(e.label(), e.to_string()), started));
            }
        };

        let requirements = &lesson.test_config.keyword_requirements;
        let keyword_validation = if requirements.is_empty() {
            None
        } else {
            log::info!(
                "Performing keyword validation for lesson {} with {} requirements",
                lesson.id,
                requirements.len()
            );
            Some(self.keywords.validate(code, &lesson.language, requirements))
        };

        if let Some(validation) = keyword_validation.as_ref().filter(|v| !v.is_valid) {
            log::warn!("Keyword validation failed for lesson {}", lesson.id);
            let mut result = TestResult::failure("Keyword Validation", validation.validation_message.clone());
            result.keyword_validation = keyword_validation.clone();
            return Ok(finish(result, started));
        }

        let mut result = self.executor.run(&lesson, code).await;
        result.keyword_validation = keyword_validation;

        if let (true, Some(user_id), Some(tracker)) = (result.success, user_id, &self.tracker) {
            match tracker.mark_completed(user_id, &lesson.id, user_code).await {
                Ok(()) => log::info!("Marked lesson {} as completed for user {}", lesson.id, user_id),
                Err(e) => log::error!(
                    "Failed to track progress for user {} on lesson {}: {}",
                    user_id,
                    lesson.id,
                    e
                ),
            }
        }
        Ok(result)
    }
}

fn finish(mut result: TestResult, started: Instant) -> TestResult {
    result.performance_metrics.total_ms = elapsed_ms(started);
    result
}

/// Both services plus the optional pool, wired from one configuration.
pub struct Engine {
    pub execution: CodeExecutionService,
    pub tests: CodeTestService,
    pool: Option<Arc<ContainerPool>>,
}

impl Engine {
    pub fn new(config: &EngineConfig, runtime: Arc<dyn ContainerRuntime>, lessons: Arc<dyn LessonProvider>) -> Self {
        let sanitizers = Arc::new(SanitizerRegistry::default());

        let code_executor = CodeExecutor::new(
            runtime.clone(),
            RunStrategyRegistry::with_images(&config.images.run),
            config.execution.clone(),
        );

        let pool = config.pool.enabled.then(|| {
            Arc::new(ContainerPool::new(
                runtime.clone(),
                config.pool.clone(),
                config.execution.work_root().join("pool"),
            ))
        });

        let mut test_executor = TestExecutor::new(
            runtime,
            TestStrategyRegistry::with_images(&config.images.test),
            config.execution.clone(),
        );
        if let Some(pool) = &pool {
            test_executor = test_executor.with_pool(pool.clone());
        }

        Self {
            execution: CodeExecutionService::new(sanitizers.clone(), code_executor),
            tests: CodeTestService::new(lessons, sanitizers, test_executor),
            pool,
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn CompletionTracker>) -> Self {
        self.tests = self.tests.with_tracker(tracker);
        self
    }

    pub fn pool(&self) -> Option<&Arc<ContainerPool>> {
        self.pool.as_ref()
    }

    /// Warms every configured pool key; failures are logged per key.
    pub async fn warm_up(&self) {
        let Some(pool) = &self.pool else {
            return;
        };
        for warmup in &pool.config().warmup {
            if let Err(e) = pool.initialize(&warmup.language, &warmup.framework, warmup.count).await {
                log::error!(
                    "Failed to warm pool {}/{}: {}",
                    warmup.language,
                    warmup.framework,
                    e
                );
            }
        }
    }

    pub async fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionConfig;
    use crate::keywords::KeywordRequirement;
    use crate::models::TestConfig;
    use crate::strategies::RESULTS_FILE;
    use crate::test_utils::MockRuntime;
    use std::sync::Mutex;

    const PYTEST_PASS: &str = r#"{"tests": [{"name": "test_add", "outcome": "passed"}],
        "summary": {"total": 1, "passed": 1, "failed": 0, "error": 0}}"#;

    #[derive(Default)]
    struct RecordingTracker {
        calls: Mutex<Vec<(Uuid, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl CompletionTracker for RecordingTracker {
        async fn mark_completed(&self, user_id: Uuid, lesson_id: &str, _code: &str) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push((user_id, lesson_id.to_string()));
            if self.fail {
                return Err(EngineError::SystemError("database offline".to_string()));
            }
            Ok(())
        }
    }

    fn lesson() -> Lesson {
        Lesson {
            id: "add".to_string(),
            language: "python".to_string(),
            test_config: TestConfig::new("pytest", "from solution import add\n\ndef test_add():\n    assert add(1, 2) == 3\n"),
        }
    }

    fn engine(mock: &Arc<MockRuntime>, root: &std::path::Path, lessons: Vec<Lesson>) -> Engine {
        let config = EngineConfig {
            execution: ExecutionConfig {
                work_root: Some(root.to_path_buf()),
                ..Default::default()
            },
            ..Default::default()
        };
        Engine::new(&config, mock.clone(), Arc::new(InMemoryLessons::new(lessons)))
    }

    #[tokio::test]
    async fn test_execute_code_requires_language() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRuntime::new());
        let engine = engine(&mock, root.path(), vec![]);

        let err = engine.execution.execute_code("", "print(1)").await.unwrap_err();

        assert!(matches!(err, EngineError::InvalidInput { param: "language" }));
        assert!(err.to_string().contains("language"));
        assert!(mock.created().is_empty());
    }

    #[tokio::test]
    async fn test_security_violation_propagates_before_execution() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRuntime::new());
        let engine = engine(&mock, root.path(), vec![]);

        let err = engine
            .execution
            .execute_code("python", "import os\nos.system('rm -rf /')")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Python code contains potentially unsafe operation"));
        assert!(mock.created().is_empty());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_go_sanitizes_but_does_not_execute() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRuntime::new());
        let engine = engine(&mock, root.path(), vec![]);

        let result = engine
            .execution
            .execute_code("go", "package main\nfunc main() {}")
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.stderr, "Language 'go' is not supported");
    }

    #[tokio::test]
    async fn test_unknown_language_is_a_result() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRuntime::new());
        let engine = engine(&mock, root.path(), vec![]);

        let result = engine.execution.execute_code("ruby", "puts 1").await.unwrap();
        assert!(!result.success);
        assert_eq!(result.stderr, "Language 'ruby' is not supported");
    }

    #[tokio::test]
    async fn test_missing_lesson() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRuntime::new());
        let engine = engine(&mock, root.path(), vec![]);

        let result = engine.tests.run_tests("nope", "x = 1", None).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.test_results[0].test_name, "Lesson Error");
        assert_eq!(result.test_results[0].message, "Lesson 'nope' not found");
    }

    #[tokio::test]
    async fn test_run_tests_requires_code() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRuntime::new());
        let engine = engine(&mock, root.path(), vec![lesson()]);

        let err = engine.tests.run_tests("add", "   ", None).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { param: "code" }));
    }

    #[tokio::test]
    async fn test_keyword_failure_returns_early() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRuntime::new());
        let mut lesson = lesson();
        lesson.test_config.keyword_requirements = vec![KeywordRequirement::new("lambda")];
        let engine = engine(&mock, root.path(), vec![lesson]);

        let result = engine
            .tests
            .run_tests("add", "def add(a, b): return a + b", None)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.test_results.len(), 1);
        assert_eq!(result.test_results[0].test_name, "Keyword Validation");
        assert_eq!(result.test_results[0].message, "Keyword validation failed. 1 error(s) found.");
        assert!(!result.keyword_validation.unwrap().is_valid);
        assert!(mock.created().is_empty());
    }

    #[tokio::test]
    async fn test_passing_run_attaches_keywords_and_tracks_completion() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRuntime::new().with_results_file(RESULTS_FILE, PYTEST_PASS));
        let mut lesson = lesson();
        lesson.test_config.keyword_requirements = vec![KeywordRequirement::new("return")];
        let tracker = Arc::new(RecordingTracker::default());
        let engine = engine(&mock, root.path(), vec![lesson]).with_tracker(tracker.clone());
        let user = Uuid::new_v4();

        let result = engine
            .tests
            .run_tests("add", "def add(a, b): return a + b", Some(user))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.keyword_validation.unwrap().is_valid);
        assert_eq!(*tracker.calls.lock().unwrap(), vec![(user, "add".to_string())]);
    }

    #[tokio::test]
    async fn test_tracking_failure_does_not_change_result() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRuntime::new().with_results_file(RESULTS_FILE, PYTEST_PASS));
        let tracker = Arc::new(RecordingTracker {
            fail: true,
            ..Default::default()
        });
        let engine = engine(&mock, root.path(), vec![lesson()]).with_tracker(tracker.clone());

        let result = engine
            .tests
            .run_tests("add", "def add(a, b): return a + b", Some(Uuid::new_v4()))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(tracker.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_run_is_not_tracked() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRuntime::new().failing_start());
        let tracker = Arc::new(RecordingTracker::default());
        let engine = engine(&mock, root.path(), vec![lesson()]).with_tracker(tracker.clone());

        let result = engine
            .tests
            .run_tests("add", "def add(a, b): return a + b", Some(Uuid::new_v4()))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(tracker.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_engine_with_pool_warms_configured_keys() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockRuntime::new());
        let mut config = EngineConfig::default();
        config.execution.work_root = Some(root.path().to_path_buf());
        config.pool.enabled = true;
        config.pool.warmup = vec![crate::config::PoolWarmup {
            language: "python".to_string(),
            framework: "pytest".to_string(),
            count: 2,
        }];
        let engine = Engine::new(&config, mock.clone(), Arc::new(InMemoryLessons::default()));

        engine.warm_up().await;
        assert_eq!(engine.pool().unwrap().idle_count("python", "pytest").await, 2);

        engine.shutdown().await;
        assert_eq!(mock.removed().len(), 2);
    }
}
