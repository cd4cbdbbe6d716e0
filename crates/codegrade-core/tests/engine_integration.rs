use async_trait::async_trait;
use codegrade_core::errors::RuntimeError;
use codegrade_core::runtime::{ContainerLogs, EnvironmentDescriptor, ExecOutput};
use codegrade_core::{
    ContainerRuntime, Engine, EngineConfig, EngineError, ExecutionConfig, InMemoryLessons, Lesson, TestCase,
    TestConfig,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const JEST_REPORT: &str = r#"{
  "success": false,
  "testResults": [{
    "assertionResults": [
      {"title": "adds", "fullName": "sum adds", "status": "passed", "failureMessages": []},
      {"title": "negatives", "fullName": "sum negatives", "status": "failed",
       "failureMessages": ["expected -2", "received 0"]}
    ]
  }]
}"#;

/// Behaves like a container host whose images always succeed, except that
/// code containing `LOOP_FOREVER` never terminates.
#[derive(Default)]
struct ScriptedRuntime {
    dirs: Mutex<HashMap<String, PathBuf>>,
    created: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    counter: Mutex<usize>,
}

impl ScriptedRuntime {
    fn host_dir(&self, id: &str) -> PathBuf {
        self.dirs.lock().unwrap()[id].clone()
    }

    fn staged_text(&self, id: &str) -> String {
        let mut text = String::new();
        for entry in std::fs::read_dir(self.host_dir(id)).unwrap().flatten() {
            text.push_str(&std::fs::read_to_string(entry.path()).unwrap_or_default());
        }
        text
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn ensure_image(&self, _image: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn create_container(&self, descriptor: &EnvironmentDescriptor) -> Result<String, RuntimeError> {
        let id = {
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            format!("env-{}", counter)
        };
        self.dirs.lock().unwrap().insert(id.clone(), descriptor.host_dir.clone());
        self.created.lock().unwrap().push(id.clone());
        Ok(id)
    }

    async fn start_container(&self, _id: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError> {
        let staged = self.staged_text(id);
        if staged.contains("LOOP_FOREVER") {
            std::future::pending::<()>().await;
        }
        if staged.contains("describe(") {
            std::fs::write(self.host_dir(id).join("results.json"), JEST_REPORT).unwrap();
            return Ok(1);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(0)
    }

    async fn collect_logs(&self, id: &str) -> Result<ContainerLogs, RuntimeError> {
        let staged = self.staged_text(id);
        let stdout = if staged.contains("Hello, World!") {
            "Hello, World!".to_string()
        } else {
            String::new()
        };
        Ok(ContainerLogs {
            stdout,
            stderr: String::new(),
        })
    }

    async fn exec(&self, _id: &str, _command: &[String], _working_dir: Option<&str>) -> Result<ExecOutput, RuntimeError> {
        Ok(ExecOutput::default())
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.removed.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

fn sum_lesson() -> Lesson {
    let mut config = TestConfig::new(
        "jest",
        "__USER_CODE__\n\ndescribe('sum', () => {\n  it('adds', () => expect(sum(1, 2)).toBe(3));\n});\n",
    );
    config.test_cases = vec![TestCase {
        name: Some("adds".to_string()),
        ..Default::default()
    }];
    Lesson {
        id: "sum".to_string(),
        language: "typescript".to_string(),
        test_config: config,
    }
}

fn engine(runtime: &Arc<ScriptedRuntime>, root: &std::path::Path) -> Engine {
    let config = EngineConfig {
        execution: ExecutionConfig {
            playground_timeout_ms: 200,
            playground_grace_ms: 50,
            work_root: Some(root.to_path_buf()),
            ..Default::default()
        },
        ..Default::default()
    };
    Engine::new(&config, runtime.clone(), Arc::new(InMemoryLessons::new([sum_lesson()])))
}

#[tokio::test]
async fn test_csharp_hello_world() {
    let root = tempfile::tempdir().unwrap();
    let runtime = Arc::new(ScriptedRuntime::default());
    let engine = engine(&runtime, root.path());

    let result = engine
        .execution
        .execute_code("csharp", "Console.WriteLine(\"Hello, World!\");")
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.stdout, "Hello, World!");
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn test_empty_language_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let runtime = Arc::new(ScriptedRuntime::default());
    let engine = engine(&runtime, root.path());

    let err = engine.execution.execute_code("", "print(1)").await.unwrap_err();

    assert!(matches!(err, EngineError::InvalidInput { param: "language" }));
}

#[tokio::test]
async fn test_typescript_lesson_is_graded() {
    let root = tempfile::tempdir().unwrap();
    let runtime = Arc::new(ScriptedRuntime::default());
    let engine = engine(&runtime, root.path());

    let result = engine
        .tests
        .run_tests("sum", "function sum(a: number, b: number) { return a + b; }", None)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.test_results.len(), 2);
    assert_eq!(result.test_results[0].test_name, "sum adds");
    assert!(result.test_results[0].passed);
    assert_eq!(result.test_results[1].message, "expected -2\nreceived 0");

    let json = serde_json::to_value(&result).unwrap();
    assert!(json["performanceMetrics"]["totalMs"].is_u64());
    assert_eq!(json["testResults"][0]["testName"], "sum adds");
}

#[tokio::test]
async fn test_infinite_loop_times_out_and_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let runtime = Arc::new(ScriptedRuntime::default());
    let engine = engine(&runtime, root.path());

    let result = engine
        .execution
        .execute_code("javascript", "while (true) {} // LOOP_FOREVER")
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.stderr.contains("infinite loop"));
    assert_eq!(*runtime.created.lock().unwrap(), *runtime.removed.lock().unwrap());
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_concurrent_requests_leak_nothing() {
    let root = tempfile::tempdir().unwrap();
    let runtime = Arc::new(ScriptedRuntime::default());
    let engine = Arc::new(engine(&runtime, root.path()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let language = if i % 2 == 0 { "python" } else { "typescript" };
            engine.execution.execute_code(language, "print(1)").await
        }));
    }
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert!(result.performance_metrics.total_ms >= result.performance_metrics.execution_ms);
    }

    let mut created = runtime.created.lock().unwrap().clone();
    let mut removed = runtime.removed.lock().unwrap().clone();
    created.sort();
    removed.sort();
    assert_eq!(created.len(), 8);
    assert_eq!(created, removed);
}

#[tokio::test]
async fn test_security_violation_never_reaches_runtime() {
    let root = tempfile::tempdir().unwrap();
    let runtime = Arc::new(ScriptedRuntime::default());
    let engine = engine(&runtime, root.path());

    let err = engine
        .tests
        .run_tests("sum", "const key = process.env.SECRET;", None)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::SecurityViolation { .. }));
    assert!(runtime.created.lock().unwrap().is_empty());
}
