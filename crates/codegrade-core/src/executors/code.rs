use std::sync::Arc;
use std::time::Instant;

use super::sandbox::{create_working_dir, elapsed_ms, remove_working_dir, run_environment, RunOutcome};
use crate::config::ExecutionConfig;
use crate::errors::EngineError;
use crate::models::{ExecutionResult, PerformanceMetrics};
use crate::runtime::ContainerRuntime;
use crate::strategies::{RunStrategy, RunStrategyRegistry};

pub const PLAYGROUND_TIMEOUT_MESSAGE: &str =
    "Code execution timed out. Your code may have an infinite loop or is taking too long to complete.";

/// Runs user code once in a throwaway environment and reports its output.
pub struct CodeExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    strategies: RunStrategyRegistry,
    config: ExecutionConfig,
}

impl CodeExecutor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, strategies: RunStrategyRegistry, config: ExecutionConfig) -> Self {
        Self {
            runtime,
            strategies,
            config,
        }
    }

    pub fn strategies(&self) -> &RunStrategyRegistry {
        &self.strategies
    }

    /// Never fails: every problem is reported through the returned result.
    pub async fn execute(&self, language: &str, code: &str) -> ExecutionResult {
        let total = Instant::now();
        let mut metrics = PerformanceMetrics::default();

        let mut result = match self.strategies.get_strategy(language) {
            Ok(strategy) => match self.execute_with(strategy.as_ref(), language, code, &mut metrics).await {
                Ok(result) => result,
                Err(e) => {
                    log::error!("Execution of {} code failed: {}", language, e);
                    ExecutionResult::failure(e.to_string())
                }
            },
            Err(e) => {
                log::warn!("{}", e);
                ExecutionResult::failure(e.to_string())
            }
        };

        metrics.total_ms = elapsed_ms(total);
        if result.execution_time_ms == 0 {
            result.execution_time_ms = metrics.total_ms;
        }
        result.performance_metrics = metrics;
        result
    }

    async fn execute_with(
        &self,
        strategy: &dyn RunStrategy,
        language: &str,
        code: &str,
        metrics: &mut PerformanceMetrics,
    ) -> Result<ExecutionResult, EngineError> {
        let preparation = Instant::now();
        let working_dir = create_working_dir(&self.config.work_root(), "playground-")?;

        let staged = tokio::fs::write(working_dir.path().join(strategy.source_file_name(code)), code)
            .await
            .map_err(|e| EngineError::EnvironmentPreparation(format!("Failed to write source file: {}", e)));
        metrics.file_preparation_ms = elapsed_ms(preparation);

        let outcome = match staged {
            Ok(()) => {
                let name = format!("playground-{}", uuid::Uuid::new_v4());
                let descriptor = strategy.build_environment(&name, working_dir.path(), language);
                log::debug!("Running {} in {}", language, name);
                run_environment(&self.runtime, &descriptor, self.config.playground_deadline(), metrics).await
            }
            Err(e) => Err(e),
        };

        let result = match outcome {
            Ok(RunOutcome::Completed {
                exit_code,
                logs,
                elapsed_ms,
            }) => Ok(strategy
                .parse_result(logs.stdout, logs.stderr, exit_code, elapsed_ms, working_dir.path())
                .await),
            Ok(RunOutcome::TimedOut { logs }) => Ok(ExecutionResult {
                stdout: logs.stdout,
                ..ExecutionResult::failure(PLAYGROUND_TIMEOUT_MESSAGE)
            }),
            Err(e) => Err(e),
        };

        let cleanup = Instant::now();
        remove_working_dir(working_dir);
        metrics.cleanup_ms += elapsed_ms(cleanup);
        result
    }
}
