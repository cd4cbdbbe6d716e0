//! pytest grading for Python lessons.
//!
//! Unlike the other graded strategies the template is not spliced: the user
//! code becomes `solution.py` and the lesson template `test_solution.py`,
//! which imports from it.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

use super::{
    default_test, parse_exception, parser_error, read_results_file, test_environment, write_file,
    LanguageStrategy, ResultsFile, TestStrategy, NO_RESULTS_MESSAGE,
};
use crate::errors::EngineError;
use crate::models::{Language, Lesson, TestCaseResult, TestConfig, TestResult, DEFAULT_TEST_TIMEOUT_MS};
use crate::runtime::EnvironmentDescriptor;

static SYNTAX_ERROR: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(SyntaxError:.+?)(?:\n|$)").ok());
static IMPORT_ERROR: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(ImportError:.+?)(?:\n|$)").ok());

#[derive(Debug, Deserialize)]
struct PytestReport {
    #[serde(default)]
    tests: Vec<PytestCase>,
    #[serde(default)]
    summary: PytestSummary,
}

#[derive(Debug, Default, Deserialize)]
struct PytestSummary {
    #[serde(default)]
    total: u32,
    #[serde(default)]
    passed: u32,
    #[serde(default)]
    failed: u32,
    #[serde(default)]
    error: u32,
}

#[derive(Debug, Deserialize)]
struct PytestCase {
    #[serde(default)]
    name: String,
    #[serde(default)]
    outcome: String,
    #[serde(default)]
    message: Option<String>,
}

pub struct PytestTestStrategy {
    image: String,
}

impl PytestTestStrategy {
    pub fn new(image: &str) -> Self {
        Self {
            image: image.to_string(),
        }
    }

    fn first_capture(re: &Lazy<Option<Regex>>, text: &str) -> Option<String> {
        re.as_ref()?
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    }

    fn missing_results_message(stderr: &str) -> String {
        if stderr.is_empty() {
            return NO_RESULTS_MESSAGE.to_string();
        }
        Self::first_capture(&SYNTAX_ERROR, stderr)
            .or_else(|| Self::first_capture(&IMPORT_ERROR, stderr))
            .unwrap_or_else(|| NO_RESULTS_MESSAGE.to_string())
    }
}

impl LanguageStrategy for PytestTestStrategy {
    fn language(&self) -> Language {
        Language::Python
    }

    fn name(&self) -> &'static str {
        "pytest"
    }
}

#[async_trait]
impl TestStrategy for PytestTestStrategy {
    async fn prepare_files(&self, working_dir: &Path, user_code: &str, lesson: &Lesson) -> Result<(), EngineError> {
        let config = &lesson.test_config;
        write_file(working_dir, "solution.py", user_code).await?;
        write_file(working_dir, "test_solution.py", &config.test_template).await?;

        if config.timeout_ms != DEFAULT_TEST_TIMEOUT_MS {
            let seconds = config.timeout_ms.div_ceil(1000);
            write_file(working_dir, "pytest.ini", &format!("[pytest]\ntimeout = {}\n", seconds)).await?;
        }
        Ok(())
    }

    fn build_environment(&self, name: &str, working_dir: &Path, lesson: &Lesson) -> EnvironmentDescriptor {
        test_environment(&self.image, name, working_dir, lesson)
    }

    async fn parse_result(
        &self,
        _stdout: &str,
        stderr: &str,
        exit_code: i64,
        _elapsed_ms: u64,
        working_dir: &Path,
        _test_config: &TestConfig,
    ) -> TestResult {
        let mut result = TestResult {
            success: exit_code == 0,
            ..Default::default()
        };

        match read_results_file(working_dir).await {
            ResultsFile::Present(content) => match serde_json::from_str::<Option<PytestReport>>(&content) {
                Ok(Some(report)) => {
                    log::info!(
                        "pytest: {} tests, {} passed, {} failed, {} errors",
                        report.summary.total,
                        report.summary.passed,
                        report.summary.failed,
                        report.summary.error
                    );
                    result.test_results = report
                        .tests
                        .into_iter()
                        .map(|case| {
                            if case.outcome == "passed" {
                                TestCaseResult::passed(case.name)
                            } else {
                                let message = case.message.unwrap_or_else(|| "Test failed".to_string());
                                TestCaseResult::failed(case.name, message)
                            }
                        })
                        .collect();
                    result.success = report.summary.failed == 0 && report.summary.error == 0;
                }
                Ok(None) => {
                    result.test_results.push(parser_error());
                    result.success = false;
                }
                Err(e) => {
                    result.test_results.push(parse_exception(e));
                    result.success = false;
                }
            },
            ResultsFile::Missing => {
                result.test_results.push(TestCaseResult::failed(
                    "Execution Error",
                    Self::missing_results_message(stderr),
                ));
                result.success = false;
            }
            ResultsFile::Unreadable(reason) => {
                result.test_results.push(parse_exception(reason));
                result.success = false;
            }
        }

        if result.test_results.is_empty() {
            result.test_results.push(default_test());
            result.success = false;
        }
        result
    }
}
