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
use crate::models::{
    Language, Lesson, TestCaseResult, TestConfig, TestResult, DEFAULT_TEST_TIMEOUT_MS,
    USER_CODE_PLACEHOLDER,
};
use crate::runtime::EnvironmentDescriptor;

static BUILD_ERROR: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r".*?error.*?:.*").ok());

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XunitReport {
    #[serde(default)]
    total: u32,
    #[serde(default)]
    passed: u32,
    #[serde(default)]
    failed: u32,
    #[serde(default)]
    test_cases: Vec<XunitCase>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XunitCase {
    #[serde(default)]
    name: String,
    #[serde(default)]
    result: String,
    #[serde(default)]
    error_message: Option<String>,
}

/// xUnit grading for C# lessons. The spliced template is compiled by the
/// image's test project as `UserSolution.cs`.
pub struct XunitTestStrategy {
    image: String,
}

impl XunitTestStrategy {
    pub fn new(image: &str) -> Self {
        Self {
            image: image.to_string(),
        }
    }

    fn missing_results_message(stdout: &str, stderr: &str) -> String {
        if !stderr.is_empty() {
            return BUILD_ERROR
                .as_ref()
                .and_then(|re| re.find(stderr))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| NO_RESULTS_MESSAGE.to_string());
        }
        if stdout.contains("Could not load file or assembly") {
            format!("{} A required assembly could not be found.", NO_RESULTS_MESSAGE)
        } else if stdout.contains("Syntax error") {
            format!("{} There is a syntax error in the code.", NO_RESULTS_MESSAGE)
        } else {
            NO_RESULTS_MESSAGE.to_string()
        }
    }
}

impl LanguageStrategy for XunitTestStrategy {
    fn language(&self) -> Language {
        Language::CSharp
    }

    fn name(&self) -> &'static str {
        "xunit"
    }
}

#[async_trait]
impl TestStrategy for XunitTestStrategy {
    async fn prepare_files(&self, working_dir: &Path, user_code: &str, lesson: &Lesson) -> Result<(), EngineError> {
        let config = &lesson.test_config;
        let source = config.test_template.replace(USER_CODE_PLACEHOLDER, user_code);
        write_file(working_dir, "UserSolution.cs", &source).await?;

        if config.timeout_ms != DEFAULT_TEST_TIMEOUT_MS {
            let runner_config = serde_json::json!({ "timeout": config.timeout_ms });
            write_file(working_dir, "test-config.json", &runner_config.to_string()).await?;
        }
        Ok(())
    }

    fn build_environment(&self, name: &str, working_dir: &Path, lesson: &Lesson) -> EnvironmentDescriptor {
        test_environment(&self.image, name, working_dir, lesson)
    }

    async fn parse_result(
        &self,
        stdout: &str,
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
            ResultsFile::Present(content) => match serde_json::from_str::<Option<XunitReport>>(&content) {
                Ok(Some(report)) => {
                    log::info!(
                        "xunit: {} tests, {} passed, {} failed",
                        report.total,
                        report.passed,
                        report.failed
                    );
                    result.test_results = report
                        .test_cases
                        .into_iter()
                        .map(|case| {
                            if case.result == "Pass" {
                                TestCaseResult::passed(case.name)
                            } else {
                                TestCaseResult::failed(case.name, case.error_message.unwrap_or_default())
                            }
                        })
                        .collect();
                    result.success = report.failed == 0;
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
                    Self::missing_results_message(stdout, stderr),
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
