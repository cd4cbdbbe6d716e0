//! Jest grading for TypeScript and JavaScript lessons.

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

static COMPILER_ERROR: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r".*?error.*?:.*").ok());

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JestReport {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    num_total_tests: u32,
    #[serde(default)]
    num_passed_tests: u32,
    #[serde(default)]
    num_failed_tests: u32,
    #[serde(default)]
    test_results: Vec<JestFileResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JestFileResult {
    #[serde(default)]
    assertion_results: Vec<JestAssertion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JestAssertion {
    #[serde(default)]
    title: String,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    failure_messages: Vec<String>,
}

pub struct JestTestStrategy {
    language: Language,
    image: String,
}

impl JestTestStrategy {
    pub fn typescript(image: &str) -> Self {
        Self {
            language: Language::TypeScript,
            image: image.to_string(),
        }
    }

    pub fn javascript(image: &str) -> Self {
        Self {
            language: Language::JavaScript,
            image: image.to_string(),
        }
    }

    fn spec_file(&self) -> &'static str {
        match self.language {
            Language::JavaScript => "test.spec.js",
            _ => "test.spec.ts",
        }
    }

    fn jest_config(&self, timeout_ms: u64) -> String {
        match self.language {
            Language::JavaScript => format!(
                "module.exports = {{\n  testEnvironment: 'node',\n  testTimeout: {}}};",
                timeout_ms
            ),
            _ => format!(
                "module.exports = {{\n  preset: 'ts-jest',\n  testEnvironment: 'node',\n  testTimeout: {}}};",
                timeout_ms
            ),
        }
    }

    fn missing_results_message(stdout: &str, stderr: &str) -> String {
        if !stderr.is_empty() {
            return COMPILER_ERROR
                .as_ref()
                .and_then(|re| re.find(stderr))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| NO_RESULTS_MESSAGE.to_string());
        }
        if stdout.contains("Cannot find module") {
            format!("{} A required module could not be found.", NO_RESULTS_MESSAGE)
        } else if stdout.contains("SyntaxError") {
            format!("{} There is a syntax error in the code.", NO_RESULTS_MESSAGE)
        } else {
            NO_RESULTS_MESSAGE.to_string()
        }
    }

    /// Jest sometimes reports assertions without a usable name; borrow names
    /// from the lesson's configured test cases, position by position.
    fn fill_missing_names(results: &mut [TestCaseResult], test_config: &TestConfig) {
        for (index, (result, case)) in results.iter_mut().zip(&test_config.test_cases).enumerate() {
            if result.test_name.is_empty() {
                result.test_name = case
                    .display_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Test Case {}", index + 1));
            }
        }
    }
}

impl LanguageStrategy for JestTestStrategy {
    fn language(&self) -> Language {
        self.language
    }

    fn name(&self) -> &'static str {
        match self.language {
            Language::JavaScript => "javascript-jest",
            _ => "typescript-jest",
        }
    }
}

#[async_trait]
impl TestStrategy for JestTestStrategy {
    async fn prepare_files(&self, working_dir: &Path, user_code: &str, lesson: &Lesson) -> Result<(), EngineError> {
        let config = &lesson.test_config;
        let spec = config.test_template.replace(USER_CODE_PLACEHOLDER, user_code);
        write_file(working_dir, self.spec_file(), &spec).await?;

        if config.timeout_ms != DEFAULT_TEST_TIMEOUT_MS {
            write_file(working_dir, "jest.config.js", &self.jest_config(config.timeout_ms)).await?;
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
        test_config: &TestConfig,
    ) -> TestResult {
        let mut result = TestResult {
            success: exit_code == 0,
            ..Default::default()
        };

        match read_results_file(working_dir).await {
            ResultsFile::Present(content) => match serde_json::from_str::<Option<JestReport>>(&content) {
                Ok(Some(report)) => {
                    log::info!(
                        "jest: {} tests, {} passed, {} failed",
                        report.num_total_tests,
                        report.num_passed_tests,
                        report.num_failed_tests
                    );
                    result.test_results = report
                        .test_results
                        .into_iter()
                        .flat_map(|file| file.assertion_results)
                        .map(|assertion| {
                            let name = if assertion.full_name.is_empty() {
                                assertion.title
                            } else {
                                assertion.full_name
                            };
                            if assertion.status == "passed" {
                                TestCaseResult::passed(name)
                            } else {
                                TestCaseResult::failed(name, assertion.failure_messages.join("\n"))
                            }
                        })
                        .collect();
                    result.success = report.success;
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
            result.success = false;
            if test_config.test_cases.is_empty() {
                result.test_results.push(default_test());
            } else {
                result.test_results = test_config
                    .test_cases
                    .iter()
                    .map(|case| {
                        TestCaseResult::failed(
                            case.display_name().unwrap_or("Test Case"),
                            "Test execution failed - no test results were produced",
                        )
                    })
                    .collect();
            }
        } else {
            Self::fill_missing_names(&mut result.test_results, test_config);
        }
        result
    }
}
