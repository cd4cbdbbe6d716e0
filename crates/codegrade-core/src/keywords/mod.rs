//! Keyword requirements for graded lessons.
//!
//! A lesson can demand that the submission uses (or avoids overusing) given
//! keywords. Each language analyzer first blanks out comments and literals,
//! then occurrences are counted line by line. The validator merges all
//! required keywords into one [`KeywordValidationResult`].

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::models::Language;

pub mod analyzers;

pub use analyzers::{CSharpKeywordAnalyzer, GoKeywordAnalyzer, PythonKeywordAnalyzer, ScriptKeywordAnalyzer};

/// Keyword recorded on the error entry when validation itself failed.
pub const SYSTEM_ERROR_KEYWORD: &str = "SYSTEM_ERROR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordRequirement {
    pub keyword: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub allow_partial_match: bool,
    #[serde(default = "default_min_occurrences")]
    pub min_occurrences: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_occurrences: Option<usize>,
}

impl KeywordRequirement {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            description: String::new(),
            required: true,
            case_sensitive: false,
            allow_partial_match: false,
            min_occurrences: default_min_occurrences(),
            max_occurrences: None,
        }
    }

    /// Regex source for this requirement. Whole-word matching only applies to
    /// keywords made purely of word characters.
    fn pattern(&self) -> String {
        let escaped = regex::escape(&self.keyword);
        let is_word = !self.keyword.is_empty() && self.keyword.chars().all(|c| c.is_alphanumeric() || c == '_');
        if !self.allow_partial_match && is_word {
            format!(r"\b{}\b", escaped)
        } else {
            escaped
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_min_occurrences() -> usize {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeywordErrorType {
    Missing,
    TooFew,
    TooMany,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordValidationError {
    pub keyword: String,
    pub error_message: String,
    pub error_type: KeywordErrorType,
    pub expected_occurrences: usize,
    pub actual_occurrences: usize,
}

/// One occurrence; line and columns are 1-based, `column_end` inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordMatch {
    pub keyword: String,
    pub line_number: usize,
    pub column_start: usize,
    pub column_end: usize,
    pub matched_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordValidationResult {
    pub is_valid: bool,
    pub errors: Vec<KeywordValidationError>,
    pub matches: Vec<KeywordMatch>,
    pub validation_message: String,
}

impl KeywordValidationResult {
    fn system_error(message: String) -> Self {
        Self {
            is_valid: false,
            errors: vec![KeywordValidationError {
                keyword: SYSTEM_ERROR_KEYWORD.to_string(),
                error_message: format!("System error during validation: {}", message),
                error_type: KeywordErrorType::Missing,
                expected_occurrences: 0,
                actual_occurrences: 0,
            }],
            matches: Vec::new(),
            validation_message: format!("Error during keyword validation: {}", message),
        }
    }
}

pub trait KeywordAnalyzer: Send + Sync {
    fn languages(&self) -> &[Language];

    /// Removes comments and literals; line structure is kept where possible.
    fn preprocess(&self, code: &str) -> String;

    fn find_matches(&self, code: &str, requirement: &KeywordRequirement) -> Result<Vec<KeywordMatch>, EngineError> {
        if requirement.keyword.is_empty() {
            return Err(EngineError::SystemError("keyword requirement has an empty keyword".to_string()));
        }
        let regex = RegexBuilder::new(&requirement.pattern())
            .case_insensitive(!requirement.case_sensitive)
            .build()
            .map_err(|e| EngineError::SystemError(format!("invalid keyword '{}': {}", requirement.keyword, e)))?;

        let processed = self.preprocess(code);
        let mut matches = Vec::new();
        for (index, line) in processed.split('\n').enumerate() {
            for found in regex.find_iter(line) {
                let column_start = line[..found.start()].chars().count() + 1;
                let width = found.as_str().chars().count();
                matches.push(KeywordMatch {
                    keyword: requirement.keyword.clone(),
                    line_number: index + 1,
                    column_start,
                    column_end: column_start + width.saturating_sub(1),
                    matched_text: found.as_str().to_string(),
                });
            }
        }
        Ok(matches)
    }

    fn validate(&self, code: &str, requirement: &KeywordRequirement) -> Result<KeywordValidationResult, EngineError> {
        let matches = self.find_matches(code, requirement)?;
        let found = matches.len();
        let mut errors = Vec::new();

        if found < requirement.min_occurrences {
            errors.push(KeywordValidationError {
                keyword: requirement.keyword.clone(),
                error_message: format!(
                    "Keyword '{}' must appear at least {} time(s), but found {}",
                    requirement.keyword, requirement.min_occurrences, found
                ),
                error_type: if found == 0 {
                    KeywordErrorType::Missing
                } else {
                    KeywordErrorType::TooFew
                },
                expected_occurrences: requirement.min_occurrences,
                actual_occurrences: found,
            });
        }
        if let Some(max) = requirement.max_occurrences {
            if found > max {
                errors.push(KeywordValidationError {
                    keyword: requirement.keyword.clone(),
                    error_message: format!(
                        "Keyword '{}' must appear at most {} time(s), but found {}",
                        requirement.keyword, max, found
                    ),
                    error_type: KeywordErrorType::TooMany,
                    expected_occurrences: max,
                    actual_occurrences: found,
                });
            }
        }

        let is_valid = errors.is_empty();
        let validation_message = if is_valid {
            format!(
                "Keyword '{}' validation passed ({} occurrence(s) found)",
                requirement.keyword, found
            )
        } else {
            String::new()
        };
        Ok(KeywordValidationResult {
            is_valid,
            errors,
            matches,
            validation_message,
        })
    }
}

/// Registry of analyzers, one per language.
pub struct KeywordValidator {
    analyzers: Vec<Box<dyn KeywordAnalyzer>>,
}

impl Default for KeywordValidator {
    fn default() -> Self {
        Self::new(vec![
            Box::new(PythonKeywordAnalyzer),
            Box::new(CSharpKeywordAnalyzer),
            Box::new(ScriptKeywordAnalyzer),
            Box::new(GoKeywordAnalyzer),
        ])
    }
}

impl KeywordValidator {
    pub fn new(analyzers: Vec<Box<dyn KeywordAnalyzer>>) -> Self {
        Self { analyzers }
    }

    fn analyzer(&self, language: &str) -> Result<&dyn KeywordAnalyzer, EngineError> {
        self.analyzers
            .iter()
            .find(|a| a.languages().iter().any(|l| l.matches(language)))
            .map(|a| a.as_ref())
            .ok_or_else(|| {
                let supported: Vec<&str> = self
                    .analyzers
                    .iter()
                    .flat_map(|a| a.languages().iter().map(|l| l.key()))
                    .collect();
                log::debug!("Keyword analyzers available for: {}", supported.join(", "));
                EngineError::UnsupportedLanguage(language.to_string())
            })
    }

    /// Validates every required keyword. Never fails: an unsupported
    /// language or a broken requirement becomes an invalid result.
    pub fn validate(&self, code: &str, language: &str, requirements: &[KeywordRequirement]) -> KeywordValidationResult {
        match self.try_validate(code, language, requirements) {
            Ok(result) => {
                if result.is_valid {
                    log::info!("Keyword validation passed for {} code", language);
                } else {
                    log::warn!(
                        "Keyword validation failed for {} code with {} errors",
                        language,
                        result.errors.len()
                    );
                }
                result
            }
            Err(e) => {
                log::error!("Error during keyword validation for {}: {}", language, e);
                KeywordValidationResult::system_error(e.to_string())
            }
        }
    }

    fn try_validate(
        &self,
        code: &str,
        language: &str,
        requirements: &[KeywordRequirement],
    ) -> Result<KeywordValidationResult, EngineError> {
        let analyzer = self.analyzer(language)?;
        let mut overall = KeywordValidationResult {
            is_valid: true,
            ..Default::default()
        };

        for requirement in requirements.iter().filter(|r| r.required) {
            let result = analyzer.validate(code, requirement)?;
            overall.is_valid &= result.is_valid;
            overall.matches.extend(result.matches);
            overall.errors.extend(result.errors);
        }

        overall.validation_message = if overall.is_valid {
            "All required keywords found. Validation passed.".to_string()
        } else {
            format!("Keyword validation failed. {} error(s) found.", overall.errors.len())
        };
        Ok(overall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirement(keyword: &str, min: usize) -> KeywordRequirement {
        KeywordRequirement {
            case_sensitive: true,
            min_occurrences: min,
            ..KeywordRequirement::new(keyword)
        }
    }

    #[test]
    fn test_typescript_word_and_symbol_keywords() {
        let code = "function reverseArray<T>(arr: T[]): T[] {\n    return arr.slice().reverse();\n}\n\n\
                    function findMax(arr: number[]): number | undefined {\n    if (arr.length === 0) return undefined;\n    return Math.max(...arr);\n}\n\n\
                    function sumArray(arr: number[]): number {\n    return arr.reduce((sum, num) => sum + num, 0);\n}";
        let result = KeywordValidator::default().validate(
            code,
            "typescript",
            &[requirement("function", 3), requirement(":", 5)],
        );

        assert!(result.is_valid);
        assert!(result.errors.is_empty());
        assert_eq!(result.matches.iter().filter(|m| m.keyword == "function").count(), 3);
        assert!(result.matches.iter().filter(|m| m.keyword == ":").count() >= 5);
        assert_eq!(result.validation_message, "All required keywords found. Validation passed.");
    }

    #[test]
    fn test_missing_keyword() {
        let code = "function reverseArray(arr) {\n    return arr.slice().reverse();\n}";
        let result = KeywordValidator::default().validate(code, "javascript", &[requirement(":", 5)]);

        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].error_type, KeywordErrorType::Missing);
        assert_eq!(
            result.errors[0].error_message,
            "Keyword ':' must appear at least 5 time(s), but found 0"
        );
        assert_eq!(result.validation_message, "Keyword validation failed. 1 error(s) found.");
    }

    #[test]
    fn test_csharp_array_keyword() {
        let code = "public class TestClass\n{\n    public int[] ReverseArray(int[] array)\n    {\n        return array.Reverse().ToArray();\n    }\n}";
        let result = KeywordValidator::default().validate(
            code,
            "csharp",
            &[requirement("public", 2), requirement("int[]", 2)],
        );

        assert!(result.is_valid);
        assert_eq!(result.matches.iter().filter(|m| m.keyword == "public").count(), 2);
    }

    #[test]
    fn test_word_boundaries_and_partial_match() {
        let code = "for item in items:\n    format(item)\n";
        let strict = KeywordValidator::default().validate(code, "python", &[requirement("for", 2)]);
        assert!(!strict.is_valid);
        assert_eq!(strict.errors[0].error_type, KeywordErrorType::TooFew);

        let mut partial = requirement("for", 2);
        partial.allow_partial_match = true;
        let result = KeywordValidator::default().validate(code, "python", &[partial]);
        assert!(result.is_valid);
    }

    #[test]
    fn test_case_insensitive_by_default() {
        let code = "SELECT = 1\nselect = 2\n";
        let result = KeywordValidator::default().validate(
            code,
            "python",
            &[KeywordRequirement {
                min_occurrences: 2,
                ..KeywordRequirement::new("select")
            }],
        );
        assert!(result.is_valid);
    }

    #[test]
    fn test_too_many_and_positions() {
        let code = "x = 1\nprint(x); print(x)\n";
        let mut req = requirement("print", 1);
        req.max_occurrences = Some(1);

        let result = KeywordValidator::default().validate(code, "python", &[req]);

        assert!(!result.is_valid);
        assert_eq!(result.errors[0].error_type, KeywordErrorType::TooMany);
        assert_eq!(result.errors[0].expected_occurrences, 1);
        assert_eq!(result.errors[0].actual_occurrences, 2);
        assert_eq!(result.matches[0].line_number, 2);
        assert_eq!(result.matches[0].column_start, 1);
        assert_eq!(result.matches[0].column_end, 5);
        assert_eq!(result.matches[1].column_start, 11);
    }

    #[test]
    fn test_optional_requirements_are_skipped() {
        let mut optional = requirement("lambda", 1);
        optional.required = false;
        let result = KeywordValidator::default().validate("x = 1", "python", &[optional]);
        assert!(result.is_valid);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn test_unsupported_language_is_invalid_result() {
        let result = KeywordValidator::default().validate("puts 1", "ruby", &[requirement("puts", 1)]);

        assert!(!result.is_valid);
        assert_eq!(result.errors[0].keyword, SYSTEM_ERROR_KEYWORD);
        assert!(result.validation_message.starts_with("Error during keyword validation:"));
        assert!(result.validation_message.contains("ruby"));
    }

    #[test]
    fn test_requirement_deserializes_camel_case() {
        let req: KeywordRequirement = serde_json::from_str(
            r#"{"keyword": "for", "caseSensitive": true, "allowPartialMatch": true, "maxOccurrences": 3}"#,
        )
        .unwrap();
        assert!(req.required);
        assert!(req.case_sensitive);
        assert!(req.allow_partial_match);
        assert_eq!(req.min_occurrences, 1);
        assert_eq!(req.max_occurrences, Some(3));
    }
}
