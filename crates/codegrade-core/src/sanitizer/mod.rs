//! Static screening of untrusted source code
//!
//! A sanitizer is a pure accept-or-reject gate that runs before any file is
//! staged or any environment exists. Each language sanitizer first applies
//! the common pattern list to the raw text and then its own list; the first
//! case-insensitive match fails with `EngineError::SecurityViolation`.
//!
//! The screening is best-effort. It blocks the obvious escape hatches of each
//! language and leaves real isolation to the container.

pub mod csharp;
pub mod go;
pub mod javascript;
pub mod python;
pub mod typescript;

pub use csharp::CSharpSanitizer;
pub use go::GoSanitizer;
pub use javascript::JavaScriptSanitizer;
pub use python::PythonSanitizer;
pub use typescript::TypeScriptSanitizer;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::errors::EngineError;
use crate::models::Language;

/// Dynamic evaluation, reflective process spawning and environment access.
const COMMON_PATTERNS: &[&str] = &[
    r"eval\s*\(",
    r"exec\s*\(",
    r"Runtime\.getRuntime\(\)\.exec",
    r"WebAssembly",
    r"Deno\.run",
    r"java\.lang\.Runtime",
    r"process\.env",
];

static COMMON: Lazy<Vec<ForbiddenPattern>> = Lazy::new(|| compile_patterns(COMMON_PATTERNS));

/// A compiled forbidden pattern together with its source text, which is what
/// violation messages report.
#[derive(Debug)]
pub struct ForbiddenPattern {
    source: &'static str,
    regex: Regex,
}

impl ForbiddenPattern {
    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn is_match(&self, code: &str) -> bool {
        self.regex.is_match(code)
    }
}

pub(crate) fn compile_patterns(patterns: &[&'static str]) -> Vec<ForbiddenPattern> {
    patterns
        .iter()
        .filter_map(|source| {
            match RegexBuilder::new(source).case_insensitive(true).build() {
                Ok(regex) => Some(ForbiddenPattern { source, regex }),
                Err(e) => {
                    log::error!("Skipping invalid sanitizer pattern '{}': {}", source, e);
                    None
                }
            }
        })
        .collect()
}

/// Fails on the first pattern that matches `code`.
pub(crate) fn check_patterns(
    code: &str,
    patterns: &[ForbiddenPattern],
    language_label: Option<&str>,
) -> Result<(), EngineError> {
    match patterns.iter().find(|p| p.is_match(code)) {
        Some(pattern) => {
            log::warn!(
                "Rejected {} code: matched forbidden pattern '{}'",
                language_label.unwrap_or("submitted"),
                pattern.source
            );
            Err(EngineError::security_violation(language_label, pattern.source))
        }
        None => Ok(()),
    }
}

pub(crate) fn check_common(code: &str) -> Result<(), EngineError> {
    check_patterns(code, &COMMON, None)
}

pub trait CodeSanitizer: Send + Sync {
    fn language(&self) -> Language;

    fn supports(&self, language: &str) -> bool {
        self.language().matches(language)
    }

    /// Language-specific checks, run after the common list has passed.
    fn check_language_rules(&self, code: &str) -> Result<(), EngineError>;

    fn sanitize<'a>(&self, code: &'a str) -> Result<&'a str, EngineError> {
        if code.trim().is_empty() {
            return Err(EngineError::InvalidInput { param: "code" });
        }
        check_common(code)?;
        self.check_language_rules(code)?;
        Ok(code)
    }
}

/// Ordered list of sanitizers, first match wins.
pub struct SanitizerRegistry {
    sanitizers: Vec<Box<dyn CodeSanitizer>>,
}

impl Default for SanitizerRegistry {
    fn default() -> Self {
        Self::new(vec![
            Box::new(TypeScriptSanitizer::new()),
            Box::new(JavaScriptSanitizer),
            Box::new(CSharpSanitizer),
            Box::new(PythonSanitizer),
            Box::new(GoSanitizer),
        ])
    }
}

impl SanitizerRegistry {
    pub fn new(sanitizers: Vec<Box<dyn CodeSanitizer>>) -> Self {
        Self { sanitizers }
    }

    pub fn get_sanitizer(&self, language: &str) -> Result<&dyn CodeSanitizer, EngineError> {
        if language.trim().is_empty() {
            return Err(EngineError::InvalidInput { param: "language" });
        }
        self.sanitizers
            .iter()
            .find(|s| s.supports(language))
            .map(|s| s.as_ref())
            .ok_or_else(|| EngineError::UnsupportedLanguage(language.to_string()))
    }

    /// Accepts `code` unchanged or rejects it.
    pub fn sanitize<'a>(&self, code: &'a str, language: &str) -> Result<&'a str, EngineError> {
        if code.trim().is_empty() {
            return Err(EngineError::InvalidInput { param: "code" });
        }
        self.get_sanitizer(language)?.sanitize(code)
    }
}
