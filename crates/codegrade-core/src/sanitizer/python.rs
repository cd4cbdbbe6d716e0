use once_cell::sync::Lazy;

use super::{check_patterns, compile_patterns, CodeSanitizer, ForbiddenPattern};
use crate::errors::EngineError;
use crate::models::Language;

const PYTHON_PATTERNS: &[&str] = &[
    r"import\s+os",
    r"import\s+subprocess",
    r"import\s+sys",
    r"import\s+shutil",
    r"import\s+pathlib",
    r"__import__\s*\(",
    r"open\s*\(",
    r"file\s*\(",
    r"\.read\s*\(",
    r"\.write\s*\(",
    r"os\.system",
    r"os\.popen",
    r"os\.spawn",
    r"os\.exec",
    r"subprocess\.(?:call|Popen|run|check_output)",
    r"importlib",
    r"ctypes",
    r"pty",
    r"socket",
    r"pickle",
    r"marshal",
    r"builtins",
    r"__builtins__",
    r"__class__",
    r"__bases__",
    r"__subclasses__",
    r"__globals__",
    r"__code__",
    r"__reduce__",
    r"__import__",
    r"globals\(\)",
    r"locals\(\)",
    r"getattr\s*\(",
    r"setattr\s*\(",
    r"delattr\s*\(",
];

static PATTERNS: Lazy<Vec<ForbiddenPattern>> = Lazy::new(|| compile_patterns(PYTHON_PATTERNS));

pub struct PythonSanitizer;

impl CodeSanitizer for PythonSanitizer {
    fn language(&self) -> Language {
        Language::Python
    }

    fn check_language_rules(&self, code: &str) -> Result<(), EngineError> {
        check_patterns(code, &PATTERNS, Some(Language::Python.display_name()))
    }
}
