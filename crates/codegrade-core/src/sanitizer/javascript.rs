use once_cell::sync::Lazy;

use super::{check_patterns, compile_patterns, CodeSanitizer, ForbiddenPattern};
use crate::errors::EngineError;
use crate::models::Language;

// Module loading, Node core modules accessed by member or index, and the
// Function constructor.
const JAVASCRIPT_PATTERNS: &[&str] = &[
    r"require\s*\(",
    r"import\s*\(",
    r"process",
    r"child_process",
    r"fs\.",
    r"fs\[",
    r"path\.",
    r"path\[",
    r"net\.",
    r"net\[",
    r"http\.",
    r"http\[",
    r"https\.",
    r"https\[",
    r"os\.",
    r"os\[",
    r"crypto\.",
    r"crypto\[",
    r"zlib\.",
    r"zlib\[",
    r"dns\.",
    r"dns\[",
    r"dgram\.",
    r"dgram\[",
    r"cluster\.",
    r"cluster\[",
    r"readline\.",
    r"readline\[",
    r"repl\.",
    r"repl\[",
    r"vm\.",
    r"vm\[",
    r"v8\.",
    r"v8\[",
    r"tls\.",
    r"tls\[",
    r"stream\.",
    r"stream\[",
    r"querystring\.",
    r"querystring\[",
    r"punycode\.",
    r"punycode\[",
    r"url\.",
    r"url\[",
    r"util\.",
    r"util\[",
    r"buffer\.",
    r"buffer\[",
    r"assert\.",
    r"assert\[",
    r"events\.",
    r"events\[",
    r"constants\.",
    r"constants\[",
    r"domain\.",
    r"domain\[",
    r"string_decoder\.",
    r"string_decoder\[",
    r"timers\.",
    r"timers\[",
    r"tty\.",
    r"tty\[",
    r"worker_threads\.",
    r"worker_threads\[",
    r"perf_hooks\.",
    r"perf_hooks\[",
    r"inspector\.",
    r"inspector\[",
    r"async_hooks\.",
    r"async_hooks\[",
    r"trace_events\.",
    r"trace_events\[",
    r"wasi\.",
    r"wasi\[",
    r"diagnostics_channel\.",
    r"diagnostics_channel\[",
    r"performance\.",
    r"performance\[",
    r"module\.",
    r"module\[",
    r"__dirname",
    r"__filename",
    r"new\s+Function\s*\(",
    r"Function\s*\(",
];

static PATTERNS: Lazy<Vec<ForbiddenPattern>> =
    Lazy::new(|| compile_patterns(JAVASCRIPT_PATTERNS));

pub struct JavaScriptSanitizer;

impl CodeSanitizer for JavaScriptSanitizer {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn check_language_rules(&self, code: &str) -> Result<(), EngineError> {
        check_patterns(code, &PATTERNS, Some(Language::JavaScript.display_name()))
    }
}
