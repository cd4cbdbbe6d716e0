//! TypeScript screening
//!
//! Comments are stripped before the TypeScript list runs so commented-out
//! imports do not trip it. Since TypeScript is a superset of JavaScript the
//! stripped text then goes through the common and JavaScript lists as well.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

use super::{check_common, check_patterns, compile_patterns, CodeSanitizer, ForbiddenPattern};
use super::javascript::JavaScriptSanitizer;
use crate::errors::EngineError;
use crate::models::Language;

const TYPESCRIPT_PATTERNS: &[&str] = &[
    r#"import\s+\*\s+as\s+fs\s+from\s+['"]fs['"]"#,
    r#"import\s+\*\s+as\s+path\s+from\s+['"]path['"]"#,
    r#"import\s+\*\s+as\s+child_process\s+from\s+['"]child_process['"]"#,
    r#"import\s+\{[^\}]*\}\s+from\s+['"]fs['"]"#,
    r#"import\s+\{[^\}]*\}\s+from\s+['"]path['"]"#,
    r#"import\s+\{[^\}]*\}\s+from\s+['"]child_process['"]"#,
    r#"import\s+fs\s+from\s+['"]fs['"]"#,
    r#"import\s+path\s+from\s+['"]path['"]"#,
    r#"import\s+child_process\s+from\s+['"]child_process['"]"#,
    r"namespace\s+process",
    r"declare\s+var\s+process",
    r"declare\s+let\s+process",
    r"declare\s+const\s+process",
    r"declare\s+namespace\s+process",
    r#"declare\s+module\s+['"]fs['"]"#,
    r#"declare\s+module\s+['"]path['"]"#,
    r#"declare\s+module\s+['"]child_process['"]"#,
    r#"declare\s+module\s+['"]os['"]"#,
    r#"declare\s+module\s+['"]net['"]"#,
    r#"declare\s+module\s+['"]http['"]"#,
    r#"declare\s+module\s+['"]https['"]"#,
    r#"declare\s+module\s+['"]crypto['"]"#,
    r#"declare\s+module\s+['"]zlib['"]"#,
    r#"declare\s+module\s+['"]dns['"]"#,
    r#"declare\s+module\s+['"]dgram['"]"#,
    r#"declare\s+module\s+['"]cluster['"]"#,
    r#"declare\s+module\s+['"]readline['"]"#,
    r#"declare\s+module\s+['"]repl['"]"#,
    r#"declare\s+module\s+['"]vm['"]"#,
    r#"declare\s+module\s+['"]v8['"]"#,
    r#"declare\s+module\s+['"]tls['"]"#,
    r#"declare\s+module\s+['"]stream['"]"#,
    r#"declare\s+module\s+['"]querystring['"]"#,
    r#"declare\s+module\s+['"]punycode['"]"#,
    r#"declare\s+module\s+['"]url['"]"#,
    r#"declare\s+module\s+['"]util['"]"#,
    r#"declare\s+module\s+['"]buffer['"]"#,
    r#"declare\s+module\s+['"]assert['"]"#,
    r#"declare\s+module\s+['"]events['"]"#,
    r#"declare\s+module\s+['"]constants['"]"#,
    r#"declare\s+module\s+['"]domain['"]"#,
    r#"declare\s+module\s+['"]string_decoder['"]"#,
    r#"declare\s+module\s+['"]timers['"]"#,
    r#"declare\s+module\s+['"]tty['"]"#,
    r#"declare\s+module\s+['"]worker_threads['"]"#,
    r#"declare\s+module\s+['"]perf_hooks['"]"#,
    r#"declare\s+module\s+['"]inspector['"]"#,
    r#"declare\s+module\s+['"]async_hooks['"]"#,
    r#"declare\s+module\s+['"]trace_events['"]"#,
    r#"declare\s+module\s+['"]wasi['"]"#,
    r#"declare\s+module\s+['"]diagnostics_channel['"]"#,
];

static PATTERNS: Lazy<Vec<ForbiddenPattern>> =
    Lazy::new(|| compile_patterns(TYPESCRIPT_PATTERNS));

static COMMENTS: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?m)//.*$|/\*[\s\S]*?\*/").ok());

pub struct TypeScriptSanitizer {
    javascript: JavaScriptSanitizer,
}

impl TypeScriptSanitizer {
    pub fn new() -> Self {
        Self {
            javascript: JavaScriptSanitizer,
        }
    }

    /// Removes `//` and `/* */` comments. String contents are not protected.
    pub fn strip_comments(code: &str) -> Cow<'_, str> {
        match COMMENTS.as_ref() {
            Some(re) => re.replace_all(code, ""),
            None => Cow::Borrowed(code),
        }
    }
}

impl Default for TypeScriptSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeSanitizer for TypeScriptSanitizer {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn check_language_rules(&self, code: &str) -> Result<(), EngineError> {
        let stripped = Self::strip_comments(code);
        check_patterns(&stripped, &PATTERNS, Some(Language::TypeScript.display_name()))?;
        check_common(&stripped)?;
        self.javascript.check_language_rules(&stripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        assert_eq!(PATTERNS.len(), TYPESCRIPT_PATTERNS.len());
        assert!(COMMENTS.is_some());
    }

    #[test]
    fn test_rejects_node_imports() {
        let err = TypeScriptSanitizer::new()
            .sanitize("import { readFileSync } from 'fs';\nreadFileSync('x');")
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("TypeScript code contains potentially unsafe operation"));

        assert!(TypeScriptSanitizer::new()
            .sanitize("declare module \"child_process\" {}")
            .is_err());
    }

    #[test]
    fn test_javascript_rules_also_apply() {
        let err = TypeScriptSanitizer::new()
            .sanitize("const x: number = require('os');")
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("JavaScript code contains potentially unsafe operation"));
    }

    #[test]
    fn test_commented_out_imports_are_ignored() {
        let code = "// import * as fs from 'fs'\n/* declare module 'os' */\nconst n: number = 1 + 2;\nconsole.log(n);\n";
        assert!(TypeScriptSanitizer::new().sanitize(code).is_ok());
    }

    #[test]
    fn test_strip_comments() {
        let stripped = TypeScriptSanitizer::strip_comments("let a = 1; // note\n/* block\n comment */let b = 2;");
        assert_eq!(stripped, "let a = 1; \nlet b = 2;");
    }
}
