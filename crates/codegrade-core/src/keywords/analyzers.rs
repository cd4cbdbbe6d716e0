//! Per-language preprocessing: comments and literals are blanked out so that
//! keywords only count where they appear as code.

use once_cell::sync::Lazy;
use regex::Regex;

use super::KeywordAnalyzer;
use crate::models::Language;

static SLASH_LINE_COMMENT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?m)//.*$").ok());
static BLOCK_COMMENT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").ok());
static HASH_LINE_COMMENT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?m)#.*$").ok());
static DOUBLE_QUOTED: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#""(?:[^"\\]|\\.)*""#).ok());
static SINGLE_QUOTED: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"'(?:[^'\\]|\\.)*'").ok());
static VERBATIM_STRING: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"@"(?:[^"]|"")*""#).ok());
static RAW_STRING: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)`[^`]*`").ok());
static TEMPLATE_LITERAL: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"`(?:[^`\\]|\\.)*`").ok());
static TRIPLE_SINGLE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)'''.*?'''").ok());
static TRIPLE_DOUBLE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"(?s)""".*?""""#).ok());

const EMPTY_STRING: &str = "\"\"";

fn blank(re: &Lazy<Option<Regex>>, code: String, replacement: &str) -> String {
    match re.as_ref() {
        Some(re) => re.replace_all(&code, regex::NoExpand(replacement)).into_owned(),
        None => code,
    }
}

fn strip_c_comments(code: &str) -> String {
    let code = blank(&SLASH_LINE_COMMENT, code.to_string(), "");
    blank(&BLOCK_COMMENT, code, "")
}

fn strip_quoted(code: String) -> String {
    let code = blank(&DOUBLE_QUOTED, code, EMPTY_STRING);
    blank(&SINGLE_QUOTED, code, EMPTY_STRING)
}

pub struct PythonKeywordAnalyzer;

impl KeywordAnalyzer for PythonKeywordAnalyzer {
    fn languages(&self) -> &[Language] {
        &[Language::Python]
    }

    fn preprocess(&self, code: &str) -> String {
        let code = blank(&HASH_LINE_COMMENT, code.to_string(), "");
        let code = strip_quoted(code);
        let code = blank(&TRIPLE_SINGLE, code, "\"\"\"\"\"\"");
        blank(&TRIPLE_DOUBLE, code, "\"\"\"\"\"\"")
    }
}

pub struct CSharpKeywordAnalyzer;

impl KeywordAnalyzer for CSharpKeywordAnalyzer {
    fn languages(&self) -> &[Language] {
        &[Language::CSharp]
    }

    fn preprocess(&self, code: &str) -> String {
        let code = strip_quoted(strip_c_comments(code));
        blank(&VERBATIM_STRING, code, EMPTY_STRING)
    }
}

/// Shared by TypeScript and JavaScript.
pub struct ScriptKeywordAnalyzer;

impl KeywordAnalyzer for ScriptKeywordAnalyzer {
    fn languages(&self) -> &[Language] {
        &[Language::TypeScript, Language::JavaScript]
    }

    fn preprocess(&self, code: &str) -> String {
        let code = strip_quoted(strip_c_comments(code));
        blank(&TEMPLATE_LITERAL, code, "``")
    }
}

pub struct GoKeywordAnalyzer;

impl KeywordAnalyzer for GoKeywordAnalyzer {
    fn languages(&self) -> &[Language] {
        &[Language::Go]
    }

    fn preprocess(&self, code: &str) -> String {
        let code = strip_quoted(strip_c_comments(code));
        blank(&RAW_STRING, code, EMPTY_STRING)
    }
}
