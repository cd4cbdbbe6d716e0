use once_cell::sync::Lazy;

use super::{check_patterns, compile_patterns, CodeSanitizer, ForbiddenPattern};
use crate::errors::EngineError;
use crate::models::Language;

const GO_PATTERNS: &[&str] = &[
    // system
    r"os\.Exit\s*\(",
    r"os\.Remove\s*\(",
    r"os\.RemoveAll\s*\(",
    r"os\.Rename\s*\(",
    r"os\.Chmod\s*\(",
    r"os\.Chown\s*\(",
    r"os\.Mkdir\s*\(",
    r"os\.MkdirAll\s*\(",
    r"os\.Create\s*\(",
    r"os\.OpenFile\s*\(",
    r"os\.Getenv\s*\(",
    r"os\.Setenv\s*\(",
    r"os\.Unsetenv\s*\(",
    r"os\.Clearenv\s*\(",
    r"os\.Getwd\s*\(",
    r"os\.Chdir\s*\(",
    r"os\.TempDir\s*\(",
    r"os\.UserHomeDir\s*\(",
    r"os\.UserCacheDir\s*\(",
    r"os\.UserConfigDir\s*\(",
    r"os\.Hostname\s*\(",
    r"os\.Getpid\s*\(",
    r"os\.Getppid\s*\(",
    r"os\.Getuid\s*\(",
    r"os\.Geteuid\s*\(",
    r"os\.Getgid\s*\(",
    r"os\.Getegid\s*\(",
    r"os\.Getgroups\s*\(",
    // processes
    r"exec\.Command\s*\(",
    r"exec\.CommandContext\s*\(",
    r"exec\.LookPath\s*\(",
    // network
    r"net\.Dial\s*\(",
    r"net\.DialTimeout\s*\(",
    r"net\.Listen\s*\(",
    r"net\.ListenPacket\s*\(",
    r"net\.LookupHost\s*\(",
    r"net\.LookupAddr\s*\(",
    r"net\.LookupCNAME\s*\(",
    r"net\.LookupMX\s*\(",
    r"net\.LookupNS\s*\(",
    r"net\.LookupTXT\s*\(",
    r"http\.Get\s*\(",
    r"http\.Post\s*\(",
    r"http\.PostForm\s*\(",
    r"http\.Head\s*\(",
    r"http\.Client\s*\{",
    r"http\.Transport\s*\{",
    r"http\.ListenAndServe\s*\(",
    r"http\.ListenAndServeTLS\s*\(",
    r"http\.Serve\s*\(",
    r"http\.ServeTLS\s*\(",
    // filesystem
    r"ioutil\.ReadFile\s*\(",
    r"ioutil\.WriteFile\s*\(",
    r"ioutil\.ReadDir\s*\(",
    r"ioutil\.TempFile\s*\(",
    r"ioutil\.TempDir\s*\(",
    r"filepath\.Walk\s*\(",
    r"filepath\.WalkDir\s*\(",
    // unsafe and reflection
    r"unsafe\.",
    r"reflect\.ValueOf\s*\(",
    r"reflect\.TypeOf\s*\(",
    // runtime
    r"runtime\.GC\s*\(",
    r"runtime\.GOMAXPROCS\s*\(",
    r"runtime\.Goexit\s*\(",
    r"runtime\.Gosched\s*\(",
    r"runtime\.SetFinalizer\s*\(",
    r"runtime\.Stack\s*\(",
    // cgo
    r#"import\s+"C""#,
    r"/\*\s*#include",
    r"C\.",
    r"sql\.Open\s*\(",
    r"database/sql",
    r"crypto/tls",
    r"crypto/x509",
    r"plugin\.Open\s*\(",
    // build constraints and compiler directives
    r"//\s*\+build",
    r"//go:build",
    r"//go:noescape",
    r"//go:nosplit",
    r"//go:norace",
    r"//go:linkname",
    // goroutines, channels and timers
    r"go\s+func\s*\(",
    r"runtime\.NumGoroutine\s*\(",
    r"make\s*\(\s*chan\s+",
    r"<-\s*chan\s+",
    r"chan\s*<-",
    r"time\.Sleep\s*\(",
    r"time\.After\s*\(",
    r"time\.Tick\s*\(",
    r"time\.NewTicker\s*\(",
    r"time\.NewTimer\s*\(",
    r"context\.WithCancel\s*\(",
    r"context\.WithDeadline\s*\(",
    r"context\.WithTimeout\s*\(",
    r"context\.WithValue\s*\(",
    r"log\.Fatal\s*\(",
    r"log\.Panic\s*\(",
    r"log\.Print\s*\(",
    r"log\.Printf\s*\(",
    r"log\.Println\s*\(",
    r"testing\.B\s*\*",
    r"testing\.T\s*\*",
    r"testing\.M\s*\*",
];

const DANGEROUS_IMPORTS: &[&str] = &[
    "\"os\"",
    "\"os/exec\"",
    "\"net\"",
    "\"net/http\"",
    "\"unsafe\"",
    "\"reflect\"",
    "\"runtime\"",
    "\"syscall\"",
    "\"plugin\"",
    "\"database/sql\"",
    "\"crypto/tls\"",
    "\"crypto/x509\"",
    "\"io/ioutil\"",
    "\"path/filepath\"",
    "\"time\"",
    "\"context\"",
    "\"log\"",
    "\"testing\"",
];

static PATTERNS: Lazy<Vec<ForbiddenPattern>> = Lazy::new(|| compile_patterns(GO_PATTERNS));

pub struct GoSanitizer;

impl GoSanitizer {
    /// Single-line imports and the first entry of a grouped import block.
    fn check_imports(code: &str) -> Result<(), EngineError> {
        for import in DANGEROUS_IMPORTS {
            let forms = [
                format!("import {}", import),
                format!("import (\n\t{}", import),
                format!("import (\r\n\t{}", import),
                format!("import(\n\t{}", import),
                format!("import(\r\n\t{}", import),
            ];
            if forms.iter().any(|form| code.contains(form.as_str())) {
                log::warn!("Rejected Go code: dangerous import {}", import);
                return Err(EngineError::SecurityViolation {
                    pattern: import.to_string(),
                    message: format!("Go code contains potentially unsafe import: {}", import),
                });
            }
        }
        Ok(())
    }
}

impl CodeSanitizer for GoSanitizer {
    fn language(&self) -> Language {
        Language::Go
    }

    fn check_language_rules(&self, code: &str) -> Result<(), EngineError> {
        check_patterns(code, &PATTERNS, Some(Language::Go.display_name()))?;
        Self::check_imports(code)
    }
}
