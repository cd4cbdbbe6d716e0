use once_cell::sync::Lazy;

use super::{check_patterns, compile_patterns, CodeSanitizer, ForbiddenPattern};
use crate::errors::EngineError;
use crate::models::Language;

// Process and file access, reflection, interop, blocking input and the
// threading/GC primitives a submission has no business touching.
const CSHARP_PATTERNS: &[&str] = &[
    r"System\.Diagnostics\.Process",
    r"System\.IO\.File",
    r"System\.IO\.Directory",
    r"System\.Net\.WebClient",
    r"System\.Net\.Http",
    r"HttpClient",
    r"System\.Reflection",
    r"Assembly",
    r"Type\.GetType",
    r"Activator\.CreateInstance",
    r"DllImport",
    r"Marshal",
    r"IntPtr",
    r"UnsafeCode",
    r"unsafe\s+\{",
    r"fixed\s+\(",
    r"stackalloc",
    r"Environment\.Exit",
    r"Environment\.GetEnvironmentVariable",
    r"Console\.ReadLine",
    r"Console\.Read",
    r"Console\.ReadKey",
    r"Thread\.Sleep",
    r"Task\.Delay",
    r"Parallel",
    r"ThreadPool",
    r"Mutex",
    r"Semaphore",
    r"EventWaitHandle",
    r"ManualResetEvent",
    r"AutoResetEvent",
    r"WaitHandle",
    r"Monitor",
    r"Interlocked",
    r"ReaderWriterLock",
    r"ReaderWriterLockSlim",
    r"SpinLock",
    r"SpinWait",
    r"Barrier",
    r"CountdownEvent",
    r"SemaphoreSlim",
    r"CancellationToken",
    r"CancellationTokenSource",
    r"TaskScheduler",
    r"TaskFactory",
    r"TaskCompletionSource",
    r"Lazy",
    r"LazyInitializer",
    r"ThreadLocal",
    r"ThreadStatic",
    r"Volatile",
    r"MethodImpl",
    r"MethodImplOptions",
    r"RuntimeHelpers",
    r"GCHandle",
    r"GC\.Collect",
    r"GC\.WaitForPendingFinalizers",
    r"GC\.SuppressFinalize",
    r"GC\.ReRegisterForFinalize",
    r"GC\.AddMemoryPressure",
    r"GC\.RemoveMemoryPressure",
    r"GC\.GetTotalMemory",
    r"GC\.GetGeneration",
    r"GC\.GetMaxGeneration",
    r"GC\.KeepAlive",
    r"GC\.RegisterForFullGCNotification",
    r"GC\.CancelFullGCNotification",
    r"GC\.WaitForFullGCApproach",
    r"GC\.WaitForFullGCComplete",
    r"GC\.TryStartNoGCRegion",
    r"GC\.EndNoGCRegion",
];

static PATTERNS: Lazy<Vec<ForbiddenPattern>> = Lazy::new(|| compile_patterns(CSHARP_PATTERNS));

pub struct CSharpSanitizer;

impl CodeSanitizer for CSharpSanitizer {
    fn language(&self) -> Language {
        Language::CSharp
    }

    fn check_language_rules(&self, code: &str) -> Result<(), EngineError> {
        check_patterns(code, &PATTERNS, Some(Language::CSharp.display_name()))
    }
}
