//! Execution orchestration for the ad-hoc and graded flows.

pub mod code;
mod sandbox;

pub use code::{CodeExecutor, PLAYGROUND_TIMEOUT_MESSAGE};
pub use test::{TestExecutor, TEST_TIMEOUT_MESSAGE};

pub(crate) use sandbox::{create_working_dir, elapsed_ms, EnvironmentGuard};
