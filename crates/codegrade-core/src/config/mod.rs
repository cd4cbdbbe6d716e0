//! Configuration module for the execution engine
//!
//! Configuration is read from YAML, overlaid with `CODEGRADE_*` environment
//! variables and validated before any component is built from it.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;

#[cfg(test)]
mod tests;

use crate::errors::EngineError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, EngineError> {
    ConfigLoader::from_file(path).await
}
