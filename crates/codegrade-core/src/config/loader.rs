//! Configuration loader for YAML files and environment overrides

use crate::config::types::*;
use crate::errors::EngineError;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Configuration loader with environment overrides
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<EngineConfig, EngineError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            EngineError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_str(&content)
    }

    /// Load configuration from a YAML string, applying `CODEGRADE_*` overrides
    /// from the process environment.
    pub fn from_str(content: &str) -> Result<EngineConfig, EngineError> {
        Self::from_str_with_env(content, |key| std::env::var(key).ok())
    }

    /// Same as [`ConfigLoader::from_str`] with an explicit variable lookup.
    pub fn from_str_with_env<F>(content: &str, lookup: F) -> Result<EngineConfig, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: EngineConfig = if content.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_yaml::from_str(content)
                .map_err(|e| EngineError::Config(format!("Failed to parse YAML config: {}", e)))?
        };

        Self::apply_env_overrides(&mut config, lookup)?;

        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides<F>(config: &mut EngineConfig, lookup: F) -> Result<(), EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(socket) = lookup("CODEGRADE_DOCKER_SOCKET") {
            log::debug!("Docker socket overridden from environment: {}", socket);
            config.docker.socket = Some(socket);
        }
        if let Some(root) = lookup("CODEGRADE_WORK_ROOT") {
            config.execution.work_root = Some(PathBuf::from(root));
        }
        if let Some(value) = lookup("CODEGRADE_PLAYGROUND_TIMEOUT_MS") {
            config.execution.playground_timeout_ms = parse_var("CODEGRADE_PLAYGROUND_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("CODEGRADE_POOL_ENABLED") {
            config.pool.enabled = parse_var("CODEGRADE_POOL_ENABLED", &value)?;
        }
        if let Some(value) = lookup("CODEGRADE_POOL_MIN") {
            config.pool.min_per_pool = parse_var("CODEGRADE_POOL_MIN", &value)?;
        }
        if let Some(value) = lookup("CODEGRADE_POOL_MAX") {
            config.pool.max_per_pool = parse_var("CODEGRADE_POOL_MAX", &value)?;
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, EngineError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| {
        EngineError::Config(format!("Invalid value '{}' for {}: {}", value, name, e))
    })
}
