mod defaults;
mod env;
pub mod types;
mod validation;

use std::path::Path;

pub use defaults::WorkloadDefaults;
pub use types::*;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Missing environment variables: {0:?}")]
    MissingEnvVars(Vec<String>),

    #[error("'{0}' must be greater than zero")]
    NotPositive(&'static str),

    #[error("Fault rate '{0}' must be within [0, 1], got {1}")]
    RateOutOfRange(&'static str, f64),

    #[error("Unknown workload '{0}'")]
    UnknownWorkload(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RunConfig {
    /// Parse a run configuration from a YAML string.
    /// Environment variables in the format `${VAR_NAME}` will be interpolated.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let interpolated = env::interpolate_env(yaml)?;
        let config: RunConfig = serde_yaml::from_str(&interpolated)?;
        Ok(config)
    }

    /// Load a run configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Serialize back to YAML (used by `fsmwl config`).
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
