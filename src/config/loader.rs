//! Configuration loading from disk.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::schema::PigeonConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    /// The source held no settings, typically a read racing the writer.
    Empty,
    Validation(Vec<ValidationError>),
}

impl ConfigError {
    /// Reads that may succeed if retried on the next change event.
    pub fn is_transient(&self) -> bool {
        match self {
            ConfigError::Empty => true,
            ConfigError::Io(e) => e.kind() == ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Empty => write!(f, "configuration source is empty"),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Decode `source` into `dest`, then validate it.
///
/// On a validation failure `dest` keeps the decoded values.
pub fn unmarshal(source: &str, dest: &mut PigeonConfig) -> Result<(), ConfigError> {
    if source.trim().is_empty() {
        return Err(ConfigError::Empty);
    }
    *dest = toml::from_str(source).map_err(ConfigError::Parse)?;
    validate_config(dest).map_err(ConfigError::Validation)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<PigeonConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config = PigeonConfig::default();
    unmarshal(&content, &mut config)?;
    Ok(config)
}
