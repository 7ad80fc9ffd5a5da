use crate::config::schema::{RepexConfig, ValidationError};
use crate::expand::Variables;
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Yaml {
        path: Option<PathBuf>,
        source: serde_yaml::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
    InvalidVariables {
        path: PathBuf,
        message: String,
    },
    ConflictingOptions {
        first: &'static str,
        second: &'static str,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Yaml { path: None, source } => ConfigError::Yaml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "could not open config file {}: {}", path.display(), source)
            }
            ConfigError::Yaml { path, source } => match path {
                Some(path) => write!(f, "invalid YAML in {}: {}", path.display(), source),
                None => write!(f, "invalid YAML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid config ({}):\n{}", path.display(), source),
                None => write!(f, "invalid config:\n{}", source),
            },
            ConfigError::InvalidVariables { path, message } => {
                write!(f, "invalid variables file {}: {}", path.display(), message)
            }
            ConfigError::ConflictingOptions { first, second } => {
                write!(f, "{} and {} are mutually exclusive", first, second)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Yaml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
            ConfigError::InvalidVariables { .. } | ConfigError::ConflictingOptions { .. } => None,
        }
    }
}

pub fn load_from_str(input: &str) -> Result<RepexConfig, ConfigError> {
    // An empty document is an empty config, reported as "no paths".
    let config: RepexConfig = if input.trim().is_empty() {
        RepexConfig::default()
    } else {
        serde_yaml::from_str(input).map_err(|source| ConfigError::Yaml { path: None, source })?
    };
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<RepexConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Read a flat YAML mapping of variables (`name: value`).
pub fn load_vars_file(path: impl AsRef<Path>) -> Result<Variables, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(Variables::new());
    }
    let mapping: Mapping = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
        path: Some(path.to_path_buf()),
        source,
    })?;

    let mut vars = Variables::new();
    for (key, value) in mapping {
        let name = match key {
            Value::String(name) => name,
            other => {
                return Err(ConfigError::InvalidVariables {
                    path: path.to_path_buf(),
                    message: format!("variable names must be strings, got {other:?}"),
                })
            }
        };
        let value = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            _ => {
                return Err(ConfigError::InvalidVariables {
                    path: path.to_path_buf(),
                    message: format!("variable '{name}' must be a scalar"),
                })
            }
        };
        vars.insert(name, value);
    }
    Ok(vars)
}
