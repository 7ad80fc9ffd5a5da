use crate::config::ConfigError;
use crate::discover::DiscoveryError;
use crate::edit::EditError;
use crate::validator::ValidatorConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Every failure a repex run can surface.
///
/// Domain failures (configuration, prevalidation, post-validation) have their
/// own variants; system errors are carried in [`RepexError::Io`] with the path
/// that caused them.
#[derive(Error, Debug)]
pub enum RepexError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("variables failed to expand: {}", .unresolved.join(", "))]
    VariableExpansion { unresolved: Vec<String> },

    #[error("invalid {kind} regex `{pattern}`: {source}")]
    InvalidRegex {
        kind: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("if `type` is specified, `path` must not be a path to a single file: {path}")]
    TypePathCollision { path: PathBuf },

    #[error("`to_file` requires an explicit single file `path`, got a `type` search under {path}")]
    ToFileRequiresExplicitPath { path: PathBuf },

    #[error(
        "prevalidation failed for {file}: required strings not found: {}",
        .missing.join(", ")
    )]
    Prevalidation { file: PathBuf, missing: Vec<String> },

    #[error("invalid validator config: {0}")]
    ValidatorConfig(#[from] ValidatorConfigError),

    #[error("validation failed for {file}: {reason}")]
    ValidationFailed { file: PathBuf, reason: String },

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: EditError,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RepexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RepexError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn regex(kind: &'static str, pattern: &str, source: regex::Error) -> Self {
        RepexError::InvalidRegex {
            kind,
            pattern: pattern.to_string(),
            source,
        }
    }
}
