//! Post-write validation hooks.
//!
//! A validator is anything implementing [`Validate`]. From config, the
//! validator is an external executable invoked as `<path> <function> <file>`;
//! exit status 0 means the file is valid.

use crate::config::schema::ValidatorSpec;
use crate::error::RepexError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, error, info};

/// When a path entry's validator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// After every file
    PerFile,
    /// Once, on the last file of the batch
    #[default]
    PerType,
}

impl fmt::Display for ValidationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationPolicy::PerFile => write!(f, "per_file"),
            ValidationPolicy::PerType => write!(f, "per_type"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ValidatorConfigError {
    #[error("validator `path` was not supplied")]
    PathNotSupplied,

    #[error("validator script not found: {path}")]
    PathNotFound { path: PathBuf },

    #[error("validator `function` was not supplied")]
    FunctionNotSupplied,
}

#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("failed to run validator {script}: {source}")]
    Spawn {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Check(String),
}

/// Checks one output file.
pub trait Validate {
    /// `Ok(false)` and `Err` both mean the file failed validation.
    fn validate(&self, file: &Path) -> Result<bool, ValidatorError>;
}

impl<F> Validate for F
where
    F: Fn(&Path) -> Result<bool, ValidatorError>,
{
    fn validate(&self, file: &Path) -> Result<bool, ValidatorError> {
        self(file)
    }
}

/// Runs an external script: `<script> <function> <file>`.
#[derive(Debug, Clone)]
pub struct ScriptValidator {
    script: PathBuf,
    function: String,
}

impl ScriptValidator {
    pub fn new(script: impl Into<PathBuf>, function: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            function: function.into(),
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn function(&self) -> &str {
        &self.function
    }
}

impl Validate for ScriptValidator {
    fn validate(&self, file: &Path) -> Result<bool, ValidatorError> {
        let output = Command::new(&self.script)
            .arg(&self.function)
            .arg(file)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ValidatorError::Spawn {
                script: self.script.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!(script = %self.script.display(), "{}", stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            debug!(script = %self.script.display(), "{}", stderr.trim_end());
        }

        Ok(output.status.success())
    }
}

/// A configured validator plus its invocation policy.
pub struct Validator {
    policy: ValidationPolicy,
    label: String,
    check: Box<dyn Validate>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("policy", &self.policy)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl Validator {
    pub fn new(policy: ValidationPolicy, label: impl Into<String>, check: Box<dyn Validate>) -> Self {
        Self {
            policy,
            label: label.into(),
            check,
        }
    }

    /// Build a script validator, checking the config eagerly.
    ///
    /// A relative script path is resolved against `base_dir`.
    pub fn from_spec(spec: &ValidatorSpec, base_dir: &Path) -> Result<Self, ValidatorConfigError> {
        let path = spec
            .path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or(ValidatorConfigError::PathNotSupplied)?;
        let function = spec
            .function
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .ok_or(ValidatorConfigError::FunctionNotSupplied)?;

        let script = base_dir.join(path);
        if !script.is_file() {
            return Err(ValidatorConfigError::PathNotFound { path: script });
        }

        let label = format!("{}:{}", script.display(), function);
        Ok(Self::new(
            spec.policy,
            label,
            Box::new(ScriptValidator::new(script, function)),
        ))
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Validate `file`, turning a negative result into
    /// [`RepexError::ValidationFailed`].
    pub fn verify(&self, file: &Path) -> Result<(), RepexError> {
        info!("Validating {} with {}...", file.display(), self.label);
        match self.check.validate(file) {
            Ok(true) => {
                debug!("{} passed validation", file.display());
                Ok(())
            }
            Ok(false) => {
                error!("Validation failed for {}", file.display());
                Err(RepexError::ValidationFailed {
                    file: file.to_path_buf(),
                    reason: format!("{} reported the file as invalid", self.label),
                })
            }
            Err(err) => {
                error!("Validation failed for {}: {}", file.display(), err);
                Err(RepexError::ValidationFailed {
                    file: file.to_path_buf(),
                    reason: err.to_string(),
                })
            }
        }
    }
}
