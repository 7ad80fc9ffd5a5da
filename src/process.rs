//! Drives one path definition from expansion to validation.

use crate::config::schema::PathSpec;
use crate::config::ConfigError;
use crate::diff::{DiffLog, DIFF_DIR};
use crate::discover::discover;
use crate::engine::{FileOutcome, Repex};
use crate::error::RepexError;
use crate::expand::{expand, Variables};
use crate::validator::{ValidationPolicy, Validator};
use serde_yaml::Value;
use std::env;
use std::path::PathBuf;
use tracing::{debug, info};

/// Switches that apply to a whole run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Diff every path, whatever its own `diff` setting says
    pub with_diff: bool,
    /// Run configured validators
    pub validate: bool,
    /// Skip replacement and only run validators
    pub validate_only: bool,
    /// Directory for diff logs
    pub diff_root: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            with_diff: false,
            validate: true,
            validate_only: false,
            diff_root: PathBuf::from(DIFF_DIR),
        }
    }
}

/// What happened to one path definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathReport {
    pub path: PathBuf,
    pub outcomes: Vec<FileOutcome>,
}

impl PathReport {
    pub fn replaced(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, FileOutcome::Replaced { .. }))
            .count()
    }
}

/// Substitute variables into every field of `spec`, producing a new spec.
pub fn expand_spec(spec: &PathSpec, variables: &Variables) -> Result<PathSpec, RepexError> {
    let raw = serde_yaml::to_value(spec).map_err(yaml_error)?;
    let Value::Mapping(fields) = raw else {
        return Ok(spec.clone());
    };
    let expanded = expand(variables, &fields)?;
    serde_yaml::from_value(Value::Mapping(expanded)).map_err(yaml_error)
}

fn yaml_error(source: serde_yaml::Error) -> RepexError {
    RepexError::Config(ConfigError::Yaml { path: None, source })
}

/// Process one path definition.
///
/// Single-file entries (no `type`) must name an existing file. Multi-file
/// entries walk `base_directory` for files named like `type` inside
/// directories matching `path`. Each file is replaced in turn; validators
/// run after every file (`per_file`) or once on the last file (`per_type`).
pub fn handle_path(
    spec: &PathSpec,
    variables: &Variables,
    options: &RunOptions,
    diff_log: &mut DiffLog,
) -> Result<PathReport, RepexError> {
    let spec = expand_spec(spec, variables)?;
    debug!("Expanded path definition: {:?}", spec);

    let cwd = env::current_dir().map_err(|e| RepexError::io(".", e))?;
    let base_dir = spec
        .base_directory
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| cwd.clone());
    let path_to_handle = base_dir.join(&spec.path);

    let validator = match (&spec.validator, options.validate) {
        (Some(validator_spec), true) => Some(Validator::from_spec(validator_spec, &cwd)?),
        _ => None,
    };

    let files = match &spec.file_type {
        None => {
            info!("Processing file: {}", path_to_handle.display());
            if !path_to_handle.is_file() {
                return Err(RepexError::FileNotFound {
                    path: path_to_handle,
                });
            }
            vec![path_to_handle.clone()]
        }
        Some(file_type) => {
            if path_to_handle.is_file() {
                return Err(RepexError::TypePathCollision {
                    path: path_to_handle,
                });
            }
            if spec.to_file.is_some() {
                return Err(RepexError::ToFileRequiresExplicitPath { path: base_dir });
            }
            discover(
                file_type,
                &spec.path,
                &base_dir,
                &spec.excluded,
                spec.excluded_filename.as_deref(),
            )?
        }
    };

    let engine = if options.validate_only {
        None
    } else {
        Some(Repex::from_spec(&spec)?)
    };

    let mut outcomes = Vec::with_capacity(files.len());
    for file in files {
        let outcome = match &engine {
            None => FileOutcome::NotProcessed { file },
            Some(engine) => {
                let plan = engine.plan(&file)?;
                let outcome = engine.commit(&plan)?;
                if spec.diff || options.with_diff {
                    diff_log
                        .record(&plan.file, &plan.original, &plan.updated)
                        .map_err(|e| RepexError::io(diff_log.location(), e))?;
                }
                outcome
            }
        };

        if let Some(validator) = &validator {
            if validator.policy() == ValidationPolicy::PerFile {
                validator.verify(outcome.validation_target())?;
            }
        }
        outcomes.push(outcome);
    }

    if let Some(validator) = &validator {
        if validator.policy() == ValidationPolicy::PerType {
            match outcomes.last() {
                Some(last) => validator.verify(last.validation_target())?,
                None => debug!("No files found; skipping {} validation", validator.policy()),
            }
        }
    }

    Ok(PathReport {
        path: path_to_handle,
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const VERSION_PATTERN: &str = r"\d+\.\d+\.\d+-m\d+";

    fn single(dir: &Path, file: &str) -> PathSpec {
        PathSpec {
            path: file.to_string(),
            base_directory: Some(dir.display().to_string()),
            replace: VERSION_PATTERN.to_string(),
            with: Some("1.2.3-m3".to_string()),
            ..PathSpec::default()
        }
    }

    fn run(spec: &PathSpec, dir: &Path) -> Result<PathReport, RepexError> {
        let options = RunOptions {
            diff_root: dir.join(DIFF_DIR),
            ..RunOptions::default()
        };
        let mut log = DiffLog::new(&options.diff_root);
        handle_path(spec, &Variables::new(), &options, &mut log)
    }

    #[test]
    fn test_expand_spec_builds_new_value() {
        let mut spec = single(Path::new("/tmp"), "VERSION");
        spec.with = Some("{{ .version }}".to_string());
        spec.tags = vec!["{{ .tag }}".to_string()];
        let vars: Variables = [("version", "9.9.9-m1"), ("tag", "release")]
            .into_iter()
            .collect();

        let expanded = expand_spec(&spec, &vars).unwrap();

        assert_eq!(expanded.replacement(), "9.9.9-m1");
        assert_eq!(expanded.tags, vec!["release".to_string()]);
        assert_eq!(spec.replacement(), "{{ .version }}");
    }

    #[test]
    fn test_expand_spec_reports_missing_variable() {
        let mut spec = single(Path::new("/tmp"), "VERSION");
        spec.with = Some("{{ .version }}".to_string());
        let err = expand_spec(&spec, &Variables::new()).unwrap_err();
        assert!(
            matches!(err, RepexError::VariableExpansion { ref unresolved } if unresolved == &vec!["{{ .version }}".to_string()])
        );
    }

    #[test]
    fn test_single_file_not_found() {
        let dir = TempDir::new().unwrap();
        let err = run(&single(dir.path(), "missing"), dir.path()).unwrap_err();
        assert!(matches!(err, RepexError::FileNotFound { .. }));
    }

    #[test]
    fn test_type_with_single_file_path_collides() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("VERSION"), "1.0.0-m1").unwrap();
        let mut spec = single(dir.path(), "VERSION");
        spec.file_type = Some("VERSION".to_string());

        let err = run(&spec, dir.path()).unwrap_err();
        assert!(matches!(err, RepexError::TypePathCollision { .. }));
    }

    #[test]
    fn test_to_file_with_type_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut spec = single(dir.path(), "does-not-exist-*");
        spec.file_type = Some("VERSION".to_string());
        spec.to_file = Some("out".to_string());

        let err = run(&spec, dir.path()).unwrap_err();
        assert!(matches!(err, RepexError::ToFileRequiresExplicitPath { .. }));
    }

    #[test]
    fn test_match_defaults_to_replace() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("VERSION");
        fs::write(&file, "\"version\": \"1.2.3-m2\"").unwrap();

        let report = run(&single(dir.path(), "VERSION"), dir.path()).unwrap();

        assert_eq!(report.replaced(), 1);
        assert_eq!(fs::read_to_string(&file).unwrap(), "\"version\": \"1.2.3-m3\"");
    }

    #[test]
    fn test_validate_only_leaves_files_alone() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("VERSION");
        fs::write(&file, "1.2.3-m2").unwrap();

        let options = RunOptions {
            validate_only: true,
            diff_root: dir.path().join(DIFF_DIR),
            ..RunOptions::default()
        };
        let mut log = DiffLog::new(&options.diff_root);
        let report = handle_path(
            &single(dir.path(), "VERSION"),
            &Variables::new(),
            &options,
            &mut log,
        )
        .unwrap();

        assert!(matches!(
            report.outcomes.as_slice(),
            [FileOutcome::NotProcessed { .. }]
        ));
        assert_eq!(fs::read_to_string(&file).unwrap(), "1.2.3-m2");
    }

    #[test]
    fn test_diff_written_when_requested() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("VERSION"), "1.2.3-m2\n").unwrap();
        let mut spec = single(dir.path(), "VERSION");
        spec.diff = true;

        let options = RunOptions {
            diff_root: dir.path().join(DIFF_DIR),
            ..RunOptions::default()
        };
        let mut log = DiffLog::new(&options.diff_root);
        handle_path(&spec, &Variables::new(), &options, &mut log).unwrap();

        let diff = fs::read_to_string(log.path().unwrap()).unwrap();
        assert!(diff.contains("-1.2.3-m2"));
        assert!(diff.contains("+1.2.3-m3"));
    }

    #[test]
    fn test_failed_write_leaves_no_diff() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("VERSION"), "1.2.3-m2\n").unwrap();
        let mut spec = single(dir.path(), "VERSION");
        spec.diff = true;
        spec.to_file = Some(dir.path().join("missing/VERSION").display().to_string());

        let options = RunOptions {
            diff_root: dir.path().join(DIFF_DIR),
            ..RunOptions::default()
        };
        let mut log = DiffLog::new(&options.diff_root);
        let err = handle_path(&spec, &Variables::new(), &options, &mut log).unwrap_err();

        assert!(matches!(err, RepexError::Write { .. }));
        assert!(log.path().is_none());
        assert!(!dir.path().join(DIFF_DIR).exists());
    }
}
