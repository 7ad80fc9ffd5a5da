use crate::config::loader::ConfigError;
use crate::config::schema::RepexConfig;
use crate::config::tags::matches_tags;
use crate::diff::DiffLog;
use crate::error::RepexError;
use crate::expand::Variables;
use crate::process::{handle_path, PathReport, RunOptions};
use std::env;
use std::path::PathBuf;
use tracing::debug;

/// Summary of a whole config run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub handled: Vec<PathReport>,
    /// Indices of paths left out by the tag filter
    pub skipped: Vec<usize>,
    /// The diff log, when any diff was written
    pub diff_log: Option<PathBuf>,
}

impl RunReport {
    pub fn files_replaced(&self) -> usize {
        self.handled.iter().map(PathReport::replaced).sum()
    }
}

/// Run every selected path of `config`, reading `REPEX_VAR_*` overrides from
/// the process environment.
pub fn iterate(
    config: &RepexConfig,
    caller_vars: &Variables,
    tags: &[String],
    options: &RunOptions,
) -> Result<RunReport, RepexError> {
    iterate_with_env(
        config,
        caller_vars,
        &Variables::from_env(env::vars()),
        tags,
        options,
    )
}

/// Like [`iterate`], with the environment layer passed in.
///
/// The first failing path stops the run; paths before it keep their changes.
pub fn iterate_with_env(
    config: &RepexConfig,
    caller_vars: &Variables,
    env_vars: &Variables,
    tags: &[String],
    options: &RunOptions,
) -> Result<RunReport, RepexError> {
    if options.validate_only && !options.validate {
        return Err(RepexError::Config(ConfigError::ConflictingOptions {
            first: "validate_only",
            second: "disabled validation",
        }));
    }
    config.validate().map_err(|source| {
        RepexError::Config(ConfigError::Validation { path: None, source })
    })?;

    let variables = Variables::layered(&config.variables(), caller_vars, env_vars);
    debug!("Chosen tags: {:?}", tags);

    let mut diff_log = DiffLog::new(&options.diff_root);
    let mut report = RunReport::default();

    for (index, spec) in config.paths.iter().enumerate() {
        if !matches_tags(tags, &spec.tags) {
            debug!("No matching tags found for path {}. Skipping...", spec.path);
            report.skipped.push(index);
            continue;
        }
        debug!("Matching tag(s) found for path {}...", spec.path);
        report
            .handled
            .push(handle_path(spec, &variables, options, &mut diff_log)?);
    }

    report.diff_log = diff_log.path().map(PathBuf::from);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PathSpec;
    use std::fs;
    use tempfile::TempDir;

    fn spec(dir: &TempDir, file: &str, tags: &[&str]) -> PathSpec {
        PathSpec {
            path: file.to_string(),
            base_directory: Some(dir.path().display().to_string()),
            replace: "old".to_string(),
            with: Some("{{ .value }}".to_string()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..PathSpec::default()
        }
    }

    fn options(dir: &TempDir) -> RunOptions {
        RunOptions {
            diff_root: dir.path().join(".repex"),
            ..RunOptions::default()
        }
    }

    fn config(dir: &TempDir) -> RepexConfig {
        fs::write(dir.path().join("untagged"), "old").unwrap();
        fs::write(dir.path().join("tagged"), "old").unwrap();
        RepexConfig {
            variables: [("value".to_string(), "from-config".into())]
                .into_iter()
                .collect(),
            paths: vec![spec(dir, "untagged", &[]), spec(dir, "tagged", &["release"])],
        }
    }

    #[test]
    fn test_tag_filter_selects_paths() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        let report = iterate_with_env(
            &config,
            &Variables::new(),
            &Variables::new(),
            &["release".to_string()],
            &options(&dir),
        )
        .unwrap();

        assert_eq!(report.skipped, vec![0]);
        assert_eq!(fs::read_to_string(dir.path().join("untagged")).unwrap(), "old");
        assert_eq!(
            fs::read_to_string(dir.path().join("tagged")).unwrap(),
            "from-config"
        );
    }

    #[test]
    fn test_variable_precedence() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let caller: Variables = [("value", "from-caller")].into_iter().collect();

        iterate_with_env(&config, &caller, &Variables::new(), &[], &options(&dir)).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("untagged")).unwrap(),
            "from-caller"
        );

        fs::write(dir.path().join("untagged"), "old").unwrap();
        let env = Variables::from_env(vec![(
            "REPEX_VAR_VALUE".to_string(),
            "from-env".to_string(),
        )]);
        iterate_with_env(&config, &caller, &env, &[], &options(&dir)).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("untagged")).unwrap(),
            "from-env"
        );
    }

    #[test]
    fn test_invalid_config_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.paths[0].replace = String::new();

        let err = iterate_with_env(
            &config,
            &Variables::new(),
            &Variables::new(),
            &["any".to_string()],
            &options(&dir),
        )
        .unwrap_err();

        assert!(matches!(err, RepexError::Config(_)));
        assert_eq!(fs::read_to_string(dir.path().join("tagged")).unwrap(), "old");
    }

    #[test]
    fn test_validate_only_without_validation_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let options = RunOptions {
            validate: false,
            validate_only: true,
            ..options(&dir)
        };

        let err = iterate_with_env(&config, &Variables::new(), &Variables::new(), &[], &options)
            .unwrap_err();

        assert!(matches!(
            err,
            RepexError::Config(ConfigError::ConflictingOptions { .. })
        ));
        assert!(err.to_string().contains("mutually exclusive"));
        assert_eq!(fs::read_to_string(dir.path().join("untagged")).unwrap(), "old");
    }
}
