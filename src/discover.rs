//! File discovery for multi-file paths.
//!
//! Walks `base_dir` and collects files whose name matches a filename regex,
//! inside directories whose path matches a path regex, skipping excluded
//! directory prefixes, excluded files, and an optional excluded filename
//! regex.

use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("invalid {kind} regex `{pattern}`: {source}")]
    InvalidRegex {
        kind: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// What to look for under a base directory.
#[derive(Debug, Clone)]
pub struct Discovery {
    filename: Regex,
    path: Regex,
    excluded_filename: Option<Regex>,
}

impl Discovery {
    /// Compile the discovery regexes.
    ///
    /// `filename_regex` is anchored at the start of the file name (a prefix
    /// match); `path_regex` may match anywhere in a directory path. Directory
    /// paths are matched with `/` separators, the patterns are used as given.
    pub fn new(
        filename_regex: &str,
        path_regex: &str,
        excluded_filename_regex: Option<&str>,
    ) -> Result<Self, DiscoveryError> {
        Ok(Self {
            filename: compile("filename", &anchored(filename_regex))?,
            path: compile("path", path_regex)?,
            excluded_filename: excluded_filename_regex
                .map(|pattern| compile("excluded filename", &anchored(pattern)))
                .transpose()?,
        })
    }

    /// Walk `base_dir` and return matching files in a deterministic order.
    pub fn find(
        &self,
        base_dir: &Path,
        excluded_paths: &[String],
    ) -> Result<Vec<PathBuf>, DiscoveryError> {
        let base_dir = if base_dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            base_dir
        };
        let excluded = excluded_prefixes(base_dir, excluded_paths);
        if !excluded.is_empty() {
            info!("Excluded paths: {:?}", excluded);
        }
        info!(
            "Looking for {} under {} in {}...",
            self.filename.as_str(),
            self.path.as_str(),
            base_dir.display()
        );

        let is_excluded = |path: &Path| {
            let normalized = normalize(&path.to_string_lossy());
            excluded.iter().any(|prefix| normalized.starts_with(prefix.as_str()))
        };

        let mut found = Vec::new();
        let walker = WalkDir::new(base_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !(entry.file_type().is_dir() && is_excluded(entry.path())));

        for entry in walker {
            let entry = entry.map_err(|source| DiscoveryError::Walk {
                path: source
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| base_dir.to_path_buf()),
                source,
            })?;
            if entry.file_type().is_dir() {
                continue;
            }

            let Some(dir) = entry.path().parent() else {
                continue;
            };
            if !self.path.is_match(&normalize(&dir.to_string_lossy())) {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            let file_path = entry.path();
            if file_path.is_file()
                && self.filename.is_match(&name)
                && !self
                    .excluded_filename
                    .as_ref()
                    .is_some_and(|re| re.is_match(&name))
                && !excluded
                    .iter()
                    .any(|p| normalize(&file_path.to_string_lossy()) == *p)
            {
                debug!("{} is a match. Appending to list...", file_path.display());
                found.push(file_path.to_path_buf());
            }
        }

        Ok(found)
    }
}

/// Find every file named like `filename_regex` under directories matching
/// `path_regex` below `base_dir`.
pub fn discover(
    filename_regex: &str,
    path_regex: &str,
    base_dir: &Path,
    excluded_paths: &[String],
    excluded_filename_regex: Option<&str>,
) -> Result<Vec<PathBuf>, DiscoveryError> {
    Discovery::new(filename_regex, path_regex, excluded_filename_regex)?
        .find(base_dir, excluded_paths)
}

fn compile(kind: &'static str, pattern: &str) -> Result<Regex, DiscoveryError> {
    Regex::new(pattern).map_err(|source| DiscoveryError::InvalidRegex {
        kind,
        pattern: pattern.to_string(),
        source,
    })
}

fn anchored(pattern: &str) -> String {
    format!("^(?:{pattern})")
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// Excluded entries are relative to `base_dir`, compared as string prefixes
/// without trailing slashes.
fn excluded_prefixes(base_dir: &Path, excluded_paths: &[String]) -> Vec<String> {
    excluded_paths
        .iter()
        .map(|excluded| {
            let joined = normalize(&base_dir.join(excluded).to_string_lossy());
            joined.trim_end_matches('/').to_string()
        })
        .collect()
}
