//! Run-scoped unified diff log.

use chrono::Local;
use similar::TextDiff;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default directory for diff logs, relative to the working directory.
pub const DIFF_DIR: &str = ".repex";

/// Appends before/after diffs of every changed file to one log per run.
///
/// The log file is only created once there is a change to record.
#[derive(Debug, Clone)]
pub struct DiffLog {
    path: PathBuf,
    written: bool,
}

impl DiffLog {
    /// A log at `<root>/diff-<timestamp>`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        Self {
            path: root.as_ref().join(format!("diff-{stamp}")),
            written: false,
        }
    }

    /// Where the log is (or will be) written.
    pub fn location(&self) -> &Path {
        &self.path
    }

    /// The log file, once anything has been written to it.
    pub fn path(&self) -> Option<&Path> {
        self.written.then_some(self.path.as_path())
    }

    /// Record the change to `file`. Returns whether anything was written.
    pub fn record(&mut self, file: &Path, before: &str, after: &str) -> io::Result<bool> {
        if before == after {
            debug!("No changes to diff for {}", file.display());
            return Ok(false);
        }

        let name = file.display().to_string();
        let rendered = render(&name, before, after);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        log.write_all(rendered.as_bytes())?;

        if !self.written {
            info!("Writing diff to {}", self.path.display());
        }
        self.written = true;
        Ok(true)
    }
}

/// Unified diff of one file, three lines of context.
pub fn render(name: &str, before: &str, after: &str) -> String {
    let diff = TextDiff::from_lines(before, after);
    let mut unified = diff.unified_diff();
    unified
        .context_radius(3)
        .header(&format!("a/{name}"), &format!("b/{name}"));
    unified.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_marks_changed_lines() {
        let rendered = render("VERSION", "version: 1\nname: x\n", "version: 2\nname: x\n");
        assert!(rendered.contains("--- a/VERSION"));
        assert!(rendered.contains("+++ b/VERSION"));
        assert!(rendered.contains("-version: 1"));
        assert!(rendered.contains("+version: 2"));
    }

    #[test]
    fn test_log_is_created_lazily() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".repex");
        let mut log = DiffLog::new(&root);

        assert!(!log.record(Path::new("VERSION"), "same\n", "same\n").unwrap());
        assert!(log.path().is_none());
        assert!(!root.exists());

        assert!(log.record(Path::new("VERSION"), "a\n", "b\n").unwrap());
        let path = log.path().unwrap().to_path_buf();
        assert!(path.starts_with(&root));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("diff-"));
    }

    #[test]
    fn test_log_appends() {
        let dir = TempDir::new().unwrap();
        let mut log = DiffLog::new(dir.path());
        log.record(Path::new("one"), "1\n", "2\n").unwrap();
        log.record(Path::new("two"), "3\n", "4\n").unwrap();

        let content = fs::read_to_string(log.path().unwrap()).unwrap();
        assert!(content.contains("a/one"));
        assert!(content.contains("a/two"));
    }
}
