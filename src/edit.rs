use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// A byte-span replacement inside an in-memory document.
///
/// Offset-scoped replacement compiles every replaceable match occurrence down
/// to one of these and splices them in a single pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// Text to put at [byte_start, byte_end)
    pub new_text: String,
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("Invalid byte range: [{byte_start}, {byte_end}) in content of length {len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        len: usize,
    },

    #[error("Overlapping spans: [{first_start}, {first_end}) and [{second_start}, {second_end})")]
    Overlap {
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },

    #[error("Span [{byte_start}, {byte_end}) does not fall on UTF-8 character boundaries")]
    NotCharBoundary { byte_start: usize, byte_end: usize },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Span {
    pub fn new(byte_start: usize, byte_end: usize, new_text: impl Into<String>) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
        }
    }

    fn validate(&self, content: &str) -> Result<(), EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                len: content.len(),
            });
        }
        if !content.is_char_boundary(self.byte_start) || !content.is_char_boundary(self.byte_end) {
            return Err(EditError::NotCharBoundary {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
            });
        }
        Ok(())
    }
}

/// Apply non-overlapping spans to `content`, returning the new document.
///
/// Spans are sorted by byte_start descending and applied bottom-to-top
/// to avoid offset invalidation.
pub fn splice(content: &str, mut spans: Vec<Span>) -> Result<String, EditError> {
    if spans.is_empty() {
        return Ok(content.to_string());
    }

    spans.sort_by(|a, b| b.byte_start.cmp(&a.byte_start));

    for span in &spans {
        span.validate(content)?;
    }

    // Sorted descending: the earlier span must end before the later one starts
    for window in spans.windows(2) {
        let (later, earlier) = (&window[0], &window[1]);
        if earlier.byte_end > later.byte_start {
            return Err(EditError::Overlap {
                first_start: earlier.byte_start,
                first_end: earlier.byte_end,
                second_start: later.byte_start,
                second_end: later.byte_end,
            });
        }
    }

    let mut new_content = content.to_string();
    for span in &spans {
        new_content.replace_range(span.byte_start..span.byte_end, &span.new_text);
    }
    Ok(new_content)
}

/// Atomic file write: tempfile + fsync + rename.
///
/// The temp file is created next to `path` so the rename never crosses a
/// filesystem. When `path` already exists its permissions carry over to the
/// replacement. On failure the temp file is removed when it is dropped.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(EditError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            )))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;

    temp.write_all(content)?;

    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }

    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
