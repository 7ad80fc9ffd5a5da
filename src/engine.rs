//! Match-then-replace engine.
//!
//! A `match` regex defines the contexts inside a file where replacement is
//! allowed; a `replace` regex picks what to substitute inside each context;
//! `with` is the substitution. Two scopes control how a replaced context is
//! written back:
//!
//! - [`ReplaceScope::Literal`]: every occurrence of a replaceable context's
//!   text is replaced anywhere in the file, as a literal substring. If the same
//!   text appears outside a match context it is replaced there too.
//! - [`ReplaceScope::Offsets`]: each match occurrence is spliced at its own
//!   byte span and nothing outside the matched spans changes.

use crate::config::schema::PathSpec;
use crate::edit::{atomic_write, splice, Span};
use crate::error::RepexError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

const MATCH_GROUP: &str = "matchgroup";

/// How replaced match contexts are written back into the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaceScope {
    #[default]
    Literal,
    Offsets,
}

/// Compiled match/replace settings for one path definition.
#[derive(Debug, Clone)]
pub struct Repex {
    match_expression: Regex,
    replace_expression: Regex,
    replace_with: String,
    template: String,
    to_file: Option<PathBuf>,
    must_include: Vec<(String, Regex)>,
    scope: ReplaceScope,
}

/// What would happen to one file, computed without touching the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePlan {
    pub file: PathBuf,
    pub output: PathBuf,
    pub original: String,
    pub updated: String,
    pub match_count: usize,
    pub replaced: usize,
}

impl FilePlan {
    /// Writing is skipped when the match regex found nothing, or when the
    /// content is unchanged and would land back on the same file. A separate
    /// output file is written whenever there were matches.
    pub fn needs_write(&self) -> bool {
        if self.output != self.file {
            self.match_count > 0
        } else {
            self.replaced > 0 && self.original != self.updated
        }
    }
}

/// Result of handling a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "FileOutcome should be checked or reported"]
pub enum FileOutcome {
    /// Replaced content was written to `output`
    Replaced {
        file: PathBuf,
        output: PathBuf,
        replacements: usize,
    },
    /// Matches were found but the file needed no change
    Unchanged { file: PathBuf },
    /// The match regex found nothing
    NoMatches { file: PathBuf },
    /// Replacement was skipped (validate-only runs)
    NotProcessed { file: PathBuf },
}

impl FileOutcome {
    /// The file a post-validator should look at.
    pub fn validation_target(&self) -> &Path {
        match self {
            FileOutcome::Replaced { output, .. } => output,
            FileOutcome::Unchanged { file }
            | FileOutcome::NoMatches { file }
            | FileOutcome::NotProcessed { file } => file,
        }
    }
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Replaced {
                file,
                output,
                replacements,
            } => {
                if file == output {
                    write!(f, "Replaced {} match(es) in {}", replacements, file.display())
                } else {
                    write!(
                        f,
                        "Replaced {} match(es) from {} into {}",
                        replacements,
                        file.display(),
                        output.display()
                    )
                }
            }
            FileOutcome::Unchanged { file } => write!(f, "Unchanged {}", file.display()),
            FileOutcome::NoMatches { file } => write!(f, "No matches in {}", file.display()),
            FileOutcome::NotProcessed { file } => write!(f, "Not processed {}", file.display()),
        }
    }
}

impl Repex {
    /// Compile the expressions. `match_regex` is wrapped in a named group so
    /// the whole context can be extracted from each match.
    pub fn new(
        match_regex: &str,
        replace_regex: &str,
        replace_with: &str,
        to_file: Option<PathBuf>,
        must_include: &[String],
    ) -> Result<Self, RepexError> {
        let match_expression = Regex::new(&format!("(?P<{MATCH_GROUP}>{match_regex})"))
            .map_err(|e| RepexError::regex("match", match_regex, e))?;
        let replace_expression =
            Regex::new(replace_regex).map_err(|e| RepexError::regex("replace", replace_regex, e))?;
        let must_include = must_include
            .iter()
            .map(|required| {
                Regex::new(required)
                    .map(|re| (required.clone(), re))
                    .map_err(|e| RepexError::regex("must_include", required, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            match_expression,
            replace_expression,
            replace_with: replace_with.to_string(),
            template: translate_template(replace_with),
            to_file,
            must_include,
            scope: ReplaceScope::default(),
        })
    }

    /// Build the engine from an already-expanded path definition.
    pub fn from_spec(spec: &PathSpec) -> Result<Self, RepexError> {
        Ok(Self::new(
            spec.match_regex(),
            &spec.replace,
            spec.replacement(),
            spec.to_file.as_ref().map(PathBuf::from),
            &spec.must_include,
        )?
        .with_scope(spec.scope))
    }

    pub fn with_scope(mut self, scope: ReplaceScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn scope(&self) -> ReplaceScope {
        self.scope
    }

    /// Required strings from `must_include` that `content` lacks.
    pub fn missing_required(&self, content: &str) -> Vec<String> {
        self.must_include
            .iter()
            .filter(|(_, re)| !re.is_match(content))
            .map(|(required, _)| required.clone())
            .collect()
    }

    /// Whether every `must_include` entry is present in `content`.
    pub fn validate_before(&self, content: &str) -> bool {
        debug!(
            "Looking for required strings: {:?}",
            self.must_include.iter().map(|(s, _)| s).collect::<Vec<_>>()
        );
        self.missing_required(content).is_empty()
    }

    /// Unique non-empty texts captured by the match regex.
    pub fn find_matches(&self, content: &str) -> BTreeSet<String> {
        self.match_expression
            .captures_iter(content)
            .filter_map(|caps| caps.name(MATCH_GROUP))
            .map(|m| m.as_str())
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Whether the replace regex occurs inside `match_text`.
    pub fn is_replaceable(&self, match_text: &str) -> bool {
        self.replace_expression.is_match(match_text)
    }

    /// The text one match context becomes.
    pub fn replace(&self, match_text: &str) -> String {
        self.replace_expression
            .replace_all(match_text, self.template.as_str())
            .into_owned()
    }

    /// Replace within `content`, returning the new content and how many
    /// contexts were replaceable.
    pub fn apply(&self, content: &str) -> Result<(String, usize), RepexError> {
        match self.scope {
            ReplaceScope::Literal => Ok(self.apply_literal(content)),
            ReplaceScope::Offsets => self.apply_offsets(content),
        }
    }

    fn apply_literal(&self, content: &str) -> (String, usize) {
        // Longer contexts first, so a context that contains a shorter one is
        // replaced as a whole.
        let mut matches: Vec<String> = self.find_matches(content).into_iter().collect();
        matches.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut updated = content.to_string();
        let mut replaced = 0;
        for match_text in matches {
            if !self.is_replaceable(&match_text) {
                continue;
            }
            let new_text = self.replace(&match_text);
            info!("Replacing: [ {} ] --> [ {} ]", match_text, new_text);
            updated = updated.replace(&match_text, &new_text);
            replaced += 1;
        }
        (updated, replaced)
    }

    fn apply_offsets(&self, content: &str) -> Result<(String, usize), RepexError> {
        let spans: Vec<Span> = self
            .match_expression
            .captures_iter(content)
            .filter_map(|caps| caps.name(MATCH_GROUP))
            .filter(|m| !m.as_str().is_empty() && self.is_replaceable(m.as_str()))
            .map(|m| {
                let new_text = self.replace(m.as_str());
                info!(
                    "Replacing at byte {}: [ {} ] --> [ {} ]",
                    m.start(),
                    m.as_str(),
                    new_text
                );
                Span::new(m.start(), m.end(), new_text)
            })
            .collect();

        let replaced = spans.len();
        let updated = splice(content, spans).map_err(|source| RepexError::Write {
            path: self.to_file.clone().unwrap_or_default(),
            source,
        })?;
        Ok((updated, replaced))
    }

    /// Read `file` and compute its replacement without writing anything.
    ///
    /// Fails with [`RepexError::Prevalidation`] when a `must_include` entry is
    /// missing.
    pub fn plan(&self, file: &Path) -> Result<FilePlan, RepexError> {
        let original = fs::read_to_string(file).map_err(|e| RepexError::io(file, e))?;

        if !self.must_include.is_empty() {
            let missing = self.missing_required(&original);
            if !missing.is_empty() {
                for required in &missing {
                    error!("Required string `{}` not found in {}", required, file.display());
                }
                return Err(RepexError::Prevalidation {
                    file: file.to_path_buf(),
                    missing,
                });
            }
        }

        let match_count = self.find_matches(&original).len();
        info!("Found {} matches in {}", match_count, file.display());
        info!(
            "Replacing all strings that match {} and are contained in {} with {}...",
            self.replace_expression.as_str(),
            self.match_expression.as_str(),
            self.replace_with
        );

        let (updated, replaced) = self.apply(&original).map_err(|err| match err {
            RepexError::Write { source, .. } => RepexError::Write {
                path: file.to_path_buf(),
                source,
            },
            other => other,
        })?;
        if match_count > 0 && replaced == 0 {
            info!("Found nothing to replace within matches");
        }

        Ok(FilePlan {
            file: file.to_path_buf(),
            output: self.to_file.clone().unwrap_or_else(|| file.to_path_buf()),
            original,
            updated,
            match_count,
            replaced,
        })
    }

    /// Write a plan out (temp file + rename) when it changes anything.
    pub fn commit(&self, plan: &FilePlan) -> Result<FileOutcome, RepexError> {
        if !plan.needs_write() {
            return Ok(if plan.match_count == 0 {
                FileOutcome::NoMatches {
                    file: plan.file.clone(),
                }
            } else {
                FileOutcome::Unchanged {
                    file: plan.file.clone(),
                }
            });
        }

        if plan.output != plan.file {
            info!("Writing output to {}...", plan.output.display());
        } else {
            debug!("Writing output to {}...", plan.output.display());
        }
        atomic_write(&plan.output, plan.updated.as_bytes()).map_err(|source| {
            RepexError::Write {
                path: plan.output.clone(),
                source,
            }
        })?;

        Ok(FileOutcome::Replaced {
            file: plan.file.clone(),
            output: plan.output.clone(),
            replacements: plan.replaced,
        })
    }

    /// Plan and commit in one step.
    pub fn handle_file(&self, file: &Path) -> Result<FileOutcome, RepexError> {
        let plan = self.plan(file)?;
        self.commit(&plan)
    }
}

/// Convert a `with` value using backslash backreferences (`\1`, `\g<name>`)
/// into the `regex` crate's replacement syntax.
///
/// A literal `$` is escaped, `\\` becomes a backslash, and `\n` / `\t` become
/// newline and tab. Any other backslash is kept as-is.
pub fn translate_template(with: &str) -> String {
    let mut out = String::with_capacity(with.len());
    let mut chars = with.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = String::new();
                    while let Some(&d) = chars.peek() {
                        if !d.is_ascii_digit() || group.len() == 2 {
                            break;
                        }
                        group.push(d);
                        chars.next();
                    }
                    out.push_str(&format!("${{{group}}}"));
                }
                Some('g') => {
                    let mut look = chars.clone();
                    look.next();
                    let name = if look.next() == Some('<') {
                        let mut name = String::new();
                        let mut closed = false;
                        for c in look.by_ref() {
                            if c == '>' {
                                closed = true;
                                break;
                            }
                            name.push(c);
                        }
                        (closed && !name.is_empty()).then_some(name)
                    } else {
                        None
                    };
                    match name {
                        Some(name) => {
                            out.push_str(&format!("${{{name}}}"));
                            chars = look;
                        }
                        None => out.push('\\'),
                    }
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                Some('t') => {
                    chars.next();
                    out.push('\t');
                }
                _ => out.push('\\'),
            },
            c => out.push(c),
        }
    }

    out
}
