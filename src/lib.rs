//! Repex: regex-based text replacement driven by a YAML config
//!
//! A config lists *paths*: single files, or sets of files discovered by regex
//! under a directory tree. For every file, a `match` regex picks out the
//! contexts where replacement is allowed, and a `replace` regex is substituted
//! with `with` inside each context.
//!
//! # Pipeline
//!
//! [`iterate`] filters paths by tag and merges variables, then
//! [`handle_path`] expands `{{ .name }}` placeholders, resolves the files,
//! runs the [`Repex`] engine on each one and calls the configured
//! [`Validator`].
//!
//! Files are written atomically (tempfile + fsync + rename). Required strings
//! (`must_include`) are checked before anything is written; validators run
//! after the write and never roll it back.
//!
//! # Example
//!
//! ```no_run
//! use repex::{iterate, load_from_path, RunOptions, Variables};
//!
//! let config = load_from_path("repex.yaml").unwrap();
//! let vars: Variables = [("version", "3.1.0-m3")].into_iter().collect();
//! let report = iterate(&config, &vars, &[], &RunOptions::default()).unwrap();
//! println!("replaced in {} file(s)", report.files_replaced());
//! ```

pub mod config;
pub mod diff;
pub mod discover;
pub mod edit;
pub mod engine;
pub mod error;
pub mod expand;
pub mod logging;
pub mod process;
pub mod validator;

// Re-exports
pub use config::{
    iterate, iterate_with_env, load_from_path, load_from_str, load_vars_file, matches_tags,
    ConfigError, PathSpec, RepexConfig, RunReport, ValidatorSpec,
};
pub use diff::DiffLog;
pub use discover::{discover, Discovery, DiscoveryError};
pub use edit::{atomic_write, splice, EditError, Span};
pub use engine::{FileOutcome, FilePlan, ReplaceScope, Repex};
pub use error::RepexError;
pub use expand::{expand, Variables};
pub use process::{expand_spec, handle_path, PathReport, RunOptions};
pub use validator::{
    ScriptValidator, Validate, ValidationPolicy, Validator, ValidatorConfigError, ValidatorError,
};
