pub mod iterate;
pub mod loader;
pub mod schema;
pub mod tags;

pub use iterate::{iterate, iterate_with_env, RunReport};
pub use loader::{load_from_path, load_from_str, load_vars_file, ConfigError};
pub use schema::{PathSpec, RepexConfig, ValidationError, ValidationIssue, ValidatorSpec};
pub use tags::{matches_tags, ANY_TAG};
