use crate::engine::ReplaceScope;
use crate::expand::Variables;
use crate::validator::ValidationPolicy;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct RepexConfig {
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub paths: Vec<PathSpec>,
}

impl RepexConfig {
    /// Check the whole config and report every problem at once.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        for (name, value) in &self.variables {
            if scalar_to_string(value).is_none() {
                issues.push(ValidationIssue::NonScalarVariable { name: name.clone() });
            }
        }

        if self.paths.is_empty() {
            issues.push(ValidationIssue::EmptyPathList);
        }

        for (index, spec) in self.paths.iter().enumerate() {
            if spec.path.trim().is_empty() {
                issues.push(ValidationIssue::MissingField { index, field: "path" });
            }
            if spec.replace.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    index,
                    field: "replace",
                });
            }
            if spec.with.is_none() {
                issues.push(ValidationIssue::MissingField { index, field: "with" });
            }
            if let Some(validator) = &spec.validator {
                if validator.function.as_deref().unwrap_or("").trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        index,
                        field: "validator.function",
                    });
                }
                if validator.path.as_deref().unwrap_or("").trim().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        index,
                        field: "validator.path",
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// The config's own variables, stringified.
    pub fn variables(&self) -> Variables {
        self.variables
            .iter()
            .filter_map(|(name, value)| scalar_to_string(value).map(|v| (name.clone(), v)))
            .collect()
    }
}

/// One entry of the `paths` list.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct PathSpec {
    #[serde(default)]
    pub path: String,
    /// Filename regex; when set, `path` is a directory regex and the entry
    /// covers every matching file under `base_directory`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_directory: Option<String>,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_expression: Option<String>,
    #[serde(default)]
    pub replace: String,
    #[serde(
        default,
        deserialize_with = "scalar_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub with: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_file: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<ValidatorSpec>,
    #[serde(default)]
    pub diff: bool,
    #[serde(default)]
    pub scope: ReplaceScope,
}

impl PathSpec {
    /// The context regex; falls back to `replace`.
    pub fn match_regex(&self) -> &str {
        self.match_expression.as_deref().unwrap_or(&self.replace)
    }

    pub fn replacement(&self) -> &str {
        self.with.as_deref().unwrap_or_default()
    }

    pub fn is_multi_file(&self) -> bool {
        self.file_type.is_some()
    }
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct ValidatorSpec {
    #[serde(rename = "type", default)]
    pub policy: ValidationPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// Strings, numbers and booleans all read as text (`with: 1.0` is "1.0").
fn scalar_field<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar_to_string(&value)
            .map(Some)
            .ok_or_else(|| de::Error::custom("expected a string, number or boolean")),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyPathList,
    MissingField { index: usize, field: &'static str },
    NonScalarVariable { name: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPathList => write!(f, "config contains no paths"),
            ValidationIssue::MissingField { index, field } => {
                write!(f, "paths[{index}] missing required field '{field}'")
            }
            ValidationIssue::NonScalarVariable { name } => {
                write!(f, "variable '{name}' must be a string, number or boolean")
            }
        }
    }
}
