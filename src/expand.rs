//! Variable expansion for `{{ .name }}` placeholders.
//!
//! Variables come from three layers, lowest precedence first: the config
//! file's `variables`, caller-supplied variables, and `REPEX_VAR_*`
//! environment variables. The merged set is resolved against itself once,
//! then applied to every string in a path definition.
//!
//! Resolution is a single pass over the variables followed by a single pass
//! over the fields. A variable may reference another variable (and that one
//! a third, when names sort in dependency order), but deeper chains are not
//! iterated to a fixed point: anything left unresolved in a field is
//! reported as a [`RepexError::VariableExpansion`].

use crate::error::RepexError;
use regex::{Captures, Regex};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

/// Environment variables with this prefix become variables (prefix stripped,
/// name lowercased).
pub const ENV_PREFIX: &str = "REPEX_VAR_";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.([\w-]+)\s*\}\}").expect("placeholder pattern is a valid regex")
});

/// A flat name -> value variable set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    values: BTreeMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay `other` on top of `self`; `other` wins on conflicts.
    pub fn extend(&mut self, other: &Variables) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }

    /// Collect `REPEX_VAR_*` entries from an environment listing.
    pub fn from_env<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(ENV_PREFIX)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.to_lowercase(), value))
            })
            .collect()
    }

    /// Merge the three variable layers in precedence order.
    pub fn layered(config: &Variables, caller: &Variables, env: &Variables) -> Self {
        let mut merged = config.clone();
        merged.extend(caller);
        merged.extend(env);
        merged
    }

    /// Expand variables that reference other variables.
    ///
    /// One pass in name order; each value sees the already-expanded values of
    /// the names before it.
    pub fn resolved(&self) -> Self {
        let mut resolved = self.clone();
        for name in self.values.keys() {
            let current = resolved.values[name].clone();
            if PLACEHOLDER.is_match(&current) {
                let expanded = resolved.expand_str(&current);
                debug!(variable = %name, from = %current, to = %expanded, "expanded variable");
                resolved.values.insert(name.clone(), expanded);
            }
        }
        resolved
    }

    /// Substitute every known `{{ .name }}` in `input`; unknown placeholders
    /// are left in place.
    pub fn expand_str(&self, input: &str) -> String {
        PLACEHOLDER
            .replace_all(input, |caps: &Captures<'_>| match self.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

impl<K, V> FromIterator<(K, V)> for Variables
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut vars = Variables::new();
        for (name, value) in iter {
            vars.insert(name, value);
        }
        vars
    }
}

/// Expand `variables` into every string of `fields`, recursing into nested
/// mappings and sequences.
///
/// Builds a new mapping; `fields` is left untouched. Fails once, listing every
/// placeholder still present after substitution.
pub fn expand(variables: &Variables, fields: &Mapping) -> Result<Mapping, RepexError> {
    debug!("Expanding variables...");
    let variables = variables.resolved();
    let mut unresolved = Vec::new();

    let expanded: Mapping = fields
        .iter()
        .map(|(key, value)| (key.clone(), expand_value(&variables, value, &mut unresolved)))
        .collect();

    if unresolved.is_empty() {
        Ok(expanded)
    } else {
        Err(RepexError::VariableExpansion { unresolved })
    }
}

fn expand_value(variables: &Variables, value: &Value, unresolved: &mut Vec<String>) -> Value {
    match value {
        Value::String(s) => {
            let expanded = variables.expand_str(s);
            for leftover in PLACEHOLDER.find_iter(&expanded) {
                let leftover = leftover.as_str().to_string();
                if !unresolved.contains(&leftover) {
                    unresolved.push(leftover);
                }
            }
            Value::String(expanded)
        }
        Value::Mapping(map) => Value::Mapping(
            map.iter()
                .map(|(k, v)| (k.clone(), expand_value(variables, v, unresolved)))
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(
            items
                .iter()
                .map(|item| expand_value(variables, item, unresolved))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Whether `input` still carries a `{{ .name }}` placeholder.
pub fn has_placeholder(input: &str) -> bool {
    PLACEHOLDER.is_match(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs.iter().copied().collect()
    }

    fn mapping(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn get<'a>(map: &'a Mapping, key: &str) -> &'a Value {
        map.get(Value::String(key.to_string())).unwrap()
    }

    #[test]
    fn test_expand_string_field() {
        let fields = mapping("path: '{{ .some_var }}'");
        let out = expand(&vars(&[("some_var", "3.1.0-m3")]), &fields).unwrap();
        assert_eq!(get(&out, "path").as_str(), Some("3.1.0-m3"));
    }

    #[test]
    fn test_expand_nested_mapping() {
        let fields = mapping(
            "validator:\n  type: per_file\n  path: '/{{ .path }}'\n  function: validate\n",
        );
        let out = expand(&vars(&[("path", "my_validator.sh")]), &fields).unwrap();
        let validator = get(&out, "validator").as_mapping().unwrap();
        assert_eq!(get(validator, "path").as_str(), Some("/my_validator.sh"));
    }

    #[test]
    fn test_expand_sequence_keeps_order() {
        let fields = mapping("must_include: [x, y, '{{ .my_string }}']");
        let out = expand(&vars(&[("my_string", "my_value")]), &fields).unwrap();
        let items = get(&out, "must_include").as_sequence().unwrap();
        let items: Vec<_> = items.iter().map(|v| v.as_str().unwrap()).collect();
        assert_eq!(items, vec!["x", "y", "my_value"]);
    }

    #[test]
    fn test_expand_several_variables_in_one_field() {
        let fields = mapping("path: '{{ .some_var }}-{{ .some_other_var }}'");
        let out = expand(
            &vars(&[("some_var", "3.1.0"), ("some_other_var", "m3")]),
            &fields,
        )
        .unwrap();
        assert_eq!(get(&out, "path").as_str(), Some("3.1.0-m3"));
    }

    #[test]
    fn test_expand_leaves_input_untouched() {
        let fields = mapping("with: '{{ .version }}'");
        let _ = expand(&vars(&[("version", "1.0")]), &fields).unwrap();
        assert_eq!(get(&fields, "with").as_str(), Some("{{ .version }}"));
    }

    #[test]
    fn test_missing_variable_reports_all_leftovers() {
        let fields = mapping("path: '\"{{ .some_var }}\"'\nwith: '{{ .other }}{{ .some_var }}'");
        let err = expand(&vars(&[("unrelated", "1")]), &fields).unwrap_err();
        match err {
            RepexError::VariableExpansion { unresolved } => {
                assert_eq!(unresolved, vec!["{{ .some_var }}", "{{ .other }}"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_variables_referencing_variables() {
        let variables = vars(&[("base", "3.1"), ("version", "{{ .base }}.0-m3")]);
        let fields = mapping("with: '{{ .version }}'");
        let out = expand(&variables, &fields).unwrap();
        assert_eq!(get(&out, "with").as_str(), Some("3.1.0-m3"));
    }

    #[test]
    fn test_resolution_is_single_pass() {
        // `a` resolves before `b` and `c` exist in expanded form, so the
        // reference from `a` stays partially expanded.
        let variables = vars(&[("a", "{{ .b }}"), ("b", "{{ .c }}"), ("c", "deep")]);
        let resolved = variables.resolved();
        assert_eq!(resolved.get("c"), Some("deep"));
        assert_eq!(resolved.get("b"), Some("deep"));
        assert_eq!(resolved.get("a"), Some("{{ .c }}"));
    }

    #[test]
    fn test_non_string_values_pass_through() {
        let fields = mapping("diff: true\ncount: 3");
        let out = expand(&Variables::new(), &fields).unwrap();
        assert_eq!(get(&out, "diff").as_bool(), Some(true));
        assert_eq!(get(&out, "count").as_u64(), Some(3));
    }

    #[test]
    fn test_env_prefix_stripped_and_lowercased() {
        let env = vec![
            ("REPEX_VAR_VERSION".to_string(), "3.1.0-m9".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("REPEX_VAR_".to_string(), "ignored".to_string()),
        ];
        let variables = Variables::from_env(env);
        assert_eq!(variables.len(), 1);
        assert_eq!(variables.get("version"), Some("3.1.0-m9"));
    }

    #[test]
    fn test_layer_precedence() {
        let config = vars(&[("version", "config"), ("name", "config")]);
        let caller = vars(&[("version", "caller"), ("user", "caller")]);
        let env = vars(&[("version", "env")]);
        let merged = Variables::layered(&config, &caller, &env);
        assert_eq!(merged.get("version"), Some("env"));
        assert_eq!(merged.get("name"), Some("config"));
        assert_eq!(merged.get("user"), Some("caller"));
    }

    #[test]
    fn test_placeholder_spacing_is_flexible() {
        let variables = vars(&[("v", "1")]);
        assert_eq!(variables.expand_str("{{.v}} {{ .v }} {{  .v  }}"), "1 1 1");
    }

    proptest! {
        #[test]
        fn prop_known_variables_always_expand(
            names in proptest::collection::btree_set("[a-z][a-z0-9_]{0,8}", 1..5),
            value in "[A-Za-z0-9.\\-]{0,12}",
        ) {
            let variables: Variables = names.iter().map(|n| (n.clone(), value.clone())).collect();
            let field = names
                .iter()
                .map(|n| format!("<{{{{ .{n} }}}}>"))
                .collect::<Vec<_>>()
                .join(" ");
            let mut fields = Mapping::new();
            fields.insert(Value::String("with".into()), Value::String(field));

            let out = expand(&variables, &fields).unwrap();
            let expanded = out.get(Value::String("with".into())).unwrap().as_str().unwrap();
            prop_assert!(!has_placeholder(expanded));
        }

        #[test]
        fn prop_missing_variable_is_named_exactly(name in "[a-z][a-z0-9_]{0,8}") {
            let mut fields = Mapping::new();
            fields.insert(
                Value::String("path".into()),
                Value::String(format!("x-{{{{ .{name} }}}}-y")),
            );
            let err = expand(&Variables::new(), &fields).unwrap_err();
            match err {
                RepexError::VariableExpansion { unresolved } => {
                    prop_assert_eq!(unresolved, vec![format!("{{{{ .{name} }}}}")]);
                }
                other => prop_assert!(false, "unexpected error: {}", other),
            }
        }
    }
}
