//! Variable interpolation for strings
//!
//! Replaces `${NAME}` references with values from the host's extra
//! environment or the variable store. Unknown names are left as written.

use crate::runner::variables::VariableStore;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{(.*?)\}").expect("valid interpolation regex"))
}

/// Interpolate `${NAME}` references in a string
///
/// The extra environment is consulted before the store. Replacement is a
/// single pass; substituted values are not scanned again.
pub fn template_string(
    variables: &VariableStore,
    extra_env: &BTreeMap<String, String>,
    s: &str,
) -> String {
    if !s.contains("${") {
        return s.to_string();
    }

    reference_regex()
        .replace_all(s, |caps: &Captures| {
            let name = &caps[1];
            if let Some(value) = extra_env.get(name) {
                return value.clone();
            }
            match variables.get_set_variable(name) {
                Some(variable) => variable.value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Interpolate every value in a map
pub fn template_map(
    variables: &VariableStore,
    extra_env: &BTreeMap<String, String>,
    map: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    map.iter()
        .map(|(key, value)| (key.clone(), template_string(variables, extra_env, value)))
        .collect()
}

/// Interpolate a list of strings
pub fn template_list(
    variables: &VariableStore,
    extra_env: &BTreeMap<String, String>,
    list: &[String],
) -> Vec<String> {
    list.iter()
        .map(|s| template_string(variables, extra_env, s))
        .collect()
}
