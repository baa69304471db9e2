//! Structured templating of actions
//!
//! Actions are templated with `${{ ... }}` expressions over two namespaces:
//! `inputs` (the caller's `with` values, falling back to input defaults)
//! and `variables` (the variable store). Undefined references are errors.

use crate::config::types::{Action, InputParameter};
use crate::error::TemplateError;
use crate::runner::variables::VariableStore;
use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, UndefinedBehavior, Value};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Opening delimiter for structured expressions
pub const EXPRESSION_START: &str = "${{";

/// Closing delimiter for structured expressions
pub const EXPRESSION_END: &str = "}}";

/// Values visible to structured templates
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateContext {
    pub inputs: BTreeMap<String, String>,
    pub variables: BTreeMap<String, String>,
}

impl TemplateContext {
    /// Build the context for a task invocation
    pub fn new(
        withs: &BTreeMap<String, String>,
        inputs: &BTreeMap<String, InputParameter>,
        variables: &VariableStore,
    ) -> Self {
        let mut resolved = withs.clone();
        for (name, input) in inputs {
            let supplied = resolved.get(name).is_some_and(|value| !value.is_empty());
            if !supplied {
                resolved.insert(name.clone(), input.default.clone());
            }
        }

        TemplateContext {
            inputs: resolved,
            variables: variables.values(),
        }
    }
}

fn environment() -> Result<Environment<'static>, TemplateError> {
    let syntax = SyntaxConfig::builder()
        .block_delimiters("${%", "%}")
        .variable_delimiters(EXPRESSION_START, EXPRESSION_END)
        .comment_delimiters("${#{", "}#}")
        .build()?;

    let mut env = Environment::new();
    env.set_syntax(syntax);
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    Ok(env)
}

fn legacy_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\$\{\{-?\s*)\.(inputs|variables)\b").expect("valid legacy reference regex")
    })
}

/// Rewrite `${{ .inputs.x }}` style references to `${{ inputs.x }}`
fn normalize_references(source: &str) -> String {
    legacy_reference_regex()
        .replace_all(source, "$1$2")
        .into_owned()
}

/// Render a single string against the context
pub fn render_str(source: &str, context: &TemplateContext) -> Result<String, TemplateError> {
    if !source.contains("${") {
        return Ok(source.to_string());
    }
    let env = environment()?;
    env.render_str(&normalize_references(source), Value::from_serialize(context))
        .map_err(|e| render_error(source, e))
}

/// Render failure naming the text that failed
fn render_error(template: &str, error: minijinja::Error) -> TemplateError {
    TemplateError::Expression {
        template: template.to_string(),
        error: error.to_string(),
    }
}

/// Template every string inside an action
///
/// The action is converted to its YAML document form, each string scalar is
/// rendered, and the result is read back as an action.
pub fn template_action(action: &Action, context: &TemplateContext) -> Result<Action, TemplateError> {
    let document =
        serde_yaml::to_value(action).map_err(|e| TemplateError::Serialize(e.to_string()))?;
    let env = environment()?;
    let ctx = Value::from_serialize(context);
    let rendered = render_value(&env, &ctx, document)?;
    serde_yaml::from_value(rendered).map_err(|e| TemplateError::Deserialize(e.to_string()))
}

fn render_value(
    env: &Environment<'static>,
    ctx: &Value,
    value: serde_yaml::Value,
) -> Result<serde_yaml::Value, TemplateError> {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::String(s) if s.contains("${") => {
            let rendered = env
                .render_str(&normalize_references(&s), ctx.clone())
                .map_err(|e| render_error(&s, e))?;
            Ok(Yaml::String(rendered))
        }
        Yaml::Sequence(items) => items
            .into_iter()
            .map(|item| render_value(env, ctx, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Yaml::Sequence),
        Yaml::Mapping(mapping) => {
            let mut rendered = serde_yaml::Mapping::new();
            for (key, item) in mapping {
                rendered.insert(key, render_value(env, ctx, item)?);
            }
            Ok(Yaml::Mapping(rendered))
        }
        other => Ok(other),
    }
}
