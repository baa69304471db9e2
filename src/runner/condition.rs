//! Conditional gate evaluation
//!
//! Handles the `if:` field of an action.

use crate::error::TemplateError;
use crate::runner::template::{render_str, TemplateContext, EXPRESSION_END, EXPRESSION_START};

/// Evaluate an action's condition
///
/// An empty condition is true. A bare expression such as
/// `inputs.mode == "fast"` is wrapped in `${{ }}` before rendering. The
/// condition holds only when the trimmed output is exactly `true`.
pub fn eval_conditional(
    condition: Option<&str>,
    context: &TemplateContext,
) -> Result<bool, TemplateError> {
    let condition = match condition.map(str::trim) {
        Some(condition) if !condition.is_empty() => condition,
        _ => return Ok(true),
    };

    let source = if condition.contains(EXPRESSION_START) {
        condition.to_string()
    } else {
        format!("{} {} {}", EXPRESSION_START, condition, EXPRESSION_END)
    };

    Ok(render_str(&source, context)?.trim() == "true")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TemplateContext {
        let mut ctx = TemplateContext::default();
        ctx.inputs.insert("mode".to_string(), "fast".to_string());
        ctx.variables.insert("ENABLED".to_string(), "true".to_string());
        ctx
    }

    #[test]
    fn test_empty_condition_is_true() {
        assert!(eval_conditional(None, &context()).unwrap());
        assert!(eval_conditional(Some("  "), &context()).unwrap());
    }

    #[test]
    fn test_wrapped_expression() {
        let ctx = context();
        assert!(eval_conditional(Some("${{ inputs.mode == \"fast\" }}"), &ctx).unwrap());
        assert!(!eval_conditional(Some("${{ inputs.mode == \"slow\" }}"), &ctx).unwrap());
    }

    #[test]
    fn test_bare_expression() {
        let ctx = context();
        assert!(eval_conditional(Some("variables.ENABLED == \"true\""), &ctx).unwrap());
        assert!(eval_conditional(Some("true"), &ctx).unwrap());
        assert!(!eval_conditional(Some("false"), &ctx).unwrap());
    }

    #[test]
    fn test_only_exact_true_passes() {
        let ctx = context();
        assert!(!eval_conditional(Some("${{ inputs.mode }}"), &ctx).unwrap());
        assert!(eval_conditional(Some("${{ variables.ENABLED }}"), &ctx).unwrap());
    }

    #[test]
    fn test_undefined_reference_fails() {
        assert!(eval_conditional(Some("inputs.nope == \"x\""), &context()).is_err());
    }
}
