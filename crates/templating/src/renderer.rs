//! Interpreter for parsed templates.

use std::collections::HashMap;

use analysis_core::TemplateError;
use tracing::trace;

use crate::context::{ContextValue, ExperimentContext};
use crate::functions::{builtin_functions, TemplateFunction};
use crate::parser::{parse_template, Expr, Segment};

/// Render `template` against `context` with the built-in macros.
pub fn render(template: &str, context: &ExperimentContext) -> Result<String, TemplateError> {
    TemplateRenderer::new().render(template, context)
}

/// Expands `{{ ... }}` blocks. Holds the function allow-list; rendering itself
/// is pure.
pub struct TemplateRenderer {
    functions: HashMap<String, TemplateFunction>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let functions = builtin_functions()
            .into_iter()
            .map(|(name, f)| (name.to_string(), f))
            .collect();
        Self { functions }
    }

    pub fn register_function(&mut self, name: impl Into<String>, function: TemplateFunction) {
        self.functions.insert(name.into(), function);
    }

    pub fn render(
        &self,
        template: &str,
        context: &ExperimentContext,
    ) -> Result<String, TemplateError> {
        self.render_with_stack(template, context, &mut Vec::new())
    }

    /// Render the value of a named field. The field counts as "in progress"
    /// so a template that reaches itself, directly or through other template
    /// attributes, fails with [`TemplateError::Cycle`].
    pub fn render_field(
        &self,
        field: &str,
        template: &str,
        context: &ExperimentContext,
    ) -> Result<String, TemplateError> {
        let mut stack = vec![field.to_string()];
        self.render_with_stack(template, context, &mut stack)
    }

    fn render_with_stack(
        &self,
        template: &str,
        context: &ExperimentContext,
        stack: &mut Vec<String>,
    ) -> Result<String, TemplateError> {
        if !template.contains("{{") {
            return Ok(template.to_string());
        }
        let mut out = String::with_capacity(template.len());
        for segment in parse_template(template)? {
            match segment {
                Segment::Text(text) => out.push_str(&text),
                Segment::Block { expr, .. } => out.push_str(&self.evaluate(&expr, context, stack)?),
            }
        }
        Ok(out)
    }

    fn evaluate(
        &self,
        expr: &Expr,
        context: &ExperimentContext,
        stack: &mut Vec<String>,
    ) -> Result<String, TemplateError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Path(parts) => {
                let path = parts.join(".");
                match context.lookup(&path) {
                    None => Err(TemplateError::UnknownAttribute(path)),
                    Some(ContextValue::Template(template)) => {
                        if stack.contains(&path) {
                            let mut chain = stack.clone();
                            chain.push(path.clone());
                            return Err(TemplateError::Cycle {
                                field: path,
                                chain: chain.join(" -> "),
                            });
                        }
                        trace!(attribute = %path, "Expanding template attribute");
                        stack.push(path);
                        let rendered = self.render_with_stack(template, context, stack);
                        stack.pop();
                        rendered
                    }
                    Some(value) => Ok(value.as_plain().unwrap_or_default()),
                }
            }
            Expr::Call { name, args } => {
                let function = self
                    .functions
                    .get(name)
                    .ok_or_else(|| TemplateError::UnknownFunction(name.clone()))?;
                if function.arity != args.len() {
                    return Err(TemplateError::Arity {
                        name: name.clone(),
                        expected: function.arity,
                        found: args.len(),
                    });
                }
                let values = args
                    .iter()
                    .map(|arg| self.evaluate(arg, context, stack))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((function.apply)(&values))
            }
        }
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn context() -> ExperimentContext {
        ExperimentContext::new()
            .with("experiment.experimenter_slug", ContextValue::text("test_slug"))
            .with(
                "experiment.start_date",
                ContextValue::Date(Utc.with_ymd_and_hms(2019, 12, 1, 0, 0, 0).unwrap()),
            )
            .with("experiment.proposed_enrollment", ContextValue::Integer(7))
            .with("experiment.end_date", ContextValue::Missing)
    }

    #[test]
    fn test_attribute_lookup() {
        let sql = render(
            "SELECT 1 FROM foo WHERE slug = '{{experiment.experimenter_slug}}'",
            &context(),
        )
        .unwrap();
        assert_eq!(sql, "SELECT 1 FROM foo WHERE slug = 'test_slug'");
    }

    #[test]
    fn test_canonical_forms() {
        let out = render(
            "{{ experiment.start_date }}/{{ experiment.proposed_enrollment }}/{{ experiment.end_date }}",
            &context(),
        )
        .unwrap();
        assert_eq!(out, "2019-12-01/7/");
    }

    #[test]
    fn test_plain_text_is_untouched() {
        assert_eq!(render("SELECT 1", &context()).unwrap(), "SELECT 1");
    }

    #[test]
    fn test_unknown_attribute() {
        let err = render("{{ experiment.missing }}", &context()).unwrap_err();
        assert_eq!(err, TemplateError::UnknownAttribute("experiment.missing".to_string()));
    }

    #[test]
    fn test_function_expansion() {
        let out = render("{{agg_histogram_mean('payload.content.my_cool_histogram')}}", &context())
            .unwrap();
        assert!(!out.contains("agg_histogram_mean"));
        assert!(out.contains("JSONExtract(payload.content.my_cool_histogram"));
    }

    #[test]
    fn test_function_with_attribute_argument() {
        let out = render("{{ agg_sum(experiment.experimenter_slug) }}", &context()).unwrap();
        assert_eq!(out, "ifNull(sum(test_slug), 0)");
    }

    #[test]
    fn test_unknown_function_and_arity() {
        assert_eq!(
            render("{{ drop_tables() }}", &context()).unwrap_err(),
            TemplateError::UnknownFunction("drop_tables".to_string())
        );
        assert!(matches!(
            render("{{ agg_sum('a', 'b') }}", &context()).unwrap_err(),
            TemplateError::Arity { expected: 1, found: 2, .. }
        ));
    }

    #[test]
    fn test_nested_template_attribute() {
        let ctx = context().with(
            "experiment.enrollment_query",
            ContextValue::Template("SELECT '{{ experiment.experimenter_slug }}'".to_string()),
        );
        let out = render("WITH e AS ({{ experiment.enrollment_query }}) SELECT 1", &ctx).unwrap();
        assert_eq!(out, "WITH e AS (SELECT 'test_slug') SELECT 1");
    }

    #[test]
    fn test_direct_self_reference() {
        let template = "{{experiment.enrollment_query}}";
        let ctx = context().with(
            "experiment.enrollment_query",
            ContextValue::Template(template.to_string()),
        );
        let renderer = TemplateRenderer::new();
        let err = renderer
            .render_field("experiment.enrollment_query", template, &ctx)
            .unwrap_err();
        assert!(matches!(err, TemplateError::Cycle { ref field, .. } if field == "experiment.enrollment_query"));

        // Without the field marker the loop is still caught on the second expansion.
        assert!(matches!(
            renderer.render(template, &ctx).unwrap_err(),
            TemplateError::Cycle { .. }
        ));
    }

    #[test]
    fn test_transitive_cycle() {
        let ctx = context()
            .with("a.x", ContextValue::Template("{{ a.y }}".to_string()))
            .with("a.y", ContextValue::Template("{{ a.x }}".to_string()));
        let err = render("{{ a.x }}", &ctx).unwrap_err();
        match err {
            TemplateError::Cycle { field, chain } => {
                assert_eq!(field, "a.x");
                assert_eq!(chain, "a.x -> a.y -> a.x");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
