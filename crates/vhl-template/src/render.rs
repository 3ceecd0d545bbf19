use std::collections::BTreeMap;

use handlebars::{Handlebars, RenderError, RenderErrorReason};
use vhl_core::errors::{ErrorInfo, LabError};

use crate::params::ParamValue;

/// Template environment backed by a strict handlebars registry.
///
/// Strict mode turns every unresolved placeholder into an error and HTML
/// escaping is disabled because netlists are plain text.
#[derive(Debug, Clone)]
pub struct Renderer {
    registry: Handlebars<'static>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        Self { registry }
    }

    /// Registers `body` under `key` for later lookup by [`Renderer::render`].
    pub fn register(&mut self, key: &str, body: &str) -> Result<(), LabError> {
        self.registry
            .register_template_string(key, body)
            .map_err(|err| {
                LabError::Render(
                    ErrorInfo::new("template.syntax", err.to_string()).with_context("template", key),
                )
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.registry.has_template(key)
    }

    /// Renders a registered template.
    pub fn render<'a, I>(&self, key: &str, params: I) -> Result<String, LabError>
    where
        I: IntoIterator<Item = (&'a String, &'a ParamValue)>,
    {
        let bound = sorted(params);
        self.registry
            .render(key, &bound)
            .map_err(|err| render_error(key, err))
    }

    /// Renders `body` without registering it.
    pub fn render_detached<'a, I>(&self, body: &str, params: I) -> Result<String, LabError>
    where
        I: IntoIterator<Item = (&'a String, &'a ParamValue)>,
    {
        let bound = sorted(params);
        self.registry
            .render_template(body, &bound)
            .map_err(|err| render_error("<detached>", err))
    }
}

/// Renders `body` against `params` in a fresh, detached environment.
///
/// Output depends only on the body and the set of parameters, never on the
/// iteration order of the caller's collection.
pub fn render<'a, I>(body: &str, params: I) -> Result<String, LabError>
where
    I: IntoIterator<Item = (&'a String, &'a ParamValue)>,
{
    Renderer::new().render_detached(body, params)
}

fn sorted<'a, I>(params: I) -> BTreeMap<&'a str, &'a ParamValue>
where
    I: IntoIterator<Item = (&'a String, &'a ParamValue)>,
{
    params
        .into_iter()
        .map(|(name, value)| (name.as_str(), value))
        .collect()
}

fn render_error(template: &str, err: RenderError) -> LabError {
    let info = match err.reason() {
        RenderErrorReason::MissingVariable(Some(name)) => ErrorInfo::new(
            "template.missing_variable",
            format!("no value supplied for parameter `{name}`"),
        )
        .with_context("missing", name.clone()),
        RenderErrorReason::MissingVariable(None) => {
            ErrorInfo::new("template.missing_variable", err.to_string())
        }
        RenderErrorReason::TemplateError(_) => ErrorInfo::new("template.syntax", err.to_string()),
        _ => ErrorInfo::new("template.render", err.to_string()),
    };
    LabError::Render(info.with_context("template", template))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;

    #[test]
    fn substitutes_without_escaping() {
        let mut params = Params::new();
        params.insert("path".into(), ParamValue::Str("runs/a&b/out.txt".into()));
        params.insert("r".into(), ParamValue::Int(1000));
        let text = render("wrdata {{path}} v(1)\nR1 1 2 {{ r }}", &params).expect("render");
        assert_eq!(text, "wrdata runs/a&b/out.txt v(1)\nR1 1 2 1000");
    }

    #[test]
    fn missing_variable_names_the_key() {
        let err = render("R1 1 2 {{r}}", &Params::new()).expect_err("missing");
        assert_eq!(err.info().code, "template.missing_variable");
        assert_eq!(err.info().context.get("missing").map(String::as_str), Some("r"));
    }

    #[test]
    fn registered_templates_render_by_key() {
        let mut renderer = Renderer::new();
        renderer
            .register("model/divider.j2", "R1 in out {{r1}}")
            .expect("register");
        let mut params = Params::new();
        params.insert("r1".into(), ParamValue::Float(4.7e3));
        let text = renderer
            .render("model/divider.j2", &params)
            .expect("render");
        assert_eq!(text, "R1 in out 4700.0");
    }
}
