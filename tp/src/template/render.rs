//! Rendering resolved templates with validated inputs
//!
//! The [`Renderer`] hands a [`ResolvedTemplate`] and the validated input
//! mapping to a [`TemplateEngine`]. It never fills in missing values; with
//! strict undefined handling on (the default), a template referencing a name
//! absent from the context fails with [`RenderError::UndefinedVariable`].

use std::fmt;
use std::sync::Arc;

use handlebars::{Handlebars, HelperDef, RenderErrorReason, handlebars_helper};
use serde_json::Value;
use tracing::debug;

use super::source::ResolvedTemplate;
use crate::config::{EscapeMode, RenderConfig};
use crate::error::RenderError;
use crate::validate::ValidatedInput;

/// Substitution and control-flow engine
pub trait TemplateEngine: Send + Sync {
    fn render(&self, template: &ResolvedTemplate, context: &Value) -> Result<String, RenderError>;
}

handlebars_helper!(join: |items: array, sep: str| {
    items
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(sep)
});

/// Handlebars-backed engine
///
/// Configuration lives on this value rather than in a process-wide registry:
/// each render clones the configured registry and adds the template's partials.
#[derive(Clone)]
pub struct HandlebarsEngine {
    registry: Handlebars<'static>,
}

impl Default for HandlebarsEngine {
    fn default() -> Self {
        Self::from_config(&RenderConfig::default())
    }
}

impl fmt::Debug for HandlebarsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlebarsEngine")
            .field("strict", &self.registry.strict_mode())
            .finish_non_exhaustive()
    }
}

impl HandlebarsEngine {
    pub fn from_config(config: &RenderConfig) -> Self {
        debug!(strict = config.strict_undefined, escape = ?config.escape, "HandlebarsEngine::from_config: called");
        let mut registry = Handlebars::new();
        registry.set_strict_mode(config.strict_undefined);
        if config.escape == EscapeMode::None {
            registry.register_escape_fn(handlebars::no_escape);
        }
        registry.register_helper("join", Box::new(join));
        Self { registry }
    }

    /// Add a custom helper available to every template this engine renders
    pub fn register_helper(&mut self, name: &str, helper: Box<dyn HelperDef + Send + Sync + 'static>) {
        debug!(%name, "HandlebarsEngine::register_helper: called");
        self.registry.register_helper(name, helper);
    }

    pub fn is_strict(&self) -> bool {
        self.registry.strict_mode()
    }
}

impl TemplateEngine for HandlebarsEngine {
    fn render(&self, template: &ResolvedTemplate, context: &Value) -> Result<String, RenderError> {
        let name = template.name();
        debug!(%name, partials = template.partials().count(), "HandlebarsEngine::render: called");

        let mut hbs = self.registry.clone();
        for (partial_name, source) in template.partials() {
            hbs.register_partial(partial_name, source.raw_text())
                .map_err(|e| RenderError::Syntax {
                    template: source.id().to_string(),
                    message: e.to_string(),
                })?;
        }
        hbs.register_template_string(&name, template.root().raw_text())
            .map_err(|e| RenderError::Syntax {
                template: name.clone(),
                message: e.to_string(),
            })?;

        hbs.render(&name, context).map_err(|e| classify(&name, e))
    }
}

fn classify(template: &str, err: handlebars::RenderError) -> RenderError {
    debug!(%template, error = %err, "classify: render failed");
    match err.reason() {
        RenderErrorReason::MissingVariable(path) => RenderError::UndefinedVariable {
            template: template.to_string(),
            name: path.clone().unwrap_or_default(),
        },
        RenderErrorReason::TemplateError(e) => RenderError::Syntax {
            template: template.to_string(),
            message: e.to_string(),
        },
        _ => RenderError::Engine {
            template: template.to_string(),
            message: err.to_string(),
        },
    }
}

/// Renders resolved templates from validated inputs
#[derive(Clone)]
pub struct Renderer {
    engine: Arc<dyn TemplateEngine>,
    trim_output: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::from_config(&RenderConfig::default())
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("trim_output", &self.trim_output)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    pub fn new(engine: Arc<dyn TemplateEngine>) -> Self {
        Self {
            engine,
            trim_output: true,
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            engine: Arc::new(HandlebarsEngine::from_config(config)),
            trim_output: config.trim_output,
        }
    }

    pub fn with_trim_output(mut self, trim: bool) -> Self {
        self.trim_output = trim;
        self
    }

    pub fn render(&self, template: &ResolvedTemplate, input: &ValidatedInput) -> Result<String, RenderError> {
        debug!(template = %template.name(), inputs = input.len(), "Renderer::render: called");
        self.render_value(template, &input.to_value())
    }

    /// Render with an arbitrary context, skipping validation
    pub fn render_value(&self, template: &ResolvedTemplate, context: &Value) -> Result<String, RenderError> {
        let text = self.engine.render(template, context)?;
        Ok(if self.trim_output { text.trim().to_string() } else { text })
    }
}
