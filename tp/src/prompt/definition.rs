//! Prompt definitions: one schema bound to one template

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::error::{PromptError, RenderError, SpecificationError};
use crate::schema::{Field, FieldType, Schema};
use crate::template::{Renderer, ResolvedTemplate, TemplateRef, TemplateResolver};
use crate::validate::{ValidatedInput, Validator};

/// Shared by definitions that are not given their own resolver
static DEFAULT_RESOLVER: LazyLock<Arc<TemplateResolver>> = LazyLock::new(|| Arc::new(TemplateResolver::new()));

/// Shared by definitions that are not given their own renderer
static DEFAULT_RENDERER: LazyLock<Arc<Renderer>> = LazyLock::new(|| Arc::new(Renderer::default()));

static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("expression pattern"));

/// Reusable binding of a [`Schema`] to a user template and an optional system template
///
/// `render` validates raw inputs against the schema, resolves the template
/// and renders it. A validation failure aborts before any template work.
#[derive(Clone)]
pub struct PromptDefinition {
    schema: Arc<Schema>,
    template: TemplateRef,
    system_template: Option<TemplateRef>,
    resolver: Arc<TemplateResolver>,
    renderer: Arc<Renderer>,
    validator: Validator,
}

impl fmt::Debug for PromptDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptDefinition")
            .field("fields", &self.schema.names().collect::<Vec<_>>())
            .field("template", &self.template.to_string())
            .field("system_template", &self.system_template.as_ref().map(|t| t.to_string()))
            .finish_non_exhaustive()
    }
}

impl PromptDefinition {
    pub fn new(schema: Schema, template: impl Into<TemplateRef>) -> Self {
        let template = template.into();
        debug!(%template, field_count = schema.len(), "PromptDefinition::new: called");
        Self {
            schema: Arc::new(schema),
            template,
            system_template: None,
            resolver: DEFAULT_RESOLVER.clone(),
            renderer: DEFAULT_RENDERER.clone(),
            validator: Validator::default(),
        }
    }

    pub fn with_system_template(mut self, template: impl Into<TemplateRef>) -> Self {
        self.system_template = Some(template.into());
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<TemplateResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn template(&self) -> &TemplateRef {
        &self.template
    }

    pub fn system_template(&self) -> Option<&TemplateRef> {
        self.system_template.as_ref()
    }

    pub fn resolver(&self) -> &Arc<TemplateResolver> {
        &self.resolver
    }

    /// New definition with `fields` layered over this schema
    ///
    /// Same-named fields replace the inherited ones entirely. The template is
    /// inherited unless `template` is given; the system template, resolver,
    /// renderer and validator are always inherited.
    pub fn derive(
        &self,
        fields: impl IntoIterator<Item = Field>,
        template: Option<TemplateRef>,
    ) -> Result<Self, SpecificationError> {
        let schema = Schema::extend(&self.schema, fields)?;
        debug!(
            base_count = self.schema.len(),
            derived_count = schema.len(),
            new_template = template.is_some(),
            "PromptDefinition::derive: called"
        );
        Ok(Self {
            schema: Arc::new(schema),
            template: template.unwrap_or_else(|| self.template.clone()),
            ..self.clone()
        })
    }

    /// Check raw inputs without rendering
    pub fn validate<I: Serialize + ?Sized>(&self, inputs: &I) -> Result<ValidatedInput, PromptError> {
        let raw = serde_json::to_value(inputs)?;
        Ok(self.validator.validate(&self.schema, &raw)?)
    }

    /// Render the user prompt
    pub fn render<I: Serialize + ?Sized>(&self, inputs: &I) -> Result<String, PromptError> {
        let validated = self.validate(inputs)?;
        let text = self.render_template(&self.template, &validated)?;
        info!(template = %self.template, len = text.len(), "Rendered prompt");
        Ok(text)
    }

    /// Render the system prompt (if any) and the user prompt from one validated input
    pub fn render_prompt<I: Serialize + ?Sized>(&self, inputs: &I) -> Result<RenderedPrompt, PromptError> {
        let validated = self.validate(inputs)?;
        let system = match &self.system_template {
            Some(template) => Some(self.render_template(template, &validated)?),
            None => None,
        };
        let user = self.render_template(&self.template, &validated)?;
        info!(template = %self.template, has_system = system.is_some(), "Rendered prompt messages");
        Ok(RenderedPrompt { system, user })
    }

    /// Check the templates against the schema without real inputs
    ///
    /// Resolves the user and system templates and renders each one twice with
    /// sample values built from the schema: once with every field truthy and
    /// once with every field empty, so both arms of `{{#if}}` blocks are
    /// visited. Fails on a missing template, a syntax error, or a reference to
    /// a name the schema does not declare. Names below an `any` field are not
    /// checked, and undeclared names are only caught by a strict renderer.
    pub fn check(&self) -> Result<(), SpecificationError> {
        for template in self.templates() {
            debug!(%template, "PromptDefinition::check: called");
            let resolved = self.resolve_for_check(template)?;
            for truthy in [true, false] {
                let context = sample_context(&self.schema, truthy);
                match self.renderer.render_value(&resolved, &context) {
                    Ok(_) => {}
                    Err(RenderError::Syntax { template, message }) => {
                        return Err(SpecificationError::TemplateSyntax { template, message });
                    }
                    Err(RenderError::UndefinedVariable { template, name }) => {
                        if below_any(&self.schema, &name) {
                            debug!(%template, %name, "PromptDefinition::check: reference below an any field");
                            continue;
                        }
                        return Err(SpecificationError::UndeclaredVariable {
                            template,
                            variable: name,
                        });
                    }
                    Err(RenderError::Engine { template, message }) => {
                        debug!(%template, %message, "PromptDefinition::check: sample render failed");
                    }
                }
            }
        }
        Ok(())
    }

    /// Fail if a top-level field is never mentioned by any template or partial
    ///
    /// Opt-in: fields that exist only to be forwarded by a custom helper or
    /// reached through `this` lookups are reported too.
    pub fn check_unused(&self) -> Result<(), SpecificationError> {
        let mut mentioned = HashSet::new();
        for template in self.templates() {
            let resolved = self.resolve_for_check(template)?;
            let texts =
                std::iter::once(resolved.root().raw_text()).chain(resolved.partials().map(|(_, s)| s.raw_text()));
            for text in texts {
                for caps in EXPRESSION.captures_iter(text) {
                    mentioned.extend(
                        caps[1]
                            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                            .filter(|word| !word.is_empty())
                            .map(str::to_string),
                    );
                }
            }
        }

        let unused: Vec<String> = self
            .schema
            .names()
            .filter(|name| !mentioned.contains(*name))
            .map(str::to_string)
            .collect();
        if unused.is_empty() {
            Ok(())
        } else {
            Err(SpecificationError::UnusedFields { fields: unused })
        }
    }

    fn templates(&self) -> impl Iterator<Item = &TemplateRef> {
        std::iter::once(&self.template).chain(self.system_template.iter())
    }

    fn resolve_for_check(&self, template: &TemplateRef) -> Result<ResolvedTemplate, SpecificationError> {
        self.resolver
            .resolve(template)
            .map_err(|source| SpecificationError::UnresolvedTemplate {
                template: template.to_string(),
                source,
            })
    }

    fn render_template(&self, template: &TemplateRef, validated: &ValidatedInput) -> Result<String, PromptError> {
        debug!(%template, "PromptDefinition::render_template: called");
        let resolved = self.resolver.resolve(template)?;
        Ok(self.renderer.render(&resolved, validated)?)
    }
}

/// A context with a sample value for every field of `schema`
fn sample_context(schema: &Schema, truthy: bool) -> Value {
    let map: Map<String, Value> = schema
        .effective_fields()
        .iter()
        .map(|(name, field)| (name.clone(), sample_value(field, truthy)))
        .collect();
    Value::Object(map)
}

fn sample_value(field: &Field, truthy: bool) -> Value {
    if truthy && let Some(first) = field.constraints().one_of.as_ref().and_then(|values| values.first()) {
        return first.clone();
    }
    sample_for_type(field.field_type(), truthy)
}

fn sample_for_type(ty: &FieldType, truthy: bool) -> Value {
    match ty {
        FieldType::String => json!(if truthy { "x" } else { "" }),
        FieldType::Integer => json!(if truthy { 1 } else { 0 }),
        FieldType::Float => json!(if truthy { 1.5 } else { 0.0 }),
        FieldType::Boolean => Value::Bool(truthy),
        FieldType::Any => Value::Null,
        FieldType::List(item) => match item.as_ref() {
            FieldType::Any => json!([]),
            item if truthy => json!([sample_for_type(item, true)]),
            _ => json!([]),
        },
        FieldType::Object(schema) => sample_context(schema, truthy),
    }
}

/// Does the dotted `path` pass through an `any` field?
fn below_any(schema: &Schema, path: &str) -> bool {
    let mut current = schema;
    for segment in path.split('.').filter(|s| !s.is_empty() && *s != "this") {
        let Some(field) = current.get(segment) else {
            return false;
        };
        let ty = match field.field_type() {
            FieldType::List(item) => item.as_ref(),
            ty => ty,
        };
        match ty {
            FieldType::Any => return true,
            FieldType::Object(nested) => current = nested.as_ref(),
            _ => return false,
        }
    }
    false
}

/// Who a message is from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
        }
    }
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Rendered system and user prompts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPrompt {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub system: Option<String>,
    pub user: String,
}

impl RenderedPrompt {
    /// Messages in send order: system (when present), then user
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(Message {
                role: Role::System,
                content: system.clone(),
            });
        }
        messages.push(Message {
            role: Role::User,
            content: self.user.clone(),
        });
        messages
    }

    /// Messages as a JSON array of `{role, content}` objects
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self.messages())
    }
}
