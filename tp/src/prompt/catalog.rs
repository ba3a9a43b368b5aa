//! Prompt definitions loaded from YAML
//!
//! A file holds either a map of name -> declaration or a single declaration
//! named after the file stem:
//! ```yaml
//! summarize:
//!   description: Summarize an article
//!   fields:
//!     - name: article
//!       type: string
//!       min-length: 1
//!     - name: max_words
//!       type: integer
//!       default: 100
//!   system-template: You are a careful editor.
//!   template: |
//!     Summarize in at most {{max_words}} words:
//!     {{article}}
//!
//! summarize_bullets:
//!   extends: summarize
//!   fields:
//!     - name: bullets
//!       type: list[string]
//!       required: false
//!   template-file: bullets.pmt
//! ```
//!
//! ## Inheritance
//!
//! `extends` goes through [`PromptDefinition::derive`]: a redeclared field
//! replaces the inherited one completely, and the template is inherited unless
//! the child names its own.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::definition::{PromptDefinition, RenderedPrompt};
use crate::config::Config;
use crate::error::SpecificationError;
use crate::schema::{Field, FieldType, Schema};
use crate::template::{Renderer, TemplateRef, TemplateResolver};

/// Keys a declaration may carry; a file whose top-level keys are all in here is a single declaration
const DECL_KEYS: &[&str] = &[
    "description",
    "extends",
    "fields",
    "template",
    "template-name",
    "template-file",
    "system-template",
];

/// A prompt as declared in YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromptDecl {
    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Prompt to inherit fields and templates from
    #[serde(default)]
    pub extends: Option<String>,

    /// Input fields, in order
    #[serde(default)]
    pub fields: Vec<FieldDecl>,

    /// Inline Handlebars template
    #[serde(default)]
    pub template: Option<String>,

    /// Named template, looked up by the resolver
    #[serde(rename = "template-name", default)]
    pub template_name: Option<String>,

    /// Template file, relative to the declaring YAML file
    #[serde(rename = "template-file", default)]
    pub template_file: Option<PathBuf>,

    /// Inline system prompt template
    #[serde(rename = "system-template", default)]
    pub system_template: Option<String>,
}

/// A field as declared in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    pub name: String,

    /// `string`, `integer`, `float`, `boolean`, `any`, `object` or `list[T]`
    #[serde(rename = "type", default = "default_type")]
    pub ty: String,

    /// Defaults to true unless a default is given
    #[serde(default)]
    pub required: Option<bool>,

    #[serde(default)]
    pub default: Option<Value>,

    #[serde(default)]
    pub nullable: bool,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(rename = "min-length", default)]
    pub min_length: Option<usize>,

    #[serde(rename = "max-length", default)]
    pub max_length: Option<usize>,

    #[serde(default)]
    pub min: Option<f64>,

    #[serde(default)]
    pub max: Option<f64>,

    #[serde(rename = "one-of", default)]
    pub one_of: Option<Vec<Value>>,

    #[serde(default)]
    pub pattern: Option<String>,

    /// Nested fields for `object` and `list[object]`
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

fn default_type() -> String {
    "string".to_string()
}

impl FieldDecl {
    /// Build the field this declaration describes
    pub fn to_field(&self) -> Result<Field, SpecificationError> {
        debug!(name = %self.name, ty = %self.ty, "FieldDecl::to_field: called");
        let ty = parse_type(&self.name, &self.ty, &self.fields)?;
        let mut builder = Field::builder(self.name.clone(), ty);

        match (&self.default, self.required) {
            (Some(_), Some(true)) => {
                return Err(SpecificationError::InvalidDefault {
                    name: self.name.clone(),
                    reason: "a required field cannot have a default".to_string(),
                });
            }
            (Some(default), _) => builder = builder.default(default.clone()),
            (None, Some(false)) => builder = builder.optional(),
            (None, _) => {}
        }

        if self.nullable {
            builder = builder.nullable();
        }
        if let Some(text) = &self.description {
            builder = builder.description(text.clone());
        }
        if let Some(n) = self.min_length {
            builder = builder.min_length(n);
        }
        if let Some(n) = self.max_length {
            builder = builder.max_length(n);
        }
        if let Some(n) = self.min {
            builder = builder.min(n);
        }
        if let Some(n) = self.max {
            builder = builder.max(n);
        }
        if let Some(values) = &self.one_of {
            builder = builder.one_of(values.iter().cloned());
        }
        if let Some(pattern) = &self.pattern {
            builder = builder.pattern(pattern.clone());
        }

        builder.build()
    }
}

/// Parse a type name; `nested` supplies the fields of `object` types
fn parse_type(name: &str, ty: &str, nested: &[FieldDecl]) -> Result<FieldType, SpecificationError> {
    let ty = ty.trim();
    if let Some(inner) = ty.strip_prefix("list[").and_then(|rest| rest.strip_suffix(']')) {
        return Ok(FieldType::list(parse_type(name, inner, nested)?));
    }

    match ty {
        "string" | "str" => Ok(FieldType::String),
        "integer" | "int" => Ok(FieldType::Integer),
        "float" | "number" => Ok(FieldType::Float),
        "boolean" | "bool" => Ok(FieldType::Boolean),
        "any" => Ok(FieldType::Any),
        "list" => Ok(FieldType::list(FieldType::Any)),
        "object" => {
            let fields = nested.iter().map(FieldDecl::to_field).collect::<Result<Vec<_>, _>>()?;
            Ok(FieldType::object(Schema::define(fields)?))
        }
        other => Err(SpecificationError::UnknownType {
            name: name.to_string(),
            ty: other.to_string(),
        }),
    }
}

/// A declaration and the directory its relative paths are resolved against
#[derive(Debug, Clone)]
struct RawPrompt {
    decl: PromptDecl,
    base_dir: Option<PathBuf>,
}

impl RawPrompt {
    fn template_ref(&self, name: &str) -> Result<Option<TemplateRef>, SpecificationError> {
        let decl = &self.decl;
        let given = [
            decl.template.is_some(),
            decl.template_name.is_some(),
            decl.template_file.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if given > 1 {
            return Err(SpecificationError::AmbiguousTemplate { name: name.to_string() });
        }

        if let Some(text) = &decl.template {
            return Ok(Some(TemplateRef::inline(text.as_str())));
        }
        if let Some(template_name) = &decl.template_name {
            return Ok(Some(TemplateRef::named(template_name.as_str())));
        }
        if let Some(file) = &decl.template_file {
            let path = match &self.base_dir {
                Some(dir) if file.is_relative() => dir.join(file),
                _ => file.clone(),
            };
            return Ok(Some(TemplateRef::path(path)));
        }
        Ok(None)
    }
}

/// Named prompt definitions with resolved inheritance
pub struct PromptCatalog {
    /// Declarations by name (before inheritance resolution)
    raw: BTreeMap<String, RawPrompt>,

    /// Definitions by name (after inheritance)
    prompts: BTreeMap<String, PromptDefinition>,

    resolver: Arc<TemplateResolver>,
    renderer: Arc<Renderer>,
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl PromptCatalog {
    /// Empty catalog whose prompts resolve and render with `config`
    pub fn new(config: &Config) -> Self {
        debug!(?config, "PromptCatalog::new: called");
        Self {
            raw: BTreeMap::new(),
            prompts: BTreeMap::new(),
            resolver: Arc::new(TemplateResolver::from_config(&config.templates)),
            renderer: Arc::new(Renderer::from_config(&config.render)),
        }
    }

    /// Resolver shared by every prompt in the catalog
    pub fn resolver(&self) -> &Arc<TemplateResolver> {
        &self.resolver
    }

    /// Add declarations from YAML text
    ///
    /// `default_name` names a single top-level declaration; without it the
    /// text must be a map of name -> declaration. Nothing is added unless every
    /// prompt in the resulting catalog builds.
    pub fn load_str(&mut self, content: &str, default_name: Option<&str>, base_dir: Option<&Path>) -> Result<()> {
        debug!(content_len = content.len(), ?default_name, "PromptCatalog::load_str: called");
        let mut staged = self.raw.clone();
        for (name, decl) in parse_declarations(content, default_name)? {
            debug!(%name, "PromptCatalog::load_str: staging declaration");
            staged.insert(
                name,
                RawPrompt {
                    decl,
                    base_dir: base_dir.map(Path::to_path_buf),
                },
            );
        }
        self.commit(staged)
    }

    /// Add declarations from a YAML file
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        debug!(?path, "PromptCatalog::load_file: called");
        let mut staged = self.raw.clone();
        staged.extend(read_file(path)?);
        self.commit(staged)
    }

    /// Add declarations from every `.yml`/`.yaml` file in a directory
    ///
    /// Files that fail to parse are skipped with a warning.
    pub fn load_dir(&mut self, dir: &Path) -> Result<()> {
        debug!(?dir, "PromptCatalog::load_dir: called");
        let entries = fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "yml" || e == "yaml").unwrap_or(false))
            .collect();
        paths.sort();

        let mut staged = self.raw.clone();
        for path in &paths {
            match read_file(path) {
                Ok(declarations) => staged.extend(declarations),
                Err(e) => warn!(?path, error = %e, "Failed to load prompt file"),
            }
        }

        self.commit(staged)
    }

    /// Build every prompt from `staged`; on success it replaces the current declarations
    fn commit(&mut self, staged: BTreeMap<String, RawPrompt>) -> Result<()> {
        let prompts = self.resolve_inheritance(&staged)?;
        self.raw = staged;
        self.prompts = prompts;
        info!(count = self.prompts.len(), "Loaded prompt definitions");
        Ok(())
    }

    fn resolve_inheritance(&self, raw: &BTreeMap<String, RawPrompt>) -> Result<BTreeMap<String, PromptDefinition>> {
        debug!(raw_count = raw.len(), "PromptCatalog::resolve_inheritance: called");
        let mut resolved: HashMap<String, PromptDefinition> = HashMap::new();
        for name in raw.keys() {
            self.resolve_single(raw, name, &mut Vec::new(), &mut resolved)
                .with_context(|| format!("Failed to build prompt '{}'", name))?;
        }
        Ok(resolved.into_iter().collect())
    }

    fn resolve_single(
        &self,
        all_raw: &BTreeMap<String, RawPrompt>,
        name: &str,
        visited: &mut Vec<String>,
        resolved: &mut HashMap<String, PromptDefinition>,
    ) -> Result<PromptDefinition, SpecificationError> {
        if let Some(done) = resolved.get(name) {
            return Ok(done.clone());
        }
        if visited.iter().any(|v| v == name) {
            debug!(%name, ?visited, "PromptCatalog::resolve_single: cycle detected");
            return Err(SpecificationError::InheritanceCycle {
                chain: format!("{} -> {}", visited.join(" -> "), name),
            });
        }
        visited.push(name.to_string());

        let raw = all_raw.get(name).ok_or_else(|| SpecificationError::UnknownBase {
            name: visited.first().cloned().unwrap_or_default(),
            base: name.to_string(),
        })?;
        let fields = raw.decl.fields.iter().map(FieldDecl::to_field).collect::<Result<Vec<_>, _>>()?;
        let template = raw.template_ref(name)?;

        let mut definition = match &raw.decl.extends {
            Some(base_name) => {
                if !all_raw.contains_key(base_name) {
                    return Err(SpecificationError::UnknownBase {
                        name: name.to_string(),
                        base: base_name.clone(),
                    });
                }
                debug!(%name, %base_name, "PromptCatalog::resolve_single: deriving from base");
                let base = self.resolve_single(all_raw, base_name, visited, resolved)?;
                base.derive(fields, template)?
            }
            None => {
                let template = template.ok_or_else(|| SpecificationError::MissingTemplate { name: name.to_string() })?;
                PromptDefinition::new(Schema::define(fields)?, template)
                    .with_resolver(self.resolver.clone())
                    .with_renderer(self.renderer.clone())
            }
        };
        if let Some(system) = &raw.decl.system_template {
            definition = definition.with_system_template(TemplateRef::inline(system.as_str()));
        }
        definition.check()?;

        visited.pop();
        resolved.insert(name.to_string(), definition.clone());
        Ok(definition)
    }

    pub fn get(&self, name: &str) -> Option<&PromptDefinition> {
        self.prompts.get(name)
    }

    /// Declared description of a prompt
    pub fn description(&self, name: &str) -> Option<&str> {
        self.raw.get(name).map(|raw| raw.decl.description.as_str())
    }

    /// Prompt names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.prompts.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Render the user prompt of `name`
    ///
    /// Failures from the prompt itself are [`crate::PromptError`]s and can be
    /// recovered with `downcast_ref`.
    pub fn render<I: Serialize + ?Sized>(&self, name: &str, inputs: &I) -> Result<String> {
        debug!(%name, "PromptCatalog::render: called");
        let prompt = self.get(name).ok_or_else(|| eyre::eyre!("Unknown prompt: {}", name))?;
        Ok(prompt.render(inputs)?)
    }

    /// Render the system and user prompts of `name`
    pub fn render_prompt<I: Serialize + ?Sized>(&self, name: &str, inputs: &I) -> Result<RenderedPrompt> {
        debug!(%name, "PromptCatalog::render_prompt: called");
        let prompt = self.get(name).ok_or_else(|| eyre::eyre!("Unknown prompt: {}", name))?;
        Ok(prompt.render_prompt(inputs)?)
    }
}

/// Declarations of one YAML file, each remembering the file's directory
fn read_file(path: &Path) -> Result<Vec<(String, RawPrompt)>> {
    debug!(?path, "read_file: called");
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read: {}", path.display()))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| eyre::eyre!("Invalid filename: {}", path.display()))?;

    let declarations =
        parse_declarations(&content, Some(stem)).with_context(|| format!("Failed to parse: {}", path.display()))?;
    debug!(?path, count = declarations.len(), "read_file: parsed declarations");
    Ok(declarations
        .into_iter()
        .map(|(name, decl)| {
            (
                name,
                RawPrompt {
                    decl,
                    base_dir: path.parent().map(Path::to_path_buf),
                },
            )
        })
        .collect())
}

/// A map of name -> declaration, or a single declaration named `default_name`
///
/// The single form is chosen only when `default_name` is given and every
/// top-level key is a declaration key.
fn parse_declarations(content: &str, default_name: Option<&str>) -> Result<Vec<(String, PromptDecl)>> {
    let value: serde_yaml::Value = serde_yaml::from_str(content).context("Invalid YAML")?;
    if value.is_null() {
        debug!("parse_declarations: empty document");
        return Ok(Vec::new());
    }

    let single = match (&value, default_name) {
        (serde_yaml::Value::Mapping(map), Some(name)) if !map.is_empty() => {
            let all_decl_keys = map.keys().all(|k| k.as_str().map(|k| DECL_KEYS.contains(&k)).unwrap_or(false));
            all_decl_keys.then_some(name)
        }
        _ => None,
    };

    if let Some(name) = single {
        debug!(%name, "parse_declarations: parsing as single declaration");
        let decl: PromptDecl = serde_yaml::from_value(value).context("Failed to parse prompt declaration")?;
        return Ok(vec![(name.to_string(), decl)]);
    }

    let map: BTreeMap<String, PromptDecl> =
        serde_yaml::from_value(value).context("Expected a map of prompt name to declaration")?;
    debug!(count = map.len(), "parse_declarations: parsed as map");
    Ok(map.into_iter().collect())
}
