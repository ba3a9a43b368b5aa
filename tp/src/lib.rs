//! typedprompt - Schema-validated prompt templates
//!
//! A prompt is a schema of typed input fields bound to a Handlebars template.
//! Rendering validates the raw inputs against the schema first, so a missing,
//! mistyped or misspelled input is reported (all of them at once) before any
//! text is produced.
//!
//! # Core Concepts
//!
//! - **Explicit schemas**: fields are an ordered name -> [`Field`] mapping
//! - **Composition over subclassing**: [`Schema::extend`] and
//!   [`PromptDefinition::derive`] replace same-named fields in full
//! - **Strict by default**: unknown inputs and undefined template variables are errors
//! - **Template chains**: partials and layouts resolve from inline text,
//!   registered names, search directories or files
//!
//! # Modules
//!
//! - [`schema`] - Field specifications and schemas
//! - [`validate`] - Input validation and the type engine
//! - [`template`] - Template resolution, caching and rendering
//! - [`prompt`] - Prompt definitions and YAML catalogs
//! - [`config`] - Configuration types and loading
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use typedprompt::{Field, PromptDefinition, Schema};
//!
//! let schema = Schema::define([Field::string("name").build()?])?;
//! let prompt = PromptDefinition::new(schema, "Hello, {{name}}!");
//! assert_eq!(prompt.render(&json!({"name": "Ada"}))?, "Hello, Ada!");
//! # Ok::<(), typedprompt::PromptError>(())
//! ```

pub mod config;
pub mod error;
pub mod prompt;
pub mod schema;
pub mod template;
pub mod validate;

// Re-export commonly used types
pub use config::{Config, EscapeMode, RenderConfig, TemplatesConfig};
pub use error::{
    FieldError, FieldErrorKind, PromptError, RenderError, SpecificationError, TemplateNotFoundError, ValidationFailure,
};
pub use prompt::{Message, PromptCatalog, PromptDefinition, RenderedPrompt, Role};
pub use schema::{Field, FieldType, Schema};
pub use template::{Renderer, TemplateRef, TemplateResolver};
pub use validate::{ValidatedInput, Validator, validate};
