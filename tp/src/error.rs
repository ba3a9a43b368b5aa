//! Error types
//!
//! Four failure classes, one per pipeline stage, plus [`PromptError`] which
//! wraps them so `render` can use `?` across the whole chain.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A schema or prompt definition is malformed. Raised at definition time.
#[derive(Debug, Error)]
pub enum SpecificationError {
    #[error("Duplicate field name: {name}")]
    DuplicateField { name: String },

    #[error("Optional field '{name}' of type {ty} needs a default (the type has no empty rendering)")]
    MissingDefault { name: String, ty: String },

    #[error("Default for field '{name}' is invalid: {reason}")]
    InvalidDefault { name: String, reason: String },

    #[error("Invalid constraint on field '{name}': {reason}")]
    InvalidConstraint { name: String, reason: String },

    #[error("Invalid pattern on field '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unknown type '{ty}' for field '{name}'")]
    UnknownType { name: String, ty: String },

    #[error("Prompt '{name}' extends unknown prompt '{base}'")]
    UnknownBase { name: String, base: String },

    #[error("Inheritance cycle detected: {chain}")]
    InheritanceCycle { chain: String },

    #[error("Prompt '{name}' has no template")]
    MissingTemplate { name: String },

    #[error("Prompt '{name}' declares more than one of template, template-name, template-file")]
    AmbiguousTemplate { name: String },

    #[error("Template {template} has a syntax error: {message}")]
    TemplateSyntax { template: String, message: String },

    #[error("Template {template} references '{variable}', which is not a declared field")]
    UndeclaredVariable { template: String, variable: String },

    #[error("Fields not used by any template: {}", .fields.join(", "))]
    UnusedFields { fields: Vec<String> },

    #[error("Template {template} could not be resolved: {source}")]
    UnresolvedTemplate {
        template: String,
        #[source]
        source: TemplateNotFoundError,
    },
}

/// What went wrong with a single input field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldErrorKind {
    /// Required field absent from the inputs
    MissingField,
    /// Input key that the schema does not declare
    UnexpectedField,
    /// Value could not be coerced to the declared type
    TypeMismatch { expected: String, found: String },
    /// Value has the right type but breaks a constraint
    ConstraintViolation(String),
}

/// One problem with one input, located by its path (`name`, `config.style`, `items[2]`)
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub path: String,
    pub kind: FieldErrorKind,
}

impl FieldError {
    pub fn missing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FieldErrorKind::MissingField,
        }
    }

    pub fn unexpected(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FieldErrorKind::UnexpectedField,
        }
    }

    pub fn type_mismatch(path: impl Into<String>, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FieldErrorKind::TypeMismatch {
                expected: expected.into(),
                found: found.into(),
            },
        }
    }

    pub fn constraint(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FieldErrorKind::ConstraintViolation(reason.into()),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FieldErrorKind::MissingField => write!(f, "{}: missing required field", self.path),
            FieldErrorKind::UnexpectedField => write!(f, "{}: unexpected field", self.path),
            FieldErrorKind::TypeMismatch { expected, found } => {
                write!(f, "{}: expected {}, found {}", self.path, expected, found)
            }
            FieldErrorKind::ConstraintViolation(reason) => write!(f, "{}: {}", self.path, reason),
        }
    }
}

/// Every problem found while validating one set of inputs
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Invalid prompt inputs ({} problem(s)): {}", .errors.len(), summarize(.errors))]
pub struct ValidationFailure {
    errors: Vec<FieldError>,
}

fn summarize(errors: &[FieldError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

impl ValidationFailure {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<FieldError> {
        self.errors
    }

    /// Paths reported as missing
    pub fn missing(&self) -> Vec<&str> {
        self.paths_where(|k| matches!(k, FieldErrorKind::MissingField))
    }

    /// Paths reported as unexpected
    pub fn unexpected(&self) -> Vec<&str> {
        self.paths_where(|k| matches!(k, FieldErrorKind::UnexpectedField))
    }

    /// Is there any problem reported at `path`?
    pub fn contains(&self, path: &str) -> bool {
        self.errors.iter().any(|e| e.path == path)
    }

    fn paths_where(&self, pred: impl Fn(&FieldErrorKind) -> bool) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| pred(&e.kind))
            .map(|e| e.path.as_str())
            .collect()
    }
}

/// A template identifier (or a link in its chain) could not be loaded
#[derive(Debug, Error)]
pub enum TemplateNotFoundError {
    #[error("Template not found: {name} (searched {searched:?})")]
    Named { name: String, searched: Vec<PathBuf> },

    #[error("Failed to read template file {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Partial '{name}' referenced by {referenced_by} could not be resolved")]
    Partial {
        name: String,
        referenced_by: String,
        #[source]
        source: Box<TemplateNotFoundError>,
    },
}

/// The template engine failed to produce output
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Template {template} references undefined variable '{name}'")]
    UndefinedVariable { template: String, name: String },

    #[error("Template {template} has a syntax error: {message}")]
    Syntax { template: String, message: String },

    #[error("Failed to render template {template}: {message}")]
    Engine { template: String, message: String },
}

/// Any failure surfaced by a prompt render call
#[derive(Debug, Error)]
pub enum PromptError {
    #[error(transparent)]
    Specification(#[from] SpecificationError),

    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error(transparent)]
    TemplateNotFound(#[from] TemplateNotFoundError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Prompt inputs could not be converted to JSON: {0}")]
    Input(#[from] serde_json::Error),
}

impl PromptError {
    /// The aggregated field errors, if this is a validation failure
    pub fn validation(&self) -> Option<&ValidationFailure> {
        match self {
            PromptError::Validation(failure) => Some(failure),
            _ => None,
        }
    }

    /// Check if this failure happened before any template work started
    pub fn is_input_error(&self) -> bool {
        matches!(self, PromptError::Validation(_) | PromptError::Input(_))
    }
}
