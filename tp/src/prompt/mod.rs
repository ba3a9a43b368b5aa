//! Prompt definitions and catalogs
//!
//! A [`PromptDefinition`] is the single entry point for rendering: it validates
//! raw inputs, resolves its template and renders it. A [`PromptCatalog`] builds
//! named definitions from YAML declarations.

mod catalog;
mod definition;

pub use catalog::{FieldDecl, PromptCatalog, PromptDecl};
pub use definition::{Message, PromptDefinition, RenderedPrompt, Role};
