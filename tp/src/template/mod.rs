//! Template System
//!
//! Resolves template identifiers (inline text, registered names, files) into
//! sources with their partial chains, and renders them with Handlebars.
//!
//! Template lookup chain for named templates:
//! 1. Registered with [`TemplateResolver::register`]
//! 2. `<dir>/{name}.pmt` in each configured search directory, in order

mod cache;
mod render;
mod resolver;
mod source;

pub use cache::TemplateCache;
pub use render::{HandlebarsEngine, Renderer, TemplateEngine};
pub use resolver::{TemplateResolver, dedent};
pub use source::{ResolvedTemplate, TemplateRef, TemplateSource};
