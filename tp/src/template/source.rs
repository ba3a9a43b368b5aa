//! Template identifiers and loaded template text

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use regex::Regex;

/// `{{> name}}` and `{{#> name}}`; group 1 is `#` for partial blocks
static PARTIAL_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{~?\s*(#?)>\s*([A-Za-z0-9_][A-Za-z0-9_./\-]*)").expect("partial reference pattern")
});

/// `{{#*inline "name"}}`
static INLINE_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{\{~?\s*#\*inline\s+"([^"]+)""#).expect("inline partial pattern"));

/// How a template was referenced
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateRef {
    /// Literal template text
    Inline(String),
    /// Registered name, or `<dir>/<name>.<ext>` in a search directory
    Named(String),
    /// File on disk
    Path(PathBuf),
}

impl TemplateRef {
    pub fn inline(text: impl Into<String>) -> Self {
        TemplateRef::Inline(text.into())
    }

    pub fn named(name: impl Into<String>) -> Self {
        TemplateRef::Named(name.into())
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        TemplateRef::Path(path.into())
    }

    /// Inline text needs no loading, so it never goes in the cache
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, TemplateRef::Inline(_))
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateRef::Inline(_) => write!(f, "inline"),
            TemplateRef::Named(name) => write!(f, "named:{}", name),
            TemplateRef::Path(path) => write!(f, "file:{}", path.display()),
        }
    }
}

impl From<&str> for TemplateRef {
    fn from(text: &str) -> Self {
        TemplateRef::Inline(text.to_string())
    }
}

impl From<String> for TemplateRef {
    fn from(text: String) -> Self {
        TemplateRef::Inline(text)
    }
}

impl From<PathBuf> for TemplateRef {
    fn from(path: PathBuf) -> Self {
        TemplateRef::Path(path)
    }
}

impl From<&Path> for TemplateRef {
    fn from(path: &Path) -> Self {
        TemplateRef::Path(path.to_path_buf())
    }
}

/// Loaded template text plus the partial references found in it
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSource {
    id: TemplateRef,
    raw_text: String,
    /// First partial-block target, i.e. the layout this template extends
    parent: Option<String>,
    /// Every partial name referenced, in first-seen order
    references: Vec<String>,
    /// Inline partials this template declares
    inline_partials: Vec<String>,
}

impl TemplateSource {
    pub fn new(id: TemplateRef, raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        let mut parent = None;
        let mut references: Vec<String> = Vec::new();

        for caps in PARTIAL_REF.captures_iter(&raw_text) {
            let name = caps[2].to_string();
            if parent.is_none() && &caps[1] == "#" {
                parent = Some(name.clone());
            }
            if !references.contains(&name) {
                references.push(name);
            }
        }

        let inline_partials = INLINE_DECL
            .captures_iter(&raw_text)
            .map(|caps| caps[1].to_string())
            .collect();

        Self {
            id,
            raw_text,
            parent,
            references,
            inline_partials,
        }
    }

    pub fn id(&self) -> &TemplateRef {
        &self.id
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn inline_partials(&self) -> &[String] {
        &self.inline_partials
    }
}

/// A root template with every partial its chain needs, keyed by partial name
#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    root: Arc<TemplateSource>,
    partials: IndexMap<String, Arc<TemplateSource>>,
}

impl ResolvedTemplate {
    pub(crate) fn new(root: Arc<TemplateSource>, partials: IndexMap<String, Arc<TemplateSource>>) -> Self {
        Self { root, partials }
    }

    /// Name used when registering the root with the engine
    pub fn name(&self) -> String {
        self.root.id().to_string()
    }

    pub fn root(&self) -> &TemplateSource {
        &self.root
    }

    pub fn partials(&self) -> impl Iterator<Item = (&str, &TemplateSource)> {
        self.partials.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn partial(&self, name: &str) -> Option<&TemplateSource> {
        self.partials.get(name).map(|p| p.as_ref())
    }

    /// Layout names from the root upwards (`page` -> `layout` -> `base`)
    pub fn parent_chain(&self) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = self.root.parent();
        while let Some(name) = current {
            if chain.contains(&name) {
                break;
            }
            chain.push(name);
            current = self.partials.get(name).and_then(|p| p.parent());
        }
        chain
    }
}
