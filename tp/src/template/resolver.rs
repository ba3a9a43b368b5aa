//! Template Resolver
//!
//! Turns a [`TemplateRef`] into loadable text and walks its partial chain.
//!
//! Named templates are looked up in order:
//! 1. Templates registered with [`TemplateResolver::register`]
//! 2. `<dir>/<name>.<ext>` for each configured search directory
//!
//! Every partial a template references (`{{> name}}`, `{{#> layout}}`) is
//! resolved the same way, transitively. When the root is a file path
//! ([`TemplateRef::Path`]), a partial found in neither place is then looked
//! for as `<name>.<ext>` next to that file. A reference that cannot be loaded is
//! only acceptable when some template in the chain declares it as an inline
//! partial (`{{#*inline "name"}}`), which is how layouts receive their slots.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use tracing::{debug, info};

use super::cache::TemplateCache;
use super::source::{ResolvedTemplate, TemplateRef, TemplateSource};
use crate::config::TemplatesConfig;
use crate::error::TemplateNotFoundError;

/// Resolves template identifiers into sources and partial chains
#[derive(Debug)]
pub struct TemplateResolver {
    /// Templates registered ahead of time, by name
    registered: RwLock<HashMap<String, String>>,
    /// Search directories for named templates
    dirs: Vec<PathBuf>,
    /// Extension of named template files (without the dot)
    extension: String,
    /// Dedent and trim inline template text
    dedent: bool,
    /// Loaded sources, when caching is enabled
    cache: Option<TemplateCache>,
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::from_config(&TemplatesConfig::default())
    }
}

impl TemplateResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &TemplatesConfig) -> Self {
        debug!(?config.dirs, extension = %config.extension, cache = config.cache, "TemplateResolver::from_config: called");
        Self {
            registered: RwLock::new(HashMap::new()),
            dirs: config.dirs.clone(),
            extension: config.extension.trim_start_matches('.').to_string(),
            dedent: config.dedent,
            cache: config.cache.then(TemplateCache::new),
        }
    }

    /// Append a search directory for named templates
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dirs.push(dir.into());
        self
    }

    pub fn with_extension(mut self, extension: impl AsRef<str>) -> Self {
        self.extension = extension.as_ref().trim_start_matches('.').to_string();
        self
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn cache(&self) -> Option<&TemplateCache> {
        self.cache.as_ref()
    }

    /// Register a named template
    ///
    /// Clears the cache: an earlier resolution may have loaded a file that this
    /// registration now shadows.
    pub fn register(&self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        debug!(%name, "TemplateResolver::register: called");
        {
            let mut registered = self.registered.write().unwrap_or_else(PoisonError::into_inner);
            registered.insert(name, text.into());
        }
        self.reload();
    }

    pub fn is_registered(&self, name: &str) -> bool {
        let registered = self.registered.read().unwrap_or_else(PoisonError::into_inner);
        registered.contains_key(name)
    }

    /// Forget every cached source so the next resolution re-reads them
    pub fn reload(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Load a single source, without following its partials
    pub fn load(&self, id: &TemplateRef) -> Result<Arc<TemplateSource>, TemplateNotFoundError> {
        match (&self.cache, id.is_cacheable()) {
            (Some(cache), true) => cache.get_or_try_load(id, || self.read(id)),
            _ => self.read(id).map(Arc::new),
        }
    }

    /// Resolve `id` and every partial in its chain
    pub fn resolve(&self, id: &TemplateRef) -> Result<ResolvedTemplate, TemplateNotFoundError> {
        debug!(%id, "TemplateResolver::resolve: called");
        let root = self.load(id)?;
        let sibling_dir = match id {
            TemplateRef::Path(path) => path.parent(),
            _ => None,
        };

        let mut partials: IndexMap<String, Arc<TemplateSource>> = IndexMap::new();
        let mut inline: HashSet<String> = root.inline_partials().iter().cloned().collect();
        let mut unresolved: Vec<(String, String, TemplateNotFoundError)> = Vec::new();
        let mut queue = VecDeque::from([root.clone()]);

        while let Some(source) = queue.pop_front() {
            for name in source.references() {
                if partials.contains_key(name) || unresolved.iter().any(|(n, _, _)| n == name) {
                    continue;
                }
                if inline.contains(name) {
                    debug!(%name, "TemplateResolver::resolve: satisfied by inline partial");
                    continue;
                }
                match self.load_partial(name, sibling_dir) {
                    Ok(partial) => {
                        debug!(%name, referenced_by = %source.id(), "TemplateResolver::resolve: loaded partial");
                        inline.extend(partial.inline_partials().iter().cloned());
                        partials.insert(name.clone(), partial.clone());
                        queue.push_back(partial);
                    }
                    Err(e) => {
                        debug!(%name, error = %e, "TemplateResolver::resolve: partial not loadable yet");
                        unresolved.push((name.clone(), source.id().to_string(), e));
                    }
                }
            }
        }

        // Slots may be declared by a template walked after the one using them
        if let Some((name, referenced_by, source)) = unresolved.into_iter().find(|(n, _, _)| !inline.contains(n)) {
            return Err(TemplateNotFoundError::Partial {
                name,
                referenced_by,
                source: Box::new(source),
            });
        }

        info!(template = %id, partials = partials.len(), "Resolved template");
        Ok(ResolvedTemplate::new(root, partials))
    }

    /// Named lookup first, then `<sibling_dir>/<name>.<ext>`
    fn load_partial(&self, name: &str, sibling_dir: Option<&Path>) -> Result<Arc<TemplateSource>, TemplateNotFoundError> {
        let err = match self.load(&TemplateRef::named(name)) {
            Ok(partial) => return Ok(partial),
            Err(e) => e,
        };
        if let Some(dir) = sibling_dir {
            let path = dir.join(format!("{}.{}", name, self.extension));
            if path.is_file() {
                debug!(?path, "TemplateResolver::load_partial: found next to root template");
                return self.load(&TemplateRef::path(path));
            }
        }
        Err(err)
    }

    fn read(&self, id: &TemplateRef) -> Result<TemplateSource, TemplateNotFoundError> {
        match id {
            TemplateRef::Inline(text) => {
                let text = if self.dedent { dedent(text) } else { text.clone() };
                Ok(TemplateSource::new(id.clone(), text))
            }
            TemplateRef::Named(name) => self.read_named(name).map(|text| TemplateSource::new(id.clone(), text)),
            TemplateRef::Path(path) => read_file(path).map(|text| TemplateSource::new(id.clone(), text)),
        }
    }

    fn read_named(&self, name: &str) -> Result<String, TemplateNotFoundError> {
        debug!(%name, "TemplateResolver::read_named: called");
        {
            let registered = self.registered.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(text) = registered.get(name) {
                debug!(%name, "TemplateResolver::read_named: found in registry");
                return Ok(text.clone());
            }
        }

        let mut searched = Vec::with_capacity(self.dirs.len());
        for dir in &self.dirs {
            let path = dir.join(format!("{}.{}", name, self.extension));
            if path.is_file() {
                debug!(?path, "TemplateResolver::read_named: found in search directory");
                return read_file(&path);
            }
            debug!(?path, "TemplateResolver::read_named: not found in search directory");
            searched.push(path);
        }

        debug!(%name, "TemplateResolver::read_named: not found anywhere");
        Err(TemplateNotFoundError::Named {
            name: name.to_string(),
            searched,
        })
    }
}

fn read_file(path: &Path) -> Result<String, TemplateNotFoundError> {
    fs::read_to_string(path).map_err(|source| TemplateNotFoundError::File {
        path: path.to_path_buf(),
        source,
    })
}

/// Remove the indentation shared by every non-blank line, then trim
pub fn dedent(text: &str) -> String {
    let indent = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    text.lines()
        .map(|line| line.get(indent..).unwrap_or_else(|| line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
