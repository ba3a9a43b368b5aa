//! Read-through cache of loaded template sources
//!
//! Keyed by [`TemplateRef`]. Lookups take a read lock; a miss loads outside the
//! lock and then inserts under the write lock with `entry().or_insert`, so when
//! two callers miss on the same key at once both may load, but the first insert
//! wins and both get back the same `Arc`. Entries only go away through
//! [`TemplateCache::invalidate`] or [`TemplateCache::clear`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::source::{TemplateRef, TemplateSource};

#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: RwLock<HashMap<TemplateRef, Arc<TemplateSource>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &TemplateRef) -> Option<Arc<TemplateSource>> {
        // A panic elsewhere cannot leave a map entry half-written
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(id).cloned()
    }

    /// Return the cached source for `id`, loading and inserting it on a miss
    pub fn get_or_try_load<E, F>(&self, id: &TemplateRef, load: F) -> Result<Arc<TemplateSource>, E>
    where
        F: FnOnce() -> Result<TemplateSource, E>,
    {
        if let Some(hit) = self.get(id) {
            debug!(%id, "TemplateCache::get_or_try_load: hit");
            return Ok(hit);
        }

        debug!(%id, "TemplateCache::get_or_try_load: miss");
        let loaded = Arc::new(load()?);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.entry(id.clone()).or_insert(loaded).clone())
    }

    /// Drop one entry; returns whether it was present
    pub fn invalidate(&self, id: &TemplateRef) -> bool {
        debug!(%id, "TemplateCache::invalidate: called");
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(id).is_some()
    }

    pub fn clear(&self) {
        debug!("TemplateCache::clear: called");
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    pub fn contains(&self, id: &TemplateRef) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
