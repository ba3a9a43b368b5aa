//! Prompt schemas
//!
//! A [`Schema`] is an ordered set of [`Field`]s keyed by name. Schemas compose
//! by explicit extension: [`Schema::extend`] takes a base and a list of fields
//! and returns a new schema where every same-named field is replaced in full.
//! Nothing is merged field-by-field; redefining a field means redefining all of
//! it (type, requiredness, default, constraints).

mod field;

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

pub use field::{Constraints, Field, FieldBuilder, FieldType, Pattern};

use crate::error::SpecificationError;

/// Ordered mapping of field name to [`Field`], with inheritance resolved eagerly
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    /// Effective fields: base order first, then newly introduced fields
    fields: IndexMap<String, Field>,
    /// Schema this one was extended from
    base: Option<Arc<Schema>>,
    /// Names declared by this schema itself (new or overriding)
    declared: Vec<String>,
}

impl Schema {
    /// Build a schema from an ordered set of fields
    ///
    /// Fails with [`SpecificationError::DuplicateField`] if a name repeats.
    pub fn define(fields: impl IntoIterator<Item = Field>) -> Result<Self, SpecificationError> {
        let fields = collect_unique(fields)?;
        debug!(field_count = fields.len(), "Schema::define: called");
        let declared = fields.keys().cloned().collect();
        Ok(Self {
            fields,
            base: None,
            declared,
        })
    }

    /// Derive a schema from `base`, replacing or adding fields by name
    ///
    /// An overridden field keeps the position of its first occurrence in the
    /// base; new fields follow the base fields in declaration order.
    pub fn extend(base: &Schema, fields: impl IntoIterator<Item = Field>) -> Result<Self, SpecificationError> {
        let overrides = collect_unique(fields)?;
        debug!(
            base_count = base.fields.len(),
            override_count = overrides.len(),
            "Schema::extend: called"
        );

        let mut effective = base.fields.clone();
        for (name, field) in &overrides {
            if let Some(previous) = effective.get(name) {
                debug!(%name, from = %previous.field_type(), to = %field.field_type(), "Schema::extend: overriding field");
            }
            // IndexMap::insert on an existing key keeps its slot
            effective.insert(name.clone(), field.clone());
        }

        Ok(Self {
            fields: effective,
            base: Some(Arc::new(base.clone())),
            declared: overrides.into_keys().collect(),
        })
    }

    /// Effective field set after inheritance
    pub fn effective_fields(&self) -> &IndexMap<String, Field> {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn base(&self) -> Option<&Schema> {
        self.base.as_deref()
    }

    /// Names this schema declares itself, in declaration order
    pub fn declared_names(&self) -> impl Iterator<Item = &str> {
        self.declared.iter().map(|s| s.as_str())
    }

    /// Names this schema redefines from its base
    pub fn overridden_names(&self) -> Vec<&str> {
        match &self.base {
            Some(base) => self
                .declared
                .iter()
                .filter(|name| base.contains(name))
                .map(|s| s.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Mapping of every field to its fallback, if every field has one
    ///
    /// Used as the empty rendering of an optional nested object.
    pub fn defaults(&self) -> Option<Value> {
        let mut map = Map::new();
        for (name, field) in &self.fields {
            map.insert(name.clone(), field.fallback()?);
        }
        Some(Value::Object(map))
    }
}

fn collect_unique(fields: impl IntoIterator<Item = Field>) -> Result<IndexMap<String, Field>, SpecificationError> {
    let mut map = IndexMap::new();
    for field in fields {
        let name = field.name().to_string();
        if map.contains_key(&name) {
            debug!(%name, "collect_unique: duplicate field");
            return Err(SpecificationError::DuplicateField { name });
        }
        map.insert(name, field);
    }
    Ok(map)
}
