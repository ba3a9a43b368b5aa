//! Input validation
//!
//! The [`Validator`] checks a mapping of raw inputs against a [`Schema`]:
//! present fields go through the [`TypeValidator`], absent optional fields take
//! their fallback, absent required fields and unknown keys are reported. All
//! problems are collected before returning, so one call gives a complete report.

mod types;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

pub use types::{StandardTypes, TypeValidator, value_kind};

use crate::error::{FieldError, ValidationFailure};
use crate::schema::Schema;

/// Type-checked inputs, one entry per effective field, in schema order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedInput {
    values: IndexMap<String, Value>,
}

impl ValidatedInput {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The inputs as a JSON object, for use as a template context
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.values
    }
}

/// Schema-driven validator with a pluggable per-field type engine
#[derive(Clone)]
pub struct Validator {
    types: Arc<dyn TypeValidator>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Arc::new(StandardTypes))
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").finish_non_exhaustive()
    }
}

impl Validator {
    pub fn new(types: Arc<dyn TypeValidator>) -> Self {
        Self { types }
    }

    /// Validate raw inputs; anything but a JSON object is a type mismatch at `$`
    pub fn validate(&self, schema: &Schema, raw: &Value) -> Result<ValidatedInput, ValidationFailure> {
        match raw {
            Value::Object(map) => self.validate_map(schema, map),
            other => {
                debug!(found = value_kind(other), "Validator::validate: inputs are not a mapping");
                Err(ValidationFailure::new(vec![FieldError::type_mismatch(
                    "$",
                    "object",
                    value_kind(other),
                )]))
            }
        }
    }

    pub fn validate_map(&self, schema: &Schema, raw: &Map<String, Value>) -> Result<ValidatedInput, ValidationFailure> {
        debug!(
            field_count = schema.len(),
            input_count = raw.len(),
            "Validator::validate_map: called"
        );
        match validate_mapping(self.types.as_ref(), schema, raw, None) {
            Ok(values) => Ok(ValidatedInput { values }),
            Err(errors) => {
                debug!(error_count = errors.len(), "Validator::validate_map: rejected inputs");
                Err(ValidationFailure::new(errors))
            }
        }
    }
}

/// Validate with the standard type engine
pub fn validate(schema: &Schema, raw: &Value) -> Result<ValidatedInput, ValidationFailure> {
    Validator::default().validate(schema, raw)
}

/// Shared walk for top-level inputs and nested objects
///
/// Schema fields are checked in order, then unknown keys are reported in input
/// order. `prefix` is the path of the enclosing object, if any.
pub(crate) fn validate_mapping(
    types: &dyn TypeValidator,
    schema: &Schema,
    raw: &Map<String, Value>,
    prefix: Option<&str>,
) -> Result<IndexMap<String, Value>, Vec<FieldError>> {
    let path_of = |name: &str| match prefix {
        Some(p) => format!("{}.{}", p, name),
        None => name.to_string(),
    };

    let mut values = IndexMap::with_capacity(schema.len());
    let mut errors = Vec::new();

    for (name, field) in schema.effective_fields() {
        let path = path_of(name);
        match raw.get(name) {
            Some(value) => match types.check(&path, field, value) {
                Ok(v) => {
                    values.insert(name.clone(), v);
                }
                Err(mut e) => errors.append(&mut e),
            },
            None => match field.fallback() {
                Some(v) => {
                    values.insert(name.clone(), v);
                }
                None => errors.push(FieldError::missing(path)),
            },
        }
    }

    for key in raw.keys() {
        if !schema.contains(key) {
            errors.push(FieldError::unexpected(path_of(key)));
        }
    }

    if errors.is_empty() { Ok(values) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::error::FieldErrorKind;
    use crate::schema::{Field, FieldType};

    fn basic_schema() -> Schema {
        Schema::define([
            Field::string("name").build().unwrap(),
            Field::integer("age").build().unwrap(),
            Field::string("role").optional().nullable().build().unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_valid_inputs_fill_fallbacks() {
        let input = validate(&basic_schema(), &json!({"name": "Alice", "age": "30"})).unwrap();
        assert_eq!(input.names().collect::<Vec<_>>(), vec!["name", "age", "role"]);
        assert_eq!(input.get("age"), Some(&json!(30)));
        assert_eq!(input.get("role"), Some(&Value::Null));
    }

    #[test]
    fn test_missing_required_field() {
        let failure = validate(&basic_schema(), &json!({"name": "Alice"})).unwrap_err();
        assert_eq!(failure.missing(), vec!["age"]);
    }

    #[test]
    fn test_unexpected_field_is_rejected() {
        let failure = validate(&basic_schema(), &json!({"name": "A", "age": 1, "nmae": "typo"})).unwrap_err();
        assert_eq!(failure.unexpected(), vec!["nmae"]);
    }

    #[test]
    fn test_errors_are_aggregated() {
        let failure = validate(&basic_schema(), &json!({"age": "thirty", "extra": 1})).unwrap_err();
        assert_eq!(failure.errors().len(), 3);
        assert_eq!(failure.missing(), vec!["name"]);
        assert_eq!(failure.unexpected(), vec!["extra"]);
        assert!(matches!(
            failure.errors().iter().find(|e| e.path == "age").map(|e| &e.kind),
            Some(FieldErrorKind::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_non_object_inputs() {
        let failure = validate(&basic_schema(), &json!(["Alice", 30])).unwrap_err();
        assert!(failure.contains("$"));
    }

    #[test]
    fn test_to_value_is_object_in_order() {
        let schema = Schema::define([
            Field::list("points", FieldType::String).optional().build().unwrap(),
            Field::string("topic").build().unwrap(),
        ])
        .unwrap();
        let input = validate(&schema, &json!({"topic": "Rust"})).unwrap();
        assert_eq!(input.to_value(), json!({"points": [], "topic": "Rust"}));
        assert_eq!(serde_json::to_value(&input).unwrap(), input.to_value());
    }

    struct Uppercase;

    impl TypeValidator for Uppercase {
        fn check(&self, path: &str, field: &Field, value: &Value) -> Result<Value, Vec<FieldError>> {
            let v = StandardTypes.check(path, field, value)?;
            Ok(match v {
                Value::String(s) => Value::String(s.to_uppercase()),
                other => other,
            })
        }
    }

    #[test]
    fn test_custom_type_engine() {
        let validator = Validator::new(Arc::new(Uppercase));
        let input = validator.validate(&basic_schema(), &json!({"name": "ada", "age": 36})).unwrap();
        assert_eq!(input.get("name"), Some(&json!("ADA")));
    }

    proptest! {
        #[test]
        fn prop_every_field_appears_once(
            names in prop::collection::btree_set("[a-z]{1,8}", 1..8),
            supply in prop::collection::vec(any::<bool>(), 8),
        ) {
            let fields = names
                .iter()
                .map(|n| Field::string(n.as_str()).default("d").build().unwrap());
            let schema = Schema::define(fields).unwrap();

            let mut raw = Map::new();
            for (i, name) in names.iter().enumerate() {
                if supply[i] {
                    raw.insert(name.clone(), json!("given"));
                }
            }

            let input = Validator::default().validate_map(&schema, &raw).unwrap();
            prop_assert_eq!(input.len(), names.len());
            for (i, name) in names.iter().enumerate() {
                let expected = if supply[i] { json!("given") } else { json!("d") };
                prop_assert_eq!(input.get(name), Some(&expected));
            }
        }

        #[test]
        fn prop_unknown_keys_always_reported(
            names in prop::collection::btree_set("[a-m]{1,6}", 1..6),
            extras in prop::collection::btree_set("[n-z]{1,6}", 1..4),
        ) {
            let fields = names.iter().map(|n| Field::string(n.as_str()).build().unwrap());
            let schema = Schema::define(fields).unwrap();

            let mut raw = Map::new();
            for name in names.iter().chain(extras.iter()) {
                raw.insert(name.clone(), json!("v"));
            }

            let failure = Validator::default().validate_map(&schema, &raw).unwrap_err();
            let mut unexpected: Vec<_> = failure.unexpected().into_iter().map(String::from).collect();
            unexpected.sort();
            let expected: Vec<_> = extras.iter().cloned().collect();
            prop_assert_eq!(unexpected, expected);
            prop_assert!(failure.missing().is_empty());
        }
    }
}
