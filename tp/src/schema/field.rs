//! Field specifications
//!
//! A [`Field`] declares one named template input: its type, whether it must be
//! supplied, what it falls back to when absent, and the constraints its value
//! must satisfy. Fields are built through [`FieldBuilder`] so every invariant is
//! checked once, at definition time.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::Schema;
use crate::error::SpecificationError;
use crate::validate::{StandardTypes, TypeValidator};

/// Semantic type of a field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    /// Any JSON value, passed through untouched
    Any,
    /// Homogeneous list
    List(Box<FieldType>),
    /// Nested mapping validated against its own schema
    Object(Arc<Schema>),
}

impl FieldType {
    pub fn list(item: FieldType) -> Self {
        FieldType::List(Box::new(item))
    }

    pub fn object(schema: Schema) -> Self {
        FieldType::Object(Arc::new(schema))
    }

    /// The value an absent optional field renders as, if the type has one
    pub fn empty_value(&self) -> Option<Value> {
        match self {
            FieldType::String => Some(Value::String(String::new())),
            FieldType::List(_) => Some(Value::Array(Vec::new())),
            FieldType::Any => Some(Value::Null),
            FieldType::Object(schema) => schema.defaults(),
            FieldType::Integer | FieldType::Float | FieldType::Boolean => None,
        }
    }

    fn has_length(&self) -> bool {
        matches!(self, FieldType::String | FieldType::List(_))
    }

    fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "string"),
            FieldType::Integer => write!(f, "integer"),
            FieldType::Float => write!(f, "float"),
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Any => write!(f, "any"),
            FieldType::List(item) => write!(f, "list[{}]", item),
            FieldType::Object(_) => write!(f, "object"),
        }
    }
}

/// Compiled regex constraint; compares by source text
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Value constraints checked after type coercion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    /// Minimum length (chars for strings, items for lists)
    pub min_length: Option<usize>,
    /// Maximum length (chars for strings, items for lists)
    pub max_length: Option<usize>,
    /// Inclusive numeric lower bound
    pub min: Option<f64>,
    /// Inclusive numeric upper bound
    pub max: Option<f64>,
    /// Allowed values
    pub one_of: Option<Vec<Value>>,
    /// Regex the string must match
    pub pattern: Option<Pattern>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        *self == Constraints::default()
    }
}

/// Declaration of one named, typed template input
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    ty: FieldType,
    required: bool,
    nullable: bool,
    default: Option<Value>,
    constraints: Constraints,
    description: Option<String>,
}

impl Field {
    pub fn builder(name: impl Into<String>, ty: FieldType) -> FieldBuilder {
        FieldBuilder::new(name, ty)
    }

    pub fn string(name: impl Into<String>) -> FieldBuilder {
        FieldBuilder::new(name, FieldType::String)
    }

    pub fn integer(name: impl Into<String>) -> FieldBuilder {
        FieldBuilder::new(name, FieldType::Integer)
    }

    pub fn float(name: impl Into<String>) -> FieldBuilder {
        FieldBuilder::new(name, FieldType::Float)
    }

    pub fn boolean(name: impl Into<String>) -> FieldBuilder {
        FieldBuilder::new(name, FieldType::Boolean)
    }

    pub fn any(name: impl Into<String>) -> FieldBuilder {
        FieldBuilder::new(name, FieldType::Any)
    }

    pub fn list(name: impl Into<String>, item: FieldType) -> FieldBuilder {
        FieldBuilder::new(name, FieldType::list(item))
    }

    pub fn object(name: impl Into<String>, schema: Schema) -> FieldBuilder {
        FieldBuilder::new(name, FieldType::object(schema))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Value used when the field is absent from the inputs
    ///
    /// Explicit default first, then `null` for nullable fields, then the
    /// type's empty rendering. Required fields have no fallback.
    pub fn fallback(&self) -> Option<Value> {
        if self.required {
            return None;
        }
        if let Some(default) = &self.default {
            return Some(default.clone());
        }
        if self.nullable {
            return Some(Value::Null);
        }
        self.ty.empty_value()
    }
}

/// Builder for [`Field`]; `build` enforces the definition-time invariants
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    name: String,
    ty: FieldType,
    required: bool,
    nullable: bool,
    default: Option<Value>,
    description: Option<String>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    min: Option<f64>,
    max: Option<f64>,
    one_of: Option<Vec<Value>>,
    pattern: Option<String>,
}

impl FieldBuilder {
    fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            nullable: false,
            default: None,
            description: None,
            min_length: None,
            max_length: None,
            min: None,
            max: None,
            one_of: None,
            pattern: None,
        }
    }

    /// Must be supplied; drops any default set earlier
    pub fn required(mut self) -> Self {
        self.required = true;
        self.default = None;
        self
    }

    /// May be omitted; renders as the type's empty value
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// May be omitted; renders as `value`
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.required = false;
        self.default = Some(value.into());
        self
    }

    /// Accept `null`, and use it as the empty value
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn min(mut self, n: f64) -> Self {
        self.min = Some(n);
        self
    }

    pub fn max(mut self, n: f64) -> Self {
        self.max = Some(n);
        self
    }

    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.one_of = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn pattern(mut self, regex: impl Into<String>) -> Self {
        self.pattern = Some(regex.into());
        self
    }

    pub fn build(self) -> Result<Field, SpecificationError> {
        debug!(name = %self.name, ty = %self.ty, "FieldBuilder::build: called");
        let invalid = |reason: String| SpecificationError::InvalidConstraint {
            name: self.name.clone(),
            reason,
        };

        if (self.min_length.is_some() || self.max_length.is_some()) && !self.ty.has_length() {
            return Err(invalid(format!("length bounds do not apply to {}", self.ty)));
        }
        if (self.min.is_some() || self.max.is_some()) && !self.ty.is_numeric() {
            return Err(invalid(format!("numeric bounds do not apply to {}", self.ty)));
        }
        if self.pattern.is_some() && self.ty != FieldType::String {
            return Err(invalid(format!("pattern does not apply to {}", self.ty)));
        }
        if let (Some(lo), Some(hi)) = (self.min_length, self.max_length)
            && lo > hi
        {
            return Err(invalid(format!("min-length {} exceeds max-length {}", lo, hi)));
        }
        if let (Some(lo), Some(hi)) = (self.min, self.max)
            && lo > hi
        {
            return Err(invalid(format!("min {} exceeds max {}", lo, hi)));
        }

        let pattern = match &self.pattern {
            Some(src) => Some(Pattern(Regex::new(src).map_err(|source| {
                SpecificationError::InvalidPattern {
                    name: self.name.clone(),
                    source,
                }
            })?)),
            None => None,
        };

        // Stored coerced to the field type
        let one_of = match self.one_of {
            Some(values) => {
                let mut coerced = Vec::with_capacity(values.len());
                for value in &values {
                    match StandardTypes.coerce(&self.name, &self.ty, value) {
                        Ok(v) => coerced.push(v),
                        Err(_) => {
                            return Err(invalid(format!("allowed value {} is not a valid {}", value, self.ty)));
                        }
                    }
                }
                Some(coerced)
            }
            None => None,
        };

        let mut field = Field {
            name: self.name,
            ty: self.ty,
            required: self.required,
            nullable: self.nullable,
            default: self.default,
            constraints: Constraints {
                min_length: self.min_length,
                max_length: self.max_length,
                min: self.min,
                max: self.max,
                one_of,
                pattern,
            },
            description: self.description,
        };

        if !field.required && field.fallback().is_none() {
            debug!(name = %field.name, "FieldBuilder::build: optional field without empty rendering");
            return Err(SpecificationError::MissingDefault {
                name: field.name,
                ty: field.ty.to_string(),
            });
        }

        if let Some(default) = field.default.clone() {
            // Stored in coerced form, checked by the same engine as inputs.
            match StandardTypes.check(&field.name, &field, &default) {
                Ok(coerced) => field.default = Some(coerced),
                Err(errors) => {
                    let reason = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
                    return Err(SpecificationError::InvalidDefault {
                        name: field.name.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_fields_are_required_by_default() {
        let field = Field::string("name").build().unwrap();
        assert!(field.is_required());
        assert_eq!(field.fallback(), None);
    }

    #[test]
    fn test_default_makes_field_optional() {
        let field = Field::string("greeting").default("Hi").build().unwrap();
        assert!(!field.is_required());
        assert_eq!(field.fallback(), Some(json!("Hi")));
    }

    #[test]
    fn test_required_drops_earlier_default() {
        let field = Field::string("greeting").default("Hi").required().build().unwrap();
        assert!(field.is_required());
        assert!(field.default_value().is_none());
    }

    #[test]
    fn test_optional_string_renders_empty() {
        let field = Field::string("role").optional().build().unwrap();
        assert_eq!(field.fallback(), Some(json!("")));

        let field = Field::list("tags", FieldType::String).optional().build().unwrap();
        assert_eq!(field.fallback(), Some(json!([])));
    }

    #[test]
    fn test_optional_integer_without_default_is_rejected() {
        let err = Field::integer("age").optional().build().unwrap_err();
        assert!(matches!(err, SpecificationError::MissingDefault { ref name, .. } if name == "age"));
    }

    #[test]
    fn test_nullable_integer_falls_back_to_null() {
        let field = Field::integer("age").optional().nullable().build().unwrap();
        assert_eq!(field.fallback(), Some(Value::Null));
    }

    #[test]
    fn test_constraint_must_fit_type() {
        let err = Field::integer("age").min_length(1).build().unwrap_err();
        assert!(matches!(err, SpecificationError::InvalidConstraint { .. }));

        let err = Field::string("name").min(1.0).build().unwrap_err();
        assert!(matches!(err, SpecificationError::InvalidConstraint { .. }));

        let err = Field::boolean("flag").pattern("^x$").build().unwrap_err();
        assert!(matches!(err, SpecificationError::InvalidConstraint { .. }));
    }

    #[test]
    fn test_inverted_bounds_are_rejected() {
        let err = Field::string("name").min_length(5).max_length(2).build().unwrap_err();
        assert!(err.to_string().contains("exceeds"));

        let err = Field::float("t").min(2.0).max(0.0).build().unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_bad_pattern_is_rejected() {
        let err = Field::string("code").pattern("([a-z").build().unwrap_err();
        assert!(matches!(err, SpecificationError::InvalidPattern { .. }));
    }

    #[test]
    fn test_default_must_satisfy_field() {
        let err = Field::integer("age").default("thirty").build().unwrap_err();
        assert!(matches!(err, SpecificationError::InvalidDefault { .. }));

        let err = Field::string("tone").one_of(["formal", "casual"]).default("rude").build().unwrap_err();
        assert!(matches!(err, SpecificationError::InvalidDefault { .. }));
    }

    #[test]
    fn test_one_of_values_are_coerced_to_field_type() {
        let field = Field::float("temperature").one_of([1, 2]).default(1).build().unwrap();
        assert_eq!(field.constraints().one_of, Some(vec![json!(1.0), json!(2.0)]));
        assert_eq!(field.default_value(), Some(&json!(1.0)));

        let field = Field::integer("level").one_of(["1", "2"]).build().unwrap();
        assert_eq!(field.constraints().one_of, Some(vec![json!(1), json!(2)]));

        let err = Field::integer("level").one_of([json!(1), json!("high")]).build().unwrap_err();
        assert!(matches!(err, SpecificationError::InvalidConstraint { ref name, .. } if name == "level"));
    }

    #[test]
    fn test_object_empty_value_uses_nested_defaults() {
        let nested = Schema::define([
            Field::string("style").default("formal").build().unwrap(),
            Field::integer("max_length").default(1000).build().unwrap(),
        ])
        .unwrap();
        let field = Field::object("config", nested).optional().build().unwrap();
        assert_eq!(field.fallback(), Some(json!({"style": "formal", "max_length": 1000})));
    }

    #[test]
    fn test_object_with_required_nested_field_has_no_empty_value() {
        let nested = Schema::define([Field::string("style").build().unwrap()]).unwrap();
        let err = Field::object("config", nested).optional().build().unwrap_err();
        assert!(matches!(err, SpecificationError::MissingDefault { .. }));
    }

    #[test]
    fn test_field_type_display() {
        assert_eq!(FieldType::list(FieldType::Integer).to_string(), "list[integer]");
        assert_eq!(FieldType::Boolean.to_string(), "boolean");
    }

    #[test]
    fn test_field_equality_includes_pattern() {
        let a = Field::string("code").pattern("^[A-Z]+$").build().unwrap();
        let b = Field::string("code").pattern("^[A-Z]+$").build().unwrap();
        let c = Field::string("code").pattern("^[a-z]+$").build().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
