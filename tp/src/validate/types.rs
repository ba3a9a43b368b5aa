//! Type checking and coercion for single values

use serde_json::{Number, Value};

use super::validate_mapping;
use crate::error::FieldError;
use crate::schema::{Constraints, Field, FieldType};

/// Per-field type engine used by the validator
///
/// Given a field and a raw value, returns the coerced value or every problem
/// found with it. Errors must carry `path` so nested problems stay locatable.
pub trait TypeValidator: Send + Sync {
    fn check(&self, path: &str, field: &Field, value: &Value) -> Result<Value, Vec<FieldError>>;
}

/// Default engine: lax scalar coercion, lists, nested schemas, constraints
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardTypes;

impl TypeValidator for StandardTypes {
    fn check(&self, path: &str, field: &Field, value: &Value) -> Result<Value, Vec<FieldError>> {
        if value.is_null() && field.is_nullable() {
            return Ok(Value::Null);
        }

        let coerced = self.coerce(path, field.field_type(), value)?;
        let violations = check_constraints(path, field.constraints(), &coerced);
        if violations.is_empty() {
            Ok(coerced)
        } else {
            Err(violations)
        }
    }
}

impl StandardTypes {
    /// Coerce `value` to `ty` without checking constraints
    pub(crate) fn coerce(&self, path: &str, ty: &FieldType, value: &Value) -> Result<Value, Vec<FieldError>> {
        let mismatch = || vec![FieldError::type_mismatch(path, ty.to_string(), value_kind(value))];

        match ty {
            FieldType::Any => Ok(value.clone()),
            FieldType::String => match value {
                Value::String(_) => Ok(value.clone()),
                _ => Err(mismatch()),
            },
            FieldType::Integer => coerce_integer(value).map(Value::from).ok_or_else(mismatch),
            FieldType::Float => coerce_float(value)
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(mismatch),
            FieldType::Boolean => coerce_bool(value).map(Value::Bool).ok_or_else(mismatch),
            FieldType::List(item) => {
                let Value::Array(items) = value else {
                    return Err(mismatch());
                };
                let mut out = Vec::with_capacity(items.len());
                let mut errors = Vec::new();
                for (i, raw) in items.iter().enumerate() {
                    match self.coerce(&format!("{}[{}]", path, i), item, raw) {
                        Ok(v) => out.push(v),
                        Err(mut e) => errors.append(&mut e),
                    }
                }
                if errors.is_empty() {
                    Ok(Value::Array(out))
                } else {
                    Err(errors)
                }
            }
            FieldType::Object(schema) => {
                let Value::Object(map) = value else {
                    return Err(mismatch());
                };
                let validated = validate_mapping(self, schema, map, Some(path))?;
                Ok(Value::Object(validated.into_iter().collect()))
            }
        }
    }
}

fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            let f = n.as_f64()?;
            // i64 covers [-2^63, 2^63)
            (f.fract() == 0.0 && f >= -9_223_372_036_854_775_808.0 && f < 9_223_372_036_854_775_808.0).then_some(f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn check_constraints(path: &str, constraints: &Constraints, value: &Value) -> Vec<FieldError> {
    let mut errors = Vec::new();

    let length = match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    };
    if let Some(len) = length {
        if let Some(min) = constraints.min_length
            && len < min
        {
            errors.push(FieldError::constraint(path, format!("length {} is below minimum {}", len, min)));
        }
        if let Some(max) = constraints.max_length
            && len > max
        {
            errors.push(FieldError::constraint(path, format!("length {} exceeds maximum {}", len, max)));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = constraints.min
            && n < min
        {
            errors.push(FieldError::constraint(path, format!("{} is below minimum {}", n, min)));
        }
        if let Some(max) = constraints.max
            && n > max
        {
            errors.push(FieldError::constraint(path, format!("{} exceeds maximum {}", n, max)));
        }
    }

    if let Some(allowed) = &constraints.one_of
        && !allowed.contains(value)
    {
        let list = allowed.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
        errors.push(FieldError::constraint(path, format!("must be one of [{}]", list)));
    }

    if let (Some(pattern), Value::String(s)) = (&constraints.pattern, value)
        && !pattern.is_match(s)
    {
        errors.push(FieldError::constraint(
            path,
            format!("does not match pattern {}", pattern.as_str()),
        ));
    }

    errors
}

/// Short name of a JSON value's kind, for error messages
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
