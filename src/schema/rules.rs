//! Field-level shape rules.
//!
//! `FieldRules` is the default rule engine behind a struct schema. It knows
//! a list of typed fields; `extract` coerces loosely typed input (query
//! strings, form values) into those types, `check` asserts without touching
//! the value.

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Number, Value};

use super::SchemaError;

/// Rule engine consulted by a [`Schema`](super::Schema).
pub trait ShapeRules: Send + Sync + fmt::Debug {
    /// Coerce and accept `input`, or reject it.
    fn extract(
        &self,
        schema: &str,
        input: Map<String, Value>,
        strict: bool,
    ) -> Result<Map<String, Value>, SchemaError>;

    /// Assert that `value` conforms without transforming it.
    fn check(&self, schema: &str, value: &Value, strict: bool) -> Result<(), SchemaError>;

    /// Build a state value from declared defaults overlaid with `defaults`.
    fn create(&self, defaults: Map<String, Value>) -> Map<String, Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Any,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
            FieldKind::Any => "any",
        };
        f.write_str(label)
    }
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
            FieldKind::Any => true,
        }
    }

    fn coerce(self, value: Value) -> Option<Value> {
        if self.accepts(&value) {
            return Some(value);
        }
        match (self, value) {
            (FieldKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (FieldKind::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (FieldKind::Number, Value::String(s)) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    return Some(Value::Number(i.into()));
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
            }
            (FieldKind::Integer, Value::String(s)) => {
                s.trim().parse::<i64>().ok().map(|i| Value::Number(i.into()))
            }
            (FieldKind::Boolean, Value::String(s)) => match s.trim() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldRule {
    pub name: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: FieldKind,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

fn default_kind() -> FieldKind {
    FieldKind::Any
}

#[derive(Debug, Clone, Default)]
pub struct FieldRules {
    fields: Vec<FieldRule>,
}

impl FieldRules {
    pub fn new(fields: Vec<FieldRule>) -> Self {
        Self { fields }
    }

    fn reject_unknown(&self, schema: &str, map: &Map<String, Value>) -> Result<(), SchemaError> {
        match map
            .keys()
            .find(|key| !self.fields.iter().any(|field| &field.name == *key))
        {
            Some(field) => Err(SchemaError::UnknownField {
                schema: schema.to_string(),
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl ShapeRules for FieldRules {
    fn extract(
        &self,
        schema: &str,
        mut input: Map<String, Value>,
        strict: bool,
    ) -> Result<Map<String, Value>, SchemaError> {
        if strict {
            self.reject_unknown(schema, &input)?;
        }

        for field in &self.fields {
            let value = match input.remove(&field.name) {
                Some(Value::Null) | None => match &field.default {
                    Some(default) => default.clone(),
                    None if field.optional => continue,
                    None => {
                        return Err(SchemaError::MissingField {
                            schema: schema.to_string(),
                            field: field.name.clone(),
                        });
                    }
                },
                Some(value) => {
                    field
                        .kind
                        .coerce(value)
                        .ok_or_else(|| SchemaError::TypeMismatch {
                            schema: schema.to_string(),
                            field: field.name.clone(),
                            expected: field.kind,
                        })?
                }
            };
            input.insert(field.name.clone(), value);
        }

        Ok(input)
    }

    fn check(&self, schema: &str, value: &Value, strict: bool) -> Result<(), SchemaError> {
        let Value::Object(map) = value else {
            return Err(SchemaError::NotAnObject {
                schema: schema.to_string(),
            });
        };
        if strict {
            self.reject_unknown(schema, map)?;
        }

        for field in &self.fields {
            match map.get(&field.name) {
                Some(Value::Null) | None if field.optional => {}
                Some(value) if field.kind.accepts(value) => {}
                None => {
                    return Err(SchemaError::MissingField {
                        schema: schema.to_string(),
                        field: field.name.clone(),
                    });
                }
                Some(_) => {
                    return Err(SchemaError::TypeMismatch {
                        schema: schema.to_string(),
                        field: field.name.clone(),
                        expected: field.kind,
                    });
                }
            }
        }
        Ok(())
    }

    fn create(&self, defaults: Map<String, Value>) -> Map<String, Value> {
        let mut state: Map<String, Value> = self
            .fields
            .iter()
            .filter_map(|field| {
                field
                    .default
                    .clone()
                    .map(|value| (field.name.clone(), value))
            })
            .collect();
        state.extend(defaults);
        state
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn rules() -> FieldRules {
        FieldRules::new(vec![
            FieldRule {
                name: "id".into(),
                kind: FieldKind::Integer,
                optional: false,
                default: None,
            },
            FieldRule {
                name: "active".into(),
                kind: FieldKind::Boolean,
                optional: true,
                default: None,
            },
            FieldRule {
                name: "page".into(),
                kind: FieldKind::Number,
                optional: false,
                default: Some(json!(1)),
            },
        ])
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn extract_coerces_strings() {
        let out = rules()
            .extract("Req", object(json!({"id": "42", "active": "true"})), true)
            .expect("valid input");
        assert_eq!(Value::Object(out), json!({"id": 42, "active": true, "page": 1}));
    }

    #[test]
    fn extract_reports_missing_required_field() {
        let err = rules()
            .extract("Req", object(json!({"active": false})), false)
            .expect_err("id is required");
        assert!(matches!(err, SchemaError::MissingField { ref field, .. } if field == "id"));
    }

    #[test]
    fn extract_rejects_uncoercible_value() {
        let err = rules()
            .extract("Req", object(json!({"id": "forty-two"})), false)
            .expect_err("not an integer");
        assert!(matches!(err, SchemaError::TypeMismatch { expected: FieldKind::Integer, .. }));
    }

    #[test]
    fn strict_mode_rejects_unknown_fields() {
        let input = object(json!({"id": 1, "extra": "x"}));
        assert!(rules().extract("Req", input.clone(), false).is_ok());
        let err = rules().extract("Req", input, true).expect_err("strict");
        assert!(matches!(err, SchemaError::UnknownField { ref field, .. } if field == "extra"));
    }

    #[test]
    fn check_does_not_coerce() {
        let err = rules()
            .check("Res", &json!({"id": "1", "page": 1}), false)
            .expect_err("string id");
        assert!(matches!(err, SchemaError::TypeMismatch { .. }));
        assert!(rules().check("Res", &json!({"id": 1, "page": 2}), true).is_ok());
    }

    #[test]
    fn check_requires_object() {
        let err = rules().check("Res", &json!([1, 2]), false).expect_err("array");
        assert!(matches!(err, SchemaError::NotAnObject { .. }));
    }

    #[test]
    fn create_overlays_defaults() {
        let state = rules().create(object(json!({"id": 7})));
        assert_eq!(Value::Object(state), json!({"page": 1, "id": 7}));
    }
}
