use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};
use crate::validate::{count_keyword, Ctx};

/// Object keywords; every one of them is a no-op for non-object data.
pub(crate) fn check(ctx: &Ctx<'_>, schema: &Map<String, Value>, data: &Value) -> Result<bool> {
    let Value::Object(fields) = data else {
        return Ok(true);
    };

    let properties = match schema.get("properties") {
        None => None,
        Some(Value::Object(p)) => Some(p),
        Some(_) => return Err(SchemaError::malformed("properties", "expected an object")),
    };
    if let Some(properties) = properties {
        for (name, subschema) in properties {
            if let Some(value) = fields.get(name) {
                if !ctx.descend(subschema, value)? {
                    return Ok(false);
                }
            }
        }
    }

    if let Some(required) = schema.get("required") {
        let Some(required) = required.as_array() else {
            return Err(SchemaError::malformed("required", "expected an array"));
        };
        for key in required {
            let Some(key) = key.as_str() else {
                return Err(SchemaError::malformed("required", "members must be strings"));
            };
            if !fields.contains_key(key) {
                return Ok(false);
            }
        }
    }

    let patterns = compile_pattern_properties(schema)?;
    for (regex, subschema) in &patterns {
        for (name, value) in fields {
            if regex.is_match(name) && !ctx.descend(subschema, value)? {
                return Ok(false);
            }
        }
    }

    if let Some(additional) = schema.get("additionalProperties") {
        let extra = fields.iter().filter(|(name, _)| {
            !properties.is_some_and(|p| p.contains_key(name.as_str()))
                && !patterns.iter().any(|(regex, _)| regex.is_match(name))
        });
        match additional {
            Value::Bool(true) => {}
            Value::Bool(false) => {
                if extra.count() > 0 {
                    return Ok(false);
                }
            }
            Value::Object(_) => {
                for (_, value) in extra {
                    if !ctx.descend(additional, value)? {
                        return Ok(false);
                    }
                }
            }
            _ => {
                return Err(SchemaError::malformed(
                    "additionalProperties",
                    "expected a boolean or a schema",
                ))
            }
        }
    }

    if let Some(min) = count_keyword(schema, "minProperties")? {
        if fields.len() < min {
            return Ok(false);
        }
    }
    if let Some(max) = count_keyword(schema, "maxProperties")? {
        if fields.len() > max {
            return Ok(false);
        }
    }

    check_dependencies(ctx, schema, fields, data)
}

fn compile_pattern_properties(schema: &Map<String, Value>) -> Result<Vec<(Regex, &Value)>> {
    match schema.get("patternProperties") {
        None => Ok(Vec::new()),
        Some(Value::Object(patterns)) => patterns
            .iter()
            .map(|(pattern, subschema)| {
                Regex::new(pattern)
                    .map(|regex| (regex, subschema))
                    .map_err(|source| SchemaError::InvalidPattern {
                        pattern: pattern.clone(),
                        source,
                    })
            })
            .collect(),
        Some(_) => Err(SchemaError::malformed(
            "patternProperties",
            "expected an object",
        )),
    }
}

fn check_dependencies(
    ctx: &Ctx<'_>,
    schema: &Map<String, Value>,
    fields: &Map<String, Value>,
    data: &Value,
) -> Result<bool> {
    let Some(dependencies) = schema.get("dependencies") else {
        return Ok(true);
    };
    let Some(dependencies) = dependencies.as_object() else {
        return Err(SchemaError::malformed("dependencies", "expected an object"));
    };

    for (trigger, dependency) in dependencies {
        if !fields.contains_key(trigger) {
            continue;
        }
        match dependency {
            Value::Array(keys) => {
                for key in keys {
                    let Some(key) = key.as_str() else {
                        return Err(SchemaError::malformed(
                            "dependencies",
                            "property lists must contain strings",
                        ));
                    };
                    if !fields.contains_key(key) {
                        return Ok(false);
                    }
                }
            }
            Value::Object(_) | Value::Bool(_) => {
                if !ctx.descend(dependency, data)? {
                    return Ok(false);
                }
            }
            _ => {
                return Err(SchemaError::malformed(
                    "dependencies",
                    "expected an array or a schema",
                ))
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use crate::{validate, SchemaError};
    use serde_json::json;

    #[test]
    fn additional_properties_false_rejects_unknown_keys() {
        let schema = json!({
            "properties": {"a": {}},
            "patternProperties": {"^x-": {"type": "string"}},
            "additionalProperties": false
        });
        assert!(validate(&schema, &json!({"a": 1, "x-note": "ok"})).unwrap());
        assert!(!validate(&schema, &json!({"a": 1, "b": 2})).unwrap());
        assert!(!validate(&schema, &json!({"x-note": 3})).unwrap());
    }

    #[test]
    fn additional_properties_schema_applies_to_leftovers() {
        let schema = json!({
            "properties": {"name": {"type": "string"}},
            "additionalProperties": {"type": "integer"}
        });
        assert!(validate(&schema, &json!({"name": "n", "retries": 3})).unwrap());
        assert!(!validate(&schema, &json!({"name": "n", "retries": "3"})).unwrap());
    }

    #[test]
    fn property_count_bounds() {
        let schema = json!({"minProperties": 1, "maxProperties": 2});
        assert!(!validate(&schema, &json!({})).unwrap());
        assert!(validate(&schema, &json!({"a": 1, "b": 2})).unwrap());
        assert!(!validate(&schema, &json!({"a": 1, "b": 2, "c": 3})).unwrap());
        // not an object: bounds do not apply
        assert!(validate(&schema, &json!("x")).unwrap());
    }

    #[test]
    fn dependencies_array_and_schema_forms() {
        let schema = json!({
            "dependencies": {
                "card": ["billing_address"],
                "bank": {"required": ["iban"]}
            }
        });
        assert!(validate(&schema, &json!({"name": "x"})).unwrap());
        assert!(validate(&schema, &json!({"card": 1, "billing_address": "a"})).unwrap());
        assert!(!validate(&schema, &json!({"card": 1})).unwrap());
        assert!(validate(&schema, &json!({"bank": 1, "iban": "DE00"})).unwrap());
        assert!(!validate(&schema, &json!({"bank": 1})).unwrap());
    }

    #[test]
    fn bad_pattern_property_is_an_error() {
        let schema = json!({"patternProperties": {"(": {}}});
        assert!(matches!(
            validate(&schema, &json!({"a": 1})),
            Err(SchemaError::InvalidPattern { .. })
        ));
    }
}
