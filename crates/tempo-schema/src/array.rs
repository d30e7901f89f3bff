use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};
use crate::validate::{count_keyword, json_eq, Ctx};

pub(crate) fn check(ctx: &Ctx<'_>, schema: &Map<String, Value>, data: &Value) -> Result<bool> {
    let Value::Array(elements) = data else {
        return Ok(true);
    };

    match schema.get("items") {
        None => {}
        Some(Value::Array(positional)) => {
            for (subschema, element) in positional.iter().zip(elements) {
                if !ctx.descend(subschema, element)? {
                    return Ok(false);
                }
            }
            if elements.len() > positional.len() {
                let extra = &elements[positional.len()..];
                match schema.get("additionalItems") {
                    None | Some(Value::Bool(true)) => {}
                    Some(Value::Bool(false)) => return Ok(false),
                    Some(additional @ Value::Object(_)) => {
                        for element in extra {
                            if !ctx.descend(additional, element)? {
                                return Ok(false);
                            }
                        }
                    }
                    Some(_) => {
                        return Err(SchemaError::malformed(
                            "additionalItems",
                            "expected a boolean or a schema",
                        ))
                    }
                }
            }
        }
        Some(single @ (Value::Object(_) | Value::Bool(_))) => {
            for element in elements {
                if !ctx.descend(single, element)? {
                    return Ok(false);
                }
            }
        }
        Some(_) => {
            return Err(SchemaError::malformed(
                "items",
                "expected a schema or an array of schemas",
            ))
        }
    }

    if let Some(min) = count_keyword(schema, "minItems")? {
        if elements.len() < min {
            return Ok(false);
        }
    }
    if let Some(max) = count_keyword(schema, "maxItems")? {
        if elements.len() > max {
            return Ok(false);
        }
    }

    match schema.get("uniqueItems") {
        None | Some(Value::Bool(false)) => {}
        Some(Value::Bool(true)) => {
            for (i, a) in elements.iter().enumerate() {
                if elements[i + 1..].iter().any(|b| json_eq(a, b)) {
                    return Ok(false);
                }
            }
        }
        Some(_) => return Err(SchemaError::malformed("uniqueItems", "expected a boolean")),
    }

    Ok(true)
}
