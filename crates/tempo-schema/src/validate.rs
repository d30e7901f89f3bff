use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};
use crate::{array, numeric, object, string};

/// Recursion limit; only a `$ref` cycle that never consumes data reaches it.
const MAX_DEPTH: usize = 128;

/// Evaluation state shared by every keyword group.
pub(crate) struct Ctx<'a> {
    pub root: &'a Value,
    depth: usize,
}

impl<'a> Ctx<'a> {
    /// Validate `data` against a subschema one level deeper.
    pub(crate) fn descend(&self, schema: &Value, data: &Value) -> Result<bool> {
        if self.depth >= MAX_DEPTH {
            return Err(SchemaError::malformed(
                "$ref",
                format!("recursion deeper than {MAX_DEPTH} levels"),
            ));
        }
        let child = Ctx {
            root: self.root,
            depth: self.depth + 1,
        };
        child.eval(schema, data)
    }

    fn eval(&self, schema: &Value, data: &Value) -> Result<bool> {
        let keywords = match schema {
            Value::Object(map) => map,
            Value::Bool(b) => return Ok(*b),
            other => {
                return Err(SchemaError::malformed(
                    "schema",
                    format!("expected object or boolean, got {other}"),
                ))
            }
        };

        // A reference replaces its siblings, as in draft 4.
        if let Some(reference) = keywords.get("$ref") {
            let target = resolve_ref(self.root, reference)?;
            return self.descend(target, data);
        }

        for group in GROUPS {
            if !group(self, keywords, data)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

type Group = fn(&Ctx<'_>, &Map<String, Value>, &Value) -> Result<bool>;

/// Keyword groups in evaluation order; the first failing group wins.
const GROUPS: &[Group] = &[
    check_type,
    check_enum,
    object::check,
    array::check,
    numeric::check,
    string::check,
    check_combinators,
];

/// Validate `data` against `schema`, resolving `$ref` against `schema` itself.
pub fn validate(schema: &Value, data: &Value) -> Result<bool> {
    validate_with_root(schema, data, schema)
}

/// Validate `data` against `schema`, resolving `$ref` against `root`.
pub fn validate_with_root(schema: &Value, data: &Value, root: &Value) -> Result<bool> {
    let ctx = Ctx { root, depth: 0 };
    let valid = ctx.eval(schema, data)?;
    tracing::trace!(valid, "schema validation finished");
    Ok(valid)
}

fn resolve_ref<'r>(root: &'r Value, reference: &Value) -> Result<&'r Value> {
    let Some(reference) = reference.as_str() else {
        return Err(SchemaError::malformed("$ref", "expected a string"));
    };
    let Some(pointer) = reference.strip_prefix('#') else {
        return Err(SchemaError::UnsupportedRef(reference.to_string()));
    };
    if !pointer.is_empty() && !pointer.starts_with('/') {
        return Err(SchemaError::UnsupportedRef(reference.to_string()));
    }
    root.pointer(pointer)
        .ok_or_else(|| SchemaError::UnresolvedRef(reference.to_string()))
}

fn check_type(_ctx: &Ctx<'_>, schema: &Map<String, Value>, data: &Value) -> Result<bool> {
    let Some(expected) = schema.get("type") else {
        return Ok(true);
    };
    match expected {
        Value::String(name) => type_matches(name, data),
        Value::Array(names) => {
            for name in names {
                let Some(name) = name.as_str() else {
                    return Err(SchemaError::malformed("type", "union members must be strings"));
                };
                if type_matches(name, data)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(SchemaError::malformed("type", "expected a string or an array")),
    }
}

fn type_matches(name: &str, data: &Value) -> Result<bool> {
    let matches = match name {
        "object" => data.is_object(),
        "array" => data.is_array(),
        "string" => data.is_string(),
        "number" => data.is_number(),
        "integer" => is_integer(data),
        "boolean" => data.is_boolean(),
        "null" => data.is_null(),
        other => {
            return Err(SchemaError::malformed("type", format!("unknown type {other:?}")));
        }
    };
    Ok(matches)
}

fn is_integer(data: &Value) -> bool {
    match data {
        Value::Number(n) if n.is_i64() || n.is_u64() => true,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.fract() == 0.0),
        _ => false,
    }
}

fn check_enum(_ctx: &Ctx<'_>, schema: &Map<String, Value>, data: &Value) -> Result<bool> {
    let Some(allowed) = schema.get("enum") else {
        return Ok(true);
    };
    let Some(allowed) = allowed.as_array() else {
        return Err(SchemaError::malformed("enum", "expected an array"));
    };
    Ok(allowed.iter().any(|candidate| json_eq(candidate, data)))
}

fn check_combinators(ctx: &Ctx<'_>, schema: &Map<String, Value>, data: &Value) -> Result<bool> {
    if let Some(branches) = schema.get("anyOf") {
        let mut any = false;
        for branch in schema_list("anyOf", branches)? {
            if ctx.descend(branch, data)? {
                any = true;
                break;
            }
        }
        if !any {
            return Ok(false);
        }
    }

    if let Some(branches) = schema.get("allOf") {
        for branch in schema_list("allOf", branches)? {
            if !ctx.descend(branch, data)? {
                return Ok(false);
            }
        }
    }

    if let Some(branches) = schema.get("oneOf") {
        let mut passed = 0usize;
        for branch in schema_list("oneOf", branches)? {
            if ctx.descend(branch, data)? {
                passed += 1;
                if passed > 1 {
                    return Ok(false);
                }
            }
        }
        if passed != 1 {
            return Ok(false);
        }
    }

    if let Some(negated) = schema.get("not") {
        if ctx.descend(negated, data)? {
            return Ok(false);
        }
    }

    Ok(true)
}

fn schema_list<'v>(keyword: &'static str, value: &'v Value) -> Result<&'v Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| SchemaError::malformed(keyword, "expected an array of schemas"))
}

/// Value equality where `1` and `1.0` are the same number.
pub(crate) fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => x.as_f64() == y.as_f64(),
            },
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_eq(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| json_eq(v, other)))
        }
        _ => a == b,
    }
}

/// Read a non-negative integer keyword such as `minLength`.
pub(crate) fn count_keyword(
    schema: &Map<String, Value>,
    keyword: &'static str,
) -> Result<Option<usize>> {
    match schema.get(keyword) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| SchemaError::malformed(keyword, "expected a non-negative integer")),
    }
}
