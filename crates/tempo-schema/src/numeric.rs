use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};
use crate::validate::Ctx;

/// Tolerance for `multipleOf` on fractional divisors.
const MULTIPLE_EPSILON: f64 = 1e-9;

pub(crate) fn check(_ctx: &Ctx<'_>, schema: &Map<String, Value>, data: &Value) -> Result<bool> {
    let Some(n) = data.as_f64() else {
        return Ok(true);
    };

    // Draft 4 spells exclusivity as a boolean modifier, later drafts as a bound.
    let exclusive_min_flag = matches!(schema.get("exclusiveMinimum"), Some(Value::Bool(true)));
    let exclusive_max_flag = matches!(schema.get("exclusiveMaximum"), Some(Value::Bool(true)));

    if let Some(min) = number_keyword(schema, "minimum")? {
        let ok = if exclusive_min_flag { n > min } else { n >= min };
        if !ok {
            return Ok(false);
        }
    }
    if let Some(max) = number_keyword(schema, "maximum")? {
        let ok = if exclusive_max_flag { n < max } else { n <= max };
        if !ok {
            return Ok(false);
        }
    }
    if let Some(bound) = bound_keyword(schema, "exclusiveMinimum")? {
        if n <= bound {
            return Ok(false);
        }
    }
    if let Some(bound) = bound_keyword(schema, "exclusiveMaximum")? {
        if n >= bound {
            return Ok(false);
        }
    }

    if let Some(divisor) = number_keyword(schema, "multipleOf")? {
        if divisor <= 0.0 {
            return Err(SchemaError::malformed("multipleOf", "must be greater than 0"));
        }
        let quotient = n / divisor;
        if (quotient - quotient.round()).abs() > MULTIPLE_EPSILON {
            return Ok(false);
        }
    }

    Ok(true)
}

fn number_keyword(schema: &Map<String, Value>, keyword: &'static str) -> Result<Option<f64>> {
    match schema.get(keyword) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| SchemaError::malformed(keyword, "expected a number")),
    }
}

/// `exclusiveMinimum`/`exclusiveMaximum` as a standalone numeric bound.
fn bound_keyword(schema: &Map<String, Value>, keyword: &'static str) -> Result<Option<f64>> {
    match schema.get(keyword) {
        None | Some(Value::Bool(_)) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| SchemaError::malformed(keyword, "expected a number or a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use crate::validate;
    use serde_json::json;

    #[test]
    fn inclusive_and_exclusive_bounds() {
        let inclusive = json!({"minimum": 1, "maximum": 3});
        assert!(validate(&inclusive, &json!(1)).unwrap());
        assert!(validate(&inclusive, &json!(3)).unwrap());
        assert!(!validate(&inclusive, &json!(3.01)).unwrap());

        let exclusive = json!({"exclusiveMinimum": 1, "exclusiveMaximum": 3});
        assert!(!validate(&exclusive, &json!(1)).unwrap());
        assert!(validate(&exclusive, &json!(2)).unwrap());
        assert!(!validate(&exclusive, &json!(3)).unwrap());

        let draft4 = json!({"minimum": 1, "exclusiveMinimum": true});
        assert!(!validate(&draft4, &json!(1)).unwrap());
        assert!(validate(&draft4, &json!(1.5)).unwrap());
    }

    #[test]
    fn multiple_of_handles_fractions() {
        let schema = json!({"multipleOf": 0.1});
        assert!(validate(&schema, &json!(0.3)).unwrap());
        assert!(!validate(&schema, &json!(0.35)).unwrap());

        let whole = json!({"multipleOf": 5});
        assert!(validate(&whole, &json!(-15)).unwrap());
        assert!(!validate(&whole, &json!(7)).unwrap());
    }

    #[test]
    fn numeric_keywords_ignore_other_types() {
        let schema = json!({"minimum": 10});
        assert!(validate(&schema, &json!("5")).unwrap());
        assert!(validate(&schema, &json!(null)).unwrap());
    }

    #[test]
    fn zero_divisor_is_malformed() {
        assert!(validate(&json!({"multipleOf": 0}), &json!(1)).is_err());
    }
}
