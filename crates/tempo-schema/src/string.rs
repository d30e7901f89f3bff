use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};
use crate::validate::{count_keyword, Ctx};

pub(crate) fn check(_ctx: &Ctx<'_>, schema: &Map<String, Value>, data: &Value) -> Result<bool> {
    let Value::String(s) = data else {
        return Ok(true);
    };

    // Lengths count characters, not bytes.
    let len = s.chars().count();
    if let Some(min) = count_keyword(schema, "minLength")? {
        if len < min {
            return Ok(false);
        }
    }
    if let Some(max) = count_keyword(schema, "maxLength")? {
        if len > max {
            return Ok(false);
        }
    }

    if let Some(pattern) = schema.get("pattern") {
        let Some(pattern) = pattern.as_str() else {
            return Err(SchemaError::malformed("pattern", "expected a string"));
        };
        let regex = Regex::new(pattern).map_err(|source| SchemaError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        if !regex.is_match(s) {
            return Ok(false);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use crate::validate;
    use serde_json::json;

    #[test]
    fn length_counts_characters() {
        let schema = json!({"minLength": 2, "maxLength": 3});
        assert!(validate(&schema, &json!("äö")).unwrap());
        assert!(!validate(&schema, &json!("ä")).unwrap());
        assert!(!validate(&schema, &json!("abcd")).unwrap());
    }

    #[test]
    fn pattern_is_an_unanchored_search() {
        let schema = json!({"pattern": "[0-9]{3}"});
        assert!(validate(&schema, &json!("id-123-x")).unwrap());
        assert!(!validate(&schema, &json!("id-12")).unwrap());

        let anchored = json!({"pattern": "^https?://"});
        assert!(!validate(&anchored, &json!("ftp://host")).unwrap());
    }

    #[test]
    fn string_keywords_ignore_other_types() {
        assert!(validate(&json!({"maxLength": 1}), &json!(12345)).unwrap());
    }
}
