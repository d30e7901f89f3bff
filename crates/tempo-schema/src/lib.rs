//! `tempo-schema`: structural JSON-Schema validation for task parameters.
//!
//! Supports the draft-4 keyword set a parameter gate needs: `type`,
//! `properties`/`required`, `items`/`additionalItems`, the numeric bounds,
//! `multipleOf`, `anyOf`/`allOf`/`oneOf`/`not`, `uniqueItems`,
//! `additionalProperties`/`patternProperties`, root-anchored `$ref`, `enum`,
//! string length and `pattern`, object/array size bounds and `dependencies`.
//!
//! Remote references and the `format` keyword are not supported.
//!
//! ```
//! use serde_json::json;
//!
//! let schema = json!({"type": "object", "required": ["a"]});
//! assert!(tempo_schema::validate(&schema, &json!({"a": 1})).unwrap());
//! assert!(!tempo_schema::validate(&schema, &json!({})).unwrap());
//! ```

mod array;
pub mod error;
mod numeric;
mod object;
mod string;
pub mod validate;

pub use error::{Result, SchemaError};
pub use validate::{validate, validate_with_root};
