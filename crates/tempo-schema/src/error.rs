use thiserror::Error;

/// Raised only when a schema cannot be interpreted. Data that fails a rule
/// is reported as `Ok(false)`, never as an error.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A keyword carries a value of the wrong shape (e.g. `"required": 5`).
    #[error("malformed schema at `{keyword}`: {reason}")]
    Malformed { keyword: &'static str, reason: String },

    /// `pattern` or a `patternProperties` key is not a valid regex.
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Only root-anchored references (`#/...`) are resolvable.
    #[error("unsupported $ref: {0}")]
    UnsupportedRef(String),

    /// A root-anchored reference points at nothing.
    #[error("unresolved $ref: {0}")]
    UnresolvedRef(String),
}

impl SchemaError {
    pub(crate) fn malformed(keyword: &'static str, reason: impl Into<String>) -> Self {
        SchemaError::Malformed {
            keyword,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchemaError>;
