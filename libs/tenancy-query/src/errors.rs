use crate::FieldKind;

/// Validation failures for caller-supplied query parameters.
///
/// Every variant is a client error: never retried, surfaced as a 4xx.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unknown field '{field}' on '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("unknown relation '{relation}' on '{entity}'")]
    UnknownRelation { entity: String, relation: String },

    #[error("field '{0}' cannot be filtered or sorted")]
    NotQueryable(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("type mismatch on '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: FieldKind,
        got: &'static str,
    },

    #[error("too many order fields (max {max})")]
    TooManyOrderFields { max: usize },

    #[error("page must be >= 1, got {0}")]
    InvalidPage(i64),

    #[error("limit must be >= 1, got {0}")]
    InvalidLimit(i64),

    #[error("skip must be >= 0, got {0}")]
    InvalidSkip(i64),

    #[error("pagination window overflows")]
    WindowOverflow,
}

/// Short JSON type name used in error messages.
pub(crate) fn json_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
