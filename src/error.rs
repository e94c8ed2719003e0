//! Error types for the schema engine
//!
//! Validation failures are never errors: they are [`Issue`](crate::issue::Issue)
//! values. `SchemaError` covers programmer errors (a declaration with no
//! annotation to generate from) and boundary failures (malformed JSON Schema,
//! IO while loading configuration).

use thiserror::Error;

/// Result type for schema engine operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema engine errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("cannot generate {what}: no {annotation} annotation found")]
    MissingAnnotation {
        what: String,
        annotation: &'static str,
    },

    #[error("unsupported JSON Schema target: {tag} has no JSON representation")]
    UnsupportedJsonSchema { tag: String },

    #[error("Invalid JSON Schema: {0}")]
    InvalidJsonSchema(String),

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Invalid representation: {0}")]
    InvalidRepresentation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl SchemaError {
    pub(crate) fn missing_annotation(what: impl Into<String>, annotation: &'static str) -> Self {
        Self::MissingAnnotation {
            what: what.into(),
            annotation,
        }
    }
}
