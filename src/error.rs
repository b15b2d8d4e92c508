//! Error types for field definitions and the record store

use crate::validate::Violations;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by record store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Payload failed field rules; carries messages per field id
    #[error("validation failed: {}", summarize(.0))]
    Validation(Violations),

    /// Mutation targeted an id that is not in the collection
    #[error("record not found: {id}")]
    NotFound { id: String },

    /// Backing storage rejected a snapshot write
    #[error("persistence failed: {0:#}")]
    Persistence(eyre::Report),
}

impl StoreError {
    /// Per-field messages when this is a validation failure
    pub fn violations(&self) -> Option<&Violations> {
        match self {
            StoreError::Validation(v) => Some(v),
            _ => None,
        }
    }
}

/// Errors raised while building or editing a field set
#[derive(Debug, Error)]
pub enum FieldError {
    /// Definition breaks the field model invariants
    #[error("invalid field definition: {}", summarize(.0))]
    Invalid(Violations),

    #[error("field not found: {id}")]
    NotFound { id: String },

    #[error("duplicate field id: {id}")]
    Duplicate { id: String },

    #[error("field file not readable: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn summarize(violations: &Violations) -> String {
    violations
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join("; ")))
        .collect::<Vec<_>>()
        .join(", ")
}
