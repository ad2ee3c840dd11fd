//! Generator error types.

use spibind_core::DeclError;

/// Errors that abort binding generation or module assembly.
#[derive(Debug, thiserror::Error)]
pub enum GenError {
    /// A method mentions a type with no marshaling rule.
    #[error("unsupported type {ty} in {class}::{method}")]
    UnsupportedType {
        class: String,
        method: String,
        ty: String,
    },

    /// Two generated symbols resolve to the same exposed name.
    #[error("exposed name '{name}' is produced by both '{first}' and '{second}'")]
    DuplicateName {
        name: String,
        first: String,
        second: String,
    },

    /// A name filter is not a valid regular expression.
    #[error("invalid name pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Generator option out of its accepted domain.
    #[error("invalid generator option: {detail}")]
    InvalidOption { detail: String },

    /// Class or struct name not present in the declaration model.
    #[error("unknown symbol '{name}'")]
    UnknownSymbol { name: String },

    /// Declaration model error.
    #[error("declaration error: {0}")]
    Decl(#[from] DeclError),

    /// Surface description (de)serialization error.
    #[error("surface JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while writing generated files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for generator operations.
pub type Result<T> = std::result::Result<T, GenError>;
