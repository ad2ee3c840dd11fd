//! Declaration model error types.

/// Errors that can occur while loading a declaration model.
#[derive(Debug, thiserror::Error)]
pub enum DeclError {
    /// A type name does not resolve to a primitive, typedef, struct, or class.
    #[error("unresolved type '{name}' in {context}")]
    UnresolvedType { name: String, context: String },

    /// Failed to parse a C++ method, field, or type declaration.
    #[error("invalid C++ declaration: {detail}")]
    InvalidSignature { detail: String },

    /// The declaration set is structurally inconsistent.
    #[error("invalid declaration: {detail}")]
    InvalidDeclaration { detail: String },

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for declaration operations.
pub type Result<T> = std::result::Result<T, DeclError>;
