//! Marshaling error types.

use spibind_core::PrimitiveKind;

/// Errors raised while converting values across the native boundary.
///
/// `path` names the offending value, e.g. `CThostFtdcReqUserLoginField.BrokerID`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarshalError {
    /// Text longer than the fixed-size field it is written into.
    #[error("{path}: value of {actual} bytes exceeds field width {max_len}")]
    ValueTooLong {
        path: String,
        max_len: usize,
        actual: usize,
    },

    /// Numeric value outside the range of the native primitive.
    #[error("{path}: {value} is out of range for {kind}")]
    Range {
        path: String,
        value: String,
        kind: PrimitiveKind,
    },

    /// Value of the wrong shape for the declared type.
    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    /// Record names a field its struct does not declare.
    #[error("record {record} has no field '{field}'")]
    UnknownField { record: String, field: String },

    /// Record lacks a field its struct declares.
    #[error("record {record} is missing field '{field}'")]
    MissingField { record: String, field: String },

    /// Struct name not present in the layout table.
    #[error("unknown struct '{name}'")]
    UnknownStruct { name: String },

    /// Type has no marshaling rule.
    #[error("no marshaling rule for {ty}")]
    Unsupported { ty: String },

    /// Native buffer does not match the struct size.
    #[error("buffer for {name} is {actual} bytes, layout needs {expected}")]
    BufferSize {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias for marshaling operations.
pub type Result<T> = std::result::Result<T, MarshalError>;
