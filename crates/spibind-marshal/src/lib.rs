//! Marshaling rules for the native Api/Spi boundary.
//!
//! Converts between the scripting representation ([`Value`], [`Record`])
//! and the native one ([`NativeArg`], [`NativeStruct`] in C layout).
//!
//! ## Modules
//!
//! - [`value`] — scripting-side values and field-addressable records
//! - [`native`] — native scalars, struct memory, and call arguments
//! - [`layout`] — C struct layout computation
//! - [`rules`] — strategy selection and the [`Marshaler`]

pub mod error;
pub mod layout;
pub mod native;
pub mod rules;
pub mod value;

pub use error::MarshalError;
pub use layout::{FieldLayout, LayoutTable, StructLayout};
pub use native::{NativeArg, NativeStruct, Scalar};
pub use rules::{select_rule, MarshalRule, Marshaler};
pub use value::{Record, Value};
