//! Declaration model for native Api/Spi binding generation.
//!
//! Describes every native class, its methods, and every fixed-layout
//! protocol struct of a callback-driven trading API, loaded once from a
//! versioned declaration file and shared read-only afterwards.
//!
//! ## Modules
//!
//! - [`csig`] — C++ method/field/type declaration parser
//! - [`declaration`] — `.bind.toml` declaration file parsing
//! - [`model`] — the validated, closed declaration model
//! - [`types`] — resolved type references
//! - [`hash`] — content hashing for reproducible output

pub mod csig;
pub mod declaration;
pub mod error;
pub mod hash;
pub mod model;
pub mod types;

pub use declaration::{DeclarationFile, LibraryInfo};
pub use error::DeclError;
pub use hash::{content_hash, hash_hex, ContentHash};
pub use model::{ClassDecl, ConstDecl, DeclarationModel, FieldDecl, MethodDecl, Param, StructDecl};
pub use types::{ConstValue, PrimitiveKind, TypeRef};
