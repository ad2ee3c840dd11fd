//! Binding generation for native Api/Spi libraries.
//!
//! Consumes a [`DeclarationModel`](spibind_core::DeclarationModel) and emits
//! one wrapper binding per class, one record binding per struct, the
//! declared constants, and an assembled module with its generated files.
//!
//! ## Modules
//!
//! - [`policy`] — generator options and name filters
//! - [`binding`] — generated binding artifacts
//! - [`generator`] — per-class trampoline and override-slot generation
//! - [`emit`] — Rust source emission
//! - [`template`] — `$key` module templates
//! - [`assemble`] — module assembly and file output

pub mod assemble;
pub mod binding;
pub mod emit;
pub mod error;
pub mod generator;
pub mod policy;
pub mod template;

pub use assemble::{assemble, generate_module, GeneratedFiles, Module, Surface, SURFACE_FILE};
pub use binding::{
    ConstantBinding, OverrideSlot, ParamBinding, RecordBinding, RecordField, SkippedMethod,
    Trampoline, TrampolineKind, WrapperBinding,
};
pub use error::GenError;
pub use generator::{generate, Generator};
pub use policy::GeneratorOptions;
