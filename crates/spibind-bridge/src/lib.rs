//! Run-time bridge between a scripting runtime and a native Api/Spi library.
//!
//! Scripting code drives the library through [`ApiObject`]s created from a
//! [`LoadedModule`]. The library calls back on its own thread through an
//! [`SpiObject`] registration; each registration is served by one
//! [`BridgeInstance`], which takes the [`ScriptRuntime`] execution lock,
//! marshals the arguments, and runs the handler's override if it has one.
//!
//! ## Modules
//!
//! - [`native`] — traits the native library implements
//! - [`script`] — scripting objects and runtime context
//! - [`runtime`] — execution lock and fault reports
//! - [`bridge`] — per-registration callback dispatch
//! - [`spi`] — Spi objects and their native trampoline
//! - [`api`] — Api instance handles
//! - [`module`] — generated module bound to a library

pub mod api;
pub mod bridge;
mod call;
pub mod error;
pub mod module;
pub mod native;
pub mod runtime;
pub mod script;
pub mod spi;

pub use api::ApiObject;
pub use bridge::BridgeInstance;
pub use error::{BridgeError, CallError};
pub use module::LoadedModule;
pub use native::{NativeApi, NativeFault, NativeLibrary, NativeSpi};
pub use runtime::{FaultReport, ScriptRuntime};
pub use script::{ScriptContext, ScriptError, ScriptFn, ScriptObject, ScriptObjectBuilder};
pub use spi::SpiObject;
