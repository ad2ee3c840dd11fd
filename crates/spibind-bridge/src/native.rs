//! Seams to the native library.
//!
//! A loaded shared object (or a test double) implements these traits; the
//! bridge only ever sees marshaled [`NativeArg`]s.

use std::sync::Arc;

use spibind_marshal::NativeArg;

/// A failure reported by the native library.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct NativeFault {
    /// Library error code, when the library reports one.
    pub code: Option<i32>,
    pub message: String,
}

impl NativeFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

/// Entry points of a native library: factories and other statics.
pub trait NativeLibrary: Send + Sync {
    /// Run the static factory `constructor` of `class`.
    fn create(
        &self,
        class: &str,
        constructor: &str,
        args: &[NativeArg],
    ) -> Result<Arc<dyn NativeApi>, NativeFault>;

    fn call_static(&self, class: &str, method: &str, args: &[NativeArg])
        -> Result<NativeArg, NativeFault>;
}

/// A native Api instance.
///
/// Requests may be issued from any thread; the library owns its own
/// callback thread once [`init`](NativeApi::init) has run.
pub trait NativeApi: Send + Sync {
    /// Install the callback sink, replacing any earlier one.
    fn register_spi(&self, spi: Arc<dyn NativeSpi>) -> Result<(), NativeFault>;

    fn init(&self) -> Result<(), NativeFault>;

    /// Stop the callback thread and free the instance. No callbacks are
    /// delivered once this returns.
    fn release(&self) -> Result<(), NativeFault>;

    fn call(&self, method: &str, args: &[NativeArg]) -> Result<NativeArg, NativeFault>;
}

/// The callback sink a native library calls into.
///
/// `invoke` runs on the library's own thread and always produces a value of
/// the hook's return type.
pub trait NativeSpi: Send + Sync {
    fn invoke(&self, method: &str, args: &[NativeArg]) -> NativeArg;
}
