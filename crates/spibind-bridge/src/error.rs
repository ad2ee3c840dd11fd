//! Bridge and call error types.

use spibind_marshal::MarshalError;

/// Errors on the callback path and while loading a module.
///
/// Callback-path errors never reach the native caller: [`dispatch`] reports
/// them and answers with the hook's default value.
///
/// [`dispatch`]: crate::BridgeInstance::dispatch
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// Native code invoked a method that is not an overridable hook.
    #[error("{class} has no overridable hook '{method}'")]
    UnknownHook { class: String, method: String },

    /// The bridge was released or replaced by a newer registration.
    #[error("bridge for {class} has been released")]
    Released { class: String },

    /// The scripting-side handler object no longer exists.
    #[error("handler for {class}::{method} has been destroyed")]
    StaleHandler { class: String, method: String },

    /// A hook fired on a thread that is already inside the scripting runtime.
    #[error("re-entrant dispatch of {method} on a thread already inside the runtime")]
    ReentrantDispatch { method: String },

    /// Native code passed the wrong number of arguments.
    #[error("{method} expects {expected} arguments, got {actual}")]
    Arity {
        method: String,
        expected: usize,
        actual: usize,
    },

    /// Argument or result marshaling failed.
    #[error("marshaling for {method} failed: {source}")]
    Marshal {
        method: String,
        #[source]
        source: MarshalError,
    },

    /// The handler returned an error.
    #[error("handler {method} failed: {message}")]
    Handler { method: String, message: String },

    /// The handler panicked.
    #[error("handler {method} panicked: {message}")]
    HandlerPanic { method: String, message: String },

    /// Host code tried to enter the runtime from inside it.
    #[error("runtime already entered on this thread")]
    ReentrantEnter,

    #[error("unknown class '{name}'")]
    UnknownClass { name: String },

    #[error("unknown record '{name}'")]
    UnknownRecord { name: String },

    #[error("class '{name}' is not an overridable interface")]
    NotAnInterface { name: String },

    /// Module was generated from different declarations than the model given.
    #[error("module fingerprint {module} does not match declarations {model}")]
    ModelMismatch { module: String, model: String },

    /// Struct layout could not be computed.
    #[error("layout error: {0}")]
    Layout(#[from] MarshalError),
}

/// Errors returned to scripting code calling into the native library.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    #[error("{class} has no method '{method}'")]
    UnknownMethod { class: String, method: String },

    #[error("unknown class '{name}'")]
    UnknownClass { name: String },

    #[error("{class} has no constructor")]
    NoConstructor { class: String },

    #[error("{method} expects {expected} arguments, got {actual}")]
    Arity {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// The native library reported a failure.
    #[error("native call {method} failed{}: {message}", code_suffix(.code))]
    NativeCall {
        method: String,
        code: Option<i32>,
        message: String,
    },

    /// The Api instance was released.
    #[error("{class} instance has been released")]
    Released { class: String },

    /// Method exists but must be called through its dedicated entry point.
    #[error("{method} cannot be invoked this way: {detail}")]
    WrongKind { method: String, detail: String },

    /// Registered Spi does not implement the interface the Api expects.
    #[error("{method} expects {expected}, got {found}")]
    InterfaceMismatch {
        method: String,
        expected: String,
        found: String,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

fn code_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" with code {c}")).unwrap_or_default()
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
