//! Scripting-side Spi objects and the native trampoline they register.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use spibind_gen::WrapperBinding;
use spibind_marshal::{Marshaler, NativeArg};

use crate::bridge::BridgeInstance;
use crate::error::BridgeError;
use crate::native::NativeSpi;
use crate::runtime::ScriptRuntime;
use crate::script::ScriptObject;

/// A scripting handler bound to one native interface.
///
/// Cloning shares the same Spi. Each registration with an Api instance
/// produces a fresh [`BridgeInstance`]. Once the native side accepts it, the
/// previous one is retired, so at most one bridge per Spi is ever live.
#[derive(Clone)]
pub struct SpiObject {
    inner: Arc<SpiInner>,
}

struct SpiInner {
    interface: Arc<WrapperBinding>,
    handler: Weak<ScriptObject>,
    marshaler: Marshaler,
    runtime: Arc<ScriptRuntime>,
    active: Mutex<Option<Arc<BridgeInstance>>>,
}

impl SpiObject {
    pub(crate) fn new(
        interface: Arc<WrapperBinding>,
        handler: &Arc<ScriptObject>,
        marshaler: Marshaler,
        runtime: Arc<ScriptRuntime>,
    ) -> Self {
        for name in handler.method_names() {
            if interface.override_slot(name).is_none() {
                tracing::debug!(
                    interface = %interface.class_name,
                    method = name,
                    "handler method is not an overridable hook"
                );
            }
        }
        Self {
            inner: Arc::new(SpiInner {
                interface,
                handler: Arc::downgrade(handler),
                marshaler,
                runtime,
                active: Mutex::new(None),
            }),
        }
    }

    /// Native name of the interface.
    pub fn interface(&self) -> &str {
        &self.inner.interface.class_name
    }

    pub fn binding(&self) -> &WrapperBinding {
        &self.inner.interface
    }

    /// The live bridge, if this Spi is currently registered.
    pub fn active_bridge(&self) -> Option<Arc<BridgeInstance>> {
        self.inner.active.lock().as_ref().filter(|b| !b.is_released()).cloned()
    }

    pub fn ptr_eq(&self, other: &SpiObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A new bridge for a registration that has not been accepted yet.
    pub(crate) fn open(&self) -> Result<Arc<BridgeInstance>, BridgeError> {
        let handler = self.inner.handler.upgrade().ok_or_else(|| BridgeError::StaleHandler {
            class: self.inner.interface.class_name.clone(),
            method: "RegisterSpi".to_string(),
        })?;
        Ok(Arc::new(BridgeInstance::new(
            self.inner.interface.clone(),
            &handler,
            self.inner.marshaler.clone(),
            self.inner.runtime.clone(),
        )))
    }

    /// Make `bridge` the live one, retiring the previous registration.
    pub(crate) fn activate(&self, bridge: &Arc<BridgeInstance>) {
        let previous = self.inner.active.lock().replace(bridge.clone());
        if let Some(previous) = previous {
            previous.retire();
        }
    }
}

impl std::fmt::Debug for SpiObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpiObject")
            .field("interface", &self.interface())
            .field("active", &self.active_bridge().map(|b| b.id()))
            .finish()
    }
}

/// The native-facing side of one bridge.
pub(crate) struct SpiTrampoline {
    bridge: Arc<BridgeInstance>,
}

impl SpiTrampoline {
    pub(crate) fn new(bridge: Arc<BridgeInstance>) -> Self {
        Self { bridge }
    }
}

impl NativeSpi for SpiTrampoline {
    fn invoke(&self, method: &str, args: &[NativeArg]) -> NativeArg {
        self.bridge.dispatch(method, args)
    }
}
