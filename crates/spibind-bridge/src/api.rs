//! Scripting-side handles to native Api instances.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use spibind_gen::{TrampolineKind, WrapperBinding};
use spibind_marshal::{Marshaler, Value};
use uuid::Uuid;

use crate::bridge::BridgeInstance;
use crate::call::native_args;
use crate::error::CallError;
use crate::native::{NativeApi, NativeFault, NativeLibrary};
use crate::spi::{SpiObject, SpiTrampoline};

/// A native Api instance owned by scripting code.
///
/// Cloning shares the instance. The instance owns at most one bridge,
/// the one for its current Spi registration.
#[derive(Clone)]
pub struct ApiObject {
    inner: Arc<ApiInner>,
}

struct ApiInner {
    id: Uuid,
    binding: Arc<WrapperBinding>,
    native: Arc<dyn NativeApi>,
    library: Arc<dyn NativeLibrary>,
    marshaler: Marshaler,
    bridge: Mutex<Option<Arc<BridgeInstance>>>,
    released: AtomicBool,
}

impl ApiObject {
    pub(crate) fn new(
        binding: Arc<WrapperBinding>,
        native: Arc<dyn NativeApi>,
        library: Arc<dyn NativeLibrary>,
        marshaler: Marshaler,
    ) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(api = %id, class = %binding.class_name, "api instance created");
        Self {
            inner: Arc::new(ApiInner {
                id,
                binding,
                native,
                library,
                marshaler,
                bridge: Mutex::new(None),
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Native class name.
    pub fn class_name(&self) -> &str {
        &self.inner.binding.class_name
    }

    pub fn binding(&self) -> &WrapperBinding {
        &self.inner.binding
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// The bridge for the current Spi registration.
    pub fn bridge(&self) -> Option<Arc<BridgeInstance>> {
        self.inner.bridge.lock().clone()
    }

    /// Call a method by native name.
    ///
    /// `Init`, `Release` and statics are routed to their dedicated paths;
    /// `RegisterSpi` needs an [`SpiObject`] and goes through
    /// [`register_spi`](Self::register_spi).
    pub fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, CallError> {
        let inner = &self.inner;
        let trampoline = inner.binding.method(method).ok_or_else(|| CallError::UnknownMethod {
            class: inner.binding.class_name.clone(),
            method: method.to_string(),
        })?;
        match &trampoline.kind {
            TrampolineKind::Init => return self.init().map(|()| Value::Null),
            TrampolineKind::Release => return self.release().map(|()| Value::Null),
            TrampolineKind::RegisterSpi { .. } => {
                return Err(CallError::WrongKind {
                    method: method.to_string(),
                    detail: "register an Spi object with register_spi".to_string(),
                })
            }
            TrampolineKind::Static | TrampolineKind::Constructor => {
                let native = native_args(
                    &inner.marshaler,
                    &inner.binding.class_name,
                    method,
                    &trampoline.params,
                    args,
                )?;
                let result = inner
                    .library
                    .call_static(&inner.binding.class_name, method, &native)
                    .map_err(|fault| native_error(method, fault))?;
                let path = format!("{}::{method} -> return", inner.binding.class_name);
                return Ok(inner.marshaler.to_script(&trampoline.return_type, &result, &path)?);
            }
            TrampolineKind::Call => {}
        }
        self.check_live()?;
        let class = &inner.binding.class_name;
        let native = native_args(&inner.marshaler, class, method, &trampoline.params, args)?;
        let result = inner
            .native
            .call(method, &native)
            .map_err(|fault| native_error(method, fault))?;
        let path = format!("{class}::{method} -> return");
        Ok(inner.marshaler.to_script(&trampoline.return_type, &result, &path)?)
    }

    /// Register `spi` as this instance's callback sink.
    ///
    /// Opens a new bridge for `spi`. Once the native library accepts it, the
    /// bridge this instance held before and any bridge `spi` had with another
    /// instance are retired. If the library refuses it, both stay live.
    pub fn register_spi(&self, spi: &SpiObject) -> Result<(), CallError> {
        self.check_live()?;
        let inner = &self.inner;
        let (method, expected) = inner
            .binding
            .methods
            .iter()
            .find_map(|m| match &m.kind {
                TrampolineKind::RegisterSpi { interface } => {
                    Some((m.name.as_str(), interface.as_str()))
                }
                _ => None,
            })
            .ok_or_else(|| CallError::UnknownMethod {
                class: inner.binding.class_name.clone(),
                method: "RegisterSpi".to_string(),
            })?;
        if spi.interface() != expected {
            return Err(CallError::InterfaceMismatch {
                method: method.to_string(),
                expected: expected.to_string(),
                found: spi.interface().to_string(),
            });
        }

        let bridge = spi.open()?;
        let accepted = inner
            .native
            .register_spi(Arc::new(SpiTrampoline::new(bridge.clone())));
        if let Err(fault) = accepted {
            // earlier registrations stay live
            bridge.retire();
            return Err(native_error(method, fault));
        }
        spi.activate(&bridge);
        let previous = inner.bridge.lock().replace(bridge.clone());
        if let Some(previous) = previous {
            previous.retire();
        }
        tracing::info!(
            api = %inner.id,
            bridge = %bridge.id(),
            interface = expected,
            overridden = bridge.overridden().count(),
            "spi registered"
        );
        Ok(())
    }

    /// Start the native worker; callbacks may arrive from now on.
    pub fn init(&self) -> Result<(), CallError> {
        self.check_live()?;
        self.inner.native.init().map_err(|fault| native_error("Init", fault))?;
        tracing::info!(
            api = %self.inner.id,
            class = %self.inner.binding.class_name,
            "api initialised"
        );
        Ok(())
    }

    /// Release the native instance.
    ///
    /// The bridge stops accepting callbacks first, a handler already running
    /// on the callback thread is allowed to finish, and only then is the
    /// native instance released. Releasing twice is a no-op.
    pub fn release(&self) -> Result<(), CallError> {
        self.inner.release()
    }

    fn check_live(&self) -> Result<(), CallError> {
        if self.is_released() {
            return Err(CallError::Released {
                class: self.inner.binding.class_name.clone(),
            });
        }
        Ok(())
    }
}

impl ApiInner {
    fn release(&self) -> Result<(), CallError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let bridge = self.bridge.lock().take();
        if let Some(bridge) = bridge {
            bridge.retire();
        }
        self.native.release().map_err(|fault| native_error("Release", fault))?;
        tracing::info!(api = %self.id, class = %self.binding.class_name, "api released");
        Ok(())
    }
}

impl Drop for ApiInner {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(api = %self.id, "release on drop failed: {e}");
        }
    }
}

impl std::fmt::Debug for ApiObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiObject")
            .field("id", &self.inner.id)
            .field("class", &self.inner.binding.class_name)
            .field("released", &self.is_released())
            .finish()
    }
}

pub(crate) fn native_error(method: &str, fault: NativeFault) -> CallError {
    CallError::NativeCall {
        method: method.to_string(),
        code: fault.code,
        message: fault.message,
    }
}
