//! Per-registration callback bridge.
//!
//! A [`BridgeInstance`] connects one native Spi registration to one
//! scripting handler. It is created when an Spi is registered with an Api
//! instance, retired when that registration is replaced or the Api is
//! released, and is the only path by which native callbacks reach
//! scripting code.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use spibind_gen::{OverrideSlot, WrapperBinding};
use spibind_marshal::{MarshalError, Marshaler, NativeArg, Value};
use uuid::Uuid;

use crate::error::{BridgeError, Result};
use crate::runtime::{FaultReport, ScriptRuntime};
use crate::script::ScriptObject;

pub struct BridgeInstance {
    id: Uuid,
    interface: Arc<WrapperBinding>,
    handler: Weak<ScriptObject>,
    /// Hooks the handler implements, fixed at construction.
    overridden: BTreeSet<String>,
    marshaler: Marshaler,
    runtime: Arc<ScriptRuntime>,
    released: AtomicBool,
}

impl BridgeInstance {
    pub(crate) fn new(
        interface: Arc<WrapperBinding>,
        handler: &Arc<ScriptObject>,
        marshaler: Marshaler,
        runtime: Arc<ScriptRuntime>,
    ) -> Self {
        let overridden: BTreeSet<String> = interface
            .overrides
            .iter()
            .filter(|slot| handler.has_method(&slot.name))
            .map(|slot| slot.name.clone())
            .collect();
        let id = Uuid::new_v4();
        tracing::debug!(
            bridge = %id,
            interface = %interface.class_name,
            overridden = overridden.len(),
            hooks = interface.overrides.len(),
            "bridge created"
        );
        Self {
            id,
            interface,
            handler: Arc::downgrade(handler),
            overridden,
            marshaler,
            runtime,
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Native name of the bridged interface.
    pub fn interface(&self) -> &str {
        &self.interface.class_name
    }

    pub fn is_overridden(&self, hook: &str) -> bool {
        self.overridden.contains(hook)
    }

    pub fn overridden(&self) -> impl Iterator<Item = &str> {
        self.overridden.iter().map(String::as_str)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// True once the scripting handler has been destroyed.
    pub fn is_stale(&self) -> bool {
        self.handler.strong_count() == 0
    }

    /// Stop accepting dispatches.
    ///
    /// Waits for a handler running on another thread to finish. From inside
    /// the runtime it only sets the flag: no other handler can be running,
    /// and a callback thread still waiting for the lock sees the flag and
    /// returns the hook's default.
    pub(crate) fn retire(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if !ScriptRuntime::in_runtime() {
            self.runtime.barrier();
        }
        tracing::debug!(
            bridge = %self.id,
            interface = %self.interface.class_name,
            "bridge retired"
        );
    }

    /// Deliver one native callback to the handler.
    ///
    /// Blocks until the execution lock is free or the bridge is released. Never fails: any error is
    /// recorded as a [`FaultReport`] and the hook's default value is
    /// returned to the native caller.
    pub fn dispatch(&self, method: &str, args: &[NativeArg]) -> NativeArg {
        match self.try_dispatch(method, args) {
            Ok(result) => result,
            Err(error) => {
                let fallback = self
                    .interface
                    .override_slot(method)
                    .map(|slot| self.marshaler.default_native(&slot.return_type))
                    .unwrap_or(NativeArg::Void);
                if let BridgeError::Released { .. } = error {
                    tracing::debug!(bridge = %self.id, method, "dispatch after release dropped");
                } else {
                    self.runtime.report(FaultReport {
                        bridge: self.id,
                        interface: self.interface.class_name.clone(),
                        method: method.to_string(),
                        error,
                    });
                }
                fallback
            }
        }
    }

    /// Like [`dispatch`](Self::dispatch), but hands the error back instead
    /// of recording it.
    pub fn try_dispatch(&self, method: &str, args: &[NativeArg]) -> Result<NativeArg> {
        let slot = self
            .interface
            .override_slot(method)
            .ok_or_else(|| BridgeError::UnknownHook {
                class: self.interface.class_name.clone(),
                method: method.to_string(),
            })?;
        if self.is_released() {
            return Err(self.released_error());
        }
        if ScriptRuntime::in_runtime() {
            return Err(BridgeError::ReentrantDispatch {
                method: method.to_string(),
            });
        }
        // unimplemented hooks skip marshaling and only check liveness
        let values = if self.overridden.contains(method) {
            Some(self.script_args(slot, args)?)
        } else {
            None
        };
        let outcome = self
            .runtime
            .run_handler(&self.released, |ctx| -> Result<Option<Value>> {
                // release may have landed while this thread waited for the lock
                if self.is_released() {
                    return Err(self.released_error());
                }
                let handler = self.handler.upgrade().ok_or_else(|| BridgeError::StaleHandler {
                    class: self.interface.class_name.clone(),
                    method: method.to_string(),
                })?;
                match &values {
                    None => Ok(None),
                    Some(values) => handler
                        .call(ctx, method, values)
                        .map(Some)
                        .map_err(|e| BridgeError::Handler {
                            method: method.to_string(),
                            message: e.to_string(),
                        }),
                }
            })
            .map_err(|message| BridgeError::HandlerPanic {
                method: method.to_string(),
                message,
            })?
            .ok_or_else(|| self.released_error())??;

        let Some(value) = outcome else {
            return Ok(self.marshaler.default_native(&slot.return_type));
        };
        if slot.return_type.is_void() {
            return Ok(NativeArg::Void);
        }
        let path = format!("{}::{} -> return", self.interface.class_name, method);
        self.marshaler
            .to_native(&slot.return_type, &value, &path)
            .map_err(|source| BridgeError::Marshal {
                method: method.to_string(),
                source,
            })
    }

    fn script_args(&self, slot: &OverrideSlot, args: &[NativeArg]) -> Result<Vec<Value>> {
        if args.len() != slot.params.len() {
            return Err(BridgeError::Arity {
                method: slot.name.clone(),
                expected: slot.params.len(),
                actual: args.len(),
            });
        }
        slot.params
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                let path = format!("{}::{}({})", self.interface.class_name, slot.name, param.name);
                self.marshaler.to_script(&param.ty, arg, &path)
            })
            .collect::<std::result::Result<Vec<_>, MarshalError>>()
            .map_err(|source| BridgeError::Marshal {
                method: slot.name.clone(),
                source,
            })
    }

    fn released_error(&self) -> BridgeError {
        BridgeError::Released {
            class: self.interface.class_name.clone(),
        }
    }
}

impl std::fmt::Debug for BridgeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeInstance")
            .field("id", &self.id)
            .field("interface", &self.interface.class_name)
            .field("overridden", &self.overridden)
            .field("released", &self.is_released())
            .field("stale", &self.is_stale())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spibind_core::DeclarationModel;
    use spibind_gen::{generate, GeneratorOptions};
    use spibind_marshal::{NativeStruct, Scalar};

    use crate::script::ScriptError;

    const DECL: &str = r#"
[library]
name = "demo"

[[structs]]
name = "Quote"
fields = ["char Symbol[8]", "double Price"]

[[classes]]
name = "QuoteSpi"
interface = true
methods = [
    "virtual void OnQuote(Quote *pQuote, bool bIsLast){};",
    "virtual int OnQueryDepth(){ return 0; };",
    "virtual void OnClosed(){};",
]
"#;

    fn fixture() -> (Arc<WrapperBinding>, Marshaler, Arc<ScriptRuntime>) {
        let model = Arc::new(DeclarationModel::parse(DECL).unwrap());
        let spi = model.find_class("QuoteSpi").unwrap();
        let binding = generate(&model, spi, &GeneratorOptions::default()).unwrap();
        let marshaler = Marshaler::new(model.clone()).unwrap();
        (Arc::new(binding), marshaler, ScriptRuntime::new())
    }

    fn quote(marshaler: &Marshaler, symbol: &str, price: f64) -> NativeArg {
        let record = marshaler
            .new_record("Quote")
            .unwrap()
            .with("Symbol", symbol)
            .unwrap()
            .with("Price", price)
            .unwrap();
        NativeArg::Struct(marshaler.encode_struct(&record).unwrap())
    }

    fn recording_handler() -> Arc<ScriptObject> {
        ScriptObject::builder("Recorder")
            .method("OnQuote", |ctx, args| {
                let symbol = args[0]
                    .as_record()
                    .and_then(|r| r.get("Symbol"))
                    .and_then(Value::as_str)
                    .unwrap_or("?")
                    .to_string();
                ctx.print(symbol);
                Ok(Value::Null)
            })
            .method("OnQueryDepth", |_, _| Ok(Value::Int(7)))
            .build()
    }

    #[test]
    fn overridden_hook_runs_under_runtime() {
        let (binding, marshaler, runtime) = fixture();
        let handler = recording_handler();
        let bridge = BridgeInstance::new(binding, &handler, marshaler.clone(), runtime.clone());

        let args = [quote(&marshaler, "IF2406", 3500.0), NativeArg::Scalar(Scalar::Bool(true))];
        let out = bridge.dispatch("OnQuote", &args);
        assert_eq!(out, NativeArg::Void);
        assert_eq!(bridge.dispatch("OnQueryDepth", &[]), NativeArg::Scalar(Scalar::I32(7)));
        assert_eq!(runtime.enter(|ctx| ctx.take_output()).unwrap(), vec!["IF2406".to_string()]);
        assert_eq!(runtime.fault_count(), 0);
    }

    #[test]
    fn missing_hook_returns_default_without_invoking() {
        let (binding, marshaler, runtime) = fixture();
        let handler = ScriptObject::builder("Empty").build();
        let bridge = BridgeInstance::new(binding, &handler, marshaler, runtime.clone());
        assert!(!bridge.is_overridden("OnQueryDepth"));
        assert_eq!(bridge.dispatch("OnQueryDepth", &[]), NativeArg::Scalar(Scalar::I32(0)));
        assert_eq!(bridge.try_dispatch("OnClosed", &[]), Ok(NativeArg::Void));
        assert_eq!(runtime.fault_count(), 0);
    }

    #[test]
    fn unknown_hook_is_reported() {
        let (binding, marshaler, runtime) = fixture();
        let handler = recording_handler();
        let bridge = BridgeInstance::new(binding, &handler, marshaler, runtime.clone());
        assert_eq!(bridge.dispatch("OnMissing", &[]), NativeArg::Void);
        let faults = runtime.drain_faults();
        assert!(matches!(faults[0].error, BridgeError::UnknownHook { .. }));
    }

    #[test]
    fn destroyed_handler_is_stale() {
        let (binding, marshaler, runtime) = fixture();
        let handler = recording_handler();
        let bridge = BridgeInstance::new(binding, &handler, marshaler, runtime.clone());
        drop(handler);
        assert!(bridge.is_stale());
        assert!(matches!(
            bridge.try_dispatch("OnQueryDepth", &[]),
            Err(BridgeError::StaleHandler { .. })
        ));
        assert_eq!(bridge.dispatch("OnQueryDepth", &[]), NativeArg::Scalar(Scalar::I32(0)));
        assert!(matches!(runtime.drain_faults()[0].error, BridgeError::StaleHandler { .. }));
    }

    #[test]
    fn retired_bridge_drops_dispatch_silently() {
        let (binding, marshaler, runtime) = fixture();
        let handler = recording_handler();
        let bridge = BridgeInstance::new(binding, &handler, marshaler, runtime.clone());
        bridge.retire();
        assert!(bridge.is_released());
        assert!(matches!(
            bridge.try_dispatch("OnQueryDepth", &[]),
            Err(BridgeError::Released { .. })
        ));
        assert_eq!(bridge.dispatch("OnQueryDepth", &[]), NativeArg::Scalar(Scalar::I32(0)));
        assert_eq!(runtime.fault_count(), 0);
    }

    #[test]
    fn dispatch_inside_runtime_is_rejected() {
        let (binding, marshaler, runtime) = fixture();
        let handler = recording_handler();
        let bridge = BridgeInstance::new(binding, &handler, marshaler, runtime.clone());
        let nested = runtime.enter(|_| bridge.try_dispatch("OnQueryDepth", &[])).unwrap();
        assert!(matches!(nested, Err(BridgeError::ReentrantDispatch { .. })));
    }

    #[test]
    fn handler_errors_and_panics_become_faults() {
        let (binding, marshaler, runtime) = fixture();
        let handler = ScriptObject::builder("Faulty")
            .method("OnQueryDepth", |_, _| Err(ScriptError::raise("no depth")))
            .method("OnClosed", |_, _| panic!("closed twice"))
            .build();
        let bridge = BridgeInstance::new(binding, &handler, marshaler, runtime.clone());
        assert_eq!(bridge.dispatch("OnQueryDepth", &[]), NativeArg::Scalar(Scalar::I32(0)));
        assert_eq!(bridge.dispatch("OnClosed", &[]), NativeArg::Void);

        let faults = runtime.drain_faults();
        assert_eq!(faults.len(), 2);
        assert_eq!(
            faults[0].error,
            BridgeError::Handler {
                method: "OnQueryDepth".into(),
                message: "no depth".into()
            }
        );
        assert_eq!(
            faults[1].error,
            BridgeError::HandlerPanic {
                method: "OnClosed".into(),
                message: "closed twice".into()
            }
        );
    }

    #[test]
    fn bad_return_value_falls_back_to_default() {
        let (binding, marshaler, runtime) = fixture();
        let handler = ScriptObject::builder("Wrong")
            .method("OnQueryDepth", |_, _| Ok(Value::from("deep")))
            .build();
        let bridge = BridgeInstance::new(binding, &handler, marshaler, runtime.clone());
        assert_eq!(bridge.dispatch("OnQueryDepth", &[]), NativeArg::Scalar(Scalar::I32(0)));
        assert!(matches!(runtime.drain_faults()[0].error, BridgeError::Marshal { .. }));
    }

    #[test]
    fn arity_and_struct_mismatch_reported() {
        let (binding, marshaler, runtime) = fixture();
        let handler = recording_handler();
        let bridge = BridgeInstance::new(binding, &handler, marshaler, runtime);
        assert!(matches!(
            bridge.try_dispatch("OnQuote", &[]),
            Err(BridgeError::Arity { expected: 2, actual: 0, .. })
        ));
        let wrong = NativeArg::Struct(NativeStruct::new("Other", vec![0; 16]));
        assert!(matches!(
            bridge.try_dispatch("OnQuote", &[wrong, NativeArg::Scalar(Scalar::Bool(false))]),
            Err(BridgeError::Marshal { .. })
        ));
    }
}
