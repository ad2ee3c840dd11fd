//! A generated module bound to a native library at run time.

use std::collections::BTreeMap;
use std::sync::Arc;

use spibind_core::{hash_hex, DeclarationModel};
use spibind_gen::{Module, TrampolineKind, WrapperBinding};
use spibind_marshal::{Marshaler, Record, Value};

use crate::api::{native_error, ApiObject};
use crate::call::native_args;
use crate::error::{BridgeError, CallError, Result};
use crate::native::NativeLibrary;
use crate::runtime::ScriptRuntime;
use crate::script::ScriptObject;
use crate::spi::SpiObject;

/// The run-time form of a generated module.
pub struct LoadedModule {
    module: Module,
    classes: BTreeMap<String, Arc<WrapperBinding>>,
    marshaler: Marshaler,
    library: Arc<dyn NativeLibrary>,
    runtime: Arc<ScriptRuntime>,
}

impl LoadedModule {
    /// Bind `module` to `library`.
    ///
    /// `model` must be the declarations the module was generated from.
    pub fn load(
        module: Module,
        model: Arc<DeclarationModel>,
        library: Arc<dyn NativeLibrary>,
        runtime: Arc<ScriptRuntime>,
    ) -> Result<Self> {
        let fingerprint = hash_hex(&model.fingerprint());
        if module.model_fingerprint() != fingerprint {
            return Err(BridgeError::ModelMismatch {
                module: module.model_fingerprint().to_string(),
                model: fingerprint,
            });
        }
        let marshaler = Marshaler::new(model)?;
        let classes = module
            .classes()
            .iter()
            .map(|c| (c.class_name.clone(), Arc::new(c.clone())))
            .collect();
        tracing::info!(
            module = module.name(),
            library = %module.library().name,
            classes = module.classes().len(),
            records = module.records().len(),
            "module loaded"
        );
        Ok(Self {
            module,
            classes,
            marshaler,
            library,
            runtime,
        })
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn runtime(&self) -> &Arc<ScriptRuntime> {
        &self.runtime
    }

    pub fn marshaler(&self) -> &Marshaler {
        &self.marshaler
    }

    /// Binding of a class by native or exposed name.
    pub fn class(&self, name: &str) -> Option<&Arc<WrapperBinding>> {
        let binding = self.module.class(name)?;
        self.classes.get(&binding.class_name)
    }

    /// Create an Api instance through the named static factory.
    pub fn construct(
        &self,
        class: &str,
        constructor: &str,
        args: &[Value],
    ) -> std::result::Result<ApiObject, CallError> {
        let binding = self.api_class(class)?;
        let ctor = binding.constructor(constructor).ok_or_else(|| CallError::UnknownMethod {
            class: binding.class_name.clone(),
            method: constructor.to_string(),
        })?;
        let class = &binding.class_name;
        let native = native_args(&self.marshaler, class, constructor, &ctor.params, args)?;
        let api = self
            .library
            .create(&binding.class_name, constructor, &native)
            .map_err(|fault| native_error(constructor, fault))?;
        Ok(ApiObject::new(binding.clone(), api, self.library.clone(), self.marshaler.clone()))
    }

    /// Create an Api instance through its first factory.
    pub fn create_api(
        &self,
        class: &str,
        args: &[Value],
    ) -> std::result::Result<ApiObject, CallError> {
        let binding = self.api_class(class)?;
        let ctor = binding.constructors.first().ok_or_else(|| CallError::NoConstructor {
            class: binding.class_name.clone(),
        })?;
        self.construct(&binding.class_name, &ctor.name, args)
    }

    pub fn call_static(
        &self,
        class: &str,
        method: &str,
        args: &[Value],
    ) -> std::result::Result<Value, CallError> {
        let binding = self.api_class(class)?;
        let trampoline = binding
            .method(method)
            .filter(|m| m.kind == TrampolineKind::Static)
            .ok_or_else(|| CallError::UnknownMethod {
                class: binding.class_name.clone(),
                method: method.to_string(),
            })?;
        let class = &binding.class_name;
        let native = native_args(&self.marshaler, class, method, &trampoline.params, args)?;
        let result = self
            .library
            .call_static(&binding.class_name, method, &native)
            .map_err(|fault| native_error(method, fault))?;
        let path = format!("{}::{method} -> return", binding.class_name);
        Ok(self.marshaler.to_script(&trampoline.return_type, &result, &path)?)
    }

    /// Wrap `handler` as an implementation of the interface `class`.
    pub fn new_spi(&self, class: &str, handler: &Arc<ScriptObject>) -> Result<SpiObject> {
        let binding = self.class(class).ok_or_else(|| BridgeError::UnknownClass {
            name: class.to_string(),
        })?;
        if !binding.is_interface {
            return Err(BridgeError::NotAnInterface {
                name: binding.class_name.clone(),
            });
        }
        Ok(SpiObject::new(
            binding.clone(),
            handler,
            self.marshaler.clone(),
            self.runtime.clone(),
        ))
    }

    /// A zero-filled record by native or exposed struct name.
    pub fn new_record(&self, name: &str) -> Result<Record> {
        let record = self
            .module
            .record(name)
            .ok_or_else(|| BridgeError::UnknownRecord { name: name.to_string() })?;
        Ok(self.marshaler.new_record(&record.struct_name)?)
    }

    /// Value of an exposed constant.
    pub fn constant(&self, name: &str) -> Option<Value> {
        self.module.constant(name).map(|c| Value::from(&c.value))
    }

    fn api_class(&self, class: &str) -> std::result::Result<&Arc<WrapperBinding>, CallError> {
        self.class(class)
            .filter(|b| !b.is_interface)
            .ok_or_else(|| CallError::UnknownClass { name: class.to_string() })
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("module", &self.module.name())
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .finish()
    }
}
