//! Scripting-side objects.
//!
//! A [`ScriptObject`] is a handler written in the scripting runtime: a named
//! bag of callables. Callables receive the runtime's [`ScriptContext`] and
//! only ever run while the execution lock is held.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use spibind_marshal::{MarshalError, Value};

use crate::error::{BridgeError, CallError};

/// Error raised by a scripting callable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("{0}")]
    Raised(String),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl ScriptError {
    pub fn raise(message: impl Into<String>) -> Self {
        ScriptError::Raised(message.into())
    }
}

/// A scripting callable.
pub type ScriptFn =
    Arc<dyn Fn(&mut ScriptContext, &[Value]) -> Result<Value, ScriptError> + Send + Sync>;

/// Mutable state of the scripting runtime.
#[derive(Debug, Default)]
pub struct ScriptContext {
    globals: BTreeMap<String, Value>,
    output: Vec<String>,
}

impl ScriptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.globals.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.globals.remove(name)
    }

    /// Add `delta` to an integer global, starting from zero.
    pub fn bump(&mut self, name: &str, delta: i64) -> i64 {
        let next = self.globals.get(name).and_then(Value::as_i64).unwrap_or(0) + delta;
        self.globals.insert(name.to_string(), Value::Int(next));
        next
    }

    /// Append a line to the runtime's output.
    pub fn print(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }
}

/// A scripting object whose methods may override interface hooks.
pub struct ScriptObject {
    class_name: String,
    methods: BTreeMap<String, ScriptFn>,
}

impl ScriptObject {
    pub fn builder(class_name: impl Into<String>) -> ScriptObjectBuilder {
        ScriptObjectBuilder {
            class_name: class_name.into(),
            methods: BTreeMap::new(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn method(&self, name: &str) -> Option<&ScriptFn> {
        self.methods.get(name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Call a method directly. The caller must already be inside the runtime.
    pub fn call(
        &self,
        ctx: &mut ScriptContext,
        name: &str,
        args: &[Value],
    ) -> Result<Value, ScriptError> {
        match self.methods.get(name) {
            Some(f) => f(ctx, args),
            None => Err(ScriptError::raise(format!("{} has no method '{name}'", self.class_name))),
        }
    }
}

impl fmt::Debug for ScriptObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptObject")
            .field("class_name", &self.class_name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct ScriptObjectBuilder {
    class_name: String,
    methods: BTreeMap<String, ScriptFn>,
}

impl ScriptObjectBuilder {
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut ScriptContext, &[Value]) -> Result<Value, ScriptError> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(f));
        self
    }

    pub fn build(self) -> Arc<ScriptObject> {
        Arc::new(ScriptObject {
            class_name: self.class_name,
            methods: self.methods,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_call() {
        let obj = ScriptObject::builder("Handler")
            .method("Double", |_, args| Ok(Value::Int(args[0].as_i64().unwrap_or(0) * 2)))
            .build();
        let mut ctx = ScriptContext::new();
        assert!(obj.has_method("Double"));
        assert_eq!(obj.call(&mut ctx, "Double", &[Value::Int(21)]), Ok(Value::Int(42)));
        assert!(obj.call(&mut ctx, "Missing", &[]).is_err());
    }

    #[test]
    fn context_globals_and_output() {
        let mut ctx = ScriptContext::new();
        assert_eq!(ctx.bump("count", 1), 1);
        assert_eq!(ctx.bump("count", 2), 3);
        ctx.set("name", "x");
        assert_eq!(ctx.get("name"), Some(&Value::from("x")));
        ctx.print("hello");
        assert_eq!(ctx.take_output(), vec!["hello".to_string()]);
        assert!(ctx.output().is_empty());
    }
}
