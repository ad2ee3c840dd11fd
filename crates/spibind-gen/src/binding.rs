//! Generated binding artifacts.
//!
//! A [`WrapperBinding`] describes one native class as exposed to scripting
//! code; a [`RecordBinding`] describes one protocol struct. Both carry their
//! rendered source so module assembly only has to concatenate. A
//! [`ConstantBinding`] is one declared constant, emitted as a `pub const`.

use serde::{Deserialize, Serialize};
use spibind_core::{content_hash, hash_hex, ConstValue, TypeRef};
use spibind_marshal::MarshalRule;

/// How a trampoline reaches the native library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrampolineKind {
    /// Static factory returning a new instance of the class.
    Constructor,
    /// Any other static method.
    Static,
    /// Registers an interface implementation (`RegisterSpi`).
    RegisterSpi { interface: String },
    /// Starts the native worker (`Init`).
    Init,
    /// Tears the instance down (`Release`).
    Release,
    /// Plain request or query.
    Call,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamBinding {
    pub name: String,
    pub ty: TypeRef,
    pub rule: MarshalRule,
    /// Default argument spelling, if the header declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// A callable method of a non-interface class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trampoline {
    pub name: String,
    pub kind: TrampolineKind,
    pub params: Vec<ParamBinding>,
    pub return_type: TypeRef,
    pub return_rule: MarshalRule,
}

impl Trampoline {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// An overridable hook of an interface class.
///
/// The slot fixes name and signature; the callable is bound per instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideSlot {
    pub name: String,
    pub params: Vec<ParamBinding>,
    pub return_type: TypeRef,
    pub return_rule: MarshalRule,
    pub is_pure: bool,
}

/// A method left out of the binding, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedMethod {
    pub name: String,
    pub reason: String,
}

/// Binding of one native class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperBinding {
    pub class_name: String,
    pub exposed_name: String,
    pub is_interface: bool,
    pub constructors: Vec<Trampoline>,
    pub methods: Vec<Trampoline>,
    pub overrides: Vec<OverrideSlot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedMethod>,
    /// Rendered Rust source of the wrapper definition.
    #[serde(skip)]
    pub source: String,
}

impl WrapperBinding {
    pub fn method(&self, name: &str) -> Option<&Trampoline> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn constructor(&self, name: &str) -> Option<&Trampoline> {
        self.constructors.iter().find(|c| c.name == name)
    }

    pub fn override_slot(&self, name: &str) -> Option<&OverrideSlot> {
        self.overrides.iter().find(|s| s.name == name)
    }

    /// Hex SHA-256 over the binding including its source.
    pub fn fingerprint(&self) -> String {
        hash_hex(&content_hash(&(self, &self.source)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub ty: TypeRef,
}

/// Binding of one protocol struct as a field-addressable record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordBinding {
    pub struct_name: String,
    pub exposed_name: String,
    /// Fields in declaration order.
    pub fields: Vec<RecordField>,
    #[serde(skip)]
    pub source: String,
}

/// A declared constant exposed under its native name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantBinding {
    pub name: String,
    pub value: ConstValue,
}
