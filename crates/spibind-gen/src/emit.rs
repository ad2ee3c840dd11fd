//! Rust source emission for bindings.
//!
//! Output is a pure function of the binding, so regenerating an unchanged
//! model yields byte-identical text.

use spibind_core::TypeRef;

use crate::binding::{
    ConstantBinding, OverrideSlot, ParamBinding, RecordBinding, Trampoline, TrampolineKind,
    WrapperBinding,
};

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub",
    "ref", "return", "static", "struct", "super", "trait", "true", "type", "unsafe", "use", "where",
    "while",
];

/// Names that cannot be spelled even as raw identifiers.
pub(crate) const UNSPELLABLE: &[&str] = &["_", "crate", "self", "Self", "super"];

/// Convert a native `CamelCase` / `hungarianName` to `snake_case`.
///
/// Acronym runs stay together: `nRequestID` → `n_request_id`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// A `snake_case` identifier safe to use as a Rust binding.
pub fn rust_ident(name: &str) -> String {
    let snake = snake_case(name);
    if KEYWORDS.contains(&snake.as_str()) {
        format!("r#{snake}")
    } else {
        snake
    }
}

/// `pub const` item of one constant; the native name is kept verbatim.
pub fn constant_source(constant: &ConstantBinding) -> String {
    let name = if KEYWORDS.contains(&constant.name.as_str()) {
        format!("r#{}", constant.name)
    } else {
        constant.name.clone()
    };
    format!(
        "pub const {name}: {} = {};\n",
        constant.value.rust_type(),
        constant.value.rust_literal()
    )
}

fn signature(name: &str, params: &[ParamBinding], ret: &TypeRef) -> String {
    let params: Vec<String> = params
        .iter()
        .map(|p| match &p.default {
            Some(d) => format!("{}: {} = {d}", p.name, p.ty),
            None => format!("{}: {}", p.name, p.ty),
        })
        .collect();
    if ret.is_void() {
        format!("{name}({})", params.join(", "))
    } else {
        format!("{name}({}) -> {ret}", params.join(", "))
    }
}

fn value_params(params: &[ParamBinding]) -> (String, String) {
    let idents: Vec<String> = params.iter().map(|p| rust_ident(&p.name)).collect();
    let decl = idents.iter().map(|i| format!(", {i}: Value")).collect::<String>();
    (decl, idents.join(", "))
}

/// Source of one class wrapper.
pub fn class_source(binding: &WrapperBinding) -> String {
    if binding.is_interface {
        interface_source(binding)
    } else {
        api_source(binding)
    }
}

fn api_source(binding: &WrapperBinding) -> String {
    let mut out = String::new();
    let name = &binding.exposed_name;
    out.push_str(&format!("/// Wrapper for native class `{}`.\n", binding.class_name));
    out.push_str(&format!("pub struct {name}(pub ApiObject);\n"));
    out.push('\n');
    out.push_str(&format!("impl {name} {{\n"));
    out.push_str(&format!("    pub const NATIVE_NAME: &'static str = {:?};\n", binding.class_name));

    for ctor in &binding.constructors {
        let (decl, args) = value_params(&ctor.params);
        out.push('\n');
        let doc = signature(&ctor.name, &ctor.params, &ctor.return_type);
        out.push_str(&format!("    /// `{doc}`\n"));
        out.push_str(&format!(
            "    pub fn {}(module: &LoadedModule{decl}) -> Result<Self, CallError> {{\n",
            rust_ident(&ctor.name)
        ));
        out.push_str(&format!(
            "        module.construct(Self::NATIVE_NAME, {:?}, &[{args}]).map(Self)\n",
            ctor.name
        ));
        out.push_str("    }\n");
    }

    for method in &binding.methods {
        out.push('\n');
        let doc = signature(&method.name, &method.params, &method.return_type);
        out.push_str(&format!("    /// `{doc}`\n"));
        emit_method(&mut out, method);
    }

    for skipped in &binding.skipped {
        out.push('\n');
        out.push_str(&format!("    // skipped {}: {}\n", skipped.name, skipped.reason));
    }
    out.push_str("}\n");
    out
}

fn emit_method(out: &mut String, method: &Trampoline) {
    let ident = rust_ident(&method.name);
    match &method.kind {
        TrampolineKind::RegisterSpi { .. } => {
            out.push_str(&format!(
                "    pub fn {ident}(&self, spi: &SpiObject) -> Result<(), CallError> {{\n"
            ));
            out.push_str("        self.0.register_spi(spi)\n");
        }
        TrampolineKind::Init => {
            out.push_str(&format!("    pub fn {ident}(&self) -> Result<(), CallError> {{\n"));
            out.push_str("        self.0.init()\n");
        }
        TrampolineKind::Release => {
            out.push_str(&format!("    pub fn {ident}(&self) -> Result<(), CallError> {{\n"));
            out.push_str("        self.0.release()\n");
        }
        TrampolineKind::Static => {
            let (decl, args) = value_params(&method.params);
            out.push_str(&format!(
                "    pub fn {ident}(module: &LoadedModule{decl}) -> Result<Value, CallError> {{\n"
            ));
            out.push_str(&format!(
                "        module.call_static(Self::NATIVE_NAME, {:?}, &[{args}])\n",
                method.name
            ));
        }
        TrampolineKind::Call | TrampolineKind::Constructor => {
            let (decl, args) = value_params(&method.params);
            out.push_str(&format!(
                "    pub fn {ident}(&self{decl}) -> Result<Value, CallError> {{\n"
            ));
            out.push_str(&format!("        self.0.invoke({:?}, &[{args}])\n", method.name));
        }
    }
    out.push_str("    }\n");
}

fn interface_source(binding: &WrapperBinding) -> String {
    let mut out = String::new();
    let name = &binding.exposed_name;
    out.push_str(&format!(
        "/// Overridable wrapper for native interface `{}`.\n",
        binding.class_name
    ));
    out.push_str(concat!(
        "///\n",
        "/// Handler methods named after a hook are called from the native callback thread\n",
        "/// under the runtime lock; unimplemented hooks return their default.\n",
    ));
    out.push_str(&format!("pub struct {name};\n"));
    out.push('\n');
    out.push_str(&format!("impl {name} {{\n"));
    out.push_str(&format!("    pub const NATIVE_NAME: &'static str = {:?};\n", binding.class_name));
    out.push('\n');
    out.push_str("    /// Overridable hooks in dispatch-table order.\n");
    out.push_str("    pub const HOOKS: &'static [&'static str] = &[\n");
    for slot in &binding.overrides {
        emit_hook(&mut out, slot);
    }
    out.push_str("    ];\n");
    out.push('\n');
    out.push_str("    pub fn new(\n");
    out.push_str("        module: &LoadedModule,\n");
    out.push_str("        handler: &Arc<ScriptObject>,\n");
    out.push_str("    ) -> Result<SpiObject, BridgeError> {\n");
    out.push_str("        module.new_spi(Self::NATIVE_NAME, handler)\n");
    out.push_str("    }\n");
    for skipped in &binding.skipped {
        out.push('\n');
        out.push_str(&format!("    // skipped {}: {}\n", skipped.name, skipped.reason));
    }
    out.push_str("}\n");
    out
}

fn emit_hook(out: &mut String, slot: &OverrideSlot) {
    let doc = signature(&slot.name, &slot.params, &slot.return_type);
    out.push_str(&format!("        // {doc}\n"));
    out.push_str(&format!("        {:?},\n", slot.name));
}

/// Source of one record binding.
pub fn record_source(record: &RecordBinding) -> String {
    let mut out = String::new();
    let name = &record.exposed_name;
    out.push_str(&format!("/// Record for native struct `{}`.\n", record.struct_name));
    out.push_str(&format!("pub struct {name};\n"));
    out.push('\n');
    out.push_str(&format!("impl {name} {{\n"));
    out.push_str(&format!("    pub const NATIVE_NAME: &'static str = {:?};\n", record.struct_name));
    out.push_str("    pub const FIELDS: &'static [&'static str] = &[\n");
    for field in &record.fields {
        out.push_str(&format!("        {:?}, // {}\n", field.name, field.ty));
    }
    out.push_str("    ];\n");
    out.push('\n');
    out.push_str("    /// A zero-filled record.\n");
    out.push_str("    pub fn new(module: &LoadedModule) -> Result<Record, BridgeError> {\n");
    out.push_str("        module.new_record(Self::NATIVE_NAME)\n");
    out.push_str("    }\n");
    out.push_str("}\n");
    out
}
