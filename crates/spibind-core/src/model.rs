//! The closed, read-only declaration model.
//!
//! Built once from a declaration file (or programmatically) and shared by
//! the generator and the bridge. Construction validates that every struct
//! and class reference resolves inside the model.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::csig::{CxxField, CxxMethod, CxxType};
use crate::declaration::{DeclarationFile, LibraryInfo};
use crate::error::{DeclError, Result};
use crate::hash::{content_hash, ContentHash};
use crate::types::{ConstValue, PrimitiveKind, TypeRef};

/// A method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    /// Default argument text from the header, if any.
    #[serde(default)]
    pub default: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }
}

/// A declared class method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeRef,
    pub is_virtual: bool,
    /// Declared `= 0`.
    pub is_pure: bool,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_final: bool,
}

impl MethodDecl {
    /// A non-virtual instance method.
    pub fn new(name: impl Into<String>, params: Vec<Param>, return_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            params,
            return_type,
            is_virtual: false,
            is_pure: false,
            is_static: false,
            is_final: false,
        }
    }

    /// A virtual hook with an empty default body (`virtual void OnX(...) {}`).
    pub fn hook(name: impl Into<String>, params: Vec<Param>, return_type: TypeRef) -> Self {
        Self {
            is_virtual: true,
            ..Self::new(name, params, return_type)
        }
    }

    /// A pure virtual method (`virtual int ReqX(...) = 0`).
    pub fn pure(name: impl Into<String>, params: Vec<Param>, return_type: TypeRef) -> Self {
        Self {
            is_virtual: true,
            is_pure: true,
            ..Self::new(name, params, return_type)
        }
    }

    /// Whether scripting code may override this method on an interface.
    pub fn is_overridable(&self) -> bool {
        self.is_virtual && !self.is_static && !self.is_final
    }

    /// All type references this method mentions, return type first.
    pub fn type_refs(&self) -> impl Iterator<Item = &TypeRef> {
        std::iter::once(&self.return_type).chain(self.params.iter().map(|p| &p.ty))
    }
}

/// A declared class (Api-like or Spi-like).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub methods: Vec<MethodDecl>,
    pub is_interface: bool,
    #[serde(default)]
    pub base: Option<String>,
}

impl ClassDecl {
    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// A struct field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A fixed-layout protocol struct. Field order is the memory order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

impl StructDecl {
    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A named constant of the native library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstDecl {
    pub name: String,
    pub value: ConstValue,
}

impl ConstDecl {
    pub fn new(name: impl Into<String>, value: ConstValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// The complete, validated declaration model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationModel {
    library: LibraryInfo,
    structs: Vec<StructDecl>,
    classes: Vec<ClassDecl>,
    /// Sorted by name.
    constants: Vec<ConstDecl>,
    struct_index: BTreeMap<String, usize>,
    class_index: BTreeMap<String, usize>,
}

impl DeclarationModel {
    /// Load and validate a model from a `.bind.toml` file.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        Self::from_file(&DeclarationFile::load(path)?)
    }

    /// Parse and validate a model from `.bind.toml` text.
    pub fn parse(input: &str) -> Result<Self> {
        Self::from_file(&DeclarationFile::parse(input)?)
    }

    /// Resolve every declaration string of a parsed file.
    pub fn from_file(file: &DeclarationFile) -> Result<Self> {
        let struct_names: BTreeSet<&str> = file.structs.iter().map(|s| s.name.as_str()).collect();
        let class_names: BTreeSet<&str> = file.classes.iter().map(|c| c.name.as_str()).collect();

        for name in file.typedefs.keys() {
            if struct_names.contains(name.as_str()) || class_names.contains(name.as_str()) {
                return Err(invalid(format!("typedef '{name}' shadows a struct or class")));
            }
        }

        let resolver = TypeResolver {
            typedefs: &file.typedefs,
            structs: &struct_names,
            classes: &class_names,
        };

        let mut structs = Vec::with_capacity(file.structs.len());
        for entry in &file.structs {
            let mut fields = Vec::with_capacity(entry.fields.len());
            for raw in &entry.fields {
                let field = CxxField::parse(raw)?;
                let context = format!("field {}::{}", entry.name, field.name);
                let expanded = resolver.expand(&field.ty)?;
                if expanded.pointer_depth > 0 || expanded.is_reference {
                    return Err(invalid(format!("{context}: pointer fields are not fixed-layout")));
                }
                let ty = resolver.resolve(&field.ty, &context)?;
                fields.push(FieldDecl::new(field.name, ty));
            }
            structs.push(StructDecl {
                name: entry.name.clone(),
                fields,
            });
        }

        let mut classes = Vec::with_capacity(file.classes.len());
        for entry in &file.classes {
            let mut methods = Vec::with_capacity(entry.methods.len());
            for raw in &entry.methods {
                let m = CxxMethod::parse(raw)?;
                let context = format!("method {}::{}", entry.name, m.name);
                let return_type = resolver.resolve(&m.return_type, &context)?;
                let mut params = Vec::with_capacity(m.params.len());
                for (i, p) in m.params.iter().enumerate() {
                    let name = if p.name.is_empty() { format!("arg{i}") } else { p.name.clone() };
                    params.push(Param {
                        ty: resolver.resolve(&p.ty, &format!("{context}({name})"))?,
                        name,
                        default: p.default.clone(),
                    });
                }
                methods.push(MethodDecl {
                    name: m.name,
                    params,
                    return_type,
                    is_virtual: m.is_virtual,
                    is_pure: m.is_pure,
                    is_static: m.is_static,
                    is_final: m.is_final,
                });
            }
            classes.push(ClassDecl {
                name: entry.name.clone(),
                methods,
                is_interface: entry.interface,
                base: entry.base.clone(),
            });
        }

        let constants = file
            .constants
            .iter()
            .map(|(name, value)| ConstDecl::new(name.clone(), value.clone()))
            .collect();
        Self::new(file.library.clone(), structs, classes)?.with_constants(constants)
    }

    /// Build a model from already-resolved declarations, validating closure.
    ///
    /// Fails with [`DeclError::UnresolvedType`] if any struct or class
    /// reference names something outside the model.
    pub fn new(
        library: LibraryInfo,
        structs: Vec<StructDecl>,
        classes: Vec<ClassDecl>,
    ) -> Result<Self> {
        let mut struct_index = BTreeMap::new();
        for (i, s) in structs.iter().enumerate() {
            if struct_index.insert(s.name.clone(), i).is_some() {
                return Err(invalid(format!("duplicate struct '{}'", s.name)));
            }
            let mut seen = BTreeSet::new();
            for f in &s.fields {
                if !seen.insert(f.name.as_str()) {
                    return Err(invalid(format!("duplicate field '{}::{}'", s.name, f.name)));
                }
                match &f.ty {
                    TypeRef::Primitive { .. }
                    | TypeRef::FixedText { .. }
                    | TypeRef::StructRef { .. } => {}
                    other => {
                        return Err(invalid(format!(
                            "field '{}::{}' has non fixed-layout type {other}",
                            s.name, f.name
                        )))
                    }
                }
            }
        }

        let mut class_index = BTreeMap::new();
        for (i, c) in classes.iter().enumerate() {
            if struct_index.contains_key(&c.name) {
                return Err(invalid(format!("'{}' is declared as both struct and class", c.name)));
            }
            if class_index.insert(c.name.clone(), i).is_some() {
                return Err(invalid(format!("duplicate class '{}'", c.name)));
            }
            let mut seen = BTreeSet::new();
            for m in &c.methods {
                if !seen.insert(m.name.as_str()) {
                    return Err(invalid(format!(
                        "overloaded method '{}::{}' is not supported",
                        c.name, m.name
                    )));
                }
            }
        }

        let model = Self {
            library,
            structs,
            classes,
            constants: Vec::new(),
            struct_index,
            class_index,
        };
        model.check_closed()?;
        model.check_struct_cycles()?;
        model.check_bases()?;
        Ok(model)
    }

    /// Replace the model's constants.
    ///
    /// Names must be C identifiers, unique, and distinct from every struct
    /// and class name; float values must be finite.
    pub fn with_constants(mut self, mut constants: Vec<ConstDecl>) -> Result<Self> {
        constants.sort_by(|a, b| a.name.cmp(&b.name));
        for pair in constants.windows(2) {
            if pair[0].name == pair[1].name {
                return Err(invalid(format!("duplicate constant '{}'", pair[0].name)));
            }
        }
        for c in &constants {
            if !is_c_identifier(&c.name) {
                return Err(invalid(format!(
                    "constant name '{}' is not an identifier",
                    c.name
                )));
            }
            let taken = self.struct_index.contains_key(&c.name)
                || self.class_index.contains_key(&c.name);
            if taken {
                return Err(invalid(format!("constant '{}' shadows a struct or class", c.name)));
            }
            if matches!(c.value, ConstValue::Float(x) if !x.is_finite()) {
                return Err(invalid(format!("constant '{}' is not a finite number", c.name)));
            }
        }
        self.constants = constants;
        Ok(self)
    }

    pub fn library(&self) -> &LibraryInfo {
        &self.library
    }

    /// Constants in name order.
    pub fn constants(&self) -> &[ConstDecl] {
        &self.constants
    }

    pub fn constant(&self, name: &str) -> Option<&ConstDecl> {
        self.constants
            .binary_search_by(|c| c.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.constants[i])
    }

    /// Structs in declaration order.
    pub fn structs(&self) -> &[StructDecl] {
        &self.structs
    }

    /// Classes in declaration order.
    pub fn classes(&self) -> &[ClassDecl] {
        &self.classes
    }

    pub fn find_struct(&self, name: &str) -> Option<&StructDecl> {
        self.struct_index.get(name).map(|&i| &self.structs[i])
    }

    pub fn find_class(&self, name: &str) -> Option<&ClassDecl> {
        self.class_index.get(name).map(|&i| &self.classes[i])
    }

    /// Declaration position of a class, used for stable module ordering.
    pub fn class_position(&self, name: &str) -> Option<usize> {
        self.class_index.get(name).copied()
    }

    /// Methods of a class including inherited ones, base-first.
    ///
    /// A method redeclared in a derived class replaces the base entry in place.
    pub fn all_methods<'a>(&'a self, class: &'a ClassDecl) -> Vec<&'a MethodDecl> {
        let mut chain = vec![class];
        let mut current = class;
        while let Some(base) = current.base.as_deref().and_then(|b| self.find_class(b)) {
            chain.push(base);
            current = base;
        }

        let mut methods: Vec<&MethodDecl> = Vec::new();
        for c in chain.into_iter().rev() {
            for m in &c.methods {
                match methods.iter_mut().find(|existing| existing.name == m.name) {
                    Some(slot) => *slot = m,
                    None => methods.push(m),
                }
            }
        }
        methods
    }

    /// SHA-256 over the semantic content of the model.
    pub fn fingerprint(&self) -> ContentHash {
        content_hash(&(&self.library, &self.structs, &self.classes, &self.constants))
    }

    fn check_ref(&self, ty: &TypeRef, context: &str) -> Result<()> {
        match ty {
            TypeRef::StructRef { name } if !self.struct_index.contains_key(name) => {
                Err(DeclError::UnresolvedType {
                    name: name.clone(),
                    context: context.to_string(),
                })
            }
            TypeRef::ClassRef { name } if !self.class_index.contains_key(name) => {
                Err(DeclError::UnresolvedType {
                    name: name.clone(),
                    context: context.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn check_closed(&self) -> Result<()> {
        for s in &self.structs {
            for f in &s.fields {
                self.check_ref(&f.ty, &format!("field {}::{}", s.name, f.name))?;
            }
        }
        for c in &self.classes {
            for m in &c.methods {
                for ty in m.type_refs() {
                    self.check_ref(ty, &format!("method {}::{}", c.name, m.name))?;
                }
            }
        }
        Ok(())
    }

    /// Structs are stored inline, so containment must be acyclic.
    fn check_struct_cycles(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(model: &DeclarationModel, idx: usize, marks: &mut [Mark]) -> Result<()> {
            match marks[idx] {
                Mark::Done => return Ok(()),
                Mark::InProgress => {
                    return Err(invalid(format!(
                        "struct '{}' contains itself",
                        model.structs[idx].name
                    )))
                }
                Mark::Unvisited => {}
            }
            marks[idx] = Mark::InProgress;
            for f in &model.structs[idx].fields {
                if let Some(next) = f.ty.struct_name().and_then(|n| model.struct_index.get(n)) {
                    visit(model, *next, marks)?;
                }
            }
            marks[idx] = Mark::Done;
            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; self.structs.len()];
        for idx in 0..self.structs.len() {
            visit(self, idx, &mut marks)?;
        }
        Ok(())
    }

    fn check_bases(&self) -> Result<()> {
        for c in &self.classes {
            let mut seen = BTreeSet::from([c.name.as_str()]);
            let mut current = c;
            while let Some(base) = current.base.as_deref() {
                let next = self.find_class(base).ok_or_else(|| {
                    invalid(format!("class '{}' has undeclared base '{base}'", current.name))
                })?;
                if !seen.insert(next.name.as_str()) {
                    return Err(invalid(format!("inheritance cycle through '{}'", c.name)));
                }
                current = next;
            }
        }
        Ok(())
    }
}

fn is_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn invalid(detail: impl Into<String>) -> DeclError {
    DeclError::InvalidDeclaration {
        detail: detail.into(),
    }
}

/// Maps syntactic C++ types to [`TypeRef`]s through typedefs.
struct TypeResolver<'a> {
    typedefs: &'a BTreeMap<String, String>,
    structs: &'a BTreeSet<&'a str>,
    classes: &'a BTreeSet<&'a str>,
}

impl TypeResolver<'_> {
    /// Follow the typedef chain of a type's base spelling.
    fn expand(&self, ty: &CxxType) -> Result<CxxType> {
        let mut current = ty.clone();
        let mut seen = BTreeSet::new();
        while let Some(spelling) = self.typedefs.get(&current.base) {
            if !seen.insert(current.base.clone()) {
                return Err(invalid(format!("typedef cycle through '{}'", current.base)));
            }
            let target = CxxType::parse(spelling)?;
            if target.array_len.is_some() && current.array_len.is_some() {
                return Err(invalid(format!(
                    "array of array typedef '{}' is not supported",
                    current.base
                )));
            }
            current.base = target.base;
            current.is_const |= target.is_const;
            current.pointer_depth += target.pointer_depth;
            current.is_reference |= target.is_reference;
            current.array_len = current.array_len.or(target.array_len);
        }
        Ok(current)
    }

    fn resolve(&self, ty: &CxxType, context: &str) -> Result<TypeRef> {
        let t = self.expand(ty)?;
        let unsupported = || TypeRef::Unsupported {
            spelling: ty.to_string(),
        };
        let base = t.base.as_str();
        let indirection = t.pointer_depth + u8::from(t.is_reference);
        let primitive = PrimitiveKind::from_c_name(base);
        let is_struct = self.structs.contains(base);
        let is_class = self.classes.contains(base);
        let known = primitive.is_some()
            || PrimitiveKind::is_platform_sized(base)
            || is_struct
            || is_class
            || base == "void";

        if !known {
            return Err(DeclError::UnresolvedType {
                name: base.to_string(),
                context: context.to_string(),
            });
        }

        if let Some(n) = t.array_len {
            return Ok(if primitive == Some(PrimitiveKind::Char) && indirection == 0 {
                TypeRef::fixed_text(n)
            } else {
                unsupported()
            });
        }

        let resolved = match indirection {
            0 if base == "void" => TypeRef::Void,
            0 if is_struct => TypeRef::struct_ref(base),
            0 => match primitive {
                Some(kind) => TypeRef::primitive(kind),
                None => unsupported(),
            },
            1 if primitive == Some(PrimitiveKind::Char) => TypeRef::CString,
            1 if is_struct => TypeRef::struct_ref(base),
            1 if is_class => TypeRef::class_ref(base),
            _ => unsupported(),
        };
        Ok(resolved)
    }
}
