//! Resolved type references of the native surface.
//!
//! The native trading API only uses scalars, fixed-size character arrays,
//! and pointers to fixed-layout structs. Everything else is carried as
//! [`TypeRef::Unsupported`] so the generator can reject or skip it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar kinds with C sizes and natural alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl PrimitiveKind {
    /// Map a canonical C base-type spelling to a primitive kind.
    ///
    /// `long` maps to 32 bits, matching the LLP64 model the trading
    /// libraries are built for.
    pub fn from_c_name(name: &str) -> Option<Self> {
        let kind = match name {
            "bool" | "_Bool" => Self::Bool,
            "char" => Self::Char,
            "signed char" | "int8_t" => Self::I8,
            "unsigned char" | "uint8_t" => Self::U8,
            "short" | "int16_t" => Self::I16,
            "unsigned short" | "uint16_t" => Self::U16,
            "int" | "long" | "int32_t" => Self::I32,
            "unsigned int" | "unsigned long" | "uint32_t" => Self::U32,
            "long long" | "int64_t" => Self::I64,
            "unsigned long long" | "uint64_t" | "size_t" => Self::U64,
            "float" => Self::F32,
            "double" => Self::F64,
            _ => return None,
        };
        Some(kind)
    }

    /// C scalar spellings whose size differs between platforms and compilers.
    ///
    /// They resolve, but only to [`TypeRef::Unsupported`].
    pub fn is_platform_sized(name: &str) -> bool {
        matches!(name, "long double" | "wchar_t")
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Bool | Self::Char | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// Natural alignment in bytes.
    pub fn align(&self) -> usize {
        self.size()
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, Self::Bool | Self::F32 | Self::F64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Inclusive integer range representable by this kind, if integral.
    pub fn int_range(&self) -> Option<(i128, i128)> {
        let range = match self {
            Self::Char | Self::U8 => (0, u8::MAX as i128),
            Self::I8 => (i8::MIN as i128, i8::MAX as i128),
            Self::I16 => (i16::MIN as i128, i16::MAX as i128),
            Self::U16 => (0, u16::MAX as i128),
            Self::I32 => (i32::MIN as i128, i32::MAX as i128),
            Self::U32 => (0, u32::MAX as i128),
            Self::I64 => (i64::MIN as i128, i64::MAX as i128),
            Self::U64 => (0, u64::MAX as i128),
            Self::Bool | Self::F32 | Self::F64 => return None,
        };
        Some(range)
    }

    /// Rust spelling used in generated source.
    pub fn rust_name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Char => "u8",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Char => "char",
            other => other.rust_name(),
        };
        write!(f, "{name}")
    }
}

/// A fully resolved reference to a native type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeRef {
    /// Scalar copied by value.
    Primitive { primitive: PrimitiveKind },
    /// `char[max_len]` carried as text of at most `max_len` bytes.
    FixedText { max_len: usize },
    /// Fixed-layout protocol struct (by value or by pointer).
    StructRef { name: String },
    /// Pointer to a declared class (e.g. the Spi passed to `RegisterSpi`).
    ClassRef { name: String },
    /// NUL-terminated `char*` / `const char*`.
    CString,
    /// `void` return.
    Void,
    /// Declared type with no marshaling rule, kept with its C++ spelling.
    Unsupported { spelling: String },
}

impl TypeRef {
    pub fn primitive(kind: PrimitiveKind) -> Self {
        TypeRef::Primitive { primitive: kind }
    }

    pub fn fixed_text(max_len: usize) -> Self {
        TypeRef::FixedText { max_len }
    }

    pub fn struct_ref(name: impl Into<String>) -> Self {
        TypeRef::StructRef { name: name.into() }
    }

    pub fn class_ref(name: impl Into<String>) -> Self {
        TypeRef::ClassRef { name: name.into() }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Void)
    }

    /// Name of the referenced struct, if any.
    pub fn struct_name(&self) -> Option<&str> {
        match self {
            TypeRef::StructRef { name } => Some(name),
            _ => None,
        }
    }

    /// Name of the referenced class, if any.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            TypeRef::ClassRef { name } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Primitive { primitive } => write!(f, "{primitive}"),
            TypeRef::FixedText { max_len } => write!(f, "char[{max_len}]"),
            TypeRef::StructRef { name } => write!(f, "struct {name}"),
            TypeRef::ClassRef { name } => write!(f, "{name}*"),
            TypeRef::CString => write!(f, "char*"),
            TypeRef::Void => write!(f, "void"),
            TypeRef::Unsupported { spelling } => write!(f, "unsupported({spelling})"),
        }
    }
}

/// Value of a declared constant: a `#define` literal or a `const` global.
///
/// Floats compare by bit pattern so a model stays `Eq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ConstValue {
    /// Rust type of the constant in generated source.
    pub fn rust_type(&self) -> &'static str {
        match self {
            ConstValue::Bool(_) => "bool",
            ConstValue::Int(_) => "i64",
            ConstValue::Float(_) => "f64",
            ConstValue::Text(_) => "&str",
        }
    }

    /// Rust literal spelling of the value.
    pub fn rust_literal(&self) -> String {
        match self {
            ConstValue::Bool(b) => b.to_string(),
            ConstValue::Int(i) => i.to_string(),
            ConstValue::Float(x) => format!("{x:?}"),
            ConstValue::Text(s) => format!("{s:?}"),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ConstValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstValue::Bool(a), ConstValue::Bool(b)) => a == b,
            (ConstValue::Int(a), ConstValue::Int(b)) => a == b,
            (ConstValue::Float(a), ConstValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::Text(a), ConstValue::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConstValue {}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rust_literal())
    }
}
