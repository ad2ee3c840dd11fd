//! Declaration file (`.bind.toml`) parsing.
//!
//! A `.bind.toml` file records the native library's typedefs, constants,
//! protocol structs, and Api/Spi classes as C++ declaration strings, pinned
//! to the library version they were taken from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DeclError, Result};
use crate::types::ConstValue;

/// A complete declaration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclarationFile {
    /// Metadata about the native library.
    pub library: LibraryInfo,
    /// C typedef name to C type spelling (`"char[11]"`, `"double"`, ...).
    #[serde(default)]
    pub typedefs: BTreeMap<String, String>,
    /// Constant macros and `const` globals, by name. TOML strings, integers,
    /// floats and booleans keep their type.
    #[serde(default)]
    pub constants: BTreeMap<String, ConstValue>,
    /// Protocol structs, in header order.
    #[serde(default)]
    pub structs: Vec<StructEntry>,
    /// Classes, in header order.
    #[serde(default)]
    pub classes: Vec<ClassEntry>,
}

/// Metadata about the native library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryInfo {
    /// Library name (e.g., "ctp").
    pub name: String,
    /// Version of the headers the declarations were taken from.
    #[serde(default)]
    pub version: Option<String>,
    /// Header files the generated module includes.
    #[serde(default)]
    pub headers: Vec<String>,
}

/// A struct declaration: field declarations in layout order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructEntry {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// A class declaration: method declarations in header order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassEntry {
    pub name: String,
    /// Abstract callback interface (Spi-like).
    #[serde(default)]
    pub interface: bool,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub methods: Vec<String>,
}

impl DeclarationFile {
    /// Parse a declaration file from a TOML string.
    pub fn parse(input: &str) -> Result<Self> {
        let file: DeclarationFile = toml::from_str(input).map_err(DeclError::Toml)?;

        if file.library.name.trim().is_empty() {
            return Err(DeclError::InvalidDeclaration {
                detail: "library.name is required".to_string(),
            });
        }

        Ok(file)
    }

    /// Parse a declaration file from a path.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}
