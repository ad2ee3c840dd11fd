//! Module assembly and generated-file output.
//!
//! Collects class, record and constant bindings into one [`Module`] in
//! declaration order, rejects exposed-name collisions, and renders the module into a
//! set of files: `module.rs`, optional `classes_N.rs` chunks, and the
//! `surface.json` description the bridge loads at run time.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use spibind_core::hash::text_hash;
use spibind_core::{hash_hex, DeclarationModel, LibraryInfo};

use crate::binding::{ConstantBinding, RecordBinding, WrapperBinding};
use crate::emit;
use crate::error::{GenError, Result};
use crate::generator::Generator;
use crate::policy::{is_identifier, GeneratorOptions, MIN_LINES_PER_FILE};
use crate::template::{render_template, CHUNK_TEMPLATE, MODULE_TEMPLATE};

/// Name of the surface description file.
pub const SURFACE_FILE: &str = "surface.json";

/// Structured description of everything a module exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surface {
    pub module_name: String,
    pub library: LibraryInfo,
    pub model_fingerprint: String,
    pub records: Vec<RecordBinding>,
    pub classes: Vec<WrapperBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constants: Vec<ConstantBinding>,
}

/// Items every generated module defines itself.
const MODULE_ITEMS: &[&str] =
    &["MODULE_NAME", "MODEL_FINGERPRINT", "RECORDS", "CLASSES", "SURFACE_JSON"];

/// An assembled, loadable binding module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    name: String,
    library: LibraryInfo,
    model_fingerprint: String,
    records: Vec<RecordBinding>,
    classes: Vec<WrapperBinding>,
    constants: Vec<ConstantBinding>,
}

/// Generate and assemble the module for a whole model.
pub fn generate_module(model: &DeclarationModel, options: &GeneratorOptions) -> Result<Module> {
    let generator = Generator::new(model, options)?;
    let (classes, records) = generator.generate_all()?;
    assemble(model, options, classes, records, generator.generate_constants())
}

/// Assemble bindings into one module.
///
/// Bindings are registered in the model's declaration order, records before
/// classes; constants are kept in name order. Fails with
/// [`GenError::DuplicateName`] if two bindings expose the same name;
/// records, classes and constants share one namespace.
pub fn assemble(
    model: &DeclarationModel,
    options: &GeneratorOptions,
    mut classes: Vec<WrapperBinding>,
    mut records: Vec<RecordBinding>,
    mut constants: Vec<ConstantBinding>,
) -> Result<Module> {
    let name = options.module_name_for(&model.library().name)?;

    let struct_positions: BTreeMap<&str, usize> = model
        .structs()
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.as_str(), i))
        .collect();
    for record in &records {
        if !struct_positions.contains_key(record.struct_name.as_str()) {
            return Err(GenError::UnknownSymbol {
                name: record.struct_name.clone(),
            });
        }
    }
    for class in &classes {
        if model.class_position(&class.class_name).is_none() {
            return Err(GenError::UnknownSymbol {
                name: class.class_name.clone(),
            });
        }
    }
    for constant in &constants {
        if model.constant(&constant.name).is_none() {
            return Err(GenError::UnknownSymbol {
                name: constant.name.clone(),
            });
        }
    }
    records.sort_by_key(|r| struct_positions.get(r.struct_name.as_str()).copied());
    classes.sort_by_key(|c| model.class_position(&c.class_name));
    constants.sort_by(|a, b| a.name.cmp(&b.name));

    let mut exposed: BTreeMap<&str, &str> =
        MODULE_ITEMS.iter().map(|item| (*item, "module")).collect();
    let names = records
        .iter()
        .map(|r| (r.exposed_name.as_str(), r.struct_name.as_str()))
        .chain(classes.iter().map(|c| (c.exposed_name.as_str(), c.class_name.as_str())))
        .chain(constants.iter().map(|c| (c.name.as_str(), c.name.as_str())));
    for (public, native) in names {
        if !is_identifier(public) || emit::UNSPELLABLE.contains(&public) {
            return Err(GenError::InvalidOption {
                detail: format!("exposed name '{public}' of '{native}' is not an identifier"),
            });
        }
        if let Some(first) = exposed.insert(public, native) {
            return Err(GenError::DuplicateName {
                name: public.to_string(),
                first: first.to_string(),
                second: native.to_string(),
            });
        }
    }

    tracing::debug!(
        module = %name,
        classes = classes.len(),
        records = records.len(),
        constants = constants.len(),
        "module assembled"
    );
    Ok(Module {
        name,
        library: model.library().clone(),
        model_fingerprint: hash_hex(&model.fingerprint()),
        records,
        classes,
        constants,
    })
}

impl Module {
    /// Rebuild a module from its surface description, re-rendering sources.
    pub fn from_surface(surface: Surface) -> Self {
        let Surface {
            module_name,
            library,
            model_fingerprint,
            mut records,
            mut classes,
            constants,
        } = surface;
        for record in &mut records {
            record.source = emit::record_source(record);
        }
        for class in &mut classes {
            class.source = emit::class_source(class);
        }
        Self {
            name: module_name,
            library,
            model_fingerprint,
            records,
            classes,
            constants,
        }
    }

    /// Parse a `surface.json` text.
    pub fn from_surface_json(text: &str) -> Result<Self> {
        Ok(Self::from_surface(serde_json::from_str(text)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn library(&self) -> &LibraryInfo {
        &self.library
    }

    pub fn model_fingerprint(&self) -> &str {
        &self.model_fingerprint
    }

    /// Class bindings in registration order.
    pub fn classes(&self) -> &[WrapperBinding] {
        &self.classes
    }

    /// Record bindings in registration order.
    pub fn records(&self) -> &[RecordBinding] {
        &self.records
    }

    /// Constant bindings in name order.
    pub fn constants(&self) -> &[ConstantBinding] {
        &self.constants
    }

    pub fn constant(&self, name: &str) -> Option<&ConstantBinding> {
        self.constants.iter().find(|c| c.name == name)
    }

    /// Look up a class binding by native or exposed name.
    pub fn class(&self, name: &str) -> Option<&WrapperBinding> {
        self.classes
            .iter()
            .find(|c| c.class_name == name || c.exposed_name == name)
    }

    /// Look up a record binding by native or exposed name.
    pub fn record(&self, name: &str) -> Option<&RecordBinding> {
        self.records
            .iter()
            .find(|r| r.struct_name == name || r.exposed_name == name)
    }

    pub fn surface(&self) -> Surface {
        Surface {
            module_name: self.name.clone(),
            library: self.library.clone(),
            model_fingerprint: self.model_fingerprint.clone(),
            records: self.records.clone(),
            classes: self.classes.clone(),
            constants: self.constants.clone(),
        }
    }

    /// The whole module rendered as one source file.
    pub fn source(&self) -> String {
        self.render_module(&self.header_includes(), &self.definitions().join("\n"))
    }

    /// Hex SHA-256 over the rendered source.
    pub fn fingerprint(&self) -> String {
        hash_hex(&text_hash(&self.source()))
    }

    /// Render the module into files of at most `max_lines` lines each.
    ///
    /// `max_lines` below [`MIN_LINES_PER_FILE`] is raised to it. A single
    /// definition longer than the budget gets a chunk of its own.
    pub fn to_files(&self, max_lines: usize) -> Result<GeneratedFiles> {
        let max_lines = max_lines.max(MIN_LINES_PER_FILE);
        let mut files = BTreeMap::new();

        let single = self.source();
        if single.lines().count() <= max_lines {
            files.insert("module.rs".to_string(), single);
        } else {
            let chunks = self.chunk_definitions(max_lines);
            let mut includes = self.header_includes();
            for (i, chunk) in chunks.iter().enumerate() {
                let file = format!("classes_{i}.rs");
                includes.push_str(&format!("mod classes_{i};\npub use classes_{i}::*;\n"));
                let text = render_template(
                    CHUNK_TEMPLATE,
                    &[("module_name", &self.name), ("classes_generator_definitions", chunk)],
                );
                files.insert(file, text);
            }
            tracing::debug!(
                module = %self.name,
                chunks = chunks.len(),
                "module split across files"
            );
            files.insert("module.rs".to_string(), self.render_module(&includes, ""));
        }

        let mut surface = serde_json::to_string_pretty(&self.surface())?;
        surface.push('\n');
        files.insert(SURFACE_FILE.to_string(), surface);
        Ok(GeneratedFiles { files })
    }

    fn definitions(&self) -> Vec<&str> {
        self.records
            .iter()
            .map(|r| r.source.as_str())
            .chain(self.classes.iter().map(|c| c.source.as_str()))
            .collect()
    }

    fn chunk_definitions(&self, max_lines: usize) -> Vec<String> {
        let overhead = CHUNK_TEMPLATE.lines().count();
        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_lines = 0;
        for def in self.definitions() {
            let lines = def.lines().count() + 1;
            if current_lines > 0 && overhead + current_lines + lines > max_lines {
                chunks.push(std::mem::take(&mut current));
                current_lines = 0;
            }
            if current_lines > 0 {
                current.push('\n');
            }
            current.push_str(def);
            current_lines += lines;
        }
        if current_lines > 0 {
            chunks.push(current);
        }
        chunks
    }

    fn header_includes(&self) -> String {
        self.library
            .headers
            .iter()
            .map(|h| format!("// native header: {h}\n"))
            .collect()
    }

    fn module_body(&self) -> String {
        let mut body = String::new();
        body.push_str(&format!("pub const MODULE_NAME: &str = {:?};\n", self.name));
        body.push_str(&format!(
            "pub const MODEL_FINGERPRINT: &str = {:?};\n",
            self.model_fingerprint
        ));
        body.push('\n');
        if !self.constants.is_empty() {
            body.push_str("// Declared constants.\n");
            for c in &self.constants {
                body.push_str(&emit::constant_source(c));
            }
            body.push('\n');
        }
        body.push_str("/// Exposed records in registration order.\n");
        body.push_str("pub const RECORDS: &[&str] = &[\n");
        for r in &self.records {
            body.push_str(&format!("    {:?},\n", r.exposed_name));
        }
        body.push_str("];\n\n");
        body.push_str("/// Exposed classes in registration order.\n");
        body.push_str("pub const CLASSES: &[&str] = &[\n");
        for c in &self.classes {
            body.push_str(&format!("    {:?},\n", c.exposed_name));
        }
        body.push_str("];\n\n");
        body.push_str("/// Surface description for `LoadedModule::load`.\n");
        body.push_str(&format!(
            "pub const SURFACE_JSON: &str = include_str!({SURFACE_FILE:?});\n"
        ));
        body
    }

    fn render_module(&self, includes: &str, definitions: &str) -> String {
        let version = self.library.version.as_deref().unwrap_or("unversioned");
        let library = format!("{} {version}", self.library.name);
        render_template(
            MODULE_TEMPLATE,
            &[
                ("library", &library),
                ("module_name", &self.name),
                ("generator_version", env!("CARGO_PKG_VERSION")),
                ("model_fingerprint", &self.model_fingerprint),
                ("includes", includes.trim_end()),
                ("classes_generator_definitions", definitions.trim_end()),
                ("module_body", self.module_body().trim_end()),
            ],
        )
    }
}

/// Generated files keyed by relative file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedFiles {
    files: BTreeMap<String, String>,
}

impl GeneratedFiles {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write every file into `dir`, creating it if needed.
    ///
    /// With `clear`, regular files already in `dir` are removed first;
    /// subdirectories are left alone.
    pub fn output(&self, dir: &Path, clear: bool) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        if clear {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    tracing::debug!(path = %entry.path().display(), "removing stale output");
                    std::fs::remove_file(entry.path())?;
                }
            }
        }
        for (name, text) in &self.files {
            std::fs::write(dir.join(name), text)?;
        }
        tracing::info!(dir = %dir.display(), files = self.files.len(), "generated files written");
        Ok(())
    }

    /// Write a file count followed by one name per line.
    pub fn write_filenames(&self, out: &mut impl io::Write) -> io::Result<()> {
        writeln!(out, "# of files generated : {}", self.files.len())?;
        for name in self.files.keys() {
            writeln!(out, "{name}")?;
        }
        Ok(())
    }
}
