//! `spibind generate`: write the binding module for a declaration file.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use spibind_gen::{generate_module, GeneratedFiles, GeneratorOptions};

use crate::manifest::{GeneratorConfig, DEFAULT_OUTPUT_DIR};

/// Command-line overrides of the manifest's `[generator]` section.
#[derive(Debug, Default)]
pub struct GenerateArgs {
    pub output: Option<PathBuf>,
    pub module_name: Option<String>,
    pub ignore_names: Vec<String>,
    pub no_callback_names: Vec<String>,
    pub ignore_unsupported: bool,
    pub strip_prefix: Option<String>,
    pub no_constants: bool,
    pub ignore_underline_prefixed: bool,
    pub max_lines_per_file: Option<usize>,
    pub no_clear_output: bool,
}

impl GenerateArgs {
    /// Generator options with these overrides applied on top of `base`.
    pub fn apply(&self, base: &GeneratorOptions) -> GeneratorOptions {
        let mut options = base.clone();
        if let Some(name) = &self.module_name {
            options.module_name = Some(name.clone());
        }
        options.ignore_names.extend(self.ignore_names.iter().cloned());
        options.no_callback_names.extend(self.no_callback_names.iter().cloned());
        options.ignore_unsupported |= self.ignore_unsupported;
        options.expose_constants &= !self.no_constants;
        options.ignore_underline_prefixed |= self.ignore_underline_prefixed;
        if let Some(prefix) = &self.strip_prefix {
            options.strip_prefix = Some(prefix.clone());
        }
        if let Some(lines) = self.max_lines_per_file {
            options.max_lines_per_file = lines;
        }
        options
    }
}

/// Generate and write the module; returns the files written.
pub fn run(
    decl: &Path,
    config: &GeneratorConfig,
    project_dir: &Path,
    args: &GenerateArgs,
) -> Result<GeneratedFiles> {
    let model = super::load_model(decl)?;
    let options = args.apply(&config.options);
    let module = generate_module(&model, &options)
        .with_context(|| format!("generating bindings for {}", decl.display()))?;
    let files = module.to_files(options.lines_per_file())?;

    let output = match &args.output {
        Some(dir) => dir.clone(),
        None => project_dir.join(config.output_dir.as_deref().unwrap_or(DEFAULT_OUTPUT_DIR)),
    };
    let clear = config.clear_output && !args.no_clear_output;
    files
        .output(&output, clear)
        .with_context(|| format!("writing {}", output.display()))?;

    files.write_filenames(&mut io::stdout().lock())?;
    Ok(files)
}
