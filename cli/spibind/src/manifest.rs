//! `spibind.toml` project manifest.
//!
//! The manifest is optional. When present, its `[generator]` section supplies
//! defaults that command-line flags override.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use spibind_gen::GeneratorOptions;

pub const MANIFEST_FILE: &str = "spibind.toml";

/// Default output directory, relative to the project directory.
pub const DEFAULT_OUTPUT_DIR: &str = "generated";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpibindManifest {
    #[serde(default)]
    pub generator: Option<GeneratorConfig>,
}

/// `[generator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Declaration file used when none is given on the command line.
    #[serde(default)]
    pub declarations: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    /// Remove stale generated files before writing.
    #[serde(default = "default_clear_output")]
    pub clear_output: bool,
    #[serde(flatten)]
    pub options: GeneratorOptions,
}

fn default_clear_output() -> bool {
    true
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            declarations: None,
            output_dir: None,
            clear_output: default_clear_output(),
            options: GeneratorOptions::default(),
        }
    }
}

impl SpibindManifest {
    /// Search upward from `start_dir` for a `spibind.toml`, returning it with
    /// the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(MANIFEST_FILE);
            if candidate.is_file() {
                let content = std::fs::read_to_string(&candidate)
                    .with_context(|| format!("reading {}", candidate.display()))?;
                let manifest = Self::parse(&content)
                    .with_context(|| format!("parsing {}", candidate.display()))?;
                return Ok(Some((manifest, dir)));
            }
            if !dir.pop() {
                return Ok(None);
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// The generator section, or its defaults.
    pub fn generator(&self) -> GeneratorConfig {
        self.generator.clone().unwrap_or_default()
    }
}
