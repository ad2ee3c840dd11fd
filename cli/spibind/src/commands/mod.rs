//! CLI command implementations.

pub mod check;
pub mod generate;
pub mod inspect;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use spibind_core::DeclarationModel;

use crate::manifest::GeneratorConfig;

/// The declaration file to use: the argument if given, else the manifest's.
pub fn resolve_declarations(
    arg: Option<&Path>,
    config: &GeneratorConfig,
    project_dir: &Path,
) -> Result<PathBuf> {
    match (arg, config.declarations.as_deref()) {
        (Some(path), _) => Ok(path.to_path_buf()),
        (None, Some(path)) => Ok(project_dir.join(path)),
        (None, None) => {
            anyhow::bail!("no declaration file given and none configured in spibind.toml")
        }
    }
}

pub fn load_model(path: &Path) -> Result<DeclarationModel> {
    let model = DeclarationModel::load(path)
        .with_context(|| format!("loading declarations {}", path.display()))?;
    tracing::info!(
        library = %model.library().name,
        structs = model.structs().len(),
        classes = model.classes().len(),
        "declarations loaded"
    );
    Ok(model)
}
