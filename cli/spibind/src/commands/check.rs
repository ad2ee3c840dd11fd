//! `spibind check`: validate a declaration file without writing anything.

use std::path::Path;

use anyhow::{Context, Result};
use spibind_gen::{generate_module, GeneratorOptions};

/// Load, generate and assemble; report what would be produced.
pub fn run(decl: &Path, options: &GeneratorOptions) -> Result<()> {
    let model = super::load_model(decl)?;
    let module = generate_module(&model, options)
        .with_context(|| format!("checking {}", decl.display()))?;
    let files = module.to_files(options.lines_per_file())?;

    let skipped: usize = module.classes().iter().map(|c| c.skipped.len()).sum();
    println!(
        "ok: module {} ({} records, {} classes, {} files)",
        module.name(),
        module.records().len(),
        module.classes().len(),
        files.len()
    );
    if skipped > 0 {
        println!("    {skipped} methods skipped as unsupported");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_unresolved_types() {
        let dir = tempfile::tempdir().unwrap();
        let decl = dir.path().join("bad.bind.toml");
        std::fs::write(
            &decl,
            r#"
[library]
name = "bad"

[[structs]]
name = "Field"
fields = ["TUnknownType Value"]
"#,
        )
        .unwrap();
        let err = run(&decl, &GeneratorOptions::default()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("loading declarations"));
        assert!(message.contains("TUnknownType"));
    }

    #[test]
    fn accepts_valid_declarations() {
        let dir = tempfile::tempdir().unwrap();
        let decl = dir.path().join("ok.bind.toml");
        std::fs::write(
            &decl,
            r#"
[library]
name = "ok"

[[structs]]
name = "Field"
fields = ["int Value"]
"#,
        )
        .unwrap();
        run(&decl, &GeneratorOptions::default()).unwrap();
    }
}
