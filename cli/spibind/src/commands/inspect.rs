//! `spibind inspect`: describe what a declaration file would expose.

use std::path::Path;

use anyhow::{Context, Result};
use spibind_core::{DeclarationModel, TypeRef};
use spibind_gen::{generate_module, GeneratorOptions, Module, ParamBinding, TrampolineKind};
use spibind_marshal::LayoutTable;

/// Print the module surface as text or JSON.
pub fn run(decl: &Path, options: &GeneratorOptions, format: &str) -> Result<()> {
    let model = super::load_model(decl)?;
    let module = generate_module(&model, options)
        .with_context(|| format!("generating bindings for {}", decl.display()))?;
    let text = match format {
        "text" => render_text(&model, &module)?,
        "json" => serde_json::to_string_pretty(&module.surface())?,
        other => anyhow::bail!("unknown format '{other}' (expected text or json)"),
    };
    println!("{text}");
    Ok(())
}

fn signature(name: &str, params: &[ParamBinding], ret: &TypeRef) -> String {
    let params: Vec<String> = params.iter().map(|p| format!("{} {}", p.ty, p.name)).collect();
    if ret.is_void() {
        format!("{name}({})", params.join(", "))
    } else {
        format!("{name}({}) -> {ret}", params.join(", "))
    }
}

fn kind_label(kind: &TrampolineKind) -> &'static str {
    match kind {
        TrampolineKind::Constructor => "constructor",
        TrampolineKind::Static => "static",
        TrampolineKind::RegisterSpi { .. } => "register",
        TrampolineKind::Init => "init",
        TrampolineKind::Release => "release",
        TrampolineKind::Call => "call",
    }
}

pub fn render_text(model: &DeclarationModel, module: &Module) -> Result<String> {
    let layouts = LayoutTable::build(model)?;
    let library = module.library();
    let mut text = String::new();

    text.push_str(&format!(
        "library {} {}\n",
        library.name,
        library.version.as_deref().unwrap_or("(unversioned)")
    ));
    if !library.headers.is_empty() {
        text.push_str(&format!("headers {}\n", library.headers.join(", ")));
    }
    let fingerprint = module.model_fingerprint();
    text.push_str(&format!(
        "module {} ({})\n",
        module.name(),
        fingerprint.get(..12).unwrap_or(fingerprint)
    ));

    text.push_str(&format!("\nrecords ({}):\n", module.records().len()));
    for record in module.records() {
        let layout = layouts.require(&record.struct_name)?;
        text.push_str(&format!(
            "  {} <- {}  size {} align {}\n",
            record.exposed_name, record.struct_name, layout.size, layout.align
        ));
        for field in &layout.fields {
            text.push_str(&format!("    @{:<4} {} {}\n", field.offset, field.ty, field.name));
        }
    }

    if !module.constants().is_empty() {
        text.push_str(&format!("\nconstants ({}):\n", module.constants().len()));
        for c in module.constants() {
            text.push_str(&format!("  {} = {}\n", c.name, c.value));
        }
    }

    text.push_str(&format!("\nclasses ({}):\n", module.classes().len()));
    for class in module.classes() {
        if class.is_interface {
            text.push_str(&format!(
                "  {} <- {}  interface, {} hooks\n",
                class.exposed_name,
                class.class_name,
                class.overrides.len()
            ));
            for slot in &class.overrides {
                let hook = signature(&slot.name, &slot.params, &slot.return_type);
                text.push_str(&format!("    hook {hook}\n"));
            }
        } else {
            text.push_str(&format!("  {} <- {}\n", class.exposed_name, class.class_name));
            for t in class.constructors.iter().chain(&class.methods) {
                text.push_str(&format!(
                    "    {:<11} {}\n",
                    kind_label(&t.kind),
                    signature(&t.name, &t.params, &t.return_type)
                ));
            }
        }
        for skipped in &class.skipped {
            text.push_str(&format!("    skipped     {}: {}\n", skipped.name, skipped.reason));
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECL: &str = r#"
[library]
name = "mini"
version = "1.2"
headers = ["MiniApi.h"]

[constants]
MINI_SIDE_BUY = "0"
MINI_MAX_VOLUME = 100

[[structs]]
name = "MiniReqField"
fields = ["char Account[13]", "int Volume"]

[[classes]]
name = "MiniSpi"
interface = true
methods = ["virtual void OnRspOrder(MiniReqField *pReq, int nRequestID){};"]

[[classes]]
name = "MiniApi"
methods = [
    "static MiniApi *CreateMiniApi();",
    "virtual void RegisterSpi(MiniSpi *pSpi) = 0;",
    "virtual int ReqOrder(MiniReqField *pReq, int nRequestID) = 0;",
]
"#;

    #[test]
    fn text_view_lists_layout_and_methods() {
        let model = DeclarationModel::parse(DECL).unwrap();
        let options = GeneratorOptions {
            strip_prefix: Some("Mini".into()),
            ..Default::default()
        };
        let module = generate_module(&model, &options).unwrap();
        let text = render_text(&model, &module).unwrap();

        assert!(text.starts_with("library mini 1.2\nheaders MiniApi.h\n"));
        assert!(text.contains("  ReqField <- MiniReqField  size 20 align 4\n"));
        assert!(text.contains("    @16   i32 Volume\n"));
        assert!(text.contains("  Spi <- MiniSpi  interface, 1 hooks\n"));
        assert!(text.contains("constructor CreateMiniApi() -> MiniApi*"));
        assert!(
            text.contains("call        ReqOrder(struct MiniReqField pReq, i32 nRequestID) -> i32")
        );
        assert!(text.contains("\nconstants (2):\n"));
        assert!(text.contains("  MINI_MAX_VOLUME = 100\n  MINI_SIDE_BUY = \"0\"\n"));
    }
}
