//! `$key` placeholder templates for generated files.

/// Top-level module file.
pub const MODULE_TEMPLATE: &str = include_str!("../templates/module.rs.in");

/// One chunk of class definitions when the module is split across files.
pub const CHUNK_TEMPLATE: &str = include_str!("../templates/chunk.rs.in");

/// Replace every `$key` in `template` with its value.
///
/// Longer keys are substituted first so `$module` never eats `$module_name`.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut ordered: Vec<&(&str, &str)> = vars.iter().collect();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));
    let mut out = template.to_string();
    for (key, value) in ordered {
        out = out.replace(&format!("${key}"), value);
    }
    out
}
