//! Generator options and symbol filters.
//!
//! Filters match qualified native names: `Class`, `Class::Method`, or a
//! struct or constant name. Patterns are anchored at the start of the name.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GenError, Result};

/// Smallest accepted `max_lines_per_file`; smaller values are raised to it.
pub const MIN_LINES_PER_FILE: usize = 200;

/// Default `max_lines_per_file`.
pub const DEFAULT_LINES_PER_FILE: usize = 500;

/// Options controlling which symbols are generated and how they are exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    /// Name of the generated module; defaults to the library name.
    pub module_name: Option<String>,
    /// Symbols matching any of these are not generated.
    pub ignore_names: Vec<String>,
    /// Interface methods matching any of these become final (not overridable).
    pub no_callback_names: Vec<String>,
    /// Skip and report methods with unsupported types instead of failing.
    pub ignore_unsupported: bool,
    /// Prefix removed from exposed class and record names.
    pub strip_prefix: Option<String>,
    /// Explicit native name → exposed name mapping; wins over `strip_prefix`.
    pub renames: BTreeMap<String, String>,
    pub max_lines_per_file: usize,
    /// Emit declared constants into the module.
    pub expose_constants: bool,
    /// Treat every symbol whose own name starts with `_` as ignored.
    pub ignore_underline_prefixed: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            module_name: None,
            ignore_names: Vec::new(),
            no_callback_names: Vec::new(),
            ignore_unsupported: false,
            strip_prefix: None,
            renames: BTreeMap::new(),
            max_lines_per_file: DEFAULT_LINES_PER_FILE,
            expose_constants: true,
            ignore_underline_prefixed: false,
        }
    }
}

impl GeneratorOptions {
    /// Effective module name for a library.
    pub fn module_name_for(&self, library: &str) -> Result<String> {
        let name = match &self.module_name {
            Some(name) => name.clone(),
            None => library.replace(['-', '.', ' '], "_"),
        };
        if !is_identifier(&name) {
            return Err(GenError::InvalidOption {
                detail: format!("module name '{name}' is not an identifier"),
            });
        }
        Ok(name)
    }

    /// Exposed name of a native class or struct.
    pub fn exposed_name(&self, native: &str) -> String {
        if let Some(renamed) = self.renames.get(native) {
            return renamed.clone();
        }
        match self.strip_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => match native.strip_prefix(prefix) {
                Some(rest) if !rest.is_empty() => rest.to_string(),
                _ => native.to_string(),
            },
            _ => native.to_string(),
        }
    }

    /// Line budget per generated file, clamped to [`MIN_LINES_PER_FILE`].
    pub fn lines_per_file(&self) -> usize {
        self.max_lines_per_file.max(MIN_LINES_PER_FILE)
    }

    /// Compile the name filters.
    pub fn compile_filters(&self) -> Result<SymbolFilter> {
        Ok(SymbolFilter {
            ignore: compile_all(&self.ignore_names)?,
            no_callback: compile_all(&self.no_callback_names)?,
            underline_prefixed: self.ignore_underline_prefixed,
        })
    }
}

/// Compiled name filters.
#[derive(Debug, Clone, Default)]
pub struct SymbolFilter {
    ignore: Vec<Regex>,
    no_callback: Vec<Regex>,
    underline_prefixed: bool,
}

impl SymbolFilter {
    pub fn is_ignored(&self, qualified: &str) -> bool {
        let own = qualified.rsplit("::").next().unwrap_or(qualified);
        (self.underline_prefixed && own.starts_with('_'))
            || self.ignore.iter().any(|r| r.is_match(qualified))
    }

    pub fn is_no_callback(&self, qualified: &str) -> bool {
        self.no_callback.iter().any(|r| r.is_match(qualified))
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&format!("^(?:{p})")).map_err(|source| GenError::InvalidPattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_prefix_and_renames() {
        let opts = GeneratorOptions {
            strip_prefix: Some("CThostFtdc".into()),
            renames: BTreeMap::from([("CThostFtdcTraderSpi".to_string(), "TdSpi".to_string())]),
            ..Default::default()
        };
        assert_eq!(opts.exposed_name("CThostFtdcTraderApi"), "TraderApi");
        assert_eq!(opts.exposed_name("CThostFtdcTraderSpi"), "TdSpi");
        assert_eq!(opts.exposed_name("CThostFtdc"), "CThostFtdc");
        assert_eq!(opts.exposed_name("Other"), "Other");
    }

    #[test]
    fn filters_anchor_at_start() {
        let opts = GeneratorOptions {
            ignore_names: vec!["CThostFtdcTraderApi::GetHandle".into()],
            no_callback_names: vec![".*::OnHeartBeatWarning".into()],
            ..Default::default()
        };
        let filter = opts.compile_filters().unwrap();
        assert!(filter.is_ignored("CThostFtdcTraderApi::GetHandle"));
        assert!(!filter.is_ignored("X::CThostFtdcTraderApi::GetHandle"));
        assert!(filter.is_no_callback("CThostFtdcTraderSpi::OnHeartBeatWarning"));
        assert!(!filter.is_no_callback("CThostFtdcTraderSpi::OnFrontConnected"));
    }

    #[test]
    fn underline_prefixed_names_filtered_on_request() {
        let mut opts = GeneratorOptions::default();
        let filter = opts.compile_filters().unwrap();
        assert!(!filter.is_ignored("_THOST_PRIVATE"));

        opts.ignore_underline_prefixed = true;
        let filter = opts.compile_filters().unwrap();
        assert!(filter.is_ignored("_THOST_PRIVATE"));
        assert!(filter.is_ignored("CThostFtdcTraderApi::_Reserved"));
        assert!(!filter.is_ignored("CThostFtdcTraderApi::Init"));
        assert!(!filter.is_ignored("_Outer::Init"));
    }

    #[test]
    fn invalid_pattern_reported() {
        let opts = GeneratorOptions {
            ignore_names: vec!["(".into()],
            ..Default::default()
        };
        assert!(matches!(opts.compile_filters(), Err(GenError::InvalidPattern { .. })));
    }

    #[test]
    fn module_name_defaults_to_library() {
        let opts = GeneratorOptions::default();
        assert_eq!(opts.module_name_for("ctp-trader").unwrap(), "ctp_trader");
        let bad = GeneratorOptions {
            module_name: Some("9lives".into()),
            ..Default::default()
        };
        assert!(bad.module_name_for("ctp").is_err());
    }

    #[test]
    fn line_budget_clamped() {
        let opts = GeneratorOptions {
            max_lines_per_file: 10,
            ..Default::default()
        };
        assert_eq!(opts.lines_per_file(), MIN_LINES_PER_FILE);
        assert_eq!(GeneratorOptions::default().lines_per_file(), 500);
    }

    #[test]
    fn missing_options_take_defaults() {
        let json = r#"{"strip_prefix": "CThostFtdc", "ignore_unsupported": true}"#;
        let opts: GeneratorOptions = serde_json::from_str(json).unwrap();
        assert!(opts.ignore_unsupported);
        assert_eq!(opts.max_lines_per_file, DEFAULT_LINES_PER_FILE);
        assert!(opts.expose_constants);
        assert!(!opts.ignore_underline_prefixed);
    }
}
