//! Hand-written C++ declaration parser.
//!
//! Handles the declarations found in vendor trading-API headers: class
//! methods with `virtual`/`static` specifiers, `= 0` and `{}` bodies,
//! default arguments, pointer/reference parameters, and struct fields with
//! fixed-size array suffixes. Does NOT handle templates, function pointers,
//! or multi-dimensional arrays.

use std::fmt;

use crate::error::{DeclError, Result};

/// A syntactic C++ type, before typedef and struct resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CxxType {
    /// Canonical base spelling (`"int"`, `"unsigned long long"`, or an identifier).
    pub base: String,
    pub is_const: bool,
    pub pointer_depth: u8,
    pub is_reference: bool,
    /// Array extent for `name[N]` declarators or `char[N]` typedef spellings.
    pub array_len: Option<usize>,
}

impl CxxType {
    /// A bare, unqualified type with the given base spelling.
    pub fn plain(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            is_const: false,
            pointer_depth: 0,
            is_reference: false,
            array_len: None,
        }
    }

    /// Whether this is exactly `void` (not `void*`).
    pub fn is_void(&self) -> bool {
        self.base == "void" && self.pointer_depth == 0 && !self.is_reference
    }

    /// Parse a standalone type spelling such as `char[11]` or `const char*`.
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input.trim());
        if tokens.is_empty() {
            return Err(invalid("empty type"));
        }
        let (mut ty, consumed) = parse_base_type(&tokens)?;
        let decl = parse_declarator(&tokens[consumed..])?;
        if let Some(name) = decl.name {
            return Err(invalid(format!("unexpected name '{name}' in type '{input}'")));
        }
        decl.apply(&mut ty);
        Ok(ty)
    }
}

impl fmt::Display for CxxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const {
            write!(f, "const ")?;
        }
        write!(f, "{}", self.base)?;
        for _ in 0..self.pointer_depth {
            write!(f, "*")?;
        }
        if self.is_reference {
            write!(f, "&")?;
        }
        if let Some(n) = self.array_len {
            write!(f, "[{n}]")?;
        }
        Ok(())
    }
}

/// A parsed method parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CxxParam {
    pub ty: CxxType,
    /// Parameter name (may be empty if unnamed).
    pub name: String,
    /// Default argument text, verbatim.
    pub default: Option<String>,
}

/// A parsed class method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CxxMethod {
    pub name: String,
    pub return_type: CxxType,
    pub params: Vec<CxxParam>,
    pub is_virtual: bool,
    pub is_static: bool,
    /// Declared `= 0`.
    pub is_pure: bool,
    /// `const`-qualified member function.
    pub is_const: bool,
    /// Declared `final`: may not be overridden further.
    pub is_final: bool,
}

impl CxxMethod {
    /// Parse a method declaration.
    ///
    /// Examples:
    /// - `"virtual int ReqUserLogin(CThostFtdcReqUserLoginField *pReq, int nRequestID) = 0;"`
    /// - `"virtual void OnFrontConnected(){};"`
    /// - `"static CThostFtdcTraderApi *CreateFtdcTraderApi(const char *pszFlowPath = \"\");"`
    pub fn parse(input: &str) -> Result<Self> {
        let mut rest = input.trim().trim_end_matches(';').trim_end();
        if rest.is_empty() {
            return Err(invalid("empty method declaration"));
        }

        let open = rest.find('(').ok_or_else(|| invalid(format!("missing '(' in '{input}'")))?;
        let close = matching_paren(rest, open)
            .ok_or_else(|| invalid(format!("missing ')' in '{input}'")))?;

        // Everything after the parameter list: qualifiers, `= 0`, or a body.
        let mut is_pure = false;
        let mut is_const = false;
        let mut is_final = false;
        let mut tail = rest[close + 1..].trim();
        if let Some(body_start) = tail.find('{') {
            if !tail.ends_with('}') {
                return Err(invalid(format!("unterminated body in '{input}'")));
            }
            tail = tail[..body_start].trim();
        }
        if let Some(before) = tail.strip_suffix('0') {
            let before = before.trim_end();
            if let Some(before) = before.strip_suffix('=') {
                is_pure = true;
                tail = before.trim_end();
            }
        }
        for word in tail.split_whitespace() {
            match word {
                "const" => is_const = true,
                "final" => is_final = true,
                "override" | "noexcept" => {}
                other => {
                    return Err(invalid(format!(
                        "unexpected '{other}' after parameters in '{input}'"
                    )))
                }
            }
        }

        let params_str = &rest[open + 1..close];
        rest = rest[..open].trim();

        // Leading specifiers.
        let mut is_virtual = false;
        let mut is_static = false;
        loop {
            if let Some(r) = strip_keyword(rest, "virtual") {
                is_virtual = true;
                rest = r;
            } else if let Some(r) = strip_keyword(rest, "static") {
                is_static = true;
                rest = r;
            } else if let Some(r) = strip_keyword(rest, "inline") {
                rest = r;
            } else {
                break;
            }
        }

        let (return_type, name) = parse_type_and_name(rest)?;
        let params = parse_params(params_str)?;

        Ok(CxxMethod {
            name,
            return_type,
            params,
            is_virtual,
            is_static,
            is_pure,
            is_const,
            is_final,
        })
    }
}

/// A parsed struct field declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CxxField {
    pub ty: CxxType,
    pub name: String,
}

impl CxxField {
    /// Parse a field declaration such as `TThostFtdcBrokerIDType BrokerID;`
    /// or `char UserID[16]`.
    pub fn parse(input: &str) -> Result<Self> {
        let s = input.trim().trim_end_matches(';').trim_end();
        let (ty, name) = parse_type_and_name(s)?;
        if ty.is_void() {
            return Err(invalid(format!("field '{name}' cannot be void")));
        }
        Ok(CxxField { ty, name })
    }
}

fn invalid(detail: impl Into<String>) -> DeclError {
    DeclError::InvalidSignature {
        detail: detail.into(),
    }
}

fn strip_keyword<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = s.strip_prefix(keyword)?;
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Find the `)` matching the `(` at `open`, skipping string literals.
fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_str: Option<char> = None;
    for (i, c) in s.char_indices().skip_while(|(i, _)| *i < open) {
        match in_str {
            Some(q) if c == q => in_str = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => in_str = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Split on a delimiter at nesting depth zero, outside string literals.
fn split_top_level(s: &str, delim: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_str: Option<char> = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match in_str {
            Some(q) if c == q => in_str = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => in_str = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                c if c == delim && depth == 0 => {
                    parts.push(&s[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Tokenize a declaration fragment, keeping `*`, `&`, `[`, `]` as separate tokens.
fn tokenize(s: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    for part in s.split_whitespace() {
        let mut start = 0;
        for (i, c) in part.char_indices() {
            if matches!(c, '*' | '&' | '[' | ']') {
                if i > start {
                    tokens.push(&part[start..i]);
                }
                tokens.push(&part[i..i + 1]);
                start = i + 1;
            }
        }
        if start < part.len() {
            tokens.push(&part[start..]);
        }
    }
    tokens
}

/// Parse a base type specifier; returns the type and the tokens consumed.
fn parse_base_type(tokens: &[&str]) -> Result<(CxxType, usize)> {
    let mut pos = 0;
    let mut is_const = false;

    while pos < tokens.len() && matches!(tokens[pos], "const" | "volatile") {
        is_const |= tokens[pos] == "const";
        pos += 1;
    }
    if pos < tokens.len() && matches!(tokens[pos], "struct" | "class" | "enum") {
        pos += 1;
    }
    if pos >= tokens.len() {
        return Err(invalid("expected type"));
    }

    let is_unsigned = tokens[pos] == "unsigned";
    let is_signed = tokens[pos] == "signed";
    let base = if is_unsigned || is_signed {
        pos += 1;
        let sign = if is_unsigned { "unsigned" } else { "signed" };
        match tokens.get(pos).copied() {
            Some("char") => {
                pos += 1;
                format!("{sign} char")
            }
            Some("short") => {
                pos += 1;
                if tokens.get(pos) == Some(&"int") {
                    pos += 1;
                }
                if is_unsigned {
                    "unsigned short".to_string()
                } else {
                    "short".to_string()
                }
            }
            Some("int") => {
                pos += 1;
                if is_unsigned {
                    "unsigned int".to_string()
                } else {
                    "int".to_string()
                }
            }
            Some("long") => {
                pos += 1;
                let long_long = tokens.get(pos) == Some(&"long");
                if long_long {
                    pos += 1;
                }
                if tokens.get(pos) == Some(&"int") {
                    pos += 1;
                }
                match (is_unsigned, long_long) {
                    (true, true) => "unsigned long long".to_string(),
                    (true, false) => "unsigned long".to_string(),
                    (false, true) => "long long".to_string(),
                    (false, false) => "long".to_string(),
                }
            }
            // Bare `unsigned` / `signed`
            _ => {
                if is_unsigned {
                    "unsigned int".to_string()
                } else {
                    "int".to_string()
                }
            }
        }
    } else {
        let tok = tokens[pos];
        pos += 1;
        match tok {
            "long" => {
                if tokens.get(pos) == Some(&"long") {
                    pos += 1;
                    "long long".to_string()
                } else if tokens.get(pos) == Some(&"double") {
                    pos += 1;
                    "long double".to_string()
                } else {
                    "long".to_string()
                }
            }
            "short" => {
                if tokens.get(pos) == Some(&"int") {
                    pos += 1;
                }
                "short".to_string()
            }
            "*" | "&" | "[" | "]" => {
                return Err(invalid(format!("expected type, found '{tok}'")));
            }
            other => {
                if !is_identifier(other) {
                    return Err(invalid(format!("invalid type name '{other}'")));
                }
                other.to_string()
            }
        }
    };

    // `char const*` style trailing const
    if tokens.get(pos) == Some(&"const") {
        is_const = true;
        pos += 1;
    }

    let mut ty = CxxType::plain(base);
    ty.is_const = is_const;
    Ok((ty, pos))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Pointer stars, references, optional name, and optional array extent.
struct Declarator<'a> {
    pointer_depth: u8,
    is_reference: bool,
    name: Option<&'a str>,
    array_len: Option<usize>,
}

impl Declarator<'_> {
    fn apply(&self, ty: &mut CxxType) {
        ty.pointer_depth += self.pointer_depth;
        ty.is_reference |= self.is_reference;
        if self.array_len.is_some() {
            ty.array_len = self.array_len;
        }
    }
}

fn parse_declarator<'a>(tokens: &[&'a str]) -> Result<Declarator<'a>> {
    let mut decl = Declarator {
        pointer_depth: 0,
        is_reference: false,
        name: None,
        array_len: None,
    };
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "*" => decl.pointer_depth += 1,
            "&" => decl.is_reference = true,
            // const after pointer: `char* const p`
            "const" => {}
            "[" => {
                let len_tok = tokens.get(i + 1).ok_or_else(|| invalid("missing array extent"))?;
                if tokens.get(i + 2) != Some(&"]") {
                    return Err(invalid("missing ']'"));
                }
                if decl.array_len.is_some() {
                    return Err(invalid("multi-dimensional arrays are not supported"));
                }
                let len: usize = len_tok
                    .parse()
                    .map_err(|_| invalid(format!("invalid array extent '{len_tok}'")))?;
                if len == 0 {
                    return Err(invalid("zero-length array"));
                }
                decl.array_len = Some(len);
                i += 2;
            }
            other => {
                if decl.name.is_some() || !is_identifier(other) {
                    return Err(invalid(format!("unexpected token '{other}'")));
                }
                decl.name = Some(other);
            }
        }
        i += 1;
    }
    Ok(decl)
}

/// Parse "type name" (the part of a method before `(`, or a field).
fn parse_type_and_name(s: &str) -> Result<(CxxType, String)> {
    let tokens = tokenize(s);
    if tokens.is_empty() {
        return Err(invalid("empty type and name"));
    }
    let (mut ty, consumed) = parse_base_type(&tokens)?;
    let decl = parse_declarator(&tokens[consumed..])?;
    let name = decl
        .name
        .ok_or_else(|| invalid(format!("missing name after type in '{s}'")))?
        .to_string();
    decl.apply(&mut ty);
    Ok((ty, name))
}

/// Parse the parameter list between `(` and `)`.
fn parse_params(s: &str) -> Result<Vec<CxxParam>> {
    let s = s.trim();
    if s.is_empty() || s == "void" {
        return Ok(Vec::new());
    }

    let mut params = Vec::new();
    for part in split_top_level(s, ',') {
        let part = part.trim();
        if part == "..." {
            return Err(invalid("variadic methods are not supported"));
        }
        let mut pieces = split_top_level(part, '=').into_iter();
        let decl = pieces.next().unwrap_or_default().trim();
        let default = pieces.next().map(|d| d.trim().to_string());

        let tokens = tokenize(decl);
        if tokens.is_empty() {
            return Err(invalid("empty parameter"));
        }
        let (mut ty, consumed) = parse_base_type(&tokens)?;
        let declarator = parse_declarator(&tokens[consumed..])?;
        let name = declarator.name.unwrap_or_default().to_string();
        declarator.apply(&mut ty);
        if ty.is_void() {
            return Err(invalid("'void' parameter must be the only parameter"));
        }
        params.push(CxxParam { ty, name, default });
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pure_request() {
        let m = CxxMethod::parse(
            "virtual int ReqUserLogin(CThostFtdcReqUserLoginField *pReq, int nRequestID) = 0;",
        )
        .unwrap();
        assert_eq!(m.name, "ReqUserLogin");
        assert!(m.is_virtual && m.is_pure && !m.is_static);
        assert_eq!(m.return_type, CxxType::plain("int"));
        assert_eq!(m.params.len(), 2);
        assert_eq!(m.params[0].ty.base, "CThostFtdcReqUserLoginField");
        assert_eq!(m.params[0].ty.pointer_depth, 1);
        assert_eq!(m.params[0].name, "pReq");
        assert_eq!(m.params[1].name, "nRequestID");
    }

    #[test]
    fn parse_hook_with_empty_body() {
        let m = CxxMethod::parse("virtual void OnFrontConnected(){};").unwrap();
        assert_eq!(m.name, "OnFrontConnected");
        assert!(m.is_virtual);
        assert!(!m.is_pure);
        assert!(m.return_type.is_void());
        assert!(m.params.is_empty());
    }

    #[test]
    fn parse_static_factory_with_default() {
        let m = CxxMethod::parse(
            r#"static CThostFtdcTraderApi *CreateFtdcTraderApi(const char *pszFlowPath = "");"#,
        )
        .unwrap();
        assert!(m.is_static);
        assert_eq!(m.return_type.base, "CThostFtdcTraderApi");
        assert_eq!(m.return_type.pointer_depth, 1);
        let p = &m.params[0];
        assert!(p.ty.is_const);
        assert_eq!(p.ty.base, "char");
        assert_eq!(p.default.as_deref(), Some(r#""""#));
    }

    #[test]
    fn parse_const_return_and_const_method() {
        let m = CxxMethod::parse("virtual const char *GetTradingDay() const = 0;").unwrap();
        assert!(m.is_const && m.is_pure);
        assert!(m.return_type.is_const);
        assert_eq!(m.return_type.pointer_depth, 1);
    }

    #[test]
    fn parse_multiword_primitives() {
        let text = "unsigned long long Seq(unsigned short a, long double b, signed char c)";
        let m = CxxMethod::parse(text).unwrap();
        assert_eq!(m.return_type.base, "unsigned long long");
        assert_eq!(m.params[0].ty.base, "unsigned short");
        assert_eq!(m.params[1].ty.base, "long double");
        assert_eq!(m.params[2].ty.base, "signed char");
    }

    #[test]
    fn parse_void_params_and_unnamed() {
        let m = CxxMethod::parse("virtual void Release(void) = 0;").unwrap();
        assert!(m.params.is_empty());
        let m = CxxMethod::parse("virtual void Join(int) = 0;").unwrap();
        assert!(m.params[0].name.is_empty());
    }

    #[test]
    fn parse_fields() {
        let f = CxxField::parse("TThostFtdcBrokerIDType BrokerID;").unwrap();
        assert_eq!(f.name, "BrokerID");
        assert_eq!(f.ty, CxxType::plain("TThostFtdcBrokerIDType"));

        let f = CxxField::parse("char UserID[16]").unwrap();
        assert_eq!(f.ty.base, "char");
        assert_eq!(f.ty.array_len, Some(16));
    }

    #[test]
    fn parse_type_spellings() {
        let t = CxxType::parse("char[11]").unwrap();
        assert_eq!(t.base, "char");
        assert_eq!(t.array_len, Some(11));
        let t = CxxType::parse("const char*").unwrap();
        assert!(t.is_const);
        assert_eq!(t.pointer_depth, 1);
        assert!(CxxType::parse("char x").is_err());
    }

    #[test]
    fn reject_malformed() {
        assert!(CxxMethod::parse("").is_err());
        assert!(CxxMethod::parse("int Foo int x").is_err());
        assert!(CxxMethod::parse("int Foo(int x").is_err());
        assert!(CxxMethod::parse("int Printf(const char* fmt, ...)").is_err());
        assert!(CxxField::parse("char Grid[2][3]").is_err());
        assert!(CxxField::parse("void Nothing").is_err());
    }

    #[test]
    fn display_round_trips_shape() {
        let t = CxxType::parse("const char*").unwrap();
        assert_eq!(t.to_string(), "const char*");
    }
}
