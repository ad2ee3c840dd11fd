//! Argument marshaling for calls into the native library.

use spibind_core::TypeRef;
use spibind_gen::ParamBinding;
use spibind_marshal::{Marshaler, NativeArg, Value};

use crate::error::CallError;

/// Marshal scripting arguments for `class::method`.
///
/// Missing trailing arguments take the parameter's declared default.
pub(crate) fn native_args(
    marshaler: &Marshaler,
    class: &str,
    method: &str,
    params: &[ParamBinding],
    args: &[Value],
) -> Result<Vec<NativeArg>, CallError> {
    let arity_error = || CallError::Arity {
        method: format!("{class}::{method}"),
        expected: params.len(),
        actual: args.len(),
    };
    if args.len() > params.len() {
        return Err(arity_error());
    }
    let mut out = Vec::with_capacity(params.len());
    for (i, param) in params.iter().enumerate() {
        let defaulted;
        let value = match args.get(i) {
            Some(value) => value,
            None => {
                defaulted = param
                    .default
                    .as_deref()
                    .and_then(|spelling| default_arg(&param.ty, spelling))
                    .ok_or_else(arity_error)?;
                &defaulted
            }
        };
        let path = format!("{class}::{method}({})", param.name);
        out.push(marshaler.to_native(&param.ty, value, &path)?);
    }
    Ok(out)
}

/// Interpret a declared default argument.
///
/// Only literal spellings are understood; anything else makes the argument
/// mandatory.
pub(crate) fn default_arg(ty: &TypeRef, spelling: &str) -> Option<Value> {
    let s = spelling.trim();
    if matches!(s, "NULL" | "nullptr") {
        return Some(Value::Null);
    }
    if let Some(text) = s.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return Some(Value::Text(text.to_string()));
    }
    if let Some(c) = s.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        return Some(Value::Text(c.to_string()));
    }
    match s {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        _ => {}
    }
    if let Ok(i) = s.parse::<i64>() {
        // a literal 0 is also a null pointer
        return Some(match ty {
            TypeRef::CString | TypeRef::StructRef { .. } if i == 0 => Value::Null,
            _ => Value::Int(i),
        });
    }
    let float = s.strip_suffix(['f', 'F']).unwrap_or(s);
    float.parse::<f64>().ok().map(Value::Float)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spibind_core::PrimitiveKind;

    #[test]
    fn default_spellings() {
        let int = TypeRef::Primitive {
            primitive: PrimitiveKind::I32,
        };
        assert_eq!(default_arg(&TypeRef::CString, "\"\""), Some(Value::from("")));
        assert_eq!(default_arg(&TypeRef::CString, "NULL"), Some(Value::Null));
        assert_eq!(default_arg(&TypeRef::CString, "0"), Some(Value::Null));
        assert_eq!(default_arg(&int, "0"), Some(Value::Int(0)));
        assert_eq!(default_arg(&int, "-3"), Some(Value::Int(-3)));
        assert_eq!(default_arg(&int, "true"), Some(Value::Bool(true)));
        assert_eq!(default_arg(&int, "1.5f"), Some(Value::Float(1.5)));
        assert_eq!(default_arg(&int, "THOST_TERT_RESTART"), None);
    }
}
