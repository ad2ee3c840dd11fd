//! Copy rules between native representation and scripting values.
//!
//! Provides strategy selection per [`TypeRef`] and a [`Marshaler`] that
//! applies the strategies in both directions using a shared layout table.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use spibind_core::{DeclarationModel, PrimitiveKind, TypeRef};

use crate::error::{MarshalError, Result};
use crate::layout::{LayoutTable, StructLayout};
use crate::native::{NativeArg, NativeStruct, Scalar};
use crate::value::{Record, Value};

/// Strategy for carrying one type across the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "of", rename_all = "snake_case")]
pub enum MarshalRule {
    /// Scalar copied by value with range validation.
    Direct(PrimitiveKind),
    /// `char[N]`: at most N bytes, NUL-padded, no terminator required.
    FixedText { max_len: usize },
    /// `char*`: NUL-terminated text.
    NulTerminated,
    /// Struct memory copied field by field in declaration order.
    StructLayout(String),
    /// Pointer to a wrapped native object (e.g. the Spi given to `RegisterSpi`).
    ObjectHandle(String),
    /// `void` return.
    Nothing,
}

/// Select the marshaling strategy for a type.
///
/// Returns `None` when the type has no rule; the generator turns that into
/// an unsupported-type failure.
pub fn select_rule(ty: &TypeRef) -> Option<MarshalRule> {
    let rule = match ty {
        TypeRef::Primitive { primitive } => MarshalRule::Direct(*primitive),
        TypeRef::FixedText { max_len } => MarshalRule::FixedText { max_len: *max_len },
        TypeRef::CString => MarshalRule::NulTerminated,
        TypeRef::StructRef { name } => MarshalRule::StructLayout(name.clone()),
        TypeRef::ClassRef { name } => MarshalRule::ObjectHandle(name.clone()),
        TypeRef::Void => MarshalRule::Nothing,
        TypeRef::Unsupported { .. } => return None,
    };
    Some(rule)
}

/// Applies copy rules for one declaration model.
///
/// Cheap to clone; the model and layouts are shared.
#[derive(Debug, Clone)]
pub struct Marshaler {
    model: Arc<DeclarationModel>,
    layouts: Arc<LayoutTable>,
}

impl Marshaler {
    pub fn new(model: Arc<DeclarationModel>) -> Result<Self> {
        let layouts = Arc::new(LayoutTable::build(&model)?);
        Ok(Self { model, layouts })
    }

    pub fn model(&self) -> &Arc<DeclarationModel> {
        &self.model
    }

    pub fn layouts(&self) -> &LayoutTable {
        &self.layouts
    }

    // ── native → scripting ─────────────────────────────────────────

    /// Convert a native argument or return value into a scripting value.
    pub fn to_script(&self, ty: &TypeRef, arg: &NativeArg, path: &str) -> Result<Value> {
        match (ty, arg) {
            (TypeRef::Void, _) => Ok(Value::Null),
            (TypeRef::Primitive { primitive }, NativeArg::Scalar(s)) if s.kind() == *primitive => {
                scalar_to_value(*s, path)
            }
            (TypeRef::FixedText { max_len }, NativeArg::Text(bytes)) => {
                Ok(text_value(read_text(&bytes[..bytes.len().min(*max_len)])))
            }
            (TypeRef::CString, NativeArg::Text(bytes)) => Ok(text_value(read_text(bytes))),
            (TypeRef::CString | TypeRef::StructRef { .. }, NativeArg::Null) => Ok(Value::Null),
            (TypeRef::StructRef { name }, NativeArg::Struct(native)) if native.name == *name => {
                Ok(Value::Record(self.decode_struct(native)?))
            }
            (TypeRef::ClassRef { .. } | TypeRef::Unsupported { .. }, _) => {
                Err(MarshalError::Unsupported {
                    ty: format!("{path}: {ty}"),
                })
            }
            (ty, arg) => Err(MarshalError::TypeMismatch {
                path: path.to_string(),
                expected: ty.to_string(),
                found: arg.describe(),
            }),
        }
    }

    /// Decode native struct memory into a record.
    pub fn decode_struct(&self, native: &NativeStruct) -> Result<Record> {
        let layout = self.layouts.require(&native.name)?;
        if native.bytes.len() != layout.size {
            return Err(MarshalError::BufferSize {
                name: native.name.clone(),
                expected: layout.size,
                actual: native.bytes.len(),
            });
        }
        self.decode_fields(layout, &native.bytes)
    }

    fn decode_fields(&self, layout: &StructLayout, bytes: &[u8]) -> Result<Record> {
        let mut fields = Vec::with_capacity(layout.fields.len());
        for field in &layout.fields {
            let slot = &bytes[field.offset..field.offset + field.size];
            let value = match &field.ty {
                TypeRef::Primitive { primitive } => {
                    let path = format!("{}.{}", layout.name, field.name);
                    scalar_to_value(Scalar::read(*primitive, slot), &path)?
                }
                TypeRef::FixedText { .. } => text_value(read_text(slot)),
                TypeRef::StructRef { name } => {
                    let nested = self.layouts.require(name)?;
                    Value::Record(self.decode_fields(nested, slot)?)
                }
                other => {
                    return Err(MarshalError::Unsupported {
                        ty: format!("{}.{}: {other}", layout.name, field.name),
                    })
                }
            };
            fields.push((field.name.clone(), value));
        }
        Ok(Record::new(layout.name.clone(), fields))
    }

    // ── scripting → native ─────────────────────────────────────────

    /// Convert a scripting value into a native argument.
    pub fn to_native(&self, ty: &TypeRef, value: &Value, path: &str) -> Result<NativeArg> {
        match ty {
            TypeRef::Void => Ok(NativeArg::Void),
            TypeRef::Primitive { primitive } => {
                Ok(NativeArg::Scalar(value_to_scalar(*primitive, value, path)?))
            }
            TypeRef::FixedText { max_len } => {
                let bytes = expect_text(value, path, &ty.to_string())?;
                check_width(bytes, *max_len, path)?;
                Ok(NativeArg::Text(bytes.to_vec()))
            }
            TypeRef::CString => match value {
                Value::Null => Ok(NativeArg::Null),
                other => {
                    let bytes = expect_text(other, path, "char*")?;
                    if bytes.contains(&0) {
                        return Err(MarshalError::TypeMismatch {
                            path: path.to_string(),
                            expected: "text without NUL".to_string(),
                            found: "text with embedded NUL".to_string(),
                        });
                    }
                    Ok(NativeArg::Text(bytes.to_vec()))
                }
            },
            TypeRef::StructRef { name } => match value {
                Value::Null => Ok(NativeArg::Null),
                Value::Record(record) if record.type_name() == name.as_str() => {
                    Ok(NativeArg::Struct(self.encode_struct(record)?))
                }
                other => Err(MarshalError::TypeMismatch {
                    path: path.to_string(),
                    expected: format!("record {name}"),
                    found: other.type_name(),
                }),
            },
            TypeRef::ClassRef { .. } | TypeRef::Unsupported { .. } => {
                Err(MarshalError::Unsupported {
                    ty: format!("{path}: {ty}"),
                })
            }
        }
    }

    /// Encode a record into fresh native struct memory.
    pub fn encode_struct(&self, record: &Record) -> Result<NativeStruct> {
        let layout = self.layouts.require(record.type_name())?;
        let mut bytes = vec![0u8; layout.size];
        self.encode_fields(layout, record, &mut bytes, record.type_name())?;
        Ok(NativeStruct::new(layout.name.clone(), bytes))
    }

    /// Overwrite existing native struct memory with a record.
    ///
    /// The whole record is validated into scratch space first; on error the
    /// target is left untouched.
    pub fn encode_into(&self, record: &Record, target: &mut NativeStruct) -> Result<()> {
        if record.type_name() != target.name {
            return Err(MarshalError::TypeMismatch {
                path: target.name.clone(),
                expected: format!("record {}", target.name),
                found: format!("record {}", record.type_name()),
            });
        }
        let scratch = self.encode_struct(record)?;
        if scratch.bytes.len() != target.bytes.len() {
            return Err(MarshalError::BufferSize {
                name: target.name.clone(),
                expected: scratch.bytes.len(),
                actual: target.bytes.len(),
            });
        }
        target.bytes.copy_from_slice(&scratch.bytes);
        Ok(())
    }

    fn encode_fields(
        &self,
        layout: &StructLayout,
        record: &Record,
        out: &mut [u8],
        path: &str,
    ) -> Result<()> {
        for (name, _) in record.fields() {
            if layout.field(name).is_none() {
                return Err(MarshalError::UnknownField {
                    record: layout.name.clone(),
                    field: name.to_string(),
                });
            }
        }

        for field in &layout.fields {
            let value = record.get(&field.name).ok_or_else(|| MarshalError::MissingField {
                record: layout.name.clone(),
                field: field.name.clone(),
            })?;
            let field_path = format!("{path}.{}", field.name);
            let slot = &mut out[field.offset..field.offset + field.size];
            match &field.ty {
                TypeRef::Primitive { primitive } => {
                    value_to_scalar(*primitive, value, &field_path)?.write(slot);
                }
                TypeRef::FixedText { max_len } => {
                    let bytes = expect_text(value, &field_path, &field.ty.to_string())?;
                    check_width(bytes, *max_len, &field_path)?;
                    slot[..bytes.len()].copy_from_slice(bytes);
                    slot[bytes.len()..].fill(0);
                }
                TypeRef::StructRef { name } => {
                    let nested = self.layouts.require(name)?;
                    match value {
                        Value::Record(inner) if inner.type_name() == name.as_str() => {
                            self.encode_fields(nested, inner, slot, &field_path)?;
                        }
                        other => {
                            return Err(MarshalError::TypeMismatch {
                                path: field_path,
                                expected: format!("record {name}"),
                                found: other.type_name(),
                            })
                        }
                    }
                }
                other => {
                    return Err(MarshalError::Unsupported {
                        ty: format!("{field_path}: {other}"),
                    })
                }
            }
        }
        Ok(())
    }

    // ── defaults ───────────────────────────────────────────────────

    /// Zero value of a type as seen by scripting code.
    pub fn default_value(&self, ty: &TypeRef) -> Value {
        match ty {
            TypeRef::Primitive { primitive } => {
                scalar_to_value(Scalar::zero(*primitive), "").unwrap_or(Value::Int(0))
            }
            TypeRef::FixedText { .. } | TypeRef::CString => Value::Text(String::new()),
            TypeRef::StructRef { name } => {
                self.new_record(name).map(Value::Record).unwrap_or(Value::Null)
            }
            TypeRef::Void | TypeRef::ClassRef { .. } | TypeRef::Unsupported { .. } => Value::Null,
        }
    }

    /// Zero value of a type handed back to a native caller.
    pub fn default_native(&self, ty: &TypeRef) -> NativeArg {
        match ty {
            TypeRef::Void => NativeArg::Void,
            TypeRef::Primitive { primitive } => NativeArg::Scalar(Scalar::zero(*primitive)),
            TypeRef::FixedText { .. } => NativeArg::Text(Vec::new()),
            TypeRef::CString
            | TypeRef::StructRef { .. }
            | TypeRef::ClassRef { .. }
            | TypeRef::Unsupported { .. } => NativeArg::Null,
        }
    }

    /// A zero-filled record for a declared struct.
    pub fn new_record(&self, name: &str) -> Result<Record> {
        let layout = self.layouts.require(name)?;
        self.decode_fields(layout, &vec![0u8; layout.size])
    }
}

fn text_value(bytes: &[u8]) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(s) => Value::Text(s.to_string()),
        Err(_) => Value::Bytes(bytes.to_vec()),
    }
}

/// Bytes up to the first NUL.
fn read_text(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

fn expect_text<'v>(value: &'v Value, path: &str, expected: &str) -> Result<&'v [u8]> {
    value.text_bytes().ok_or_else(|| MarshalError::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        found: value.type_name(),
    })
}

fn check_width(bytes: &[u8], max_len: usize, path: &str) -> Result<()> {
    if bytes.len() > max_len {
        return Err(MarshalError::ValueTooLong {
            path: path.to_string(),
            max_len,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn scalar_to_value(scalar: Scalar, path: &str) -> Result<Value> {
    let value = match scalar {
        Scalar::Bool(b) => Value::Bool(b),
        Scalar::Char(0) => Value::Text(String::new()),
        Scalar::Char(c) if c.is_ascii() => Value::Text(char::from(c).to_string()),
        Scalar::Char(c) | Scalar::U8(c) => Value::Int(i64::from(c)),
        Scalar::I8(v) => Value::Int(i64::from(v)),
        Scalar::I16(v) => Value::Int(i64::from(v)),
        Scalar::I32(v) => Value::Int(i64::from(v)),
        Scalar::I64(v) => Value::Int(v),
        Scalar::U16(v) => Value::Int(i64::from(v)),
        Scalar::U32(v) => Value::Int(i64::from(v)),
        Scalar::U64(v) => Value::Int(i64::try_from(v).map_err(|_| MarshalError::Range {
            path: path.to_string(),
            value: v.to_string(),
            kind: PrimitiveKind::U64,
        })?),
        Scalar::F32(v) => Value::Float(f64::from(v)),
        Scalar::F64(v) => Value::Float(v),
    };
    Ok(value)
}

fn value_to_scalar(kind: PrimitiveKind, value: &Value, path: &str) -> Result<Scalar> {
    let mismatch = || MarshalError::TypeMismatch {
        path: path.to_string(),
        expected: kind.to_string(),
        found: value.type_name(),
    };
    let out_of_range = |shown: String| MarshalError::Range {
        path: path.to_string(),
        value: shown,
        kind,
    };

    // A char takes either a one-byte text or its integer code.
    if let (PrimitiveKind::Char, Some(bytes)) = (kind, value.text_bytes()) {
        return match bytes {
            [] => Ok(Scalar::Char(0)),
            [b] => Ok(Scalar::Char(*b)),
            _ => Err(MarshalError::ValueTooLong {
                path: path.to_string(),
                max_len: 1,
                actual: bytes.len(),
            }),
        };
    }

    match kind {
        PrimitiveKind::Bool => value.as_bool().map(Scalar::Bool).ok_or_else(mismatch),
        PrimitiveKind::F32 => {
            let x = value.as_f64().ok_or_else(mismatch)?;
            if x.is_finite() && x.abs() > f64::from(f32::MAX) {
                return Err(out_of_range(x.to_string()));
            }
            Ok(Scalar::F32(x as f32))
        }
        PrimitiveKind::F64 => value.as_f64().map(Scalar::F64).ok_or_else(mismatch),
        _ => {
            let v = value.as_i64().ok_or_else(mismatch)?;
            let (lo, hi) = kind.int_range().ok_or_else(mismatch)?;
            let wide = i128::from(v);
            if wide < lo || wide > hi {
                return Err(out_of_range(v.to_string()));
            }
            // In range, so the narrowing casts below are exact.
            let scalar = match kind {
                PrimitiveKind::Char => Scalar::Char(v as u8),
                PrimitiveKind::I8 => Scalar::I8(v as i8),
                PrimitiveKind::I16 => Scalar::I16(v as i16),
                PrimitiveKind::I32 => Scalar::I32(v as i32),
                PrimitiveKind::I64 => Scalar::I64(v),
                PrimitiveKind::U8 => Scalar::U8(v as u8),
                PrimitiveKind::U16 => Scalar::U16(v as u16),
                PrimitiveKind::U32 => Scalar::U32(v as u32),
                PrimitiveKind::U64 => Scalar::U64(v as u64),
                PrimitiveKind::Bool | PrimitiveKind::F32 | PrimitiveKind::F64 => {
                    return Err(mismatch())
                }
            };
            Ok(scalar)
        }
    }
}
