//! Scripting-side value representation.

use std::fmt;

use serde::{Deserialize, Serialize};
use spibind_core::ConstValue;

use crate::error::{MarshalError, Result};

/// A dynamically-typed value as seen by scripting code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Text bytes that are not valid UTF-8 (e.g. GBK error messages).
    Bytes(Vec<u8>),
    Record(Record),
}

impl Value {
    /// Short shape name used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Text(_) => "text".to_string(),
            Value::Bytes(_) => "bytes".to_string(),
            Value::Record(r) => format!("record {}", r.type_name()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Raw text bytes of a `Text` or `Bytes` value.
    pub fn text_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Text(s) => Some(s.as_bytes()),
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Value::Record(r) => write!(f, "{r}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl From<&ConstValue> for Value {
    fn from(c: &ConstValue) -> Self {
        match c {
            ConstValue::Bool(b) => Value::Bool(*b),
            ConstValue::Int(i) => Value::Int(*i),
            ConstValue::Float(x) => Value::Float(*x),
            ConstValue::Text(s) => Value::Text(s.clone()),
        }
    }
}

/// A field-addressable record mirroring a native struct.
///
/// Field order and names match the struct declaration exactly; records
/// handed to scripting code are created zero-filled or decoded from native
/// memory, so `set` can only replace existing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    type_name: String,
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Build a record from ordered fields.
    pub fn new(type_name: impl Into<String>, fields: Vec<(String, Value)>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.iter().find(|(name, _)| name == field).map(|(_, v)| v)
    }

    /// Replace the value of an existing field.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some((_, slot)) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(MarshalError::UnknownField {
                record: self.type_name.clone(),
                field: field.to_string(),
            }),
        }
    }

    /// Builder-style `set` for tests and scripts.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(field, value)?;
        Ok(self)
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.type_name)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, " {name}: {value}")?;
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login() -> Record {
        Record::new(
            "CThostFtdcReqUserLoginField",
            vec![
                ("BrokerID".to_string(), Value::Text(String::new())),
                ("UserID".to_string(), Value::Text(String::new())),
            ],
        )
    }

    #[test]
    fn set_existing_field() {
        let mut r = login();
        r.set("BrokerID", "9999").unwrap();
        assert_eq!(r.get("BrokerID"), Some(&Value::Text("9999".into())));
    }

    #[test]
    fn constants_become_values() {
        assert_eq!(Value::from(&ConstValue::Text("3".into())), Value::Text("3".into()));
        assert_eq!(Value::from(&ConstValue::Int(-1)), Value::Int(-1));
        assert_eq!(Value::from(&ConstValue::Bool(true)).as_bool(), Some(true));
        assert_eq!(Value::from(&ConstValue::Float(0.5)).as_f64(), Some(0.5));
    }

    #[test]
    fn set_unknown_field_fails() {
        let mut r = login();
        let err = r.set("Password", "secret").unwrap_err();
        assert!(matches!(err, MarshalError::UnknownField { .. }));
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn field_order_preserved() {
        let r = login().with("UserID", "u1").unwrap();
        let names: Vec<_> = r.fields().map(|(n, _)| n).collect();
        assert_eq!(names, ["BrokerID", "UserID"]);
    }

    #[test]
    fn display_value() {
        assert_eq!(Value::from(3).to_string(), "3");
        assert_eq!(Value::from("a").to_string(), "\"a\"");
        assert_eq!(
            login().to_string(),
            "CThostFtdcReqUserLoginField { BrokerID: \"\", UserID: \"\" }"
        );
    }
}
