//! Native-side representation of arguments and struct memory.

use spibind_core::PrimitiveKind;

/// A scalar in native representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Char(u8),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl Scalar {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Scalar::Bool(_) => PrimitiveKind::Bool,
            Scalar::Char(_) => PrimitiveKind::Char,
            Scalar::I8(_) => PrimitiveKind::I8,
            Scalar::I16(_) => PrimitiveKind::I16,
            Scalar::I32(_) => PrimitiveKind::I32,
            Scalar::I64(_) => PrimitiveKind::I64,
            Scalar::U8(_) => PrimitiveKind::U8,
            Scalar::U16(_) => PrimitiveKind::U16,
            Scalar::U32(_) => PrimitiveKind::U32,
            Scalar::U64(_) => PrimitiveKind::U64,
            Scalar::F32(_) => PrimitiveKind::F32,
            Scalar::F64(_) => PrimitiveKind::F64,
        }
    }

    /// The zero value of a kind.
    pub fn zero(kind: PrimitiveKind) -> Self {
        match kind {
            PrimitiveKind::Bool => Scalar::Bool(false),
            PrimitiveKind::Char => Scalar::Char(0),
            PrimitiveKind::I8 => Scalar::I8(0),
            PrimitiveKind::I16 => Scalar::I16(0),
            PrimitiveKind::I32 => Scalar::I32(0),
            PrimitiveKind::I64 => Scalar::I64(0),
            PrimitiveKind::U8 => Scalar::U8(0),
            PrimitiveKind::U16 => Scalar::U16(0),
            PrimitiveKind::U32 => Scalar::U32(0),
            PrimitiveKind::U64 => Scalar::U64(0),
            PrimitiveKind::F32 => Scalar::F32(0.0),
            PrimitiveKind::F64 => Scalar::F64(0.0),
        }
    }

    /// Write in native byte order; `out` must be exactly `kind().size()` bytes.
    pub fn write(&self, out: &mut [u8]) {
        match self {
            Scalar::Bool(b) => out[0] = u8::from(*b),
            Scalar::Char(c) | Scalar::U8(c) => out[0] = *c,
            Scalar::I8(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::I16(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::I32(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::I64(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::U16(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::U32(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::U64(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::F32(v) => out.copy_from_slice(&v.to_ne_bytes()),
            Scalar::F64(v) => out.copy_from_slice(&v.to_ne_bytes()),
        }
    }

    /// Read a scalar of `kind` from exactly `kind.size()` bytes.
    pub fn read(kind: PrimitiveKind, bytes: &[u8]) -> Self {
        fn arr<const N: usize>(bytes: &[u8]) -> [u8; N] {
            let mut a = [0u8; N];
            a.copy_from_slice(&bytes[..N]);
            a
        }
        match kind {
            PrimitiveKind::Bool => Scalar::Bool(bytes[0] != 0),
            PrimitiveKind::Char => Scalar::Char(bytes[0]),
            PrimitiveKind::U8 => Scalar::U8(bytes[0]),
            PrimitiveKind::I8 => Scalar::I8(i8::from_ne_bytes(arr(bytes))),
            PrimitiveKind::I16 => Scalar::I16(i16::from_ne_bytes(arr(bytes))),
            PrimitiveKind::I32 => Scalar::I32(i32::from_ne_bytes(arr(bytes))),
            PrimitiveKind::I64 => Scalar::I64(i64::from_ne_bytes(arr(bytes))),
            PrimitiveKind::U16 => Scalar::U16(u16::from_ne_bytes(arr(bytes))),
            PrimitiveKind::U32 => Scalar::U32(u32::from_ne_bytes(arr(bytes))),
            PrimitiveKind::U64 => Scalar::U64(u64::from_ne_bytes(arr(bytes))),
            PrimitiveKind::F32 => Scalar::F32(f32::from_ne_bytes(arr(bytes))),
            PrimitiveKind::F64 => Scalar::F64(f64::from_ne_bytes(arr(bytes))),
        }
    }
}

/// A struct instance in native memory layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeStruct {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl NativeStruct {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// A single argument or return value crossing the native boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeArg {
    /// No value (`void` return).
    Void,
    Scalar(Scalar),
    /// Text bytes without terminator (`char*` or decayed `char[N]`).
    Text(Vec<u8>),
    /// Pointer to a struct; the callee copies what it needs before returning.
    Struct(NativeStruct),
    /// Null pointer.
    Null,
}

impl NativeArg {
    /// Shape name used in error messages.
    pub fn describe(&self) -> String {
        match self {
            NativeArg::Void => "void".to_string(),
            NativeArg::Scalar(s) => format!("{}", s.kind()),
            NativeArg::Text(_) => "text".to_string(),
            NativeArg::Struct(s) => format!("struct {}", s.name),
            NativeArg::Null => "null pointer".to_string(),
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            NativeArg::Scalar(Scalar::I32(v)) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_bytes_round_trip() {
        let cases = [
            Scalar::Bool(true),
            Scalar::Char(b'1'),
            Scalar::I32(-42),
            Scalar::U64(u64::MAX),
            Scalar::F64(3.25),
        ];
        for s in cases {
            let mut buf = vec![0u8; s.kind().size()];
            s.write(&mut buf);
            assert_eq!(Scalar::read(s.kind(), &buf), s);
        }
    }

    #[test]
    fn zero_scalars() {
        assert_eq!(Scalar::zero(PrimitiveKind::F32), Scalar::F32(0.0));
        assert_eq!(Scalar::zero(PrimitiveKind::Char), Scalar::Char(0));
    }

    #[test]
    fn describe_args() {
        assert_eq!(NativeArg::Scalar(Scalar::I32(0)).describe(), "i32");
        assert_eq!(NativeArg::Null.describe(), "null pointer");
        assert_eq!(NativeArg::Scalar(Scalar::I32(-2)).as_i32(), Some(-2));
    }
}
