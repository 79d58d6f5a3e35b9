//! Scalar field types and the dynamic values assigned to them.

use bytes::Bytes;

pub mod buffer;
pub mod int;

/// A value assigned to a scalar field by path or handle.
///
/// Fields check the variant they receive: integers wrap into [int::Int] fields, byte strings
/// must match the width of an [int::Int] exactly, and only byte strings are accepted by a
/// [buffer::Buffer].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bytes(Bytes),
}

impl Value {
    /// Name of the variant, used in error messages.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Bytes(_) => "bytes",
        }
    }

    /// Returns the integer held by this value, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bytes(_) => None,
        }
    }

    /// Returns the bytes held by this value, if any.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Int(_) => None,
            Value::Bytes(b) => Some(b),
        }
    }
}

macro_rules! impl_from_int {
    ($($type:ty),*) => {
        $(
            impl From<$type> for Value {
                fn from(value: $type) -> Self {
                    Value::Int(value.into())
                }
            }
        )*
    };
}

impl_from_int!(u8, u16, u32, i8, i16, i32, i64);

// Wider than any field, so a wrapping cast keeps the low bits fields store anyway.
macro_rules! impl_from_wide_int {
    ($($type:ty),*) => {
        $(
            impl From<$type> for Value {
                fn from(value: $type) -> Self {
                    Value::Int(value as i64)
                }
            }
        )*
    };
}

impl_from_wide_int!(u64, usize, isize);

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Value::Bytes(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value.into())
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(value))
    }
}

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(value: &[u8; N]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(value))
    }
}
