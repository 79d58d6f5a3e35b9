//! Variable-width raw byte fields.

use crate::{field::Field, types::Value, Error};
use bytes::{BufMut, Bytes};

/// A field holding raw bytes (a pre-built sub-message, padding, ...).
///
/// Its width is the length of its current content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Buffer {
    value: Bytes,
}

impl Buffer {
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn set(&mut self, value: impl Into<Bytes>) {
        self.value = value.into();
    }

    /// Assigns a dynamic [Value], rejecting anything but bytes.
    pub fn assign(&mut self, value: &Value) -> Result<(), Error> {
        match value {
            Value::Bytes(b) => {
                self.value = b.clone();
                Ok(())
            }
            other => Err(Error::TypeMismatch {
                expected: "bytes",
                found: other.kind(),
            }),
        }
    }
}

impl Field for Buffer {
    #[inline]
    fn byte_width(&self) -> usize {
        self.value.len()
    }

    #[inline]
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.value);
    }
}
