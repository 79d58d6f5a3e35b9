//! Core trait for leaf fields

use bytes::{BufMut, Bytes, BytesMut};

/// Trait for leaves that render themselves to bytes without consulting the rest of the tree.
pub trait Field {
    /// The number of bytes written by [Field::write].
    ///
    /// This method MUST return the exact number of bytes that will be written by `write()`.
    fn byte_width(&self) -> usize;

    /// Writes this field to a buffer.
    ///
    /// Implementations should panic if the buffer doesn't have enough capacity.
    fn write(&self, buf: &mut impl BufMut);

    /// Packs this field into a standalone buffer.
    ///
    /// Panics if the `write` implementation does not write the expected number of bytes.
    fn pack(&self) -> Bytes {
        let len = self.byte_width();
        let mut buffer = BytesMut::with_capacity(len);
        self.write(&mut buffer);
        assert_eq!(buffer.len(), len, "write() did not write expected bytes");
        buffer.freeze()
    }
}
