//! Fixed-width integer fields.
//!
//! # Wrapping
//!
//! An [Int] always holds a value representable in its width. Assigning an integer stores
//! `value mod 2^width` (the two's-complement truncation), so `0x105` in a byte field packs as
//! `0x05` and `-1` packs as all ones regardless of signedness. Signedness only changes how
//! [Int::value] interprets the stored bit pattern.
//!
//! # Byte order
//!
//! Fields wider than a byte pack in the configured [ByteOrder] (little-endian unless
//! requested otherwise). Raw bytes assigned to a field are read as a little-endian pattern,
//! so a little-endian field packs back exactly the bytes it was given.

use crate::{field::Field, types::Value, Error};
use bytes::BufMut;
use paste::paste;
use std::str::FromStr;

/// Order in which the bytes of a multi-byte field are packed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Numeric tags: `1` is little-endian, `2` is big-endian.
impl TryFrom<u8> for ByteOrder {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self, Error> {
        match tag {
            1 => Ok(ByteOrder::Little),
            2 => Ok(ByteOrder::Big),
            other => Err(Error::InvalidByteOrder(other.to_string())),
        }
    }
}

impl FromStr for ByteOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "little" | "le" => Ok(ByteOrder::Little),
            "big" | "be" => Ok(ByteOrder::Big),
            _ => Err(Error::InvalidByteOrder(s.to_string())),
        }
    }
}

/// Supported field widths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Width {
    W8,
    W16,
    W32,
}

impl Width {
    /// Number of bits in the field.
    pub const fn bits(self) -> u32 {
        match self {
            Width::W8 => 8,
            Width::W16 => 16,
            Width::W32 => 32,
        }
    }

    /// Number of bytes in the field.
    pub const fn bytes(self) -> usize {
        (self.bits() / 8) as usize
    }

    /// Largest unsigned bit pattern the field can hold.
    pub const fn max(self) -> u64 {
        (1u64 << self.bits()) - 1
    }
}

/// A fixed-width integer field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Int {
    width: Width,
    signed: bool,
    order: ByteOrder,

    // The unsigned bit pattern of the value, always <= `width.max()`.
    bits: u32,
}

macro_rules! impl_constructor {
    ($name:ident, $width:expr, $signed:expr) => {
        #[doc = concat!("Returns a little-endian `", stringify!($name), "` field holding `value` (wrapped to width).")]
        pub fn $name(value: i64) -> Self {
            let mut field = Self::new($width, $signed);
            field.set(value);
            field
        }
    };
    ($name:ident, $width:expr, $signed:expr, big) => {
        impl_constructor!($name, $width, $signed);

        paste! {
            #[doc = concat!("Returns a big-endian `", stringify!($name), "` field holding `value` (wrapped to width).")]
            pub fn [<$name _be>](value: i64) -> Self {
                Self::$name(value).big_endian()
            }
        }
    };
}

impl Int {
    /// Returns a zeroed little-endian field.
    pub fn new(width: Width, signed: bool) -> Self {
        Self {
            width,
            signed,
            order: ByteOrder::Little,
            bits: 0,
        }
    }

    /// Returns a little-endian field decoded from raw bytes.
    ///
    /// Fails with [Error::RangeViolation] unless `bytes` is exactly as wide as the field.
    pub fn from_bytes(width: Width, signed: bool, bytes: &[u8]) -> Result<Self, Error> {
        let mut field = Self::new(width, signed);
        field.set_bytes(bytes)?;
        Ok(field)
    }

    impl_constructor!(u8, Width::W8, false);
    impl_constructor!(i8, Width::W8, true);
    impl_constructor!(u16, Width::W16, false, big);
    impl_constructor!(i16, Width::W16, true, big);
    impl_constructor!(u32, Width::W32, false, big);
    impl_constructor!(i32, Width::W32, true, big);

    /// Sets the byte order used when packing.
    ///
    /// Byte order has no effect on single-byte fields.
    pub fn with_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    /// Shorthand for `with_order(ByteOrder::Big)`.
    pub fn big_endian(self) -> Self {
        self.with_order(ByteOrder::Big)
    }

    pub fn width(&self) -> Width {
        self.width
    }

    pub fn signed(&self) -> bool {
        self.signed
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Returns the stored unsigned bit pattern.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Returns the value, sign-extended for signed fields.
    pub fn value(&self) -> i64 {
        if !self.signed {
            return self.bits as i64;
        }
        match self.width {
            Width::W8 => self.bits as u8 as i8 as i64,
            Width::W16 => self.bits as u16 as i16 as i64,
            Width::W32 => self.bits as i32 as i64,
        }
    }

    /// Stores `value mod 2^width`.
    pub fn set(&mut self, value: i64) {
        self.bits = (value as u64 & self.width.max()) as u32;
    }

    /// Stores a raw little-endian bit pattern.
    ///
    /// Fails with [Error::RangeViolation] unless `bytes` is exactly as wide as the field.
    pub fn set_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let expected = self.width.bytes();
        if bytes.len() != expected {
            return Err(Error::RangeViolation {
                expected,
                found: bytes.len(),
            });
        }
        self.bits = bytes
            .iter()
            .rev()
            .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte));
        Ok(())
    }

    /// Assigns a dynamic [Value].
    pub fn assign(&mut self, value: &Value) -> Result<(), Error> {
        match value {
            Value::Int(v) => {
                self.set(*v);
                Ok(())
            }
            Value::Bytes(b) => self.set_bytes(b),
        }
    }

    /// Human-readable kind of the field, e.g. `"Unsigned Short"`.
    pub fn describe(&self) -> &'static str {
        match (self.signed, self.width) {
            (false, Width::W8) => "Unsigned Byte",
            (true, Width::W8) => "Signed Byte",
            (false, Width::W16) => "Unsigned Short",
            (true, Width::W16) => "Signed Short",
            (false, Width::W32) => "Unsigned Long",
            (true, Width::W32) => "Signed Long",
        }
    }
}

impl Field for Int {
    #[inline]
    fn byte_width(&self) -> usize {
        self.width.bytes()
    }

    // The stored pattern is already the two's-complement encoding, so signedness does not
    // change the packed bytes.
    #[inline]
    fn write(&self, buf: &mut impl BufMut) {
        match (self.width, self.order) {
            (Width::W8, _) => buf.put_u8(self.bits as u8),
            (Width::W16, ByteOrder::Little) => buf.put_u16_le(self.bits as u16),
            (Width::W16, ByteOrder::Big) => buf.put_u16(self.bits as u16),
            (Width::W32, ByteOrder::Little) => buf.put_u32_le(self.bits),
            (Width::W32, ByteOrder::Big) => buf.put_u32(self.bits),
        }
    }
}
