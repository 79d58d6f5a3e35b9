//! Transforms for [crate::TransformRef] fields.
//!
//! Each takes the packed bytes of the referenced node. The result is wrapped to the width of
//! the reference's field when assigned.

/// Sum of all bytes.
pub fn sum(data: &[u8]) -> i64 {
    data.iter().map(|byte| i64::from(*byte)).sum()
}

/// CRC32 (IEEE) of the bytes.
pub fn crc32(data: &[u8]) -> i64 {
    i64::from(crc32fast::hash(data))
}
