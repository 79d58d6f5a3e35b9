//! Error types for layout operations

use crate::NodeId;
use thiserror::Error;

/// Error type for building and packing a [crate::Layout]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("range violation: expected {expected} bytes, found {found}")]
    RangeViolation { expected: usize, found: usize },
    #[error("invalid byte order: {0}")]
    InvalidByteOrder(String),
    #[error("unable to resolve {path}: no node named {segment}")]
    Resolution { path: String, segment: String },
    #[error("invalid path: {0:?}")]
    InvalidPath(String),
    #[error("not a container: {0}")]
    NotAContainer(String),
    #[error("circular reference to {0}")]
    CircularReference(String),
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
}
