//! Build fixed-layout binary records from a tree of typed fields.
//!
//! # Overview
//!
//! A [Layout] holds a tree of named nodes that packs into a single byte sequence. Hand-rolled
//! binary protocols and file formats often carry fields whose value depends on another part of
//! the record (a length prefix, a checksum trailer, a header length covering a body defined
//! later). Rather than computing those values by hand, describe the record once and let
//! [Layout::pack] derive them from the current content of the tree.
//!
//! # Nodes
//!
//! - [Int]: an 8, 16 or 32-bit integer (signed or unsigned, little or big-endian).
//! - [Buffer]: raw bytes of any length.
//! - [Container]: named children packed back to back in the order they were first added.
//! - [Length]: a container prefixed by an [Int] holding the length of its payload.
//! - [SizeRef]: an [Int] holding the packed length of the node at a path elsewhere in the tree.
//! - [TransformRef]: an [Int] holding a function (e.g. a [checksum]) of the packed bytes of the
//!   node at a path elsewhere in the tree.
//!
//! Paths are dotted (`"header.len"`). Nodes are inserted with [Layout::add], and references
//! resolve their path from the root of the tree every time they are packed.
//!
//! # Format
//!
//! There is no envelope: the output is exactly the concatenation of every leaf, depth-first, in
//! insertion order. Re-adding an existing name replaces its content without moving it.
//!
//! # Example
//!
//! ```
//! use commonware_layout::{checksum, Container, Int, Layout, SizeRef, TransformRef};
//!
//! let mut layout = Layout::new();
//! layout.add("magic", Int::u32_be(0xCAFEBABE))?;
//! layout.add("header.len", SizeRef::new(Int::u16_be(0), "body"))?;
//! layout.add("header.sum", TransformRef::new(Int::u8(0), "body", checksum::sum))?;
//! layout.add(
//!     "body",
//!     Container::new()
//!         .with("kind", Int::u8(1))
//!         .with("id", Int::u16(0x0102)),
//! )?;
//!
//! let packed = layout.pack()?;
//! assert_eq!(
//!     packed.as_ref(),
//!     &[0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x03, 0x04, 0x01, 0x02, 0x01]
//! );
//!
//! // Derived fields follow the tree
//! let id = layout.node("body.id")?;
//! layout.set(id, 0x0302)?;
//! assert_eq!(layout.value(layout.node("header.sum")?)?, 6);
//! # Ok::<(), commonware_layout::Error>(())
//! ```

pub mod checksum;
pub mod error;
pub mod field;
mod layout;
pub mod node;
pub mod render;
mod resolve;
pub mod types;

// Re-export main types and traits
pub use error::Error;
pub use field::Field;
pub use layout::Layout;
pub use node::{Container, Length, Node, NodeId, SizeRef, Transform, TransformRef};
pub use types::{
    buffer::Buffer,
    int::{ByteOrder, Int, Width},
    Value,
};
