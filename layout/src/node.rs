//! Detached nodes that can be attached to a [crate::Layout].
//!
//! A [Node] is plain owned data: it is moved into the layout by [crate::Layout::add], which
//! allocates a slot for it (and for every child of a [Container] or [Length]) and links the new
//! slot to its parent. Because `add` consumes the node, the same node can never hang under two
//! parents.

use crate::{Buffer, Int};
use core::fmt;
use std::sync::Arc;

/// Handle to a node attached to a [crate::Layout].
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct NodeId(u32);

impl NodeId {
    /// The root container of every layout.
    pub const ROOT: NodeId = NodeId(0);

    #[inline]
    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("layout exceeds u32::MAX nodes"))
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Function deriving a field value from the packed bytes of a referenced node.
pub type Transform = Arc<dyn Fn(&[u8]) -> i64 + Send + Sync>;

/// A node that has not been attached yet.
#[derive(Clone, Debug)]
pub enum Node {
    Int(Int),
    Buffer(Buffer),
    Container(Container),
    Length(Length),
    SizeRef(SizeRef),
    TransformRef(TransformRef),
}

impl Node {
    /// Name of the variant, used in logs.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Node::Int(_) => "int",
            Node::Buffer(_) => "buffer",
            Node::Container(_) => "container",
            Node::Length(_) => "length",
            Node::SizeRef(_) => "size reference",
            Node::TransformRef(_) => "transform reference",
        }
    }
}

macro_rules! impl_into_node {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Node {
                fn from(value: $variant) -> Self {
                    Node::$variant(value)
                }
            }
        )*
    };
}

impl_into_node!(Int, Buffer, Container, Length, SizeRef, TransformRef);

/// An ordered group of named children, packed back to back in insertion order.
///
/// Children can be supplied before the container is attached. Each name is inserted with the
/// same rules as [crate::Layout::add] once the container is attached.
#[derive(Clone, Debug, Default)]
pub struct Container {
    children: Vec<(String, Node)>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a child, replacing (in place) any child previously given the same name.
    pub fn with(mut self, name: impl Into<String>, node: impl Into<Node>) -> Self {
        let name = name.into();
        let node = node.into();
        match self.children.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = node,
            None => self.children.push((name, node)),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) fn children(&self) -> &[(String, Node)] {
        &self.children
    }

    pub(crate) fn into_children(self) -> Vec<(String, Node)> {
        self.children
    }
}

/// A container prefixed by its own packed length.
///
/// The prefix is computed from the payload every time the node is packed or read.
#[derive(Clone, Debug)]
pub struct Length {
    pub(crate) field: Int,
    pub(crate) inner: Container,
}

impl Length {
    /// Returns an empty length-prefixed container whose size is written to `field`.
    pub fn new(field: Int) -> Self {
        Self::with_container(field, Container::new())
    }

    pub fn with_container(field: Int, inner: Container) -> Self {
        Self { field, inner }
    }

    /// Adds a child to the payload.
    pub fn with(mut self, name: impl Into<String>, node: impl Into<Node>) -> Self {
        self.inner = self.inner.with(name, node);
        self
    }
}

/// A field holding the packed length of the node at `target`.
///
/// `target` is a dotted path from the root of the tree the reference is attached to. Only the
/// target's width is measured: references nested in the target count as their field width and
/// are not resolved, so the size is available even while packing the target would fail.
#[derive(Clone, Debug)]
pub struct SizeRef {
    pub(crate) field: Int,
    pub(crate) target: String,
}

impl SizeRef {
    pub fn new(field: Int, target: impl Into<String>) -> Self {
        Self {
            field,
            target: target.into(),
        }
    }
}

/// A field holding `transform(bytes)`, where `bytes` is the packed node at `target`.
#[derive(Clone)]
pub struct TransformRef {
    pub(crate) field: Int,
    pub(crate) target: String,
    pub(crate) transform: Transform,
}

impl TransformRef {
    pub fn new(
        field: Int,
        target: impl Into<String>,
        transform: impl Fn(&[u8]) -> i64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            field,
            target: target.into(),
            transform: Arc::new(transform),
        }
    }
}

impl fmt::Debug for TransformRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRef")
            .field("field", &self.field)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
