//! The arena owning one tree of nodes.
//!
//! Every attached node lives in a slot of a [Layout] and is addressed by a [NodeId]. A slot
//! records its parent so references can walk up to the root, but ownership only flows
//! downward: containers list their children, and packing only ever descends.

use crate::{
    field::Field,
    node::{Container, Length, Node, NodeId, Transform},
    resolve,
    types::Value,
    Buffer, Error, Int,
};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Children of a container, in insertion order.
#[derive(Default)]
pub(crate) struct Children {
    pub(crate) order: Vec<NodeId>,
    index: HashMap<String, NodeId>,
}

impl Children {
    pub(crate) fn get(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }
}

pub(crate) enum Kind {
    Int(Int),
    Buffer(Buffer),
    Container(Children),
    Length {
        field: Int,
        inner: NodeId,
    },
    SizeRef {
        field: Int,
        target: String,
    },
    TransformRef {
        field: Int,
        target: String,
        transform: Transform,
    },
}

impl Kind {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Kind::Int(_) => "int",
            Kind::Buffer(_) => "buffer",
            Kind::Container(_) => "container",
            Kind::Length { .. } => "length",
            Kind::SizeRef { .. } => "size reference",
            Kind::TransformRef { .. } => "transform reference",
        }
    }
}

pub(crate) struct Slot {
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: Kind,
}

/// A tree of fields, containers and references that packs into a single byte sequence.
///
/// Replacing a node frees the slots of the subtree it held: handles into that subtree return
/// [Error::UnknownNode] and are later reused for new nodes.
///
/// # Example
///
/// ```
/// use commonware_layout::{Int, Layout, Length};
///
/// let mut layout = Layout::new();
/// layout.add("block", Length::new(Int::u16(0)))?;
/// layout.add("block.data", Int::u32(0xAABBCCDD))?;
/// layout.add("block.data2", Int::u8(0x0A))?;
///
/// let packed = layout.pack()?;
/// assert_eq!(packed.as_ref(), &[0x05, 0x00, 0xDD, 0xCC, 0xBB, 0xAA, 0x0A]);
/// # Ok::<(), commonware_layout::Error>(())
/// ```
pub struct Layout {
    pub(crate) slots: Vec<Option<Slot>>,

    // Released slots, reused by `alloc`.
    free: Vec<NodeId>,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new()
    }
}

impl Layout {
    /// Return a new layout holding an empty, unnamed root container.
    pub fn new() -> Self {
        Self {
            slots: vec![Some(Slot {
                name: None,
                parent: None,
                kind: Kind::Container(Children::default()),
            })],
            free: Vec::new(),
        }
    }

    /// Return a new layout whose root container is displayed as `name`.
    pub fn named(name: impl Into<String>) -> Self {
        let mut layout = Self::new();
        if let Some(root) = &mut layout.slots[NodeId::ROOT.index()] {
            root.name = Some(name.into());
        }
        layout
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Insert `node` at `path`, relative to the root.
    ///
    /// See [Layout::add_at].
    pub fn add(&mut self, path: &str, node: impl Into<Node>) -> Result<NodeId, Error> {
        self.add_at(NodeId::ROOT, path, node)
    }

    /// Chaining form of [Layout::add].
    pub fn with(mut self, path: &str, node: impl Into<Node>) -> Result<Self, Error> {
        self.add(path, node)?;
        Ok(self)
    }

    /// Insert `node` at `path`, relative to the container `parent`, and return its handle.
    ///
    /// Every segment but the last names a container to descend into (a [Length] descends into
    /// its payload). Missing intermediate containers are created. The last segment names the
    /// node itself: a new name is appended after the existing children, while an existing name
    /// keeps its position and has its content replaced (the subtree previously stored there is
    /// released).
    ///
    /// The layout is left unchanged if an error is returned.
    pub fn add_at(
        &mut self,
        parent: NodeId,
        path: &str,
        node: impl Into<Node>,
    ) -> Result<NodeId, Error> {
        resolve::validate(path)?;
        let node = node.into();
        check(&node)?;
        self.insert(parent, path, node)
    }

    /// Insert a node that already passed [check].
    ///
    /// Intermediate containers are only created below the last existing segment, so every
    /// failure happens before the first mutation.
    fn insert(&mut self, parent: NodeId, path: &str, node: Node) -> Result<NodeId, Error> {
        let container = self.container_of(parent)?;
        match path.split_once('.') {
            None => self.place(container, path, node),
            Some((head, rest)) => {
                let existing = self.members(container)?.get(head);
                let child = match existing {
                    Some(child) => child,
                    None => {
                        debug!(path, segment = head, "creating intermediate container");
                        self.place(container, head, Node::Container(Container::new()))?
                    }
                };
                self.insert(child, rest, node)
            }
        }
    }

    /// Returns the parent of `id`, or `None` for the root.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, Error> {
        Ok(self.slot(id)?.parent)
    }

    /// Returns the name `id` was inserted under.
    pub fn name(&self, id: NodeId) -> Result<Option<&str>, Error> {
        Ok(self.slot(id)?.name.as_deref())
    }

    /// Returns the children of a container (or of a [Length] payload) in packing order.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId], Error> {
        let container = self.container_of(id)?;
        Ok(&self.members(container)?.order)
    }

    /// Returns the current value of a node.
    ///
    /// Length prefixes and references are recomputed on every call.
    pub fn get(&self, id: NodeId) -> Result<Value, Error> {
        match &self.slot(id)?.kind {
            Kind::Int(field) => Ok(Value::Int(field.value())),
            Kind::Buffer(buffer) => Ok(Value::Bytes(buffer.value().clone())),
            Kind::Container(_) => Err(Error::TypeMismatch {
                expected: "field",
                found: "container",
            }),
            _ => Ok(Value::Int(self.computed(id, &mut Vec::new())?.value())),
        }
    }

    /// Returns the numeric value of an integer field, length prefix or reference.
    pub fn value(&self, id: NodeId) -> Result<i64, Error> {
        match self.get(id)? {
            Value::Int(value) => Ok(value),
            other => Err(Error::TypeMismatch {
                expected: "integer",
                found: other.kind(),
            }),
        }
    }

    /// Assigns a new value to an [Int] or [Buffer] field.
    ///
    /// Computed fields (length prefixes and references) cannot be assigned.
    pub fn set(&mut self, id: NodeId, value: impl Into<Value>) -> Result<(), Error> {
        let value = value.into();
        match &mut self.slot_mut(id)?.kind {
            Kind::Int(field) => field.assign(&value),
            Kind::Buffer(buffer) => buffer.assign(&value),
            other => Err(Error::TypeMismatch {
                expected: "scalar field",
                found: other.describe(),
            }),
        }
    }

    /// Returns the number of bytes `id` packs to.
    ///
    /// Widths are structural: references contribute their field width only, so no path is
    /// resolved.
    pub fn byte_width(&self, id: NodeId) -> Result<usize, Error> {
        Ok(match &self.slot(id)?.kind {
            Kind::Int(field) => field.byte_width(),
            Kind::Buffer(buffer) => buffer.byte_width(),
            Kind::Container(children) => {
                let mut total = 0;
                for child in &children.order {
                    total += self.byte_width(*child)?;
                }
                total
            }
            Kind::Length { field, inner } => field.byte_width() + self.byte_width(*inner)?,
            Kind::SizeRef { field, .. } | Kind::TransformRef { field, .. } => field.byte_width(),
        })
    }

    /// Packs the whole tree.
    pub fn pack(&self) -> Result<Bytes, Error> {
        self.pack_node(NodeId::ROOT)
    }

    /// Packs the subtree rooted at `id`.
    ///
    /// References inside the subtree still resolve from the root of the whole tree.
    pub fn pack_node(&self, id: NodeId) -> Result<Bytes, Error> {
        let len = self.byte_width(id)?;
        let mut buf = BytesMut::with_capacity(len);
        self.write_node(id, &mut buf, &mut Vec::new())?;
        assert_eq!(buf.len(), len, "packed length differs from byte width");
        Ok(buf.freeze())
    }

    /// Packs the subtree rooted at `id` into `buf`.
    pub fn write(&self, id: NodeId, buf: &mut impl BufMut) -> Result<(), Error> {
        self.write_node(id, buf, &mut Vec::new())
    }

    pub(crate) fn slot(&self, id: NodeId) -> Result<&Slot, Error> {
        self.slots
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(Error::UnknownNode(id))
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut Slot, Error> {
        self.slots
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(Error::UnknownNode(id))
    }

    /// Returns the children of a container slot.
    pub(crate) fn members(&self, container: NodeId) -> Result<&Children, Error> {
        match &self.slot(container)?.kind {
            Kind::Container(children) => Ok(children),
            _ => Err(Error::NotAContainer(self.display_name(container))),
        }
    }

    pub(crate) fn display_name(&self, id: NodeId) -> String {
        match self.slot(id).ok().and_then(|slot| slot.name.as_deref()) {
            Some(name) => name.to_string(),
            None => id.to_string(),
        }
    }

    /// Returns the slot holding the children of `id` (the payload of a [Length]).
    fn container_of(&self, id: NodeId) -> Result<NodeId, Error> {
        match &self.slot(id)?.kind {
            Kind::Container(_) => Ok(id),
            Kind::Length { inner, .. } => Ok(*inner),
            _ => Err(Error::NotAContainer(self.display_name(id))),
        }
    }

    fn alloc(&mut self, name: Option<String>, parent: Option<NodeId>, kind: Kind) -> NodeId {
        let slot = Some(Slot { name, parent, kind });
        if let Some(id) = self.free.pop() {
            self.slots[id.index()] = slot;
            return id;
        }
        let id = NodeId::new(self.slots.len());
        self.slots.push(slot);
        id
    }

    /// Store `node` under `name` in `container`, keeping the position of an existing entry.
    fn place(&mut self, container: NodeId, name: &str, node: Node) -> Result<NodeId, Error> {
        let existing = self.members(container)?.get(name);
        let id = match existing {
            Some(id) => {
                debug!(node = name, kind = node.kind(), "replacing node");
                self.release_children(id);
                id
            }
            None => {
                debug!(node = name, kind = node.kind(), "adding node");
                let id = self.alloc(
                    Some(name.to_string()),
                    Some(container),
                    Kind::Container(Children::default()),
                );
                let Kind::Container(children) = &mut self.slot_mut(container)?.kind else {
                    unreachable!("members() checked the slot is a container");
                };
                children.order.push(id);
                children.index.insert(name.to_string(), id);
                id
            }
        };
        self.fill(id, node)?;
        Ok(id)
    }

    /// Materialize `node` into the (already linked) slot `id`.
    fn fill(&mut self, id: NodeId, node: Node) -> Result<(), Error> {
        let kind = match node {
            Node::Int(field) => Kind::Int(field),
            Node::Buffer(buffer) => Kind::Buffer(buffer),
            Node::SizeRef(reference) => Kind::SizeRef {
                field: reference.field,
                target: reference.target,
            },
            Node::TransformRef(reference) => Kind::TransformRef {
                field: reference.field,
                target: reference.target,
                transform: reference.transform,
            },
            Node::Container(container) => {
                self.slot_mut(id)?.kind = Kind::Container(Children::default());
                for (name, child) in container.into_children() {
                    self.insert(id, &name, child)?;
                }
                return Ok(());
            }
            Node::Length(Length { field, inner }) => {
                let payload = self.alloc(None, Some(id), Kind::Container(Children::default()));
                self.slot_mut(id)?.kind = Kind::Length {
                    field,
                    inner: payload,
                };
                for (name, child) in inner.into_children() {
                    self.insert(payload, &name, child)?;
                }
                return Ok(());
            }
        };
        self.slot_mut(id)?.kind = kind;
        Ok(())
    }

    /// Free every descendant of a slot that is about to be overwritten.
    fn release_children(&mut self, id: NodeId) {
        let mut pending = match self.slots[id.index()].as_ref().map(|slot| &slot.kind) {
            Some(Kind::Container(children)) => children.order.clone(),
            Some(Kind::Length { inner, .. }) => vec![*inner],
            _ => return,
        };
        while let Some(orphan) = pending.pop() {
            let Some(slot) = self.slots[orphan.index()].take() else {
                continue;
            };
            match slot.kind {
                Kind::Container(children) => pending.extend(children.order),
                Kind::Length { inner, .. } => pending.push(inner),
                _ => {}
            }
            self.free.push(orphan);
        }
    }

    /// Compute the field of a length prefix or reference from the current tree.
    ///
    /// `active` holds the transform references currently packing their target, so a target
    /// that contains its own reference is reported instead of recursing forever.
    pub(crate) fn computed(&self, id: NodeId, active: &mut Vec<NodeId>) -> Result<Int, Error> {
        match &self.slot(id)?.kind {
            Kind::Length { field, inner } => Ok(sized(*field, self.byte_width(*inner)?)),
            Kind::SizeRef { field, target } => {
                let resolved = self.resolve(id, target)?;
                Ok(sized(*field, self.byte_width(resolved)?))
            }
            Kind::TransformRef {
                field,
                target,
                transform,
            } => {
                if active.contains(&id) {
                    return Err(Error::CircularReference(target.clone()));
                }
                let resolved = self.resolve(id, target)?;
                let mut payload = BytesMut::with_capacity(self.byte_width(resolved)?);
                active.push(id);
                let result = self.write_node(resolved, &mut payload, active);
                active.pop();
                result?;

                let mut field = *field;
                field.set(transform(&payload[..]));
                trace!(path = target.as_str(), value = field.value(), "transformed");
                Ok(field)
            }
            other => Err(Error::TypeMismatch {
                expected: "computed field",
                found: other.describe(),
            }),
        }
    }

    fn write_node(
        &self,
        id: NodeId,
        buf: &mut impl BufMut,
        active: &mut Vec<NodeId>,
    ) -> Result<(), Error> {
        let slot = self.slot(id)?;
        trace!(node = %id, kind = slot.kind.describe(), "packing");
        match &slot.kind {
            Kind::Int(field) => field.write(buf),
            Kind::Buffer(buffer) => buffer.write(buf),
            Kind::Container(children) => {
                for child in &children.order {
                    self.write_node(*child, buf, active)?;
                }
            }
            Kind::Length { inner, .. } => {
                self.computed(id, active)?.write(buf);
                self.write_node(*inner, buf, active)?;
            }
            Kind::SizeRef { .. } | Kind::TransformRef { .. } => {
                self.computed(id, active)?.write(buf);
            }
        }
        Ok(())
    }
}

/// Shape of a detached subtree, used by [check] to replay insertion without touching a layout.
enum Shape {
    Leaf,
    Branch(HashMap<String, Shape>),
}

/// Verify that attaching `node` cannot fail part-way.
///
/// Replays the insertion of every child of a [Container] or [Length] (including the intermediate
/// containers its dotted names create) and reports the error the insertion would hit.
fn check(node: &Node) -> Result<Shape, Error> {
    let children = match node {
        Node::Container(container) => container.children(),
        Node::Length(length) => length.inner.children(),
        _ => return Ok(Shape::Leaf),
    };
    let mut members = HashMap::new();
    for (path, child) in children {
        resolve::validate(path)?;
        let mut scope = &mut members;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                scope.insert(segment.to_string(), check(child)?);
                break;
            }
            let next = scope
                .entry(segment.to_string())
                .or_insert_with(|| Shape::Branch(HashMap::new()));
            scope = match next {
                Shape::Branch(inner) => inner,
                Shape::Leaf => return Err(Error::NotAContainer(segment.to_string())),
            };
        }
    }
    Ok(Shape::Branch(members))
}

/// Store a byte length into `field`, wrapping (and warning) if it does not fit.
fn sized(mut field: Int, len: usize) -> Int {
    let max = field.width().max();
    if len as u64 > max {
        warn!(len, max, "length does not fit in field");
    }
    field.set(len as i64);
    field
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{checksum, SizeRef, TransformRef};
    use commonware_macros::test_traced;

    #[test_traced]
    fn test_pack_in_insertion_order() {
        let mut layout = Layout::new();
        layout.add("test", Int::u32(0x1337)).unwrap();
        layout.add("upper", Int::u8(0x41)).unwrap();
        assert_eq!(
            layout.pack().unwrap().as_ref(),
            &[0x37, 0x13, 0x00, 0x00, 0x41]
        );
    }

    #[test_traced]
    fn test_nested_insertion_keeps_first_position() {
        let mut layout = Layout::new();
        layout.add("test", Int::u32(0x1337)).unwrap();
        layout.add("sub", Container::new()).unwrap();
        assert_eq!(layout.pack().unwrap().as_ref(), &[0x37, 0x13, 0x00, 0x00]);

        layout.add("sub.inner", Container::new()).unwrap();
        layout.add("sub.inner.test", Int::u16(0xAABB)).unwrap();
        layout.add("sub.inner.another", Int::u16(0xCCDD)).unwrap();
        layout
            .add("upper", Int::from_bytes(crate::Width::W8, false, b"A").unwrap())
            .unwrap();
        assert_eq!(
            layout.pack().unwrap().as_ref(),
            &[0x37, 0x13, 0x00, 0x00, 0xBB, 0xAA, 0xDD, 0xCC, 0x41]
        );

        // Inserting into `sub` later still packs before `upper`
        layout.add("sub.late", Int::u8(0x42)).unwrap();
        assert_eq!(
            layout.pack().unwrap().as_ref(),
            &[0x37, 0x13, 0x00, 0x00, 0xBB, 0xAA, 0xDD, 0xCC, 0x42, 0x41]
        );
    }

    #[test_traced]
    fn test_replace_keeps_position() {
        let mut layout = Layout::new();
        layout.add("a", Int::u8(1)).unwrap();
        let b = layout.add("b", Int::u8(2)).unwrap();
        layout.add("c", Int::u8(3)).unwrap();

        let replaced = layout.add("b", Int::u16_be(0x0B0B)).unwrap();
        assert_eq!(replaced, b);
        assert_eq!(
            layout.pack().unwrap().as_ref(),
            &[0x01, 0x0B, 0x0B, 0x03]
        );
        assert_eq!(layout.children(layout.root()).unwrap().len(), 3);
    }

    #[test_traced]
    fn test_replace_releases_old_subtree() {
        let mut layout = Layout::new();
        let old = layout.add("sub.leaf", Int::u8(1)).unwrap();
        let sub = layout.node("sub").unwrap();
        assert_eq!(layout.parent(old).unwrap(), Some(sub));

        layout.add("sub", Container::new()).unwrap();
        assert_eq!(layout.parent(old), Err(Error::UnknownNode(old)));
        assert!(layout.pack().unwrap().is_empty());
        assert!(matches!(
            layout.node("sub.leaf"),
            Err(Error::Resolution { .. })
        ));

        // The released slot is reused
        let reused = layout.add("sub.other", Int::u8(2)).unwrap();
        assert_eq!(reused, old);
        assert_eq!(layout.parent(reused).unwrap(), Some(sub));
    }

    #[test_traced]
    fn test_replace_reuses_slots() {
        let mut layout = Layout::new();
        for i in 0..1_000 {
            layout
                .add(
                    "body",
                    Length::new(Int::u8(0))
                        .with("a", Int::u8(i as i64))
                        .with("b.c", Int::u8(0xFF)),
                )
                .unwrap();
        }
        // root, body, payload, a, b, c
        assert_eq!(layout.slots.len(), 6);
        assert_eq!(
            layout.pack().unwrap().as_ref(),
            &[0x02, (999 % 256) as u8, 0xFF]
        );
    }

    #[test_traced]
    fn test_failed_add_leaves_layout_unchanged() {
        let mut layout = Layout::new();
        layout.add("keep", Int::u8(0xAA)).unwrap();
        let before = layout.pack().unwrap();
        let slots = layout.slots.len();

        // Invalid child name after a valid one
        assert_eq!(
            layout.add(
                "sub",
                Container::new().with("ok", Int::u8(1)).with("", Int::u8(2))
            ),
            Err(Error::InvalidPath(String::new()))
        );

        // Child descending through an earlier leaf
        assert_eq!(
            layout.add(
                "sub",
                Container::new().with("a", Int::u8(1)).with("a.b", Int::u8(2))
            ),
            Err(Error::NotAContainer("a".to_string()))
        );

        // Nested failure below new intermediate containers
        assert_eq!(
            layout.add(
                "x.y",
                Length::new(Int::u8(0)).with("inner", Container::new().with("a..b", Int::u8(1)))
            ),
            Err(Error::InvalidPath("a..b".to_string()))
        );

        assert_eq!(layout.pack().unwrap(), before);
        assert_eq!(layout.slots.len(), slots);
        assert_eq!(layout.children(layout.root()).unwrap().len(), 1);
        assert!(layout.node("sub").is_err());
        assert!(layout.node("x").is_err());
    }

    #[test_traced]
    fn test_failed_replace_keeps_old_content() {
        let mut layout = Layout::new();
        let keep = layout.add("sub.keep", Int::u8(0xAA)).unwrap();
        assert_eq!(
            layout.add("sub", Container::new().with("a..b", Int::u8(1))),
            Err(Error::InvalidPath("a..b".to_string()))
        );
        assert_eq!(layout.pack().unwrap().as_ref(), &[0xAA]);
        assert_eq!(layout.node("sub.keep").unwrap(), keep);
    }

    #[test_traced]
    fn test_replaced_intermediate_is_checked() {
        // A later leaf replacing an intermediate container blocks further descent
        let mut layout = Layout::new();
        assert_eq!(
            layout.add(
                "sub",
                Container::new()
                    .with("a.b", Int::u8(1))
                    .with("a", Int::u8(2))
                    .with("a.c", Int::u8(3))
            ),
            Err(Error::NotAContainer("a".to_string()))
        );
        assert!(layout.pack().unwrap().is_empty());

        // A length is descended like a container
        layout
            .add(
                "sub",
                Container::new()
                    .with("a", Length::new(Int::u8(0)))
                    .with("a.b", Int::u8(1)),
            )
            .unwrap();
        assert_eq!(layout.pack().unwrap().as_ref(), &[0x01, 0x01]);
    }

    #[test_traced]
    fn test_intermediate_containers_created() {
        let mut layout = Layout::new();
        let leaf = layout.add("a.b.c", Int::u8(7)).unwrap();
        let b = layout.node("a.b").unwrap();
        let a = layout.node("a").unwrap();
        assert_eq!(layout.parent(leaf).unwrap(), Some(b));
        assert_eq!(layout.parent(b).unwrap(), Some(a));
        assert_eq!(layout.parent(a).unwrap(), Some(layout.root()));
        assert_eq!(layout.name(leaf).unwrap(), Some("c"));
        assert_eq!(layout.pack().unwrap().as_ref(), &[0x07]);
    }

    #[test_traced]
    fn test_insert_through_leaf_fails() {
        let mut layout = Layout::new();
        layout.add("leaf", Int::u8(1)).unwrap();
        assert_eq!(
            layout.add("leaf.child", Int::u8(2)),
            Err(Error::NotAContainer("leaf".to_string()))
        );
    }

    #[test_traced]
    fn test_invalid_paths() {
        let mut layout = Layout::new();
        for path in ["", ".", "a.", ".a", "a..b"] {
            assert_eq!(
                layout.add(path, Int::u8(0)),
                Err(Error::InvalidPath(path.to_string()))
            );
        }
    }

    #[test_traced]
    fn test_add_at() {
        let mut layout = Layout::new();
        let sub = layout.add("sub", Container::new()).unwrap();
        layout.add_at(sub, "x", Int::u8(9)).unwrap();
        layout.add("y", Int::u8(8)).unwrap();
        assert_eq!(layout.pack().unwrap().as_ref(), &[0x09, 0x08]);
        assert_eq!(layout.pack_node(sub).unwrap().as_ref(), &[0x09]);
    }

    #[test_traced]
    fn test_with_chaining() {
        let layout = Layout::new()
            .with("a", Int::u8(1))
            .and_then(|layout| layout.with("b", Int::u16(2)))
            .unwrap();
        assert_eq!(layout.pack().unwrap().as_ref(), &[0x01, 0x02, 0x00]);
    }

    #[test_traced]
    fn test_prepopulated_container() {
        let mut layout = Layout::new();
        layout
            .add(
                "sub",
                Container::new()
                    .with("a", Int::u8(1))
                    .with("inner", Container::new().with("b", Int::u8(2))),
            )
            .unwrap();
        layout.add("sub.inner.c", Int::u8(3)).unwrap();
        assert_eq!(layout.pack().unwrap().as_ref(), &[0x01, 0x02, 0x03]);
    }

    #[test_traced]
    fn test_length_prefix() {
        let mut layout = Layout::new();
        let len = layout.add("len", Length::new(Int::u16(0))).unwrap();
        layout.add("len.data", Int::u32(0xAABBCCDD)).unwrap();
        layout.add("len.data2", Int::u8(10)).unwrap();
        assert_eq!(
            layout.pack().unwrap().as_ref(),
            &[0x05, 0x00, 0xDD, 0xCC, 0xBB, 0xAA, 0x0A]
        );
        assert_eq!(layout.value(len).unwrap(), 5);
        assert_eq!(layout.byte_width(len).unwrap(), 7);

        // Recomputed after the payload changes
        layout.add("len.data3", Buffer::new(&b"xyz"[..])).unwrap();
        assert_eq!(layout.value(len).unwrap(), 8);
        assert_eq!(&layout.pack().unwrap()[..2], &[0x08, 0x00]);
    }

    #[test_traced]
    fn test_length_prefix_nested() {
        let mut layout = Layout::new();
        layout
            .add("outer", Length::new(Int::u8(0).big_endian()))
            .unwrap();
        layout.add("outer.head", Int::u8(0xEE)).unwrap();
        layout
            .add("outer.inner", Length::new(Int::u16_be(0)))
            .unwrap();
        layout
            .add("outer.inner.body", Buffer::new(&b"abc"[..]))
            .unwrap();
        assert_eq!(
            layout.pack().unwrap().as_ref(),
            &[0x06, 0xEE, 0x00, 0x03, b'a', b'b', b'c']
        );
    }

    #[test_traced]
    fn test_length_prefix_prepopulated() {
        let mut layout = Layout::new();
        layout
            .add(
                "len",
                Length::new(Int::u16_be(0))
                    .with("a", Int::u32(1))
                    .with("b", Int::u8(2)),
            )
            .unwrap();
        assert_eq!(
            layout.pack().unwrap().as_ref(),
            &[0x00, 0x05, 0x01, 0x00, 0x00, 0x00, 0x02]
        );
    }

    #[test_traced]
    fn test_length_prefix_wraps() {
        let mut layout = Layout::new();
        let len = layout
            .add("len", Length::new(Int::u8(0)).with("blob", Buffer::new(vec![0u8; 300])))
            .unwrap();
        assert_eq!(layout.value(len).unwrap(), 300 % 256);
        assert_eq!(layout.pack().unwrap().len(), 301);
    }

    #[test_traced]
    fn test_size_ref_position_independent() {
        for before in [true, false] {
            let mut layout = Layout::new();
            if before {
                layout
                    .add("len", SizeRef::new(Int::u16_be(0), "len_data"))
                    .unwrap();
            }
            layout.add("len_data.data", Int::u32(0xAABBCCDD)).unwrap();
            layout.add("len_data.data2", Int::u8(10)).unwrap();
            if !before {
                layout
                    .add("len", SizeRef::new(Int::u16_be(0), "len_data"))
                    .unwrap();
            }
            let packed = layout.pack().unwrap();
            let expected: &[u8] = if before {
                &[0x00, 0x05, 0xDD, 0xCC, 0xBB, 0xAA, 0x0A]
            } else {
                &[0xDD, 0xCC, 0xBB, 0xAA, 0x0A, 0x00, 0x05]
            };
            assert_eq!(packed.as_ref(), expected);
        }
    }

    #[test_traced]
    fn test_transform_ref() {
        let mut layout = Layout::new();
        let sum = layout
            .add(
                "sum",
                TransformRef::new(Int::u16(0), "csum_data", checksum::sum),
            )
            .unwrap();
        layout.add("csum_data.data", Int::u32(0xAABBCCDD)).unwrap();
        let data2 = layout.add("csum_data.data2", Int::u8(10)).unwrap();
        assert_eq!(
            layout.pack().unwrap().as_ref(),
            &[0x18, 0x03, 0xDD, 0xCC, 0xBB, 0xAA, 0x0A]
        );

        // Never cached
        layout.set(data2, 11).unwrap();
        assert_eq!(layout.value(sum).unwrap(), 0x319);
    }

    #[test_traced]
    fn test_reference_resolution_failure() {
        let mut layout = Layout::new();
        let len = layout
            .add("len", SizeRef::new(Int::u16(0), "missing.data"))
            .unwrap();
        let expected = Error::Resolution {
            path: "missing.data".to_string(),
            segment: "missing".to_string(),
        };
        assert_eq!(layout.pack(), Err(expected.clone()));
        assert_eq!(layout.value(len), Err(expected));
    }

    #[test_traced]
    fn test_transform_ref_circular() {
        let mut layout = Layout::new();
        layout.add("body.a", Int::u8(1)).unwrap();
        layout
            .add(
                "body.sum",
                TransformRef::new(Int::u8(0), "body", checksum::sum),
            )
            .unwrap();
        assert_eq!(
            layout.pack(),
            Err(Error::CircularReference("body".to_string()))
        );
    }

    #[test_traced]
    fn test_size_ref_to_ancestor() {
        // Widths are structural, so covering the reference itself is fine
        let mut layout = Layout::new();
        layout.add("body.a", Int::u32(1)).unwrap();
        layout
            .add("body.len", SizeRef::new(Int::u8(0), "body"))
            .unwrap();
        assert_eq!(
            layout.pack().unwrap().as_ref(),
            &[0x01, 0x00, 0x00, 0x00, 0x05]
        );
    }

    #[test_traced]
    fn test_size_ref_does_not_resolve_nested_references() {
        let mut layout = Layout::new();
        let len = layout
            .add("len", SizeRef::new(Int::u8(0), "body"))
            .unwrap();
        layout.add("body.a", Int::u16(1)).unwrap();
        layout
            .add(
                "body.sum",
                TransformRef::new(Int::u8(0), "missing", checksum::sum),
            )
            .unwrap();

        // Sized structurally, while packing the target fails
        assert_eq!(layout.value(len).unwrap(), 3);
        let body = layout.node("body").unwrap();
        assert!(matches!(
            layout.pack_node(body),
            Err(Error::Resolution { .. })
        ));
        assert!(matches!(layout.pack(), Err(Error::Resolution { .. })));
    }

    #[test_traced]
    fn test_get_and_set() {
        let mut layout = Layout::new();
        let int = layout.add("int", Int::i16(-2)).unwrap();
        let buf = layout.add("buf", Buffer::default()).unwrap();
        let sub = layout.add("sub", Container::new()).unwrap();
        let len = layout
            .add("len", SizeRef::new(Int::u8(0), "buf"))
            .unwrap();

        assert_eq!(layout.get(int).unwrap(), Value::Int(-2));
        layout.set(int, b"\x01\x02").unwrap();
        assert_eq!(layout.value(int).unwrap(), 0x0201);
        assert_eq!(
            layout.set(int, b"\x01"),
            Err(Error::RangeViolation {
                expected: 2,
                found: 1
            })
        );

        layout.set(buf, b"abcd").unwrap();
        assert_eq!(layout.value(len).unwrap(), 4);

        // A byte count assigned to a narrower field wraps
        let count: usize = 0x1_0203;
        layout.set(int, count).unwrap();
        assert_eq!(layout.value(int).unwrap(), 0x0203);
        assert_eq!(
            layout.set(buf, 5),
            Err(Error::TypeMismatch {
                expected: "bytes",
                found: "integer"
            })
        );
        assert_eq!(
            layout.value(buf),
            Err(Error::TypeMismatch {
                expected: "integer",
                found: "bytes"
            })
        );
        assert_eq!(
            layout.get(sub),
            Err(Error::TypeMismatch {
                expected: "field",
                found: "container"
            })
        );
        assert_eq!(
            layout.set(len, 1),
            Err(Error::TypeMismatch {
                expected: "scalar field",
                found: "size reference"
            })
        );
    }

    #[test_traced]
    fn test_unknown_node() {
        let layout = Layout::new();
        let other = NodeId::new(99);
        assert_eq!(layout.get(other), Err(Error::UnknownNode(other)));
        assert_eq!(layout.pack_node(other), Err(Error::UnknownNode(other)));
    }

    #[test_traced]
    fn test_write_into_buffer() {
        let mut layout = Layout::new();
        layout.add("a", Int::u16_be(0x0102)).unwrap();
        let mut buf = Vec::new();
        layout.write(layout.root(), &mut buf).unwrap();
        assert_eq!(buf, vec![0x01, 0x02]);
    }
}
