//! Locate nodes by dotted path.
//!
//! A reference names its target with a path from the root of the tree it is attached to.
//! Resolution walks parent links up from the reference until it reaches a node without a
//! parent, then descends the path one segment at a time through named children. A [Length]
//! is transparent: its segment descends straight into the payload.
//!
//! Nothing is cached. The tree may change between packs, so every pack resolves again.
//!
//! [Length]: crate::Length

use crate::{layout::Kind, Error, Layout, NodeId};
use tracing::trace;

/// Reject empty paths and empty segments (`""`, `"a."`, `"a..b"`).
pub(crate) fn validate(path: &str) -> Result<(), Error> {
    if path.split('.').any(str::is_empty) {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(())
}

impl Layout {
    /// Returns the node at `path`, relative to the root.
    pub fn node(&self, path: &str) -> Result<NodeId, Error> {
        self.descend(NodeId::ROOT, path)
    }

    /// Returns the root of the tree `id` belongs to.
    ///
    /// This is [NodeId::ROOT] for every live node.
    pub fn root_of(&self, id: NodeId) -> Result<NodeId, Error> {
        let mut current = id;
        while let Some(parent) = self.slot(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    /// Returns the node reached by following `path` down from `from`.
    pub(crate) fn descend(&self, from: NodeId, path: &str) -> Result<NodeId, Error> {
        validate(path)?;
        let mut current = from;
        for segment in path.split('.') {
            let next = match &self.slot(current)?.kind {
                Kind::Container(children) => children.get(segment),
                Kind::Length { inner, .. } => self.members(*inner)?.get(segment),
                _ => None,
            };
            current = next.ok_or_else(|| Error::Resolution {
                path: path.to_string(),
                segment: segment.to_string(),
            })?;
        }
        Ok(current)
    }

    /// Resolves `path` from the root of the tree holding `from`.
    pub(crate) fn resolve(&self, from: NodeId, path: &str) -> Result<NodeId, Error> {
        let root = self.root_of(from)?;
        let target = self.descend(root, path)?;
        trace!(path, from = %from, to = %target, "resolved");
        Ok(target)
    }
}
