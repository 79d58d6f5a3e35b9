//! Human-readable dump of a [Layout], for debugging.
//!
//! Containers are marked with `+`, leaves with `|-` followed by the name they were added under.
//! Length prefixes and references show the value they would pack right now. The output format
//! is not stable.

use crate::{layout::Kind, node::NodeId, Layout};
use core::fmt;
use std::fmt::Write as _;

/// Configuration for [Layout::render].
#[derive(Clone, Debug)]
pub struct Config {
    /// Spaces added for each level of nesting.
    pub indent: usize,

    /// Number of leading bytes shown for a buffer before the rest is elided.
    pub preview: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            indent: 2,
            preview: 10,
        }
    }
}

impl Layout {
    /// Render the whole tree.
    pub fn render(&self, cfg: &Config) -> String {
        let mut out = String::new();
        self.render_node(NodeId::ROOT, 0, cfg, &mut out);
        out
    }

    fn render_node(&self, id: NodeId, depth: usize, cfg: &Config, out: &mut String) {
        let Ok(slot) = self.slot(id) else {
            return;
        };
        let pad = " ".repeat(depth * cfg.indent);
        let name = slot.name.as_deref().unwrap_or("(root)");
        match &slot.kind {
            Kind::Container(children) => {
                let _ = writeln!(out, "{pad}+ {name}");
                for child in &children.order {
                    self.render_node(*child, depth + 1, cfg, out);
                }
            }
            Kind::Length { inner, .. } => {
                let _ = writeln!(out, "{pad}+ {name} length: {}", self.render_computed(id));
                if let Ok(payload) = self.members(*inner) {
                    for child in &payload.order {
                        self.render_node(*child, depth + 1, cfg, out);
                    }
                }
            }
            Kind::Int(field) => {
                let _ = writeln!(
                    out,
                    "{pad}|- {} 0x{:0width$X} : {name}",
                    field.describe(),
                    field.bits(),
                    width = field.width().bytes() * 2
                );
            }
            Kind::Buffer(buffer) => {
                let value = buffer.value();
                let shown = value.len().min(cfg.preview);
                let elided = if value.len() > shown { "..." } else { "" };
                let _ = writeln!(
                    out,
                    "{pad}|- Buffer {}{elided} : {name}",
                    hex(&value[..shown])
                );
            }
            Kind::SizeRef { target, .. } => {
                let _ = writeln!(
                    out,
                    "{pad}|- size of {target}: {} : {name}",
                    self.render_computed(id)
                );
            }
            Kind::TransformRef { target, .. } => {
                let _ = writeln!(
                    out,
                    "{pad}|- transform of {target}: {} : {name}",
                    self.render_computed(id)
                );
            }
        }
    }

    fn render_computed(&self, id: NodeId) -> String {
        match self.computed(id, &mut Vec::new()) {
            Ok(field) => format!("0x{:X}", field.bits()),
            Err(err) => format!("<{err}>"),
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&Config::default()))
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}
