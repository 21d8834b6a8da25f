//! The per-packet item tree.
//!
//! Items live in one arena in insertion order, so rolling back a declined
//! heuristic is a truncation to an earlier length.

use std::fmt::Write as _;

use super::{Base, FieldDef, FieldKind, FieldValue, ERROR_FIELD, TEXT_FIELD};
use crate::error::{BoundsFault, DissectError};
use crate::tvb::{Extent, View};

/// Handle to an item in a [`FieldTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(usize);

impl FieldId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The bytes an item was decoded from.
#[derive(Debug, Clone)]
pub struct ByteRange {
    pub view: View,
    pub offset: usize,
    pub length: usize,
}

/// One decoded item.
#[derive(Debug, Clone)]
pub struct Field {
    pub abbrev: &'static str,
    pub name: &'static str,
    pub kind: FieldKind,
    /// None for generated items that have no wire bytes.
    pub range: Option<ByteRange>,
    pub value: FieldValue,
    /// Rendered text, e.g. "Source Port: 53".
    pub display: String,
    pub is_error: bool,
}

#[derive(Debug, Clone)]
struct Node {
    field: Field,
    parent: Option<FieldId>,
    children: Vec<FieldId>,
}

/// Ordered tree of decoded items for one packet.
///
/// Items are appended in decode order; each has at most one parent and
/// children keep their insertion order.
#[derive(Debug, Clone, Default)]
pub struct FieldTree {
    nodes: Vec<Node>,
    roots: Vec<FieldId>,
}

impl FieldTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[FieldId] {
        &self.roots
    }

    pub fn get(&self, id: FieldId) -> Option<&Field> {
        self.nodes.get(id.0).map(|n| &n.field)
    }

    pub fn parent(&self, id: FieldId) -> Option<FieldId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: FieldId) -> &[FieldId] {
        self.nodes.get(id.0).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Depth-first traversal yielding `(depth, field)`.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            tree: self,
            stack: self.roots.iter().rev().map(|&id| (0, id)).collect(),
        }
    }

    /// First item with the given abbreviation, in traversal order.
    pub fn find(&self, abbrev: &str) -> Option<&Field> {
        self.iter().map(|(_, f)| f).find(|f| f.abbrev == abbrev)
    }

    pub fn find_all<'a>(&'a self, abbrev: &'a str) -> impl Iterator<Item = &'a Field> + 'a {
        self.iter().map(|(_, f)| f).filter(move |f| f.abbrev == abbrev)
    }

    pub fn value(&self, abbrev: &str) -> Option<&FieldValue> {
        self.find(abbrev).map(|f| &f.value)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Field> {
        self.nodes.iter().map(|n| &n.field).filter(|f| f.is_error)
    }

    /// Render the tree as indented text, one item per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (depth, field) in self.iter() {
            for _ in 0..depth {
                out.push_str("    ");
            }
            out.push_str(&field.display);
            out.push('\n');
        }
        out
    }

    /// Decode `def` from `view` at `offset` and add it under `parent`.
    ///
    /// Fixed-width kinds ignore `extent`. Protocol and text items validate the
    /// range but carry no value.
    pub fn add_item(
        &mut self,
        parent: Option<FieldId>,
        def: &'static FieldDef,
        view: &View,
        offset: usize,
        extent: impl Into<Extent>,
    ) -> Result<FieldId, BoundsFault> {
        let (length, value) = decode(def.kind, view, offset, extent.into())?;
        let display = describe(def, &value);
        Ok(self.push(
            parent,
            Field {
                abbrev: def.abbrev,
                name: def.name,
                kind: def.kind,
                range: Some(ByteRange {
                    view: view.clone(),
                    offset,
                    length,
                }),
                value,
                display,
                is_error: false,
            },
        ))
    }

    /// Add an integer or flag item and return its decoded value.
    pub fn add_uint(
        &mut self,
        parent: Option<FieldId>,
        def: &'static FieldDef,
        view: &View,
        offset: usize,
    ) -> Result<u64, BoundsFault> {
        let id = self.add_item(parent, def, view, offset, Extent::Remaining)?;
        Ok(self.nodes[id.0].field.value.as_u64().unwrap_or(0))
    }

    /// Add an item whose value was computed rather than read.
    pub fn add_generated(
        &mut self,
        parent: Option<FieldId>,
        def: &'static FieldDef,
        value: impl Into<FieldValue>,
    ) -> FieldId {
        let value = value.into();
        let display = describe(def, &value);
        self.push(
            parent,
            Field {
                abbrev: def.abbrev,
                name: def.name,
                kind: def.kind,
                range: None,
                value,
                display,
                is_error: false,
            },
        )
    }

    pub fn add_text(
        &mut self,
        parent: Option<FieldId>,
        view: &View,
        offset: usize,
        extent: impl Into<Extent>,
        text: impl Into<String>,
    ) -> Result<FieldId, BoundsFault> {
        let length = view.ensure_contained(offset, extent)?;
        Ok(self.push(
            parent,
            Field {
                abbrev: TEXT_FIELD.abbrev,
                name: TEXT_FIELD.name,
                kind: TEXT_FIELD.kind,
                range: Some(ByteRange {
                    view: view.clone(),
                    offset,
                    length,
                }),
                value: FieldValue::None,
                display: text.into(),
                is_error: false,
            },
        ))
    }

    /// Annotate a dissection error.
    pub fn add_error(
        &mut self,
        parent: Option<FieldId>,
        range: Option<ByteRange>,
        error: &DissectError,
    ) -> FieldId {
        self.push(
            parent,
            Field {
                abbrev: ERROR_FIELD.abbrev,
                name: error.label(),
                kind: ERROR_FIELD.kind,
                range,
                value: FieldValue::None,
                display: format!("[{}: {}]", error.label(), error),
                is_error: true,
            },
        )
    }

    /// Append to an item's display text (e.g. a layer summary).
    pub fn append_text(&mut self, id: FieldId, text: &str) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.field.display.push_str(text);
        }
    }

    pub(crate) fn mark(&self) -> usize {
        self.nodes.len()
    }

    /// Drop every item added since `mark`.
    pub(crate) fn truncate(&mut self, mark: usize) {
        while self.nodes.len() > mark {
            let Some(node) = self.nodes.pop() else {
                break;
            };
            match node.parent {
                Some(parent) if parent.0 < mark => {
                    self.nodes[parent.0].children.pop();
                }
                Some(_) => {}
                None => {
                    self.roots.pop();
                }
            }
        }
    }

    /// Most recent protocol item added since `mark`.
    pub(crate) fn last_protocol_since(&self, mark: usize) -> Option<FieldId> {
        (mark..self.nodes.len())
            .rev()
            .find(|&i| self.nodes[i].field.kind == FieldKind::Protocol)
            .map(FieldId)
    }

    fn push(&mut self, parent: Option<FieldId>, field: Field) -> FieldId {
        let id = FieldId(self.nodes.len());
        let parent = parent.filter(|p| p.0 < self.nodes.len());
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }
        self.nodes.push(Node {
            field,
            parent,
            children: Vec::new(),
        });
        id
    }
}

/// Depth-first iterator over a [`FieldTree`].
pub struct Iter<'a> {
    tree: &'a FieldTree,
    stack: Vec<(usize, FieldId)>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (usize, &'a Field);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, id) = self.stack.pop()?;
        let node = &self.tree.nodes[id.0];
        self.stack
            .extend(node.children.iter().rev().map(|&c| (depth + 1, c)));
        Some((depth, &node.field))
    }
}

fn apply_mask(raw: u64, mask: u64) -> u64 {
    if mask == 0 {
        raw
    } else {
        (raw & mask) >> mask.trailing_zeros()
    }
}

fn decode(
    kind: FieldKind,
    view: &View,
    offset: usize,
    extent: Extent,
) -> Result<(usize, FieldValue), BoundsFault> {
    Ok(match kind {
        FieldKind::UInt {
            width,
            endian,
            mask,
        } => {
            let width = usize::from(width.clamp(1, 8));
            let raw = view.get_uint(offset, width, endian)?;
            (width, FieldValue::UInt(apply_mask(raw, mask)))
        }
        FieldKind::Bool {
            width,
            endian,
            mask,
        } => {
            let width = usize::from(width.clamp(1, 8));
            let raw = view.get_uint(offset, width, endian)?;
            let bits = if mask == 0 { raw } else { raw & mask };
            (width, FieldValue::Bool(bits != 0))
        }
        FieldKind::Int { width, endian } => {
            let width = usize::from(width.clamp(1, 8));
            let raw = view.get_uint(offset, width, endian)?;
            let shift = 64 - 8 * width as u32;
            (width, FieldValue::Int(((raw << shift) as i64) >> shift))
        }
        FieldKind::Ipv4 => (4, view.get_ipv4(offset)?.into()),
        FieldKind::Ipv6 => (16, view.get_ipv6(offset)?.into()),
        FieldKind::Mac => (6, FieldValue::MacAddr(view.get_mac(offset)?)),
        FieldKind::Bytes => {
            let length = view.ensure_contained(offset, extent)?;
            (length, FieldValue::Bytes(view.get_bytes(offset, length)?))
        }
        FieldKind::String(encoding) => {
            let length = view.ensure_contained(offset, extent)?;
            (length, view.get_string(offset, length, encoding)?.into())
        }
        FieldKind::StringZ(encoding) => {
            let (text, length) = view.get_stringz(offset, encoding)?;
            (length, text.into())
        }
        FieldKind::Protocol | FieldKind::Text | FieldKind::TimestampMicros => {
            (view.ensure_contained(offset, extent)?, FieldValue::None)
        }
    })
}

fn describe(def: &FieldDef, value: &FieldValue) -> String {
    match (def.kind, value) {
        (_, FieldValue::None) => def.name.to_string(),
        (FieldKind::UInt { width, mask, .. }, FieldValue::UInt(v)) if def.base == Base::Hex => {
            let digits = if mask == 0 {
                usize::from(width) * 2
            } else {
                ((64 - mask.leading_zeros() - mask.trailing_zeros()) as usize).div_ceil(4)
            };
            format!("{}: 0x{:0digits$x}", def.name, v)
        }
        _ => {
            let mut out = String::with_capacity(def.name.len() + 16);
            let _ = write!(out, "{}: {}", def.name, value);
            out
        }
    }
}
