//! Field definitions and the per-packet field tree.
//!
//! A [`FieldDef`] is registered once per abbreviation (e.g. `ip.src`) during
//! startup. Dissectors then add items to a [`FieldTree`] by pointing a
//! definition at a byte range of a view; the tree reads and decodes the value
//! with the usual bounds checks.

mod kind;
mod tree;
mod value;

pub use kind::FieldKind;
pub use tree::{ByteRange, Field, FieldId, FieldTree, Iter};
pub use value::FieldValue;

/// Numeric display base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Base {
    #[default]
    Dec,
    Hex,
}

/// A registered field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Globally unique filter abbreviation (e.g., "udp.srcport")
    pub abbrev: &'static str,

    /// Display name (e.g., "Source Port")
    pub name: &'static str,

    pub kind: FieldKind,

    /// Display base for integers
    pub base: Base,

    /// Optional description for documentation
    pub description: Option<&'static str>,
}

impl FieldDef {
    pub const fn new(abbrev: &'static str, name: &'static str, kind: FieldKind) -> Self {
        Self {
            abbrev,
            name,
            kind,
            base: Base::Dec,
            description: None,
        }
    }

    /// The item representing a whole protocol layer.
    pub const fn protocol(abbrev: &'static str, name: &'static str) -> Self {
        Self::new(abbrev, name, FieldKind::Protocol)
    }

    /// Builder: display integers in hex.
    pub const fn hex(mut self) -> Self {
        self.base = Base::Hex;
        self
    }

    /// Add a description to the field.
    pub const fn with_description(mut self, desc: &'static str) -> Self {
        self.description = Some(desc);
        self
    }
}

/// Free-form text items.
pub static TEXT_FIELD: FieldDef = FieldDef::new("text", "Text", FieldKind::Text);

/// Error annotations added when a dissector faults.
pub static ERROR_FIELD: FieldDef =
    FieldDef::new("_error", "Error", FieldKind::Text).with_description("Dissection error annotation");
