//! Declared wire types of fields.

use crate::tvb::{Endian, StrEncoding};

/// How a field is read from the wire.
///
/// Fixed-width kinds carry their width and byte order; variable-width kinds
/// take their length from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// A protocol layer; the item spans the layer and has no value.
    Protocol,

    /// A label with no value.
    Text,

    /// Unsigned integer of 1..=8 bytes, optionally masked to a bitfield.
    UInt { width: u8, endian: Endian, mask: u64 },

    /// Signed integer of 1..=8 bytes.
    Int { width: u8, endian: Endian },

    /// Flag bit(s) within an integer; true when any masked bit is set.
    Bool { width: u8, endian: Endian, mask: u64 },

    /// IPv4 address, network order
    Ipv4,

    /// IPv6 address
    Ipv6,

    /// MAC address
    Mac,

    /// Variable-length raw bytes
    Bytes,

    /// Variable-length string
    String(StrEncoding),

    /// NUL-terminated string
    StringZ(StrEncoding),

    /// Microsecond timestamp (generated fields only)
    TimestampMicros,
}

impl FieldKind {
    pub const U8: FieldKind = FieldKind::uint(1, Endian::Big);

    /// Unsigned integer of `width` bytes.
    pub const fn uint(width: u8, endian: Endian) -> Self {
        FieldKind::UInt {
            width,
            endian,
            mask: 0,
        }
    }

    pub const fn u16(endian: Endian) -> Self {
        Self::uint(2, endian)
    }

    pub const fn u32(endian: Endian) -> Self {
        Self::uint(4, endian)
    }

    /// Bitfield of an unsigned integer; the value is shifted down to bit 0.
    pub const fn bits(width: u8, endian: Endian, mask: u64) -> Self {
        FieldKind::UInt {
            width,
            endian,
            mask,
        }
    }

    /// Single flag within an integer.
    pub const fn flag(width: u8, endian: Endian, mask: u64) -> Self {
        FieldKind::Bool {
            width,
            endian,
            mask,
        }
    }

    /// Human-readable type name for display.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Protocol => "protocol",
            FieldKind::Text => "text",
            FieldKind::UInt { width, .. } => match width {
                1 => "u8",
                2 => "u16",
                3 => "u24",
                4 => "u32",
                _ => "u64",
            },
            FieldKind::Int { width, .. } => match width {
                1 => "i8",
                2 => "i16",
                4 => "i32",
                _ => "i64",
            },
            FieldKind::Bool { .. } => "bool",
            FieldKind::Ipv4 => "ipv4",
            FieldKind::Ipv6 => "ipv6",
            FieldKind::Mac => "mac",
            FieldKind::Bytes => "bytes",
            FieldKind::String(_) | FieldKind::StringZ(_) => "string",
            FieldKind::TimestampMicros => "timestamp",
        }
    }

    /// Size in bytes for fixed-width kinds, None for variable-width.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            FieldKind::UInt { width, .. }
            | FieldKind::Int { width, .. }
            | FieldKind::Bool { width, .. } => Some(*width as usize),
            FieldKind::Ipv4 => Some(4),
            FieldKind::Ipv6 => Some(16),
            FieldKind::Mac => Some(6),
            FieldKind::Protocol
            | FieldKind::Text
            | FieldKind::Bytes
            | FieldKind::String(_)
            | FieldKind::StringZ(_)
            | FieldKind::TimestampMicros => None,
        }
    }
}
