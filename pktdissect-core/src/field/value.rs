//! Decoded field values.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::Bytes;
use compact_str::CompactString;

use crate::format::{format_hex, format_mac};

/// A decoded field value. Values own their data, so a finished field tree
/// outlives the views it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Unsigned integer (all widths)
    UInt(u64),
    /// Signed integer (all widths)
    Int(i64),
    Bool(bool),
    IpAddr(IpAddr),
    MacAddr([u8; 6]),
    /// Raw bytes, usually a zero-copy slice of the packet.
    Bytes(Bytes),
    /// Uses CompactString for small-string optimization (inline up to 24 bytes).
    String(CompactString),
    /// Protocol and text items carry no value.
    None,
}

impl FieldValue {
    pub fn is_none(&self) -> bool {
        matches!(self, FieldValue::None)
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::UInt(v) => Some(*v),
            FieldValue::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            FieldValue::MacAddr(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            FieldValue::IpAddr(ip) => Some(*ip),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::UInt(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Bool(b) => f.write_str(if *b { "True" } else { "False" }),
            FieldValue::IpAddr(ip) => write!(f, "{ip}"),
            FieldValue::MacAddr(m) => f.write_str(&format_mac(m).unwrap_or_default()),
            FieldValue::Bytes(b) => f.write_str(&format_hex(b)),
            FieldValue::String(s) => f.write_str(s),
            FieldValue::None => Ok(()),
        }
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UInt(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<Ipv4Addr> for FieldValue {
    fn from(v: Ipv4Addr) -> Self {
        FieldValue::IpAddr(IpAddr::V4(v))
    }
}

impl From<Ipv6Addr> for FieldValue {
    fn from(v: Ipv6Addr) -> Self {
        FieldValue::IpAddr(IpAddr::V6(v))
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(CompactString::new(v))
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(CompactString::from(v))
    }
}

impl From<Bytes> for FieldValue {
    fn from(v: Bytes) -> Self {
        FieldValue::Bytes(v)
    }
}
