//! Address and byte-string formatting.

use std::fmt::Write;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Longest byte string shown in full by [`format_hex`].
const HEX_DISPLAY_LIMIT: usize = 24;

/// Format a UInt32 as an IPv4 address string in dotted-decimal notation.
///
/// # Example
///
/// ```
/// use pktdissect_core::format::format_ipv4;
///
/// assert_eq!(format_ipv4(0xC0A80101), "192.168.1.1");
/// assert_eq!(format_ipv4(0x0A000001), "10.0.0.1");
/// ```
pub fn format_ipv4(value: u32) -> String {
    Ipv4Addr::from(value.to_be_bytes()).to_string()
}

/// Format 16 bytes as an IPv6 address string.
///
/// Returns `None` if the slice is not exactly 16 bytes.
///
/// # Example
///
/// ```
/// use pktdissect_core::format::format_ipv6;
///
/// let bytes = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
/// assert_eq!(format_ipv6(&bytes), Some("2001:db8::1".to_string()));
/// ```
pub fn format_ipv6(bytes: &[u8]) -> Option<String> {
    let octets: [u8; 16] = bytes.try_into().ok()?;
    Some(Ipv6Addr::from(octets).to_string())
}

/// Format 6 bytes as a MAC address string in colon-separated hex format.
///
/// Returns `None` if the slice is not exactly 6 bytes.
///
/// # Example
///
/// ```
/// use pktdissect_core::format::format_mac;
///
/// let bytes = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
/// assert_eq!(format_mac(&bytes), Some("aa:bb:cc:dd:ee:ff".to_string()));
/// ```
pub fn format_mac(bytes: &[u8]) -> Option<String> {
    if bytes.len() != 6 {
        return None;
    }
    Some(format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
    ))
}

/// Format a byte string as contiguous lowercase hex, eliding long values.
///
/// # Example
///
/// ```
/// use pktdissect_core::format::format_hex;
///
/// assert_eq!(format_hex(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
/// assert!(format_hex(&[0u8; 64]).ends_with("..."));
/// ```
pub fn format_hex(bytes: &[u8]) -> String {
    let shown = &bytes[..bytes.len().min(HEX_DISPLAY_LIMIT)];
    let mut out = String::with_capacity(shown.len() * 2 + 3);
    for b in shown {
        let _ = write!(out, "{b:02x}");
    }
    if bytes.len() > HEX_DISPLAY_LIMIT {
        out.push_str("...");
    }
    out
}
