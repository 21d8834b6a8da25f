//! Display helpers for field values and addresses.

mod address;

pub use address::{format_hex, format_ipv4, format_ipv6, format_mac};
