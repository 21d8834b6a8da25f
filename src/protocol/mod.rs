//! Built-in protocol modules.
//!
//! Each module registers itself through the same two-phase API a third-party
//! module would use:
//! - `register`: protocol identity, fields, dissectors and owned tables
//! - `handoff`: entries in tables owned by other modules
//!
//! | Module | Dissectors | Owns | Hands off to |
//! |--------|------------|------|--------------|
//! | [`Ethernet`] | `eth` | `ethertype` | `wtap_encap` 1 |
//! | [`Vlan`] | `vlan` | | `ethertype` 0x8100, 0x88a8 |
//! | [`Ipv4`] | `ip` | `ip.proto` | `ethertype` 0x0800 |
//! | [`Udp`] | `udp` | `udp.port` | `ip.proto` 17 |
//! | [`Tcp`] | `tcp` | `tcp.port` | `ip.proto` 6 |
//! | [`Smb2`] | `nbss`, `smb2`, `smb2.comp` | `netbios` | `tcp.port` 139, 445 |

mod ethernet;
mod ipv4;
mod smb2;
mod tcp;
mod udp;
mod vlan;

#[doc(hidden)]
pub mod test_utils;

pub use ethernet::{ethertype, Ethernet, LINKTYPE_ETHERNET};
pub use ipv4::{ip_proto, Ipv4};
pub use smb2::{Smb2, SMB2_COMPRESSION_MAGIC, SMB2_MAGIC};
pub use tcp::Tcp;
pub use udp::Udp;
pub use vlan::Vlan;

use pktdissect_core::prelude::*;
use tracing::debug;

/// Hand a transport payload to the dissector registered for one of its ports.
///
/// The lower port is tried first, then the higher one, then the table's
/// heuristic list, then raw data.
pub(crate) fn dissect_ports(
    cx: &mut Dissection<'_>,
    table: &str,
    src_port: u16,
    dst_port: u16,
    payload: &View,
    parent: Option<FieldId>,
) -> Result<usize, DissectError> {
    if payload.is_empty() {
        return Ok(0);
    }
    let (low, high) = if src_port <= dst_port {
        (src_port, dst_port)
    } else {
        (dst_port, src_port)
    };
    if let Some(consumed) = cx.try_table(table, low, payload, parent)? {
        return Ok(consumed);
    }
    if high != low {
        if let Some(consumed) = cx.try_table(table, high, payload, parent)? {
            return Ok(consumed);
        }
    }
    debug!(table, low, high, "no port match, trying heuristics");
    cx.call_heuristics(table, payload, parent)
}
