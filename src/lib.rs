//! pktdissect - dissect captured frames into field trees.
//!
//! This crate bundles [`pktdissect_core`] (byte views, decompressors, the
//! dissector registry and dispatch) with a small set of built-in protocol
//! modules: Ethernet, 802.1Q, IPv4, UDP, TCP and NetBIOS/SMB2 including the
//! SMB2 compression transform.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use pktdissect::prelude::*;
//! use pktdissect::protocol::LINKTYPE_ETHERNET;
//!
//! let registry = Arc::new(pktdissect::default_registry()?);
//! let mut engine = Engine::new(registry);
//!
//! let mut frame = vec![0xff; 6];
//! frame.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
//! frame.extend_from_slice(&[0x88, 0xb5, 0xde, 0xad]);
//!
//! let packet = engine.dissect(&Frame::new(1, LINKTYPE_ETHERNET, frame));
//! assert_eq!(packet.context.protocols_string(), "frame:eth:data");
//! # Ok::<(), pktdissect::RegistryError>(())
//! ```
//!
//! Third-party protocols implement [`ProtocolModule`] and are passed to
//! [`Registry::from_modules`] alongside [`builtin_modules`].

pub mod protocol;

pub use pktdissect_core::{
    config, context, decompress, dispatch, engine, error, field, registry, tap, tvb,
};
pub use pktdissect_core::{
    DissectConfig, DissectError, Dissection, Engine, Frame, Packet, ProtocolModule, Registry,
    RegistryError, View,
};

/// Everything a protocol module or an embedding application usually needs.
pub mod prelude {
    pub use pktdissect_core::prelude::*;
}

/// The protocol modules shipped with this crate, in registration order.
pub fn builtin_modules() -> Vec<&'static dyn ProtocolModule> {
    vec![
        &protocol::Ethernet,
        &protocol::Vlan,
        &protocol::Ipv4,
        &protocol::Udp,
        &protocol::Tcp,
        &protocol::Smb2,
    ]
}

/// A registry with every built-in module registered.
pub fn default_registry() -> Result<Registry, RegistryError> {
    Registry::from_modules(&builtin_modules())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::{dissector_fn, HandoffPhase, IdentityPhase};

    #[test]
    fn test_default_registry_tables() {
        let registry = default_registry().unwrap();
        for table in ["ethertype", "ip.proto", "udp.port", "tcp.port", "netbios"] {
            assert!(registry.table(table).is_some(), "missing table {table}");
        }
        let tcp = registry.table("tcp.port").unwrap();
        assert_eq!(
            tcp.lookup(&445u16.into()).map(|h| registry.dissector_name(h)),
            Some("nbss")
        );
        let netbios: Vec<_> = registry
            .table("netbios")
            .unwrap()
            .heuristics()
            .iter()
            .map(|h| registry.dissector_name(*h))
            .collect();
        assert_eq!(netbios, vec!["smb2.comp", "smb2"]);
    }

    #[test]
    fn test_modules_compose_with_third_party() {
        struct Extra;
        impl ProtocolModule for Extra {
            fn register(&self, registry: &mut IdentityPhase) -> Result<(), RegistryError> {
                registry.register_dissector(
                    "extra",
                    dissector_fn(|view, _cx, _parent| Ok(view.captured_len())),
                )?;
                Ok(())
            }

            fn handoff(&self, registry: &mut HandoffPhase) -> Result<(), RegistryError> {
                registry.register_in_table("udp.port", 9999u16, "extra")
            }
        }

        // Registered before the module that owns the table.
        let mut modules: Vec<&dyn ProtocolModule> = vec![&Extra];
        modules.extend(builtin_modules());
        let registry = Registry::from_modules(&modules).unwrap();
        assert!(registry.table("udp.port").unwrap().lookup(&9999u16.into()).is_some());
    }
}
