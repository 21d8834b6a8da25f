//! UDP.

use pktdissect_core::prelude::*;

use super::{dissect_ports, ip_proto};

const HEADER_LEN: usize = 8;

static HF_UDP: FieldDef = FieldDef::protocol("udp", "User Datagram Protocol");
static HF_UDP_SRCPORT: FieldDef =
    FieldDef::new("udp.srcport", "Source Port", FieldKind::u16(Endian::Big));
static HF_UDP_DSTPORT: FieldDef =
    FieldDef::new("udp.dstport", "Destination Port", FieldKind::u16(Endian::Big));
static HF_UDP_LENGTH: FieldDef =
    FieldDef::new("udp.length", "Length", FieldKind::u16(Endian::Big));
static HF_UDP_CHECKSUM: FieldDef =
    FieldDef::new("udp.checksum", "Checksum", FieldKind::u16(Endian::Big)).hex();

/// UDP. Owns the `udp.port` table and its heuristic list.
#[derive(Debug, Clone, Copy)]
pub struct Udp;

impl ProtocolModule for Udp {
    fn register(&self, registry: &mut IdentityPhase) -> Result<(), RegistryError> {
        registry.register_identity(
            "udp",
            "User Datagram Protocol",
            &[
                &HF_UDP,
                &HF_UDP_SRCPORT,
                &HF_UDP_DSTPORT,
                &HF_UDP_LENGTH,
                &HF_UDP_CHECKSUM,
            ],
        )?;
        registry.register_dissector("udp", Udp)?;
        registry.new_dissector_table("udp.port", "UDP port", KeyType::UInt)?;
        Ok(())
    }

    fn handoff(&self, registry: &mut HandoffPhase) -> Result<(), RegistryError> {
        registry.register_in_table("ip.proto", ip_proto::UDP, "udp")
    }
}

impl Dissector for Udp {
    fn dissect(
        &self,
        view: &View,
        cx: &mut Dissection<'_>,
        parent: Option<FieldId>,
    ) -> Result<usize, DissectError> {
        let item = cx.tree.add_item(parent, &HF_UDP, view, 0, HEADER_LEN)?;
        let src = cx.tree.add_uint(Some(item), &HF_UDP_SRCPORT, view, 0)? as u16;
        let dst = cx.tree.add_uint(Some(item), &HF_UDP_DSTPORT, view, 2)? as u16;
        let length = cx.tree.add_uint(Some(item), &HF_UDP_LENGTH, view, 4)? as usize;
        cx.tree.add_item(Some(item), &HF_UDP_CHECKSUM, view, 6, ..)?;
        cx.tree
            .append_text(item, &format!(", Src Port: {src}, Dst Port: {dst}"));

        cx.pinfo.set_ports(src, dst);
        cx.pinfo.set_protocol("UDP");
        cx.pinfo.set_info(format!("{src} → {dst} Len={}", length.saturating_sub(HEADER_LEN)));

        if length < HEADER_LEN {
            return Err(DissectError::malformed(
                "udp",
                format!("bad length value {length} < {HEADER_LEN}"),
            ));
        }
        let payload = view.subset(HEADER_LEN, length - HEADER_LEN)?;
        dissect_ports(cx, "udp.port", src, dst, &payload, parent)?;
        Ok(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::test_utils::{dissect, EthernetBuilder, Ipv4Builder, UdpBuilder};

    fn frame(udp: Vec<u8>) -> Vec<u8> {
        let ip = Ipv4Builder::new().udp().payload(udp).build();
        EthernetBuilder::new().ipv4().payload(ip).build()
    }

    #[test]
    fn test_ports_and_columns() {
        let udp = UdpBuilder::new()
            .src_port(50000)
            .dst_port(53)
            .payload(vec![0x12, 0x34, 0x01, 0x00])
            .build();
        let packet = dissect(&frame(udp));

        assert_eq!(packet.context.protocols_string(), "frame:eth:ip:udp:data");
        assert_eq!(packet.context.src_port, Some(50000));
        assert_eq!(packet.context.dst_port, Some(53));
        assert_eq!(packet.context.info, "50000 → 53 Len=4");
        assert_eq!(packet.context.protocol, "UDP");
        assert_eq!(packet.tree.value("udp.length").and_then(|v| v.as_u64()), Some(12));
        assert_eq!(
            packet.tree.find("udp").unwrap().display,
            "User Datagram Protocol, Src Port: 50000, Dst Port: 53"
        );
    }

    #[test]
    fn test_bad_length_is_contained() {
        let mut udp = UdpBuilder::new().payload(vec![0; 4]).build();
        udp[4..6].copy_from_slice(&4u16.to_be_bytes());
        let packet = dissect(&frame(udp));

        let errors: Vec<_> = packet.tree.errors().collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].display.contains("bad length value 4 < 8"));
        // IP still reports its own length, so nothing becomes a trailer.
        assert!(packet.tree.find("eth.trailer").is_none());
    }
}
