//! IPv4.

use pktdissect_core::prelude::*;

use super::ethertype;

/// IP protocol numbers.
pub mod ip_proto {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

const MIN_HEADER_LEN: usize = 20;

static HF_IP: FieldDef = FieldDef::protocol("ip", "Internet Protocol Version 4");
static HF_IP_VERSION: FieldDef =
    FieldDef::new("ip.version", "Version", FieldKind::bits(1, Endian::Big, 0xF0));
static HF_IP_HDR_LEN: FieldDef = FieldDef::new(
    "ip.hdr_len",
    "Header Length",
    FieldKind::bits(1, Endian::Big, 0x0F),
)
.with_description("Header length in 32-bit words");
static HF_IP_DSFIELD: FieldDef =
    FieldDef::new("ip.dsfield", "Differentiated Services Field", FieldKind::U8).hex();
static HF_IP_LEN: FieldDef =
    FieldDef::new("ip.len", "Total Length", FieldKind::u16(Endian::Big));
static HF_IP_ID: FieldDef =
    FieldDef::new("ip.id", "Identification", FieldKind::u16(Endian::Big)).hex();
static HF_IP_FLAGS_DF: FieldDef =
    FieldDef::new("ip.flags.df", "Don't fragment", FieldKind::flag(2, Endian::Big, 0x4000));
static HF_IP_FLAGS_MF: FieldDef =
    FieldDef::new("ip.flags.mf", "More fragments", FieldKind::flag(2, Endian::Big, 0x2000));
static HF_IP_FRAG_OFFSET: FieldDef = FieldDef::new(
    "ip.frag_offset",
    "Fragment Offset",
    FieldKind::bits(2, Endian::Big, 0x1FFF),
);
static HF_IP_TTL: FieldDef = FieldDef::new("ip.ttl", "Time to Live", FieldKind::U8);
static HF_IP_PROTO: FieldDef = FieldDef::new("ip.proto", "Protocol", FieldKind::U8);
static HF_IP_CHECKSUM: FieldDef =
    FieldDef::new("ip.checksum", "Header Checksum", FieldKind::u16(Endian::Big)).hex();
static HF_IP_SRC: FieldDef = FieldDef::new("ip.src", "Source Address", FieldKind::Ipv4);
static HF_IP_DST: FieldDef = FieldDef::new("ip.dst", "Destination Address", FieldKind::Ipv4);
static HF_IP_OPTIONS: FieldDef = FieldDef::new("ip.options", "Options", FieldKind::Bytes);

/// IPv4. Owns the `ip.proto` table.
#[derive(Debug, Clone, Copy)]
pub struct Ipv4;

impl ProtocolModule for Ipv4 {
    fn register(&self, registry: &mut IdentityPhase) -> Result<(), RegistryError> {
        registry.register_identity(
            "ip",
            "Internet Protocol Version 4",
            &[
                &HF_IP,
                &HF_IP_VERSION,
                &HF_IP_HDR_LEN,
                &HF_IP_DSFIELD,
                &HF_IP_LEN,
                &HF_IP_ID,
                &HF_IP_FLAGS_DF,
                &HF_IP_FLAGS_MF,
                &HF_IP_FRAG_OFFSET,
                &HF_IP_TTL,
                &HF_IP_PROTO,
                &HF_IP_CHECKSUM,
                &HF_IP_SRC,
                &HF_IP_DST,
                &HF_IP_OPTIONS,
            ],
        )?;
        registry.register_dissector("ip", Ipv4)?;
        registry.new_dissector_table("ip.proto", "IP protocol", KeyType::UInt)?;
        Ok(())
    }

    fn handoff(&self, registry: &mut HandoffPhase) -> Result<(), RegistryError> {
        registry.register_in_table("ethertype", ethertype::IPV4, "ip")
    }
}

impl Dissector for Ipv4 {
    fn dissect(
        &self,
        view: &View,
        cx: &mut Dissection<'_>,
        parent: Option<FieldId>,
    ) -> Result<usize, DissectError> {
        let version_ihl = view.get_u8(0)?;
        let header_len = usize::from(version_ihl & 0x0F) * 4;
        let item = cx
            .tree
            .add_item(parent, &HF_IP, view, 0, header_len.max(MIN_HEADER_LEN))?;
        let version = cx.tree.add_uint(Some(item), &HF_IP_VERSION, view, 0)?;
        if version != 4 {
            return Err(DissectError::malformed("ip", format!("bogus IP version {version}")));
        }
        cx.tree.add_item(Some(item), &HF_IP_HDR_LEN, view, 0, ..)?;
        if header_len < MIN_HEADER_LEN {
            return Err(DissectError::malformed(
                "ip",
                format!("bogus IP header length {header_len}, must be at least {MIN_HEADER_LEN}"),
            ));
        }
        cx.tree.add_item(Some(item), &HF_IP_DSFIELD, view, 1, ..)?;
        let total_len = cx.tree.add_uint(Some(item), &HF_IP_LEN, view, 2)? as usize;
        if total_len < header_len {
            return Err(DissectError::malformed(
                "ip",
                format!("bogus IP length {total_len}, less than header length {header_len}"),
            ));
        }
        cx.tree.add_item(Some(item), &HF_IP_ID, view, 4, ..)?;
        cx.tree.add_item(Some(item), &HF_IP_FLAGS_DF, view, 6, ..)?;
        let more_fragments = cx.tree.add_uint(Some(item), &HF_IP_FLAGS_MF, view, 6)? != 0;
        let frag_offset = cx.tree.add_uint(Some(item), &HF_IP_FRAG_OFFSET, view, 6)?;
        cx.tree.add_item(Some(item), &HF_IP_TTL, view, 8, ..)?;
        let proto = cx.tree.add_uint(Some(item), &HF_IP_PROTO, view, 9)? as u8;
        cx.tree.add_item(Some(item), &HF_IP_CHECKSUM, view, 10, ..)?;
        cx.tree.add_item(Some(item), &HF_IP_SRC, view, 12, ..)?;
        cx.tree.add_item(Some(item), &HF_IP_DST, view, 16, ..)?;
        if header_len > MIN_HEADER_LEN {
            cx.tree.add_item(
                Some(item),
                &HF_IP_OPTIONS,
                view,
                MIN_HEADER_LEN,
                header_len - MIN_HEADER_LEN,
            )?;
        }

        let src = view.get_ipv4(12)?;
        let dst = view.get_ipv4(16)?;
        cx.tree.append_text(item, &format!(", Src: {src}, Dst: {dst}"));
        cx.pinfo.net_src = Some(Address::Ipv4(src));
        cx.pinfo.net_dst = Some(Address::Ipv4(dst));
        cx.pinfo.set_protocol("IPv4");
        cx.pinfo.set_info(format!("{src} → {dst}"));
        cx.pinfo.set_hint("ip.proto", u64::from(proto));

        let payload = view.subset(header_len, total_len - header_len)?;
        if more_fragments || frag_offset != 0 {
            // No reassembly: fragments are shown as they are.
            cx.pinfo.append_info(&format!("Fragmented IP protocol (proto={proto}, off={frag_offset})"));
            cx.call_raw(&payload, parent)?;
        } else {
            cx.call_table("ip.proto", proto, &payload, parent)?;
        }
        Ok(total_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::test_utils::{dissect, EthernetBuilder, Ipv4Builder};

    fn frame(ip: Vec<u8>) -> Vec<u8> {
        EthernetBuilder::new().ipv4().payload(ip).build()
    }

    #[test]
    fn test_header_fields() {
        let ip = Ipv4Builder::new()
            .protocol(200)
            .ttl(17)
            .src_ip([10, 0, 0, 1])
            .dst_ip([10, 0, 0, 2])
            .payload(vec![0xde, 0xad])
            .build();
        let packet = dissect(&frame(ip));
        let tree = &packet.tree;

        assert_eq!(packet.context.protocols_string(), "frame:eth:ip:data");
        assert_eq!(tree.value("ip.version").and_then(|v| v.as_u64()), Some(4));
        assert_eq!(tree.value("ip.hdr_len").and_then(|v| v.as_u64()), Some(5));
        assert_eq!(tree.value("ip.len").and_then(|v| v.as_u64()), Some(22));
        assert_eq!(tree.value("ip.ttl").and_then(|v| v.as_u64()), Some(17));
        assert_eq!(tree.find("ip.src").unwrap().display, "Source Address: 10.0.0.1");
        assert_eq!(packet.context.net_dst.map(|a| a.to_string()), Some("10.0.0.2".into()));
        assert_eq!(packet.context.info, "10.0.0.1 → 10.0.0.2");
        assert_eq!(packet.context.protocol, "IPv4");
        assert_eq!(tree.value("data.len").and_then(|v| v.as_u64()), Some(2));
    }

    #[test]
    fn test_padding_becomes_trailer() {
        let ip = Ipv4Builder::new().protocol(200).payload(vec![1, 2]).build();
        let mut padded = ip.clone();
        padded.extend_from_slice(&[0; 6]);
        let packet = dissect(&frame(padded));

        assert_eq!(packet.tree.value("data.len").and_then(|v| v.as_u64()), Some(2));
        let trailer = packet.tree.find("eth.trailer").unwrap();
        assert_eq!(trailer.range.as_ref().map(|r| r.length), Some(6));
    }

    #[test]
    fn test_bad_version_is_contained() {
        let mut ip = Ipv4Builder::new().payload(vec![0; 4]).build();
        ip[0] = 0x65;
        let packet = dissect(&frame(ip));

        let errors: Vec<_> = packet.tree.errors().collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].display.contains("bogus IP version 6"));
        assert_eq!(packet.context.protocols_string(), "frame:eth:ip");
    }

    #[test]
    fn test_fragments_are_not_dispatched() {
        let ip = Ipv4Builder::new()
            .udp()
            .more_fragments()
            .payload(vec![0; 16])
            .build();
        let packet = dissect(&frame(ip));
        assert_eq!(packet.context.protocols_string(), "frame:eth:ip:data");
        assert_eq!(
            packet.tree.value("ip.flags.mf").map(|v| v.to_string()),
            Some("True".to_string())
        );
    }

    #[test]
    fn test_length_beyond_frame_is_malformed() {
        let mut ip = Ipv4Builder::new().protocol(200).payload(vec![0; 4]).build();
        ip[2..4].copy_from_slice(&200u16.to_be_bytes());
        let packet = dissect(&frame(ip));

        let errors: Vec<_> = packet.tree.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, "Malformed Packet");
        // The fault hangs off the IP layer, not the frame root.
        let text = packet.render();
        assert!(text.contains("    [Malformed Packet"), "{text}");
    }
}
