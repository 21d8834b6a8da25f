//! TCP.
//!
//! Segments are dissected one at a time; there is no stream reassembly.

use pktdissect_core::prelude::*;

use super::{dissect_ports, ip_proto};

const MIN_HEADER_LEN: usize = 20;

/// TCP flag bits (low byte of the flags field).
mod flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
}

static HF_TCP: FieldDef = FieldDef::protocol("tcp", "Transmission Control Protocol");
static HF_TCP_SRCPORT: FieldDef =
    FieldDef::new("tcp.srcport", "Source Port", FieldKind::u16(Endian::Big));
static HF_TCP_DSTPORT: FieldDef =
    FieldDef::new("tcp.dstport", "Destination Port", FieldKind::u16(Endian::Big));
static HF_TCP_SEQ: FieldDef =
    FieldDef::new("tcp.seq", "Sequence Number", FieldKind::u32(Endian::Big));
static HF_TCP_ACK: FieldDef =
    FieldDef::new("tcp.ack", "Acknowledgment Number", FieldKind::u32(Endian::Big));
static HF_TCP_HDR_LEN: FieldDef = FieldDef::new(
    "tcp.hdr_len",
    "Header Length",
    FieldKind::bits(1, Endian::Big, 0xF0),
)
.with_description("Header length in 32-bit words");
static HF_TCP_FLAGS: FieldDef =
    FieldDef::new("tcp.flags", "Flags", FieldKind::bits(2, Endian::Big, 0x0FFF)).hex();
static HF_TCP_FLAGS_URG: FieldDef =
    FieldDef::new("tcp.flags.urg", "Urgent", FieldKind::flag(1, Endian::Big, 0x20));
static HF_TCP_FLAGS_ACK: FieldDef =
    FieldDef::new("tcp.flags.ack", "Acknowledgment", FieldKind::flag(1, Endian::Big, 0x10));
static HF_TCP_FLAGS_PSH: FieldDef =
    FieldDef::new("tcp.flags.push", "Push", FieldKind::flag(1, Endian::Big, 0x08));
static HF_TCP_FLAGS_RST: FieldDef =
    FieldDef::new("tcp.flags.reset", "Reset", FieldKind::flag(1, Endian::Big, 0x04));
static HF_TCP_FLAGS_SYN: FieldDef =
    FieldDef::new("tcp.flags.syn", "Syn", FieldKind::flag(1, Endian::Big, 0x02));
static HF_TCP_FLAGS_FIN: FieldDef =
    FieldDef::new("tcp.flags.fin", "Fin", FieldKind::flag(1, Endian::Big, 0x01));
static HF_TCP_WINDOW: FieldDef =
    FieldDef::new("tcp.window_size", "Window", FieldKind::u16(Endian::Big));
static HF_TCP_CHECKSUM: FieldDef =
    FieldDef::new("tcp.checksum", "Checksum", FieldKind::u16(Endian::Big)).hex();
static HF_TCP_URGENT: FieldDef =
    FieldDef::new("tcp.urgent_pointer", "Urgent Pointer", FieldKind::u16(Endian::Big));
static HF_TCP_OPTIONS: FieldDef = FieldDef::new("tcp.options", "Options", FieldKind::Bytes);
static HF_TCP_LEN: FieldDef =
    FieldDef::new("tcp.len", "TCP Segment Len", FieldKind::u32(Endian::Big));

/// TCP. Owns the `tcp.port` table and its heuristic list.
#[derive(Debug, Clone, Copy)]
pub struct Tcp;

impl ProtocolModule for Tcp {
    fn register(&self, registry: &mut IdentityPhase) -> Result<(), RegistryError> {
        registry.register_identity(
            "tcp",
            "Transmission Control Protocol",
            &[
                &HF_TCP,
                &HF_TCP_SRCPORT,
                &HF_TCP_DSTPORT,
                &HF_TCP_SEQ,
                &HF_TCP_ACK,
                &HF_TCP_HDR_LEN,
                &HF_TCP_FLAGS,
                &HF_TCP_FLAGS_URG,
                &HF_TCP_FLAGS_ACK,
                &HF_TCP_FLAGS_PSH,
                &HF_TCP_FLAGS_RST,
                &HF_TCP_FLAGS_SYN,
                &HF_TCP_FLAGS_FIN,
                &HF_TCP_WINDOW,
                &HF_TCP_CHECKSUM,
                &HF_TCP_URGENT,
                &HF_TCP_OPTIONS,
                &HF_TCP_LEN,
            ],
        )?;
        registry.register_dissector("tcp", Tcp)?;
        registry.new_dissector_table("tcp.port", "TCP port", KeyType::UInt)?;
        Ok(())
    }

    fn handoff(&self, registry: &mut HandoffPhase) -> Result<(), RegistryError> {
        registry.register_in_table("ip.proto", ip_proto::TCP, "tcp")
    }
}

fn flag_names(bits: u8) -> String {
    const NAMES: [(u8, &str); 6] = [
        (flags::FIN, "FIN"),
        (flags::SYN, "SYN"),
        (flags::RST, "RST"),
        (flags::PSH, "PSH"),
        (flags::ACK, "ACK"),
        (flags::URG, "URG"),
    ];
    NAMES
        .iter()
        .filter(|(bit, _)| bits & bit != 0)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Dissector for Tcp {
    fn dissect(
        &self,
        view: &View,
        cx: &mut Dissection<'_>,
        parent: Option<FieldId>,
    ) -> Result<usize, DissectError> {
        let header_len = usize::from(view.get_u8(12)? >> 4) * 4;
        let item = cx
            .tree
            .add_item(parent, &HF_TCP, view, 0, header_len.max(MIN_HEADER_LEN))?;
        let src = cx.tree.add_uint(Some(item), &HF_TCP_SRCPORT, view, 0)? as u16;
        let dst = cx.tree.add_uint(Some(item), &HF_TCP_DSTPORT, view, 2)? as u16;
        let seq = cx.tree.add_uint(Some(item), &HF_TCP_SEQ, view, 4)?;
        let ack = cx.tree.add_uint(Some(item), &HF_TCP_ACK, view, 8)?;
        cx.tree.add_item(Some(item), &HF_TCP_HDR_LEN, view, 12, ..)?;

        cx.pinfo.set_ports(src, dst);
        cx.pinfo.set_protocol("TCP");
        cx.tree
            .append_text(item, &format!(", Src Port: {src}, Dst Port: {dst}"));

        if header_len < MIN_HEADER_LEN {
            return Err(DissectError::malformed(
                "tcp",
                format!("bogus TCP header length {header_len}, must be at least {MIN_HEADER_LEN}"),
            ));
        }

        let flags_item = cx.tree.add_item(Some(item), &HF_TCP_FLAGS, view, 12, ..)?;
        for def in [
            &HF_TCP_FLAGS_URG,
            &HF_TCP_FLAGS_ACK,
            &HF_TCP_FLAGS_PSH,
            &HF_TCP_FLAGS_RST,
            &HF_TCP_FLAGS_SYN,
            &HF_TCP_FLAGS_FIN,
        ] {
            cx.tree.add_item(Some(flags_item), def, view, 13, ..)?;
        }
        let flag_bits = view.get_u8(13)?;
        let window = cx.tree.add_uint(Some(item), &HF_TCP_WINDOW, view, 14)?;
        cx.tree.add_item(Some(item), &HF_TCP_CHECKSUM, view, 16, ..)?;
        cx.tree.add_item(Some(item), &HF_TCP_URGENT, view, 18, ..)?;
        if header_len > MIN_HEADER_LEN {
            cx.tree.add_item(
                Some(item),
                &HF_TCP_OPTIONS,
                view,
                MIN_HEADER_LEN,
                header_len - MIN_HEADER_LEN,
            )?;
        }

        let payload = view.subset(header_len, ..)?;
        let segment_len = payload.reported_len();
        cx.tree
            .add_generated(Some(item), &HF_TCP_LEN, segment_len as u64);
        cx.pinfo.set_info(format!(
            "{src} → {dst} [{}] Seq={seq} Ack={ack} Win={window} Len={segment_len}",
            flag_names(flag_bits)
        ));

        dissect_ports(cx, "tcp.port", src, dst, &payload, parent)?;
        Ok(view.captured_len())
    }
}
