//! NetBIOS session service, SMB2 headers and the SMB2 compression transform.
//!
//! A compressed SMB2 message starts with a 16-byte transform header:
//!
//! ```text
//! 0       4                         8          10      12        16
//! +-------+-------------------------+----------+-------+---------+
//! | FC'SMB' | OriginalCompressedSize | Algorithm | Flags | Offset |
//! +-------+-------------------------+----------+-------+---------+
//! ```
//!
//! All fields after the protocol id are little-endian. `Offset` bytes of
//! uncompressed data follow the header, then the compressed data. The
//! decompressed message is the uncompressed prefix followed by the output
//! of the decompressor, and is dissected again like any NetBIOS payload.

use pktdissect_core::field::ByteRange;
use pktdissect_core::prelude::*;

/// Protocol id of an SMB2 header.
pub const SMB2_MAGIC: [u8; 4] = [0xFE, b'S', b'M', b'B'];

/// Protocol id of an SMB2 compression transform header.
pub const SMB2_COMPRESSION_MAGIC: [u8; 4] = [0xFC, b'S', b'M', b'B'];

/// Heuristic list for NetBIOS session payloads.
const NETBIOS_LIST: &str = "netbios";

const NBSS_HEADER_LEN: usize = 4;
const NBSS_SESSION_MESSAGE: u8 = 0x00;
const SMB2_HEADER_LEN: usize = 64;
const TRANSFORM_HEADER_LEN: usize = 16;
const FLAG_CHAINED: u64 = 0x0001;

mod algorithm {
    pub const NONE: u16 = 0;
    pub const LZNT1: u16 = 1;
    pub const LZ77: u16 = 2;
    pub const LZ77_HUFFMAN: u16 = 3;
    pub const PATTERN_V1: u16 = 4;
}

static HF_NBSS: FieldDef = FieldDef::protocol("nbss", "NetBIOS Session Service");
static HF_NBSS_TYPE: FieldDef = FieldDef::new("nbss.type", "Message Type", FieldKind::U8).hex();
static HF_NBSS_LENGTH: FieldDef =
    FieldDef::new("nbss.length", "Length", FieldKind::uint(3, Endian::Big));

static HF_SMB2: FieldDef = FieldDef::protocol("smb2", "SMB2 (Server Message Block Protocol version 2)");
static HF_SMB2_PROTOCOL_ID: FieldDef =
    FieldDef::new("smb2.protocol_id", "ProtocolId", FieldKind::u32(Endian::Big)).hex();
static HF_SMB2_HEADER_LEN: FieldDef =
    FieldDef::new("smb2.header_len", "Header Length", FieldKind::u16(Endian::Little));
static HF_SMB2_CREDIT_CHARGE: FieldDef =
    FieldDef::new("smb2.credit.charge", "Credit Charge", FieldKind::u16(Endian::Little));
static HF_SMB2_NT_STATUS: FieldDef =
    FieldDef::new("smb2.nt_status", "NT Status", FieldKind::u32(Endian::Little)).hex();
static HF_SMB2_CMD: FieldDef =
    FieldDef::new("smb2.cmd", "Command", FieldKind::u16(Endian::Little));
static HF_SMB2_FLAGS: FieldDef =
    FieldDef::new("smb2.flags", "Flags", FieldKind::u32(Endian::Little)).hex();
static HF_SMB2_FLAGS_RESPONSE: FieldDef = FieldDef::new(
    "smb2.flags.response",
    "Response",
    FieldKind::flag(4, Endian::Little, 0x0000_0001),
);
static HF_SMB2_MSG_ID: FieldDef =
    FieldDef::new("smb2.msg_id", "Message ID", FieldKind::uint(8, Endian::Little));
static HF_SMB2_SESSION_ID: FieldDef =
    FieldDef::new("smb2.sesid", "Session Id", FieldKind::uint(8, Endian::Little)).hex();

static HF_COMP: FieldDef = FieldDef::protocol("smb2.comp", "SMB2 Compression Transform Header");
static HF_COMP_PROTOCOL_ID: FieldDef =
    FieldDef::new("smb2.comp.protocol_id", "ProtocolId", FieldKind::u32(Endian::Big)).hex();
static HF_COMP_ORIG_SIZE: FieldDef = FieldDef::new(
    "smb2.comp.orig_size",
    "OriginalSize",
    FieldKind::u32(Endian::Little),
);
static HF_COMP_ALG: FieldDef =
    FieldDef::new("smb2.comp.alg", "Compression Algorithm", FieldKind::u16(Endian::Little));
static HF_COMP_FLAGS: FieldDef =
    FieldDef::new("smb2.comp.flags", "Flags", FieldKind::u16(Endian::Little)).hex();
static HF_COMP_OFFSET: FieldDef =
    FieldDef::new("smb2.comp.offset", "Offset", FieldKind::u32(Endian::Little));
static HF_COMP_UNCOMPRESSED: FieldDef =
    FieldDef::new("smb2.comp.uncompressed", "Uncompressed data", FieldKind::Bytes);
static HF_COMP_COMPRESSED: FieldDef =
    FieldDef::new("smb2.comp.compressed", "Compressed data", FieldKind::Bytes);
static HF_COMP_DECOMPRESSED_LEN: FieldDef = FieldDef::new(
    "smb2.comp.decompressed_len",
    "Decompressed length",
    FieldKind::u32(Endian::Little),
);

/// NetBIOS session service over TCP 139/445, SMB2 headers, and compressed
/// SMB2 messages. Owns the `netbios` heuristic list.
#[derive(Debug, Clone, Copy)]
pub struct Smb2;

impl ProtocolModule for Smb2 {
    fn register(&self, registry: &mut IdentityPhase) -> Result<(), RegistryError> {
        registry.register_identity("nbss", "NetBIOS Session Service", &[
            &HF_NBSS,
            &HF_NBSS_TYPE,
            &HF_NBSS_LENGTH,
        ])?;
        registry.register_identity(
            "smb2",
            "SMB2 (Server Message Block Protocol version 2)",
            &[
                &HF_SMB2,
                &HF_SMB2_PROTOCOL_ID,
                &HF_SMB2_HEADER_LEN,
                &HF_SMB2_CREDIT_CHARGE,
                &HF_SMB2_NT_STATUS,
                &HF_SMB2_CMD,
                &HF_SMB2_FLAGS,
                &HF_SMB2_FLAGS_RESPONSE,
                &HF_SMB2_MSG_ID,
                &HF_SMB2_SESSION_ID,
                &HF_COMP,
                &HF_COMP_PROTOCOL_ID,
                &HF_COMP_ORIG_SIZE,
                &HF_COMP_ALG,
                &HF_COMP_FLAGS,
                &HF_COMP_OFFSET,
                &HF_COMP_UNCOMPRESSED,
                &HF_COMP_COMPRESSED,
                &HF_COMP_DECOMPRESSED_LEN,
            ],
        )?;
        registry.register_dissector("nbss", Nbss)?;
        registry.register_heuristic_dissector("smb2", Smb2Header)?;
        registry.register_heuristic_dissector("smb2.comp", CompressionTransform)?;
        registry.new_heuristic_list(NETBIOS_LIST, "NetBIOS session payload")?;
        Ok(())
    }

    fn handoff(&self, registry: &mut HandoffPhase) -> Result<(), RegistryError> {
        registry.register_in_table("tcp.port", 139u16, "nbss")?;
        registry.register_in_table("tcp.port", 445u16, "nbss")?;
        registry.register_heuristic(NETBIOS_LIST, "smb2.comp")?;
        registry.register_heuristic(NETBIOS_LIST, "smb2")
    }
}

/// One or more NetBIOS session PDUs in a TCP segment.
struct Nbss;

impl Dissector for Nbss {
    fn dissect(
        &self,
        view: &View,
        cx: &mut Dissection<'_>,
        parent: Option<FieldId>,
    ) -> Result<usize, DissectError> {
        let mut offset = 0;
        while offset < view.captured_len() {
            let length = view.get_u24(offset + 1, Endian::Big)? as usize;
            let pdu = view.subset(offset, NBSS_HEADER_LEN + length)?;
            let item = cx.tree.add_item(parent, &HF_NBSS, &pdu, 0, NBSS_HEADER_LEN)?;
            let kind = cx.tree.add_uint(Some(item), &HF_NBSS_TYPE, &pdu, 0)? as u8;
            cx.tree.add_item(Some(item), &HF_NBSS_LENGTH, &pdu, 1, ..)?;
            cx.pinfo.set_protocol("NBSS");

            let payload = pdu.subset(NBSS_HEADER_LEN, ..)?;
            if kind == NBSS_SESSION_MESSAGE {
                cx.call_heuristics(NETBIOS_LIST, &payload, parent)?;
            } else {
                cx.tree.append_text(item, &format!(", Type 0x{kind:02x}"));
                cx.call_raw(&payload, Some(item))?;
            }
            offset += NBSS_HEADER_LEN + length;
        }
        Ok(offset.min(view.captured_len()))
    }
}

fn command_name(cmd: u64) -> &'static str {
    const NAMES: [&str; 19] = [
        "Negotiate Protocol",
        "Session Setup",
        "Session Logoff",
        "Tree Connect",
        "Tree Disconnect",
        "Create",
        "Close",
        "Flush",
        "Read",
        "Write",
        "Lock",
        "Ioctl",
        "Cancel",
        "KeepAlive",
        "Find",
        "Notify",
        "GetInfo",
        "SetInfo",
        "Break",
    ];
    usize::try_from(cmd)
        .ok()
        .and_then(|i| NAMES.get(i))
        .copied()
        .unwrap_or("Unknown")
}

/// The fixed 64-byte SMB2 header. The command body is left undecoded.
struct Smb2Header;

impl HeuristicDissector for Smb2Header {
    fn dissect_heuristic(
        &self,
        view: &View,
        cx: &mut Dissection<'_>,
        parent: Option<FieldId>,
    ) -> Result<Heuristic, DissectError> {
        if view.get_array::<4>(0)? != SMB2_MAGIC {
            return Ok(Heuristic::NotMine);
        }
        let header_len = SMB2_HEADER_LEN.min(view.captured_len());
        let item = cx.tree.add_item(parent, &HF_SMB2, view, 0, header_len)?;
        cx.tree.add_item(Some(item), &HF_SMB2_PROTOCOL_ID, view, 0, ..)?;
        cx.tree.add_item(Some(item), &HF_SMB2_HEADER_LEN, view, 4, ..)?;
        cx.tree.add_item(Some(item), &HF_SMB2_CREDIT_CHARGE, view, 6, ..)?;
        cx.tree.add_item(Some(item), &HF_SMB2_NT_STATUS, view, 8, ..)?;
        let cmd = cx.tree.add_uint(Some(item), &HF_SMB2_CMD, view, 12)?;
        let flags = cx.tree.add_item(Some(item), &HF_SMB2_FLAGS, view, 16, ..)?;
        let response = cx.tree.add_uint(Some(flags), &HF_SMB2_FLAGS_RESPONSE, view, 16)? != 0;
        cx.tree.add_item(Some(item), &HF_SMB2_MSG_ID, view, 24, ..)?;
        cx.tree.add_item(Some(item), &HF_SMB2_SESSION_ID, view, 40, ..)?;

        cx.pinfo.set_protocol("SMB2");
        cx.pinfo.set_info(format!(
            "{} {}",
            command_name(cmd),
            if response { "Response" } else { "Request" }
        ));

        let body = view.subset(SMB2_HEADER_LEN, ..)?;
        cx.call_raw(&body, Some(item))?;
        Ok(Heuristic::Claimed(view.captured_len()))
    }
}

/// A compressed SMB2 message: decompressed and dissected again.
struct CompressionTransform;

impl HeuristicDissector for CompressionTransform {
    fn dissect_heuristic(
        &self,
        view: &View,
        cx: &mut Dissection<'_>,
        parent: Option<FieldId>,
    ) -> Result<Heuristic, DissectError> {
        if view.get_array::<4>(0)? != SMB2_COMPRESSION_MAGIC {
            return Ok(Heuristic::NotMine);
        }
        let header_len = TRANSFORM_HEADER_LEN.min(view.captured_len());
        let item = cx.tree.add_item(parent, &HF_COMP, view, 0, header_len)?;
        cx.tree.add_item(Some(item), &HF_COMP_PROTOCOL_ID, view, 0, ..)?;
        let original_size = cx.tree.add_uint(Some(item), &HF_COMP_ORIG_SIZE, view, 4)? as usize;
        let alg = cx.tree.add_uint(Some(item), &HF_COMP_ALG, view, 8)? as u16;
        let flags = cx.tree.add_uint(Some(item), &HF_COMP_FLAGS, view, 10)?;
        let offset = cx.tree.add_uint(Some(item), &HF_COMP_OFFSET, view, 12)? as usize;
        cx.pinfo.set_protocol("SMB2");
        cx.pinfo.set_info("Compressed SMB2");
        let claimed = Heuristic::Claimed(view.captured_len());

        if flags & FLAG_CHAINED != 0 {
            cx.tree.add_text(
                Some(item),
                view,
                10,
                2,
                "Chained compression payloads are not decoded",
            )?;
            let rest = view.subset(TRANSFORM_HEADER_LEN, ..)?;
            cx.call_raw(&rest, Some(item))?;
            return Ok(claimed);
        }

        let data_start = TRANSFORM_HEADER_LEN
            .checked_add(offset)
            .ok_or_else(|| DissectError::malformed("smb2.comp", "offset overflows"))?;
        if offset > 0 {
            cx.tree
                .add_item(Some(item), &HF_COMP_UNCOMPRESSED, view, TRANSFORM_HEADER_LEN, offset)?;
        }
        let compressed = view.subset(data_start, ..)?;

        let algorithm = match alg {
            algorithm::LZNT1 => Algorithm::Lznt1,
            algorithm::LZ77 => Algorithm::Lz77,
            other => {
                let name = match other {
                    algorithm::NONE => "None",
                    algorithm::LZ77_HUFFMAN => "LZ77+Huffman",
                    algorithm::PATTERN_V1 => "Pattern_V1",
                    _ => "Unknown",
                };
                cx.tree.add_text(
                    Some(item),
                    view,
                    8,
                    2,
                    format!("Compression algorithm {name} ({other}) is not supported"),
                )?;
                cx.call_raw(&compressed, Some(item))?;
                return Ok(claimed);
            }
        };
        cx.tree.append_text(item, &format!(", {}", algorithm.name()));

        let decompressed = match cx.decompress(view, data_start, .., algorithm) {
            Ok(child) => child,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                let range = ByteRange {
                    view: compressed.clone(),
                    offset: 0,
                    length: compressed.captured_len(),
                };
                cx.tree.add_error(Some(item), Some(range), &err);
                cx.call_raw(&compressed, Some(item))?;
                return Ok(claimed);
            }
        };
        cx.tree.add_item(Some(item), &HF_COMP_COMPRESSED, view, data_start, ..)?;
        cx.tree.add_generated(
            Some(item),
            &HF_COMP_DECOMPRESSED_LEN,
            decompressed.captured_len() as u64,
        );
        if decompressed.captured_len() != original_size {
            cx.tree.add_text(
                Some(item),
                view,
                4,
                4,
                format!(
                    "Decompressed {} bytes, header says {original_size}",
                    decompressed.captured_len()
                ),
            )?;
        }

        let message = if offset > 0 && decompressed.is_empty() {
            view.subset(TRANSFORM_HEADER_LEN, offset)?
        } else if offset > 0 {
            let prefix = view.subset(TRANSFORM_HEADER_LEN, offset)?;
            let message = View::composite([prefix, decompressed])?.labelled("Decompressed SMB2");
            cx.pinfo.add_data_source("Decompressed SMB2", message.clone());
            message
        } else {
            decompressed
        };
        cx.call_heuristics(NETBIOS_LIST, &message, Some(item))?;
        Ok(claimed)
    }
}
