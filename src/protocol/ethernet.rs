//! Ethernet II.

use pktdissect_core::prelude::*;

/// Link type constant for Ethernet.
pub const LINKTYPE_ETHERNET: u32 = 1;

/// Well-known EtherType values (IEEE 802).
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const VLAN: u16 = 0x8100;
    pub const IPV6: u16 = 0x86DD;
    pub const QINQ: u16 = 0x88A8;
}

/// Type/length values up to this are an 802.3 length, not an EtherType.
const MAX_8023_LENGTH: u16 = 1500;

const HEADER_LEN: usize = 14;

static HF_ETH: FieldDef = FieldDef::protocol("eth", "Ethernet II");
static HF_ETH_DST: FieldDef = FieldDef::new("eth.dst", "Destination", FieldKind::Mac);
static HF_ETH_SRC: FieldDef = FieldDef::new("eth.src", "Source", FieldKind::Mac);
static HF_ETH_TYPE: FieldDef =
    FieldDef::new("eth.type", "Type", FieldKind::u16(Endian::Big)).hex();
static HF_ETH_LEN: FieldDef =
    FieldDef::new("eth.len", "Length", FieldKind::u16(Endian::Big));
static HF_ETH_TRAILER: FieldDef = FieldDef::new("eth.trailer", "Trailer", FieldKind::Bytes)
    .with_description("Bytes after the end of the encapsulated payload");

/// Ethernet II framing. Owns the `ethertype` table.
#[derive(Debug, Clone, Copy)]
pub struct Ethernet;

impl ProtocolModule for Ethernet {
    fn register(&self, registry: &mut IdentityPhase) -> Result<(), RegistryError> {
        registry.register_identity(
            "eth",
            "Ethernet II",
            &[&HF_ETH, &HF_ETH_DST, &HF_ETH_SRC, &HF_ETH_TYPE, &HF_ETH_LEN, &HF_ETH_TRAILER],
        )?;
        registry.register_dissector("eth", Ethernet)?;
        registry.new_dissector_table("ethertype", "Ethertype", KeyType::UInt)?;
        Ok(())
    }

    fn handoff(&self, registry: &mut HandoffPhase) -> Result<(), RegistryError> {
        registry.register_in_table(LINK_TABLE, LINKTYPE_ETHERNET, "eth")
    }
}

impl Dissector for Ethernet {
    fn dissect(
        &self,
        view: &View,
        cx: &mut Dissection<'_>,
        parent: Option<FieldId>,
    ) -> Result<usize, DissectError> {
        let item = cx.tree.add_item(parent, &HF_ETH, view, 0, HEADER_LEN)?;
        cx.tree.add_item(Some(item), &HF_ETH_DST, view, 0, ..)?;
        cx.tree.add_item(Some(item), &HF_ETH_SRC, view, 6, ..)?;
        let dst = view.get_mac(0)?;
        let src = view.get_mac(6)?;
        cx.tree.append_text(
            item,
            &format!(
                ", Src: {}, Dst: {}",
                Address::Ether(src),
                Address::Ether(dst)
            ),
        );
        cx.pinfo.dl_src = Some(Address::Ether(src));
        cx.pinfo.dl_dst = Some(Address::Ether(dst));
        cx.pinfo.set_protocol("Ethernet");

        let type_or_len = view.get_u16(12, Endian::Big)?;
        let consumed = if type_or_len <= MAX_8023_LENGTH {
            cx.tree.add_item(Some(item), &HF_ETH_LEN, view, 12, ..)?;
            let payload = view.subset(HEADER_LEN, usize::from(type_or_len))?;
            cx.call_raw(&payload, parent)?
        } else {
            cx.tree.add_item(Some(item), &HF_ETH_TYPE, view, 12, ..)?;
            cx.pinfo.set_hint("ethertype", u64::from(type_or_len));
            let payload = view.subset(HEADER_LEN, ..)?;
            cx.call_table("ethertype", type_or_len, &payload, parent)?
        };

        let end = HEADER_LEN + consumed;
        if end < view.captured_len() {
            cx.tree.add_item(Some(item), &HF_ETH_TRAILER, view, end, ..)?;
        }
        Ok(view.captured_len())
    }
}
