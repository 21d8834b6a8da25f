//! IEEE 802.1Q VLAN tag.

use pktdissect_core::prelude::*;

use super::ethertype;

const TAG_LEN: usize = 4;

static HF_VLAN: FieldDef = FieldDef::protocol("vlan", "802.1Q Virtual LAN");
static HF_VLAN_PRIORITY: FieldDef =
    FieldDef::new("vlan.priority", "Priority", FieldKind::bits(2, Endian::Big, 0xE000));
static HF_VLAN_DEI: FieldDef =
    FieldDef::new("vlan.dei", "DEI", FieldKind::flag(2, Endian::Big, 0x1000));
static HF_VLAN_ID: FieldDef =
    FieldDef::new("vlan.id", "ID", FieldKind::bits(2, Endian::Big, 0x0FFF));
static HF_VLAN_ETYPE: FieldDef =
    FieldDef::new("vlan.etype", "Type", FieldKind::u16(Endian::Big)).hex();

/// 802.1Q and 802.1ad tags. The inner frame goes back through `ethertype`.
#[derive(Debug, Clone, Copy)]
pub struct Vlan;

impl ProtocolModule for Vlan {
    fn register(&self, registry: &mut IdentityPhase) -> Result<(), RegistryError> {
        registry.register_identity(
            "vlan",
            "802.1Q Virtual LAN",
            &[&HF_VLAN, &HF_VLAN_PRIORITY, &HF_VLAN_DEI, &HF_VLAN_ID, &HF_VLAN_ETYPE],
        )?;
        registry.register_dissector("vlan", Vlan)?;
        Ok(())
    }

    fn handoff(&self, registry: &mut HandoffPhase) -> Result<(), RegistryError> {
        registry.register_in_table("ethertype", ethertype::VLAN, "vlan")?;
        registry.register_in_table("ethertype", ethertype::QINQ, "vlan")
    }
}

impl Dissector for Vlan {
    fn dissect(
        &self,
        view: &View,
        cx: &mut Dissection<'_>,
        parent: Option<FieldId>,
    ) -> Result<usize, DissectError> {
        let item = cx.tree.add_item(parent, &HF_VLAN, view, 0, TAG_LEN)?;
        cx.tree.add_uint(Some(item), &HF_VLAN_PRIORITY, view, 0)?;
        cx.tree.add_uint(Some(item), &HF_VLAN_DEI, view, 0)?;
        let id = cx.tree.add_uint(Some(item), &HF_VLAN_ID, view, 0)?;
        let etype = cx.tree.add_uint(Some(item), &HF_VLAN_ETYPE, view, 2)? as u16;
        cx.tree.append_text(item, &format!(", ID: {id}"));
        cx.pinfo.set_hint("vlan.id", id);
        cx.pinfo.set_hint("ethertype", u64::from(etype));

        let payload = view.subset(TAG_LEN, ..)?;
        let consumed = cx.call_table("ethertype", etype, &payload, parent)?;
        Ok(TAG_LEN + consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::test_utils::{dissect, EthernetBuilder, Ipv4Builder, UdpBuilder, VlanBuilder};

    #[test]
    fn test_tag_fields() {
        let inner = Ipv4Builder::new()
            .udp()
            .payload(UdpBuilder::new().payload(vec![0; 4]).build())
            .build();
        let tagged = VlanBuilder::new().priority(5).id(100).ipv4().payload(inner).build();
        let frame = EthernetBuilder::new()
            .ethertype(ethertype::VLAN)
            .payload(tagged)
            .build();
        let packet = dissect(&frame);

        assert_eq!(packet.context.protocols_string(), "frame:eth:vlan:ip:udp:data");
        assert_eq!(packet.tree.value("vlan.id").and_then(|v| v.as_u64()), Some(100));
        assert_eq!(packet.tree.value("vlan.priority").and_then(|v| v.as_u64()), Some(5));
        assert_eq!(
            packet.tree.value("vlan.dei").map(|v| v.to_string()),
            Some("False".to_string())
        );
        assert_eq!(packet.context.hint("vlan.id"), Some(100));
    }

    #[test]
    fn test_stacked_tags() {
        let inner = VlanBuilder::new().id(7).ethertype(0x88b5).payload(vec![1]).build();
        let outer = VlanBuilder::new().id(20).ethertype(ethertype::VLAN).payload(inner).build();
        let frame = EthernetBuilder::new()
            .ethertype(ethertype::QINQ)
            .payload(outer)
            .build();
        let packet = dissect(&frame);

        assert_eq!(packet.context.protocols_string(), "frame:eth:vlan:vlan:data");
        let ids: Vec<_> = packet
            .tree
            .find_all("vlan.id")
            .filter_map(|f| f.value.as_u64())
            .collect();
        assert_eq!(ids, vec![20, 7]);
    }
}
