//! Dissectors present in every registry: the frame wrapper and raw data.

use super::{Dissector, IdentityPhase, KeyType, FRAME_DISSECTOR, LINK_TABLE, RAW_DISSECTOR};
use crate::dispatch::Dissection;
use crate::error::{DissectError, RegistryError};
use crate::field::{FieldDef, FieldId, FieldKind, ERROR_FIELD, TEXT_FIELD};
use crate::tvb::{Endian, View};

static HF_FRAME: FieldDef = FieldDef::protocol("frame", "Frame");
static HF_FRAME_NUMBER: FieldDef =
    FieldDef::new("frame.number", "Frame Number", FieldKind::uint(8, Endian::Big));
static HF_FRAME_LEN: FieldDef =
    FieldDef::new("frame.len", "Frame Length", FieldKind::u32(Endian::Big));
static HF_FRAME_CAP_LEN: FieldDef =
    FieldDef::new("frame.cap_len", "Capture Length", FieldKind::u32(Endian::Big));
static HF_FRAME_TIME: FieldDef = FieldDef::new(
    "frame.time_epoch_us",
    "Epoch Time (us)",
    FieldKind::TimestampMicros,
);
static HF_FRAME_ENCAP: FieldDef =
    FieldDef::new("frame.encap_type", "Encapsulation type", FieldKind::u32(Endian::Big));
static HF_FRAME_PROTOCOLS: FieldDef = FieldDef::new(
    "frame.protocols",
    "Protocols in frame",
    FieldKind::String(crate::tvb::StrEncoding::Utf8),
);

static HF_DATA: FieldDef = FieldDef::protocol("data", "Data");
static HF_DATA_DATA: FieldDef = FieldDef::new("data.data", "Data", FieldKind::Bytes);
static HF_DATA_LEN: FieldDef = FieldDef::new("data.len", "Length", FieldKind::u32(Endian::Big));

pub(super) fn register(registry: &mut IdentityPhase) -> Result<(), RegistryError> {
    registry.register_identity(
        FRAME_DISSECTOR,
        "Frame",
        &[
            &HF_FRAME,
            &HF_FRAME_NUMBER,
            &HF_FRAME_LEN,
            &HF_FRAME_CAP_LEN,
            &HF_FRAME_TIME,
            &HF_FRAME_ENCAP,
            &HF_FRAME_PROTOCOLS,
        ],
    )?;
    registry.register_identity(RAW_DISSECTOR, "Data", &[&HF_DATA, &HF_DATA_DATA, &HF_DATA_LEN])?;
    registry.register_identity("annotation", "Annotations", &[&TEXT_FIELD, &ERROR_FIELD])?;

    registry.register_dissector(FRAME_DISSECTOR, Frame)?;
    registry.register_dissector(RAW_DISSECTOR, RawData)?;
    registry.new_dissector_table(LINK_TABLE, "Link-layer encapsulation", KeyType::UInt)?;
    Ok(())
}

/// Adds capture metadata and hands the frame to the link-layer table.
struct Frame;

impl Dissector for Frame {
    fn dissect(
        &self,
        view: &View,
        cx: &mut Dissection<'_>,
        parent: Option<FieldId>,
    ) -> Result<usize, DissectError> {
        let item = cx.tree.add_item(parent, &HF_FRAME, view, 0, ..)?;
        cx.tree.append_text(
            item,
            &format!(
                " {}: {} bytes on wire, {} bytes captured",
                cx.pinfo.frame_number,
                view.reported_len(),
                view.captured_len()
            ),
        );
        cx.tree
            .add_generated(Some(item), &HF_FRAME_NUMBER, cx.pinfo.frame_number);
        cx.tree
            .add_generated(Some(item), &HF_FRAME_LEN, view.reported_len() as u64);
        cx.tree
            .add_generated(Some(item), &HF_FRAME_CAP_LEN, view.captured_len() as u64);
        if let Some(ts) = cx.pinfo.timestamp_us {
            cx.tree.add_generated(Some(item), &HF_FRAME_TIME, ts);
        }
        let link_type = cx.pinfo.link_type;
        cx.tree
            .add_generated(Some(item), &HF_FRAME_ENCAP, u64::from(link_type));

        cx.call_table(LINK_TABLE, link_type, view, parent)?;

        let protocols = cx.pinfo.protocols_string();
        cx.tree.add_generated(Some(item), &HF_FRAME_PROTOCOLS, protocols);
        Ok(view.captured_len())
    }
}

/// Shows undecoded bytes.
struct RawData;

impl Dissector for RawData {
    fn dissect(
        &self,
        view: &View,
        cx: &mut Dissection<'_>,
        parent: Option<FieldId>,
    ) -> Result<usize, DissectError> {
        let len = view.captured_len();
        if len == 0 {
            return Ok(0);
        }
        let item = cx.tree.add_item(parent, &HF_DATA, view, 0, ..)?;
        cx.tree.append_text(item, &format!(" ({len} bytes)"));
        cx.tree.add_item(Some(item), &HF_DATA_DATA, view, 0, ..)?;
        cx.tree.add_generated(Some(item), &HF_DATA_LEN, len as u64);
        Ok(len)
    }
}
