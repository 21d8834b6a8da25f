//! Packet-at-a-time dissection engine.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::config::{DispatchPolicy, DissectConfig};
use crate::context::PacketContext;
use crate::dispatch::Dissection;
use crate::error::{ConfigError, DissectError};
use crate::field::FieldTree;
use crate::registry::{Registry, FRAME_DISSECTOR};
use crate::tap::Tap;
use crate::tvb::View;

/// Data source name of the captured frame.
pub const FRAME_SOURCE: &str = "Frame";

/// One captured frame, as handed over by a capture reader.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 1-based frame number.
    pub number: u64,
    /// Link-layer type (pcap LINKTYPE_*), the key into the link table.
    pub link_type: u32,
    pub timestamp_us: Option<i64>,
    pub data: Bytes,
    /// Original length on the wire, if larger than `data`.
    pub reported_len: Option<usize>,
}

impl Frame {
    pub fn new(number: u64, link_type: u32, data: impl Into<Bytes>) -> Self {
        Self {
            number,
            link_type,
            timestamp_us: None,
            data: data.into(),
            reported_len: None,
        }
    }

    pub fn with_timestamp_us(mut self, timestamp_us: i64) -> Self {
        self.timestamp_us = Some(timestamp_us);
        self
    }

    /// Mark the frame as snapped: `len` bytes were on the wire.
    pub fn with_reported_len(mut self, len: usize) -> Self {
        self.reported_len = Some(len);
        self
    }
}

/// Result of dissecting one frame.
#[derive(Debug, Clone)]
pub struct Packet {
    pub context: PacketContext,
    pub tree: FieldTree,
    /// Set when dissection stopped early on a nesting or decompression limit.
    pub aborted: Option<DissectError>,
}

impl Packet {
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Indented text rendering of the field tree.
    pub fn render(&self) -> String {
        self.tree.render()
    }
}

/// Dissects frames against a shared registry and feeds taps.
///
/// The registry is immutable and shared; each thread that dissects packets
/// owns its own engine.
pub struct Engine {
    registry: Arc<Registry>,
    policy: DispatchPolicy,
    taps: Vec<Box<dyn Tap>>,
}

impl Engine {
    /// Engine with the default configuration.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            policy: DispatchPolicy::default(),
            taps: Vec::new(),
        }
    }

    /// Engine with `config`, checked against the registry.
    pub fn with_config(registry: Arc<Registry>, config: &DissectConfig) -> Result<Self, ConfigError> {
        let policy = DispatchPolicy::resolve(&registry, config)?;
        Ok(Self {
            registry,
            policy,
            taps: Vec::new(),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Register a listener for completed packets.
    pub fn add_tap(&mut self, tap: impl Tap + 'static) {
        self.taps.push(Box::new(tap));
    }

    /// Dissect one frame. Never fails: faults end up in the tree.
    pub fn dissect(&mut self, frame: &Frame) -> Packet {
        let captured = frame.data.len();
        let reported = frame.reported_len.unwrap_or(captured).max(captured);
        let view = View::with_reported_length(frame.data.clone(), reported).labelled(FRAME_SOURCE);

        let mut pinfo = PacketContext::new(frame.number, frame.link_type);
        pinfo.timestamp_us = frame.timestamp_us;
        pinfo.add_data_source(FRAME_SOURCE, view.clone());

        let mut cx = Dissection::new(&self.registry, &self.policy, pinfo);
        // An abort is recorded on the dissection itself.
        let _ = cx.call_dissector(FRAME_DISSECTOR, &view, None);
        let (context, tree, aborted) = cx.into_parts();
        debug!(
            frame = frame.number,
            protocols = %context.protocols_string(),
            items = tree.len(),
            aborted = aborted.is_some(),
            "dissected frame"
        );

        for tap in &mut self.taps {
            tap.packet(&context, &tree);
        }
        Packet {
            context,
            tree,
            aborted,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .field("taps", &self.taps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::registry::{dissector_fn, LINK_TABLE};
    use crate::tvb::Endian;

    fn registry() -> Arc<Registry> {
        let mut p = Registry::builder();
        p.register_dissector(
            "two",
            dissector_fn(|view, cx, parent| {
                cx.pinfo.set_protocol("TWO");
                view.get_u16(0, Endian::Big)?;
                let rest = view.subset(2, ..)?;
                Ok(2 + cx.call_raw(&rest, parent)?)
            }),
        )
        .unwrap();
        let mut h = p.into_handoff();
        h.register_in_table(LINK_TABLE, 99u32, "two").unwrap();
        Arc::new(h.build())
    }

    #[test]
    fn test_frame_subtree() {
        let mut engine = Engine::new(registry());
        let frame = Frame::new(3, 99, vec![1, 2, 3, 4, 5]).with_timestamp_us(1_700_000_000_000_000);
        let packet = engine.dissect(&frame);
        assert!(!packet.is_aborted());
        assert_eq!(packet.context.protocol, "TWO");
        assert_eq!(packet.context.protocols_string(), "frame:two:data");
        let tree = &packet.tree;
        assert_eq!(tree.value("frame.number").and_then(|v| v.as_u64()), Some(3));
        assert_eq!(tree.value("frame.len").and_then(|v| v.as_u64()), Some(5));
        assert_eq!(tree.value("data.len").and_then(|v| v.as_u64()), Some(3));
        assert_eq!(
            tree.value("frame.protocols").map(|v| v.to_string()),
            Some("frame:two:data".to_string())
        );
        assert_eq!(packet.context.data_sources()[0].name, FRAME_SOURCE);
    }

    #[test]
    fn test_unknown_link_type_is_raw() {
        let mut engine = Engine::new(registry());
        let packet = engine.dissect(&Frame::new(1, 12345, vec![0xaa; 4]));
        assert_eq!(packet.context.protocols_string(), "frame:data");
    }

    #[test]
    fn test_snapped_frame_reports_truncation() {
        let mut engine = Engine::new(registry());
        let packet = engine.dissect(&Frame::new(1, 99, vec![1]).with_reported_len(60));
        assert_eq!(packet.tree.value("frame.len").and_then(|v| v.as_u64()), Some(60));
        assert_eq!(packet.tree.value("frame.cap_len").and_then(|v| v.as_u64()), Some(1));
        let errors: Vec<_> = packet.tree.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, "Packet size limited during capture");
    }

    #[test]
    fn test_taps_see_every_packet() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut engine = Engine::new(registry());
        let sink = Arc::clone(&seen);
        engine.add_tap(move |context: &PacketContext, tree: &FieldTree| {
            sink.lock().unwrap().push((context.frame_number, tree.len()));
        });
        for n in 1..=3 {
            engine.dissect(&Frame::new(n, 99, vec![0; 4]));
        }
        let seen = seen.lock().unwrap();
        assert_eq!(seen.iter().map(|(n, _)| *n).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(seen.iter().all(|(_, items)| *items > 0));
    }

    #[test]
    fn test_config_is_validated() {
        let config = DissectConfig::default().decode_as("nope", 1u32, "two");
        assert!(Engine::with_config(registry(), &config).is_err());
    }
}
