//! Per-packet dissection state.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::format::format_mac;
use crate::tvb::View;

/// Hint entry passed between layers: (hint_name, value).
pub type HintEntry = (&'static str, u64);

/// A source or destination address recorded by a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    Ether([u8; 6]),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ether(mac) => f.write_str(&format_mac(mac).unwrap_or_default()),
            Address::Ipv4(ip) => write!(f, "{ip}"),
            Address::Ipv6(ip) => write!(f, "{ip}"),
        }
    }
}

/// A named buffer shown alongside the packet (the frame itself, or
/// decompressed payloads).
#[derive(Debug, Clone)]
pub struct DataSource {
    pub name: CompactString,
    pub view: View,
}

/// State carried through every dissector for one packet.
///
/// Lower layers fill in addresses, ports and hints for upper layers; every
/// layer may update the summary columns. A heuristic dissector that declines
/// has its changes here rolled back.
#[derive(Debug, Clone)]
pub struct PacketContext {
    /// 1-based frame number.
    pub frame_number: u64,

    /// Link-layer type from the capture header (e.g., 1 = Ethernet).
    pub link_type: u32,

    /// Capture timestamp in microseconds since the epoch.
    pub timestamp_us: Option<i64>,

    /// Protocol column (top-most protocol so far).
    pub protocol: CompactString,

    /// Info column.
    pub info: String,

    /// Link-layer addresses.
    pub dl_src: Option<Address>,
    pub dl_dst: Option<Address>,

    /// Network-layer addresses.
    pub net_src: Option<Address>,
    pub net_dst: Option<Address>,

    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,

    /// Protocol-specific hints (e.g., ethertype, IP protocol number).
    /// Typically 2-4 entries.
    pub hints: SmallVec<[HintEntry; 4]>,

    layers: SmallVec<[CompactString; 8]>,

    data_sources: Vec<DataSource>,
}

impl PacketContext {
    pub fn new(frame_number: u64, link_type: u32) -> Self {
        Self {
            frame_number,
            link_type,
            timestamp_us: None,
            protocol: CompactString::default(),
            info: String::new(),
            dl_src: None,
            dl_dst: None,
            net_src: None,
            net_dst: None,
            src_port: None,
            dst_port: None,
            hints: SmallVec::new(),
            layers: SmallVec::new(),
            data_sources: Vec::new(),
        }
    }

    /// Set the protocol column.
    pub fn set_protocol(&mut self, protocol: &str) {
        self.protocol = CompactString::new(protocol);
    }

    /// Replace the info column.
    pub fn set_info(&mut self, info: impl Into<String>) {
        self.info = info.into();
    }

    /// Append to the info column, separated by a space.
    pub fn append_info(&mut self, text: &str) {
        if !self.info.is_empty() {
            self.info.push(' ');
        }
        self.info.push_str(text);
    }

    pub fn set_ports(&mut self, src: u16, dst: u16) {
        self.src_port = Some(src);
        self.dst_port = Some(dst);
    }

    /// Get a hint value by key (linear search, but N is small).
    #[inline]
    pub fn hint(&self, key: &str) -> Option<u64> {
        self.hints.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Set a hint value (updates existing or appends).
    #[inline]
    pub fn set_hint(&mut self, key: &'static str, value: u64) {
        if let Some(entry) = self.hints.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.hints.push((key, value));
        }
    }

    #[inline]
    pub fn clear_hints(&mut self) {
        self.hints.clear();
    }

    /// Dissectors entered so far, outermost first.
    pub fn layers(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|l| l.as_str())
    }

    /// Colon-separated protocol stack, e.g. "frame:eth:ipv4:udp:data".
    pub fn protocols_string(&self) -> String {
        let mut out = String::new();
        for (i, layer) in self.layers.iter().enumerate() {
            if i > 0 {
                out.push(':');
            }
            out.push_str(layer);
        }
        out
    }

    pub(crate) fn push_layer(&mut self, name: &str) {
        self.layers.push(CompactString::new(name));
    }

    /// Register a buffer to show alongside the packet.
    pub fn add_data_source(&mut self, name: &str, view: View) {
        self.data_sources.push(DataSource {
            name: CompactString::new(name),
            view,
        });
    }

    pub fn data_sources(&self) -> &[DataSource] {
        &self.data_sources
    }
}
