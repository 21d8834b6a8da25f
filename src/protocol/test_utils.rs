//! Test utilities for protocol dissection.
//!
//! Provides builders for constructing test packets and a helper that runs
//! them through an engine with the built-in protocols.

use std::sync::Arc;

use pktdissect_core::prelude::*;

use super::{ethertype, ip_proto, LINKTYPE_ETHERNET, SMB2_COMPRESSION_MAGIC, SMB2_MAGIC};
use crate::default_registry;

/// Dissect one Ethernet frame with the default registry and configuration.
pub fn dissect(frame: &[u8]) -> Packet {
    let registry = default_registry().expect("built-in protocols register cleanly");
    let mut engine = Engine::new(Arc::new(registry));
    engine.dissect(&Frame::new(1, LINKTYPE_ETHERNET, frame.to_vec()))
}

/// Ethernet + IPv4 + TCP around `payload`.
pub fn tcp_frame(src_port: u16, dst_port: u16, payload: Vec<u8>) -> Vec<u8> {
    let tcp = TcpBuilder::new()
        .src_port(src_port)
        .dst_port(dst_port)
        .psh_ack()
        .payload(payload)
        .build();
    let ip = Ipv4Builder::new().tcp().payload(tcp).build();
    EthernetBuilder::new().ipv4().payload(ip).build()
}

/// Ethernet + IPv4 + UDP around `payload`.
pub fn udp_frame(src_port: u16, dst_port: u16, payload: Vec<u8>) -> Vec<u8> {
    let udp = UdpBuilder::new()
        .src_port(src_port)
        .dst_port(dst_port)
        .payload(payload)
        .build();
    let ip = Ipv4Builder::new().udp().payload(udp).build();
    EthernetBuilder::new().ipv4().payload(ip).build()
}

/// Builder for constructing Ethernet frames.
#[derive(Debug, Clone)]
pub struct EthernetBuilder {
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    ethertype: u16,
    payload: Vec<u8>,
}

impl Default for EthernetBuilder {
    fn default() -> Self {
        Self {
            src_mac: [0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
            dst_mac: [0xff, 0xff, 0xff, 0xff, 0xff, 0xff],
            ethertype: ethertype::IPV4,
            payload: Vec::new(),
        }
    }
}

impl EthernetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_mac(mut self, mac: [u8; 6]) -> Self {
        self.src_mac = mac;
        self
    }

    pub fn dst_mac(mut self, mac: [u8; 6]) -> Self {
        self.dst_mac = mac;
        self
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.ethertype = ethertype;
        self
    }

    pub fn ipv4(self) -> Self {
        self.ethertype(ethertype::IPV4)
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(14 + self.payload.len());
        frame.extend_from_slice(&self.dst_mac);
        frame.extend_from_slice(&self.src_mac);
        frame.extend_from_slice(&self.ethertype.to_be_bytes());
        frame.extend_from_slice(&self.payload);
        frame
    }
}

/// Builder for an 802.1Q tag and what follows it.
#[derive(Debug, Clone)]
pub struct VlanBuilder {
    priority: u8,
    dei: bool,
    id: u16,
    ethertype: u16,
    payload: Vec<u8>,
}

impl Default for VlanBuilder {
    fn default() -> Self {
        Self {
            priority: 0,
            dei: false,
            id: 1,
            ethertype: ethertype::IPV4,
            payload: Vec::new(),
        }
    }
}

impl VlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority & 0x07;
        self
    }

    pub fn dei(mut self) -> Self {
        self.dei = true;
        self
    }

    pub fn id(mut self, id: u16) -> Self {
        self.id = id & 0x0FFF;
        self
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.ethertype = ethertype;
        self
    }

    pub fn ipv4(self) -> Self {
        self.ethertype(ethertype::IPV4)
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let tci = (u16::from(self.priority) << 13) | (u16::from(self.dei) << 12) | self.id;
        let mut tag = Vec::with_capacity(4 + self.payload.len());
        tag.extend_from_slice(&tci.to_be_bytes());
        tag.extend_from_slice(&self.ethertype.to_be_bytes());
        tag.extend_from_slice(&self.payload);
        tag
    }
}

/// Builder for constructing IPv4 headers.
#[derive(Debug, Clone)]
pub struct Ipv4Builder {
    version_ihl: u8,
    dscp_ecn: u8,
    identification: u16,
    flags_fragment: u16,
    ttl: u8,
    protocol: u8,
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
    payload: Vec<u8>,
}

impl Default for Ipv4Builder {
    fn default() -> Self {
        Self {
            version_ihl: 0x45, // Version 4, IHL 5 (20 bytes)
            dscp_ecn: 0x00,
            identification: 0x0001,
            flags_fragment: 0x0000,
            ttl: 64,
            protocol: ip_proto::TCP,
            src_ip: [192, 168, 1, 1],
            dst_ip: [192, 168, 1, 2],
            payload: Vec::new(),
        }
    }
}

impl Ipv4Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn tcp(self) -> Self {
        self.protocol(ip_proto::TCP)
    }

    pub fn udp(self) -> Self {
        self.protocol(ip_proto::UDP)
    }

    pub fn src_ip(mut self, ip: [u8; 4]) -> Self {
        self.src_ip = ip;
        self
    }

    pub fn dst_ip(mut self, ip: [u8; 4]) -> Self {
        self.dst_ip = ip;
        self
    }

    pub fn more_fragments(mut self) -> Self {
        self.flags_fragment |= 0x2000;
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let total_length = (20 + self.payload.len()) as u16;
        let mut packet = Vec::with_capacity(20 + self.payload.len());
        packet.push(self.version_ihl);
        packet.push(self.dscp_ecn);
        packet.extend_from_slice(&total_length.to_be_bytes());
        packet.extend_from_slice(&self.identification.to_be_bytes());
        packet.extend_from_slice(&self.flags_fragment.to_be_bytes());
        packet.push(self.ttl);
        packet.push(self.protocol);
        packet.extend_from_slice(&[0x00, 0x00]); // Checksum (not validated)
        packet.extend_from_slice(&self.src_ip);
        packet.extend_from_slice(&self.dst_ip);
        packet.extend_from_slice(&self.payload);
        packet
    }
}

/// Builder for constructing TCP segments without options.
#[derive(Debug, Clone)]
pub struct TcpBuilder {
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ack: u32,
    flags: u8,
    window: u16,
    payload: Vec<u8>,
}

impl Default for TcpBuilder {
    fn default() -> Self {
        Self {
            src_port: 12345,
            dst_port: 80,
            seq: 1,
            ack: 0,
            flags: 0x02, // SYN
            window: 65535,
            payload: Vec::new(),
        }
    }
}

impl TcpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn ack_num(mut self, ack: u32) -> Self {
        self.ack = ack;
        self
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn syn(self) -> Self {
        self.flags(0x02)
    }

    pub fn ack(self) -> Self {
        self.flags(0x10)
    }

    pub fn psh_ack(self) -> Self {
        self.flags(0x18)
    }

    pub fn window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut segment = Vec::with_capacity(20 + self.payload.len());
        segment.extend_from_slice(&self.src_port.to_be_bytes());
        segment.extend_from_slice(&self.dst_port.to_be_bytes());
        segment.extend_from_slice(&self.seq.to_be_bytes());
        segment.extend_from_slice(&self.ack.to_be_bytes());
        segment.push(0x50); // Data offset 5, no options
        segment.push(self.flags);
        segment.extend_from_slice(&self.window.to_be_bytes());
        segment.extend_from_slice(&[0x00, 0x00]); // Checksum
        segment.extend_from_slice(&[0x00, 0x00]); // Urgent pointer
        segment.extend_from_slice(&self.payload);
        segment
    }
}

/// Builder for constructing UDP datagrams.
#[derive(Debug, Clone)]
pub struct UdpBuilder {
    src_port: u16,
    dst_port: u16,
    payload: Vec<u8>,
}

impl Default for UdpBuilder {
    fn default() -> Self {
        Self {
            src_port: 12345,
            dst_port: 53,
            payload: Vec::new(),
        }
    }
}

impl UdpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let length = (8 + self.payload.len()) as u16;
        let mut datagram = Vec::with_capacity(8 + self.payload.len());
        datagram.extend_from_slice(&self.src_port.to_be_bytes());
        datagram.extend_from_slice(&self.dst_port.to_be_bytes());
        datagram.extend_from_slice(&length.to_be_bytes());
        datagram.extend_from_slice(&[0x00, 0x00]); // Checksum
        datagram.extend_from_slice(&self.payload);
        datagram
    }
}

/// Builder for a NetBIOS session service PDU.
#[derive(Debug, Clone, Default)]
pub struct NbssBuilder {
    message_type: u8,
    payload: Vec<u8>,
}

impl NbssBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_type(mut self, message_type: u8) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let length = self.payload.len() as u32;
        let mut pdu = Vec::with_capacity(4 + self.payload.len());
        pdu.push(self.message_type);
        pdu.extend_from_slice(&length.to_be_bytes()[1..]);
        pdu.extend_from_slice(&self.payload);
        pdu
    }
}

/// A 64-byte SMB2 request header for `command`.
pub fn smb2_header(command: u16, message_id: u64) -> Vec<u8> {
    let mut header = vec![0u8; 64];
    header[0..4].copy_from_slice(&SMB2_MAGIC);
    header[4..6].copy_from_slice(&64u16.to_le_bytes());
    header[6..8].copy_from_slice(&1u16.to_le_bytes()); // Credit charge
    header[12..14].copy_from_slice(&command.to_le_bytes());
    header[24..32].copy_from_slice(&message_id.to_le_bytes());
    header[40..48].copy_from_slice(&0x0000_0400_0000_0011u64.to_le_bytes());
    header
}

/// Builder for an SMB2 compression transform wrapping `message`.
///
/// The first `prefix` bytes of the message are carried uncompressed; the
/// rest is compressed with the chosen algorithm.
#[derive(Debug, Clone)]
pub struct CompressionTransformBuilder {
    message: Vec<u8>,
    algorithm: u16,
    flags: u16,
    prefix: usize,
}

impl CompressionTransformBuilder {
    pub fn new(message: &[u8]) -> Self {
        Self {
            message: message.to_vec(),
            algorithm: 1,
            flags: 0,
            prefix: 0,
        }
    }

    /// Wire algorithm id (1 = LZNT1, 2 = LZ77).
    pub fn algorithm(mut self, algorithm: u16) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn uncompressed_prefix(mut self, prefix: usize) -> Self {
        self.prefix = prefix.min(self.message.len());
        self
    }

    pub fn build(self) -> Vec<u8> {
        let (head, tail) = self.message.split_at(self.prefix);
        let compressed = match self.algorithm {
            1 => Algorithm::Lznt1.compress(tail),
            2 => Algorithm::Lz77.compress(tail),
            _ => tail.to_vec(),
        };
        let mut out = Vec::with_capacity(16 + head.len() + compressed.len());
        out.extend_from_slice(&SMB2_COMPRESSION_MAGIC);
        out.extend_from_slice(&(tail.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.algorithm.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&(head.len() as u32).to_le_bytes());
        out.extend_from_slice(head);
        out.extend_from_slice(&compressed);
        out
    }
}
