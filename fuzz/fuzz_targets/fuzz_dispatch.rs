//! Fuzz target for full-frame dissection.
//!
//! Runs arbitrary bytes through every built-in module as an Ethernet frame,
//! and again as the payload of a TCP segment to port 445 so the SMB2
//! compression path sees hostile input. Dissection must never panic.

#![no_main]

use std::sync::{Arc, OnceLock};

use libfuzzer_sys::fuzz_target;
use pktdissect::prelude::*;
use pktdissect::protocol::test_utils::tcp_frame;
use pktdissect::protocol::LINKTYPE_ETHERNET;

fn registry() -> Arc<Registry> {
    static REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| Arc::new(pktdissect::default_registry().expect("built-in registry")))
        .clone()
}

fuzz_target!(|data: &[u8]| {
    let config = DissectConfig::default()
        .with_max_depth(32)
        .with_max_decompressed_bytes(4 * 1024 * 1024);
    let mut engine = Engine::with_config(registry(), &config).expect("valid config");

    let packet = engine.dissect(&Frame::new(1, LINKTYPE_ETHERNET, data.to_vec()));
    let _ = packet.render();

    let packet = engine.dissect(&Frame::new(2, LINKTYPE_ETHERNET, tcp_frame(50000, 445, data.to_vec())));
    assert!(packet.context.layers().next() == Some("frame"));
});
