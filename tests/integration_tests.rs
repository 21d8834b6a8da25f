//! Integration tests for pktdissect.
//!
//! Runs synthetic frames through an engine built from the built-in modules,
//! plus small third-party modules that hook into their tables.

use std::sync::{Arc, Mutex};
use std::thread;

use pktdissect::prelude::*;
use pktdissect::protocol::test_utils::{
    smb2_header, tcp_frame, udp_frame, CompressionTransformBuilder, EthernetBuilder, Ipv4Builder,
    NbssBuilder, UdpBuilder,
};
use pktdissect::protocol::LINKTYPE_ETHERNET;
use pktdissect::{builtin_modules, default_registry};

static HF_FIRST: FieldDef = FieldDef::protocol("first", "First Probe");
static HF_SECOND: FieldDef = FieldDef::protocol("second", "Second Probe");
static HF_PINNED: FieldDef = FieldDef::protocol("pinned", "Pinned");
static HF_PINNED_TAG: FieldDef = FieldDef::new("pinned.tag", "Tag", FieldKind::U8);

/// Two heuristics on UDP that both accept payloads starting with `b'P'`,
/// and an exact dissector reachable only by decode-as.
struct Probes;

impl ProtocolModule for Probes {
    fn register(&self, registry: &mut IdentityPhase) -> Result<(), RegistryError> {
        registry.register_identity("first", "First Probe", &[&HF_FIRST])?;
        registry.register_identity("second", "Second Probe", &[&HF_SECOND])?;
        registry.register_identity("pinned", "Pinned", &[&HF_PINNED, &HF_PINNED_TAG])?;
        registry.register_heuristic_dissector(
            "first",
            heuristic_fn(|view, cx, parent| {
                if view.get_u8(0)? != b'P' {
                    return Ok(Heuristic::NotMine);
                }
                cx.tree.add_item(parent, &HF_FIRST, view, 0, ..)?;
                Ok(Heuristic::Claimed(view.captured_len()))
            }),
        )?;
        registry.register_heuristic_dissector(
            "second",
            heuristic_fn(|view, cx, parent| {
                cx.tree.add_item(parent, &HF_SECOND, view, 0, ..)?;
                cx.pinfo.set_info("second probe ran");
                if view.get_u8(0)? != b'P' {
                    return Ok(Heuristic::NotMine);
                }
                Ok(Heuristic::Claimed(view.captured_len()))
            }),
        )?;
        registry.register_dissector(
            "pinned",
            dissector_fn(|view, cx, parent| {
                let item = cx.tree.add_item(parent, &HF_PINNED, view, 0, 1)?;
                cx.tree.add_item(Some(item), &HF_PINNED_TAG, view, 0, ..)?;
                cx.pinfo.set_protocol("PINNED");
                Ok(1)
            }),
        )?;
        Ok(())
    }

    fn handoff(&self, registry: &mut HandoffPhase) -> Result<(), RegistryError> {
        registry.register_heuristic("udp.port", "first")?;
        registry.register_heuristic("udp.port", "second")
    }
}

fn registry_with_probes() -> Arc<Registry> {
    let mut modules = builtin_modules();
    modules.push(&Probes);
    Arc::new(Registry::from_modules(&modules).unwrap())
}

/// Route `tracing` output through the test harness. `RUST_LOG=debug` shows
/// dispatch decisions.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ethernet(frame: Vec<u8>) -> Frame {
    Frame::new(1, LINKTYPE_ETHERNET, frame)
}

#[test]
fn test_ethertype_ipv4_reaches_udp() -> anyhow::Result<()> {
    init_tracing();
    let mut engine = Engine::new(Arc::new(default_registry()?));
    let packet = engine.dissect(&ethernet(udp_frame(1234, 5678, vec![1, 2, 3])));

    assert_eq!(packet.context.protocols_string(), "frame:eth:ip:udp:data");
    assert_eq!(
        packet.tree.value("eth.type").and_then(|v| v.as_u64()),
        Some(0x0800)
    );
    assert_eq!(
        packet.tree.value("frame.protocols").and_then(|v| v.as_str()),
        Some("frame:eth:ip:udp:data")
    );
    assert!(!packet.is_aborted());
    assert!(packet.tree.errors().next().is_none());
    Ok(())
}

#[test]
fn test_heuristics_run_in_registration_order() {
    let mut engine = Engine::new(registry_with_probes());
    let packet = engine.dissect(&ethernet(udp_frame(40000, 40001, b"PAYLOAD".to_vec())));

    assert_eq!(packet.context.protocols_string(), "frame:eth:ip:udp:first");
    assert!(packet.tree.find("second").is_none());
    assert_ne!(packet.context.info, "second probe ran");
}

#[test]
fn test_declined_heuristics_leave_no_trace() {
    let mut engine = Engine::new(registry_with_probes());
    let packet = engine.dissect(&ethernet(udp_frame(40000, 40001, b"nope".to_vec())));

    assert_eq!(packet.context.protocols_string(), "frame:eth:ip:udp:data");
    assert!(packet.tree.find("first").is_none());
    assert!(packet.tree.find("second").is_none());
    assert_eq!(packet.context.info, "40000 → 40001 Len=4");
}

#[test]
fn test_disabled_heuristic_is_skipped() {
    let config = DissectConfig::default().disable_heuristic("first");
    let mut engine = Engine::with_config(registry_with_probes(), &config).unwrap();
    let packet = engine.dissect(&ethernet(udp_frame(40000, 40001, b"PAYLOAD".to_vec())));

    assert_eq!(packet.context.protocols_string(), "frame:eth:ip:udp:second");
    assert_eq!(packet.context.info, "second probe ran");
}

#[test]
fn test_decode_as_applies_after_exact_miss() -> anyhow::Result<()> {
    init_tracing();
    let config = DissectConfig::default()
        .decode_as("udp.port", 7000u16, "pinned")
        .decode_as("tcp.port", 445u16, "pinned");
    let mut engine = Engine::with_config(registry_with_probes(), &config)?;

    let packet = engine.dissect(&ethernet(udp_frame(40000, 7000, vec![0x2a, 0xff])));
    assert_eq!(packet.context.protocols_string(), "frame:eth:ip:udp:pinned");
    assert_eq!(packet.tree.value("pinned.tag").and_then(|v| v.as_u64()), Some(0x2a));

    // 445 already has an exact entry, so the override never fires.
    let nbss = NbssBuilder::new().payload(smb2_header(0, 1)).build();
    let packet = engine.dissect(&ethernet(tcp_frame(50000, 445, nbss)));
    assert_eq!(packet.context.protocols_string(), "frame:eth:ip:tcp:nbss:smb2");
    Ok(())
}

#[test]
fn test_decode_as_config_is_validated() {
    let registry = registry_with_probes();
    for config in [
        DissectConfig::default().decode_as("no.such.table", 1u16, "pinned"),
        DissectConfig::default().decode_as("udp.port", 1u16, "no_such_dissector"),
        DissectConfig::default().decode_as("udp.port", "text", "pinned"),
        DissectConfig::default().decode_as("udp.port", 1u16, "first"),
        DissectConfig::default().disable_heuristic("pinned"),
        DissectConfig::default().with_max_depth(0),
    ] {
        assert!(Engine::with_config(Arc::clone(&registry), &config).is_err());
    }
}

#[test]
fn test_fault_is_contained_and_trailer_still_decoded() {
    let mut udp = UdpBuilder::new().payload(vec![0; 4]).build();
    udp[4..6].copy_from_slice(&3u16.to_be_bytes());
    let mut ip = Ipv4Builder::new().udp().payload(udp).build();
    ip.extend_from_slice(&[0xee; 10]);
    let frame = EthernetBuilder::new().ipv4().payload(ip).build();

    let mut engine = Engine::new(Arc::new(default_registry().unwrap()));
    let packet = engine.dissect(&ethernet(frame));

    assert!(!packet.is_aborted());
    let errors: Vec<_> = packet.tree.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].name, "Malformed Packet");
    let trailer = packet.tree.find("eth.trailer").unwrap();
    assert_eq!(trailer.range.as_ref().map(|r| r.length), Some(10));
}

#[test]
fn test_snapped_frame_reports_truncation() {
    let frame = udp_frame(1000, 2000, vec![7; 32]);
    let captured = frame[..30].to_vec();
    let mut engine = Engine::new(Arc::new(default_registry().unwrap()));
    let packet = engine.dissect(&ethernet(captured).with_reported_len(frame.len()));

    let errors: Vec<_> = packet.tree.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].name, "Packet size limited during capture");
    assert_eq!(packet.tree.value("frame.len").and_then(|v| v.as_u64()), Some(frame.len() as u64));
    assert_eq!(packet.tree.value("frame.cap_len").and_then(|v| v.as_u64()), Some(30));
}

#[test]
fn test_dissection_is_deterministic() {
    let message = smb2_header(9, 3);
    let transform = CompressionTransformBuilder::new(&message)
        .algorithm(2)
        .uncompressed_prefix(8)
        .build();
    let frame = tcp_frame(50000, 445, NbssBuilder::new().payload(transform).build());

    let registry = Arc::new(default_registry().unwrap());
    let first = Engine::new(Arc::clone(&registry)).dissect(&ethernet(frame.clone()));
    let second = Engine::new(registry).dissect(&ethernet(frame));
    assert_eq!(first.render(), second.render());
    assert_eq!(first.context.protocols_string(), second.context.protocols_string());
    assert_eq!(first.context.info, second.context.info);
}

/// Each level wraps the previous message in another compression transform.
fn nested_transforms(levels: usize) -> Vec<u8> {
    let mut message = smb2_header(8, 1);
    for _ in 0..levels {
        message = CompressionTransformBuilder::new(&message).algorithm(1).build();
    }
    message
}

#[test]
fn test_nested_compression_hits_recursion_limit() {
    init_tracing();
    let config = DissectConfig::default().with_max_depth(16);
    let mut engine = Engine::with_config(Arc::new(default_registry().unwrap()), &config).unwrap();
    let nbss = NbssBuilder::new().payload(nested_transforms(30)).build();
    let packet = engine.dissect(&ethernet(tcp_frame(50000, 445, nbss)));

    assert_eq!(
        packet.aborted,
        Some(DissectError::RecursionLimitExceeded { limit: 16 })
    );
    let errors: Vec<_> = packet.tree.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].name, "Dissection aborted: nesting too deep");
    assert!(packet.tree.find("smb2").is_none());
}

#[test]
fn test_shallow_nesting_decodes_fully() {
    let mut engine = Engine::new(Arc::new(default_registry().unwrap()));
    let nbss = NbssBuilder::new().payload(nested_transforms(5)).build();
    let packet = engine.dissect(&ethernet(tcp_frame(50000, 445, nbss)));

    assert!(!packet.is_aborted());
    assert_eq!(packet.tree.find_all("smb2.comp").count(), 5);
    assert_eq!(packet.context.info, "Read Request");
    // Frame plus one buffer per decompression.
    assert_eq!(packet.context.data_sources().len(), 6);
}

#[test]
fn test_decompression_bomb_hits_budget() {
    init_tracing();
    let zeros = vec![0u8; 1024 * 1024];
    let transform = CompressionTransformBuilder::new(&zeros).algorithm(1).build();
    assert!(transform.len() < 16 * 1024);

    let config = DissectConfig::default().with_max_decompressed_bytes(64 * 1024);
    let mut engine = Engine::with_config(Arc::new(default_registry().unwrap()), &config).unwrap();
    let nbss = NbssBuilder::new().payload(transform).build();
    let packet = engine.dissect(&ethernet(tcp_frame(50000, 445, nbss)));

    match &packet.aborted {
        Some(DissectError::OutputSizeLimitExceeded { limit, requested }) => {
            assert_eq!(*limit, 64 * 1024);
            assert!(*requested > *limit);
        }
        other => panic!("expected budget abort, got {other:?}"),
    }
    assert_eq!(packet.context.data_sources().len(), 1);
}

#[test]
fn test_budget_spans_every_decompression_in_a_packet() {
    // Two PDUs of 40 KiB each: the second one crosses a 64 KiB budget.
    let payload = vec![b'A'; 40 * 1024];
    let pdu = NbssBuilder::new()
        .payload(CompressionTransformBuilder::new(&payload).algorithm(2).build())
        .build();
    let mut segment = pdu.clone();
    segment.extend(pdu);

    let config = DissectConfig::default().with_max_decompressed_bytes(64 * 1024);
    let mut engine = Engine::with_config(Arc::new(default_registry().unwrap()), &config).unwrap();
    let packet = engine.dissect(&ethernet(tcp_frame(50000, 445, segment)));

    assert!(matches!(
        packet.aborted,
        Some(DissectError::OutputSizeLimitExceeded { .. })
    ));
    // The first PDU was decompressed before the budget ran out.
    assert_eq!(packet.context.data_sources().len(), 2);

    // The budget is per packet: the next packet starts from zero.
    let next = engine.dissect(&ethernet(tcp_frame(
        50000,
        445,
        NbssBuilder::new()
            .payload(CompressionTransformBuilder::new(&payload).algorithm(2).build())
            .build(),
    )));
    assert!(!next.is_aborted());
}

#[test]
fn test_taps_see_every_packet() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut engine = Engine::new(Arc::new(default_registry().unwrap()));
    let sink = Arc::clone(&seen);
    engine.add_tap(move |context: &PacketContext, tree: &FieldTree| {
        sink.lock()
            .unwrap()
            .push((context.frame_number, context.protocols_string(), tree.len()));
    });

    for number in 1..=3 {
        let frame = Frame::new(number, LINKTYPE_ETHERNET, udp_frame(1, 2, vec![0; 4]));
        engine.dissect(&frame);
    }
    // Unknown link type still reaches the tap.
    engine.dissect(&Frame::new(4, 9999, vec![1, 2, 3]));

    let seen = seen.lock().unwrap();
    let numbers: Vec<_> = seen.iter().map(|(n, _, _)| *n).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(seen[0].1, "frame:eth:ip:udp:data");
    assert_eq!(seen[3].1, "frame:data");
    assert!(seen.iter().all(|(_, _, items)| *items > 0));
}

#[test]
fn test_shared_registry_across_threads() {
    let registry = registry_with_probes();
    let frames: Vec<Vec<u8>> = vec![
        udp_frame(40000, 40001, b"PAYLOAD".to_vec()),
        tcp_frame(
            50000,
            445,
            NbssBuilder::new()
                .payload(CompressionTransformBuilder::new(&smb2_header(3, 9)).build())
                .build(),
        ),
        udp_frame(53, 40000, vec![0; 12]),
    ];
    let expected: Vec<String> = {
        let mut engine = Engine::new(Arc::clone(&registry));
        frames
            .iter()
            .map(|f| engine.dissect(&ethernet(f.clone())).render())
            .collect()
    };

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let frames = frames.clone();
            thread::spawn(move || {
                let mut engine = Engine::new(registry);
                frames
                    .iter()
                    .map(|f| engine.dissect(&ethernet(f.clone())).render())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[cfg(feature = "serde")]
#[test]
fn test_config_from_toml() -> anyhow::Result<()> {
    init_tracing();
    let config = DissectConfig::from_toml_str(
        r#"
        max_depth = 32
        disabled_heuristics = ["first"]

        [[decode_as]]
        table = "udp.port"
        key = 7000
        dissector = "pinned"
        "#,
    )?;
    let mut engine = Engine::with_config(registry_with_probes(), &config)?;
    let packet = engine.dissect(&ethernet(udp_frame(40000, 7000, vec![1])));
    assert_eq!(packet.context.protocols_string(), "frame:eth:ip:udp:pinned");
    assert_eq!(engine.policy().max_depth, 32);
    Ok(())
}
