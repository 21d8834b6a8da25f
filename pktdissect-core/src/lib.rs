//! # pktdissect-core
//!
//! Protocol-agnostic packet dissection core.
//!
//! This crate provides the buffer, decompression and dispatch machinery a
//! protocol dissector is built on, without any protocol knowledge beyond the
//! frame wrapper and a raw-bytes fallback. Protocol modules register into a
//! [`Registry`]; an [`Engine`] runs each captured frame through it and yields
//! a [`FieldTree`].
//!
//! ## Features
//!
//! - **Views**: bounds-checked, endian-aware windows over packet bytes that
//!   can be subset, stitched together from several buffers, or produced by
//!   decompression, each keeping its ancestry alive
//! - **Decompression**: MS-XCA Plain LZ77 and LZNT1 decoders (and encoders)
//! - **Two-phase registration**: identities first, table handoffs second, so
//!   modules can refer to each other in any order
//! - **Fault containment**: a malformed layer is annotated in the tree and
//!   its siblings still decode; nesting and decompression limits abort only
//!   the packet that trips them
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use pktdissect_core::prelude::*;
//!
//! static HF_ECHO: FieldDef = FieldDef::protocol("echo", "Echo");
//! static HF_ECHO_ID: FieldDef = FieldDef::new("echo.id", "ID", FieldKind::u16(Endian::Big));
//!
//! let mut identity = Registry::builder();
//! identity.register_identity("echo", "Echo", &[&HF_ECHO, &HF_ECHO_ID]).unwrap();
//! identity
//!     .register_dissector(
//!         "echo",
//!         dissector_fn(|view, cx, parent| {
//!             let item = cx.tree.add_item(parent, &HF_ECHO, view, 0, 2)?;
//!             cx.tree.add_item(Some(item), &HF_ECHO_ID, view, 0, 2)?;
//!             let payload = view.subset(2, ..)?;
//!             Ok(2 + cx.call_raw(&payload, parent)?)
//!         }),
//!     )
//!     .unwrap();
//! let mut handoff = identity.into_handoff();
//! handoff.register_in_table(LINK_TABLE, 147u32, "echo").unwrap();
//! let registry = Arc::new(handoff.build());
//!
//! let mut engine = Engine::new(registry);
//! let packet = engine.dissect(&Frame::new(1, 147, vec![0x12, 0x34, 0xde, 0xad]));
//!
//! assert_eq!(packet.context.protocols_string(), "frame:echo:data");
//! assert_eq!(packet.tree.value("echo.id").and_then(|v| v.as_u64()), Some(0x1234));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        pktdissect-core                              |
//! +---------------------------------------------------------------------+
//! |  tvb/        - ByteSource, View (subset, composite, decompressed)   |
//! |  decompress/ - LZ77 and LZNT1 codecs                                |
//! |  field/      - FieldDef, FieldKind, FieldValue, FieldTree           |
//! |  registry/   - two-phase builder, dissector tables, heuristics      |
//! |  dispatch    - per-packet call chain, containment, limits           |
//! |  context     - PacketContext (columns, addresses, layers)           |
//! |  engine, tap - frame entry point and packet listeners               |
//! |  config      - DissectConfig (limits, decode-as, heuristics)        |
//! |  format/     - Address formatting utilities                         |
//! |  error       - Error types                                          |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Crate Features
//!
//! - `serde` - Deserialize [`DissectConfig`] and load it from TOML

pub mod config;
pub mod context;
pub mod decompress;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod field;
pub mod format;
pub mod prelude;
pub mod registry;
pub mod tap;
pub mod tvb;

// Re-export commonly used types at crate root for convenience
pub use config::{DecodeAs, DispatchPolicy, DissectConfig};
pub use context::{Address, DataSource, PacketContext};
pub use decompress::{Algorithm, Decompressed};
pub use dispatch::Dissection;
pub use engine::{Engine, Frame, Packet};
pub use error::{
    BoundsFault, CompositeError, ConfigError, DecompressError, DissectError, Error, FaultKind,
    RegistryError, Result,
};
pub use field::{Base, Field, FieldDef, FieldId, FieldKind, FieldTree, FieldValue};
pub use format::{format_hex, format_ipv4, format_ipv6, format_mac};
pub use registry::{
    dissector_fn, heuristic_fn, Dissector, DissectorHandle, DissectorTable, HandoffPhase,
    Heuristic, HeuristicDissector, IdentityPhase, KeyType, ProtocolModule, Registry, TableKey,
    FRAME_DISSECTOR, LINK_TABLE, RAW_DISSECTOR,
};
pub use tap::Tap;
pub use tvb::{ByteSource, Endian, Extent, StrEncoding, View};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
