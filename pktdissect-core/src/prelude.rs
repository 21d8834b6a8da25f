//! Convenient re-exports for common usage.
//!
//! Everything a protocol module needs to declare fields, register
//! dissectors and read views, in one `use` statement.
//!
//! # Example
//!
//! ```rust
//! use pktdissect_core::prelude::*;
//!
//! let registry = Registry::builder().into_handoff().build();
//! assert!(registry.dissector(RAW_DISSECTOR).is_some());
//! ```

// Buffers
pub use crate::tvb::{ByteSource, Endian, Extent, StrEncoding, View};

// Decompression
pub use crate::decompress::Algorithm;

// Fields
pub use crate::field::{Base, FieldDef, FieldId, FieldKind, FieldTree, FieldValue};

// Registration and dispatch
pub use crate::dispatch::Dissection;
pub use crate::registry::{
    dissector_fn, heuristic_fn, Dissector, HandoffPhase, Heuristic, HeuristicDissector,
    IdentityPhase, KeyType, ProtocolModule, Registry, TableKey, FRAME_DISSECTOR, LINK_TABLE,
    RAW_DISSECTOR,
};

// Packets
pub use crate::config::DissectConfig;
pub use crate::context::{Address, PacketContext};
pub use crate::engine::{Engine, Frame, Packet};
pub use crate::tap::Tap;

// Error types
pub use crate::error::{DissectError, RegistryError};
