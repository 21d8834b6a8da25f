//! Dissector registry.
//!
//! Registration happens in two phases, enforced by the type system:
//!
//! 1. **Identity** ([`IdentityPhase`]): every module declares its protocol,
//!    fields, dissectors, dissector tables and heuristic lists.
//! 2. **Handoff** ([`HandoffPhase`]): modules attach their dissectors to
//!    tables and heuristic lists owned by other modules. All identities are
//!    known by now, so handoffs can be resolved regardless of module order.
//!
//! The result is an immutable [`Registry`] that can be shared across threads.
//!
//! ```rust
//! use pktdissect_core::prelude::*;
//!
//! let mut identity = Registry::builder();
//! identity.new_dissector_table("demo.port", "Demo port", KeyType::UInt).unwrap();
//! identity
//!     .register_dissector("demo", dissector_fn(|view, _cx, _parent| Ok(view.captured_len())))
//!     .unwrap();
//!
//! let mut handoff = identity.into_handoff();
//! handoff.register_in_table("demo.port", 7u32, "demo").unwrap();
//! let registry = handoff.build();
//!
//! assert!(registry.table("demo.port").unwrap().lookup(&TableKey::UInt(7)).is_some());
//! ```

mod builder;
mod builtin;
mod table;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub use builder::{HandoffPhase, IdentityPhase};
pub use table::{DissectorTable, KeyType, TableKey};

use crate::dispatch::Dissection;
use crate::error::{DissectError, RegistryError};
use crate::field::{FieldDef, FieldId};
use crate::tvb::View;

/// Name of the built-in raw-bytes dissector.
pub const RAW_DISSECTOR: &str = "data";

/// Name of the built-in frame dissector that starts every packet.
pub const FRAME_DISSECTOR: &str = "frame";

/// Built-in table keyed by capture link-layer type.
pub const LINK_TABLE: &str = "wtap_encap";

/// Decodes a protocol layer.
pub trait Dissector: Send + Sync {
    /// Decode `view`, adding items under `parent`. Returns the number of
    /// bytes consumed.
    fn dissect(
        &self,
        view: &View,
        cx: &mut Dissection<'_>,
        parent: Option<FieldId>,
    ) -> Result<usize, DissectError>;
}

impl<F> Dissector for F
where
    F: Fn(&View, &mut Dissection<'_>, Option<FieldId>) -> Result<usize, DissectError> + Send + Sync,
{
    fn dissect(
        &self,
        view: &View,
        cx: &mut Dissection<'_>,
        parent: Option<FieldId>,
    ) -> Result<usize, DissectError> {
        self(view, cx, parent)
    }
}

/// Pin a closure to the [`Dissector`] signature so its argument types are inferred.
pub fn dissector_fn<F>(f: F) -> F
where
    F: Fn(&View, &mut Dissection<'_>, Option<FieldId>) -> Result<usize, DissectError> + Send + Sync,
{
    f
}

/// Pin a closure to the [`HeuristicDissector`] signature.
pub fn heuristic_fn<F>(f: F) -> F
where
    F: Fn(&View, &mut Dissection<'_>, Option<FieldId>) -> Result<Heuristic, DissectError>
        + Send
        + Sync,
{
    f
}

/// Outcome of a heuristic probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heuristic {
    /// The payload is this protocol; the given number of bytes were consumed.
    Claimed(usize),
    /// The payload is not this protocol. Anything the probe added is discarded.
    NotMine,
}

/// A dissector that inspects a payload to decide whether it applies.
pub trait HeuristicDissector: Send + Sync {
    fn dissect_heuristic(
        &self,
        view: &View,
        cx: &mut Dissection<'_>,
        parent: Option<FieldId>,
    ) -> Result<Heuristic, DissectError>;
}

impl<F> HeuristicDissector for F
where
    F: Fn(&View, &mut Dissection<'_>, Option<FieldId>) -> Result<Heuristic, DissectError>
        + Send
        + Sync,
{
    fn dissect_heuristic(
        &self,
        view: &View,
        cx: &mut Dissection<'_>,
        parent: Option<FieldId>,
    ) -> Result<Heuristic, DissectError> {
        self(view, cx, parent)
    }
}

/// A protocol implementation that registers itself in both phases.
pub trait ProtocolModule {
    /// Declare protocol identity, fields, dissectors and owned tables.
    fn register(&self, registry: &mut IdentityPhase) -> Result<(), RegistryError>;

    /// Attach dissectors to tables owned by other modules.
    fn handoff(&self, _registry: &mut HandoffPhase) -> Result<(), RegistryError> {
        Ok(())
    }
}

/// Handle to a registered dissector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DissectorHandle(usize);

#[derive(Clone)]
pub(crate) enum DissectorKind {
    Exact(Arc<dyn Dissector>),
    Heuristic(Arc<dyn HeuristicDissector>),
}

#[derive(Clone)]
pub(crate) struct DissectorEntry {
    pub(crate) name: String,
    pub(crate) kind: DissectorKind,
}

/// A registered protocol identity.
#[derive(Debug, Clone)]
pub struct ProtocolInfo {
    pub name: String,
    pub display_name: String,
    pub fields: Vec<&'static FieldDef>,
}

/// Immutable set of protocols, dissectors and tables.
pub struct Registry {
    dissectors: Vec<DissectorEntry>,
    by_name: HashMap<String, DissectorHandle>,
    protocols: BTreeMap<String, ProtocolInfo>,
    fields: HashMap<&'static str, &'static FieldDef>,
    tables: BTreeMap<String, DissectorTable>,
}

impl Registry {
    /// Start building a registry. The built-in frame and raw-data
    /// dissectors and the link-type table are already present.
    pub fn builder() -> IdentityPhase {
        IdentityPhase::new()
    }

    /// Build a registry from modules, running every identity phase before
    /// any handoff phase.
    pub fn from_modules(modules: &[&dyn ProtocolModule]) -> Result<Self, RegistryError> {
        let mut identity = Self::builder();
        for module in modules {
            module.register(&mut identity)?;
        }
        let mut handoff = identity.into_handoff();
        for module in modules {
            module.handoff(&mut handoff)?;
        }
        Ok(handoff.build())
    }

    fn empty() -> Self {
        Self {
            dissectors: Vec::new(),
            by_name: HashMap::new(),
            protocols: BTreeMap::new(),
            fields: HashMap::new(),
            tables: BTreeMap::new(),
        }
    }

    pub fn dissector(&self, name: &str) -> Option<DissectorHandle> {
        self.by_name.get(name).copied()
    }

    pub fn dissector_name(&self, handle: DissectorHandle) -> &str {
        &self.dissectors[handle.0].name
    }

    pub fn is_heuristic(&self, handle: DissectorHandle) -> bool {
        matches!(self.dissectors[handle.0].kind, DissectorKind::Heuristic(_))
    }

    /// Number of registered dissectors (including built-ins).
    pub fn dissector_count(&self) -> usize {
        self.dissectors.len()
    }

    pub fn table(&self, name: &str) -> Option<&DissectorTable> {
        self.tables.get(name)
    }

    /// All tables, ordered by name.
    pub fn tables(&self) -> impl Iterator<Item = &DissectorTable> {
        self.tables.values()
    }

    /// Look up a field definition by abbreviation.
    pub fn field(&self, abbrev: &str) -> Option<&'static FieldDef> {
        self.fields.get(abbrev).copied()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn protocol(&self, name: &str) -> Option<&ProtocolInfo> {
        self.protocols.get(name)
    }

    /// All protocols, ordered by name.
    pub fn protocols(&self) -> impl Iterator<Item = &ProtocolInfo> {
        self.protocols.values()
    }

    pub(crate) fn entry(&self, handle: DissectorHandle) -> &DissectorEntry {
        &self.dissectors[handle.0]
    }

    pub(crate) fn raw_handle(&self) -> DissectorHandle {
        self.by_name
            .get(RAW_DISSECTOR)
            .copied()
            .unwrap_or(DissectorHandle(0))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("dissectors", &self.dissectors.len())
            .field("protocols", &self.protocols.len())
            .field("fields", &self.fields.len())
            .field("tables", &self.tables.keys().collect::<Vec<_>>())
            .finish()
    }
}
