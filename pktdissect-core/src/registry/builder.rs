//! Two-phase registry construction.

use std::sync::Arc;

use tracing::{debug, warn};

use super::builtin;
use super::{
    DissectorEntry, DissectorHandle, DissectorKind, DissectorTable, KeyType, ProtocolInfo,
    Registry, TableKey,
};
use super::{Dissector, HeuristicDissector};
use crate::error::RegistryError;
use crate::field::FieldDef;

/// First registration phase: identities, fields, dissectors and tables.
pub struct IdentityPhase {
    registry: Registry,
}

impl IdentityPhase {
    pub(super) fn new() -> Self {
        let mut phase = Self {
            registry: Registry::empty(),
        };
        let builtins = builtin::register(&mut phase);
        debug_assert!(builtins.is_ok(), "built-in registration failed: {builtins:?}");
        phase
    }

    /// Declare a protocol and the fields it owns.
    ///
    /// Field abbreviations are unique across all protocols.
    pub fn register_identity(
        &mut self,
        name: impl Into<String>,
        display_name: impl Into<String>,
        fields: &[&'static FieldDef],
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let reg = &mut self.registry;
        if reg.protocols.contains_key(&name) {
            return Err(RegistryError::DuplicateName { name });
        }
        for (i, def) in fields.iter().enumerate() {
            let repeated = fields[..i].iter().any(|d| d.abbrev == def.abbrev);
            if repeated || reg.fields.contains_key(def.abbrev) {
                return Err(RegistryError::DuplicateField {
                    abbrev: def.abbrev.to_string(),
                });
            }
        }
        for def in fields {
            reg.fields.insert(def.abbrev, *def);
        }
        debug!(protocol = %name, fields = fields.len(), "registered protocol");
        reg.protocols.insert(
            name.clone(),
            ProtocolInfo {
                name,
                display_name: display_name.into(),
                fields: fields.to_vec(),
            },
        );
        Ok(())
    }

    pub fn register_dissector(
        &mut self,
        name: impl Into<String>,
        dissector: impl Dissector + 'static,
    ) -> Result<DissectorHandle, RegistryError> {
        self.add(name.into(), DissectorKind::Exact(Arc::new(dissector)))
    }

    pub fn register_heuristic_dissector(
        &mut self,
        name: impl Into<String>,
        dissector: impl HeuristicDissector + 'static,
    ) -> Result<DissectorHandle, RegistryError> {
        self.add(name.into(), DissectorKind::Heuristic(Arc::new(dissector)))
    }

    fn add(&mut self, name: String, kind: DissectorKind) -> Result<DissectorHandle, RegistryError> {
        let reg = &mut self.registry;
        if reg.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateName { name });
        }
        let handle = DissectorHandle(reg.dissectors.len());
        reg.by_name.insert(name.clone(), handle);
        reg.dissectors.push(DissectorEntry { name, kind });
        Ok(handle)
    }

    /// Create a keyed table. It also carries a heuristic list of the same name.
    pub fn new_dissector_table(
        &mut self,
        name: impl Into<String>,
        display_name: impl Into<String>,
        key_type: KeyType,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.registry.tables.contains_key(&name) {
            return Err(RegistryError::DuplicateTable { name });
        }
        self.registry.tables.insert(
            name.clone(),
            DissectorTable::new(name, display_name.into(), key_type),
        );
        Ok(())
    }

    /// Create a heuristic list with no keyed entries.
    pub fn new_heuristic_list(
        &mut self,
        name: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.registry.tables.contains_key(&name) {
            return Err(RegistryError::DuplicateHeuristicList { name });
        }
        self.registry.tables.insert(
            name.clone(),
            DissectorTable::new(name, display_name.into(), KeyType::None),
        );
        Ok(())
    }

    /// Read access to what has been declared so far.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Close the identity phase.
    pub fn into_handoff(self) -> HandoffPhase {
        HandoffPhase {
            registry: self.registry,
        }
    }
}

/// Second registration phase: attaching dissectors to tables.
pub struct HandoffPhase {
    registry: Registry,
}

impl HandoffPhase {
    /// Every identity is visible here.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn resolve(&self, name: &str, heuristic: bool) -> Result<DissectorHandle, RegistryError> {
        let handle = self
            .registry
            .dissector(name)
            .ok_or_else(|| RegistryError::UnknownDissector {
                name: name.to_string(),
            })?;
        if self.registry.is_heuristic(handle) != heuristic {
            return Err(RegistryError::WrongKind {
                name: name.to_string(),
                expected: if heuristic { "heuristic" } else { "keyed" },
            });
        }
        Ok(handle)
    }

    /// Route `key` in `table` to the named dissector.
    ///
    /// A later registration for the same key replaces the earlier one.
    pub fn register_in_table(
        &mut self,
        table: &str,
        key: impl Into<TableKey>,
        dissector: &str,
    ) -> Result<(), RegistryError> {
        let handle = self.resolve(dissector, false)?;
        let key = key.into();
        let entry = self
            .registry
            .tables
            .get_mut(table)
            .ok_or_else(|| RegistryError::UnknownTable {
                name: table.to_string(),
            })?;
        let normalized = entry
            .normalize(key.clone())
            .ok_or_else(|| RegistryError::KeyTypeMismatch {
                table: table.to_string(),
                key: key.to_string(),
            })?;
        if let Some(previous) = entry.insert(normalized, handle) {
            if previous != handle {
                warn!(table, %key, dissector, "dissector table entry replaced");
            }
        }
        Ok(())
    }

    /// Append the named heuristic dissector to a list.
    pub fn register_heuristic(&mut self, list: &str, dissector: &str) -> Result<(), RegistryError> {
        let handle = self.resolve(dissector, true)?;
        let heuristics = self.heuristic_list(list, dissector, handle)?;
        heuristics.push(handle);
        Ok(())
    }

    /// Insert the named heuristic dissector ahead of `before` in a list.
    pub fn register_heuristic_before(
        &mut self,
        list: &str,
        dissector: &str,
        before: &str,
    ) -> Result<(), RegistryError> {
        let handle = self.resolve(dissector, true)?;
        let anchor = self.resolve(before, true)?;
        let heuristics = self.heuristic_list(list, dissector, handle)?;
        let position = heuristics
            .iter()
            .position(|&h| h == anchor)
            .ok_or_else(|| RegistryError::UnknownDissector {
                name: before.to_string(),
            })?;
        heuristics.insert(position, handle);
        Ok(())
    }

    fn heuristic_list(
        &mut self,
        list: &str,
        dissector: &str,
        handle: DissectorHandle,
    ) -> Result<&mut Vec<DissectorHandle>, RegistryError> {
        let heuristics = self
            .registry
            .tables
            .get_mut(list)
            .ok_or_else(|| RegistryError::UnknownHeuristicList {
                name: list.to_string(),
            })?
            .heuristics_mut();
        if heuristics.contains(&handle) {
            return Err(RegistryError::DuplicateName {
                name: dissector.to_string(),
            });
        }
        Ok(heuristics)
    }

    /// Freeze the registry.
    pub fn build(self) -> Registry {
        debug!(
            dissectors = self.registry.dissectors.len(),
            tables = self.registry.tables.len(),
            fields = self.registry.fields.len(),
            "registry built"
        );
        self.registry
    }
}
