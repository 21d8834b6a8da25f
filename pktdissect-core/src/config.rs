//! Dissection configuration.
//!
//! [`DissectConfig`] is what a user writes; [`DispatchPolicy`] is the same
//! configuration resolved against a [`Registry`], with every name turned into
//! a handle and every key checked against its table.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::decompress::DEFAULT_MAX_OUTPUT;
use crate::error::ConfigError;
use crate::registry::{DissectorHandle, KeyType, Registry, TableKey};

/// Default maximum dispatch nesting per packet.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default per-packet decompression budget (64 MB).
pub const DEFAULT_MAX_DECOMPRESSED_BYTES: usize = 64 * 1024 * 1024;

/// A user "Decode As" override: dissect `key` in `table` with `dissector`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct DecodeAs {
    pub table: String,
    pub key: TableKey,
    pub dissector: String,
}

/// Configuration for dissecting packets.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct DissectConfig {
    /// Maximum dispatch nesting per packet.
    pub max_depth: usize,

    /// Total bytes all decompressions in one packet may produce.
    pub max_decompressed_bytes: usize,

    /// Output ceiling for a single decompression call.
    pub max_unit_output: usize,

    /// Decode-as overrides, consulted when a table has no exact entry.
    pub decode_as: Vec<DecodeAs>,

    /// Heuristic dissectors to skip, by name.
    pub disabled_heuristics: Vec<String>,
}

impl Default for DissectConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_decompressed_bytes: DEFAULT_MAX_DECOMPRESSED_BYTES,
            max_unit_output: DEFAULT_MAX_OUTPUT,
            decode_as: Vec::new(),
            disabled_heuristics: Vec::new(),
        }
    }
}

impl DissectConfig {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_decompressed_bytes(mut self, bytes: usize) -> Self {
        self.max_decompressed_bytes = bytes;
        self
    }

    pub fn with_max_unit_output(mut self, bytes: usize) -> Self {
        self.max_unit_output = bytes;
        self
    }

    /// Add a decode-as override.
    pub fn decode_as(
        mut self,
        table: impl Into<String>,
        key: impl Into<TableKey>,
        dissector: impl Into<String>,
    ) -> Self {
        self.decode_as.push(DecodeAs {
            table: table.into(),
            key: key.into(),
            dissector: dissector.into(),
        });
        self
    }

    /// Skip a heuristic dissector everywhere it is registered.
    pub fn disable_heuristic(mut self, name: impl Into<String>) -> Self {
        self.disabled_heuristics.push(name.into());
        self
    }

    /// Parse a configuration from TOML. Missing keys take their defaults.
    ///
    /// ```toml
    /// max_depth = 32
    /// disabled_heuristics = ["smb2.comp"]
    ///
    /// [[decode_as]]
    /// table = "udp.port"
    /// key = 4789
    /// dissector = "eth"
    /// ```
    #[cfg(feature = "serde")]
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::ZeroLimit { field: "max_depth" });
        }
        if self.max_decompressed_bytes == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_decompressed_bytes",
            });
        }
        if self.max_unit_output == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_unit_output",
            });
        }
        Ok(())
    }
}

/// A [`DissectConfig`] resolved against a registry.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub max_depth: usize,
    pub max_decompressed_bytes: usize,
    pub max_unit_output: usize,
    decode_as: HashMap<String, HashMap<TableKey, DissectorHandle>>,
    disabled: HashSet<DissectorHandle>,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_decompressed_bytes: DEFAULT_MAX_DECOMPRESSED_BYTES,
            max_unit_output: DEFAULT_MAX_OUTPUT,
            decode_as: HashMap::new(),
            disabled: HashSet::new(),
        }
    }
}

impl DispatchPolicy {
    /// Check `config` against `registry` and resolve every name it contains.
    pub fn resolve(registry: &Registry, config: &DissectConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut decode_as: HashMap<String, HashMap<TableKey, DissectorHandle>> = HashMap::new();
        for entry in &config.decode_as {
            let table = registry
                .table(&entry.table)
                .ok_or_else(|| ConfigError::UnknownTable {
                    table: entry.table.clone(),
                })?;
            let handle =
                registry
                    .dissector(&entry.dissector)
                    .ok_or_else(|| ConfigError::UnknownDissector {
                        name: entry.dissector.clone(),
                    })?;
            if registry.is_heuristic(handle) {
                return Err(ConfigError::NotKeyed {
                    name: entry.dissector.clone(),
                });
            }
            let key = match table.key_type() {
                KeyType::None => None,
                _ => table.normalize(entry.key.clone()),
            }
            .ok_or_else(|| ConfigError::KeyTypeMismatch {
                table: entry.table.clone(),
                key: entry.key.to_string(),
            })?;
            debug!(table = %entry.table, %key, dissector = %entry.dissector, "decode-as override");
            decode_as
                .entry(entry.table.clone())
                .or_default()
                .insert(key, handle);
        }

        let mut disabled = HashSet::new();
        for name in &config.disabled_heuristics {
            match registry.dissector(name) {
                Some(handle) if registry.is_heuristic(handle) => {
                    disabled.insert(handle);
                }
                _ => return Err(ConfigError::UnknownHeuristic { name: name.clone() }),
            }
        }

        Ok(Self {
            max_depth: config.max_depth,
            max_decompressed_bytes: config.max_decompressed_bytes,
            max_unit_output: config.max_unit_output,
            decode_as,
            disabled,
        })
    }

    /// Override for an already-normalized key.
    pub(crate) fn decode_as(&self, table: &str, key: &TableKey) -> Option<DissectorHandle> {
        self.decode_as.get(table)?.get(key).copied()
    }

    pub(crate) fn is_disabled(&self, handle: DissectorHandle) -> bool {
        self.disabled.contains(&handle)
    }
}
