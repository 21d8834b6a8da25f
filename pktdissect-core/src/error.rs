//! Error types for pktdissect-core.
//!
//! Errors fall into two groups:
//!
//! - Per-packet errors ([`BoundsFault`], [`DecompressError`], [`CompositeError`],
//!   wrapped by [`DissectError`]). These are raised while a dissector reads a
//!   [`View`](crate::tvb::View) and are always caught at the dispatch boundary.
//! - Startup errors ([`RegistryError`], [`ConfigError`], wrapped by [`enum@Error`]).
//!   A registry that fails to build must not be used.

use thiserror::Error;

/// Main error type for pktdissect-core startup operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error while building the dissector registry
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Invalid dissection configuration
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Why a read or subset request fell outside a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// The bytes exist on the wire but were not captured (snaplen).
    Truncated,
    /// The request exceeds what the packet itself claims to contain.
    Malformed,
}

/// A read or subset request exceeded a view's validated range.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{kind:?} access at offset {offset} (+{length}) exceeds view ({captured} captured, {reported} reported)")]
pub struct BoundsFault {
    /// Requested offset, relative to the view.
    pub offset: usize,
    /// Requested length (saturated on overflow).
    pub length: usize,
    /// Captured length of the view.
    pub captured: usize,
    /// Reported length of the view.
    pub reported: usize,
    /// Whether the access ran into missing capture data or past the packet.
    pub kind: FaultKind,
}

impl BoundsFault {
    /// Short label used for tree annotations.
    pub fn label(&self) -> &'static str {
        match self.kind {
            FaultKind::Truncated => "Packet size limited during capture",
            FaultKind::Malformed => "Malformed Packet",
        }
    }
}

/// Failure of a decompressor. Partial output is never returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecompressError {
    /// Input exceeds the maximum compressed unit size.
    #[error("compressed input of {size} bytes exceeds maximum of {max}")]
    InputTooLarge { size: usize, max: usize },

    /// Input ended in the middle of a token or header.
    #[error("compressed input truncated at offset {offset}")]
    Truncated { offset: usize },

    /// A match referenced bytes before the start of the output.
    #[error("back-reference distance {distance} exceeds {available} bytes of output")]
    InvalidBackReference { distance: usize, available: usize },

    /// An encoded match length is inconsistent with its escape level.
    #[error("invalid match length encoding at offset {offset}")]
    InvalidLength { offset: usize },

    /// Output would exceed the hard ceiling.
    #[error("decompressed output exceeds limit of {limit} bytes")]
    OutputLimit { limit: usize },
}

/// Invalid composite view construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositeError {
    #[error("composite view needs at least one member")]
    NoMembers,

    #[error("composite member {index} has zero captured length")]
    EmptyMember { index: usize },

    #[error("composite length overflows usize")]
    LengthOverflow,
}

/// Per-packet error raised inside a dissector.
///
/// Everything except the two limit variants is recoverable: dispatch annotates
/// the field tree and continues with sibling layers. The limit variants abort
/// the rest of the packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DissectError {
    #[error(transparent)]
    Bounds(#[from] BoundsFault),

    #[error("decompression failed: {0}")]
    Decompression(#[from] DecompressError),

    #[error(transparent)]
    Composite(#[from] CompositeError),

    /// Semantic inconsistency detected by a dissector.
    #[error("{protocol}: {reason}")]
    Malformed {
        protocol: &'static str,
        reason: String,
    },

    #[error("dissection nested deeper than {limit} layers")]
    RecursionLimitExceeded { limit: usize },

    #[error("decompression budget of {limit} bytes exceeded ({requested} requested)")]
    OutputSizeLimitExceeded { limit: usize, requested: usize },
}

impl DissectError {
    /// Build a [`DissectError::Malformed`].
    pub fn malformed(protocol: &'static str, reason: impl Into<String>) -> Self {
        DissectError::Malformed {
            protocol,
            reason: reason.into(),
        }
    }

    /// Whether this error aborts the rest of the packet.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DissectError::RecursionLimitExceeded { .. } | DissectError::OutputSizeLimitExceeded { .. }
        )
    }

    /// Label shown on the error annotation in the field tree.
    pub fn label(&self) -> &'static str {
        match self {
            DissectError::Bounds(fault) => fault.label(),
            DissectError::Decompression(_) => "Decompression failed",
            DissectError::Composite(_) => "Invalid reassembly",
            DissectError::Malformed { .. } => "Malformed Packet",
            DissectError::RecursionLimitExceeded { .. } => "Dissection aborted: nesting too deep",
            DissectError::OutputSizeLimitExceeded { .. } => {
                "Dissection aborted: decompression budget exceeded"
            }
        }
    }
}

/// Misuse of the registration API. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("dissector `{name}` registered twice")]
    DuplicateName { name: String },

    #[error("dissector table `{name}` created twice")]
    DuplicateTable { name: String },

    #[error("heuristic list `{name}` created twice")]
    DuplicateHeuristicList { name: String },

    #[error("field abbreviation `{abbrev}` registered twice")]
    DuplicateField { abbrev: String },

    #[error("no dissector named `{name}`")]
    UnknownDissector { name: String },

    #[error("no dissector table named `{name}`")]
    UnknownTable { name: String },

    #[error("no heuristic list named `{name}`")]
    UnknownHeuristicList { name: String },

    #[error("table `{table}` does not accept {key} keys")]
    KeyTypeMismatch { table: String, key: String },

    #[error("dissector `{name}` is not a {expected} dissector")]
    WrongKind { name: String, expected: &'static str },
}

/// Invalid dissection configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("decode-as entry refers to unknown table `{table}`")]
    UnknownTable { table: String },

    #[error("decode-as entry refers to unknown dissector `{name}`")]
    UnknownDissector { name: String },

    #[error("decode-as target `{name}` is a heuristic dissector")]
    NotKeyed { name: String },

    #[error("decode-as key `{key}` does not match key type of table `{table}`")]
    KeyTypeMismatch { table: String, key: String },

    #[error("disabled heuristic `{name}` is not registered")]
    UnknownHeuristic { name: String },

    #[error("{field} must be greater than zero")]
    ZeroLimit { field: &'static str },

    #[cfg(feature = "serde")]
    #[error("invalid TOML: {0}")]
    Toml(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
