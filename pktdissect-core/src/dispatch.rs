//! Per-packet dispatch.
//!
//! A [`Dissection`] carries the state of one packet through its dissectors:
//! the [`PacketContext`], the [`FieldTree`] being built, the nesting depth and
//! the decompression budget. Dissectors hand payloads on through it:
//!
//! ```text
//! call_table(table, key)
//!   -> exact entry for key
//!   -> decode-as override for key
//!   -> heuristic list of the same name, in registration order
//!   -> raw "data"
//! ```
//!
//! Every call is a containment boundary. A recoverable error from a dissector
//! (or from a heuristic that already added its protocol item) is annotated in
//! the tree and the call reports the whole view as consumed, so the caller
//! carries on with its own remaining bytes. Exceeding the
//! nesting or decompression limits aborts the packet: the call returns the
//! error and every later call fails with it too.

use tracing::{debug, trace, warn};

use crate::config::DispatchPolicy;
use crate::context::PacketContext;
use crate::decompress::Algorithm;
use crate::error::{DecompressError, DissectError};
use crate::field::{ByteRange, FieldId, FieldTree};
use crate::registry::{DissectorHandle, DissectorKind, Heuristic, Registry, TableKey};
use crate::tvb::{Extent, View};

/// State of one packet's dissection.
pub struct Dissection<'r> {
    registry: &'r Registry,
    policy: &'r DispatchPolicy,
    pub pinfo: PacketContext,
    pub tree: FieldTree,
    depth: usize,
    decompressed: usize,
    aborted: Option<DissectError>,
}

impl<'r> Dissection<'r> {
    pub fn new(registry: &'r Registry, policy: &'r DispatchPolicy, pinfo: PacketContext) -> Self {
        Self {
            registry,
            policy,
            pinfo,
            tree: FieldTree::new(),
            depth: 0,
            decompressed: 0,
            aborted: None,
        }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Number of dissectors currently on the call stack.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Bytes produced by decompression so far in this packet.
    pub fn decompressed_bytes(&self) -> usize {
        self.decompressed
    }

    /// The error that aborted this packet, if any.
    pub fn aborted(&self) -> Option<&DissectError> {
        self.aborted.as_ref()
    }

    pub fn into_parts(self) -> (PacketContext, FieldTree, Option<DissectError>) {
        (self.pinfo, self.tree, self.aborted)
    }

    /// Dispatch `view` through `table` using `key`.
    ///
    /// Returns the bytes consumed. `Err` only when the packet was aborted.
    pub fn call_table(
        &mut self,
        table: &str,
        key: impl Into<TableKey>,
        view: &View,
        parent: Option<FieldId>,
    ) -> Result<usize, DissectError> {
        if let Some(consumed) = self.try_table(table, key, view, parent)? {
            return Ok(consumed);
        }
        self.call_heuristics(table, view, parent)
    }

    /// Like [`call_table`](Self::call_table) without the heuristic and raw
    /// fallbacks. `None` if neither an exact entry nor an override matched.
    pub fn try_table(
        &mut self,
        table: &str,
        key: impl Into<TableKey>,
        view: &View,
        parent: Option<FieldId>,
    ) -> Result<Option<usize>, DissectError> {
        self.check_aborted()?;
        let registry = self.registry;
        let Some(entries) = registry.table(table) else {
            warn!(table, "no such dissector table");
            return Ok(None);
        };
        let key = key.into();
        let Some(key) = entries.normalize(key.clone()) else {
            debug!(table, %key, "key does not match table key type");
            return Ok(None);
        };
        let handle = match entries.lookup(&key) {
            Some(handle) => handle,
            None => match self.policy.decode_as(table, &key) {
                Some(handle) => {
                    debug!(table, %key, dissector = registry.dissector_name(handle), "decode-as");
                    handle
                }
                None => return Ok(None),
            },
        };
        debug!(table, %key, dissector = registry.dissector_name(handle), "table match");
        self.call_handle(handle, view, parent).map(Some)
    }

    /// Try the heuristic dissectors of `list` in order, falling back to raw
    /// data when none claims the payload.
    pub fn call_heuristics(
        &mut self,
        list: &str,
        view: &View,
        parent: Option<FieldId>,
    ) -> Result<usize, DissectError> {
        match self.try_heuristics(list, view, parent)? {
            Some(consumed) => Ok(consumed),
            None => self.call_raw(view, parent),
        }
    }

    /// Try the heuristic dissectors of `list` in order. `None` if every one
    /// declined.
    pub fn try_heuristics(
        &mut self,
        list: &str,
        view: &View,
        parent: Option<FieldId>,
    ) -> Result<Option<usize>, DissectError> {
        self.check_aborted()?;
        let registry = self.registry;
        let Some(table) = registry.table(list) else {
            warn!(list, "no such heuristic list");
            return Ok(None);
        };
        for &handle in table.heuristics() {
            if self.policy.is_disabled(handle) {
                trace!(list, dissector = registry.dissector_name(handle), "heuristic disabled");
                continue;
            }
            if let Some(consumed) = self.probe(handle, view, parent)? {
                return Ok(Some(consumed));
            }
        }
        Ok(None)
    }

    /// Call a dissector by name.
    ///
    /// An unknown name falls back to raw data. A heuristic dissector is
    /// probed, and raw data is used if it declines.
    pub fn call_dissector(
        &mut self,
        name: &str,
        view: &View,
        parent: Option<FieldId>,
    ) -> Result<usize, DissectError> {
        let registry = self.registry;
        match registry.dissector(name) {
            None => {
                warn!(dissector = name, "no such dissector");
                self.call_raw(view, parent)
            }
            Some(handle) if registry.is_heuristic(handle) => {
                if !self.policy.is_disabled(handle) {
                    if let Some(consumed) = self.probe(handle, view, parent)? {
                        return Ok(consumed);
                    }
                }
                self.call_raw(view, parent)
            }
            Some(handle) => self.call_handle(handle, view, parent),
        }
    }

    /// Show `view` as undecoded bytes.
    pub fn call_raw(&mut self, view: &View, parent: Option<FieldId>) -> Result<usize, DissectError> {
        self.check_aborted()?;
        if view.is_empty() {
            return Ok(0);
        }
        let raw = self.registry.raw_handle();
        self.call_handle(raw, view, parent)
    }

    /// Decompress part of `view` into a child view and register it as a data
    /// source of this packet.
    ///
    /// A failed decompression is recoverable and leaves nothing behind. Output
    /// beyond the packet's remaining budget aborts the packet.
    pub fn decompress(
        &mut self,
        view: &View,
        offset: usize,
        extent: impl Into<Extent>,
        algorithm: Algorithm,
    ) -> Result<View, DissectError> {
        self.check_aborted()?;
        let remaining = self
            .policy
            .max_decompressed_bytes
            .saturating_sub(self.decompressed);
        let limit = self.policy.max_unit_output.min(remaining);
        match view.decompressed_child(offset, extent, algorithm, limit) {
            Ok(child) => {
                self.decompressed += child.captured_len();
                debug!(
                    algorithm = algorithm.name(),
                    produced = child.captured_len(),
                    total = self.decompressed,
                    "decompressed payload"
                );
                self.pinfo.add_data_source(algorithm.label(), child.clone());
                Ok(child)
            }
            Err(DissectError::Decompression(DecompressError::OutputLimit { .. }))
                if remaining < self.policy.max_unit_output =>
            {
                let err = DissectError::OutputSizeLimitExceeded {
                    limit: self.policy.max_decompressed_bytes,
                    requested: self.decompressed + remaining + 1,
                };
                Err(self.abort(err, None))
            }
            Err(err) => Err(err),
        }
    }

    fn call_handle(
        &mut self,
        handle: DissectorHandle,
        view: &View,
        parent: Option<FieldId>,
    ) -> Result<usize, DissectError> {
        let registry = self.registry;
        let entry = registry.entry(handle);
        let DissectorKind::Exact(dissector) = &entry.kind else {
            return match self.probe(handle, view, parent)? {
                Some(consumed) => Ok(consumed),
                None => self.call_raw(view, parent),
            };
        };
        self.enter(&entry.name, parent)?;
        let mark = self.tree.mark();
        let result = dissector.dissect(view, self, parent);
        self.depth -= 1;
        self.settle(&entry.name, result, mark, view, parent)
    }

    /// Run a heuristic dissector, undoing everything it did unless it claims
    /// the payload.
    ///
    /// A heuristic that added a protocol item before faulting has claimed the
    /// payload; the fault is contained like any other dissector's.
    fn probe(
        &mut self,
        handle: DissectorHandle,
        view: &View,
        parent: Option<FieldId>,
    ) -> Result<Option<usize>, DissectError> {
        let registry = self.registry;
        let entry = registry.entry(handle);
        let DissectorKind::Heuristic(heuristic) = &entry.kind else {
            return Ok(None);
        };
        let mark = self.tree.mark();
        let saved = self.pinfo.clone();
        self.enter(&entry.name, parent)?;
        let outcome = heuristic.dissect_heuristic(view, self, parent);
        self.depth -= 1;
        match outcome {
            Ok(Heuristic::Claimed(consumed)) => {
                self.check_aborted()?;
                debug!(dissector = %entry.name, consumed, "heuristic claimed payload");
                Ok(Some(consumed.min(view.captured_len())))
            }
            Ok(Heuristic::NotMine) => {
                self.check_aborted()?;
                trace!(dissector = %entry.name, "heuristic declined");
                self.tree.truncate(mark);
                self.pinfo = saved;
                Ok(None)
            }
            Err(err) if err.is_fatal() => Err(self.abort(err, parent)),
            Err(err) => {
                self.check_aborted()?;
                // A protocol item means the payload was recognised.
                if self.tree.last_protocol_since(mark).is_some() {
                    return Ok(Some(self.contain(&entry.name, err, mark, view, parent)));
                }
                debug!(dissector = %entry.name, error = %err, "heuristic faulted while probing");
                self.tree.truncate(mark);
                self.pinfo = saved;
                Ok(None)
            }
        }
    }

    fn enter(&mut self, name: &str, parent: Option<FieldId>) -> Result<(), DissectError> {
        self.check_aborted()?;
        if self.depth >= self.policy.max_depth {
            let err = DissectError::RecursionLimitExceeded {
                limit: self.policy.max_depth,
            };
            return Err(self.abort(err, parent));
        }
        self.depth += 1;
        self.pinfo.push_layer(name);
        Ok(())
    }

    fn settle(
        &mut self,
        name: &str,
        result: Result<usize, DissectError>,
        mark: usize,
        view: &View,
        parent: Option<FieldId>,
    ) -> Result<usize, DissectError> {
        match result {
            Ok(consumed) => {
                self.check_aborted()?;
                Ok(consumed.min(view.captured_len()))
            }
            Err(err) if err.is_fatal() => Err(self.abort(err, parent)),
            Err(err) => {
                self.check_aborted()?;
                Ok(self.contain(name, err, mark, view, parent))
            }
        }
    }

    /// Annotate a recoverable fault at the layer that raised it. The whole
    /// view counts as consumed.
    fn contain(
        &mut self,
        name: &str,
        err: DissectError,
        mark: usize,
        view: &View,
        parent: Option<FieldId>,
    ) -> usize {
        warn!(
            frame = self.pinfo.frame_number,
            dissector = name,
            error = %err,
            "contained dissector fault"
        );
        let at = self.tree.last_protocol_since(mark).or(parent);
        let range = fault_range(&err, view);
        self.tree.add_error(at, range, &err);
        view.captured_len()
    }

    /// Record `err` as the reason this packet was aborted. Only the first
    /// abort is annotated.
    fn abort(&mut self, err: DissectError, parent: Option<FieldId>) -> DissectError {
        match &self.aborted {
            Some(first) => first.clone(),
            None => {
                warn!(frame = self.pinfo.frame_number, error = %err, "packet dissection aborted");
                self.tree.add_error(parent, None, &err);
                self.aborted = Some(err.clone());
                err
            }
        }
    }

    fn check_aborted(&self) -> Result<(), DissectError> {
        match &self.aborted {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// The bytes a bounds fault points at, clamped to what was captured.
fn fault_range(err: &DissectError, view: &View) -> Option<ByteRange> {
    let DissectError::Bounds(fault) = err else {
        return None;
    };
    let captured = view.captured_len();
    let offset = fault.offset.min(captured);
    Some(ByteRange {
        view: view.clone(),
        offset,
        length: captured - offset,
    })
}
