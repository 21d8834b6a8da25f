//! Bounds-checked views over packet bytes.
//!
//! A [`View`] is a window onto bytes that may come from several places:
//!
//! - a [`ByteSource`] (a captured frame, or decompressor output),
//! - a range of another view ([`View::subset`]),
//! - several views stitched together ([`View::composite`]),
//! - the decompressed form of another view ([`View::decompressed_child`]).
//!
//! Every accessor validates the requested range against the view's captured
//! length before touching memory, and reports a [`BoundsFault`] otherwise.
//! Views are cheap to clone (reference counted) and keep their whole ancestry
//! alive, so a decompressed child can always be traced back to raw bytes.
//!
//! ## Example
//!
//! ```rust
//! use pktdissect_core::tvb::{Endian, View};
//!
//! let frame = View::new(vec![0x08, 0x00, 0x45, 0x00, 0x00, 0x1c]);
//! assert_eq!(frame.get_u16(0, Endian::Big).unwrap(), 0x0800);
//!
//! let payload = frame.subset(2, ..).unwrap();
//! assert_eq!(payload.get_u8(0).unwrap(), 0x45);
//! assert!(payload.get_u32(2, Endian::Big).is_err());
//! ```

mod composite;
mod string;

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::ops::RangeFull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use compact_str::CompactString;

use crate::decompress::{Algorithm, Decompressed};
use crate::error::{BoundsFault, CompositeError, DecompressError, DissectError, FaultKind};

use composite::Composite;
pub use string::StrEncoding;

/// Immutable owned bytes backing one or more views.
#[derive(Clone, PartialEq, Eq)]
pub struct ByteSource {
    bytes: Bytes,
}

impl ByteSource {
    /// Wrap already-owned bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteSource({} bytes)", self.bytes.len())
    }
}

impl From<Vec<u8>> for ByteSource {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}

impl From<Bytes> for ByteSource {
    fn from(b: Bytes) -> Self {
        Self::new(b)
    }
}

impl From<&'static [u8]> for ByteSource {
    fn from(b: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(b))
    }
}

/// Byte order of a multi-byte read. There is no host-order default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    Big,
    Little,
}

/// Length of a requested range.
///
/// `Remaining` is an explicit request for everything from the offset to the
/// end of the view, not a sentinel length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extent {
    Exact(usize),
    Remaining,
}

impl From<usize> for Extent {
    fn from(len: usize) -> Self {
        Extent::Exact(len)
    }
}

impl From<RangeFull> for Extent {
    fn from(_: RangeFull) -> Self {
        Extent::Remaining
    }
}

/// Process-unique identity of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u64);

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

impl ViewId {
    fn next() -> Self {
        ViewId(NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The raw bytes a decompressed view was produced from.
#[derive(Debug, Clone)]
pub struct ByteOrigin {
    /// View holding the compressed bytes.
    pub view: View,
    /// Offset of the compressed unit within `view`.
    pub offset: usize,
    /// Number of compressed bytes the decompressor consumed.
    pub consumed: usize,
    pub algorithm: Option<Algorithm>,
}

#[derive(Debug)]
enum Backing {
    Source {
        source: ByteSource,
        offset: usize,
    },
    Subset {
        parent: View,
        offset: usize,
    },
    Composite(Composite),
    Decompressed {
        source: ByteSource,
        origin: ByteOrigin,
    },
}

#[derive(Debug)]
struct ViewInner {
    id: ViewId,
    backing: Backing,
    captured: usize,
    reported: usize,
    /// Contiguous captured bytes when the view does not straddle composite members.
    flat: Option<Bytes>,
    label: Option<CompactString>,
}

/// A bounds-checked window onto packet bytes.
#[derive(Clone)]
pub struct View {
    inner: Arc<ViewInner>,
}

impl View {
    fn from_inner(inner: ViewInner) -> Self {
        tracing::trace!(
            view = inner.id.0,
            captured = inner.captured,
            reported = inner.reported,
            "new view"
        );
        Self {
            inner: Arc::new(inner),
        }
    }

    /// A direct view over all of `source`; reported length equals captured length.
    pub fn new(source: impl Into<ByteSource>) -> Self {
        let source = source.into();
        let len = source.len();
        Self::with_reported_length(source, len)
    }

    /// A direct view over all of `source`, where the wire claimed `reported` bytes.
    ///
    /// A reported length smaller than the captured length is raised to it.
    pub fn with_reported_length(source: impl Into<ByteSource>, reported: usize) -> Self {
        let source = source.into();
        let captured = source.len();
        let flat = Some(source.bytes.clone());
        Self::from_inner(ViewInner {
            id: ViewId::next(),
            backing: Backing::Source { source, offset: 0 },
            captured,
            reported: reported.max(captured),
            flat,
            label: None,
        })
    }

    /// A direct view over a range of `source`.
    pub fn direct(
        source: impl Into<ByteSource>,
        offset: usize,
        extent: impl Into<Extent>,
    ) -> Result<Self, BoundsFault> {
        let source = source.into();
        let whole = source.len();
        let length = resolve(offset, extent.into(), whole, whole)?;
        let flat = Some(source.bytes.slice(offset..offset + length));
        Ok(Self::from_inner(ViewInner {
            id: ViewId::next(),
            backing: Backing::Source { source, offset },
            captured: length,
            reported: length,
            flat,
            label: None,
        }))
    }

    /// Attach a data-source label (e.g. "Frame", "Decompressed LZNT1").
    pub fn labelled(self, label: &str) -> Self {
        let inner = match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.label = Some(CompactString::new(label));
                inner
            }
            Err(shared) => {
                // Shared: wrap in a full-length subset carrying the label.
                let parent = View { inner: shared };
                ViewInner {
                    id: ViewId::next(),
                    captured: parent.captured_len(),
                    reported: parent.reported_len(),
                    flat: parent.inner.flat.clone(),
                    label: Some(CompactString::new(label)),
                    backing: Backing::Subset { parent, offset: 0 },
                }
            }
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn id(&self) -> ViewId {
        self.inner.id
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// Number of bytes actually available.
    pub fn captured_len(&self) -> usize {
        self.inner.captured
    }

    /// Number of bytes the packet claims; never less than the captured length.
    pub fn reported_len(&self) -> usize {
        self.inner.reported
    }

    pub fn is_empty(&self) -> bool {
        self.inner.captured == 0
    }

    /// Whether capture stopped before the end of the reported data.
    pub fn is_truncated(&self) -> bool {
        self.inner.captured < self.inner.reported
    }

    /// The view this one is a subset of, if any.
    pub fn parent(&self) -> Option<&View> {
        match &self.inner.backing {
            Backing::Subset { parent, .. } => Some(parent),
            _ => None,
        }
    }

    /// Offset of this view within its parent (subsets) or source (direct views).
    pub fn offset_in_backing(&self) -> usize {
        match &self.inner.backing {
            Backing::Source { offset, .. } | Backing::Subset { offset, .. } => *offset,
            Backing::Composite(_) | Backing::Decompressed { .. } => 0,
        }
    }

    /// Members of a composite view.
    pub fn members(&self) -> Option<&[View]> {
        match &self.inner.backing {
            Backing::Composite(c) => Some(c.members()),
            _ => None,
        }
    }

    /// For a decompressed view (or a subset of one), the compressed bytes it came from.
    pub fn origin(&self) -> Option<&ByteOrigin> {
        let mut view = self;
        loop {
            match &view.inner.backing {
                Backing::Decompressed { origin, .. } => return Some(origin),
                Backing::Subset { parent, .. } => view = parent,
                _ => return None,
            }
        }
    }

    /// Validate a range and resolve its length.
    ///
    /// Fails with a [`BoundsFault`] if any byte of the range lies beyond the
    /// captured length. `Extent::Remaining` resolves to the captured bytes left
    /// after `offset`.
    pub fn ensure_contained(
        &self,
        offset: usize,
        extent: impl Into<Extent>,
    ) -> Result<usize, BoundsFault> {
        resolve(offset, extent.into(), self.inner.captured, self.inner.reported)
    }

    /// A new view over `offset..offset+length` of this one.
    ///
    /// The range is validated against the *reported* length, so a subset may
    /// extend past the captured bytes of a snapped capture; reading those bytes
    /// still faults.
    pub fn subset(&self, offset: usize, extent: impl Into<Extent>) -> Result<View, BoundsFault> {
        let captured = self.inner.captured;
        let reported = self.inner.reported;
        let (sub_captured, sub_reported) = match extent.into() {
            Extent::Exact(length) => {
                let end = offset
                    .checked_add(length)
                    .ok_or_else(|| fault(offset, length, captured, reported, FaultKind::Malformed))?;
                if end > reported {
                    return Err(fault(offset, length, captured, reported, FaultKind::Malformed));
                }
                (length.min(captured.saturating_sub(offset)), length)
            }
            Extent::Remaining => {
                if offset > reported {
                    return Err(fault(offset, 0, captured, reported, FaultKind::Malformed));
                }
                (captured.saturating_sub(offset), reported - offset)
            }
        };

        let flat = if sub_captured == 0 {
            Some(Bytes::new())
        } else {
            self.flat_slice(offset, sub_captured)
        };

        Ok(View::from_inner(ViewInner {
            id: ViewId::next(),
            backing: Backing::Subset {
                parent: self.clone(),
                offset,
            },
            captured: sub_captured,
            reported: sub_reported,
            flat,
            label: None,
        }))
    }

    /// A view that logically concatenates `members` without copying.
    ///
    /// Members with zero captured bytes are rejected; total lengths are
    /// checked for overflow.
    pub fn composite(members: impl IntoIterator<Item = View>) -> Result<View, CompositeError> {
        let composite = Composite::new(members.into_iter().collect())?;
        let captured = composite.captured_len();
        let reported = composite.reported_len();
        Ok(View::from_inner(ViewInner {
            id: ViewId::next(),
            backing: Backing::Composite(composite),
            captured,
            reported,
            flat: None,
            label: None,
        }))
    }

    /// Decompress `offset..offset+extent` of this view with `algorithm`.
    ///
    /// The result is a new view over freshly owned bytes whose [`origin`](Self::origin)
    /// points back at this view. Output larger than `max_output` is a failure.
    pub fn decompressed_child(
        &self,
        offset: usize,
        extent: impl Into<Extent>,
        algorithm: Algorithm,
        max_output: usize,
    ) -> Result<View, DissectError> {
        self.decompressed_with(offset, extent, Some(algorithm), algorithm.label(), |input| {
            algorithm.decompress(input, max_output)
        })
    }

    /// Run an arbitrary decoder over a range of this view and wrap its output.
    ///
    /// The decoder sees only the requested bytes and must return either the
    /// complete output or an error; nothing is produced on failure.
    pub fn decompressed_with<F>(
        &self,
        offset: usize,
        extent: impl Into<Extent>,
        algorithm: Option<Algorithm>,
        label: &str,
        decoder: F,
    ) -> Result<View, DissectError>
    where
        F: FnOnce(&[u8]) -> Result<Decompressed, DecompressError>,
    {
        let input = self.get_bytes(offset, extent)?;
        let Decompressed { data, consumed } = decoder(&input)?;
        let source = ByteSource::new(data);
        let len = source.len();
        tracing::trace!(
            origin = self.inner.id.0,
            consumed,
            produced = len,
            label,
            "decompressed child view"
        );
        Ok(View::from_inner(ViewInner {
            id: ViewId::next(),
            captured: len,
            reported: len,
            flat: Some(source.bytes.clone()),
            label: Some(CompactString::new(label)),
            backing: Backing::Decompressed {
                source,
                origin: ByteOrigin {
                    view: self.clone(),
                    offset,
                    consumed,
                    algorithm,
                },
            },
        }))
    }

    pub fn get_u8(&self, offset: usize) -> Result<u8, BoundsFault> {
        Ok(self.get_array::<1>(offset)?[0])
    }

    pub fn get_i8(&self, offset: usize) -> Result<i8, BoundsFault> {
        Ok(self.get_u8(offset)? as i8)
    }

    pub fn get_u16(&self, offset: usize, endian: Endian) -> Result<u16, BoundsFault> {
        let b = self.get_array::<2>(offset)?;
        Ok(match endian {
            Endian::Big => u16::from_be_bytes(b),
            Endian::Little => u16::from_le_bytes(b),
        })
    }

    pub fn get_i16(&self, offset: usize, endian: Endian) -> Result<i16, BoundsFault> {
        Ok(self.get_u16(offset, endian)? as i16)
    }

    pub fn get_u24(&self, offset: usize, endian: Endian) -> Result<u32, BoundsFault> {
        let [a, b, c] = self.get_array::<3>(offset)?;
        Ok(match endian {
            Endian::Big => u32::from_be_bytes([0, a, b, c]),
            Endian::Little => u32::from_le_bytes([a, b, c, 0]),
        })
    }

    pub fn get_u32(&self, offset: usize, endian: Endian) -> Result<u32, BoundsFault> {
        let b = self.get_array::<4>(offset)?;
        Ok(match endian {
            Endian::Big => u32::from_be_bytes(b),
            Endian::Little => u32::from_le_bytes(b),
        })
    }

    pub fn get_i32(&self, offset: usize, endian: Endian) -> Result<i32, BoundsFault> {
        Ok(self.get_u32(offset, endian)? as i32)
    }

    pub fn get_u64(&self, offset: usize, endian: Endian) -> Result<u64, BoundsFault> {
        let b = self.get_array::<8>(offset)?;
        Ok(match endian {
            Endian::Big => u64::from_be_bytes(b),
            Endian::Little => u64::from_le_bytes(b),
        })
    }

    pub fn get_i64(&self, offset: usize, endian: Endian) -> Result<i64, BoundsFault> {
        Ok(self.get_u64(offset, endian)? as i64)
    }

    pub fn get_f32(&self, offset: usize, endian: Endian) -> Result<f32, BoundsFault> {
        Ok(f32::from_bits(self.get_u32(offset, endian)?))
    }

    pub fn get_f64(&self, offset: usize, endian: Endian) -> Result<f64, BoundsFault> {
        Ok(f64::from_bits(self.get_u64(offset, endian)?))
    }

    /// An unsigned integer of 1..=8 bytes. Any other width is a malformed
    /// access.
    pub fn get_uint(&self, offset: usize, width: usize, endian: Endian) -> Result<u64, BoundsFault> {
        if !(1..=8).contains(&width) {
            return Err(fault(offset, width, self.inner.captured, self.inner.reported, FaultKind::Malformed));
        }
        self.ensure_contained(offset, width)?;
        let mut buf = [0u8; 8];
        match endian {
            Endian::Big => {
                self.copy_unchecked(offset, &mut buf[8 - width..]);
                Ok(u64::from_be_bytes(buf))
            }
            Endian::Little => {
                self.copy_unchecked(offset, &mut buf[..width]);
                Ok(u64::from_le_bytes(buf))
            }
        }
    }

    /// IPv4 address in network byte order.
    pub fn get_ipv4(&self, offset: usize) -> Result<Ipv4Addr, BoundsFault> {
        Ok(Ipv4Addr::from(self.get_array::<4>(offset)?))
    }

    pub fn get_ipv6(&self, offset: usize) -> Result<Ipv6Addr, BoundsFault> {
        Ok(Ipv6Addr::from(self.get_array::<16>(offset)?))
    }

    pub fn get_mac(&self, offset: usize) -> Result<[u8; 6], BoundsFault> {
        self.get_array::<6>(offset)
    }

    /// A fixed number of bytes copied out of the view.
    pub fn get_array<const N: usize>(&self, offset: usize) -> Result<[u8; N], BoundsFault> {
        self.ensure_contained(offset, N)?;
        let mut buf = [0u8; N];
        self.copy_unchecked(offset, &mut buf);
        Ok(buf)
    }

    /// Bytes of a range. Zero-copy unless the range straddles composite members.
    pub fn get_bytes(&self, offset: usize, extent: impl Into<Extent>) -> Result<Bytes, BoundsFault> {
        let length = self.ensure_contained(offset, extent)?;
        if let Some(bytes) = self.flat_slice(offset, length) {
            return Ok(bytes);
        }
        let mut buf = vec![0u8; length];
        self.copy_unchecked(offset, &mut buf);
        Ok(Bytes::from(buf))
    }

    /// Copy `out.len()` bytes starting at `offset`.
    pub fn copy_into(&self, offset: usize, out: &mut [u8]) -> Result<(), BoundsFault> {
        self.ensure_contained(offset, out.len())?;
        self.copy_unchecked(offset, out);
        Ok(())
    }

    /// All captured bytes.
    pub fn to_bytes(&self) -> Bytes {
        match self.flat_slice(0, self.inner.captured) {
            Some(bytes) => bytes,
            None => {
                let mut buf = vec![0u8; self.inner.captured];
                self.copy_unchecked(0, &mut buf);
                Bytes::from(buf)
            }
        }
    }

    /// Contiguous bytes for an already-validated range, if available without copying.
    fn flat_slice(&self, offset: usize, length: usize) -> Option<Bytes> {
        if let Some(flat) = &self.inner.flat {
            return Some(flat.slice(offset..offset + length));
        }
        match &self.inner.backing {
            Backing::Subset { parent, offset: base } => parent.flat_slice(base + offset, length),
            Backing::Composite(c) => c.flat_slice(offset, length),
            Backing::Source { .. } | Backing::Decompressed { .. } => None,
        }
    }

    /// Copy an already-validated range.
    fn copy_unchecked(&self, offset: usize, out: &mut [u8]) {
        if let Some(flat) = &self.inner.flat {
            out.copy_from_slice(&flat[offset..offset + out.len()]);
            return;
        }
        match &self.inner.backing {
            Backing::Subset { parent, offset: base } => parent.copy_unchecked(base + offset, out),
            Backing::Composite(c) => c.copy_unchecked(offset, out),
            Backing::Source { source, offset: base } => {
                let start = base + offset;
                out.copy_from_slice(&source.as_slice()[start..start + out.len()]);
            }
            Backing::Decompressed { source, .. } => {
                out.copy_from_slice(&source.as_slice()[offset..offset + out.len()]);
            }
        }
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner.backing {
            Backing::Source { .. } => "direct",
            Backing::Subset { .. } => "subset",
            Backing::Composite(_) => "composite",
            Backing::Decompressed { .. } => "decompressed",
        };
        f.debug_struct("View")
            .field("id", &self.inner.id)
            .field("kind", &kind)
            .field("captured", &self.inner.captured)
            .field("reported", &self.inner.reported)
            .field("label", &self.inner.label)
            .finish()
    }
}

fn fault(offset: usize, length: usize, captured: usize, reported: usize, kind: FaultKind) -> BoundsFault {
    BoundsFault {
        offset,
        length,
        captured,
        reported,
        kind,
    }
}

/// Resolve an extent against captured/reported lengths.
fn resolve(offset: usize, extent: Extent, captured: usize, reported: usize) -> Result<usize, BoundsFault> {
    match extent {
        Extent::Exact(length) => match offset.checked_add(length) {
            Some(end) if end <= captured => Ok(length),
            Some(end) if end <= reported => Err(fault(offset, length, captured, reported, FaultKind::Truncated)),
            _ => Err(fault(offset, length, captured, reported, FaultKind::Malformed)),
        },
        Extent::Remaining => {
            if offset <= captured {
                Ok(captured - offset)
            } else if offset <= reported {
                Err(fault(offset, 0, captured, reported, FaultKind::Truncated))
            } else {
                Err(fault(offset, 0, captured, reported, FaultKind::Malformed))
            }
        }
    }
}
