//! String and search accessors.

use super::{Extent, View};
use crate::error::{BoundsFault, FaultKind};

/// Character encoding of a string field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrEncoding {
    /// 7-bit ASCII; bytes >= 0x80 become U+FFFD.
    Ascii,
    /// UTF-8 with lossy replacement of invalid sequences.
    Utf8,
    /// ISO 8859-1, one byte per code point.
    Latin1,
}

impl StrEncoding {
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            StrEncoding::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
                .collect(),
            StrEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            StrEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

impl View {
    /// A string occupying exactly the given range.
    pub fn get_string(
        &self,
        offset: usize,
        extent: impl Into<Extent>,
        encoding: StrEncoding,
    ) -> Result<String, BoundsFault> {
        let bytes = self.get_bytes(offset, extent)?;
        Ok(encoding.decode(&bytes))
    }

    /// A fixed-size string field, cut at the first NUL.
    pub fn get_string_padded(
        &self,
        offset: usize,
        length: usize,
        encoding: StrEncoding,
    ) -> Result<String, BoundsFault> {
        let bytes = self.get_bytes(offset, length)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(encoding.decode(&bytes[..end]))
    }

    /// A NUL-terminated string. Returns the string and the number of bytes
    /// occupied including the terminator.
    ///
    /// A missing terminator faults: `Truncated` if capture stopped early,
    /// `Malformed` otherwise.
    pub fn get_stringz(
        &self,
        offset: usize,
        encoding: StrEncoding,
    ) -> Result<(String, usize), BoundsFault> {
        match self.find_u8(offset, Extent::Remaining, 0)? {
            Some(nul) => {
                let text = self.get_string(offset, nul - offset, encoding)?;
                Ok((text, nul - offset + 1))
            }
            None => {
                let remaining = self.captured_len() - offset;
                Err(BoundsFault {
                    offset,
                    length: remaining + 1,
                    captured: self.captured_len(),
                    reported: self.reported_len(),
                    kind: if self.is_truncated() {
                        FaultKind::Truncated
                    } else {
                        FaultKind::Malformed
                    },
                })
            }
        }
    }

    /// Offset of the first `needle` within the range, if any.
    pub fn find_u8(
        &self,
        offset: usize,
        extent: impl Into<Extent>,
        needle: u8,
    ) -> Result<Option<usize>, BoundsFault> {
        let haystack = self.get_bytes(offset, extent)?;
        Ok(haystack.iter().position(|&b| b == needle).map(|i| offset + i))
    }

    /// Find the end of a text line starting at `offset`.
    ///
    /// Returns `(line_length, next_line_offset)`, accepting both `\n` and
    /// `\r\n` terminators. `None` if no terminator is present.
    pub fn find_line_end(&self, offset: usize) -> Result<Option<(usize, usize)>, BoundsFault> {
        let Some(lf) = self.find_u8(offset, Extent::Remaining, b'\n')? else {
            return Ok(None);
        };
        let mut end = lf;
        if end > offset && self.get_u8(end - 1)? == b'\r' {
            end -= 1;
        }
        Ok(Some((end - offset, lf + 1)))
    }
}
