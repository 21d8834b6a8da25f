//! Decompressors for compressed payloads carried inside packets.
//!
//! Two Microsoft formats are supported:
//!
//! - [`lz77`]: MS-XCA "Plain LZ77" (32-bit flag words, nibble-shared length escapes)
//! - [`lznt1`]: LZNT1 (4 KiB chunks, position-dependent offset/length split)
//!
//! Both decoders are pure functions over a byte slice. They enforce a maximum
//! input size and a caller-supplied output ceiling, build their output in a
//! growable buffer, and hand it over only when decoding fully succeeds.
//! Overlapping back-references are supported (a match may copy bytes it has
//! just written, which is how runs are encoded).
//!
//! Matching encoders are provided for both formats. They produce valid
//! streams suitable for tests and for building sample traffic; they do not
//! aim for optimal compression ratio.

pub mod lz77;
pub mod lznt1;
mod matcher;

use std::fmt;

use crate::error::DecompressError;

/// Largest compressed unit accepted by either decoder (16 MB).
pub const MAX_INPUT_SIZE: usize = 16 * 1024 * 1024;

/// Default output ceiling for a single decompression (16 MB).
pub const DEFAULT_MAX_OUTPUT: usize = 16 * 1024 * 1024;

/// Result of a successful decompression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decompressed {
    pub data: Vec<u8>,
    /// Number of input bytes the decoder consumed.
    pub consumed: usize,
}

/// A supported compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// MS-XCA Plain LZ77
    Lz77,
    /// LZNT1
    Lznt1,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Lz77 => "LZ77",
            Algorithm::Lznt1 => "LZNT1",
        }
    }

    /// Data-source label for views produced by this algorithm.
    pub fn label(self) -> &'static str {
        match self {
            Algorithm::Lz77 => "Decompressed LZ77",
            Algorithm::Lznt1 => "Decompressed LZNT1",
        }
    }

    pub fn decompress(self, input: &[u8], max_output: usize) -> Result<Decompressed, DecompressError> {
        match self {
            Algorithm::Lz77 => lz77::decompress(input, max_output),
            Algorithm::Lznt1 => lznt1::decompress(input, max_output),
        }
    }

    pub fn compress(self, input: &[u8]) -> Vec<u8> {
        match self {
            Algorithm::Lz77 => lz77::compress(input),
            Algorithm::Lznt1 => lznt1::compress(input),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn check_input_size(input: &[u8]) -> Result<(), DecompressError> {
    if input.len() > MAX_INPUT_SIZE {
        return Err(DecompressError::InputTooLarge {
            size: input.len(),
            max: MAX_INPUT_SIZE,
        });
    }
    Ok(())
}

/// Little-endian cursor over compressed input.
struct Input<'a> {
    data: &'a [u8],
    pos: usize,
    /// Added to positions reported in errors.
    base: usize,
}

impl<'a> Input<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    fn with_base(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecompressError> {
        let bytes = self
            .data
            .get(self.pos..self.pos + N)
            .ok_or(DecompressError::Truncated {
                offset: self.base + self.pos,
            })?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos += N;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, DecompressError> {
        Ok(self.take::<1>()?[0])
    }

    fn read_u16(&mut self) -> Result<u16, DecompressError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn read_u32(&mut self) -> Result<u32, DecompressError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    /// Byte at an earlier position.
    fn byte_at(&self, pos: usize) -> Result<u8, DecompressError> {
        self.data
            .get(pos)
            .copied()
            .ok_or(DecompressError::Truncated {
                offset: self.base + pos,
            })
    }

    fn slice(&mut self, len: usize) -> Result<&'a [u8], DecompressError> {
        let bytes = self
            .data
            .get(self.pos..self.pos.saturating_add(len))
            .ok_or(DecompressError::Truncated {
                offset: self.base + self.data.len(),
            })?;
        self.pos += len;
        Ok(bytes)
    }
}

/// Output buffer with a hard ceiling.
struct Output {
    buf: Vec<u8>,
    limit: usize,
}

impl Output {
    fn new(limit: usize, size_hint: usize) -> Self {
        Self {
            buf: Vec::with_capacity(size_hint.min(limit)),
            limit,
        }
    }

    fn len(&self) -> usize {
        self.buf.len()
    }

    fn reserve(&self, additional: usize) -> Result<(), DecompressError> {
        match self.buf.len().checked_add(additional) {
            Some(total) if total <= self.limit => Ok(()),
            _ => Err(DecompressError::OutputLimit { limit: self.limit }),
        }
    }

    fn push(&mut self, byte: u8) -> Result<(), DecompressError> {
        self.reserve(1)?;
        self.buf.push(byte);
        Ok(())
    }

    fn extend(&mut self, bytes: &[u8]) -> Result<(), DecompressError> {
        self.reserve(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Copy `length` bytes starting `distance` bytes back, one byte at a time
    /// so that overlapping matches repeat their source.
    fn copy_match(&mut self, distance: usize, length: usize) -> Result<(), DecompressError> {
        let available = self.buf.len();
        if distance == 0 || distance > available {
            return Err(DecompressError::InvalidBackReference {
                distance,
                available,
            });
        }
        self.reserve(length)?;
        let start = available - distance;
        for i in 0..length {
            let byte = self.buf[start + i];
            self.buf.push(byte);
        }
        Ok(())
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_overlapping_match() {
        let mut out = Output::new(64, 0);
        out.extend(b"ab").unwrap();
        out.copy_match(2, 5).unwrap();
        assert_eq!(out.finish(), b"abababa");
    }

    #[test]
    fn test_output_limit() {
        let mut out = Output::new(4, 0);
        out.extend(b"abc").unwrap();
        assert_eq!(
            out.copy_match(1, 2).unwrap_err(),
            DecompressError::OutputLimit { limit: 4 }
        );
    }

    #[test]
    fn test_output_back_reference_before_start() {
        let mut out = Output::new(64, 0);
        out.push(b'x').unwrap();
        assert_eq!(
            out.copy_match(2, 3).unwrap_err(),
            DecompressError::InvalidBackReference {
                distance: 2,
                available: 1
            }
        );
    }

    #[test]
    fn test_input_truncation_offsets() {
        let mut input = Input::with_base(&[1, 2, 3], 10);
        assert_eq!(input.read_u16().unwrap(), 0x0201);
        assert_eq!(
            input.read_u16().unwrap_err(),
            DecompressError::Truncated { offset: 12 }
        );
    }

    #[test]
    fn test_algorithm_dispatch() {
        let data = b"hello hello hello hello";
        for algorithm in [Algorithm::Lz77, Algorithm::Lznt1] {
            let packed = algorithm.compress(data);
            let out = algorithm.decompress(&packed, 1024).unwrap();
            assert_eq!(out.data, data, "{algorithm}");
            assert_eq!(out.consumed, packed.len());
        }
    }

    #[test]
    fn test_input_too_large() {
        let big = vec![0u8; MAX_INPUT_SIZE + 1];
        for algorithm in [Algorithm::Lz77, Algorithm::Lznt1] {
            assert!(matches!(
                algorithm.decompress(&big, DEFAULT_MAX_OUTPUT),
                Err(DecompressError::InputTooLarge { .. })
            ));
        }
    }
}
