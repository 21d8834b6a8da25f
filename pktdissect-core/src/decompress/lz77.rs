//! MS-XCA Plain LZ77.
//!
//! The stream is a sequence of 32-bit little-endian flag words, each
//! governing the next 32 tokens, most significant bit first. A clear bit is a
//! literal byte. A set bit is a 16-bit little-endian match token:
//!
//! ```text
//!  15                    3 2     0
//! +-----------------------+-------+
//! |    distance - 1       |  len  |
//! +-----------------------+-------+
//! ```
//!
//! A `len` of 7 escapes to a nibble (two escapes share one byte, low nibble
//! first), a nibble of 15 escapes to a byte, and a byte of 255 escapes to a
//! 16-bit length (or, if that is zero, a 32-bit length). The minimum match is
//! three bytes.
//!
//! Decoding stops successfully whenever the input is exhausted at a token
//! boundary; the encoder pads the final flag word with set bits.

use super::matcher::MatchFinder;
use super::{check_input_size, Decompressed, Input, Output};
use crate::error::DecompressError;

const MIN_MATCH: usize = 3;
const MAX_DISTANCE: usize = 8192;
/// Longest match the encoder emits (fits the 16-bit escape).
const MAX_MATCH: usize = 0xFFFF + MIN_MATCH;

/// Decode a Plain LZ77 stream, producing at most `max_output` bytes.
pub fn decompress(input: &[u8], max_output: usize) -> Result<Decompressed, DecompressError> {
    check_input_size(input)?;
    let mut input = Input::new(input);
    let mut out = Output::new(max_output, input.data.len().saturating_mul(2));

    let mut flags = 0u32;
    let mut flag_count = 0u32;
    // Position of the byte whose high nibble is still unused.
    let mut shared_nibble: Option<usize> = None;

    loop {
        if flag_count == 0 {
            if input.at_end() {
                break;
            }
            flags = input.read_u32()?;
            flag_count = 32;
        }
        flag_count -= 1;

        if input.at_end() {
            break;
        }

        if flags & (1 << flag_count) == 0 {
            out.push(input.read_u8()?)?;
            continue;
        }

        let token = input.read_u16()? as usize;
        let distance = (token >> 3) + 1;
        let mut length = token & 7;

        if length == 7 {
            length = match shared_nibble.take() {
                None => {
                    shared_nibble = Some(input.position());
                    (input.read_u8()? & 0x0F) as usize
                }
                Some(pos) => (input.byte_at(pos)? >> 4) as usize,
            };

            if length == 15 {
                length = input.read_u8()? as usize;
                if length == 255 {
                    let at = input.position();
                    length = input.read_u16()? as usize;
                    if length == 0 {
                        length = input.read_u32()? as usize;
                    }
                    length = length
                        .checked_sub(15 + 7)
                        .ok_or(DecompressError::InvalidLength { offset: at })?;
                }
                length += 15;
            }
            length += 7;
        }

        let length = length
            .checked_add(MIN_MATCH)
            .ok_or(DecompressError::InvalidLength {
                offset: input.position(),
            })?;
        out.copy_match(distance, length)?;
    }

    Ok(Decompressed {
        consumed: input.position(),
        data: out.finish(),
    })
}

/// Encode `input` as a Plain LZ77 stream.
pub fn compress(input: &[u8]) -> Vec<u8> {
    let mut encoder = Encoder::new(input.len());
    let mut finder = MatchFinder::new(input);
    let mut pos = 0;

    while pos < input.len() {
        match finder.longest_match(pos, MAX_DISTANCE, MAX_MATCH) {
            Some((distance, length)) => {
                encoder.push_match(distance, length);
                finder.insert_range(pos, length);
                pos += length;
            }
            None => {
                encoder.push_literal(input[pos]);
                finder.insert(pos);
                pos += 1;
            }
        }
    }

    encoder.finish()
}

struct Encoder {
    out: Vec<u8>,
    flags_at: usize,
    flags: u32,
    used: u32,
    shared_nibble: Option<usize>,
}

impl Encoder {
    fn new(size_hint: usize) -> Self {
        let mut out = Vec::with_capacity(size_hint + size_hint / 8 + 8);
        out.extend_from_slice(&[0; 4]);
        Self {
            out,
            flags_at: 0,
            flags: 0,
            used: 0,
            shared_nibble: None,
        }
    }

    /// Reserve one flag bit, starting a new flag word if the current one is full.
    fn next_flag(&mut self, set: bool) {
        if self.used == 32 {
            self.flush_flags();
            self.flags_at = self.out.len();
            self.out.extend_from_slice(&[0; 4]);
            self.flags = 0;
            self.used = 0;
        }
        if set {
            self.flags |= 1 << (31 - self.used);
        }
        self.used += 1;
    }

    fn flush_flags(&mut self) {
        self.out[self.flags_at..self.flags_at + 4].copy_from_slice(&self.flags.to_le_bytes());
    }

    fn push_literal(&mut self, byte: u8) {
        self.next_flag(false);
        self.out.push(byte);
    }

    fn push_match(&mut self, distance: usize, length: usize) {
        self.next_flag(true);
        let symbol = ((distance - 1) << 3) as u16;
        let extra = length - MIN_MATCH;
        if extra < 7 {
            self.push_u16(symbol | extra as u16);
            return;
        }

        self.push_u16(symbol | 7);
        let extra = extra - 7;
        let nibble = extra.min(15) as u8;
        match self.shared_nibble.take() {
            None => {
                self.shared_nibble = Some(self.out.len());
                self.out.push(nibble);
            }
            Some(at) => self.out[at] |= nibble << 4,
        }
        if extra < 15 {
            return;
        }

        let extra = extra - 15;
        if extra < 255 {
            self.out.push(extra as u8);
            return;
        }

        self.out.push(255);
        let total = length - MIN_MATCH;
        if total <= 0xFFFF {
            self.push_u16(total as u16);
        } else {
            self.push_u16(0);
            self.out.extend_from_slice(&(total as u32).to_le_bytes());
        }
    }

    fn push_u16(&mut self, v: u16) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    fn finish(mut self) -> Vec<u8> {
        // Mark the remaining flag bits as matches so a decoder stops at end of input.
        if self.used == 32 {
            self.flush_flags();
            self.flags_at = self.out.len();
            self.out.extend_from_slice(&[0; 4]);
            self.flags = 0;
            self.used = 0;
        }
        self.flags |= ((1u64 << (32 - self.used)) - 1) as u32;
        self.flush_flags();
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals_only() {
        let input = [0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04];
        let out = decompress(&input, 1024).unwrap();
        assert_eq!(out.data, vec![0x01, 0x02, 0x03, 0x04]);
        assert_eq!(out.consumed, 8);
    }

    #[test]
    fn test_empty_input() {
        let out = decompress(&[], 1024).unwrap();
        assert!(out.data.is_empty());
        assert_eq!(out.consumed, 0);
    }

    #[test]
    fn test_overlapping_match() {
        // flags: literal 'a', then match distance 1 length 5.
        let flags: u32 = 0b01 << 30;
        let mut input = flags.to_le_bytes().to_vec();
        input.push(b'a');
        input.extend_from_slice(&((0u16 << 3) | 2).to_le_bytes());
        let out = decompress(&input, 1024).unwrap();
        assert_eq!(out.data, b"aaaaaa");
    }

    #[test]
    fn test_nibble_sharing() {
        // 'x', match(1, 3+7+2), match(1, 3+7+4): both lengths in one nibble byte.
        let flags: u32 = 0b011 << 29;
        let mut input = flags.to_le_bytes().to_vec();
        input.push(b'x');
        input.extend_from_slice(&7u16.to_le_bytes());
        input.push(0x42);
        input.extend_from_slice(&7u16.to_le_bytes());
        let out = decompress(&input, 1024).unwrap();
        assert_eq!(out.data.len(), 1 + 12 + 14);
        assert!(out.data.iter().all(|&b| b == b'x'));
    }

    #[test]
    fn test_u32_length_escape() {
        let length: u32 = 70_000;
        let flags: u32 = 0b01 << 30;
        let mut input = flags.to_le_bytes().to_vec();
        input.push(b'z');
        input.extend_from_slice(&7u16.to_le_bytes());
        input.push(0x0F);
        input.push(0xFF);
        input.extend_from_slice(&0u16.to_le_bytes());
        input.extend_from_slice(&(length - 3).to_le_bytes());
        let out = decompress(&input, 1 << 20).unwrap();
        assert_eq!(out.data.len(), 1 + length as usize);
    }

    #[test]
    fn test_invalid_escaped_length() {
        let flags: u32 = 0b01 << 30;
        let mut input = flags.to_le_bytes().to_vec();
        input.push(b'z');
        input.extend_from_slice(&7u16.to_le_bytes());
        input.push(0x0F);
        input.push(0xFF);
        input.extend_from_slice(&5u16.to_le_bytes());
        assert!(matches!(
            decompress(&input, 1024),
            Err(DecompressError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_match_before_start() {
        let flags: u32 = 1 << 31;
        let mut input = flags.to_le_bytes().to_vec();
        input.extend_from_slice(&0u16.to_le_bytes());
        assert!(matches!(
            decompress(&input, 1024),
            Err(DecompressError::InvalidBackReference { .. })
        ));
    }

    #[test]
    fn test_truncated_token() {
        let flags: u32 = 0b01 << 30;
        let mut input = flags.to_le_bytes().to_vec();
        input.push(b'a');
        input.push(0x08);
        assert!(matches!(
            decompress(&input, 1024),
            Err(DecompressError::Truncated { offset: 5 })
        ));
    }

    #[test]
    fn test_output_limit() {
        let data = vec![7u8; 4096];
        let packed = compress(&data);
        assert!(matches!(
            decompress(&packed, 4095),
            Err(DecompressError::OutputLimit { limit: 4095 })
        ));
        assert_eq!(decompress(&packed, 4096).unwrap().data, data);
    }

    #[test]
    fn test_compress_roundtrip_mixed() {
        let mut data = Vec::new();
        for i in 0..2000u32 {
            data.extend_from_slice(format!("line {} of {}\n", i % 37, i % 5).as_bytes());
        }
        let packed = compress(&data);
        assert!(packed.len() < data.len());
        let out = decompress(&packed, data.len()).unwrap();
        assert_eq!(out.data, data);
        assert_eq!(out.consumed, packed.len());
    }

    #[test]
    fn test_compress_full_flag_word() {
        // Exactly 32 literals fill one flag word; the terminator needs a second.
        let data: Vec<u8> = (0..32).collect();
        let packed = compress(&data);
        assert_eq!(packed.len(), 4 + 32 + 4);
        assert_eq!(decompress(&packed, 64).unwrap().data, data);
    }
}
