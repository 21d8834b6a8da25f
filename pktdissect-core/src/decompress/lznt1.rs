//! LZNT1.
//!
//! The stream is a sequence of chunks, each introduced by a 16-bit
//! little-endian header:
//!
//! ```text
//!   15  14..12   11                 0
//! +---+--------+----------------------+
//! | C |  sig   |  chunk length - 1    |
//! +---+--------+----------------------+
//! ```
//!
//! An uncompressed chunk (`C` clear) is copied verbatim. A compressed chunk
//! holds groups of one flag byte followed by up to eight tokens, least
//! significant bit first: a clear bit is a literal, a set bit a 16-bit match.
//! How a match splits into displacement and length bits depends on how much
//! output the current chunk has produced so far, so early matches reach
//! only a short distance but may be long.
//!
//! A zero header marks the end of the stream.

use super::matcher::MatchFinder;
use super::{check_input_size, Decompressed, Input, Output};
use crate::error::DecompressError;

const CHUNK_SIZE: usize = 4096;
const MIN_MATCH: usize = 3;
const COMPRESSED: u16 = 0x8000;
const SIGNATURE: u16 = 0x3000;

/// Number of low bits holding the match length, given the output produced
/// so far in the current chunk.
fn length_bits(chunk_position: usize) -> u32 {
    let mut pos = chunk_position.saturating_sub(1);
    let mut bits = 12;
    while pos >= 0x10 && bits > 4 {
        pos >>= 1;
        bits -= 1;
    }
    bits
}

/// Decode an LZNT1 stream, producing at most `max_output` bytes.
pub fn decompress(input: &[u8], max_output: usize) -> Result<Decompressed, DecompressError> {
    check_input_size(input)?;
    let mut input = Input::new(input);
    let mut out = Output::new(max_output, input.data.len().saturating_mul(2));

    while !input.at_end() {
        let header = input.read_u16()?;
        if header == 0 {
            break;
        }
        let start = input.position();
        let length = usize::from(header & 0x0FFF) + 1;
        let chunk = input.slice(length)?;
        if header & COMPRESSED == 0 {
            out.extend(chunk)?;
        } else {
            decompress_chunk(chunk, start, &mut out)?;
        }
    }

    Ok(Decompressed {
        consumed: input.position(),
        data: out.finish(),
    })
}

fn decompress_chunk(chunk: &[u8], base: usize, out: &mut Output) -> Result<(), DecompressError> {
    let mut input = Input::with_base(chunk, base);
    let chunk_start = out.len();

    while !input.at_end() {
        let flags = input.read_u8()?;
        for bit in 0..8 {
            if flags & (1 << bit) == 0 {
                out.push(input.read_u8()?)?;
            } else {
                let token = usize::from(input.read_u16()?);
                let produced = out.len() - chunk_start;
                let bits = length_bits(produced);
                let length = (token & ((1 << bits) - 1)) + MIN_MATCH;
                let distance = (token >> bits) + 1;
                if distance > produced {
                    return Err(DecompressError::InvalidBackReference {
                        distance,
                        available: produced,
                    });
                }
                out.copy_match(distance, length)?;
            }
            if input.at_end() {
                break;
            }
        }
    }
    Ok(())
}

/// Encode `input` as an LZNT1 stream.
///
/// Chunks that do not shrink are stored uncompressed.
pub fn compress(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 16 + 2);
    for block in input.chunks(CHUNK_SIZE) {
        let packed = compress_chunk(block);
        if packed.len() < block.len() {
            let header = COMPRESSED | SIGNATURE | (packed.len() - 1) as u16;
            out.extend_from_slice(&header.to_le_bytes());
            out.extend_from_slice(&packed);
        } else {
            let header = SIGNATURE | (block.len() - 1) as u16;
            out.extend_from_slice(&header.to_le_bytes());
            out.extend_from_slice(block);
        }
    }
    out
}

fn compress_chunk(block: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(block.len());
    let mut finder = MatchFinder::new(block);
    let mut pos = 0;

    while pos < block.len() {
        let flags_at = out.len();
        out.push(0);
        let mut flags = 0u8;

        for bit in 0..8 {
            if pos >= block.len() {
                break;
            }
            let bits = length_bits(pos);
            let max_len = (1 << bits) - 1 + MIN_MATCH;
            let max_distance = 1 << (16 - bits);
            let found = if pos == 0 {
                None
            } else {
                finder.longest_match(pos, max_distance, max_len)
            };

            match found {
                Some((distance, length)) => {
                    let token = ((distance - 1) << bits) | (length - MIN_MATCH);
                    out.extend_from_slice(&(token as u16).to_le_bytes());
                    flags |= 1 << bit;
                    finder.insert_range(pos, length);
                    pos += length;
                }
                None => {
                    out.push(block[pos]);
                    finder.insert(pos);
                    pos += 1;
                }
            }
        }
        out[flags_at] = flags;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_bits_split() {
        assert_eq!(length_bits(1), 12);
        assert_eq!(length_bits(16), 12);
        assert_eq!(length_bits(17), 11);
        assert_eq!(length_bits(33), 10);
        assert_eq!(length_bits(4096), 4);
    }

    #[test]
    fn test_uncompressed_chunk() {
        let mut input = (SIGNATURE | 4).to_le_bytes().to_vec();
        input.extend_from_slice(b"hello");
        let out = decompress(&input, 64).unwrap();
        assert_eq!(out.data, b"hello");
        assert_eq!(out.consumed, 7);
    }

    #[test]
    fn test_compressed_chunk_with_run() {
        // flags 0b10: literal 'a', then match distance 1 length 9.
        let token: u16 = 9 - 3;
        let mut chunk = vec![0b10, b'a'];
        chunk.extend_from_slice(&token.to_le_bytes());
        let mut input = (COMPRESSED | SIGNATURE | (chunk.len() as u16 - 1)).to_le_bytes().to_vec();
        input.extend_from_slice(&chunk);
        let out = decompress(&input, 64).unwrap();
        assert_eq!(out.data, b"aaaaaaaaaa");
    }

    #[test]
    fn test_back_reference_at_chunk_start() {
        let mut input = (COMPRESSED | SIGNATURE | 2).to_le_bytes().to_vec();
        input.extend_from_slice(&[0b1, 0x00, 0x00]);
        assert!(matches!(
            decompress(&input, 64),
            Err(DecompressError::InvalidBackReference { available: 0, .. })
        ));
    }

    #[test]
    fn test_back_reference_does_not_cross_chunks() {
        // First chunk produces "abcd"; second chunk references it from offset 0.
        let mut input = (SIGNATURE | 3).to_le_bytes().to_vec();
        input.extend_from_slice(b"abcd");
        input.extend_from_slice(&(COMPRESSED | SIGNATURE | 3).to_le_bytes());
        input.extend_from_slice(&[0b10, b'x', 0x00, 0x10]);
        assert!(matches!(
            decompress(&input, 64),
            Err(DecompressError::InvalidBackReference { .. })
        ));
    }

    #[test]
    fn test_truncated_chunk() {
        let mut input = (SIGNATURE | 9).to_le_bytes().to_vec();
        input.extend_from_slice(b"abc");
        assert!(matches!(
            decompress(&input, 64),
            Err(DecompressError::Truncated { .. })
        ));
    }

    #[test]
    fn test_zero_header_terminates() {
        let mut input = (SIGNATURE | 1).to_le_bytes().to_vec();
        input.extend_from_slice(b"ok");
        input.extend_from_slice(&[0, 0, 0xde, 0xad]);
        let out = decompress(&input, 64).unwrap();
        assert_eq!(out.data, b"ok");
        assert_eq!(out.consumed, 6);
    }

    #[test]
    fn test_empty_input() {
        let out = decompress(&[], 64).unwrap();
        assert!(out.data.is_empty());
    }

    #[test]
    fn test_compress_multi_chunk_roundtrip() {
        let mut data = Vec::new();
        for i in 0..3000u32 {
            data.extend_from_slice(&(i % 97).to_be_bytes());
        }
        let packed = compress(&data);
        assert!(packed.len() < data.len());
        let out = decompress(&packed, data.len()).unwrap();
        assert_eq!(out.data, data);
    }

    #[test]
    fn test_compress_incompressible_stores_raw() {
        let data: Vec<u8> = (0..=255u8).collect();
        let packed = compress(&data);
        assert_eq!(packed.len(), data.len() + 2);
        assert_eq!(u16::from_le_bytes([packed[0], packed[1]]) & COMPRESSED, 0);
        assert_eq!(decompress(&packed, 1024).unwrap().data, data);
    }
}
