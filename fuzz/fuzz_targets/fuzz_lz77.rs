//! Fuzz target for the MS-XCA Plain LZ77 decoder.
//!
//! Arbitrary input must decode or fail cleanly within the output limit, and
//! anything the encoder produces must decode back to its input.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pktdissect_core::decompress::Algorithm;

/// Output ceiling for arbitrary input.
const MAX_OUTPUT: usize = 1024 * 1024; // 1MB

fuzz_target!(|data: &[u8]| {
    if let Ok(out) = Algorithm::Lz77.decompress(data, MAX_OUTPUT) {
        assert!(out.data.len() <= MAX_OUTPUT);
        assert!(out.consumed <= data.len());
    }

    let packed = Algorithm::Lz77.compress(data);
    let out = Algorithm::Lz77
        .decompress(&packed, data.len())
        .expect("encoder output decodes");
    assert_eq!(out.data, data);
});
