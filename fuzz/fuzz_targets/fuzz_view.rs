//! Fuzz target for byte views.
//!
//! The first bytes choose a reported length, a split point and a read
//! pattern; the rest is the captured data. Every read must either succeed
//! or fault, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pktdissect_core::tvb::{Endian, StrEncoding, View};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let extra = usize::from(data[0]);
    let split = usize::from(data[1]);
    let offset = usize::from(data[2]);
    let length = usize::from(data[3]);
    let bytes = data[4..].to_vec();

    let view = View::with_reported_length(bytes.clone(), bytes.len() + extra);
    let _ = view.get_u8(offset);
    let _ = view.get_u24(offset, Endian::Big);
    let _ = view.get_u64(offset, Endian::Little);
    let _ = view.get_uint(offset, length % 9, Endian::Big);
    let _ = view.get_bytes(offset, length);
    let _ = view.get_stringz(offset, StrEncoding::Ascii);
    let _ = view.find_line_end(offset);

    if let Ok(sub) = view.subset(offset, length) {
        let _ = sub.get_bytes(0, ..);
        let _ = sub.subset(split, ..);
    }

    // Composite of the two halves must read like the original.
    let split = split.min(bytes.len());
    if split > 0 && split < bytes.len() {
        let flat = View::new(bytes.clone());
        let composite = View::composite([
            View::new(bytes[..split].to_vec()),
            View::new(bytes[split..].to_vec()),
        ])
        .expect("non-empty members");
        assert_eq!(
            composite.get_bytes(offset, length).ok(),
            flat.get_bytes(offset, length).ok()
        );
    }
});
