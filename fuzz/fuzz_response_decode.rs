//! Fuzz target for the client-side response decoder.
//!
//! Run with: cargo +nightly fuzz run fuzz_response_decode

#![no_main]

use kvrt_core::ipc::{codec, frame, render};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(response) = codec::decode_response(frame::payload(data)) {
        let _ = render(&response);
    }
});
