//! Fuzz target for the request decoder and the dispatcher's reject path.
//!
//! Run with: cargo +nightly fuzz run fuzz_request_decode

#![no_main]

use std::sync::Arc;

use kvrt_core::ipc::{Dispatcher, StatusBody, codec, frame};
use kvrt_core::metrics::MetricsError;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let dispatcher = Dispatcher::new(Arc::new(|| -> Result<StatusBody, MetricsError> {
        Ok(StatusBody::default())
    }));

    let outcome = match codec::decode_request(frame::payload(data)) {
        Ok(request) => dispatcher.dispatch(&request),
        Err(err) if err.is_answerable() => dispatcher.reject(&err),
        Err(_) => return,
    };

    // Whatever was decoded must produce a response that survives the trip.
    let document = codec::encode_response(&outcome.response).unwrap();
    let echoed = codec::decode_response(&document).unwrap();
    assert_eq!(echoed.command, outcome.response.command);
});
