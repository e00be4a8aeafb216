//! Fuzz target: `meter::frame::decode`
//!
//! Drives arbitrary byte sequences into the meter response decoder and
//! asserts that it never panics, only accepts the two known frame
//! lengths, and never yields negative or non-finite readings.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use evspot::meter::frame::{MAX_RESPONSE_LEN, decode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(sample) = decode(data) else {
        return;
    };

    assert!(data.len() == 7 || data.len() == MAX_RESPONSE_LEN);
    for value in [
        sample.voltage_v,
        sample.current_a,
        sample.power_w,
        sample.frequency_hz,
        sample.power_factor,
    ] {
        assert!(value.is_finite() && value >= 0.0, "reading out of range: {value}");
    }
    if sample.current_a == 0.0 {
        assert_eq!(sample.power_w, 0.0, "zero current must report zero power");
    }

    // Same bytes, same answer.
    assert_eq!(decode(data).ok(), Some(sample));
});
