//! Fuzz target: `TelemetryBuffer::add`
//!
//! Arbitrary radio payloads must never panic, and a rejected payload must
//! leave the buffer untouched.
//!
//! cargo fuzz run fuzz_telemetry_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use sphere_hub::bridge::device::DeviceId;
use sphere_hub::bridge::telemetry::TelemetryBuffer;

const ORIGIN: DeviceId = DeviceId::from_mac([0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6]);

fuzz_target!(|data: &[u8]| {
    let mut buf: TelemetryBuffer<4> = TelemetryBuffer::new();
    match buf.add(data, ORIGIN, "2024-05-01T12:00:00") {
        Ok(reading) => {
            assert!(reading.humidity.is_finite());
            assert!(reading.temperature.is_finite());
            assert!(reading.battery_voltage.is_finite());
        }
        Err(_) => assert!(buf.is_empty()),
    }

    // The snapshot is always a JSON array.
    let snap = buf.snapshot();
    assert!(snap.starts_with('[') && snap.ends_with(']'));
});
