//! Telemetry buffer.
//!
//! Spheres report one ASCII line per transmission:
//!
//! ```text
//! <humidity>,<temperature>,<battery V>,<irrigation> <device id>
//! 55.0,21.3,3.70,1 A1B2C3D4E5F6
//! ```
//!
//! Accepted readings are held in insertion order until the cloud pulls
//! them.  The buffer never evicts: once full, new readings are dropped
//! until the next pull clears it.

use log::{debug, info, warn};
use serde::Serialize;

use super::device::DeviceId;
use crate::error::{HubError, ParseError};

/// Readings held between two cloud pulls.
pub const BUFFER_CAPACITY: usize = 32;

/// One parsed sphere report, stamped with local wall-clock time on arrival.
///
/// Serialises to the outbound snapshot schema
/// `{mac, humedad, temperatura, bateria, riego, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryReading {
    #[serde(rename = "mac")]
    pub device_id: DeviceId,
    #[serde(rename = "humedad")]
    pub humidity: f32,
    #[serde(rename = "temperatura")]
    pub temperature: f32,
    #[serde(rename = "bateria")]
    pub battery_voltage: f32,
    #[serde(rename = "riego")]
    pub irrigation: u8,
    pub timestamp: String,
}

impl TelemetryReading {
    /// Parse a raw radio payload.
    ///
    /// The whole line is rejected if any field is missing, extra, or not
    /// numeric.  Trailing NULs from C-string senders are ignored.
    pub fn parse(raw: &[u8], timestamp: &str) -> Result<Self, ParseError> {
        let text = core::str::from_utf8(raw).map_err(|_| ParseError::NotUtf8)?;
        let line = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());

        let (values, id) = line
            .split_once(char::is_whitespace)
            .ok_or(ParseError::FieldCount)?;
        let id = id.trim_start();
        if id.contains(char::is_whitespace) {
            return Err(ParseError::FieldCount);
        }
        let device_id: DeviceId = id.parse()?;

        let mut fields = values.split(',');
        let humidity = next_f32(&mut fields)?;
        let temperature = next_f32(&mut fields)?;
        let battery_voltage = next_f32(&mut fields)?;
        let irrigation = fields
            .next()
            .ok_or(ParseError::FieldCount)?
            .parse::<u8>()
            .map_err(|_| ParseError::InvalidNumber)?;
        if fields.next().is_some() {
            return Err(ParseError::FieldCount);
        }

        Ok(Self {
            device_id,
            humidity,
            temperature,
            battery_voltage,
            irrigation,
            timestamp: timestamp.into(),
        })
    }
}

fn next_f32<'a>(fields: &mut impl Iterator<Item = &'a str>) -> Result<f32, ParseError> {
    let v = fields
        .next()
        .ok_or(ParseError::FieldCount)?
        .parse::<f32>()
        .map_err(|_| ParseError::InvalidNumber)?;
    // JSON has no representation for NaN or infinities.
    if v.is_finite() {
        Ok(v)
    } else {
        Err(ParseError::InvalidNumber)
    }
}

/// Bounded, insertion-ordered reading buffer.
pub struct TelemetryBuffer<const N: usize = BUFFER_CAPACITY> {
    readings: heapless::Vec<TelemetryReading, N>,
}

impl<const N: usize> TelemetryBuffer<N> {
    pub const fn new() -> Self {
        Self {
            readings: heapless::Vec::new(),
        }
    }

    /// Parse and append a reading from `origin`.
    ///
    /// On a parse error or a full buffer nothing is mutated.
    pub fn add(
        &mut self,
        raw: &[u8],
        origin: DeviceId,
        timestamp: &str,
    ) -> Result<&TelemetryReading, HubError> {
        let reading = TelemetryReading::parse(raw, timestamp).inspect_err(|e| {
            warn!(
                "Telemetry: rejected payload from {}: {} ({:?})",
                origin,
                e,
                String::from_utf8_lossy(raw)
            );
        })?;

        if reading.device_id != origin {
            debug!(
                "Telemetry: payload names {} but was sent by {}",
                reading.device_id, origin
            );
        }

        if self.readings.push(reading).is_err() {
            warn!("Telemetry: buffer full ({} readings), dropping", N);
            return Err(HubError::Capacity);
        }

        let added = self.readings.last().ok_or(HubError::Capacity)?;
        info!(
            "Telemetry: {} H={:.1} T={:.1} V={:.2} R={} at {}",
            added.device_id,
            added.humidity,
            added.temperature,
            added.battery_voltage,
            added.irrigation,
            added.timestamp
        );
        Ok(added)
    }

    /// Serialise every held reading as a compact JSON array.  Non-mutating.
    pub fn snapshot(&self) -> String {
        serde_json::to_string(self.readings.as_slice()).unwrap_or_else(|e| {
            warn!("Telemetry: snapshot serialisation failed: {}", e);
            String::from("[]")
        })
    }

    pub fn clear(&mut self) {
        self.readings.clear();
        info!("Telemetry: buffer cleared");
    }

    pub fn readings(&self) -> &[TelemetryReading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.readings.is_full()
    }
}

impl<const N: usize> Default for TelemetryBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
