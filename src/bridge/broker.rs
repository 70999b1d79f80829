//! Broker link state and message formats.
//!
//! ```text
//!  Disconnected ──Connected──▶ Connected ──settle──▶ subscribe ──ack──▶ Subscribed
//!       ▲                         │                                      │
//!       └──────────Disconnected───┴──────────────────────────────────────┘
//! ```
//!
//! The link only tracks state; the MQTT client owns the socket and
//! reconnect policy.  The first acknowledged subscription of the process
//! arms the radio path.

use serde_json::Value;

use super::device::DeviceId;
use super::telemetry::TelemetryReading;
use crate::error::{HubError, ParseError};

/// Inbound broker payloads larger than this are dropped.
pub const MAX_INBOUND_PAYLOAD: usize = 1024;

/// ESP-NOW frame limit; configuration documents must fit in one frame.
pub const MAX_RADIO_PAYLOAD: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    /// Connected; `subscribe_due_ms` is set while a subscribe is pending.
    Connected { subscribe_due_ms: Option<u64> },
    Subscribed,
}

#[derive(Debug)]
pub struct BrokerLink {
    state: LinkState,
    settle_ms: u64,
    armed: bool,
}

impl BrokerLink {
    pub fn new(settle_ms: u32) -> Self {
        Self {
            state: LinkState::Disconnected,
            settle_ms: settle_ms as u64,
            armed: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Whether the radio path has been armed by a first subscription.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn on_connected(&mut self, now_ms: u64) {
        self.state = LinkState::Connected {
            subscribe_due_ms: Some(now_ms + self.settle_ms),
        };
    }

    /// Returns `true` exactly once per connection, when the subscribe
    /// request is due.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.state {
            LinkState::Connected {
                subscribe_due_ms: Some(due),
            } if now_ms >= due => {
                self.state = LinkState::Connected {
                    subscribe_due_ms: None,
                };
                true
            }
            _ => false,
        }
    }

    /// Re-arm the settle timer after a rejected subscribe request.
    pub fn retry_subscribe(&mut self, now_ms: u64) {
        if let LinkState::Connected { .. } = self.state {
            self.on_connected(now_ms);
        }
    }

    /// Returns `true` on the first subscription of the process.
    pub fn on_subscribed(&mut self) -> bool {
        self.state = LinkState::Subscribed;
        let first = !self.armed;
        self.armed = true;
        first
    }

    /// Undo arming so the next subscription retries the radio start.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn on_disconnected(&mut self) {
        self.state = LinkState::Disconnected;
    }
}

/// Hub topics, both derived from the hub's own id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Cloud → hub: `<ns>/hub/<id>`.
    pub inbound: String,
    /// Hub → cloud: `<ns>/app/<id>`.
    pub outbound: String,
}

impl Topics {
    pub fn new(namespace: &str, hub: DeviceId) -> Self {
        Self {
            inbound: format!("{namespace}/hub/{hub}"),
            outbound: format!("{namespace}/app/{hub}"),
        }
    }
}

/// Classified inbound broker message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// `{"Data": true}`: publish the buffered telemetry.
    Pull,
    /// Store `document` for `target`.
    Configure { target: DeviceId, document: String },
}

/// Classify an inbound payload.
///
/// `{"Data": true}` is a pull.  Anything else must name its target in a
/// `MACSLAVE` string; the document is kept in compact form with field
/// order preserved.
pub fn classify(payload: &[u8]) -> Result<Inbound, HubError> {
    if payload.len() > MAX_INBOUND_PAYLOAD {
        return Err(HubError::Protocol("inbound payload too large"));
    }
    let doc: Value =
        serde_json::from_slice(payload).map_err(|_| ParseError::InvalidDocument)?;
    let Value::Object(fields) = &doc else {
        return Err(ParseError::InvalidDocument.into());
    };

    if fields.get("Data") == Some(&Value::Bool(true)) {
        return Ok(Inbound::Pull);
    }

    let target = fields
        .get("MACSLAVE")
        .and_then(Value::as_str)
        .ok_or(HubError::Protocol("MACSLAVE missing or not a string"))?;
    let target = DeviceId::parse_lenient(target)?;

    let document = serde_json::to_string(&doc).map_err(|_| ParseError::InvalidDocument)?;
    if document.len() > MAX_RADIO_PAYLOAD {
        return Err(HubError::Protocol("configuration exceeds radio frame"));
    }
    Ok(Inbound::Configure { target, document })
}

/// Single-reading report, one `metric,device=<id> value=<v>` line per metric.
pub fn line_protocol(reading: &TelemetryReading) -> String {
    let id = reading.device_id;
    format!(
        "temperatura,device={id} value={:.2}\n\
         humedad,device={id} value={:.2}\n\
         vbat,device={id} value={:.2}\n\
         riego,device={id} value={}",
        reading.temperature, reading.humidity, reading.battery_voltage, reading.irrigation
    )
}
