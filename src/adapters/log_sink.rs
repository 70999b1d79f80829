//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing hub events to the console logger
//! (UART / USB-CDC on the device, stderr on the host).

use log::{info, warn};

use crate::app::events::HubEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`HubEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &HubEvent) {
        match event {
            HubEvent::Started { hub } => info!("START | hub={}", hub),
            HubEvent::ReadingAccepted { device, buffered } => {
                info!("RADIO | reading from {} | buffered={}", device, buffered);
            }
            HubEvent::ReadingRejected { origin, error } => {
                warn!("RADIO | payload from {} rejected: {}", origin, error);
            }
            HubEvent::DeviceRegistered(id) => info!("REGISTRY | new sphere {}", id),
            HubEvent::PeerAdmitted(id) => info!("RADIO | peer admitted {}", id),
            HubEvent::ConfigStored(id) => info!("STORE | config stored for {}", id),
            HubEvent::ConfigPushed { device, bytes } => {
                info!("RADIO | config pushed to {} ({}B)", device, bytes);
            }
            HubEvent::PullServed { readings } => info!("BROKER | pull served, {} readings", readings),
            HubEvent::LinkChanged(state) => info!("BROKER | link {:?}", state),
            HubEvent::RadioArmed => info!("RADIO | armed"),
            HubEvent::FactoryReset => warn!("RESET | persisted state erased"),
        }
    }
}
