//! Producer → hub task channels.
//!
//! The ESP-NOW receive callback and the MQTT connection thread never touch
//! bridge state.  They push owned events into bounded `embassy-sync`
//! channels with `try_send` and return immediately; the hub task is the
//! only consumer.
//!
//! Broker lifecycle events (`Connected`, `Disconnected`, `Subscribed`) go
//! through a latest-value [`Signal`] instead of the data queue, so a burst
//! of messages can never push out the event that drives subscription.
//!
//! ```text
//! ┌────────────────┐  RadioFrame   ┌──────────────┐
//! │ ESP-NOW recv cb│──────────────▶│              │
//! └────────────────┘               │   Hub Task   │
//! ┌────────────────┐  BrokerEvent  │  (consumer)  │
//! │ MQTT conn thread│──┬──────────▶│  BROKER_RX   │
//! └────────────────┘   └──────────▶│  BROKER_LINK │
//!                                  └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use heapless::Vec;

use crate::bridge::broker::MAX_RADIO_PAYLOAD;
use crate::bridge::device::MacAddress;

/// One ESP-NOW frame as received.  Fixed-capacity so the radio callback
/// never allocates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioFrame {
    pub src: MacAddress,
    pub payload: Vec<u8, MAX_RADIO_PAYLOAD>,
}

/// Broker client lifecycle and data events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    Connected,
    Disconnected,
    Subscribed { msg_id: u32 },
    Published { msg_id: u32 },
    Received { topic: String, payload: std::vec::Vec<u8> },
    Error,
}

impl BrokerEvent {
    /// Connection lifecycle, as opposed to traffic.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Connected | Self::Disconnected | Self::Subscribed { .. }
        )
    }
}

/// Channel depth for radio frames.  Sized for a burst of spheres
/// reporting within one housekeeping tick.
const RADIO_DEPTH: usize = 16;

const BROKER_DEPTH: usize = 8;

/// Radio receive callback → hub task.
pub static RADIO_RX: Channel<CriticalSectionRawMutex, RadioFrame, RADIO_DEPTH> = Channel::new();

/// MQTT connection thread → hub task: messages, acks, errors.
pub static BROKER_RX: Channel<CriticalSectionRawMutex, BrokerEvent, BROKER_DEPTH> = Channel::new();

/// MQTT connection thread → hub task: most recent lifecycle event.
pub static BROKER_LINK: Signal<CriticalSectionRawMutex, BrokerEvent> = Signal::new();

/// Enqueue a received radio frame.  Safe to call from the Wi-Fi task
/// context: no allocation, no blocking, no logging.
///
/// Returns `false` if the frame was dropped (oversized or queue full).
pub fn push_radio_frame(src: MacAddress, data: &[u8]) -> bool {
    let Ok(payload) = Vec::from_slice(data) else {
        return false;
    };
    RADIO_RX.try_send(RadioFrame { src, payload }).is_ok()
}

/// Hand a broker event to the hub task.  Lifecycle events replace any
/// unconsumed one and always succeed; other events return `false` if the
/// queue was full.
pub fn push_broker_event(event: BrokerEvent) -> bool {
    if event.is_lifecycle() {
        BROKER_LINK.signal(event);
        return true;
    }
    BROKER_RX.try_send(event).is_ok()
}

/// Non-blocking receive for callers outside the hub executor.
pub fn try_recv_radio_frame() -> Option<RadioFrame> {
    RADIO_RX.try_receive().ok()
}

pub fn try_recv_broker_event() -> Option<BrokerEvent> {
    BROKER_RX.try_receive().ok()
}

pub fn try_take_link_event() -> Option<BrokerEvent> {
    BROKER_LINK.try_take()
}
