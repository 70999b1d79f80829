//! Outbound hub events.
//!
//! The [`HubService`](super::service::HubService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  The log sink prints them;
//! tests record them.

use crate::bridge::broker::LinkState;
use crate::bridge::device::DeviceId;
use crate::error::HubError;

/// Structured events emitted by the bridge core.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// The service is up and knows its identity.
    Started { hub: DeviceId },

    /// A reading was parsed and buffered.
    ReadingAccepted { device: DeviceId, buffered: usize },

    /// A radio payload was rejected (malformed or buffer full).
    ReadingRejected { origin: DeviceId, error: HubError },

    /// First-ever transmission from this sphere was persisted.
    DeviceRegistered(DeviceId),

    /// Sphere admitted as a radio peer for this session.
    PeerAdmitted(DeviceId),

    /// A configuration document was stored for a sphere.
    ConfigStored(DeviceId),

    /// A configuration document was handed to the radio.
    ConfigPushed { device: DeviceId, bytes: usize },

    /// A cloud pull was answered.
    PullServed { readings: usize },

    /// Broker link moved to a new state.
    LinkChanged(LinkState),

    /// Radio receive path armed after the first subscription.
    RadioArmed,

    /// All persisted state was erased.
    FactoryReset,
}
