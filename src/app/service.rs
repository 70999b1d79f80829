//! Application service — the hexagonal core.
//!
//! [`HubService`] owns the telemetry buffer, peer table and broker link
//! together with the storage, radio, broker and clock adapters.  Exactly
//! one instance exists and only the hub task touches it, so every handler
//! runs to completion: a pull's snapshot → publish → clear can never
//! interleave with a reading being added.
//!
//! ```text
//!  RadioFrame ──▶ ┌──────────────────────────┐ ──▶ RadioPort (config push)
//!                 │        HubService         │
//! BrokerEvent ──▶ │ Buffer · Registry · Store │ ──▶ BrokerPort (snapshot)
//!                 │ Peers · BrokerLink        │ ──▶ EventSink
//!                 └──────────────────────────┘
//! ```

use log::{debug, error, info, warn};

use crate::bridge::broker::{BrokerLink, Inbound, LinkState, Topics, classify, line_protocol};
use crate::bridge::config_store::{CONFIG_NAMESPACE, ConfigStore};
use crate::bridge::device::{DeviceId, MacAddress};
use crate::bridge::peers::{PeerState, PeerTable};
use crate::bridge::registry::{DeviceRegistry, REGISTRY_NAMESPACE};
use crate::bridge::telemetry::TelemetryBuffer;
use crate::config::{DeliveryPolicy, HUB_NAMESPACE, HubConfig};
use crate::error::HubError;
use crate::events::BrokerEvent;

use super::events::HubEvent;
use super::ports::{BrokerPort, ClockPort, EventSink, RadioPort, StoragePort};

/// Namespaces wiped by a factory reset.  TLS material in `certs` is
/// provisioned at the factory and survives.
pub const RESET_NAMESPACES: [&str; 3] = [REGISTRY_NAMESPACE, CONFIG_NAMESPACE, HUB_NAMESPACE];

// ───────────────────────────────────────────────────────────────
// Counters
// ───────────────────────────────────────────────────────────────

/// Running totals since boot, logged with every served pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub readings_accepted: u32,
    /// Malformed payloads.
    pub readings_rejected: u32,
    /// Well-formed readings lost to a full buffer.
    pub readings_dropped: u32,
    pub pulls_served: u32,
    pub configs_stored: u32,
    pub pushes_sent: u32,
    pub pushes_failed: u32,
}

// ───────────────────────────────────────────────────────────────
// HubService
// ───────────────────────────────────────────────────────────────

pub struct HubService<S, R, B, C> {
    store: S,
    radio: R,
    broker: B,
    clock: C,
    config: HubConfig,
    hub_id: DeviceId,
    topics: Topics,
    buffer: TelemetryBuffer,
    peers: PeerTable,
    link: BrokerLink,
    registry: DeviceRegistry,
    configs: ConfigStore,
    stats: HubStats,
}

impl<S, R, B, C> HubService<S, R, B, C>
where
    S: StoragePort,
    R: RadioPort,
    B: BrokerPort,
    C: ClockPort,
{
    pub fn new(config: HubConfig, hub_id: DeviceId, store: S, radio: R, broker: B, clock: C) -> Self {
        let topics = Topics::new(&config.app_namespace, hub_id);
        let link = BrokerLink::new(config.subscribe_settle_ms);
        Self {
            store,
            radio,
            broker,
            clock,
            config,
            hub_id,
            topics,
            buffer: TelemetryBuffer::new(),
            peers: PeerTable::new(),
            link,
            registry: DeviceRegistry::new(),
            configs: ConfigStore::new(),
            stats: HubStats::default(),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, sink: &mut impl EventSink) {
        info!(
            "Hub: {} inbound={} outbound={}",
            self.hub_id, self.topics.inbound, self.topics.outbound
        );
        sink.emit(&HubEvent::Started { hub: self.hub_id });
    }

    // ── Radio path ────────────────────────────────────────────

    /// Handle one ESP-NOW frame from `src`.
    ///
    /// Frames arriving before the radio is armed are ignored.  Otherwise
    /// the payload is buffered, the sender registered, and the sender is
    /// either admitted as a peer (first contact) or sent its configuration.
    pub fn on_radio_frame(&mut self, src: MacAddress, payload: &[u8], sink: &mut impl EventSink) {
        if !self.link.is_armed() {
            debug!("Radio: frame before arming, ignored");
            return;
        }
        let origin = DeviceId::from_mac(src);
        let now = self.clock.now_local();

        match self.buffer.add(payload, origin, &now) {
            Ok(reading) => {
                let device = reading.device_id;
                let report = self.config.report_each_reading.then(|| line_protocol(reading));
                self.stats.readings_accepted += 1;
                sink.emit(&HubEvent::ReadingAccepted {
                    device,
                    buffered: self.buffer.len(),
                });
                if let Some(lines) = report {
                    if let Err(e) = self.broker.publish(&self.topics.outbound, lines.as_bytes()) {
                        warn!("Broker: per-reading report failed: {}", e);
                    }
                }
            }
            Err(e) => {
                if e == HubError::Capacity {
                    self.stats.readings_dropped += 1;
                } else {
                    self.stats.readings_rejected += 1;
                }
                sink.emit(&HubEvent::ReadingRejected { origin, error: e });
            }
        }

        match self.registry.register_if_absent(&mut self.store, origin) {
            Ok(true) => sink.emit(&HubEvent::DeviceRegistered(origin)),
            Ok(false) => {}
            Err(e) => warn!("Registry: {} not recorded: {}", origin, e),
        }

        match self.peers.observe(&src) {
            PeerState::Unknown => self.admit_peer(src, sink),
            PeerState::Known => self.push_config(src, sink),
        }
    }

    fn admit_peer(&mut self, src: MacAddress, sink: &mut impl EventSink) {
        let origin = DeviceId::from_mac(src);
        if self.peers.is_full() {
            warn!("Radio: peer table full, {} not admitted", origin);
            return;
        }
        if let Err(e) = self.radio.add_peer(&src) {
            warn!("Radio: could not admit {}: {}", origin, e);
            return;
        }
        match self.peers.mark_known(&src) {
            Ok(()) => sink.emit(&HubEvent::PeerAdmitted(origin)),
            Err(e) => warn!("Radio: {} admitted by radio but not tracked: {}", origin, e),
        }
    }

    fn push_config(&mut self, src: MacAddress, sink: &mut impl EventSink) {
        let device = DeviceId::from_mac(src);
        let doc = self.configs.get_or_default(&self.store, device, self.hub_id);

        if let Err(e) = self.radio.send(&src, doc.as_bytes()) {
            self.stats.pushes_failed += 1;
            error!("Radio: config push to {} failed: {}", device, e);
            return;
        }
        self.stats.pushes_sent += 1;
        sink.emit(&HubEvent::ConfigPushed {
            device,
            bytes: doc.len(),
        });

        if self.config.delivery_policy == DeliveryPolicy::DeleteOnSend {
            if let Err(e) = self.configs.remove(&mut self.store, device) {
                warn!("Store: could not retire delivered config for {}: {}", device, e);
            }
        }
    }

    // ── Broker path ───────────────────────────────────────────

    pub fn on_broker_event(&mut self, event: BrokerEvent, sink: &mut impl EventSink) {
        match event {
            BrokerEvent::Connected => {
                info!("Broker: connected");
                self.link.on_connected(self.clock.uptime_ms());
                sink.emit(&HubEvent::LinkChanged(self.link.state()));
            }
            BrokerEvent::Disconnected => {
                warn!("Broker: disconnected");
                self.link.on_disconnected();
                sink.emit(&HubEvent::LinkChanged(self.link.state()));
            }
            BrokerEvent::Subscribed { msg_id } => {
                info!("Broker: subscribed (msg_id={})", msg_id);
                let first = self.link.on_subscribed();
                sink.emit(&HubEvent::LinkChanged(self.link.state()));
                if first {
                    self.arm_radio(sink);
                }
            }
            BrokerEvent::Published { msg_id } => debug!("Broker: published (msg_id={})", msg_id),
            BrokerEvent::Received { topic, payload } => {
                if topic != self.topics.inbound {
                    warn!("Broker: message on unexpected topic {}, dropped", topic);
                    return;
                }
                self.on_inbound(&payload, sink);
            }
            BrokerEvent::Error => error!("Broker: client reported an error"),
        }
    }

    fn arm_radio(&mut self, sink: &mut impl EventSink) {
        match self.radio.start() {
            Ok(()) => {
                info!("Radio: armed on channel {}", self.config.radio_channel);
                sink.emit(&HubEvent::RadioArmed);
            }
            Err(e) => {
                error!("Radio: start failed: {}, retrying on next subscription", e);
                self.link.disarm();
            }
        }
    }

    fn on_inbound(&mut self, payload: &[u8], sink: &mut impl EventSink) {
        match classify(payload) {
            Ok(Inbound::Pull) => {
                info!("Broker: pull request");
                if let Err(e) = self.serve_pull(sink) {
                    // Readings stay buffered for the next pull.
                    debug!("Broker: pull deferred: {}", e);
                }
            }
            Ok(Inbound::Configure { target, document }) => {
                match self.configs.put(&mut self.store, target, &document) {
                    Ok(()) => {
                        self.stats.configs_stored += 1;
                        sink.emit(&HubEvent::ConfigStored(target));
                    }
                    Err(e) => error!("Store: config for {} not persisted: {}", target, e),
                }
            }
            Err(e) => warn!(
                "Broker: dropping inbound message: {} ({:?})",
                e,
                String::from_utf8_lossy(payload)
            ),
        }
    }

    /// Publish the buffered readings on the outbound topic and clear the
    /// buffer.  If the broker rejects the publish the readings are kept.
    pub fn serve_pull(&mut self, sink: &mut impl EventSink) -> Result<(), HubError> {
        let snapshot = self.buffer.snapshot();
        let readings = self.buffer.len();

        match self.broker.publish(&self.topics.outbound, snapshot.as_bytes()) {
            Ok(msg_id) => {
                self.buffer.clear();
                self.stats.pulls_served += 1;
                info!(
                    "Broker: published {} readings to {} (msg_id={})",
                    readings, self.topics.outbound, msg_id
                );
                info!("Hub: stats {:?}", self.stats);
                sink.emit(&HubEvent::PullServed { readings });
                Ok(())
            }
            Err(e) => {
                warn!("Broker: snapshot publish failed: {}, keeping {} readings", e, readings);
                Err(e.into())
            }
        }
    }

    // ── Housekeeping ──────────────────────────────────────────

    /// Issue the subscribe request once the settle delay has elapsed.
    pub fn poll(&mut self) {
        let now = self.clock.uptime_ms();
        if !self.link.poll(now) {
            return;
        }
        match self.broker.subscribe(&self.topics.inbound) {
            Ok(msg_id) => info!(
                "Broker: subscribe requested for {} (msg_id={})",
                self.topics.inbound, msg_id
            ),
            Err(e) => {
                warn!("Broker: subscribe request failed: {}, retrying", e);
                self.link.retry_subscribe(now);
            }
        }
    }

    /// Erase the registry, stored device configurations, the hub's own
    /// settings and the in-memory buffer.  The caller restarts the device
    /// afterwards.
    pub fn factory_reset(&mut self, sink: &mut impl EventSink) -> Result<(), HubError> {
        warn!("Hub: factory reset");
        for namespace in RESET_NAMESPACES {
            self.store.erase_namespace(namespace)?;
        }
        self.buffer.clear();
        sink.emit(&HubEvent::FactoryReset);
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn hub_id(&self) -> DeviceId {
        self.hub_id
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn buffer(&self) -> &TelemetryBuffer {
        &self.buffer
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    pub fn is_radio_armed(&self) -> bool {
        self.link.is_armed()
    }

    pub fn stats(&self) -> HubStats {
        self.stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
