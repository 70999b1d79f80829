//! End-to-end flows through `HubService`: radio frames and broker events
//! in, radio sends and broker publishes out.

use serde_json::Value;

use sphere_hub::app::events::HubEvent;
use sphere_hub::app::service::HubService;
use sphere_hub::bridge::broker::LinkState;
use sphere_hub::bridge::config_store::CONFIG_NAMESPACE;
use sphere_hub::bridge::device::{DeviceId, MacAddress};
use sphere_hub::bridge::peers::PEER_CAPACITY;
use sphere_hub::bridge::registry::REGISTRY_NAMESPACE;
use sphere_hub::bridge::telemetry::BUFFER_CAPACITY;
use sphere_hub::app::ports::StorageError;
use sphere_hub::config::{DeliveryPolicy, HUB_NAMESPACE, HubConfig};
use sphere_hub::error::HubError;
use sphere_hub::events::BrokerEvent;

use crate::mocks::{FIXED_TIME, ManualClock, MockBroker, MockRadio, MockStore, RecordingSink};

const HUB: MacAddress = [0x24, 0x6F, 0x28, 0x00, 0x00, 0x01];
const SPHERE: MacAddress = [0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6];
const READING: &[u8] = b"55.0,21.3,3.70,1 A1B2C3D4E5F6";
const INBOUND: &str = "ismart/hub/246F28000001";
const OUTBOUND: &str = "ismart/app/246F28000001";
const CONFIG_DOC: &str = r#"{"MACSLAVE":"A1B2C3D4E5F6","riegoAuto":1,"ml":20}"#;

struct Harness {
    hub: HubService<MockStore, MockRadio, MockBroker, ManualClock>,
    store: MockStore,
    radio: MockRadio,
    broker: MockBroker,
    clock: ManualClock,
    sink: RecordingSink,
}

impl Harness {
    fn new(config: HubConfig) -> Self {
        let store = MockStore::default();
        let radio = MockRadio::default();
        let broker = MockBroker::default();
        let clock = ManualClock::default();
        let hub = HubService::new(
            config,
            DeviceId::from_mac(HUB),
            store.clone(),
            radio.clone(),
            broker.clone(),
            clock.clone(),
        );
        Self {
            hub,
            store,
            radio,
            broker,
            clock,
            sink: RecordingSink::new(),
        }
    }

    /// Connected, settle delay elapsed, subscription acknowledged.
    fn armed(config: HubConfig) -> Self {
        let mut h = Self::new(config);
        h.broker_event(BrokerEvent::Connected);
        h.clock.advance(500);
        h.hub.poll();
        h.broker_event(BrokerEvent::Subscribed { msg_id: 1 });
        h.sink.clear();
        h
    }

    fn broker_event(&mut self, event: BrokerEvent) {
        self.hub.on_broker_event(event, &mut self.sink);
    }

    fn inbound(&mut self, payload: &str) {
        self.broker_event(BrokerEvent::Received {
            topic: INBOUND.into(),
            payload: payload.as_bytes().to_vec(),
        });
    }

    fn radio_frame(&mut self, src: MacAddress, payload: &[u8]) {
        self.hub.on_radio_frame(src, payload, &mut self.sink);
    }

    fn published(&self) -> Vec<(String, String)> {
        self.broker.0.borrow().published.clone()
    }

    fn sent(&self) -> Vec<(MacAddress, Vec<u8>)> {
        self.radio.0.borrow().sent.clone()
    }
}

fn armed() -> Harness {
    Harness::armed(HubConfig::default())
}

// ── Scenarios A–D ─────────────────────────────────────────────

#[test]
fn scenario_a_reading_is_buffered() {
    let mut h = armed();
    h.radio_frame(SPHERE, READING);

    let readings = h.hub.buffer().readings();
    assert_eq!(readings.len(), 1);
    let r = &readings[0];
    assert_eq!(r.device_id.to_string(), "A1B2C3D4E5F6");
    assert_eq!(r.humidity, 55.0);
    assert_eq!(r.temperature, 21.3);
    assert_eq!(r.battery_voltage, 3.70);
    assert_eq!(r.irrigation, 1);
    assert_eq!(r.timestamp, FIXED_TIME);
}

#[test]
fn scenario_b_pull_publishes_snapshot_and_clears() {
    let mut h = armed();
    h.radio_frame(SPHERE, READING);
    h.inbound(r#"{"Data": true}"#);

    let published = h.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, OUTBOUND);

    let doc: Value = serde_json::from_str(&published[0].1).unwrap();
    let list = doc.as_array().unwrap();
    assert_eq!(list.len(), 1);
    let entry = &list[0];
    assert_eq!(entry["mac"], "A1B2C3D4E5F6");
    assert!((entry["humedad"].as_f64().unwrap() - 55.0).abs() < 1e-4);
    assert!((entry["temperatura"].as_f64().unwrap() - 21.3).abs() < 1e-4);
    assert!((entry["bateria"].as_f64().unwrap() - 3.70).abs() < 1e-4);
    assert_eq!(entry["riego"], 1);
    assert_eq!(entry["timestamp"], FIXED_TIME);

    assert_eq!(h.hub.buffer().snapshot(), "[]");
    assert!(h.sink.contains(&HubEvent::PullServed { readings: 1 }));
}

#[test]
fn scenario_c_configuration_is_stored() {
    let mut h = armed();
    h.inbound(CONFIG_DOC);

    assert_eq!(
        h.store.get_str(CONFIG_NAMESPACE, "A1B2C3D4E5F6").as_deref(),
        Some(CONFIG_DOC)
    );
    assert!(h
        .sink
        .contains(&HubEvent::ConfigStored(DeviceId::from_mac(SPHERE))));
}

#[test]
fn scenario_d_known_device_receives_stored_configuration() {
    let mut h = armed();
    h.radio_frame(SPHERE, READING);
    h.inbound(r#"{"Data": true}"#);
    h.inbound(CONFIG_DOC);
    assert!(h.sent().is_empty(), "first contact never pushes");

    h.radio_frame(SPHERE, READING);

    assert_eq!(h.sent(), vec![(SPHERE, CONFIG_DOC.as_bytes().to_vec())]);
    assert_eq!(h.hub.stats().pushes_sent, 1);
}

// ── Peer lifecycle ────────────────────────────────────────────

#[test]
fn first_transmission_admits_and_registers() {
    let mut h = armed();
    let id = DeviceId::from_mac(SPHERE);
    h.radio_frame(SPHERE, READING);

    assert_eq!(h.radio.0.borrow().peers, vec![SPHERE]);
    assert!(h.sent().is_empty());
    assert!(h.sink.contains(&HubEvent::DeviceRegistered(id)));
    assert!(h.sink.contains(&HubEvent::PeerAdmitted(id)));
    assert_eq!(h.store.get(REGISTRY_NAMESPACE, "A1B2C3D4E5F6"), Some(vec![1]));

    // Registration happens once per device, not per session.
    h.sink.clear();
    h.radio_frame(SPHERE, READING);
    assert!(!h.sink.contains(&HubEvent::DeviceRegistered(id)));
}

#[test]
fn known_device_without_config_gets_default_document() {
    let mut h = armed();
    h.radio_frame(SPHERE, READING);
    h.radio_frame(SPHERE, READING);

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        String::from_utf8(sent[0].1.clone()).unwrap(),
        r#"{"MACHUB":"246F28000001","MACSLAVE":"A1B2C3D4E5F6","colorLED":65280,"riegoAuto":0,"diasRiego":0,"horaRiego":"08:00","ml":0}"#
    );
}

#[test]
fn every_later_transmission_pushes() {
    let mut h = armed();
    for _ in 0..4 {
        h.radio_frame(SPHERE, READING);
    }
    assert_eq!(h.sent().len(), 3);
}

#[test]
fn malformed_payload_still_drives_peer_logic() {
    let mut h = armed();
    h.radio_frame(SPHERE, b"garbage");
    h.radio_frame(SPHERE, b"garbage");

    assert!(h.hub.buffer().is_empty());
    assert_eq!(h.hub.stats().readings_rejected, 2);
    assert_eq!(h.sent().len(), 1);
}

#[test]
fn rejected_peer_stays_unknown() {
    let mut h = armed();
    h.radio.0.borrow_mut().reject_peers = true;
    h.radio_frame(SPHERE, READING);
    h.radio_frame(SPHERE, READING);
    assert!(h.sent().is_empty());
    assert_eq!(h.hub.peers().len(), 0);

    h.radio.0.borrow_mut().reject_peers = false;
    h.radio_frame(SPHERE, READING);
    assert_eq!(h.hub.peers().len(), 1);
    assert!(h.sent().is_empty());
}

#[test]
fn peer_table_capacity_respected() {
    let mut h = armed();
    for i in 0..=PEER_CAPACITY {
        h.radio_frame([0x10, 0, 0, 0, 0, i as u8], READING);
    }
    assert_eq!(h.hub.peers().len(), PEER_CAPACITY);
    assert_eq!(h.radio.0.borrow().peers.len(), PEER_CAPACITY);
}

#[test]
fn failed_push_is_counted_not_retried() {
    let mut h = armed();
    h.radio_frame(SPHERE, READING);
    h.radio.0.borrow_mut().fail_sends = true;
    h.radio_frame(SPHERE, READING);

    assert_eq!(h.hub.stats().pushes_failed, 1);
    assert!(h.sent().is_empty());
}

// ── Delivery policy ───────────────────────────────────────────

#[test]
fn keep_until_overwritten_resends_same_document() {
    let mut h = armed();
    h.inbound(CONFIG_DOC);
    for _ in 0..3 {
        h.radio_frame(SPHERE, READING);
    }
    let sent = h.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(_, doc)| doc == CONFIG_DOC.as_bytes()));
}

#[test]
fn delete_on_send_falls_back_to_default() {
    let config = HubConfig {
        delivery_policy: DeliveryPolicy::DeleteOnSend,
        ..HubConfig::default()
    };
    let mut h = Harness::armed(config);
    h.inbound(CONFIG_DOC);
    h.radio_frame(SPHERE, READING);
    h.radio_frame(SPHERE, READING);
    h.radio_frame(SPHERE, READING);

    let sent = h.sent();
    assert_eq!(sent[0].1, CONFIG_DOC.as_bytes());
    assert!(String::from_utf8_lossy(&sent[1].1).contains("MACHUB"));
    assert_eq!(h.store.get(CONFIG_NAMESPACE, "A1B2C3D4E5F6"), None);
}

// ── Broker link ───────────────────────────────────────────────

#[test]
fn frames_before_first_subscription_are_ignored() {
    let mut h = Harness::new(HubConfig::default());
    h.radio_frame(SPHERE, READING);
    assert!(h.hub.buffer().is_empty());
    assert!(h.radio.0.borrow().peers.is_empty());
}

#[test]
fn subscribe_waits_for_settle_delay() {
    let mut h = Harness::new(HubConfig::default());
    h.broker_event(BrokerEvent::Connected);

    h.clock.advance(499);
    h.hub.poll();
    assert!(h.broker.0.borrow().subscriptions.is_empty());

    h.clock.advance(1);
    h.hub.poll();
    h.hub.poll();
    assert_eq!(h.broker.0.borrow().subscriptions, vec![INBOUND.to_string()]);
}

#[test]
fn failed_subscribe_is_retried_after_settle() {
    let mut h = Harness::new(HubConfig::default());
    h.broker.0.borrow_mut().fail_subscribe = true;
    h.broker_event(BrokerEvent::Connected);
    h.clock.advance(500);
    h.hub.poll();
    assert!(h.broker.0.borrow().subscriptions.is_empty());

    h.broker.0.borrow_mut().fail_subscribe = false;
    h.clock.advance(500);
    h.hub.poll();
    assert_eq!(h.broker.0.borrow().subscriptions.len(), 1);
}

#[test]
fn first_subscription_arms_radio_once() {
    let mut h = armed();
    assert!(h.hub.is_radio_armed());
    assert_eq!(h.radio.0.borrow().starts, 1);

    h.broker_event(BrokerEvent::Disconnected);
    assert_eq!(h.hub.link_state(), LinkState::Disconnected);
    h.broker_event(BrokerEvent::Connected);
    h.clock.advance(500);
    h.hub.poll();
    h.broker_event(BrokerEvent::Subscribed { msg_id: 2 });

    assert_eq!(h.hub.link_state(), LinkState::Subscribed);
    assert_eq!(h.radio.0.borrow().starts, 1);
    assert_eq!(h.broker.0.borrow().subscriptions.len(), 2);
}

#[test]
fn radio_start_failure_retries_on_next_subscription() {
    let mut h = Harness::new(HubConfig::default());
    h.radio.0.borrow_mut().fail_start = true;
    h.broker_event(BrokerEvent::Connected);
    h.broker_event(BrokerEvent::Subscribed { msg_id: 1 });
    assert!(!h.hub.is_radio_armed());

    h.radio.0.borrow_mut().fail_start = false;
    h.broker_event(BrokerEvent::Subscribed { msg_id: 2 });
    assert!(h.hub.is_radio_armed());
    assert!(h.sink.contains(&HubEvent::RadioArmed));
}

#[test]
fn pull_publish_failure_keeps_readings() {
    let mut h = armed();
    h.radio_frame(SPHERE, READING);
    h.broker.0.borrow_mut().fail_publish = true;
    h.inbound(r#"{"Data": true}"#);
    assert_eq!(h.hub.buffer().len(), 1);

    h.broker.0.borrow_mut().fail_publish = false;
    h.inbound(r#"{"Data": true}"#);
    assert!(h.hub.buffer().is_empty());
    assert_eq!(h.published().len(), 1);
}

#[test]
fn empty_pull_publishes_empty_list() {
    let mut h = armed();
    h.inbound(r#"{"Data": true}"#);
    assert_eq!(h.published(), vec![(OUTBOUND.to_string(), "[]".to_string())]);
}

#[test]
fn message_on_other_topic_is_dropped() {
    let mut h = armed();
    h.radio_frame(SPHERE, READING);
    h.broker_event(BrokerEvent::Received {
        topic: "ismart/hub/000000000000".into(),
        payload: br#"{"Data": true}"#.to_vec(),
    });
    assert!(h.published().is_empty());
    assert_eq!(h.hub.buffer().len(), 1);
}

#[test]
fn invalid_inbound_documents_change_nothing() {
    let mut h = armed();
    h.inbound("not json");
    h.inbound(r#"{"riegoAuto":1}"#);
    h.inbound(r#"{"MACSLAVE":"xyz"}"#);
    assert!(h.published().is_empty());
    assert!(h.store.0.borrow().entries.is_empty());
}

#[test]
fn per_reading_report_uses_line_protocol() {
    let config = HubConfig {
        report_each_reading: true,
        ..HubConfig::default()
    };
    let mut h = Harness::armed(config);
    h.radio_frame(SPHERE, READING);

    let published = h.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, OUTBOUND);
    assert!(published[0].1.starts_with("temperatura,device=A1B2C3D4E5F6 value=21.30\n"));
    assert_eq!(h.hub.buffer().len(), 1, "report does not consume the buffer");
}

// ── Capacity and store failures ───────────────────────────────

#[test]
fn full_buffer_drops_new_readings() {
    let mut h = armed();
    for _ in 0..BUFFER_CAPACITY + 3 {
        h.radio_frame(SPHERE, READING);
    }
    assert_eq!(h.hub.buffer().len(), BUFFER_CAPACITY);
    assert_eq!(h.hub.stats().readings_dropped, 3);
    assert!(h.sink.contains(&HubEvent::ReadingRejected {
        origin: DeviceId::from_mac(SPHERE),
        error: HubError::Capacity,
    }));
}

#[test]
fn store_write_failure_is_not_fatal() {
    let mut h = armed();
    h.store.0.borrow_mut().fail_writes = true;

    h.inbound(CONFIG_DOC);
    assert_eq!(h.hub.stats().configs_stored, 0);

    h.radio_frame(SPHERE, READING);
    assert_eq!(h.hub.buffer().len(), 1);
    assert!(h.hub.peers().len() == 1);
}

#[test]
fn store_read_failure_degrades_to_default() {
    let mut h = armed();
    h.inbound(CONFIG_DOC);
    h.store.0.borrow_mut().fail_reads = true;
    h.radio_frame(SPHERE, READING);
    h.radio_frame(SPHERE, READING);

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert!(String::from_utf8_lossy(&sent[0].1).contains(r#""MACHUB":"246F28000001""#));
}

#[test]
fn factory_reset_erases_bridge_state_but_keeps_certificates() {
    let mut h = armed();
    h.inbound(CONFIG_DOC);
    h.radio_frame(SPHERE, READING);
    h.store.0.borrow_mut().entries.insert(
        (HUB_NAMESPACE.into(), "hubcfg".into()),
        vec![0x01],
    );
    h.store.0.borrow_mut().entries.insert(
        ("certs".into(), "ca".into()),
        b"-----BEGIN CERTIFICATE-----".to_vec(),
    );

    h.hub.factory_reset(&mut h.sink).unwrap();

    let entries = &h.store.0.borrow().entries;
    assert_eq!(entries.len(), 1);
    assert!(entries.contains_key(&("certs".to_string(), "ca".to_string())));
    assert!(h.hub.buffer().is_empty());
    assert!(h.sink.contains(&HubEvent::FactoryReset));
}

#[test]
fn factory_reset_reports_store_failure() {
    let mut h = armed();
    h.store.0.borrow_mut().fail_writes = true;
    assert_eq!(
        h.hub.factory_reset(&mut h.sink),
        Err(HubError::Store(StorageError::IoError))
    );
    assert!(!h.sink.contains(&HubEvent::FactoryReset));
}
