//! The same flows against the host simulation adapters the `sphere-hub`
//! binary runs with.

use sphere_hub::adapters::espnow::EspNowRadio;
use sphere_hub::adapters::mqtt::MqttBroker;
use sphere_hub::adapters::nvs::NvsAdapter;
use sphere_hub::adapters::time::WallClock;
use sphere_hub::app::ports::{ConfigPort, StoragePort};
use sphere_hub::app::service::HubService;
use sphere_hub::bridge::device::DeviceId;
use sphere_hub::bridge::peers::BROADCAST;
use sphere_hub::config::{HUB_NAMESPACE, HubConfig};
use sphere_hub::events::BrokerEvent;

use crate::mocks::RecordingSink;

const HUB: [u8; 6] = [0x24, 0x6F, 0x28, 0x00, 0x00, 0x01];
const SPHERE: [u8; 6] = [0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6];

type SimHub = HubService<NvsAdapter, EspNowRadio, MqttBroker, WallClock>;

fn sim_hub(config: HubConfig) -> SimHub {
    let Ok(clock) = WallClock::start(&config.timezone, &config.ntp_server);
    HubService::new(
        config,
        DeviceId::from_mac(HUB),
        NvsAdapter::new().unwrap(),
        EspNowRadio::new(6),
        MqttBroker::simulated(false),
        clock,
    )
}

#[test]
fn full_cycle_on_simulation_adapters() {
    let config = HubConfig {
        subscribe_settle_ms: 0,
        ..HubConfig::default()
    };
    let mut hub = sim_hub(config);
    let mut sink = RecordingSink::new();

    hub.on_broker_event(BrokerEvent::Connected, &mut sink);
    hub.poll();
    assert_eq!(hub.broker().sim().subscriptions, vec!["ismart/hub/246F28000001"]);
    hub.on_broker_event(BrokerEvent::Subscribed { msg_id: 1 }, &mut sink);

    assert!(hub.radio().sim().started);
    assert_eq!(hub.radio().sim().peers, vec![BROADCAST]);

    hub.on_radio_frame(SPHERE, b"48.5,19.0,3.61,0 A1B2C3D4E5F6\0", &mut sink);
    hub.on_broker_event(
        BrokerEvent::Received {
            topic: "ismart/hub/246F28000001".into(),
            payload: br#"{"MACSLAVE":"a1b2c3d4e5f6","colorLED":255}"#.to_vec(),
        },
        &mut sink,
    );
    hub.on_radio_frame(SPHERE, b"48.0,19.1,3.60,0 A1B2C3D4E5F6", &mut sink);

    assert_eq!(
        hub.radio().sim().sent,
        vec![(SPHERE, br#"{"MACSLAVE":"a1b2c3d4e5f6","colorLED":255}"#.to_vec())]
    );

    hub.on_broker_event(
        BrokerEvent::Received {
            topic: "ismart/hub/246F28000001".into(),
            payload: br#"{"Data":true}"#.to_vec(),
        },
        &mut sink,
    );
    let published = &hub.broker().sim().published;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "ismart/app/246F28000001");
    let text = String::from_utf8(published[0].1.clone()).unwrap();
    assert_eq!(text.matches("\"mac\":\"A1B2C3D4E5F6\"").count(), 2);
    assert!(hub.buffer().is_empty());
}

#[test]
fn hub_config_persists_across_adapter_instances_of_same_store() {
    let mut nvs = NvsAdapter::new().unwrap();
    let cfg = HubConfig {
        radio_channel: 11,
        report_each_reading: true,
        ..HubConfig::default()
    };
    nvs.save(&cfg).unwrap();
    assert_eq!(nvs.load().unwrap(), cfg);

    nvs.erase_namespace(HUB_NAMESPACE).unwrap();
    assert_eq!(nvs.load().unwrap(), HubConfig::default());
}
