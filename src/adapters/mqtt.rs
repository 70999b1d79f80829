//! MQTT broker adapter.
//!
//! Implements [`BrokerPort`] for the hub's mutual-TLS broker session.  The
//! client owns the socket and reconnects on its own; a dedicated receiver
//! thread turns connection events into [`BrokerEvent`]s for the hub task.
//!
//! ```text
//!  EspMqttConnection ──next()──▶ mqtt-rx thread ──push_broker_event──▶ BROKER_RX
//!  HubService ──subscribe/publish──▶ EspMqttClient (QoS 1 enqueue)
//! ```
//!
//! On the host the adapter records subscriptions and publishes.  With
//! loopback enabled it also acknowledges them through the broker channel,
//! which is what the host simulation binary runs against.

use log::{info, warn};

use crate::app::ports::{BrokerPort, TransportError};
#[cfg(target_os = "espidf")]
use crate::bridge::broker::MAX_INBOUND_PAYLOAD;
use crate::events::{BrokerEvent, push_broker_event};

#[cfg(target_os = "espidf")]
use super::cert_store::CertBundle;
#[cfg(target_os = "espidf")]
use crate::bridge::device::DeviceId;
#[cfg(target_os = "espidf")]
use crate::config::HubConfig;

pub struct MqttBroker {
    #[cfg(target_os = "espidf")]
    client: esp_idf_svc::mqtt::client::EspMqttClient<'static>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimBroker,
}

/// Host-side record of broker traffic.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct SimBroker {
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, Vec<u8>)>,
    pub fail_subscribe: bool,
    pub fail_publish: bool,
    /// Acknowledge through `BROKER_RX` like a real connection would.
    pub loopback: bool,
    next_msg_id: u32,
}

#[cfg(not(target_os = "espidf"))]
impl SimBroker {
    fn next_id(&mut self) -> u32 {
        self.next_msg_id = self.next_msg_id.wrapping_add(1);
        self.next_msg_id
    }
}

/// The MQTT client keeps pointers to the PEM buffers for its lifetime.
#[cfg(target_os = "espidf")]
fn leak_pem(pem: Vec<u8>) -> esp_idf_svc::tls::X509<'static> {
    let pem: &'static [u8] = Box::leak(pem.into_boxed_slice());
    esp_idf_svc::tls::X509::pem_until_nul(pem)
}

impl MqttBroker {
    /// Start the client and its receiver thread.  The connection is
    /// established in the background; `Connected` arrives on `BROKER_RX`.
    #[cfg(target_os = "espidf")]
    pub fn connect(
        config: &HubConfig,
        hub_id: DeviceId,
        certs: CertBundle,
    ) -> Result<Self, TransportError> {
        use esp_idf_svc::mqtt::client::{EspMqttClient, MqttClientConfiguration};

        let client_id = hub_id.to_string();
        let non_empty = |s: &str| (!s.is_empty()).then_some(s);
        let conf = MqttClientConfiguration {
            client_id: Some(client_id.as_str()),
            username: non_empty(&config.broker_username),
            password: non_empty(&config.broker_password),
            server_certificate: Some(leak_pem(certs.ca_cert)),
            client_certificate: Some(leak_pem(certs.client_cert)),
            private_key: Some(leak_pem(certs.client_key)),
            ..Default::default()
        };

        let (client, conn) = EspMqttClient::new(&config.broker_uri, &conf).map_err(|e| {
            warn!("Broker: client init failed: {:?}", e);
            TransportError::NotReady
        })?;

        std::thread::Builder::new()
            .name("mqtt-rx".into())
            .stack_size(6 * 1024)
            .spawn(move || receive_loop(conn))
            .map_err(|e| {
                warn!("Broker: receiver thread spawn failed: {}", e);
                TransportError::NotReady
            })?;

        info!("Broker: client started for {} as {}", config.broker_uri, client_id);
        Ok(Self { client })
    }

    /// Simulated client.  `Connected` is queued immediately when
    /// `loopback` is set.
    #[cfg(not(target_os = "espidf"))]
    pub fn simulated(loopback: bool) -> Self {
        if loopback && !push_broker_event(BrokerEvent::Connected) {
            warn!("Broker(sim): event queue full, Connected lost");
        }
        Self {
            sim: SimBroker {
                loopback,
                ..SimBroker::default()
            },
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim(&self) -> &SimBroker {
        &self.sim
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_mut(&mut self) -> &mut SimBroker {
        &mut self.sim
    }
}

/// Forward connection events until the client is dropped.
#[cfg(target_os = "espidf")]
fn receive_loop(mut conn: esp_idf_svc::mqtt::client::EspMqttConnection) {
    use esp_idf_svc::mqtt::client::{Details, EventPayload};

    while let Ok(event) = conn.next() {
        let forwarded = match event.payload() {
            EventPayload::Connected(_) => BrokerEvent::Connected,
            EventPayload::Disconnected => BrokerEvent::Disconnected,
            EventPayload::Subscribed(msg_id) => BrokerEvent::Subscribed { msg_id },
            EventPayload::Published(msg_id) => BrokerEvent::Published { msg_id },
            EventPayload::Received {
                topic: Some(topic),
                data,
                details: Details::Complete,
                ..
            } => {
                if data.len() > MAX_INBOUND_PAYLOAD {
                    warn!("Broker: dropping {}B message on {}", data.len(), topic);
                    continue;
                }
                BrokerEvent::Received {
                    topic: topic.to_string(),
                    payload: data.to_vec(),
                }
            }
            EventPayload::Received { .. } => {
                warn!("Broker: dropping chunked or topic-less message");
                continue;
            }
            EventPayload::Error(e) => {
                warn!("Broker: connection error: {:?}", e);
                BrokerEvent::Error
            }
            _ => continue,
        };
        if !push_broker_event(forwarded) {
            warn!("Broker: hub queue full, event dropped");
        }
    }
    info!("Broker: connection closed, receiver exiting");
}

impl BrokerPort for MqttBroker {
    #[cfg(target_os = "espidf")]
    fn subscribe(&mut self, topic: &str) -> Result<u32, TransportError> {
        use esp_idf_svc::mqtt::client::QoS;

        self.client.subscribe(topic, QoS::AtLeastOnce).map_err(|e| {
            warn!("Broker: subscribe {}: {:?}", topic, e);
            TransportError::SendFailed
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn subscribe(&mut self, topic: &str) -> Result<u32, TransportError> {
        if self.sim.fail_subscribe {
            return Err(TransportError::SendFailed);
        }
        let msg_id = self.sim.next_id();
        self.sim.subscriptions.push(topic.to_string());
        if self.sim.loopback {
            let _ = push_broker_event(BrokerEvent::Subscribed { msg_id });
        }
        Ok(msg_id)
    }

    #[cfg(target_os = "espidf")]
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<u32, TransportError> {
        use esp_idf_svc::mqtt::client::QoS;

        self.client
            .enqueue(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| {
                warn!("Broker: publish {}: {:?}", topic, e);
                TransportError::SendFailed
            })
    }

    #[cfg(not(target_os = "espidf"))]
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<u32, TransportError> {
        if self.sim.fail_publish {
            return Err(TransportError::SendFailed);
        }
        let msg_id = self.sim.next_id();
        self.sim.published.push((topic.to_string(), payload.to_vec()));
        if self.sim.loopback {
            info!("Broker(sim): {} <- {}", topic, String::from_utf8_lossy(payload));
            let _ = push_broker_event(BrokerEvent::Published { msg_id });
        }
        Ok(msg_id)
    }
}
