//! ESP-NOW radio adapter.
//!
//! Implements [`RadioPort`].  The receive callback runs in the Wi-Fi task;
//! it only copies the frame into [`RADIO_RX`](crate::events::RADIO_RX)
//! and returns.
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::espnow::EspNow` on the
//!   station interface, unencrypted, with the broadcast peer registered
//!   at start.
//! - **all other targets**: records peers and sends for inspection.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{RadioPort, TransportError};
use crate::bridge::broker::MAX_RADIO_PAYLOAD;
#[cfg(target_os = "espidf")]
use crate::bridge::device::DeviceId;
use crate::bridge::device::MacAddress;
use crate::bridge::peers::BROADCAST;

pub struct EspNowRadio {
    channel: u8,
    #[cfg(target_os = "espidf")]
    espnow: Option<esp_idf_svc::espnow::EspNow<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimRadio,
}

/// Host-side record of radio activity.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct SimRadio {
    pub started: bool,
    pub peers: Vec<MacAddress>,
    pub sent: Vec<(MacAddress, Vec<u8>)>,
    pub fail_start: bool,
    pub fail_sends: bool,
}

impl EspNowRadio {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            #[cfg(target_os = "espidf")]
            espnow: None,
            #[cfg(not(target_os = "espidf"))]
            sim: SimRadio::default(),
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim(&self) -> &SimRadio {
        &self.sim
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_mut(&mut self) -> &mut SimRadio {
        &mut self.sim
    }

    #[cfg(target_os = "espidf")]
    fn register_peer(
        espnow: &esp_idf_svc::espnow::EspNow<'static>,
        addr: &MacAddress,
        channel: u8,
    ) -> Result<(), TransportError> {
        use esp_idf_svc::espnow::PeerInfo;
        use esp_idf_svc::sys::{ESP_ERR_ESPNOW_EXIST, ESP_ERR_ESPNOW_FULL, wifi_interface_t_WIFI_IF_STA};

        let peer = PeerInfo {
            peer_addr: *addr,
            channel,
            ifidx: wifi_interface_t_WIFI_IF_STA,
            encrypt: false,
            ..Default::default()
        };
        match espnow.add_peer(peer) {
            Ok(()) => Ok(()),
            Err(e) if e.code() == ESP_ERR_ESPNOW_EXIST as i32 => Ok(()),
            Err(e) if e.code() == ESP_ERR_ESPNOW_FULL as i32 => Err(TransportError::PeerTableFull),
            Err(e) => {
                warn!("Radio: add_peer {}: {:?}", DeviceId::from_mac(*addr), e);
                Err(TransportError::SendFailed)
            }
        }
    }
}

impl RadioPort for EspNowRadio {
    #[cfg(target_os = "espidf")]
    fn start(&mut self) -> Result<(), TransportError> {
        use esp_idf_svc::espnow::EspNow;

        if self.espnow.is_some() {
            return Ok(());
        }
        let espnow = EspNow::take().map_err(|e| {
            warn!("Radio: ESP-NOW init failed: {:?}", e);
            TransportError::NotReady
        })?;
        espnow
            .register_recv_cb(|info: &esp_idf_svc::espnow::ReceiveInfo, data: &[u8]| {
                // Wi-Fi task context: enqueue only.
                let _ = crate::events::push_radio_frame(*info.src_addr, data);
            })
            .map_err(|e| {
                warn!("Radio: recv callback registration failed: {:?}", e);
                TransportError::NotReady
            })?;
        Self::register_peer(&espnow, &BROADCAST, self.channel)?;
        info!("Radio: ESP-NOW up on channel {}", self.channel);
        self.espnow = Some(espnow);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn start(&mut self) -> Result<(), TransportError> {
        if self.sim.fail_start {
            return Err(TransportError::NotReady);
        }
        if !self.sim.started {
            self.sim.started = true;
            self.sim.peers.push(BROADCAST);
            info!("Radio(sim): up on channel {}", self.channel);
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn add_peer(&mut self, addr: &MacAddress) -> Result<(), TransportError> {
        let espnow = self.espnow.as_ref().ok_or(TransportError::NotReady)?;
        Self::register_peer(espnow, addr, self.channel)
    }

    #[cfg(not(target_os = "espidf"))]
    fn add_peer(&mut self, addr: &MacAddress) -> Result<(), TransportError> {
        if !self.sim.started {
            return Err(TransportError::NotReady);
        }
        if !self.sim.peers.contains(addr) {
            // ESP-NOW's own table holds 20 entries including broadcast.
            if self.sim.peers.len() >= 20 {
                return Err(TransportError::PeerTableFull);
            }
            self.sim.peers.push(*addr);
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn send(&mut self, addr: &MacAddress, data: &[u8]) -> Result<(), TransportError> {
        if data.len() > MAX_RADIO_PAYLOAD {
            return Err(TransportError::PayloadTooLarge);
        }
        let espnow = self.espnow.as_ref().ok_or(TransportError::NotReady)?;
        espnow.send(*addr, data).map_err(|e| {
            warn!("Radio: send to {}: {:?}", DeviceId::from_mac(*addr), e);
            TransportError::SendFailed
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn send(&mut self, addr: &MacAddress, data: &[u8]) -> Result<(), TransportError> {
        if data.len() > MAX_RADIO_PAYLOAD {
            return Err(TransportError::PayloadTooLarge);
        }
        if !self.sim.started {
            return Err(TransportError::NotReady);
        }
        if self.sim.fail_sends || !self.sim.peers.contains(addr) {
            return Err(TransportError::SendFailed);
        }
        self.sim.sent.push((*addr, data.to_vec()));
        Ok(())
    }
}
