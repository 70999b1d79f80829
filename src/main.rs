//! Sphere Hub Firmware — Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  NvsAdapter      EspNowRadio    MqttBroker     WallClock       │
//! │  (Storage+Config)(RadioPort)    (BrokerPort)   (ClockPort)     │
//! │  WifiStation     CertStore      LogEventSink   ButtonDriver    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              HubService (pure logic)                   │    │
//! │  │  Buffer · Registry · ConfigStore · Peers · BrokerLink  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Hub task (edge-executor): radio · broker · link · housekeeping│
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Boot order matters: the broker needs Wi-Fi and a set clock for TLS,
//! and ESP-NOW is only armed once the inbound subscription is confirmed.
#![deny(unused_must_use)]

use anyhow::{Result, anyhow};
use log::{info, warn};

use sphere_hub::adapters::device;
use sphere_hub::adapters::espnow::EspNowRadio;
use sphere_hub::adapters::log_sink::LogEventSink;
use sphere_hub::adapters::mqtt::MqttBroker;
use sphere_hub::adapters::nvs::NvsAdapter;
use sphere_hub::adapters::time::WallClock;
use sphere_hub::adapters::wifi::{ConnectivityError, WifiStation};
use sphere_hub::app::service::HubService;
use sphere_hub::config::HubConfig;
use sphere_hub::hub_task::{self, Housekeeping};

/// Give SNTP this long before stamping readings with an unsynced clock.
const TIME_SYNC_TIMEOUT_MS: u64 = 15_000;

const WIFI_SUPERVISOR_INTERVAL_MS: u32 = 500;

fn bring_up_wifi(wifi: &mut WifiStation, config: &HubConfig) -> Result<()> {
    wifi.set_credentials(&config.wifi_ssid, &config.wifi_password)
        .map_err(|e| anyhow!("WiFi credentials: {e}"))?;
    let mut backoff_ms = 2_000;
    while let Err(e) = wifi.connect() {
        if e == ConnectivityError::NoCredentials {
            return Err(anyhow!("WiFi: {e}"));
        }
        warn!("WiFi not ready ({}), retrying in {} ms", e, backoff_ms);
        std::thread::sleep(std::time::Duration::from_millis(backoff_ms));
        backoff_ms = (backoff_ms * 2).min(60_000);
    }
    Ok(())
}

// ── Device ────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn main() -> Result<()> {
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_hal::gpio::{PinDriver, Pull};
    use esp_idf_hal::peripherals::Peripherals;
    use sphere_hub::adapters::cert_store;
    use sphere_hub::drivers::button::ButtonDriver;

    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Sphere Hub v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    // ── 2. Identity, storage, config ──────────────────────────
    let hub_id = device::hub_id();
    info!("Hub id {}", hub_id);

    let mut nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init: {e}"))?;
    let config = nvs.load_or_seed();

    // ── 3. Wi-Fi (ready signal) ───────────────────────────────
    let mut wifi = WifiStation::new();
    wifi.attach(peripherals.modem, sysloop)
        .map_err(|e| anyhow!("WiFi init: {e}"))?;
    bring_up_wifi(&mut wifi, &config)?;

    // ── 4. Wall clock (time-ready signal) ─────────────────────
    let clock = WallClock::start(&config.timezone, &config.ntp_server)?;
    clock.wait_for_sync(TIME_SYNC_TIMEOUT_MS);

    // ── 5. Broker session ─────────────────────────────────────
    let certs = cert_store::load_bundle(&nvs).map_err(|e| {
        warn!("Missing TLS material: {:?}", cert_store::missing(&nvs));
        anyhow!("certificates: {e}")
    })?;
    let broker = MqttBroker::connect(&config, hub_id, certs)
        .map_err(|e| anyhow!("MQTT client: {e}"))?;

    // ── 6. Radio (armed after first subscription) ─────────────
    let radio = EspNowRadio::new(config.radio_channel);

    // ── 7. Button (BOOT, active low) ──────────────────────────
    let mut pin = PinDriver::input(peripherals.pins.gpio0)?;
    pin.set_pull(Pull::Up)?;

    wifi.spawn_supervisor(WIFI_SUPERVISOR_INTERVAL_MS)?;

    let local = Housekeeping {
        button: Some(ButtonDriver::new(pin)),
        poll_interval_ms: config.poll_interval_ms,
    };
    let hub = HubService::new(config, hub_id, nvs, radio, broker, clock);

    info!("System ready. Entering hub task.");
    hub_task::run(hub, LogEventSink::new(), local);
    Ok(())
}

// ── Host simulation ───────────────────────────────────────────

/// Input pin for runs without a button.
#[cfg(not(target_os = "espidf"))]
struct Unwired;

#[cfg(not(target_os = "espidf"))]
impl embedded_hal::digital::ErrorType for Unwired {
    type Error = core::convert::Infallible;
}

#[cfg(not(target_os = "espidf"))]
impl embedded_hal::digital::InputPin for Unwired {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }
    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

/// Two spheres reporting every few seconds, and a cloud that stores one
/// configuration and pulls telemetry periodically.
#[cfg(not(target_os = "espidf"))]
fn spawn_simulated_world(inbound: String) -> Result<()> {
    use sphere_hub::events::{BrokerEvent, push_broker_event, push_radio_frame};
    use std::time::Duration;

    const SPHERES: [[u8; 6]; 2] = [
        [0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6],
        [0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0x07],
    ];

    std::thread::Builder::new()
        .name("sim-spheres".into())
        .spawn(|| {
            let mut round: u32 = 0;
            loop {
                std::thread::sleep(Duration::from_secs(3));
                for (i, mac) in SPHERES.iter().enumerate() {
                    let humidity = 40.0 + (round % 20) as f32 + i as f32;
                    let payload = format!(
                        "{:.1},{:.1},{:.2},{} {}",
                        humidity,
                        21.0 + i as f32,
                        3.7 - round as f32 * 0.001,
                        round % 2,
                        sphere_hub::bridge::device::DeviceId::from_mac(*mac)
                    );
                    push_radio_frame(*mac, payload.as_bytes());
                }
                round = round.wrapping_add(1);
            }
        })?;

    std::thread::Builder::new().name("sim-cloud".into()).spawn(move || {
        std::thread::sleep(Duration::from_secs(5));
        push_broker_event(BrokerEvent::Received {
            topic: inbound.clone(),
            payload: br#"{"MACSLAVE":"A1:B2:C3:D4:E5:F6","colorLED":255,"riegoAuto":1,"diasRiego":62,"horaRiego":"07:30","ml":150}"#.to_vec(),
        });
        loop {
            std::thread::sleep(Duration::from_secs(10));
            push_broker_event(BrokerEvent::Received {
                topic: inbound.clone(),
                payload: br#"{"Data":true}"#.to_vec(),
            });
        }
    })?;
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Sphere Hub v{} (host simulation)", env!("CARGO_PKG_VERSION"));

    let hub_id = device::hub_id();
    let mut nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init: {e}"))?;
    let mut config = nvs.load_or_seed();
    if config.wifi_ssid.is_empty() {
        config.wifi_ssid = "sim-network".to_string();
    }

    let mut wifi = WifiStation::new();
    bring_up_wifi(&mut wifi, &config)?;

    let Ok(clock) = WallClock::start(&config.timezone, &config.ntp_server);
    clock.wait_for_sync(TIME_SYNC_TIMEOUT_MS);

    let broker = MqttBroker::simulated(true);
    let radio = EspNowRadio::new(config.radio_channel);

    wifi.spawn_supervisor(WIFI_SUPERVISOR_INTERVAL_MS)?;

    let local: Housekeeping<Unwired> = Housekeeping {
        button: None,
        poll_interval_ms: config.poll_interval_ms,
    };
    let hub = HubService::new(config, hub_id, nvs, radio, broker, clock);
    spawn_simulated_world(hub.topics().inbound.clone())?;

    hub_task::run(hub, LogEventSink::new(), local);
    Ok(())
}
