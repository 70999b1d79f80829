//! Wi-Fi station adapter.
//!
//! The hub needs an associated station before either the MQTT client or
//! ESP-NOW can run: ESP-NOW shares the station interface and its channel.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `BlockingWifi<EspWifi>` from `esp_idf_svc::wifi`.
//! - **all other targets**: an always-available simulated link.
//!
//! ## Reconnection policy
//!
//! After a lost link [`WifiStation::poll`] retries with an exponential
//! backoff (2 s → 4 s → 8 s … capped at 60 s).  A reconnect attempt blocks
//! until association finishes, so after startup the station is handed to
//! its own `wifi-sup` thread with [`WifiStation::spawn_supervisor`] and
//! never polled from the hub task.

use core::fmt;
use log::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
    AlreadyConnected,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (at most 32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::AlreadyConnected => write!(f, "already connected to AP"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connected,
    Reconnecting { attempt: u32, next_attempt_ms: u64 },
}

const INITIAL_BACKOFF_SECS: u32 = 2;
const MAX_BACKOFF_SECS: u32 = 60;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// An empty SSID is accepted here and rejected at connect time, so a
/// stored configuration without credentials still loads.
pub fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

/// Empty means an open network; otherwise WPA2 length rules apply.
pub fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Station
// ───────────────────────────────────────────────────────────────

pub struct WifiStation {
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    backoff_secs: u32,
    #[cfg(target_os = "espidf")]
    wifi: Option<esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>>,
    /// Simulation: link drops are injected by tests.
    #[cfg(not(target_os = "espidf"))]
    sim_link_up: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_failures_left: u32,
}

impl Default for WifiStation {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiStation {
    pub fn new() -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff_secs: INITIAL_BACKOFF_SECS,
            #[cfg(target_os = "espidf")]
            wifi: None,
            #[cfg(not(target_os = "espidf"))]
            sim_link_up: false,
            #[cfg(not(target_os = "espidf"))]
            sim_failures_left: 0,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    pub fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|_| ConnectivityError::InvalidSsid)?;
        self.password.clear();
        self.password
            .push_str(password)
            .map_err(|_| ConnectivityError::InvalidPassword)?;
        info!("WiFi: credentials set (SSID='{}')", self.ssid);
        Ok(())
    }

    /// Take ownership of the modem and create the driver.  Must be called
    /// once before [`connect`](Self::connect) on the device.
    #[cfg(target_os = "espidf")]
    pub fn attach(
        &mut self,
        modem: esp_idf_hal::modem::Modem,
        sysloop: esp_idf_svc::eventloop::EspSystemEventLoop,
    ) -> Result<(), ConnectivityError> {
        use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

        // NVS-backed Wi-Fi calibration is not used; credentials come from HubConfig.
        let driver = EspWifi::new(modem, sysloop.clone(), None).map_err(|e| {
            error!("WiFi: driver init failed: {:?}", e);
            ConnectivityError::ConnectionFailed
        })?;
        let wifi = BlockingWifi::wrap(driver, sysloop).map_err(|e| {
            error!("WiFi: blocking wrapper failed: {:?}", e);
            ConnectivityError::ConnectionFailed
        })?;
        self.wifi = Some(wifi);
        Ok(())
    }

    /// Associate and wait for an IP address.  Blocks on the device.
    pub fn connect(&mut self) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        if self.state == WifiState::Connected {
            return Err(ConnectivityError::AlreadyConnected);
        }

        info!("WiFi: connecting to '{}'", self.ssid);
        match self.platform_connect() {
            Ok(()) => {
                self.state = WifiState::Connected;
                self.backoff_secs = INITIAL_BACKOFF_SECS;
                info!("WiFi: connected");
                Ok(())
            }
            Err(e) => {
                error!("WiFi: connection failed: {}", e);
                Err(e)
            }
        }
    }

    pub fn disconnect(&mut self) {
        self.platform_disconnect();
        self.state = WifiState::Disconnected;
        info!("WiFi: disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.state == WifiState::Connected && self.platform_is_connected()
    }

    /// Detect link loss and drive reconnect attempts.
    pub fn poll(&mut self, now_ms: u64) {
        match self.state {
            WifiState::Connected if !self.platform_is_connected() => {
                warn!("WiFi: connection lost, reconnecting");
                self.state = WifiState::Reconnecting {
                    attempt: 0,
                    next_attempt_ms: now_ms,
                };
            }
            WifiState::Reconnecting {
                attempt,
                next_attempt_ms,
            } if now_ms >= next_attempt_ms => {
                info!("WiFi: reconnect attempt {} (backoff {}s)", attempt, self.backoff_secs);
                if self.platform_connect().is_ok() {
                    self.state = WifiState::Connected;
                    self.backoff_secs = INITIAL_BACKOFF_SECS;
                    info!("WiFi: reconnected");
                } else {
                    let wait_ms = u64::from(self.backoff_secs) * 1000;
                    self.backoff_secs = (self.backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    self.state = WifiState::Reconnecting {
                        attempt: attempt + 1,
                        next_attempt_ms: now_ms + wait_ms,
                    };
                }
            }
            _ => {}
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        let wifi = self.wifi.as_mut().ok_or(ConnectivityError::ConnectionFailed)?;
        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let conf = Configuration::Client(ClientConfiguration {
            ssid: self
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidSsid)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });

        let failed = |e: esp_idf_svc::sys::EspError| {
            warn!("WiFi: {:?}", e);
            ConnectivityError::ConnectionFailed
        };
        wifi.set_configuration(&conf).map_err(failed)?;
        if !wifi.is_started().map_err(failed)? {
            wifi.start().map_err(failed)?;
        }
        wifi.connect().map_err(failed)?;
        wifi.wait_netif_up().map_err(failed)?;
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        if self.sim_failures_left > 0 {
            self.sim_failures_left -= 1;
            warn!("WiFi(sim): simulated association failure");
            return Err(ConnectivityError::ConnectionFailed);
        }
        self.sim_link_up = true;
        info!("WiFi(sim): associated with '{}'", self.ssid);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        if let Some(wifi) = self.wifi.as_mut() {
            if let Err(e) = wifi.disconnect() {
                warn!("WiFi: disconnect: {:?}", e);
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        self.sim_link_up = false;
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.wifi
            .as_ref()
            .is_some_and(|w| w.is_connected().unwrap_or(false))
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.sim_link_up
    }

    /// Move the station onto a dedicated thread that polls it every
    /// `interval_ms`.  The returned flag mirrors [`is_connected`](Self::is_connected).
    pub fn spawn_supervisor(
        mut self,
        interval_ms: u32,
    ) -> std::io::Result<std::sync::Arc<core::sync::atomic::AtomicBool>> {
        use core::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;
        use std::time::{Duration, Instant};

        let link_up = Arc::new(AtomicBool::new(self.is_connected()));
        let flag = link_up.clone();
        std::thread::Builder::new()
            .name("wifi-sup".into())
            .stack_size(8192)
            .spawn(move || {
                let start = Instant::now();
                let interval = Duration::from_millis(u64::from(interval_ms));
                loop {
                    self.poll(start.elapsed().as_millis() as u64);
                    flag.store(self.is_connected(), Ordering::Relaxed);
                    std::thread::sleep(interval);
                }
            })?;
        info!("WiFi: supervisor running every {} ms", interval_ms);
        Ok(link_up)
    }

    /// Simulation: drop the link and fail the next `failures` attempts.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_drop_link(&mut self, failures: u32) {
        self.sim_link_up = false;
        self.sim_failures_left = failures;
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssid_rules() {
        assert!(validate_ssid("").is_ok());
        assert!(validate_ssid("HomeWiFi").is_ok());
        assert_eq!(validate_ssid(&"x".repeat(33)), Err(ConnectivityError::InvalidSsid));
        assert_eq!(validate_ssid("bad\u{7}"), Err(ConnectivityError::InvalidSsid));
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("").is_ok());
        assert!(validate_password("mysecret8").is_ok());
        assert_eq!(validate_password("short"), Err(ConnectivityError::InvalidPassword));
    }

    #[test]
    fn connect_without_credentials_fails() {
        let mut w = WifiStation::new();
        assert_eq!(w.connect(), Err(ConnectivityError::NoCredentials));
    }

    #[test]
    fn connect_disconnect() {
        let mut w = WifiStation::new();
        w.set_credentials("TestNet", "password1").unwrap();
        w.connect().unwrap();
        assert!(w.is_connected());
        assert_eq!(w.connect(), Err(ConnectivityError::AlreadyConnected));
        w.disconnect();
        assert!(!w.is_connected());
    }

    #[test]
    fn reconnects_with_backoff() {
        let mut w = WifiStation::new();
        w.set_credentials("TestNet", "password1").unwrap();
        w.connect().unwrap();

        w.sim_drop_link(1);
        w.poll(0);
        assert!(matches!(w.state(), WifiState::Reconnecting { attempt: 0, .. }));

        // First attempt fails and schedules the next one 2 s later.
        w.poll(0);
        assert_eq!(
            w.state(),
            WifiState::Reconnecting {
                attempt: 1,
                next_attempt_ms: 2_000
            }
        );
        w.poll(1_999);
        assert!(!w.is_connected());
        w.poll(2_000);
        assert!(w.is_connected());
    }

    #[test]
    fn supervisor_runs_off_the_calling_thread() {
        use core::sync::atomic::Ordering;

        let mut w = WifiStation::new();
        w.set_credentials("TestNet", "password1").unwrap();
        w.connect().unwrap();
        w.sim_drop_link(0);

        let started = std::time::Instant::now();
        let link_up = w.spawn_supervisor(5).unwrap();
        assert!(started.elapsed() < std::time::Duration::from_millis(100));

        for _ in 0..200 {
            if link_up.load(Ordering::Relaxed) {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        panic!("supervisor did not restore the link");
    }
}
