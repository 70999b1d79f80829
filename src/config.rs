//! Hub configuration parameters
//!
//! All tunable parameters for the sphere hub.
//! Values can be overridden via NVS (`hub` namespace); broker and Wi-Fi
//! credentials default to build-time environment variables.

use serde::{Deserialize, Serialize};

/// NVS namespace holding the persisted [`HubConfig`].
pub const HUB_NAMESPACE: &str = "hub";

/// What happens to a stored configuration document once it has been sent
/// to its device over the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeliveryPolicy {
    /// Resend the same document on every transmission until the cloud
    /// overwrites it.
    #[default]
    KeepUntilOverwritten,
    /// Remove the document once the radio accepted it; later transmissions
    /// receive the default document.
    DeleteOnSend,
}

/// Core hub configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    // --- Broker ---
    /// Application namespace prefixing every topic (`<ns>/hub/<id>`).
    pub app_namespace: String,
    /// Broker URI, e.g. `mqtts://broker.example.com:8883`.
    pub broker_uri: String,
    pub broker_username: String,
    pub broker_password: String,
    /// Delay between the broker connecting and the subscribe request (ms).
    pub subscribe_settle_ms: u32,

    // --- Radio ---
    /// ESP-NOW channel shared with the sensors.
    pub radio_channel: u8,
    pub delivery_policy: DeliveryPolicy,
    /// Also publish each accepted reading in line-protocol form.
    pub report_each_reading: bool,

    // --- Network / time ---
    pub wifi_ssid: String,
    pub wifi_password: String,
    /// POSIX TZ string applied before SNTP sync.
    pub timezone: String,
    pub ntp_server: String,

    // --- Timing ---
    /// Hub task housekeeping interval (ms): settle timer, button polling.
    pub poll_interval_ms: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            // Broker
            app_namespace: "ismart".into(),
            broker_uri: option_env!("HUB_MQTT_URI")
                .unwrap_or("mqtts://localhost:8883")
                .into(),
            broker_username: option_env!("HUB_MQTT_USERNAME").unwrap_or("").into(),
            broker_password: option_env!("HUB_MQTT_PASSWORD").unwrap_or("").into(),
            subscribe_settle_ms: 500,

            // Radio
            radio_channel: 6,
            delivery_policy: DeliveryPolicy::KeepUntilOverwritten,
            report_each_reading: false,

            // Network / time
            wifi_ssid: option_env!("HUB_WIFI_SSID").unwrap_or("").into(),
            wifi_password: option_env!("HUB_WIFI_PASSWORD").unwrap_or("").into(),
            timezone: "CET-1CEST,M3.5.0/2,M10.5.0/3".into(),
            ntp_server: "pool.ntp.org".into(),

            // Timing
            poll_interval_ms: 20,
        }
    }
}
