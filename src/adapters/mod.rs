//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements          | Connects to                 |
//! |--------------|---------------------|-----------------------------|
//! | `nvs`        | StoragePort         | NVS / in-memory store       |
//! |              | ConfigPort          |                             |
//! | `espnow`     | RadioPort           | ESP-NOW on the STA iface    |
//! | `mqtt`       | BrokerPort          | ESP-IDF MQTT client (mTLS)  |
//! | `time`       | ClockPort           | SNTP + system timer         |
//! | `log_sink`   | EventSink           | Serial log output           |
//! | `wifi`       | —                   | ESP-IDF WiFi STA            |
//! | `cert_store` | —                   | PEM blobs in `certs` NVS    |
//! | `device`     | —                   | MAC address, restart        |

pub mod cert_store;
pub mod device;
pub mod espnow;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod time;
pub mod wifi;
