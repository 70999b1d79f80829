//! Port traits — the hexagonal boundary between the bridge and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ HubService (domain)
//! ```
//!
//! Driven adapters (NVS, ESP-NOW, MQTT, wall clock, log sink) implement
//! these traits.
//! The [`HubService`](super::service::HubService) is generic over them, so
//! the bridge never touches ESP-IDF directly and runs unchanged on the host.
//!
//! ## Contract notes
//!
//! - **StoragePort** writes MUST be atomic per key (NVS commit semantics).
//! - **RadioPort** and **BrokerPort** are fire-and-forget: `Ok` means the
//!   primitive accepted the frame, not that the peer received it.
//! - All port errors are typed; callers must handle every variant explicitly.

use super::events::HubEvent;
use crate::bridge::device::MacAddress;
use crate::config::HubConfig;

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent namespaced key-value storage.
///
/// Namespaces are independent: erasing or corrupting one never touches
/// another.  Keys and namespaces are limited to 15 bytes by NVS.
pub trait StoragePort {
    /// Read the full value stored under `key`.
    fn read(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Write a value atomically (overwrite semantics).
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> Result<bool, StorageError>;

    /// Remove every key in `namespace`.  Other namespaces are untouched;
    /// a namespace that was never written is already empty.
    fn erase_namespace(&mut self, namespace: &str) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent hub config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the hub's own configuration.
///
/// Implementations MUST validate before persisting and reject invalid
/// values with [`ConfigError::ValidationFailed`] rather than clamping.
pub trait ConfigPort {
    /// Load configuration; returns [`HubConfig::default()`] if none is stored.
    fn load(&self) -> Result<HubConfig, ConfigError>;

    /// Validate and persist configuration.
    ///
    /// Only the boot path writes the hub config (seeding a missing or
    /// unreadable record).  There is no runtime command that changes it;
    /// a new config takes effect on the next boot.
    fn save(&mut self, config: &HubConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Radio port (driven adapter: domain → ESP-NOW)
// ───────────────────────────────────────────────────────────────

/// Connectionless peer-to-peer radio.
pub trait RadioPort {
    /// Initialise the radio and register the receive path.  Called once,
    /// after the broker subscription is acknowledged.
    fn start(&mut self) -> Result<(), TransportError>;

    /// Admit `addr` as a destination for direct sends.
    fn add_peer(&mut self, addr: &MacAddress) -> Result<(), TransportError>;

    /// Send `data` to an admitted peer.  Non-blocking, no acknowledgement.
    fn send(&mut self, addr: &MacAddress, data: &[u8]) -> Result<(), TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Broker port (driven adapter: domain → MQTT client)
// ───────────────────────────────────────────────────────────────

/// Publish/subscribe side of the broker client.  Connection lifecycle is
/// owned by the client itself and reported back as
/// [`BrokerEvent`](crate::events::BrokerEvent)s.
pub trait BrokerPort {
    /// Request a subscription.  Returns the message id on acceptance.
    fn subscribe(&mut self, topic: &str) -> Result<u32, TransportError>;

    /// Enqueue a publish (QoS 1, not retained).  Returns the message id.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<u32, TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: domain ← SNTP / system timer)
// ───────────────────────────────────────────────────────────────

pub trait ClockPort {
    /// Local wall-clock time as `YYYY-MM-DDTHH:MM:SS`.
    fn now_local(&self) -> String;

    /// Monotonic milliseconds since boot.
    fn uptime_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Event sink (driven adapter: domain → log / telemetry)
// ───────────────────────────────────────────────────────────────

/// Receives structured [`HubEvent`]s emitted by the service.
pub trait EventSink {
    fn emit(&mut self, event: &HubEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Namespace could not be opened.
    Unavailable,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

/// Errors from [`RadioPort`] and [`BrokerPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The underlying client/driver is not initialised.
    NotReady,
    /// The peer table is full.
    PeerTableFull,
    /// The send/publish primitive rejected the frame.
    SendFailed,
    /// Payload exceeds the transport's frame limit.
    PayloadTooLarge,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Unavailable => write!(f, "namespace unavailable"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotReady => write!(f, "transport not ready"),
            Self::PeerTableFull => write!(f, "peer table full"),
            Self::SendFailed => write!(f, "send failed"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
        }
    }
}
