//! Unified error types for the sphere hub bridge.
//!
//! A single `HubError` enum that every bridge operation reports through,
//! keeping the hub task's error handling uniform.  All variants are `Copy`
//! so they can be returned from the radio and broker paths without
//! allocation.  No variant is fatal: the hub logs and carries on.

use core::fmt;

use crate::app::ports::{StorageError, TransportError};

// ---------------------------------------------------------------------------
// Top-level bridge error
// ---------------------------------------------------------------------------

/// Every fallible bridge operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// Malformed telemetry line or inbound document. Dropped, no mutation.
    Parse(ParseError),
    /// Telemetry buffer is full. The new reading is dropped.
    Capacity,
    /// Persistent store open/read/write failure.
    Store(StorageError),
    /// Inbound document is well-formed but misses a required field.
    Protocol(&'static str),
    /// Broker or radio send failure.
    Transport(TransportError),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "parse: {e}"),
            Self::Capacity => write!(f, "capacity: telemetry buffer full"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Payload bytes are not valid UTF-8.
    NotUtf8,
    /// Wrong number of fields in a telemetry line.
    FieldCount,
    /// A numeric field did not parse.
    InvalidNumber,
    /// Device identifier is not 12 hex digits.
    InvalidDeviceId,
    /// Inbound broker payload is not a JSON object.
    InvalidDocument,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotUtf8 => write!(f, "payload is not UTF-8"),
            Self::FieldCount => write!(f, "unexpected field count"),
            Self::InvalidNumber => write!(f, "invalid numeric field"),
            Self::InvalidDeviceId => write!(f, "invalid device id"),
            Self::InvalidDocument => write!(f, "invalid JSON document"),
        }
    }
}

impl From<ParseError> for HubError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<StorageError> for HubError {
    fn from(e: StorageError) -> Self {
        Self::Store(e)
    }
}

impl From<TransportError> for HubError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Bridge-wide `Result` alias.
pub type Result<T> = core::result::Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_category() {
        let e: HubError = ParseError::FieldCount.into();
        assert_eq!(e.to_string(), "parse: unexpected field count");
        assert_eq!(
            HubError::Protocol("MACSLAVE missing").to_string(),
            "protocol: MACSLAVE missing"
        );
    }

    #[test]
    fn storage_error_converts() {
        let e: HubError = StorageError::IoError.into();
        assert!(matches!(e, HubError::Store(StorageError::IoError)));
    }
}
