//! Device identity for hub and spheres.
//!
//! Both the hub and every sphere are named by their 6-byte station MAC.
//! The canonical textual form is 12 uppercase hex digits with no
//! separators (`A1B2C3D4E5F6`); that string is the topic suffix, the MQTT
//! client id, and the key in both persistent namespaces.

use core::fmt;
use core::str::FromStr;

use crate::error::ParseError;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Canonical 12-hex-digit form of a [`DeviceId`].
pub type DeviceKey = heapless::String<12>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(MacAddress);

impl DeviceId {
    pub const fn from_mac(mac: MacAddress) -> Self {
        Self(mac)
    }

    pub const fn mac(&self) -> &MacAddress {
        &self.0
    }

    /// Canonical key: 12 uppercase hex digits.
    pub fn key(&self) -> DeviceKey {
        let mut key = DeviceKey::new();
        use core::fmt::Write;
        let _ = write!(key, "{self}");
        key
    }

    /// Parse an identifier after stripping every non-hex character.
    ///
    /// Accepts `A1B2C3D4E5F6`, `a1:b2:c3:d4:e5:f6`, `A1-B2-C3-D4-E5-F6`.
    /// Anything that does not leave exactly 12 hex digits is rejected.
    pub fn parse_lenient(s: &str) -> Result<Self, ParseError> {
        let mut mac = [0u8; 6];
        let mut nibbles = 0usize;
        for c in s.chars() {
            let Some(v) = c.to_digit(16) else {
                continue;
            };
            if nibbles == 12 {
                return Err(ParseError::InvalidDeviceId);
            }
            let byte = &mut mac[nibbles / 2];
            *byte = (*byte << 4) | v as u8;
            nibbles += 1;
        }
        if nibbles == 12 {
            Ok(Self(mac))
        } else {
            Err(ParseError::InvalidDeviceId)
        }
    }
}

impl From<MacAddress> for DeviceId {
    fn from(mac: MacAddress) -> Self {
        Self(mac)
    }
}

/// Strict parse: exactly 12 hex digits, nothing else.
impl FromStr for DeviceId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 12 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidDeviceId);
        }
        Self::parse_lenient(s)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl serde::Serialize for DeviceId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
