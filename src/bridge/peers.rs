//! Radio peer table.
//!
//! Session-scoped record of which spheres have been admitted as ESP-NOW
//! peers.  A sphere is `Unknown` until its first transmission has been
//! observed and admitted, `Known` afterwards.  Nothing here is persisted;
//! a reboot starts every sphere as `Unknown` again.

use super::device::MacAddress;
use crate::app::ports::TransportError;

/// ESP-NOW allows 20 peers in total; one is taken by the broadcast peer.
pub const PEER_CAPACITY: usize = 19;

/// Broadcast address registered alongside the sphere peers.
pub const BROADCAST: MacAddress = [0xFF; 6];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Not yet admitted this session.
    Unknown,
    /// Admitted; later transmissions receive a configuration push.
    Known,
}

#[derive(Debug, Default)]
pub struct PeerTable {
    peers: heapless::Vec<MacAddress, PEER_CAPACITY>,
}

impl PeerTable {
    pub const fn new() -> Self {
        Self {
            peers: heapless::Vec::new(),
        }
    }

    /// Classify a transmission from `addr`.
    pub fn observe(&self, addr: &MacAddress) -> PeerState {
        if self.peers.contains(addr) {
            PeerState::Known
        } else {
            PeerState::Unknown
        }
    }

    /// Unknown → Known.  Call only once the radio has accepted the peer.
    pub fn mark_known(&mut self, addr: &MacAddress) -> Result<(), TransportError> {
        if self.peers.contains(addr) {
            return Ok(());
        }
        self.peers
            .push(*addr)
            .map_err(|_| TransportError::PeerTableFull)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.peers.is_full()
    }
}
