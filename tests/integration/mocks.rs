//! Mock adapters for integration tests.
//!
//! Each mock hands out a shared log handle so tests can assert on the
//! full call history (and inject failures) after the adapter has been
//! moved into the `HubService`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use sphere_hub::app::events::HubEvent;
use sphere_hub::app::ports::{
    BrokerPort, ClockPort, EventSink, RadioPort, StorageError, StoragePort, TransportError,
};
use sphere_hub::bridge::device::MacAddress;

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct StoreState {
    pub entries: HashMap<(String, String), Vec<u8>>,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

#[derive(Clone, Default)]
pub struct MockStore(pub Rc<RefCell<StoreState>>);

#[allow(dead_code)]
impl MockStore {
    pub fn get(&self, ns: &str, key: &str) -> Option<Vec<u8>> {
        self.0.borrow().entries.get(&(ns.into(), key.into())).cloned()
    }

    pub fn get_str(&self, ns: &str, key: &str) -> Option<String> {
        self.get(ns, key).and_then(|v| String::from_utf8(v).ok())
    }
}

impl StoragePort for MockStore {
    fn read(&self, ns: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let s = self.0.borrow();
        if s.fail_reads {
            return Err(StorageError::Unavailable);
        }
        s.entries
            .get(&(ns.into(), key.into()))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    fn write(&mut self, ns: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let mut s = self.0.borrow_mut();
        if s.fail_writes {
            return Err(StorageError::IoError);
        }
        s.entries.insert((ns.into(), key.into()), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, ns: &str, key: &str) -> Result<(), StorageError> {
        self.0.borrow_mut().entries.remove(&(ns.into(), key.into()));
        Ok(())
    }

    fn exists(&self, ns: &str, key: &str) -> Result<bool, StorageError> {
        let s = self.0.borrow();
        if s.fail_reads {
            return Err(StorageError::Unavailable);
        }
        Ok(s.entries.contains_key(&(ns.into(), key.into())))
    }

    fn erase_namespace(&mut self, namespace: &str) -> Result<(), StorageError> {
        let mut s = self.0.borrow_mut();
        if s.fail_writes {
            return Err(StorageError::IoError);
        }
        s.entries.retain(|(ns, _), _| ns != namespace);
        Ok(())
    }
}

// ── Radio ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RadioLog {
    pub starts: u32,
    pub peers: Vec<MacAddress>,
    pub sent: Vec<(MacAddress, Vec<u8>)>,
    pub fail_start: bool,
    pub fail_sends: bool,
    pub reject_peers: bool,
}

#[derive(Clone, Default)]
pub struct MockRadio(pub Rc<RefCell<RadioLog>>);

impl RadioPort for MockRadio {
    fn start(&mut self) -> Result<(), TransportError> {
        let mut log = self.0.borrow_mut();
        if log.fail_start {
            return Err(TransportError::NotReady);
        }
        log.starts += 1;
        Ok(())
    }

    fn add_peer(&mut self, addr: &MacAddress) -> Result<(), TransportError> {
        let mut log = self.0.borrow_mut();
        if log.reject_peers {
            return Err(TransportError::PeerTableFull);
        }
        log.peers.push(*addr);
        Ok(())
    }

    fn send(&mut self, addr: &MacAddress, data: &[u8]) -> Result<(), TransportError> {
        let mut log = self.0.borrow_mut();
        if log.fail_sends {
            return Err(TransportError::SendFailed);
        }
        log.sent.push((*addr, data.to_vec()));
        Ok(())
    }
}

// ── Broker ────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct BrokerLog {
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, String)>,
    pub fail_subscribe: bool,
    pub fail_publish: bool,
    next_id: u32,
}

#[derive(Clone, Default)]
pub struct MockBroker(pub Rc<RefCell<BrokerLog>>);

impl BrokerPort for MockBroker {
    fn subscribe(&mut self, topic: &str) -> Result<u32, TransportError> {
        let mut log = self.0.borrow_mut();
        if log.fail_subscribe {
            return Err(TransportError::NotReady);
        }
        log.subscriptions.push(topic.into());
        log.next_id += 1;
        Ok(log.next_id)
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<u32, TransportError> {
        let mut log = self.0.borrow_mut();
        if log.fail_publish {
            return Err(TransportError::SendFailed);
        }
        log.published
            .push((topic.into(), String::from_utf8_lossy(payload).into_owned()));
        log.next_id += 1;
        Ok(log.next_id)
    }
}

// ── Clock ─────────────────────────────────────────────────────

pub const FIXED_TIME: &str = "2024-05-01T12:00:00";

#[derive(Clone, Default)]
pub struct ManualClock(pub Rc<Cell<u64>>);

#[allow(dead_code)]
impl ManualClock {
    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }
}

impl ClockPort for ManualClock {
    fn now_local(&self) -> String {
        FIXED_TIME.into()
    }

    fn uptime_ms(&self) -> u64 {
        self.0.get()
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<HubEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, event: &HubEvent) -> bool {
        self.events.contains(event)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &HubEvent) {
        self.events.push(event.clone());
    }
}
