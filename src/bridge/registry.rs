//! Persistent registry of every sphere the hub has ever heard from.
//!
//! Append-only: an id is written once with a one-byte marker and never
//! removed (short of a factory reset).  Lives in its own NVS namespace,
//! independent of the configuration store.

use log::{info, warn};

use super::device::DeviceId;
use crate::app::ports::StoragePort;
use crate::error::HubError;

pub const REGISTRY_NAMESPACE: &str = "device-registry";

const REGISTERED: &[u8] = &[1];

#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceRegistry;

impl DeviceRegistry {
    pub const fn new() -> Self {
        Self
    }

    /// Record `id` if it has not been seen before.
    ///
    /// Returns `Ok(true)` for a new registration, `Ok(false)` if the id
    /// was already present.  Store failures are reported; callers treat
    /// registration as best-effort.
    pub fn register_if_absent(
        &self,
        store: &mut dyn StoragePort,
        id: DeviceId,
    ) -> Result<bool, HubError> {
        let key = id.key();
        if store.exists(REGISTRY_NAMESPACE, &key)? {
            return Ok(false);
        }
        store
            .write(REGISTRY_NAMESPACE, &key, REGISTERED)
            .inspect_err(|e| warn!("Registry: failed to persist {}: {}", key, e))?;
        info!("Registry: new sphere {}", key);
        Ok(true)
    }

    pub fn contains(&self, store: &dyn StoragePort, id: DeviceId) -> Result<bool, HubError> {
        Ok(store.exists(REGISTRY_NAMESPACE, &id.key())?)
    }
}
