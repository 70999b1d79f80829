//! Per-sphere configuration documents.
//!
//! The cloud pushes a JSON document per sphere; the hub stores it verbatim
//! (last write wins) keyed by the sphere's canonical id and hands it to the
//! sphere over the radio the next time it reports.  Spheres with nothing
//! stored get a default document built from [`SphereSettings::defaults`].

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::device::DeviceId;
use crate::app::ports::{StorageError, StoragePort};
use crate::error::{HubError, ParseError};

pub const CONFIG_NAMESPACE: &str = "config-store";

/// Packed `0xRRGGBB` LED colour used when nothing is configured (green).
pub const DEFAULT_LED_COLOR: u32 = 0x00FF00;
pub const DEFAULT_IRRIGATION_TIME: &str = "08:00";

/// Typed view of a fully-populated configuration document.
///
/// Field names follow the wire schema the cloud and spheres share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SphereSettings {
    #[serde(rename = "MACHUB")]
    pub hub: String,
    #[serde(rename = "MACSLAVE")]
    pub device: String,
    /// Packed `0xRRGGBB`.
    #[serde(rename = "colorLED")]
    pub led_color: u32,
    /// 1 = automatic irrigation enabled.
    #[serde(rename = "riegoAuto")]
    pub auto_irrigation: u8,
    /// Irrigation days, interpreted by the sphere.
    #[serde(rename = "diasRiego")]
    pub irrigation_days: u8,
    /// `HH:MM` local time.
    #[serde(rename = "horaRiego")]
    pub irrigation_time: String,
    /// Dose per irrigation in millilitres.
    #[serde(rename = "ml")]
    pub dose_ml: u16,
}

impl SphereSettings {
    /// Default settings for `device`, attributed to `hub`: green LED,
    /// irrigation disabled.
    pub fn defaults(hub: DeviceId, device: DeviceId) -> Self {
        Self {
            hub: hub.to_string(),
            device: device.to_string(),
            led_color: DEFAULT_LED_COLOR,
            auto_irrigation: 0,
            irrigation_days: 0,
            irrigation_time: DEFAULT_IRRIGATION_TIME.into(),
            dose_ml: 0,
        }
    }

    /// Decode a document carrying every field.  Extra fields are ignored.
    pub fn from_document(doc: &str) -> Result<Self, ParseError> {
        serde_json::from_str(doc).map_err(|_| ParseError::InvalidDocument)
    }

    pub fn to_document(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Split the packed colour into `(r, g, b)`.
    pub fn led_rgb(&self) -> (u8, u8, u8) {
        let c = self.led_color;
        ((c >> 16) as u8, (c >> 8) as u8, c as u8)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigStore;

impl ConfigStore {
    pub const fn new() -> Self {
        Self
    }

    /// Upsert the document for `id`.  The caller must not assume
    /// persistence on `Err`.
    pub fn put(
        &self,
        store: &mut dyn StoragePort,
        id: DeviceId,
        document: &str,
    ) -> Result<(), HubError> {
        let key = id.key();
        store
            .write(CONFIG_NAMESPACE, &key, document.as_bytes())
            .inspect_err(|e| warn!("Store: failed to write config for {}: {}", key, e))?;
        info!("Store: config stored for {} ({} bytes)", key, document.len());

        match SphereSettings::from_document(document) {
            Ok(settings) => {
                let (r, g, b) = settings.led_rgb();
                debug!(
                    "Store: {} LED R={} G={} B={} auto={} at {} ({} ml)",
                    key, r, g, b, settings.auto_irrigation, settings.irrigation_time, settings.dose_ml
                );
            }
            Err(_) => debug!("Store: {} document is partial, kept as-is", key),
        }
        Ok(())
    }

    /// Stored document for `id`, `None` if nothing is stored.
    pub fn get(&self, store: &dyn StoragePort, id: DeviceId) -> Result<Option<String>, HubError> {
        match store.read(CONFIG_NAMESPACE, &id.key()) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| HubError::Store(StorageError::IoError)),
            Err(StorageError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stored document, or the default for `id` when absent.  A failing
    /// store degrades to the default instead of an error.
    pub fn get_or_default(&self, store: &dyn StoragePort, id: DeviceId, hub: DeviceId) -> String {
        match self.get(store, id) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                debug!("Store: no config for {}, using default", id);
                SphereSettings::defaults(hub, id).to_document()
            }
            Err(e) => {
                warn!("Store: config lookup for {} failed ({}), using default", id, e);
                SphereSettings::defaults(hub, id).to_document()
            }
        }
    }

    pub fn remove(&self, store: &mut dyn StoragePort, id: DeviceId) -> Result<(), HubError> {
        store.delete(CONFIG_NAMESPACE, &id.key())?;
        Ok(())
    }
}
