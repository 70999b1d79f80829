//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] for the hub.
//!
//! - Namespace isolation: `device-registry`, `config-store`, `certs` and
//!   the hub's own `hub` namespace never share keys.
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - The host backend is an in-memory map keyed by `namespace::key`.

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::{HUB_NAMESPACE, HubConfig};
use crate::adapters::wifi::{validate_password, validate_ssid};
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_KEY: &str = "hubcfg";

#[allow(dead_code)]
const MAX_BLOB_SIZE: usize = 4000;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            Self::flash_init()?;
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(target_os = "espidf")]
    fn flash_init() -> Result<(), ConfigError> {
        // SAFETY: called from the main task before any concurrent NVS access.
        let ret = unsafe { nvs_flash_init() };
        if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
            warn!("NVS: erasing and re-initialising flash partition");
            if unsafe { nvs_flash_erase() } != ESP_OK {
                return Err(ConfigError::IoError);
            }
            if unsafe { nvs_flash_init() } != ESP_OK {
                return Err(ConfigError::IoError);
            }
        } else if ret != ESP_OK {
            return Err(ConfigError::IoError);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// NUL-terminated copy of an NVS name (max 15 bytes).
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let bytes = name.as_bytes();
        let len = bytes.len().min(15);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns_buf = Self::c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    /// Size query followed by a full read of one blob.
    #[cfg(target_os = "espidf")]
    fn read_blob(handle: nvs_handle_t, key: &str) -> Result<Vec<u8>, i32> {
        let key_buf = Self::c_name(key);
        let mut size: usize = 0;
        let ret = unsafe {
            nvs_get_blob(
                handle,
                key_buf.as_ptr() as *const _,
                core::ptr::null_mut(),
                &mut size,
            )
        };
        if ret != ESP_OK {
            return Err(ret);
        }
        if size > MAX_BLOB_SIZE {
            return Err(ESP_ERR_NVS_INVALID_LENGTH);
        }

        let mut buf = vec![0u8; size];
        let ret = unsafe {
            nvs_get_blob(
                handle,
                key_buf.as_ptr() as *const _,
                buf.as_mut_ptr() as *mut _,
                &mut size,
            )
        };
        if ret != ESP_OK {
            return Err(ret);
        }
        buf.truncate(size);
        Ok(buf)
    }

    #[cfg(target_os = "espidf")]
    fn storage_error(code: i32) -> StorageError {
        match code {
            ESP_ERR_NVS_NOT_FOUND => StorageError::NotFound,
            ESP_ERR_NVS_NOT_ENOUGH_SPACE => StorageError::Full,
            ESP_ERR_NVS_NOT_INITIALIZED | ESP_ERR_NVS_PART_NOT_FOUND => StorageError::Unavailable,
            _ => StorageError::IoError,
        }
    }
}

pub fn validate_config(cfg: &HubConfig) -> Result<(), ConfigError> {
    if cfg.app_namespace.is_empty() || cfg.app_namespace.contains(['/', '+', '#']) {
        return Err(ConfigError::ValidationFailed(
            "app_namespace must be a non-empty single topic level",
        ));
    }
    if !(1..=14).contains(&cfg.radio_channel) {
        return Err(ConfigError::ValidationFailed("radio_channel must be 1–14"));
    }
    if !(100..=10_000).contains(&cfg.subscribe_settle_ms) {
        return Err(ConfigError::ValidationFailed(
            "subscribe_settle_ms must be 100–10000",
        ));
    }
    if !(5..=1000).contains(&cfg.poll_interval_ms) {
        return Err(ConfigError::ValidationFailed("poll_interval_ms must be 5–1000"));
    }
    if !(cfg.broker_uri.starts_with("mqtts://") || cfg.broker_uri.starts_with("ssl://")) {
        return Err(ConfigError::ValidationFailed(
            "broker_uri must use a TLS scheme (mqtts:// or ssl://)",
        ));
    }
    if cfg.timezone.is_empty() || cfg.ntp_server.is_empty() {
        return Err(ConfigError::ValidationFailed(
            "timezone and ntp_server must be set",
        ));
    }
    if !cfg.wifi_ssid.is_empty() {
        validate_ssid(&cfg.wifi_ssid)
            .map_err(|_| ConfigError::ValidationFailed("wifi_ssid must be 1–32 printable bytes"))?;
        validate_password(&cfg.wifi_password).map_err(|_| {
            ConfigError::ValidationFailed("wifi_password must be empty or 8–64 bytes")
        })?;
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<HubConfig, ConfigError> {
        match self.read(HUB_NAMESPACE, CONFIG_KEY) {
            Ok(bytes) => {
                let cfg: HubConfig =
                    postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(HubConfig::default())
            }
            Err(e) => {
                warn!("NvsAdapter: config read error ({}), using defaults", e);
                Ok(HubConfig::default())
            }
        }
    }

    fn save(&mut self, config: &HubConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.write(HUB_NAMESPACE, CONFIG_KEY, &bytes)
            .map_err(|_| ConfigError::IoError)?;
        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl NvsAdapter {
    /// Boot-time config: the stored record if it decodes and validates,
    /// otherwise defaults.  When nothing usable was stored the effective
    /// config is written back so the next boot reads a real record.
    pub fn load_or_seed(&mut self) -> HubConfig {
        let stored = self.exists(HUB_NAMESPACE, CONFIG_KEY).unwrap_or(false);
        let loaded = self
            .load()
            .and_then(|cfg| validate_config(&cfg).map(|()| cfg));

        let (config, seed) = match loaded {
            Ok(cfg) => (cfg, !stored),
            Err(e) => {
                warn!("NvsAdapter: stored config rejected ({}), using defaults", e);
                (HubConfig::default(), true)
            }
        };

        if seed {
            match self.save(&config) {
                Ok(()) => info!("NvsAdapter: seeded config record"),
                Err(e) => warn!("NvsAdapter: config seed failed ({})", e),
            }
        }
        config
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store
                .borrow()
                .get(&composite)
                .cloned()
                .ok_or(StorageError::NotFound)
        }

        #[cfg(target_os = "espidf")]
        {
            Self::with_nvs_handle(namespace, false, |handle| Self::read_blob(handle, key))
                .map_err(Self::storage_error)
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let key_buf = Self::c_name(key);
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(Self::storage_error)
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let key_buf = Self::c_name(key);
                let ret = unsafe { nvs_erase_key(handle, key_buf.as_ptr() as *const _) };
                if ret == ESP_ERR_NVS_NOT_FOUND {
                    return Ok(());
                }
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                // A namespace that was never created holds no keys.
                Err(ESP_ERR_NVS_NOT_FOUND) => Ok(()),
                other => other.map_err(Self::storage_error),
            }
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            Ok(self.store.borrow().contains_key(&composite))
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let key_buf = Self::c_name(key);
                let ret = unsafe {
                    nvs_find_key(handle, key_buf.as_ptr() as *const _, core::ptr::null_mut())
                };
                match ret {
                    ESP_OK => Ok(true),
                    ESP_ERR_NVS_NOT_FOUND => Ok(false),
                    e => Err(e),
                }
            });
            match result {
                // Read-only open of a namespace that does not exist yet.
                Err(ESP_ERR_NVS_NOT_FOUND) => Ok(false),
                other => other.map_err(Self::storage_error),
            }
        }
    }

    fn erase_namespace(&mut self, namespace: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let prefix = Self::composite_key(namespace, "");
            self.store.borrow_mut().retain(|k, _| !k.starts_with(&prefix));
            info!("NvsAdapter: namespace '{}' erased (simulation)", namespace);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe { nvs_erase_all(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                // A namespace that was never created holds no keys.
                Ok(()) | Err(ESP_ERR_NVS_NOT_FOUND) => {}
                Err(e) => return Err(Self::storage_error(e)),
            }
            info!("NvsAdapter: namespace '{}' erased", namespace);
            Ok(())
        }
    }
}
