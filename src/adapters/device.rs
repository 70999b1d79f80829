//! Hub identity and restart.
//!
//! The hub id is the station MAC, the same address spheres see as the
//! ESP-NOW source.  It names the broker topics and the MQTT client id.

use crate::bridge::device::{DeviceId, MacAddress};

/// Station interface MAC.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: mac is a 6-byte out-buffer as esp_read_mac requires.
    let ret = unsafe {
        esp_idf_svc::sys::esp_read_mac(
            mac.as_mut_ptr(),
            esp_idf_svc::sys::esp_mac_type_t_ESP_MAC_WIFI_STA,
        )
    };
    if ret != esp_idf_svc::sys::ESP_OK {
        log::warn!("Device: esp_read_mac failed ({}), using eFuse default", ret);
        // SAFETY: as above.
        unsafe {
            esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
        }
    }
    mac
}

/// Simulation: a fixed Espressif-range MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0x24, 0x6F, 0x28, 0x00, 0x00, 0x01]
}

pub fn hub_id() -> DeviceId {
    DeviceId::from_mac(read_mac())
}

#[cfg(target_os = "espidf")]
pub fn restart() -> ! {
    log::warn!("Device: restarting");
    // SAFETY: esp_restart does not return.
    unsafe { esp_idf_svc::sys::esp_restart() };
    #[allow(clippy::empty_loop)]
    loop {}
}

/// Simulation: exits the process.
#[cfg(not(target_os = "espidf"))]
pub fn restart() -> ! {
    log::warn!("Device(sim): restart requested, exiting");
    std::process::exit(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_identity_is_stable() {
        assert_eq!(hub_id(), hub_id());
        assert_eq!(hub_id().to_string(), "246F28000001");
    }
}
