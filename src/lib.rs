//! Sphere hub firmware library.
//!
//! Bridges battery-powered sensor spheres on ESP-NOW to an MQTT broker.
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module, so the bridge core and the simulation adapters
//! build and test on the host.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod bridge;
pub mod config;
pub mod drivers;
pub mod error;
mod esp_link_shims;
pub mod events;
pub mod hub_task;
