//! Sensor bridge domain: telemetry buffering, device registry,
//! per-sphere configuration, radio peer admission and broker link state.
//!
//! Pure logic only. Persistence goes through
//! [`StoragePort`](crate::app::ports::StoragePort); radio and broker I/O
//! are driven by [`HubService`](crate::app::service::HubService).

pub mod broker;
pub mod config_store;
pub mod device;
pub mod peers;
pub mod registry;
pub mod telemetry;
