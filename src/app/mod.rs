//! Application core — bridge orchestration, zero direct I/O.
//!
//! [`service::HubService`] ties the bridge components together and reacts
//! to radio frames, broker events and housekeeping ticks.  All
//! interaction with the outside world happens through **port traits**
//! defined in [`ports`], so the whole core is testable with mock adapters.

pub mod events;
pub mod ports;
pub mod service;
