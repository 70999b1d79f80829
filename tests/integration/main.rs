//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the hub against mock
//! adapters.  All tests run on the host (x86_64) with no real hardware
//! required.

mod bridge_flow_tests;
mod mocks;
mod sim_adapter_tests;
