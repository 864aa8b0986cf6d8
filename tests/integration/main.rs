//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises the adapter service
//! against mock or loopback adapters.  Everything runs on the host with
//! no controller required.

mod mock_stack;
mod runtime_tests;
mod service_tests;
