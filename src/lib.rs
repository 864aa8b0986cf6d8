//! btlifecycle: Bluetooth adapter lifecycle engine.
//!
//! Exposes the lifecycle state machine, the adapter service and its
//! threaded runtime for integration testing and embedding.  Everything
//! that touches a real controller sits behind the port traits in
//! [`app::ports`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod energy;
pub mod error;
pub mod events;
pub mod fsm;
pub mod link;
pub mod listeners;
pub mod power;
pub mod properties;
pub mod registry;
pub mod runtime;
pub mod shutdown;
