//! Application core: lifecycle logic, zero I/O.
//!
//! This module contains the rules for the adapter power lifecycle:
//! request policy, deferral while transitional, FSM orchestration and
//! profile bring-up.  All interaction with the native stack happens
//! through **port traits** defined in [`ports`], keeping this layer fully
//! testable without a controller.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
