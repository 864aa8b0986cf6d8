//! Unified error types for the adapter lifecycle engine.
//!
//! A single `Error` enum that every subsystem converts into.  All variants
//! are `Copy` so they can be logged, counted and attached to events
//! without allocation.  Only [`Error::PolicyRejected`] is ever surfaced to
//! a direct caller; everything else degrades to logging plus best-effort
//! continuation.

use core::fmt;

use crate::app::ports::GatewayError;
use crate::fsm::{AdapterEvent, AdapterState};
use crate::shutdown::ShutdownStep;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the engine funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// `enable()` refused by an administrative restriction.
    PolicyRejected(&'static str),
    /// An event arrived that is not valid in the current state.
    UnexpectedEvent {
        state: AdapterState,
        event: AdapterEvent,
    },
    /// Profile registry inconsistency.
    Registry(RegistryError),
    /// A second shutdown request while one has already started.
    ShutdownReentry,
    /// A single teardown step failed.
    Cleanup(ShutdownStep),
    /// A native stack command was refused.
    Gateway(GatewayError),
    /// The serialized message queue is full; the message was dropped.
    QueueFull,
    /// The service has been unregistered (shutdown in progress).
    Unavailable,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PolicyRejected(why) => write!(f, "policy rejected: {why}"),
            Self::UnexpectedEvent { state, event } => {
                write!(f, "unexpected event {event:?} in state {state:?}")
            }
            Self::Registry(e) => write!(f, "registry: {e}"),
            Self::ShutdownReentry => write!(f, "shutdown already in progress"),
            Self::Cleanup(step) => write!(f, "cleanup step {step:?} failed"),
            Self::Gateway(e) => write!(f, "gateway: {e}"),
            Self::QueueFull => write!(f, "message queue full"),
            Self::Unavailable => write!(f, "adapter service unavailable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// `register` for a profile that is already registered.
    DoubleRegistration,
    /// `unregister` for a profile that is not registered.
    UnknownUnregister,
    /// A running-state report for a profile that never registered.
    NotRegistered,
    /// A running-state report that matches the current state.
    AlreadyInState,
    /// The name is not in the configured profile set.
    UnknownProfile,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoubleRegistration => write!(f, "already registered"),
            Self::UnknownUnregister => write!(f, "not registered (unregister)"),
            Self::NotRegistered => write!(f, "not registered"),
            Self::AlreadyInState => write!(f, "already in requested state"),
            Self::UnknownProfile => write!(f, "not a configured profile"),
        }
    }
}

impl core::error::Error for Error {}

impl core::error::Error for RegistryError {}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<GatewayError> for Error {
    fn from(e: GatewayError) -> Self {
        Self::Gateway(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
