//! Outbound application events.
//!
//! The [`AdapterService`](super::service::AdapterService) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on
//! the other side decide what to do with them: log, forward to a
//! telemetry channel, or record for tests.

use crate::config::ProfileName;
use crate::error::Error;
use crate::fsm::{AdapterEvent, AdapterState, Command};

use super::commands::AdapterRequest;
use super::ports::{PropertyKind, ProfileState};

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service has started (carries initial state).
    Started(AdapterState),

    /// The FSM committed a transition.
    StateChanged { from: AdapterState, to: AdapterState },

    /// A request arrived mid-transition and was queued.
    RequestDeferred(AdapterRequest),

    /// A request was refused (policy restriction).
    RequestRejected { request: AdapterRequest, error: Error },

    /// An event was not valid in the current state and was ignored.
    EventDropped { event: AdapterEvent, error: Error },

    /// A transition's command failed; the transition was abandoned.
    CommandFailed { command: Command, error: Error },

    /// A profile service reported a new running state.
    ProfileStateChanged { name: ProfileName, state: ProfileState },

    /// Every expected profile is running and the adapter is ready for use.
    AdapterReady { quiet_mode: bool },

    /// The native stack reported a property value.
    PropertyChanged(PropertyKind),
}
