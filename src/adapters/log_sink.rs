//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade.  A telemetry or IPC adapter would implement the same
//! trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::RequestDeferred(req) => {
                info!("DEFER | {:?}", req);
            }
            AppEvent::RequestRejected { request, error } => {
                warn!("REJECT | {:?}: {}", request, error);
            }
            AppEvent::EventDropped { event, error } => {
                warn!("DROP | {:?}: {}", event, error);
            }
            AppEvent::CommandFailed { command, error } => {
                warn!("FAIL | {:?}: {}", command, error);
            }
            AppEvent::ProfileStateChanged { name, state } => {
                info!("PROFILE | {} {:?}", name, state);
            }
            AppEvent::AdapterReady { quiet_mode } => {
                info!("READY | quiet_mode={}", quiet_mode);
            }
            AppEvent::PropertyChanged(kind) => {
                info!("PROP | {:?}", kind);
            }
        }
    }
}
