//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the blackboard the state handlers read from and write
//! to: policy flags, the debug-logging snapshot captured at BLE bring-up,
//! and the queue of internal follow-up events that a state's entry action
//! wants processed before the next external message.

use heapless::Deque;
use log::warn;
use serde::Serialize;

use super::{AdapterEvent, AdapterState};
use crate::config::bounded;

/// Maximum number of internal follow-up events pending at once.
pub const MAX_FOLLOWUPS: usize = 8;

/// Length limit for a snoop-log setting value.
pub const SNOOP_VALUE_LEN: usize = 24;

// ---------------------------------------------------------------------------
// Snoop-log settings snapshot
// ---------------------------------------------------------------------------

/// HCI snoop-log settings that require a full stack restart to take effect.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SnoopSettings {
    /// Snoop log mode ("disabled", "filtered", "full", ...).
    pub mode: heapless::String<SNOOP_VALUE_LEN>,
    /// Whether snoop logging is enabled by default.
    pub default_mode: heapless::String<SNOOP_VALUE_LEN>,
}

impl SnoopSettings {
    pub fn new(mode: &str, default_mode: &str) -> Self {
        Self {
            mode: bounded(mode),
            default_mode: bounded(default_mode),
        }
    }
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The blackboard.
#[derive(Debug, Clone)]
pub struct FsmContext {
    // --- Client intent ---
    /// Quiet-mode flag from the last `enable()`.
    pub quiet_mode: bool,
    /// The last accepted request asked for full ON (not BLE-only).
    pub full_on_requested: bool,

    // --- Policy ---
    pub keep_ble_on_after_disable: bool,

    // --- Snoop-log tracking ---
    /// Settings as read from the system right before the current event.
    pub snoop_live: SnoopSettings,
    /// Settings captured when BLE_TURNING_ON was entered.
    pub snoop_at_enable: Option<SnoopSettings>,
    /// A snoop change forced a power-off; re-issue BLE_TURN_ON once OFF.
    pub restart_after_off: bool,

    // --- Bookkeeping ---
    /// State we were in before the current one.
    pub prev_state: AdapterState,
    followups: Deque<AdapterEvent, MAX_FOLLOWUPS>,
}

impl Default for FsmContext {
    fn default() -> Self {
        Self {
            quiet_mode: false,
            full_on_requested: false,
            keep_ble_on_after_disable: false,
            snoop_live: SnoopSettings::default(),
            snoop_at_enable: None,
            restart_after_off: false,
            prev_state: AdapterState::Off,
            followups: Deque::new(),
        }
    }
}

impl FsmContext {
    pub fn new(keep_ble_on_after_disable: bool) -> Self {
        Self {
            keep_ble_on_after_disable,
            ..Self::default()
        }
    }

    /// Queue an internal event to run before the next external message.
    pub fn push_followup(&mut self, ev: AdapterEvent) {
        if self.followups.push_back(ev).is_err() {
            warn!("Follow-up queue full, dropping {:?}", ev);
        }
    }

    pub fn pop_followup(&mut self) -> Option<AdapterEvent> {
        self.followups.pop_front()
    }

    pub fn has_followups(&self) -> bool {
        !self.followups.is_empty()
    }

    /// True if the live snoop settings differ from those captured at the
    /// start of the current power cycle.
    pub fn snoop_changed(&self) -> bool {
        self.snoop_at_enable
            .as_ref()
            .is_some_and(|captured| *captured != self.snoop_live)
    }
}
