//! Function-pointer adapter power state machine.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                      │
//! │  ┌────────────────┬───────────┬──────────┬──────────────────────┐ │
//! │  │ AdapterState    │ on_enter  │ on_exit  │ on_event             │ │
//! │  ├────────────────┼───────────┼──────────┼──────────────────────┤ │
//! │  │ Off             │ fn(ctx)   │ -        │ fn(ctx,ev)->Option<> │ │
//! │  │ BleTurningOn    │ fn(ctx)   │ -        │ fn(ctx,ev)->Option<> │ │
//! │  │ BleOn           │ fn(ctx)   │ -        │ fn(ctx,ev)->Option<> │ │
//! │  │ ...             │           │          │                      │ │
//! │  └────────────────┴───────────┴──────────┴──────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! For every event the engine calls `on_event` of the **current** state.
//! A returned [`Transition`] names the next state and, optionally, a
//! [`Command`] to emit.  The command runs first; if it fails the
//! transition is abandoned and the state is unchanged.  Otherwise the
//! engine runs `on_exit`, moves the pointer and runs `on_enter`.
//! `None` from `on_event` means the event is not valid here: it is
//! reported back as [`Dispatch::Dropped`] and never changes state.

pub mod context;
pub mod states;

use context::FsmContext;
use log::info;
use serde::Serialize;

use crate::error::Error;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Adapter power state.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum AdapterState {
    Off = 0,
    BleTurningOn = 1,
    BleOn = 2,
    TurningOn = 3,
    On = 4,
    TurningOff = 5,
    BleTurningOff = 6,
}

impl AdapterState {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 7;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Off,
        Self::BleTurningOn,
        Self::BleOn,
        Self::TurningOn,
        Self::On,
        Self::TurningOff,
        Self::BleTurningOff,
    ];

    /// Convert an index back to `AdapterState`.  Out-of-range values map
    /// to `Off` in release builds.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Off,
            1 => Self::BleTurningOn,
            2 => Self::BleOn,
            3 => Self::TurningOn,
            4 => Self::On,
            5 => Self::TurningOff,
            6 => Self::BleTurningOff,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Off
            }
        }
    }

    /// A transition is in flight; user requests must wait.
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            Self::BleTurningOn | Self::TurningOn | Self::TurningOff | Self::BleTurningOff
        )
    }

    pub fn is_stable(self) -> bool {
        !self.is_transitional()
    }
}

// ---------------------------------------------------------------------------
// Events and commands
// ---------------------------------------------------------------------------

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AdapterEvent {
    /// Power the stack up to BLE.
    BleTurnOn,
    /// Continue from BLE_ON to full ON.
    UserTurnOn,
    /// Native stack reports powered on.
    BleStarted,
    /// Every expected classic profile is running.
    BredrStarted,
    /// Client asked for the adapter to be turned off.
    UserTurnOff,
    /// Classic profiles are down (only the bootstrap profile is left).
    BredrStopped,
    /// Power the stack down from BLE_ON.
    BleTurnOff,
    /// Native stack reports powered off.
    BleStopped,
}

/// Side effects emitted on a transition edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Command {
    /// `gateway.power_on()`
    PowerOn,
    /// Start the bootstrap (GATT) profile.
    StartBootstrapProfile,
    /// Coordinator `stop_profile_services()`.
    StopProfileServices,
    /// `gateway.power_off()` and stop of the bootstrap profile.
    PowerOff,
}

/// Result of a state's event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub to: AdapterState,
    pub emit: Option<Command>,
}

impl Transition {
    pub const fn to(to: AdapterState) -> Self {
        Self { to, emit: None }
    }

    pub const fn emitting(to: AdapterState, cmd: Command) -> Self {
        Self {
            to,
            emit: Some(cmd),
        }
    }
}

/// What the engine did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Transitioned {
        from: AdapterState,
        to: AdapterState,
    },
    /// Not valid in the current state.  State unchanged.
    Dropped(Error),
    /// The emitted command failed.  State unchanged.
    Failed { command: Command, error: Error },
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut FsmContext);

/// Signature for the per-event handler.
pub type StateEventFn = fn(&FsmContext, AdapterEvent) -> Option<Transition>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single state.
pub struct StateDescriptor {
    pub id: AdapterState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_event: StateEventFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The adapter state machine engine.
pub struct Fsm {
    /// Fixed-size table indexed by `AdapterState as usize`.
    table: [StateDescriptor; AdapterState::COUNT],
    current: usize,
    transitions: u64,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; AdapterState::COUNT], initial: AdapterState) -> Self {
        Self {
            table,
            current: initial as usize,
            transitions: 0,
        }
    }

    /// Run the initial `on_enter`.  Call once after construction.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("Adapter FSM starting in state: {}", self.table[self.current].name);
        ctx.prev_state = self.current_state();
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Feed one event through the current state's handler.
    ///
    /// `exec` runs the emitted command (if any) before the transition is
    /// committed.  It may return a follow-up event, which is queued on
    /// `ctx.followups` after `on_enter` of the new state has run.
    pub fn dispatch(
        &mut self,
        event: AdapterEvent,
        ctx: &mut FsmContext,
        exec: impl FnOnce(Command) -> crate::error::Result<Option<AdapterEvent>>,
    ) -> Dispatch {
        let state = self.current_state();
        let Some(t) = (self.table[self.current].on_event)(ctx, event) else {
            return Dispatch::Dropped(Error::UnexpectedEvent { state, event });
        };

        let mut followup = None;
        if let Some(command) = t.emit {
            match exec(command) {
                Ok(next) => followup = next,
                Err(error) => return Dispatch::Failed { command, error },
            }
        }

        self.transition(t.to, ctx);
        if let Some(ev) = followup {
            ctx.push_followup(ev);
        }
        Dispatch::Transitioned { from: state, to: t.to }
    }

    pub fn current_state(&self) -> AdapterState {
        AdapterState::from_index(self.current)
    }

    pub fn state_name(&self) -> &'static str {
        self.table[self.current].name
    }

    /// Number of committed transitions since construction.
    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next: AdapterState, ctx: &mut FsmContext) {
        let next_idx = next as usize;

        info!(
            "Adapter transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        ctx.prev_state = self.current_state();
        self.current = next_idx;
        self.transitions += 1;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
