//! Concrete state handler functions and table builder.
//!
//! ```text
//!  OFF ──[BLE_TURN_ON / power_on]──▶ BLE_TURNING_ON ──[BLE_STARTED / start GATT]──▶ BLE_ON
//!   ▲                                                                              │  │  ▲
//!   │                                                   [BREDR_STARTED]  (GATT-only) │  │  │
//!   │                                 ON ◀──────────────────────────────────────────┘  │  │
//!   │                                 ▲  │                                              │  │
//!   │               [BREDR_STARTED]   │  │ [USER_TURN_OFF / stop profiles]              │  │
//!   │                     TURNING_ON ─┘  ▼                                              │  │
//!   │                         ▲       TURNING_OFF ──[BREDR_STOPPED]─────────────────────┼──┘
//!   │                         └──────────────[USER_TURN_ON]──────────────────────────────┤
//!   │                                                                                   │
//!   └──[BLE_STOPPED]── BLE_TURNING_OFF ◀──[BLE_TURN_OFF | USER_TURN_OFF / power_off]─────┘
//! ```

use super::context::FsmContext;
use super::{AdapterEvent, AdapterState, Command, StateDescriptor, Transition};
use log::{info, warn};

use AdapterEvent as Ev;
use AdapterState as St;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; AdapterState::COUNT] {
    [
        // Index 0: Off
        StateDescriptor {
            id: St::Off,
            name: "OFF",
            on_enter: Some(off_enter),
            on_exit: None,
            on_event: off_event,
        },
        // Index 1: BleTurningOn
        StateDescriptor {
            id: St::BleTurningOn,
            name: "BLE_TURNING_ON",
            on_enter: Some(ble_turning_on_enter),
            on_exit: None,
            on_event: ble_turning_on_event,
        },
        // Index 2: BleOn
        StateDescriptor {
            id: St::BleOn,
            name: "BLE_ON",
            on_enter: Some(ble_on_enter),
            on_exit: None,
            on_event: ble_on_event,
        },
        // Index 3: TurningOn
        StateDescriptor {
            id: St::TurningOn,
            name: "TURNING_ON",
            on_enter: None,
            on_exit: None,
            on_event: turning_on_event,
        },
        // Index 4: On
        StateDescriptor {
            id: St::On,
            name: "ON",
            on_enter: Some(on_enter),
            on_exit: None,
            on_event: on_event,
        },
        // Index 5: TurningOff
        StateDescriptor {
            id: St::TurningOff,
            name: "TURNING_OFF",
            on_enter: None,
            on_exit: None,
            on_event: turning_off_event,
        },
        // Index 6: BleTurningOff
        StateDescriptor {
            id: St::BleTurningOff,
            name: "BLE_TURNING_OFF",
            on_enter: None,
            on_exit: None,
            on_event: ble_turning_off_event,
        },
    ]
}

/// Whether `from --event--> to` is an edge of the transition table.
pub fn is_defined_edge(from: AdapterState, event: AdapterEvent, to: AdapterState) -> bool {
    matches!(
        (from, event, to),
        (St::Off, Ev::BleTurnOn, St::BleTurningOn)
            | (St::BleTurningOn, Ev::BleStarted, St::BleOn)
            | (St::BleOn, Ev::BredrStarted, St::On)
            | (St::BleOn, Ev::UserTurnOn, St::TurningOn)
            | (St::TurningOn, Ev::BredrStarted, St::On)
            | (St::BleOn, Ev::UserTurnOff | Ev::BleTurnOff, St::BleTurningOff)
            | (St::On, Ev::UserTurnOff, St::TurningOff)
            | (St::TurningOff, Ev::BredrStopped, St::BleOn)
            | (St::BleTurningOff, Ev::BleStopped, St::Off)
    )
}

// ═══════════════════════════════════════════════════════════════════════════
//  OFF
// ═══════════════════════════════════════════════════════════════════════════

fn off_enter(ctx: &mut FsmContext) {
    ctx.full_on_requested = false;
    if ctx.restart_after_off {
        ctx.restart_after_off = false;
        info!("OFF: restarting stack to apply snoop-log settings");
        ctx.push_followup(Ev::BleTurnOn);
    } else {
        info!("OFF: adapter powered down");
    }
}

fn off_event(_ctx: &FsmContext, ev: AdapterEvent) -> Option<Transition> {
    match ev {
        Ev::BleTurnOn => Some(Transition::emitting(St::BleTurningOn, Command::PowerOn)),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  BLE_TURNING_ON: waiting for the native stack to power up
// ═══════════════════════════════════════════════════════════════════════════

fn ble_turning_on_enter(ctx: &mut FsmContext) {
    ctx.snoop_at_enable = Some(ctx.snoop_live.clone());
    info!(
        "BLE_TURNING_ON: snoop mode '{}' captured",
        ctx.snoop_live.mode.as_str()
    );
}

fn ble_turning_on_event(_ctx: &FsmContext, ev: AdapterEvent) -> Option<Transition> {
    match ev {
        Ev::BleStarted => Some(Transition::emitting(
            St::BleOn,
            Command::StartBootstrapProfile,
        )),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  BLE_ON: low-energy only, bootstrap profile up or coming up
// ═══════════════════════════════════════════════════════════════════════════

/// Snoop settings are compared on every entry, bring-up included: a change
/// since BLE_TURNING_ON means the stack must be power cycled to apply it.
fn ble_on_enter(ctx: &mut FsmContext) {
    if ctx.snoop_changed() {
        warn!("BLE_ON: snoop-log settings changed, forcing stack power cycle");
        ctx.restart_after_off = ctx.keep_ble_on_after_disable;
        ctx.push_followup(Ev::BleTurnOff);
    } else if ctx.prev_state == St::BleTurningOn {
        info!("BLE_ON: low-energy stack up");
    } else if !ctx.keep_ble_on_after_disable {
        info!("BLE_ON: classic down, continuing to OFF");
        ctx.push_followup(Ev::BleTurnOff);
    } else {
        info!("BLE_ON: classic down, keeping low-energy stack on");
    }
}

fn ble_on_event(_ctx: &FsmContext, ev: AdapterEvent) -> Option<Transition> {
    match ev {
        Ev::BredrStarted => Some(Transition::to(St::On)),
        Ev::UserTurnOn => Some(Transition::to(St::TurningOn)),
        Ev::UserTurnOff | Ev::BleTurnOff => {
            Some(Transition::emitting(St::BleTurningOff, Command::PowerOff))
        }
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  TURNING_ON: classic profiles starting
// ═══════════════════════════════════════════════════════════════════════════

fn turning_on_event(_ctx: &FsmContext, ev: AdapterEvent) -> Option<Transition> {
    match ev {
        Ev::BredrStarted => Some(Transition::to(St::On)),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  ON
// ═══════════════════════════════════════════════════════════════════════════

fn on_enter(ctx: &mut FsmContext) {
    info!("ON: adapter fully enabled (quiet mode: {})", ctx.quiet_mode);
}

fn on_event(_ctx: &FsmContext, ev: AdapterEvent) -> Option<Transition> {
    match ev {
        Ev::UserTurnOff => Some(Transition::emitting(
            St::TurningOff,
            Command::StopProfileServices,
        )),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  TURNING_OFF: classic profiles stopping
// ═══════════════════════════════════════════════════════════════════════════

fn turning_off_event(_ctx: &FsmContext, ev: AdapterEvent) -> Option<Transition> {
    match ev {
        Ev::BredrStopped => Some(Transition::to(St::BleOn)),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  BLE_TURNING_OFF: waiting for the native stack to power down
// ═══════════════════════════════════════════════════════════════════════════

fn ble_turning_off_event(_ctx: &FsmContext, ev: AdapterEvent) -> Option<Transition> {
    match ev {
        Ev::BleStopped => Some(Transition::to(St::Off)),
        _ => None,
    }
}
