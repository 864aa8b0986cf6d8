//! btlifecycle: loopback demo entry point.
//!
//! Drives one full power cycle against the in-process loopback stack.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  LoopbackStack                 LogEventSink   LoopbackPower    │
//! │  (Gateway+ProfileHost+Settings)(EventSink)    (PowerPort)      │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            AdapterService (pure logic)                 │    │
//! │  │  FSM · ProfileLifecycleCoordinator · Registry          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  AdapterLoop thread · EnergyMonitor · ShutdownSequencer        │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::{info, warn};

use btlifecycle::adapters::log_sink::LogEventSink;
use btlifecycle::adapters::loopback::{
    LoopbackPersistence, LoopbackPower, LoopbackStack, LoopbackSubsystem,
};
use btlifecycle::config::AdapterConfig;
use btlifecycle::fsm::AdapterState;
use btlifecycle::power::WakeResources;
use btlifecycle::runtime::RuntimeBuilder;
use btlifecycle::shutdown::TeardownSet;

const STATE_TIMEOUT: Duration = Duration::from_secs(2);
const DUMP_TIMEOUT: Duration = Duration::from_millis(500);

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("btlifecycle v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Config (optional JSON path argument) ───────────────
    let config = match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            AdapterConfig::from_json(&json)?
        }
        None => AdapterConfig::default(),
    };

    // ── 2. Collaborators ──────────────────────────────────────
    let builder = RuntimeBuilder::new(config);
    let wake = Arc::new(WakeResources::new(Box::new(LoopbackPower::firing(builder.sender()))));
    let teardown = TeardownSet {
        wake: Some(wake.clone()),
        persistence: Some(Box::new(LoopbackPersistence::default())),
        bond_state_machine: Some(Box::new(LoopbackSubsystem::new("bond-state-machine"))),
        caches: vec![
            Box::new(LoopbackSubsystem::new("remote-devices")),
            Box::new(LoopbackSubsystem::new("sdp")),
        ],
        socket_manager: Some(Box::new(LoopbackSubsystem::new("socket-manager"))),
        native: Some(Box::new(LoopbackSubsystem::new("native"))),
        ..TeardownSet::default()
    };

    let builder = builder.teardown(teardown);
    let stack = LoopbackStack::new(builder.sender(), builder.energy_monitor()).with_wake(wake.clone());
    let runtime = builder
        .start(stack, LogEventSink::new())
        .context("starting adapter loop")?;
    let adapter = runtime.handle();

    // ── 3. Power cycle ────────────────────────────────────────
    if !adapter.enable(false) {
        bail!("enable request refused");
    }
    if !adapter.wait_for_state(AdapterState::On, STATE_TIMEOUT) {
        bail!("adapter stuck in {:?}", adapter.state());
    }

    match adapter.request_activity_info() {
        Some(info) => info!("Activity: {}", serde_json::to_string(&info)?),
        None => warn!("Activity info unavailable"),
    }
    if let Some(dump) = adapter.dump(DUMP_TIMEOUT) {
        println!("{dump}");
    }

    adapter.disable();
    if !adapter.wait_for_state(AdapterState::Off, STATE_TIMEOUT) {
        warn!("adapter did not reach OFF, now {:?}", adapter.state());
    }
    info!("Radio wake lock held after disable: {}", wake.is_wake_lock_held());

    // ── 4. Teardown ───────────────────────────────────────────
    let report = runtime.shutdown()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_clean() {
        warn!("Shutdown finished with {} failures", report.failures.len());
    }
    Ok(())
}
