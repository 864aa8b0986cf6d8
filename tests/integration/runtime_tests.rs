//! End-to-end tests: the threaded runtime against the loopback stack.
//!
//! Every test shuts its runtime down so the adapter-loop thread exits.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use btlifecycle::adapters::log_sink::LogEventSink;
use btlifecycle::adapters::loopback::{
    LoopbackPersistence, LoopbackPower, LoopbackStack, LoopbackSubsystem, RADIO_WAKE_LOCK,
};
use btlifecycle::config::AdapterConfig;
use btlifecycle::energy::ControllerState;
use btlifecycle::error::Error;
use btlifecycle::fsm::AdapterState;
use btlifecycle::power::WakeResources;
use btlifecycle::runtime::{AdapterRuntime, RuntimeBuilder};
use btlifecycle::shutdown::{ShutdownStep, TeardownSet};

use super::mock_stack::RecordingListener;

const WAIT: Duration = Duration::from_secs(2);

fn start(config: AdapterConfig, teardown: TeardownSet) -> AdapterRuntime {
    let builder = RuntimeBuilder::new(config).teardown(teardown);
    let stack = LoopbackStack::new(builder.sender(), builder.energy_monitor());
    builder.start(stack, LogEventSink::new()).unwrap()
}

#[test]
fn full_power_cycle_over_handle() {
    let rt = start(AdapterConfig::default(), TeardownSet::default());
    let adapter = rt.handle();

    assert!(adapter.enable(false));
    assert!(adapter.wait_for_state(AdapterState::On, WAIT));
    let dump = adapter.dump(WAIT).unwrap();
    assert_eq!(dump.running_profiles().count(), 5);
    assert!(dump.properties.ready);
    assert_eq!(dump.properties.address.as_deref(), Some("02:00:5E:10:00:01"));

    assert!(adapter.disable());
    assert!(adapter.wait_for_state(AdapterState::Off, WAIT));

    let report = rt.shutdown().unwrap();
    assert!(report.is_clean());
    assert_eq!(rt.with_stopped_service(|s| s.state()), Some(AdapterState::Off));
    assert_eq!(rt.with_stopped_service(|s| s.registry().registered_count()), Some(0));
}

#[test]
fn shutdown_runs_once() {
    let rt = start(AdapterConfig::default(), TeardownSet::default());
    assert!(rt.shutdown().is_ok());
    assert!(matches!(rt.shutdown(), Err(Error::ShutdownReentry)));
}

#[test]
fn shutdown_tears_down_every_component() {
    let wake = Arc::new(WakeResources::new(Box::new(LoopbackPower::default())));
    wake.acquire_wake_lock("test");
    assert!(wake.set_wake_alarm(1_000, true));
    let teardown = TeardownSet {
        wake: Some(wake.clone()),
        persistence: Some(Box::new(LoopbackPersistence::default())),
        bond_state_machine: Some(Box::new(LoopbackSubsystem::new("bond"))),
        caches: vec![Box::new(LoopbackSubsystem::new("sdp"))],
        socket_manager: Some(Box::new(LoopbackSubsystem::new("sockets"))),
        native: Some(Box::new(LoopbackSubsystem::new("native"))),
        ..TeardownSet::default()
    };
    let rt = start(AdapterConfig::default(), teardown);

    let report = rt.shutdown().unwrap();
    assert_eq!(report.completed, ShutdownStep::ALL.to_vec());
    assert!(!wake.is_wake_lock_held());
    assert!(!wake.has_pending_alarm());
}

#[test]
fn stack_alarm_traffic_races_shutdown_cleanly() {
    let builder = RuntimeBuilder::new(AdapterConfig::default());
    let wake = Arc::new(WakeResources::new(Box::new(LoopbackPower::firing(builder.sender()))));
    let builder = builder.teardown(TeardownSet {
        wake: Some(wake.clone()),
        ..TeardownSet::default()
    });
    let stack = LoopbackStack::new(builder.sender(), builder.energy_monitor()).with_wake(wake.clone());
    let rt = builder.start(stack, LogEventSink::new()).unwrap();
    let adapter = rt.handle();

    assert!(adapter.enable(false));
    assert!(adapter.wait_for_state(AdapterState::On, WAIT));
    assert!(wake.has_pending_alarm());
    assert!(wake.is_wake_lock_held());

    // A stack timer thread keeps re-arming short alarms, each of which
    // fires back through the queue, until shutdown releases everything.
    let timer = {
        let wake = wake.clone();
        std::thread::spawn(move || {
            let mut armed = 0u32;
            while wake.set_wake_alarm(1, true) {
                armed += 1;
                std::thread::sleep(Duration::from_millis(1));
            }
            armed
        })
    };
    std::thread::sleep(Duration::from_millis(20));
    let report = rt.shutdown().unwrap();
    let armed = timer.join().unwrap();

    assert!(armed > 0);
    assert!(report.completed.contains(&ShutdownStep::ReleaseWakeResources));
    assert!(!wake.has_pending_alarm());
    assert!(!wake.is_wake_lock_held());
    assert!(!wake.acquire_wake_lock(RADIO_WAKE_LOCK));
}

#[test]
fn inactive_native_stack_is_left_alone() {
    let teardown = TeardownSet {
        native: Some(Box::new(LoopbackSubsystem::inactive("native"))),
        ..TeardownSet::default()
    };
    let rt = start(AdapterConfig::default(), teardown);
    let report = rt.shutdown().unwrap();
    assert!(report.skipped.contains(&ShutdownStep::ReleaseNative));
}

#[test]
fn handle_is_unavailable_after_shutdown() {
    let rt = start(AdapterConfig::default(), TeardownSet::default());
    let adapter = rt.handle();
    rt.shutdown().unwrap();

    assert!(!adapter.enable(false));
    assert!(!adapter.disable());
    assert!(adapter.register_listener(Box::new(RecordingListener(Arc::default()))).is_none());
    assert!(adapter.request_activity_info().is_none());
}

#[test]
fn disallowed_handle_refuses_enable() {
    let rt = start(AdapterConfig::default(), TeardownSet::default());
    let adapter = rt.handle();
    adapter.set_bluetooth_disallowed(true);

    assert!(adapter.is_bluetooth_disallowed());
    assert!(!adapter.enable(false));
    assert!(!adapter.enable_ble());
    assert_eq!(adapter.state(), AdapterState::Off);
    rt.shutdown().unwrap();
}

#[test]
fn activity_info_requires_on() {
    let mut cfg = AdapterConfig::default();
    cfg.energy_info_timeout_ms = 1_000;
    let rt = start(cfg, TeardownSet::default());
    let adapter = rt.handle();
    assert!(adapter.request_activity_info().is_none());

    adapter.enable(false);
    assert!(adapter.wait_for_state(AdapterState::On, WAIT));
    let info = adapter.request_activity_info().unwrap();

    assert_eq!(info.ctrl_state, ControllerState::Active);
    assert_eq!((info.tx_time_ms, info.rx_time_ms, info.idle_time_ms), (10, 20, 900));
    // (10·12 + 20·8 + 900·1) mA·ms at 3.3 V
    assert_eq!(info.energy_used, 3_894);
    assert_eq!(info.uid_traffic.len(), 1);
    rt.shutdown().unwrap();
}

#[test]
fn activity_info_unsupported_controller() {
    let mut cfg = AdapterConfig::default();
    cfg.energy_reporting_supported = false;
    let rt = start(cfg, TeardownSet::default());
    let adapter = rt.handle();
    adapter.enable(false);
    assert!(adapter.wait_for_state(AdapterState::On, WAIT));
    assert!(adapter.request_activity_info().is_none());
    rt.shutdown().unwrap();
}

#[test]
fn listener_sees_every_transition() {
    let rt = start(AdapterConfig::default(), TeardownSet::default());
    let adapter = rt.handle();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let id = adapter
        .register_listener(Box::new(RecordingListener(seen.clone())))
        .unwrap();

    adapter.enable(false);
    assert!(adapter.wait_for_state(AdapterState::On, WAIT));
    // The dump is answered after the broadcast that published ON.
    adapter.dump(WAIT).unwrap();
    assert_eq!(seen.lock().unwrap().last(), Some(&(AdapterState::TurningOn, AdapterState::On)));
    assert_eq!(seen.lock().unwrap().len(), 4);

    assert!(adapter.unregister_listener(id));
    adapter.disable();
    assert!(adapter.wait_for_state(AdapterState::Off, WAIT));
    adapter.dump(WAIT).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 4);
    rt.shutdown().unwrap();
}
