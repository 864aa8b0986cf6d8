//! Integration tests for the AdapterService → FSM → native stack pipeline.
//!
//! These run on the host and drive the service synchronously: requests go
//! in through the message path, the mock stack answers on the queue, and
//! `Harness::pump` delivers the answers.

use std::sync::{Arc, Mutex};

use btlifecycle::adapters::loopback::LoopbackPower;
use btlifecycle::app::commands::AdapterRequest;
use btlifecycle::app::events::AppEvent;
use btlifecycle::app::ports::{AlarmId, GatewayError, GatewayEvent, ProfileState};
use btlifecycle::config::{AdapterConfig, ProfileDescriptor};
use btlifecycle::error::Error;
use btlifecycle::events::{AdapterMessage, QUEUE_DEPTH};
use btlifecycle::fsm::context::SnoopSettings;
use btlifecycle::fsm::{AdapterEvent, AdapterState, Command};
use btlifecycle::power::WakeResources;

use super::mock_stack::{DeadListener, Harness, RecordingListener};

use AdapterState as St;

// ── Enable ────────────────────────────────────────────────────

#[test]
fn gatt_only_enable_goes_straight_to_on() {
    let mut h = Harness::gatt_only();
    assert_eq!(h.enable(), St::On);

    assert_eq!(
        h.stack.calls,
        vec!["power_on", "start:GATT", "enable", "prop:LocalIoCaps", "prop:LocalIoCapsBle"]
    );
    assert_eq!(h.sink.states_visited(), vec![St::BleTurningOn, St::BleOn, St::On]);
    assert!(h.service.properties().ready);
}

#[test]
fn classic_enable_waits_for_every_profile() {
    let mut h = Harness::classic();
    assert_eq!(h.enable(), St::On);

    assert_eq!(
        h.stack.calls,
        vec![
            "power_on",
            "start:GATT",
            "enable",
            "start:A2DP",
            "start:HID",
            "prop:LocalIoCaps",
            "prop:LocalIoCapsBle",
        ]
    );
    assert_eq!(
        h.sink.states_visited(),
        vec![St::BleTurningOn, St::BleOn, St::TurningOn, St::On]
    );
    assert_eq!(h.service.registry().running_count(), 3);
    assert_eq!(h.sink.count(|e| matches!(e, AppEvent::AdapterReady { .. })), 1);
}

#[test]
fn classic_enable_stalls_until_last_profile_reports() {
    let mut h = Harness::classic();
    h.stack.hold_profile_starts = true;
    assert_eq!(h.enable(), St::TurningOn);

    h.stack.report("A2DP", ProfileState::Running);
    h.pump();
    assert_eq!(h.service.state(), St::TurningOn);

    h.stack.report("HID", ProfileState::Running);
    h.pump();
    assert_eq!(h.service.state(), St::On);
}

#[test]
fn enable_when_on_is_a_no_op() {
    let mut h = Harness::gatt_only();
    h.enable();
    h.stack.take_calls();
    let transitions = h.service.metrics().transitions;

    assert_eq!(h.enable(), St::On);
    assert!(h.stack.calls.is_empty());
    assert_eq!(h.service.metrics().transitions, transitions);
}

#[test]
fn quiet_mode_is_carried_to_ready() {
    let mut h = Harness::gatt_only();
    h.request_and_settle(AdapterRequest::Enable { quiet_mode: true });
    assert!(h.service.quiet_mode());
    assert!(h
        .sink
        .events
        .contains(&AppEvent::AdapterReady { quiet_mode: true }));
}

#[test]
fn class_of_device_applied_when_ready() {
    let mut cfg = AdapterConfig::with_profiles(&[ProfileDescriptor::gatt()]);
    cfg.class_of_device = 0x5a_020c;
    let mut h = Harness::new(&cfg);
    h.enable();
    assert!(h.stack.calls.contains(&"cod:0x5a020c".to_string()));
    assert_eq!(h.service.properties().class_of_device, 0x5a_020c);
}

#[test]
fn optional_profile_is_started_but_not_waited_for() {
    let mut map = ProfileDescriptor::standard("MAP");
    map.required_for_full_on = false;
    let mut h = Harness::new(&AdapterConfig::with_profiles(&[ProfileDescriptor::gatt(), map]));
    assert_eq!(h.enable(), St::On);

    assert_eq!(
        h.stack.calls,
        vec!["power_on", "start:GATT", "enable", "start:MAP", "prop:LocalIoCaps", "prop:LocalIoCapsBle"]
    );
    assert_eq!(h.sink.states_visited(), vec![St::BleTurningOn, St::BleOn, St::On]);
    assert!(h.service.registry().is_running("MAP"));
    assert_eq!(h.sink.count(|e| matches!(e, AppEvent::AdapterReady { .. })), 1);
    assert_eq!(h.service.metrics().dropped_events, 0);

    h.stack.take_calls();
    assert_eq!(h.disable(), St::Off);
    assert!(h.stack.calls.contains(&"stop:MAP".to_string()));
    assert_eq!(h.service.registry().running_count(), 0);
}

// ── Disable ───────────────────────────────────────────────────

#[test]
fn disable_stops_classic_then_bootstrap_then_stack() {
    let mut h = Harness::classic();
    h.enable();
    h.stack.take_calls();

    assert_eq!(h.disable(), St::Off);
    assert_eq!(
        h.stack.calls,
        vec![
            "cancel_discovery",
            "scan_mode:None",
            "stop:A2DP",
            "stop:HID",
            "power_off",
            "stop:GATT",
            "disable",
        ]
    );
    assert_eq!(
        &h.sink.states_visited()[4..],
        &[St::TurningOff, St::BleOn, St::BleTurningOff, St::Off]
    );
    assert_eq!(h.service.registry().running_count(), 0);
    assert!(!h.service.properties().ready);
}

#[test]
fn gatt_only_disable_needs_no_profile_reports() {
    let mut h = Harness::gatt_only();
    h.enable();
    assert_eq!(h.disable(), St::Off);
    assert_eq!(h.stack.count("power_off"), 1);
}

#[test]
fn disable_in_off_is_ignored() {
    let mut h = Harness::classic();
    assert_eq!(h.disable(), St::Off);
    assert!(h.stack.calls.is_empty());
    assert!(h.sink.transitions().is_empty());
}

#[test]
fn keep_ble_on_after_disable_stops_in_ble_on() {
    let mut cfg = AdapterConfig::with_profiles(&[ProfileDescriptor::gatt(), ProfileDescriptor::standard("A2DP")]);
    cfg.keep_ble_on_after_disable = true;
    let mut h = Harness::new(&cfg);
    h.enable();

    assert_eq!(h.disable(), St::BleOn);
    assert_eq!(h.stack.count("power_off"), 0);
    assert!(h.service.registry().bootstrap_running());
}

// ── Policy ────────────────────────────────────────────────────

#[test]
fn disallowed_enable_is_rejected() {
    let mut cfg = AdapterConfig::with_profiles(&[ProfileDescriptor::gatt()]);
    cfg.bluetooth_disallowed = true;
    let mut h = Harness::new(&cfg);

    assert_eq!(h.enable(), St::Off);
    assert_eq!(h.request_and_settle(AdapterRequest::EnableBle), St::Off);
    assert!(h.stack.calls.is_empty());
    assert_eq!(h.service.metrics().rejected_requests, 2);
    assert!(h.sink.events.contains(&AppEvent::RequestRejected {
        request: AdapterRequest::Enable { quiet_mode: false },
        error: Error::PolicyRejected("bluetooth disallowed"),
    }));
}

#[test]
fn disallowed_does_not_block_disable() {
    let mut h = Harness::gatt_only();
    h.enable();
    h.service.link().set_disallowed(true);
    assert_eq!(h.disable(), St::Off);
    assert_eq!(h.service.metrics().rejected_requests, 0);
}

// ── Deferral ──────────────────────────────────────────────────

#[test]
fn requests_during_transition_replay_in_order() {
    let mut h = Harness::classic();
    h.request(AdapterRequest::Enable { quiet_mode: false });
    assert_eq!(h.service.state(), St::BleTurningOn);

    h.request(AdapterRequest::Disable);
    h.request(AdapterRequest::Enable { quiet_mode: false });
    assert_eq!(h.service.pending_requests(), 2);

    h.pump();

    // Disable is applied first (in BLE_ON), then Enable (in OFF).
    assert_eq!(h.service.state(), St::On);
    assert_eq!(h.service.pending_requests(), 0);
    assert_eq!(h.service.metrics().deferred_requests, 2);
    let visited = h.sink.states_visited();
    let off = visited.iter().position(|s| *s == St::Off).unwrap();
    assert_eq!(visited[off - 1], St::BleTurningOff);
    assert_eq!(visited.last(), Some(&St::On));
    assert_eq!(h.stack.count("power_on"), 2);
}

#[test]
fn disable_deferred_while_turning_on() {
    let mut h = Harness::classic();
    h.stack.hold_profile_starts = true;
    h.enable();
    assert_eq!(h.service.state(), St::TurningOn);

    h.request(AdapterRequest::Disable);
    assert_eq!(h.service.pending_requests(), 1);
    assert!(h
        .sink
        .events
        .contains(&AppEvent::RequestDeferred(AdapterRequest::Disable)));

    h.stack.report("A2DP", ProfileState::Running);
    h.stack.report("HID", ProfileState::Running);
    h.pump();

    assert_eq!(h.service.state(), St::Off);
    assert_eq!(h.service.pending_requests(), 0);
}

#[test]
fn late_bootstrap_report_after_power_off_is_undone() {
    let mut h = Harness::classic();
    h.request(AdapterRequest::Enable { quiet_mode: false });
    h.request(AdapterRequest::Disable);
    h.pump();

    assert_eq!(h.service.state(), St::Off);
    assert!(!h.service.registry().bootstrap_running());

    // A fresh enable is not stuck behind the stale bootstrap profile.
    assert_eq!(h.enable(), St::On);
}

// ── Low-energy only ───────────────────────────────────────────

#[test]
fn enable_ble_stops_in_ble_on() {
    let mut h = Harness::classic();
    assert_eq!(h.request_and_settle(AdapterRequest::EnableBle), St::BleOn);
    assert_eq!(h.stack.calls, vec!["power_on", "start:GATT", "enable"]);
    assert_eq!(h.sink.count(|e| matches!(e, AppEvent::AdapterReady { .. })), 0);
}

#[test]
fn le_service_up_completes_full_enable() {
    let mut h = Harness::classic();
    h.request_and_settle(AdapterRequest::EnableBle);
    assert_eq!(h.request_and_settle(AdapterRequest::LeServiceUp), St::On);
    assert_eq!(h.service.registry().running_count(), 3);
}

#[test]
fn enable_from_ble_on_brings_up_classic() {
    let mut h = Harness::classic();
    h.request_and_settle(AdapterRequest::EnableBle);
    assert_eq!(h.enable(), St::On);
}

#[test]
fn br_edr_down_powers_off_from_ble_on() {
    let mut h = Harness::classic();
    h.request_and_settle(AdapterRequest::EnableBle);
    h.stack.take_calls();

    assert_eq!(h.request_and_settle(AdapterRequest::BrEdrDown), St::Off);
    assert_eq!(h.stack.calls, vec!["power_off", "stop:GATT", "disable"]);
}

#[test]
fn le_requests_outside_ble_on_are_ignored() {
    let mut h = Harness::gatt_only();
    assert_eq!(h.request_and_settle(AdapterRequest::LeServiceUp), St::Off);
    h.enable();
    assert_eq!(h.request_and_settle(AdapterRequest::BrEdrDown), St::On);
    assert_eq!(h.request_and_settle(AdapterRequest::EnableBle), St::On);
}

// ── Snoop-log power cycle ─────────────────────────────────────

#[test]
fn snoop_change_forces_restart_with_keep_ble_on() {
    let mut cfg = AdapterConfig::with_profiles(&[ProfileDescriptor::gatt(), ProfileDescriptor::standard("A2DP")]);
    cfg.keep_ble_on_after_disable = true;
    let mut h = Harness::new(&cfg);
    h.enable();

    h.stack.snoop = SnoopSettings::new("full", "false");
    assert_eq!(h.disable(), St::BleOn);

    assert_eq!(h.stack.count("power_off"), 1);
    assert_eq!(h.stack.count("power_on"), 2);
    let captured = h.service.dump().snoop_at_enable.unwrap();
    assert_eq!(captured.mode.as_str(), "full");
}

#[test]
fn snoop_change_without_keep_ble_on_just_powers_off() {
    let mut h = Harness::classic();
    h.enable();
    h.stack.snoop = SnoopSettings::new("filtered", "false");
    assert_eq!(h.disable(), St::Off);
    assert_eq!(h.stack.count("power_on"), 1);
}

// ── Failures ──────────────────────────────────────────────────

#[test]
fn refused_power_on_leaves_state_unchanged() {
    let mut h = Harness::gatt_only();
    h.stack.fail_power_on = true;

    assert_eq!(h.enable(), St::Off);
    assert_eq!(h.service.metrics().failed_commands, 1);
    assert!(h.sink.events.contains(&AppEvent::CommandFailed {
        command: Command::PowerOn,
        error: Error::Gateway(GatewayError::Busy),
    }));

    h.stack.fail_power_on = false;
    assert_eq!(h.enable(), St::On);
}

#[test]
fn unexpected_stack_callback_is_dropped() {
    let mut h = Harness::gatt_only();
    h.queue.sender().gateway(GatewayEvent::StackPoweredOn);
    h.pump();

    assert_eq!(h.service.state(), St::Off);
    assert_eq!(h.service.metrics().dropped_events, 1);
    assert_eq!(
        h.sink.count(|e| matches!(
            e,
            AppEvent::EventDropped {
                event: AdapterEvent::BleStarted,
                ..
            }
        )),
        1
    );
}

#[test]
fn unknown_profile_report_is_ignored() {
    let mut h = Harness::gatt_only();
    h.stack.report("MAP", ProfileState::Running);
    h.pump();
    assert_eq!(h.service.state(), St::Off);
    assert!(h.stack.calls.is_empty());
}

// ── Profiles ──────────────────────────────────────────────────

#[test]
fn unregister_while_running_counts_as_stopped() {
    let mut h = Harness::classic();
    h.enable();
    h.queue.sender().profile_unregistered("A2DP");
    h.pump();

    assert_eq!(h.service.state(), St::On);
    assert!(!h.service.registry().is_registered("A2DP"));
    assert!(!h.service.registry().is_running("A2DP"));
    assert!(h.sink.events.contains(&AppEvent::ProfileStateChanged {
        name: "A2DP".try_into().unwrap(),
        state: ProfileState::Stopped,
    }));

    h.stack.take_calls();
    assert_eq!(h.disable(), St::Off);
    assert!(!h.stack.calls.contains(&"stop:A2DP".to_string()));
}

// ── Listeners ─────────────────────────────────────────────────

#[test]
fn dead_listener_does_not_stop_broadcast() {
    let mut h = Harness::gatt_only();
    let seen = Arc::new(Mutex::new(Vec::new()));
    h.service.handle_message(
        AdapterMessage::RegisterListener {
            id: 1,
            listener: Box::new(DeadListener),
        },
        &mut h.stack,
        &mut h.sink,
    );
    h.service.handle_message(
        AdapterMessage::RegisterListener {
            id: 2,
            listener: Box::new(RecordingListener(seen.clone())),
        },
        &mut h.stack,
        &mut h.sink,
    );

    h.enable();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(St::Off, St::BleTurningOn), (St::BleTurningOn, St::BleOn), (St::BleOn, St::On)]
    );
    assert_eq!(h.service.metrics().listener_failures, 3);
    assert_eq!(h.service.state(), St::On);
}

#[test]
fn unregistered_listener_hears_nothing() {
    let mut h = Harness::gatt_only();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let tx = h.queue.sender();
    tx.post(AdapterMessage::RegisterListener {
        id: 7,
        listener: Box::new(RecordingListener(seen.clone())),
    });
    tx.post(AdapterMessage::UnregisterListener(7));
    h.pump();
    assert_eq!(h.service.listener_count(), 0);

    h.enable();
    assert!(seen.lock().unwrap().is_empty());
}

// ── Diagnostics and passthrough ───────────────────────────────

#[test]
fn dump_reflects_running_adapter() {
    let mut h = Harness::classic();
    h.enable();

    let dump = h.service.dump();
    assert_eq!(dump.state, St::On);
    assert_eq!(dump.running_profiles().count(), 3);
    assert!(dump.full_on_requested);
    let json: serde_json::Value = serde_json::from_str(&dump.to_json().unwrap()).unwrap();
    assert_eq!(json["state"], "On");
    assert_eq!(json["full_on_requested"], true);
    assert!(dump.to_string().contains("state: On"));
}

#[test]
fn dump_message_answers_on_reply_slot() {
    let mut h = Harness::gatt_only();
    let reply = Arc::new(embassy_sync::signal::Signal::new());
    h.queue.sender().post(AdapterMessage::Dump(reply.clone()));
    h.pump();
    let dump = reply.try_take().unwrap();
    assert_eq!(dump.state, St::Off);
}

#[test]
fn energy_read_and_alarm_reach_the_stack() {
    let mut h = Harness::gatt_only();
    let tx = h.queue.sender();
    tx.post(AdapterMessage::ReadEnergyInfo);
    tx.post(AdapterMessage::AlarmFired(AlarmId(1)));
    h.pump();
    assert_eq!(h.stack.calls, vec!["read_energy_info", "alarm_fired"]);
}

#[test]
fn only_the_pending_alarm_reaches_the_stack() {
    let mut h = Harness::gatt_only();
    let wake = Arc::new(WakeResources::new(Box::new(LoopbackPower::default())));
    h.service.attach_wake_resources(wake.clone());
    wake.set_wake_alarm(100, true);
    wake.set_wake_alarm(200, true);

    let tx = h.queue.sender();
    tx.alarm_fired(AlarmId(1));
    h.pump();
    assert_eq!(h.stack.count("alarm_fired"), 0, "cancelled alarm delivered");

    tx.alarm_fired(AlarmId(2));
    h.pump();
    assert_eq!(h.stack.count("alarm_fired"), 1);
    assert!(!wake.has_pending_alarm());

    wake.set_wake_alarm(300, true);
    wake.release_all();
    tx.alarm_fired(AlarmId(3));
    h.pump();
    assert_eq!(h.stack.count("alarm_fired"), 1, "alarm delivered after release");
}

#[test]
fn callbacks_held_in_overflow_still_complete_disable() {
    let mut h = Harness::classic();
    h.enable();
    h.stack.take_calls();

    let tx = h.queue.sender();
    for _ in 0..QUEUE_DEPTH {
        assert!(tx.post(AdapterMessage::ReadEnergyInfo));
    }
    h.request(AdapterRequest::Disable);
    assert_eq!(h.queue.overflow_len(), 2);

    h.pump();
    assert_eq!(h.service.state(), St::Off);
    assert_eq!(h.stack.count("read_energy_info"), QUEUE_DEPTH);
    assert_eq!(h.stack.count("power_off"), 1);
    assert_eq!(h.queue.overflow_len(), 0);
}

#[test]
fn drain_stops_at_quit() {
    let mut h = Harness::gatt_only();
    let tx = h.queue.sender();
    tx.post(AdapterMessage::Quit);
    tx.request(AdapterRequest::Enable { quiet_mode: false });
    assert_eq!(h.pump(), 0);
    assert_eq!(h.service.state(), St::Off);
    assert!(h.queue.try_recv().is_some());
}
