//! Fuzz target: adapter message sequences
//!
//! Each input byte becomes one message: a client request, a spurious or
//! genuine stack callback, a profile report, or a pump of the callbacks
//! the in-process stack has queued.
//!
//! Invariants checked:
//! - No panics under any message order
//! - Every committed transition is an edge of the transition table
//!
//! cargo fuzz run fuzz_message_sequence

#![no_main]

use btlifecycle::app::commands::AdapterRequest;
use btlifecycle::app::events::AppEvent;
use btlifecycle::app::ports::{
    EventSink, GatewayError, GatewayEvent, ProfileHost, ProfileState, PropertyKind,
    RadioStackGateway, ScanMode, SystemSettings,
};
use btlifecycle::app::service::AdapterService;
use btlifecycle::config::{AdapterConfig, ProfileDescriptor};
use btlifecycle::events::{AdapterMessage, MessageQueue, MessageSender};
use btlifecycle::fsm::context::SnoopSettings;
use btlifecycle::fsm::states::is_defined_edge;
use btlifecycle::fsm::{AdapterEvent, AdapterState};
use libfuzzer_sys::fuzz_target;

const PROFILES: [&str; 3] = ["GATT", "A2DP", "HID"];

struct EchoStack {
    tx: MessageSender,
}

impl RadioStackGateway for EchoStack {
    fn power_on(&mut self) -> Result<(), GatewayError> {
        self.tx.gateway(GatewayEvent::StackPoweredOn);
        Ok(())
    }
    fn power_off(&mut self) -> Result<(), GatewayError> {
        self.tx.gateway(GatewayEvent::StackPoweredOff);
        Ok(())
    }
    fn enable(&mut self) -> Result<(), GatewayError> {
        Ok(())
    }
    fn disable(&mut self) -> Result<(), GatewayError> {
        Ok(())
    }
    fn cancel_discovery(&mut self) -> Result<(), GatewayError> {
        Ok(())
    }
    fn set_scan_mode(&mut self, _: ScanMode) -> Result<(), GatewayError> {
        Ok(())
    }
    fn set_class_of_device(&mut self, _: u32) -> Result<(), GatewayError> {
        Ok(())
    }
    fn request_property(&mut self, _: PropertyKind) -> Result<(), GatewayError> {
        Ok(())
    }
    fn read_energy_info(&mut self) -> Result<(), GatewayError> {
        Err(GatewayError::Unsupported)
    }
    fn alarm_fired(&mut self) {}
}

impl ProfileHost for EchoStack {
    fn start(&mut self, p: &ProfileDescriptor) {
        self.tx.profile_state(&p.name, ProfileState::Running);
    }
    fn stop(&mut self, p: &ProfileDescriptor) {
        self.tx.profile_state(&p.name, ProfileState::Stopped);
    }
}

impl SystemSettings for EchoStack {
    fn snoop_settings(&self) -> SnoopSettings {
        SnoopSettings::new("disabled", "false")
    }
}

#[derive(Default)]
struct Edges(Vec<(AdapterState, AdapterState)>);

impl EventSink for Edges {
    fn emit(&mut self, e: &AppEvent) {
        if let AppEvent::StateChanged { from, to } = e {
            self.0.push((*from, *to));
        }
    }
}

fn message(b: u8) -> Option<AdapterMessage> {
    let profile = PROFILES[usize::from(b >> 4) % PROFILES.len()];
    let msg = match b & 0x0f {
        0 => AdapterMessage::Request(AdapterRequest::Enable { quiet_mode: b & 0x10 != 0 }),
        1 => AdapterMessage::Request(AdapterRequest::EnableBle),
        2 => AdapterMessage::Request(AdapterRequest::Disable),
        3 => AdapterMessage::Request(AdapterRequest::LeServiceUp),
        4 => AdapterMessage::Request(AdapterRequest::BrEdrDown),
        5 => AdapterMessage::Gateway(GatewayEvent::StackPoweredOn),
        6 => AdapterMessage::Gateway(GatewayEvent::StackPoweredOff),
        7 => AdapterMessage::ProfileRegistered(profile.try_into().ok()?),
        8 => AdapterMessage::ProfileUnregistered(profile.try_into().ok()?),
        9 => AdapterMessage::ProfileStateChanged {
            name: profile.try_into().ok()?,
            state: ProfileState::Running,
        },
        10 => AdapterMessage::ProfileStateChanged {
            name: profile.try_into().ok()?,
            state: ProfileState::Stopped,
        },
        11 => AdapterMessage::ReadEnergyInfo,
        _ => return None,
    };
    Some(msg)
}

fuzz_target!(|data: &[u8]| {
    let cfg = AdapterConfig::with_profiles(&[
        ProfileDescriptor::gatt(),
        ProfileDescriptor::standard("A2DP"),
        ProfileDescriptor::standard("HID"),
    ]);
    let queue = MessageQueue::new();
    let mut stack = EchoStack { tx: queue.sender() };
    let mut edges = Edges::default();
    let mut svc = AdapterService::new(&cfg);
    svc.start(&mut edges);
    for name in PROFILES {
        queue.sender().profile_registered(name);
    }

    for &b in data {
        match message(b) {
            Some(msg) => svc.handle_message(msg, &mut stack, &mut edges),
            None => {
                svc.drain(&queue, &mut stack, &mut edges);
            }
        }
    }
    svc.drain(&queue, &mut stack, &mut edges);

    const EVENTS: [AdapterEvent; 8] = [
        AdapterEvent::BleTurnOn,
        AdapterEvent::UserTurnOn,
        AdapterEvent::BleStarted,
        AdapterEvent::BredrStarted,
        AdapterEvent::UserTurnOff,
        AdapterEvent::BredrStopped,
        AdapterEvent::BleTurnOff,
        AdapterEvent::BleStopped,
    ];
    for (from, to) in edges.0 {
        assert!(EVENTS.iter().any(|ev| is_defined_edge(from, *ev, to)));
    }
});
