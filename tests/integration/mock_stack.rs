//! Mock native stack for integration tests.
//!
//! Records every gateway and profile-host call so tests can assert on the
//! full command history, and answers like a real stack would: by posting
//! callbacks on the service queue.  Callbacks are only delivered when the
//! test pumps the queue.

use std::sync::{Arc, Mutex};

use btlifecycle::app::commands::AdapterRequest;
use btlifecycle::app::events::AppEvent;
use btlifecycle::app::ports::{
    EventSink, GatewayError, GatewayEvent, ListenerError, ProfileHost, ProfileState, PropertyKind,
    RadioStackGateway, ScanMode, StateListener, SystemSettings,
};
use btlifecycle::app::service::AdapterService;
use btlifecycle::config::{AdapterConfig, ProfileDescriptor};
use btlifecycle::events::{AdapterMessage, MessageQueue, MessageSender};
use btlifecycle::fsm::AdapterState;
use btlifecycle::fsm::context::SnoopSettings;

// ── MockStack ─────────────────────────────────────────────────

pub struct MockStack {
    tx: MessageSender,
    pub calls: Vec<String>,
    /// Refuse `power_on` with `Busy`.
    pub fail_power_on: bool,
    /// Do not answer profile starts (profiles hang in TURNING_ON).
    pub hold_profile_starts: bool,
    pub snoop: SnoopSettings,
    registered: Vec<String>,
}

#[allow(dead_code)]
impl MockStack {
    pub fn new(tx: MessageSender) -> Self {
        Self {
            tx,
            calls: Vec::new(),
            fail_power_on: false,
            hold_profile_starts: false,
            snoop: SnoopSettings::new("disabled", "false"),
            registered: Vec::new(),
        }
    }

    pub fn take_calls(&mut self) -> Vec<String> {
        std::mem::take(&mut self.calls)
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    /// Deliver a profile report the host would send on its own.
    pub fn report(&mut self, name: &str, state: ProfileState) {
        if !self.registered.iter().any(|n| n == name) {
            self.registered.push(name.to_string());
            self.tx.profile_registered(name);
        }
        self.tx.profile_state(name, state);
    }
}

impl RadioStackGateway for MockStack {
    fn power_on(&mut self) -> Result<(), GatewayError> {
        if self.fail_power_on {
            self.calls.push("power_on:refused".into());
            return Err(GatewayError::Busy);
        }
        self.calls.push("power_on".into());
        self.tx.gateway(GatewayEvent::StackPoweredOn);
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), GatewayError> {
        self.calls.push("power_off".into());
        self.tx.gateway(GatewayEvent::StackPoweredOff);
        Ok(())
    }

    fn enable(&mut self) -> Result<(), GatewayError> {
        self.calls.push("enable".into());
        Ok(())
    }

    fn disable(&mut self) -> Result<(), GatewayError> {
        self.calls.push("disable".into());
        Ok(())
    }

    fn cancel_discovery(&mut self) -> Result<(), GatewayError> {
        self.calls.push("cancel_discovery".into());
        Ok(())
    }

    fn set_scan_mode(&mut self, mode: ScanMode) -> Result<(), GatewayError> {
        self.calls.push(format!("scan_mode:{mode:?}"));
        Ok(())
    }

    fn set_class_of_device(&mut self, cod: u32) -> Result<(), GatewayError> {
        self.calls.push(format!("cod:{cod:#x}"));
        Ok(())
    }

    fn request_property(&mut self, kind: PropertyKind) -> Result<(), GatewayError> {
        self.calls.push(format!("prop:{kind:?}"));
        Ok(())
    }

    fn read_energy_info(&mut self) -> Result<(), GatewayError> {
        self.calls.push("read_energy_info".into());
        Ok(())
    }

    fn alarm_fired(&mut self) {
        self.calls.push("alarm_fired".into());
    }
}

impl ProfileHost for MockStack {
    fn start(&mut self, p: &ProfileDescriptor) {
        self.calls.push(format!("start:{}", p.name));
        if !(self.hold_profile_starts && !p.is_bootstrap()) {
            self.report(&p.name, ProfileState::Running);
        }
    }

    fn stop(&mut self, p: &ProfileDescriptor) {
        self.calls.push(format!("stop:{}", p.name));
        self.tx.profile_state(&p.name, ProfileState::Stopped);
    }
}

impl SystemSettings for MockStack {
    fn snoop_settings(&self) -> SnoopSettings {
        self.snoop.clone()
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    /// Every committed transition, in order.
    pub fn transitions(&self) -> Vec<(AdapterState, AdapterState)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::StateChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn states_visited(&self) -> Vec<AdapterState> {
        self.transitions().into_iter().map(|(_, to)| to).collect()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Listeners ─────────────────────────────────────────────────

/// Records `(prev, new)` pairs into shared storage.
pub struct RecordingListener(pub Arc<Mutex<Vec<(AdapterState, AdapterState)>>>);

impl StateListener for RecordingListener {
    fn on_state_changed(&mut self, prev: AdapterState, new: AdapterState) -> Result<(), ListenerError> {
        self.0.lock().unwrap().push((prev, new));
        Ok(())
    }
}

/// A client whose remote end has died.
pub struct DeadListener;

impl StateListener for DeadListener {
    fn on_state_changed(&mut self, _: AdapterState, _: AdapterState) -> Result<(), ListenerError> {
        Err(ListenerError::Disconnected)
    }
}

// ── Harness ───────────────────────────────────────────────────

/// Service, queue, stack and sink wired together and driven
/// synchronously.
pub struct Harness {
    pub service: AdapterService,
    pub queue: MessageQueue,
    pub stack: MockStack,
    pub sink: RecordingSink,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(config: &AdapterConfig) -> Self {
        let queue = MessageQueue::new();
        let stack = MockStack::new(queue.sender());
        let mut service = AdapterService::new(config);
        let mut sink = RecordingSink::default();
        service.start(&mut sink);
        Self {
            service,
            queue,
            stack,
            sink,
        }
    }

    pub fn gatt_only() -> Self {
        Self::new(&AdapterConfig::with_profiles(&[ProfileDescriptor::gatt()]))
    }

    pub fn classic() -> Self {
        Self::new(&AdapterConfig::with_profiles(&[
            ProfileDescriptor::gatt(),
            ProfileDescriptor::standard("A2DP"),
            ProfileDescriptor::standard("HID"),
        ]))
    }

    /// Deliver every queued callback, including ones they trigger.
    pub fn pump(&mut self) -> usize {
        let mut total = 0;
        loop {
            let n = self
                .service
                .drain(&self.queue, &mut self.stack, &mut self.sink);
            if n == 0 {
                return total;
            }
            total += n;
        }
    }

    /// Submit a request as the loop would receive it, without pumping
    /// the callbacks it causes.
    pub fn request(&mut self, req: AdapterRequest) {
        self.service
            .handle_message(AdapterMessage::Request(req), &mut self.stack, &mut self.sink);
    }

    /// Submit a request and run the lifecycle until it settles.
    pub fn request_and_settle(&mut self, req: AdapterRequest) -> AdapterState {
        self.request(req);
        self.pump();
        self.service.state()
    }

    pub fn enable(&mut self) -> AdapterState {
        self.request_and_settle(AdapterRequest::Enable { quiet_mode: false })
    }

    pub fn disable(&mut self) -> AdapterState {
        self.request_and_settle(AdapterRequest::Disable)
    }
}
