//! Adapter service: the hexagonal core.
//!
//! [`AdapterService`] owns the power FSM, its context, the profile
//! lifecycle coordinator and the client listeners.  It is driven one
//! [`AdapterMessage`] at a time by a single consumer; all I/O flows through
//! port traits injected at call sites, so the whole service is testable
//! with mock adapters.
//!
//! ```text
//!  AdapterMessage ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                     │        AdapterService         │
//!  RadioStackGateway ◀│  FSM · Coordinator · Listeners│──▶ StateListener
//!  ProfileHost       ◀└──────────────────────────────┘
//! ```
//!
//! Client requests that arrive while a transition is in flight are queued
//! and replayed, in order, as soon as a stable state (OFF, BLE_ON, ON) is
//! reached.  Internal follow-up events always run before the next queued
//! request or message.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::config::AdapterConfig;
use crate::coordinator::{ProfileLifecycleCoordinator, ProfileMilestone, StartOutcome, StopOutcome};
use crate::diagnostics::{ProfileDumpEntry, ServiceDump, ServiceMetrics};
use crate::error::Error;
use crate::events::{AdapterMessage, ListenerId, MessageQueue};
use crate::fsm::context::FsmContext;
use crate::fsm::states::build_state_table;
use crate::fsm::{AdapterEvent, AdapterState, Command, Dispatch, Fsm};
use crate::link::ServiceLink;
use crate::listeners::ListenerSet;
use crate::power::WakeResources;
use crate::properties::AdapterProperties;
use crate::registry::ProfileRegistry;

use super::commands::AdapterRequest;
use super::events::AppEvent;
use super::ports::{
    AlarmId, EventSink, GatewayEvent, ProfileHost, ProfileState, RadioStackGateway, StateListener,
    SystemSettings,
};

// ───────────────────────────────────────────────────────────────
// AdapterService
// ───────────────────────────────────────────────────────────────

/// The adapter service orchestrates all lifecycle logic.
pub struct AdapterService {
    fsm: Fsm,
    ctx: FsmContext,
    coordinator: ProfileLifecycleCoordinator,
    listeners: ListenerSet,
    /// Requests received mid-transition, replayed FIFO.
    pending: VecDeque<AdapterRequest>,
    link: Arc<ServiceLink>,
    /// Validates alarm callbacks against the pending alarm.
    wake: Option<Arc<WakeResources>>,
    metrics: ServiceMetrics,
}

impl AdapterService {
    /// Construct the service from configuration.
    ///
    /// Does **not** start the FSM; call [`start`](Self::start) next.
    pub fn new(config: &AdapterConfig) -> Self {
        Self::with_link(config, Arc::new(ServiceLink::new(config.bluetooth_disallowed)))
    }

    /// Construct the service around an existing shared link.
    pub fn with_link(config: &AdapterConfig, link: Arc<ServiceLink>) -> Self {
        Self {
            fsm: Fsm::new(build_state_table(), AdapterState::Off),
            ctx: FsmContext::new(config.keep_ble_on_after_disable),
            coordinator: ProfileLifecycleCoordinator::new(config),
            listeners: ListenerSet::new(),
            pending: VecDeque::new(),
            link,
            wake: None,
            metrics: ServiceMetrics::default(),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Start the FSM in OFF.
    pub fn start(&mut self, sink: &mut impl EventSink) {
        self.fsm.start(&mut self.ctx);
        self.link.publish_state(self.fsm.current_state());
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!("AdapterService started in {:?}", self.fsm.current_state());
    }

    // ── Message handling ──────────────────────────────────────

    /// Process one message and everything it triggers.
    ///
    /// The `hal` parameter satisfies the gateway, profile host and
    /// settings ports at once, so one adapter object can back all three.
    pub fn handle_message(
        &mut self,
        msg: AdapterMessage,
        hal: &mut (impl RadioStackGateway + ProfileHost + SystemSettings),
        sink: &mut impl EventSink,
    ) {
        match msg {
            AdapterMessage::Request(req) => self.handle_request(req, hal, sink),
            AdapterMessage::Gateway(ev) => self.handle_gateway_event(ev, hal, sink),
            AdapterMessage::ProfileRegistered(name) => {
                let _ = self.coordinator.registry_mut().register(&name);
            }
            AdapterMessage::ProfileUnregistered(name) => {
                if self.coordinator.registry().is_running(&name) {
                    self.handle_profile_state(&name, ProfileState::Stopped, hal, sink);
                }
                let _ = self.coordinator.registry_mut().unregister(&name);
            }
            AdapterMessage::ProfileStateChanged { name, state } => {
                self.handle_profile_state(&name, state, hal, sink);
            }
            AdapterMessage::RegisterListener { id, listener } => self.register_listener(id, listener),
            AdapterMessage::UnregisterListener(id) => {
                if !self.listeners.unregister(id) {
                    debug!("Listener {} was not registered", id);
                }
            }
            AdapterMessage::ReadEnergyInfo => {
                if let Err(e) = hal.read_energy_info() {
                    warn!("read_energy_info failed: {}", e);
                }
            }
            AdapterMessage::AlarmFired(id) => self.on_alarm_fired(id, hal),
            AdapterMessage::Dump(reply) => reply.signal(self.dump()),
            AdapterMessage::Quit => debug!("Quit reached the service, ignoring"),
        }
        self.run_to_completion(hal, sink);
    }

    /// Handle every message currently queued.  Stops early at `Quit`.
    /// Returns the number of messages processed.
    pub fn drain(
        &mut self,
        queue: &MessageQueue,
        hal: &mut (impl RadioStackGateway + ProfileHost + SystemSettings),
        sink: &mut impl EventSink,
    ) -> usize {
        let mut n = 0;
        while let Some(msg) = queue.try_recv() {
            if matches!(msg, AdapterMessage::Quit) {
                break;
            }
            self.handle_message(msg, hal, sink);
            n += 1;
        }
        n
    }

    /// Accept a client request: apply it now, or queue it until the
    /// current transition settles.
    pub fn handle_request(
        &mut self,
        req: AdapterRequest,
        hal: &mut (impl RadioStackGateway + ProfileHost + SystemSettings),
        sink: &mut impl EventSink,
    ) {
        if self.reject_if_disallowed(req, sink) {
            return;
        }
        let state = self.fsm.current_state();
        if state.is_transitional() {
            info!("{:?} deferred while {}", req, self.fsm.state_name());
            self.pending.push_back(req);
            self.metrics.deferred_requests += 1;
            sink.emit(&AppEvent::RequestDeferred(req));
            return;
        }
        self.apply_request(req, hal, sink);
    }

    /// Share the wake resources the stack arms alarms through.  Without
    /// them every alarm callback is passed on unchecked.
    pub fn attach_wake_resources(&mut self, wake: Arc<WakeResources>) {
        self.wake = Some(wake);
    }

    // ── Queries ───────────────────────────────────────────────

    /// Current FSM state.
    pub fn state(&self) -> AdapterState {
        self.fsm.current_state()
    }

    pub fn quiet_mode(&self) -> bool {
        self.ctx.quiet_mode
    }

    pub fn registry(&self) -> &ProfileRegistry {
        self.coordinator.registry()
    }

    pub fn properties(&self) -> &AdapterProperties {
        self.coordinator.properties()
    }

    pub fn metrics(&self) -> ServiceMetrics {
        self.metrics
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// The link shared with client handles.
    pub fn link(&self) -> Arc<ServiceLink> {
        self.link.clone()
    }

    /// Snapshot the service for diagnostics.
    pub fn dump(&self) -> ServiceDump {
        ServiceDump {
            state: self.fsm.current_state(),
            quiet_mode: self.ctx.quiet_mode,
            full_on_requested: self.ctx.full_on_requested,
            bluetooth_disallowed: self.link.is_disallowed(),
            keep_ble_on_after_disable: self.ctx.keep_ble_on_after_disable,
            snoop_at_enable: self.ctx.snoop_at_enable.clone(),
            profiles: ProfileDumpEntry::collect(self.coordinator.registry()),
            properties: self.coordinator.properties().clone(),
            pending_requests: self.pending.iter().copied().collect(),
            listeners: self.listeners.len(),
            metrics: self.metrics,
        }
    }

    // ── Teardown ──────────────────────────────────────────────

    /// Forget every profile registration and cached property.
    pub fn clear_registry(&mut self) {
        self.coordinator.clear();
        self.pending.clear();
    }

    pub fn register_listener(&mut self, id: ListenerId, listener: Box<dyn StateListener + Send>) {
        self.listeners.register(id, listener);
    }

    /// Drop every client listener.
    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    // ── Internal: requests ────────────────────────────────────

    fn reject_if_disallowed(&mut self, req: AdapterRequest, sink: &mut impl EventSink) -> bool {
        if !req.is_enable() || !self.link.is_disallowed() {
            return false;
        }
        let error = Error::PolicyRejected("bluetooth disallowed");
        warn!("{:?} rejected: {}", req, error);
        self.metrics.rejected_requests += 1;
        sink.emit(&AppEvent::RequestRejected {
            request: req,
            error,
        });
        true
    }

    fn apply_request(
        &mut self,
        req: AdapterRequest,
        hal: &mut (impl RadioStackGateway + ProfileHost + SystemSettings),
        sink: &mut impl EventSink,
    ) {
        if self.reject_if_disallowed(req, sink) {
            return;
        }
        let state = self.fsm.current_state();
        match req {
            AdapterRequest::Enable { quiet_mode } => {
                self.ctx.quiet_mode = quiet_mode;
                match state {
                    AdapterState::Off => {
                        self.ctx.full_on_requested = true;
                        self.dispatch(AdapterEvent::BleTurnOn, hal, sink);
                    }
                    AdapterState::BleOn => {
                        self.ctx.full_on_requested = true;
                        self.bring_up_classic(hal, sink);
                    }
                    _ => debug!("enable: already {}", self.fsm.state_name()),
                }
            }
            AdapterRequest::EnableBle => match state {
                AdapterState::Off => {
                    self.ctx.full_on_requested = false;
                    self.dispatch(AdapterEvent::BleTurnOn, hal, sink);
                }
                _ => debug!("enable_ble: already {}", self.fsm.state_name()),
            },
            AdapterRequest::Disable => {
                self.ctx.full_on_requested = false;
                match state {
                    AdapterState::On | AdapterState::BleOn => {
                        self.dispatch(AdapterEvent::UserTurnOff, hal, sink);
                    }
                    _ => debug!("disable: already {}", self.fsm.state_name()),
                }
            }
            AdapterRequest::LeServiceUp => {
                if state == AdapterState::BleOn {
                    self.ctx.full_on_requested = true;
                    self.bring_up_classic(hal, sink);
                } else {
                    debug!("le_service_up ignored in {}", self.fsm.state_name());
                }
            }
            AdapterRequest::BrEdrDown => {
                if state == AdapterState::BleOn {
                    self.dispatch(AdapterEvent::BleTurnOff, hal, sink);
                } else {
                    debug!("br_edr_down ignored in {}", self.fsm.state_name());
                }
            }
        }
    }

    /// BLE_ON → full ON.  Waits for the bootstrap profile if it is not up
    /// yet; its RUNNING report re-enters here.
    fn bring_up_classic(
        &mut self,
        hal: &mut (impl RadioStackGateway + ProfileHost + SystemSettings),
        sink: &mut impl EventSink,
    ) {
        if !self.coordinator.registry().bootstrap_running() {
            info!("Full enable waiting for bootstrap profile");
            return;
        }
        match self
            .coordinator
            .start_profile_services(self.ctx.quiet_mode, hal, sink)
        {
            StartOutcome::Ready => self.dispatch(AdapterEvent::BredrStarted, hal, sink),
            StartOutcome::Requested(n) => {
                info!("Starting {} classic profiles", n);
                self.dispatch(AdapterEvent::UserTurnOn, hal, sink);
            }
        }
    }

    // ── Internal: callbacks ───────────────────────────────────

    fn on_alarm_fired(&mut self, id: AlarmId, hal: &mut impl RadioStackGateway) {
        if let Some(wake) = &self.wake {
            if !wake.on_alarm_fired(id) {
                debug!("Alarm {} cancelled or released, not delivering", id.0);
                return;
            }
        }
        hal.alarm_fired();
    }

    fn handle_gateway_event(
        &mut self,
        ev: GatewayEvent,
        hal: &mut (impl RadioStackGateway + ProfileHost + SystemSettings),
        sink: &mut impl EventSink,
    ) {
        match ev {
            GatewayEvent::StackPoweredOn => {
                self.dispatch(AdapterEvent::BleStarted, hal, sink);
                // Bootstrap survived the last power cycle: no RUNNING
                // report will come to continue a full enable.  A queued
                // follow-up (snoop power cycle) takes precedence.
                if self.ctx.full_on_requested
                    && !self.ctx.has_followups()
                    && self.fsm.current_state() == AdapterState::BleOn
                    && self.coordinator.registry().bootstrap_running()
                {
                    self.bring_up_classic(hal, sink);
                }
            }
            GatewayEvent::StackPoweredOff => self.dispatch(AdapterEvent::BleStopped, hal, sink),
            GatewayEvent::PropertyChanged(prop) => {
                self.coordinator.properties_mut().apply(&prop);
                sink.emit(&AppEvent::PropertyChanged(prop.kind()));
            }
        }
    }

    fn handle_profile_state(
        &mut self,
        name: &str,
        state: ProfileState,
        hal: &mut (impl RadioStackGateway + ProfileHost + SystemSettings),
        sink: &mut impl EventSink,
    ) {
        let milestone =
            self.coordinator
                .on_profile_state_changed(name, state, self.ctx.quiet_mode, hal, sink);
        match milestone {
            ProfileMilestone::BootstrapUp => match self.fsm.current_state() {
                AdapterState::BleOn if self.ctx.full_on_requested => {
                    self.bring_up_classic(hal, sink);
                }
                AdapterState::Off | AdapterState::BleTurningOff => {
                    info!("Bootstrap profile came up after power-off, stopping it");
                    self.coordinator.stop_bootstrap(hal);
                }
                _ => {}
            },
            ProfileMilestone::FullyUp => self.dispatch(AdapterEvent::BredrStarted, hal, sink),
            ProfileMilestone::FullyDown => self.dispatch(AdapterEvent::BredrStopped, hal, sink),
            ProfileMilestone::None => {}
        }
    }

    // ── Internal: FSM plumbing ────────────────────────────────

    fn dispatch(
        &mut self,
        event: AdapterEvent,
        hal: &mut (impl RadioStackGateway + ProfileHost + SystemSettings),
        sink: &mut impl EventSink,
    ) {
        self.ctx.snoop_live = hal.snoop_settings();
        let coordinator = &mut self.coordinator;
        let outcome = self
            .fsm
            .dispatch(event, &mut self.ctx, |cmd| Self::execute(cmd, coordinator, &mut *hal));

        match outcome {
            Dispatch::Transitioned { from, to } => self.on_transition(from, to, sink),
            Dispatch::Dropped(error) => {
                warn!("Ignoring {:?} in {}", event, self.fsm.state_name());
                self.metrics.dropped_events += 1;
                sink.emit(&AppEvent::EventDropped { event, error });
            }
            Dispatch::Failed { command, error } => {
                error!(
                    "{:?} failed ({}), staying in {}",
                    command,
                    error,
                    self.fsm.state_name()
                );
                self.metrics.failed_commands += 1;
                sink.emit(&AppEvent::CommandFailed { command, error });
            }
        }
    }

    /// Run a transition's command.  A returned event is queued as a
    /// follow-up once the transition commits.
    fn execute(
        cmd: Command,
        coordinator: &mut ProfileLifecycleCoordinator,
        hal: &mut (impl RadioStackGateway + ProfileHost),
    ) -> crate::error::Result<Option<AdapterEvent>> {
        match cmd {
            Command::PowerOn => {
                hal.power_on()?;
                Ok(None)
            }
            Command::StartBootstrapProfile => {
                coordinator.start_bootstrap(hal);
                Ok(None)
            }
            Command::StopProfileServices => match coordinator.stop_profile_services(hal) {
                StopOutcome::AlreadyStopped => Ok(Some(AdapterEvent::BredrStopped)),
                StopOutcome::Requested(_) => Ok(None),
            },
            Command::PowerOff => {
                hal.power_off()?;
                coordinator.stop_bootstrap(hal);
                Ok(None)
            }
        }
    }

    fn on_transition(&mut self, from: AdapterState, to: AdapterState, sink: &mut impl EventSink) {
        self.metrics.transitions += 1;
        self.link.publish_state(to);
        let failures = self.listeners.broadcast(from, to);
        self.metrics.listener_failures += failures as u64;
        sink.emit(&AppEvent::StateChanged { from, to });
    }

    /// Drain follow-ups, then replay deferred requests while stable.
    fn run_to_completion(
        &mut self,
        hal: &mut (impl RadioStackGateway + ProfileHost + SystemSettings),
        sink: &mut impl EventSink,
    ) {
        loop {
            if let Some(ev) = self.ctx.pop_followup() {
                self.dispatch(ev, hal, sink);
                continue;
            }
            if self.fsm.current_state().is_stable() {
                if let Some(req) = self.pending.pop_front() {
                    info!("Replaying deferred {:?}", req);
                    self.apply_request(req, hal, sink);
                    continue;
                }
            }
            break;
        }
    }
}
