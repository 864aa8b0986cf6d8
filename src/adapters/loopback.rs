//! Loopback stack adapter: an in-process stand-in for the native stack.
//!
//! Answers every gateway and profile-host command by posting the callback
//! a real stack would deliver, so the whole lifecycle can run without a
//! controller.  Used by the binary and by end-to-end tests.

use std::sync::Arc;

use log::{debug, info};

use crate::app::ports::{
    AdapterProperty, AlarmId, CleanupError, GatewayError, GatewayEvent, PersistenceError,
    PersistencePort, PowerPort, ProfileHost, ProfileState, PropertyKind, RadioStackGateway,
    ScanMode, Subsystem, SystemSettings,
};
use crate::config::{ProfileDescriptor, ProfileName};
use crate::energy::{ControllerActivity, EnergyMonitor, UidTraffic};
use crate::events::MessageSender;
use crate::fsm::context::SnoopSettings;
use crate::power::WakeResources;

/// IO capability "DisplayYesNo".
const IO_CAPS_DISPLAY_YES_NO: u8 = 1;
/// IO capability "KeyboardDisplay".
const IO_CAPS_KEYBOARD_DISPLAY: u8 = 4;

/// Wake lock held while the classic radio is up.
pub const RADIO_WAKE_LOCK: &str = "bluetooth_timer";
/// Stack timer armed on classic enable.
const RADIO_TIMER_MS: u64 = 5_000;

pub struct LoopbackStack {
    tx: MessageSender,
    energy: Arc<EnergyMonitor>,
    snoop: SnoopSettings,
    registered: Vec<ProfileName>,
    powered: bool,
    radio_enabled: bool,
    name: String,
    address: [u8; 6],
    class_of_device: u32,
    scan_mode: ScanMode,
    reads: u64,
    wake: Option<Arc<WakeResources>>,
    alarms_delivered: u32,
}

impl LoopbackStack {
    pub fn new(tx: MessageSender, energy: Arc<EnergyMonitor>) -> Self {
        Self {
            tx,
            energy,
            snoop: SnoopSettings::new("disabled", "false"),
            registered: Vec::new(),
            powered: false,
            radio_enabled: false,
            name: "btlifecycle-loopback".into(),
            address: [0x02, 0x00, 0x5e, 0x10, 0x00, 0x01],
            class_of_device: 0,
            scan_mode: ScanMode::None,
            reads: 0,
            wake: None,
            alarms_delivered: 0,
        }
    }

    /// Arm timers and take wake locks through `wake`, as a native stack
    /// does from its own threads.
    #[must_use]
    pub fn with_wake(mut self, wake: Arc<WakeResources>) -> Self {
        self.wake = Some(wake);
        self
    }

    #[must_use]
    pub fn with_snoop(mut self, snoop: SnoopSettings) -> Self {
        self.snoop = snoop;
        self
    }

    pub fn is_radio_enabled(&self) -> bool {
        self.radio_enabled
    }

    fn property(&self, kind: PropertyKind) -> AdapterProperty {
        match kind {
            PropertyKind::Name => AdapterProperty::Name(self.name.clone()),
            PropertyKind::Address => AdapterProperty::Address(self.address),
            PropertyKind::ClassOfDevice => AdapterProperty::ClassOfDevice(self.class_of_device),
            PropertyKind::ScanMode => AdapterProperty::ScanMode(self.scan_mode),
            PropertyKind::DiscoverableTimeout => AdapterProperty::DiscoverableTimeout(120),
            PropertyKind::LocalIoCaps => AdapterProperty::LocalIoCaps(IO_CAPS_DISPLAY_YES_NO),
            PropertyKind::LocalIoCapsBle => {
                AdapterProperty::LocalIoCapsBle(IO_CAPS_KEYBOARD_DISPLAY)
            }
        }
    }

    fn report(&mut self, kind: PropertyKind) {
        self.tx
            .gateway(GatewayEvent::PropertyChanged(self.property(kind)));
    }
}

// ── RadioStackGateway ─────────────────────────────────────────

impl RadioStackGateway for LoopbackStack {
    fn power_on(&mut self) -> Result<(), GatewayError> {
        if self.powered {
            return Err(GatewayError::Busy);
        }
        self.powered = true;
        info!("loopback: stack powered on");
        self.tx.gateway(GatewayEvent::StackPoweredOn);
        self.report(PropertyKind::Name);
        self.report(PropertyKind::Address);
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), GatewayError> {
        if !self.powered {
            return Err(GatewayError::NotReady);
        }
        self.powered = false;
        info!("loopback: stack powered off");
        self.tx.gateway(GatewayEvent::StackPoweredOff);
        Ok(())
    }

    fn enable(&mut self) -> Result<(), GatewayError> {
        if !self.powered {
            return Err(GatewayError::NotReady);
        }
        self.radio_enabled = true;
        debug!("loopback: classic radio enabled");
        if let Some(wake) = &self.wake {
            wake.acquire_wake_lock(RADIO_WAKE_LOCK);
            wake.set_wake_alarm(RADIO_TIMER_MS, true);
        }
        Ok(())
    }

    fn disable(&mut self) -> Result<(), GatewayError> {
        self.radio_enabled = false;
        debug!("loopback: classic radio disabled");
        if let Some(wake) = &self.wake {
            wake.release_wake_lock(RADIO_WAKE_LOCK);
        }
        Ok(())
    }

    fn cancel_discovery(&mut self) -> Result<(), GatewayError> {
        Ok(())
    }

    fn set_scan_mode(&mut self, mode: ScanMode) -> Result<(), GatewayError> {
        self.scan_mode = mode;
        self.report(PropertyKind::ScanMode);
        Ok(())
    }

    fn set_class_of_device(&mut self, class_of_device: u32) -> Result<(), GatewayError> {
        self.class_of_device = class_of_device;
        self.report(PropertyKind::ClassOfDevice);
        Ok(())
    }

    fn request_property(&mut self, kind: PropertyKind) -> Result<(), GatewayError> {
        if !self.powered {
            return Err(GatewayError::NotReady);
        }
        self.report(kind);
        Ok(())
    }

    fn read_energy_info(&mut self) -> Result<(), GatewayError> {
        if !self.radio_enabled {
            return Err(GatewayError::NotReady);
        }
        self.reads += 1;
        let report = ControllerActivity {
            ctrl_state: 1,
            tx_time_ms: 10 * self.reads,
            rx_time_ms: 20 * self.reads,
            idle_time_ms: 900,
            energy_used: 0,
            uid_traffic: vec![UidTraffic {
                uid: 1000,
                rx_bytes: 512,
                tx_bytes: 128,
            }],
        };
        let energy = self.energy.clone();
        // Real controllers answer on their own thread.
        std::thread::spawn(move || {
            energy.on_controller_activity(&report);
        });
        Ok(())
    }

    fn alarm_fired(&mut self) {
        self.alarms_delivered += 1;
        debug!("loopback: wake alarm delivered ({} so far)", self.alarms_delivered);
    }
}

// ── ProfileHost ───────────────────────────────────────────────

impl ProfileHost for LoopbackStack {
    fn start(&mut self, profile: &ProfileDescriptor) {
        if !self.registered.contains(&profile.name) {
            self.registered.push(profile.name.clone());
            self.tx.profile_registered(&profile.name);
        }
        self.tx.profile_state(&profile.name, ProfileState::Running);
    }

    fn stop(&mut self, profile: &ProfileDescriptor) {
        self.tx.profile_state(&profile.name, ProfileState::Stopped);
    }
}

// ── SystemSettings ────────────────────────────────────────────

impl SystemSettings for LoopbackStack {
    fn snoop_settings(&self) -> SnoopSettings {
        self.snoop.clone()
    }
}

// ── Collaborators ─────────────────────────────────────────────

/// Power port backed by sleeping threads.  Without a sender alarms are
/// only logged and never fire.
#[derive(Default)]
pub struct LoopbackPower {
    next_alarm: u32,
    tx: Option<MessageSender>,
}

impl LoopbackPower {
    /// Deliver expired alarms to the adapter queue.
    pub fn firing(tx: MessageSender) -> Self {
        Self {
            next_alarm: 0,
            tx: Some(tx),
        }
    }
}

impl PowerPort for LoopbackPower {
    fn schedule_alarm(&mut self, delay_ms: u64, wake: bool) -> AlarmId {
        self.next_alarm += 1;
        let id = AlarmId(self.next_alarm);
        debug!("loopback: alarm {} in {} ms (wake: {})", id.0, delay_ms, wake);
        if let Some(tx) = self.tx.clone() {
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                tx.alarm_fired(id);
            });
        }
        id
    }

    fn cancel_alarm(&mut self, id: AlarmId) {
        debug!("loopback: alarm {} cancelled", id.0);
    }

    fn acquire_wake_lock(&mut self, name: &str) {
        debug!("loopback: wake lock {} acquired", name);
    }

    fn release_wake_lock(&mut self, name: &str) {
        debug!("loopback: wake lock {} released", name);
    }
}

/// Persistence that keeps nothing.
#[derive(Debug, Default)]
pub struct LoopbackPersistence {
    closed: bool,
}

impl PersistencePort for LoopbackPersistence {
    fn flush(&mut self) -> Result<(), PersistenceError> {
        if self.closed {
            return Err(PersistenceError::AlreadyClosed);
        }
        debug!("loopback: persistence flushed");
        Ok(())
    }

    fn close(&mut self) -> Result<(), PersistenceError> {
        if self.closed {
            return Err(PersistenceError::AlreadyClosed);
        }
        self.closed = true;
        Ok(())
    }
}

/// A named subsystem whose cleanup only logs.
#[derive(Debug)]
pub struct LoopbackSubsystem {
    name: &'static str,
    active: bool,
}

impl LoopbackSubsystem {
    pub fn new(name: &'static str) -> Self {
        Self { name, active: true }
    }

    pub fn inactive(name: &'static str) -> Self {
        Self {
            name,
            active: false,
        }
    }
}

impl Subsystem for LoopbackSubsystem {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn cleanup(&mut self) -> Result<(), CleanupError> {
        info!("loopback: {} cleaned up", self.name);
        self.active = false;
        Ok(())
    }
}
