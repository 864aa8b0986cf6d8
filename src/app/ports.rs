//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AdapterService (domain)
//! ```
//!
//! Driven adapters (native stack, profile host, settings store, power
//! manager, event sinks) implement these traits.  The
//! [`AdapterService`](super::service::AdapterService) consumes them via
//! generics, so the domain core never touches the radio directly.
//!
//! ## Callback contract
//!
//! Gateway and profile-host commands only *request* work.  Completion is
//! reported asynchronously by posting an
//! [`AdapterMessage`](crate::events::AdapterMessage) on the serialized
//! queue, from any thread.  Implementations must never call back into the
//! service synchronously.

use crate::config::ProfileDescriptor;
use crate::fsm::AdapterState;
use crate::fsm::context::SnoopSettings;
use serde::Serialize;

// ───────────────────────────────────────────────────────────────
// Radio stack gateway (driven adapter: domain → native stack)
// ───────────────────────────────────────────────────────────────

/// Command side of the native Bluetooth stack.
///
/// `power_on`/`power_off` are answered by
/// [`GatewayEvent::StackPoweredOn`]/[`GatewayEvent::StackPoweredOff`].
pub trait RadioStackGateway {
    /// Bring the stack up to BLE.
    fn power_on(&mut self) -> Result<(), GatewayError>;

    /// Power the stack down from BLE.
    fn power_off(&mut self) -> Result<(), GatewayError>;

    /// Enable the classic (BR/EDR) radio.
    fn enable(&mut self) -> Result<(), GatewayError>;

    /// Disable the classic radio.
    fn disable(&mut self) -> Result<(), GatewayError>;

    fn cancel_discovery(&mut self) -> Result<(), GatewayError>;

    fn set_scan_mode(&mut self, mode: ScanMode) -> Result<(), GatewayError>;

    fn set_class_of_device(&mut self, class_of_device: u32) -> Result<(), GatewayError>;

    /// Ask the stack to report a property through
    /// [`GatewayEvent::PropertyChanged`].
    fn request_property(&mut self, kind: PropertyKind) -> Result<(), GatewayError>;

    /// Request a controller activity report.  The stack answers on its own
    /// thread through [`EnergyMonitor`](crate::energy::EnergyMonitor).
    fn read_energy_info(&mut self) -> Result<(), GatewayError>;

    /// Notify the stack that the wake alarm it asked for has fired.
    fn alarm_fired(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Profile host (driven adapter: domain → profile services)
// ───────────────────────────────────────────────────────────────

/// Starts and stops individual profile services.
///
/// Each request is answered by a
/// [`ProfileStateChanged`](crate::events::AdapterMessage::ProfileStateChanged)
/// message.  A profile registers itself (once) before its first report.
pub trait ProfileHost {
    fn start(&mut self, profile: &ProfileDescriptor);
    fn stop(&mut self, profile: &ProfileDescriptor);
}

// ───────────────────────────────────────────────────────────────
// System settings (driven adapter: domain ← settings store)
// ───────────────────────────────────────────────────────────────

/// Read-only access to system settings the lifecycle depends on.
pub trait SystemSettings {
    /// Current HCI snoop-log settings.
    fn snoop_settings(&self) -> SnoopSettings;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Client state listeners
// ───────────────────────────────────────────────────────────────

/// A registered client callback.  An `Err` return is treated like a dead
/// remote: logged, and the broadcast continues with the next listener.
pub trait StateListener {
    fn on_state_changed(
        &mut self,
        prev: AdapterState,
        new: AdapterState,
    ) -> Result<(), ListenerError>;
}

// ───────────────────────────────────────────────────────────────
// Persistence (driven adapter: bond/config store)
// ───────────────────────────────────────────────────────────────

/// Durable storage that must be flushed and closed on shutdown.
pub trait PersistencePort {
    fn flush(&mut self) -> Result<(), PersistenceError>;
    fn close(&mut self) -> Result<(), PersistenceError>;
}

// ───────────────────────────────────────────────────────────────
// Power manager (driven adapter: alarms and wake locks)
// ───────────────────────────────────────────────────────────────

/// Host power-management primitives used on behalf of the native stack.
pub trait PowerPort {
    /// Arm a one-shot alarm.  `wake` asks for the device to be woken.
    fn schedule_alarm(&mut self, delay_ms: u64, wake: bool) -> AlarmId;
    fn cancel_alarm(&mut self, id: AlarmId);
    fn acquire_wake_lock(&mut self, name: &str);
    fn release_wake_lock(&mut self, name: &str);
}

/// Opaque handle for a scheduled alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AlarmId(pub u32);

// ───────────────────────────────────────────────────────────────
// Teardown participants
// ───────────────────────────────────────────────────────────────

/// Anything the shutdown sequence has to clean up.
pub trait Subsystem {
    /// Short name for logs and the shutdown report.
    fn name(&self) -> &'static str;

    /// Whether there is anything to release.  Inactive subsystems are
    /// skipped by the shutdown sequence.
    fn is_active(&self) -> bool {
        true
    }

    fn cleanup(&mut self) -> Result<(), CleanupError>;
}

// ───────────────────────────────────────────────────────────────
// Callback payloads
// ───────────────────────────────────────────────────────────────

/// Asynchronous notifications from the native stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Answer to `power_on()`.
    StackPoweredOn,
    /// Answer to `power_off()`.
    StackPoweredOff,
    /// An adapter property was read or changed.
    PropertyChanged(AdapterProperty),
}

/// Running state reported by a profile service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProfileState {
    Running,
    Stopped,
}

/// Discoverability/connectability of the classic radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ScanMode {
    #[default]
    None,
    Connectable,
    ConnectableDiscoverable,
}

/// Property identifiers for `request_property`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PropertyKind {
    Name,
    Address,
    ClassOfDevice,
    ScanMode,
    DiscoverableTimeout,
    LocalIoCaps,
    LocalIoCapsBle,
}

/// A property value reported by the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterProperty {
    Name(String),
    Address([u8; 6]),
    ClassOfDevice(u32),
    ScanMode(ScanMode),
    /// Seconds; 0 means no timeout.
    DiscoverableTimeout(u32),
    LocalIoCaps(u8),
    LocalIoCapsBle(u8),
}

impl AdapterProperty {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Name(_) => PropertyKind::Name,
            Self::Address(_) => PropertyKind::Address,
            Self::ClassOfDevice(_) => PropertyKind::ClassOfDevice,
            Self::ScanMode(_) => PropertyKind::ScanMode,
            Self::DiscoverableTimeout(_) => PropertyKind::DiscoverableTimeout,
            Self::LocalIoCaps(_) => PropertyKind::LocalIoCaps,
            Self::LocalIoCapsBle(_) => PropertyKind::LocalIoCapsBle,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`RadioStackGateway`] commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayError {
    /// The stack is not in a state that accepts this command.
    NotReady,
    /// A previous command is still being processed.
    Busy,
    /// The controller does not support the command.
    Unsupported,
    /// Generic native failure.
    Failed,
}

/// Errors returned by a [`StateListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerError {
    /// The remote end is gone.
    Disconnected,
}

/// Errors from [`PersistencePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceError {
    Io,
    AlreadyClosed,
}

/// A [`Subsystem`] failed to clean up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupError(pub &'static str);

impl core::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotReady => write!(f, "stack not ready"),
            Self::Busy => write!(f, "stack busy"),
            Self::Unsupported => write!(f, "unsupported by controller"),
            Self::Failed => write!(f, "native failure"),
        }
    }
}

impl core::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "listener disconnected"),
        }
    }
}

impl core::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io => write!(f, "I/O error"),
            Self::AlreadyClosed => write!(f, "already closed"),
        }
    }
}

impl core::fmt::Display for CleanupError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "cleanup failed: {}", self.0)
    }
}
