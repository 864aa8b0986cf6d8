//! Profile lifecycle coordinator.
//!
//! Bridges per-profile running reports to adapter-level milestones.  It
//! owns the [`ProfileRegistry`] and the [`AdapterProperties`] cache, issues
//! start/stop requests through [`ProfileHost`] and tells the service when
//! a milestone is reached:
//!
//! | Report                           | Effect                               |
//! |----------------------------------|--------------------------------------|
//! | bootstrap RUNNING                | `gateway.enable()`, `BootstrapUp`    |
//! | last expected profile RUNNING    | ready sequence, `FullyUp`            |
//! | STOPPED, only bootstrap left     | `FullyDown`                          |
//! | STOPPED, nothing left            | `gateway.disable()`                  |
//!
//! Start and stop are idempotent: a running profile is never started
//! again and a stopped one is never stopped again.

use log::{debug, error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{
    EventSink, ProfileHost, ProfileState, PropertyKind, RadioStackGateway, ScanMode,
};
use crate::config::AdapterConfig;
use crate::properties::AdapterProperties;
use crate::registry::ProfileRegistry;

/// Milestone reached after a profile report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileMilestone {
    None,
    /// The bootstrap profile just came up and the classic radio was enabled.
    BootstrapUp,
    /// Every expected profile is running.
    FullyUp,
    /// Only the bootstrap profile is left running.
    FullyDown,
}

/// Result of [`ProfileLifecycleCoordinator::start_profile_services`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Nothing to wait for; the ready sequence has already run.
    Ready,
    /// Start requested for this many profiles.
    Requested(usize),
}

/// Result of [`ProfileLifecycleCoordinator::stop_profile_services`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing but the bootstrap profile is running.
    AlreadyStopped,
    /// Stop requested for this many profiles.
    Requested(usize),
}

pub struct ProfileLifecycleCoordinator {
    registry: ProfileRegistry,
    properties: AdapterProperties,
    class_of_device: u32,
}

impl ProfileLifecycleCoordinator {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            registry: ProfileRegistry::from_config(config),
            properties: AdapterProperties::default(),
            class_of_device: config.class_of_device,
        }
    }

    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ProfileRegistry {
        &mut self.registry
    }

    pub fn properties(&self) -> &AdapterProperties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut AdapterProperties {
        &mut self.properties
    }

    // ── Profile reports ───────────────────────────────────────

    /// Handle a running-state report from a profile service.
    pub fn on_profile_state_changed(
        &mut self,
        name: &str,
        state: ProfileState,
        quiet_mode: bool,
        hal: &mut (impl RadioStackGateway + ProfileHost),
        sink: &mut impl EventSink,
    ) -> ProfileMilestone {
        let running = state == ProfileState::Running;
        if self.registry.report_running(name, running).is_err() {
            return ProfileMilestone::None;
        }
        if let Some(entry) = self.registry.get(name) {
            sink.emit(&AppEvent::ProfileStateChanged {
                name: entry.descriptor.name.clone(),
                state,
            });
        }

        if running {
            self.on_profile_running(name, quiet_mode, hal, sink)
        } else {
            self.on_profile_stopped(name, hal)
        }
    }

    fn on_profile_running(
        &mut self,
        name: &str,
        quiet_mode: bool,
        hal: &mut (impl RadioStackGateway + ProfileHost),
        sink: &mut impl EventSink,
    ) -> ProfileMilestone {
        let is_bootstrap = self
            .registry
            .get(name)
            .is_some_and(|e| e.descriptor.is_bootstrap());

        if is_bootstrap {
            info!("Bootstrap profile {} running, enabling classic radio", name);
            if let Err(e) = hal.enable() {
                error!("gateway enable failed: {}", e);
            }
            return ProfileMilestone::BootstrapUp;
        }

        if self.properties.ready {
            debug!("Optional profile {} running after ready", name);
            self.properties.refresh_uuids(&self.registry);
            return ProfileMilestone::None;
        }
        if self.registry.all_expected_running() {
            self.finalize_ready(quiet_mode, hal, sink);
            return ProfileMilestone::FullyUp;
        }

        debug!(
            "Profile {} running ({}/{} running)",
            name,
            self.registry.running_count(),
            self.registry.entries().len()
        );
        ProfileMilestone::None
    }

    fn on_profile_stopped(
        &mut self,
        name: &str,
        hal: &mut impl RadioStackGateway,
    ) -> ProfileMilestone {
        if self.registry.running_count() == 0 {
            info!("Profile {} stopped, no profiles left, disabling radio", name);
            if let Err(e) = hal.disable() {
                error!("gateway disable failed: {}", e);
            }
            return ProfileMilestone::None;
        }
        if self.registry.is_only_bootstrap_running() {
            info!("Profile {} stopped, only bootstrap left", name);
            return ProfileMilestone::FullyDown;
        }
        debug!(
            "Profile {} stopped ({} still running)",
            name,
            self.registry.running_count()
        );
        ProfileMilestone::None
    }

    // ── Bootstrap profile ─────────────────────────────────────

    /// Start the bootstrap profile (BLE bring-up).
    pub fn start_bootstrap(&mut self, hal: &mut impl ProfileHost) {
        match self.registry.bootstrap() {
            Some(e) if e.running => debug!("Bootstrap {} already running", e.descriptor.name),
            Some(e) => {
                info!("Starting bootstrap profile {}", e.descriptor.name);
                hal.start(&e.descriptor);
            }
            None => warn!("No bootstrap profile configured"),
        }
    }

    /// Stop the bootstrap profile (BLE bring-down).
    pub fn stop_bootstrap(&mut self, hal: &mut impl ProfileHost) {
        self.properties.on_ble_disable();
        match self.registry.bootstrap() {
            Some(e) if e.running => {
                info!("Stopping bootstrap profile {}", e.descriptor.name);
                hal.stop(&e.descriptor);
            }
            Some(e) => debug!("Bootstrap {} already stopped", e.descriptor.name),
            None => warn!("No bootstrap profile configured"),
        }
    }

    // ── Classic profiles ──────────────────────────────────────

    /// Start every non-running classic profile, optional ones included.
    ///
    /// With a bootstrap-only configuration, or once every required profile
    /// is already up, the ready sequence runs immediately; optional
    /// profiles still starting do not hold it back.
    pub fn start_profile_services(
        &mut self,
        quiet_mode: bool,
        hal: &mut (impl RadioStackGateway + ProfileHost),
        sink: &mut impl EventSink,
    ) -> StartOutcome {
        if self.registry.is_bootstrap_only_config() {
            self.finalize_ready(quiet_mode, hal, sink);
            return StartOutcome::Ready;
        }

        let mut requested = 0;
        for e in self.registry.standard_profiles() {
            if e.running {
                debug!("Profile {} already running, not starting", e.descriptor.name);
                continue;
            }
            info!("Starting profile {}", e.descriptor.name);
            hal.start(&e.descriptor);
            requested += 1;
        }

        if self.registry.all_expected_running() {
            self.finalize_ready(quiet_mode, hal, sink);
            return StartOutcome::Ready;
        }
        StartOutcome::Requested(requested)
    }

    /// Cancel discovery, go non-discoverable and stop every running
    /// classic profile.
    pub fn stop_profile_services(
        &mut self,
        hal: &mut (impl RadioStackGateway + ProfileHost),
    ) -> StopOutcome {
        if let Err(e) = hal.cancel_discovery() {
            warn!("cancel_discovery failed: {}", e);
        }
        if let Err(e) = hal.set_scan_mode(ScanMode::None) {
            warn!("set_scan_mode(None) failed: {}", e);
        }
        self.properties.ready = false;

        let mut requested = 0;
        for e in self.registry.standard_profiles() {
            if !e.running {
                continue;
            }
            info!("Stopping profile {}", e.descriptor.name);
            hal.stop(&e.descriptor);
            requested += 1;
        }

        if requested == 0 {
            info!("No classic profiles running");
            StopOutcome::AlreadyStopped
        } else {
            StopOutcome::Requested(requested)
        }
    }

    // ── Ready sequence ────────────────────────────────────────

    fn finalize_ready(
        &mut self,
        quiet_mode: bool,
        hal: &mut impl RadioStackGateway,
        sink: &mut impl EventSink,
    ) {
        self.properties.on_bluetooth_ready(&self.registry);

        if self.class_of_device != 0 {
            match hal.set_class_of_device(self.class_of_device) {
                Ok(()) => self.properties.class_of_device = self.class_of_device,
                Err(e) => warn!("set_class_of_device failed: {}", e),
            }
        }

        for kind in [PropertyKind::LocalIoCaps, PropertyKind::LocalIoCapsBle] {
            if let Err(e) = hal.request_property(kind) {
                warn!("request_property({:?}) failed: {}", kind, e);
            }
        }

        sink.emit(&AppEvent::AdapterReady { quiet_mode });
    }

    /// Forget all profile registrations (shutdown).
    pub fn clear(&mut self) {
        self.registry.clear();
        self.properties.cleanup();
    }
}
