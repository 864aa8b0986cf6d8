//! Service dump and runtime counters.
//!
//! [`ServiceDump`] is a point-in-time snapshot of the adapter service,
//! produced on the adapter loop so it never races a transition.  It renders
//! either as JSON (for tooling) or as an indented text report (for logs).

use core::fmt;

use serde::Serialize;

use crate::app::commands::AdapterRequest;
use crate::config::{ProfileName, ProfileRole};
use crate::fsm::AdapterState;
use crate::fsm::context::SnoopSettings;
use crate::properties::AdapterProperties;
use crate::registry::ProfileRegistry;

/// Counters maintained by the adapter service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceMetrics {
    pub transitions: u64,
    pub deferred_requests: u64,
    pub rejected_requests: u64,
    pub dropped_events: u64,
    pub failed_commands: u64,
    pub listener_failures: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileDumpEntry {
    pub name: ProfileName,
    pub role: ProfileRole,
    pub required_for_full_on: bool,
    pub registered: bool,
    pub running: bool,
}

impl ProfileDumpEntry {
    pub fn collect(registry: &ProfileRegistry) -> Vec<Self> {
        registry
            .entries()
            .iter()
            .map(|e| Self {
                name: e.descriptor.name.clone(),
                role: e.descriptor.role,
                required_for_full_on: e.descriptor.required_for_full_on,
                registered: e.registered,
                running: e.running,
            })
            .collect()
    }
}

/// Snapshot of the adapter service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDump {
    pub state: AdapterState,
    pub quiet_mode: bool,
    pub full_on_requested: bool,
    pub bluetooth_disallowed: bool,
    pub keep_ble_on_after_disable: bool,
    pub snoop_at_enable: Option<SnoopSettings>,
    pub profiles: Vec<ProfileDumpEntry>,
    pub properties: AdapterProperties,
    pub pending_requests: Vec<AdapterRequest>,
    pub listeners: usize,
    pub metrics: ServiceMetrics,
}

impl ServiceDump {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn running_profiles(&self) -> impl Iterator<Item = &ProfileDumpEntry> {
        self.profiles.iter().filter(|p| p.running)
    }
}

impl fmt::Display for ServiceDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Adapter Status")?;
        writeln!(f, "  state: {:?}", self.state)?;
        writeln!(f, "  quiet mode: {}", self.quiet_mode)?;
        writeln!(f, "  ready: {}", self.properties.ready)?;
        writeln!(f, "  disallowed: {}", self.bluetooth_disallowed)?;
        if let Some(addr) = &self.properties.address {
            writeln!(f, "  address: {addr}")?;
        }
        if let Some(name) = &self.properties.name {
            writeln!(f, "  name: {name}")?;
        }
        writeln!(f, "  scan mode: {:?}", self.properties.scan_mode)?;
        writeln!(f, "  discoverable timeout: {}s", self.properties.discoverable_timeout_s)?;
        writeln!(f, "  class of device: {:#08x}", self.properties.class_of_device)?;

        writeln!(f, "Profiles")?;
        for p in &self.profiles {
            writeln!(
                f,
                "  {:<8} {:?} registered={} running={}",
                p.name.as_str(),
                p.role,
                p.registered,
                p.running
            )?;
        }

        if !self.pending_requests.is_empty() {
            writeln!(f, "Pending requests")?;
            for r in &self.pending_requests {
                writeln!(f, "  {r:?}")?;
            }
        }

        let m = &self.metrics;
        writeln!(f, "Counters")?;
        writeln!(
            f,
            "  transitions={} deferred={} rejected={} dropped={} failed={} listener_failures={}",
            m.transitions,
            m.deferred_requests,
            m.rejected_requests,
            m.dropped_events,
            m.failed_commands,
            m.listener_failures
        )?;
        write!(f, "  listeners={}", self.listeners)
    }
}
