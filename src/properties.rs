//! Adapter property cache.
//!
//! Holds what the native stack has reported about the local adapter plus
//! the values the service derives when the adapter becomes ready: the
//! advertised UUID set, the class of device and a name → handle cache for
//! running profiles.

use log::{debug, info};
use serde::Serialize;

use crate::app::ports::{AdapterProperty, ScanMode};
use crate::config::ProfileName;
use crate::registry::ProfileRegistry;

/// Index of a running profile in the configured table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProfileHandle(pub u8);

/// Local adapter properties.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdapterProperties {
    /// Set once every expected profile is running.
    pub ready: bool,
    pub name: Option<String>,
    /// Formatted as `AA:BB:CC:DD:EE:FF`.
    pub address: Option<String>,
    pub class_of_device: u32,
    pub scan_mode: ScanMode,
    pub discoverable_timeout_s: u32,
    pub local_io_caps: Option<u8>,
    pub local_io_caps_ble: Option<u8>,
    /// Union of the UUIDs of running profiles, in configured order.
    pub uuids: Vec<String>,
    pub profile_handles: Vec<(ProfileName, ProfileHandle)>,
}

impl AdapterProperties {
    /// Apply a property reported by the stack.
    pub fn apply(&mut self, prop: &AdapterProperty) {
        match prop {
            AdapterProperty::Name(n) => self.name = Some(n.clone()),
            AdapterProperty::Address(a) => self.address = Some(format_address(a)),
            AdapterProperty::ClassOfDevice(c) => self.class_of_device = *c,
            AdapterProperty::ScanMode(m) => self.scan_mode = *m,
            AdapterProperty::DiscoverableTimeout(t) => self.discoverable_timeout_s = *t,
            AdapterProperty::LocalIoCaps(c) => self.local_io_caps = Some(*c),
            AdapterProperty::LocalIoCapsBle(c) => self.local_io_caps_ble = Some(*c),
        }
        debug!("Adapter property updated: {:?}", prop.kind());
    }

    /// Every expected profile is up.  Rebuild derived state.
    pub fn on_bluetooth_ready(&mut self, registry: &ProfileRegistry) {
        self.ready = true;
        self.refresh_uuids(registry);
        self.rebuild_handle_cache(registry);
        info!(
            "Adapter ready: {} UUIDs, {} profile handles",
            self.uuids.len(),
            self.profile_handles.len()
        );
    }

    /// The low-energy stack is going down.
    pub fn on_ble_disable(&mut self) {
        self.ready = false;
        self.scan_mode = ScanMode::None;
        self.uuids.clear();
        self.profile_handles.clear();
    }

    pub fn refresh_uuids(&mut self, registry: &ProfileRegistry) {
        self.uuids.clear();
        for e in registry.entries().iter().filter(|e| e.running) {
            for u in &e.descriptor.uuids {
                if !self.uuids.contains(u) {
                    self.uuids.push(u.clone());
                }
            }
        }
    }

    pub fn rebuild_handle_cache(&mut self, registry: &ProfileRegistry) {
        self.profile_handles = registry
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.running)
            .map(|(i, e)| (e.descriptor.name.clone(), ProfileHandle(i as u8)))
            .collect();
    }

    pub fn handle_for(&self, name: &str) -> Option<ProfileHandle> {
        self.profile_handles
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, h)| *h)
    }

    /// Drop everything (shutdown).
    pub fn cleanup(&mut self) {
        *self = Self::default();
    }
}

fn format_address(a: &[u8; 6]) -> String {
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        a[0], a[1], a[2], a[3], a[4], a[5]
    )
}
