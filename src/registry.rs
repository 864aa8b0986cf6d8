//! Profile registry: which configured profiles have registered with the
//! service, and which of those are currently running.
//!
//! The configured set is fixed at construction.  Each entry carries two
//! flags; `running` is only ever set on a `registered` entry, and
//! unregistering clears both.  All violations are reported as
//! [`RegistryError`] and leave the registry untouched.

use log::{debug, warn};

use crate::config::{AdapterConfig, MAX_PROFILES, ProfileDescriptor};
use crate::error::RegistryError;

/// One configured profile and its runtime flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    pub descriptor: ProfileDescriptor,
    pub registered: bool,
    pub running: bool,
}

/// Registered and running profile sets, keyed by the configured table.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    entries: heapless::Vec<ProfileEntry, MAX_PROFILES>,
}

impl ProfileRegistry {
    pub fn new(profiles: &[ProfileDescriptor]) -> Self {
        let mut entries = heapless::Vec::new();
        for p in profiles {
            let entry = ProfileEntry {
                descriptor: p.clone(),
                registered: false,
                running: false,
            };
            if entries.push(entry).is_err() {
                warn!("Profile table full, ignoring {}", p.name);
            }
        }
        Self { entries }
    }

    pub fn from_config(config: &AdapterConfig) -> Self {
        Self::new(&config.profiles)
    }

    // ── Mutation ──────────────────────────────────────────────

    /// Record that a profile service has come into existence.
    pub fn register(&mut self, name: &str) -> Result<(), RegistryError> {
        let entry = self.entry_mut(name)?;
        if entry.registered {
            warn!("Profile {} already registered", name);
            return Err(RegistryError::DoubleRegistration);
        }
        entry.registered = true;
        debug!("Profile {} registered", name);
        Ok(())
    }

    /// Record that a profile service has gone away.  Also clears its
    /// running flag.
    pub fn unregister(&mut self, name: &str) -> Result<(), RegistryError> {
        let entry = self.entry_mut(name)?;
        if !entry.registered {
            warn!("Profile {} not registered (unregister)", name);
            return Err(RegistryError::UnknownUnregister);
        }
        entry.registered = false;
        entry.running = false;
        debug!("Profile {} unregistered", name);
        Ok(())
    }

    /// Record a running-state report from a registered profile.
    pub fn report_running(&mut self, name: &str, running: bool) -> Result<(), RegistryError> {
        let entry = self.entry_mut(name)?;
        if !entry.registered {
            warn!("Profile {} reported state before registering", name);
            return Err(RegistryError::NotRegistered);
        }
        if entry.running == running {
            warn!("Profile {} already {}", name, if running { "running" } else { "stopped" });
            return Err(RegistryError::AlreadyInState);
        }
        entry.running = running;
        Ok(())
    }

    /// Forget all registrations (shutdown).
    pub fn clear(&mut self) {
        for e in &mut self.entries {
            e.registered = false;
            e.running = false;
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Every profile required for full ON has registered.
    pub fn all_expected_registered(&self) -> bool {
        self.expected().all(|e| e.registered)
    }

    /// Every profile required for full ON is running.
    pub fn all_expected_running(&self) -> bool {
        self.expected().all(|e| e.running)
    }

    /// Exactly one profile is running and it is the bootstrap profile.
    pub fn is_only_bootstrap_running(&self) -> bool {
        let mut running = self.entries.iter().filter(|e| e.running);
        matches!((running.next(), running.next()), (Some(e), None) if e.descriptor.is_bootstrap())
    }

    /// The bootstrap profile is the only configured profile.
    pub fn is_bootstrap_only_config(&self) -> bool {
        self.entries.len() == 1 && self.entries[0].descriptor.is_bootstrap()
    }

    pub fn bootstrap(&self) -> Option<&ProfileEntry> {
        self.entries.iter().find(|e| e.descriptor.is_bootstrap())
    }

    pub fn bootstrap_running(&self) -> bool {
        self.bootstrap().is_some_and(|e| e.running)
    }

    pub fn get(&self, name: &str) -> Option<&ProfileEntry> {
        self.entries.iter().find(|e| e.descriptor.name.as_str() == name)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.get(name).is_some_and(|e| e.registered)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.get(name).is_some_and(|e| e.running)
    }

    pub fn registered_count(&self) -> usize {
        self.entries.iter().filter(|e| e.registered).count()
    }

    pub fn running_count(&self) -> usize {
        self.entries.iter().filter(|e| e.running).count()
    }

    /// All entries in configured order.
    pub fn entries(&self) -> &[ProfileEntry] {
        &self.entries
    }

    /// Non-bootstrap entries in configured order.
    pub fn standard_profiles(&self) -> impl Iterator<Item = &ProfileEntry> {
        self.entries.iter().filter(|e| !e.descriptor.is_bootstrap())
    }

    // ── Internal ──────────────────────────────────────────────

    fn expected(&self) -> impl Iterator<Item = &ProfileEntry> {
        self.entries.iter().filter(|e| e.descriptor.required_for_full_on)
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut ProfileEntry, RegistryError> {
        match self.entries.iter_mut().find(|e| e.descriptor.name.as_str() == name) {
            Some(e) => Ok(e),
            None => {
                warn!("Unknown profile {}", name);
                Err(RegistryError::UnknownProfile)
            }
        }
    }
}
