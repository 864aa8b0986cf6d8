//! Adapter service configuration
//!
//! Static parameters loaded once at startup: the supported profile set,
//! policy defaults, power-profile currents for energy accounting, and
//! queue/timeout tuning.  Immutable after the service is constructed.

use serde::{Deserialize, Serialize};

/// Maximum number of configured profiles (fixed-capacity profile table).
pub const MAX_PROFILES: usize = 24;

/// Maximum length of a profile name.
pub const PROFILE_NAME_LEN: usize = 32;

/// Profile name as stored in config and in the registry.
pub type ProfileName = heapless::String<PROFILE_NAME_LEN>;

/// Copy `s` into a bounded string, keeping whole characters only.
pub fn bounded<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Role of a profile in the bring-up sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileRole {
    /// Low-energy bootstrap profile (GATT).  Started during BLE bring-up,
    /// before any classic profile.
    Bootstrap,
    /// Any other profile.  Started once the classic radio is enabled.
    Standard,
}

/// Static description of one supported profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDescriptor {
    /// Unique key, e.g. "GATT", "A2DP".
    pub name: ProfileName,
    /// Whether the adapter must wait for this profile before reaching ON.
    #[serde(default = "default_true")]
    pub required_for_full_on: bool,
    #[serde(default = "default_role")]
    pub role: ProfileRole,
    /// Service UUIDs advertised while the profile is running.
    #[serde(default)]
    pub uuids: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_role() -> ProfileRole {
    ProfileRole::Standard
}

fn default_energy_info_timeout_ms() -> u32 {
    30
}

impl ProfileDescriptor {
    /// Build a descriptor, truncating the name to [`PROFILE_NAME_LEN`].
    pub fn new(name: &str, role: ProfileRole) -> Self {
        Self {
            name: bounded(name),
            required_for_full_on: true,
            role,
            uuids: Vec::new(),
        }
    }

    pub fn gatt() -> Self {
        Self::new("GATT", ProfileRole::Bootstrap)
    }

    pub fn standard(name: &str) -> Self {
        Self::new(name, ProfileRole::Standard)
    }

    pub fn with_uuids(mut self, uuids: &[&str]) -> Self {
        self.uuids = uuids.iter().map(|u| (*u).to_string()).collect();
        self
    }

    pub fn is_bootstrap(&self) -> bool {
        self.role == ProfileRole::Bootstrap
    }
}

/// Radio power profile used to derive energy when the controller does not
/// report it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerProfile {
    pub idle_current_ma: u32,
    pub tx_current_ma: u32,
    pub rx_current_ma: u32,
    pub operating_voltage_mv: u32,
}

impl Default for PowerProfile {
    fn default() -> Self {
        Self {
            idle_current_ma: 1,
            tx_current_ma: 12,
            rx_current_ma: 8,
            operating_voltage_mv: 3300,
        }
    }
}

/// Core adapter service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    // --- Profiles ---
    /// Supported profiles, in start order.
    pub profiles: heapless::Vec<ProfileDescriptor, MAX_PROFILES>,

    // --- Policy ---
    /// Administrative "Bluetooth disallowed" restriction at startup.
    #[serde(default)]
    pub bluetooth_disallowed: bool,
    /// Stay in BLE_ON after a full disable instead of powering off.
    #[serde(default)]
    pub keep_ble_on_after_disable: bool,
    /// Class of device applied when the adapter becomes ready (0 = unset).
    #[serde(default)]
    pub class_of_device: u32,
    /// Whether the controller supports activity/energy reporting.
    #[serde(default = "default_true")]
    pub energy_reporting_supported: bool,

    // --- Energy ---
    #[serde(default)]
    pub power_profile: PowerProfile,

    // --- Timing ---
    /// Bounded wait for the controller energy callback (milliseconds).
    #[serde(default = "default_energy_info_timeout_ms")]
    pub energy_info_timeout_ms: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        let mut profiles = heapless::Vec::new();
        for p in [
            ProfileDescriptor::gatt().with_uuids(&["00001801-0000-1000-8000-00805f9b34fb"]),
            ProfileDescriptor::standard("A2DP").with_uuids(&["0000110a-0000-1000-8000-00805f9b34fb"]),
            ProfileDescriptor::standard("HFP").with_uuids(&["0000111f-0000-1000-8000-00805f9b34fb"]),
            ProfileDescriptor::standard("HID").with_uuids(&["00001124-0000-1000-8000-00805f9b34fb"]),
            ProfileDescriptor::standard("PAN").with_uuids(&["00001115-0000-1000-8000-00805f9b34fb"]),
        ] {
            let _ = profiles.push(p);
        }
        Self {
            profiles,
            bluetooth_disallowed: false,
            keep_ble_on_after_disable: false,
            class_of_device: 0,
            energy_reporting_supported: true,
            power_profile: PowerProfile::default(),
            energy_info_timeout_ms: default_energy_info_timeout_ms(),
        }
    }
}

/// Reasons a configuration is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    NoProfiles,
    /// No profile declares the bootstrap role.
    NoBootstrap,
    /// More than one profile declares the bootstrap role.
    MultipleBootstrap,
    /// The same profile name appears twice.
    DuplicateProfile,
    ZeroTimeout,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoProfiles => write!(f, "no profiles configured"),
            Self::NoBootstrap => write!(f, "no bootstrap profile"),
            Self::MultipleBootstrap => write!(f, "more than one bootstrap profile"),
            Self::DuplicateProfile => write!(f, "duplicate profile name"),
            Self::ZeroTimeout => write!(f, "energy_info_timeout_ms must be > 0"),
        }
    }
}

impl AdapterConfig {
    /// Config with exactly the given profiles and defaults elsewhere.
    pub fn with_profiles(profiles: &[ProfileDescriptor]) -> Self {
        let mut cfg = Self {
            profiles: heapless::Vec::new(),
            ..Self::default()
        };
        for p in profiles {
            let _ = cfg.profiles.push(p.clone());
        }
        cfg
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate().map_err(|e| anyhow::anyhow!("invalid config: {e}"))?;
        Ok(cfg)
    }

    /// Range/consistency checks.  Rejects rather than clamps.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profiles.is_empty() {
            return Err(ConfigError::NoProfiles);
        }
        match self.profiles.iter().filter(|p| p.is_bootstrap()).count() {
            0 => return Err(ConfigError::NoBootstrap),
            1 => {}
            _ => return Err(ConfigError::MultipleBootstrap),
        }
        for (i, p) in self.profiles.iter().enumerate() {
            if self.profiles[i + 1..].iter().any(|q| q.name == p.name) {
                return Err(ConfigError::DuplicateProfile);
            }
        }
        if self.energy_info_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// True when the bootstrap profile is the only supported profile.
    pub fn is_gatt_only(&self) -> bool {
        self.profiles.len() == 1 && self.profiles[0].is_bootstrap()
    }
}
