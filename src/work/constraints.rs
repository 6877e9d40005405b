//! Environmental preconditions that must hold before a piece of work is admitted.

use serde::{Deserialize, Serialize};

/// Lowest platform API level exposing the device-idle constraint.
pub const DEVICE_IDLE_MIN_SDK: u32 = 23;

/// Network requirement for a piece of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    /// No network needed.
    #[default]
    NotRequired,
    /// Any working connection.
    Connected,
    /// A connection that isn't billed by usage (e.g. Wi-Fi).
    Unmetered,
    /// A connection that isn't roaming.
    NotRoaming,
    /// A metered connection.
    Metered,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::NotRequired => "not_required",
            NetworkType::Connected => "connected",
            NetworkType::Unmetered => "unmetered",
            NetworkType::NotRoaming => "not_roaming",
            NetworkType::Metered => "metered",
        }
    }

    fn is_satisfied_by(&self, network: &NetworkState) -> bool {
        match self {
            NetworkType::NotRequired => true,
            NetworkType::Connected => network.connected,
            NetworkType::Unmetered => network.connected && !network.metered,
            NetworkType::NotRoaming => network.connected && !network.roaming,
            NetworkType::Metered => network.connected && network.metered,
        }
    }
}

/// Immutable set of constraints attached to a work request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub required_network_type: NetworkType,
    pub requires_battery_not_low: bool,
    pub requires_charging: bool,
    pub requires_device_idle: bool,
    pub requires_storage_not_low: bool,
}

impl Constraints {
    /// No constraints at all.
    pub const NONE: Constraints = Constraints {
        required_network_type: NetworkType::NotRequired,
        requires_battery_not_low: false,
        requires_charging: false,
        requires_device_idle: false,
        requires_storage_not_low: false,
    };

    pub fn builder() -> ConstraintsBuilder {
        ConstraintsBuilder::default()
    }

    /// Whether the device currently satisfies every constraint.
    pub fn is_satisfied_by(&self, device: &DeviceState) -> bool {
        self.unmet(device).is_empty()
    }

    /// Names of the constraints the device currently fails, for logging.
    pub fn unmet(&self, device: &DeviceState) -> Vec<&'static str> {
        let mut unmet = Vec::new();
        if !self.required_network_type.is_satisfied_by(&device.network) {
            unmet.push(self.required_network_type.as_str());
        }
        if self.requires_battery_not_low && device.battery_low {
            unmet.push("battery_not_low");
        }
        if self.requires_charging && !device.charging {
            unmet.push("charging");
        }
        if self.requires_device_idle && !device.idle {
            unmet.push("device_idle");
        }
        if self.requires_storage_not_low && device.storage_low {
            unmet.push("storage_not_low");
        }
        unmet
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConstraintsBuilder {
    constraints: Constraints,
}

impl ConstraintsBuilder {
    pub fn set_required_network_type(mut self, network_type: NetworkType) -> Self {
        self.constraints.required_network_type = network_type;
        self
    }

    pub fn set_requires_battery_not_low(mut self, value: bool) -> Self {
        self.constraints.requires_battery_not_low = value;
        self
    }

    pub fn set_requires_charging(mut self, value: bool) -> Self {
        self.constraints.requires_charging = value;
        self
    }

    pub fn set_requires_device_idle(mut self, value: bool) -> Self {
        self.constraints.requires_device_idle = value;
        self
    }

    pub fn set_requires_storage_not_low(mut self, value: bool) -> Self {
        self.constraints.requires_storage_not_low = value;
        self
    }

    /// Apply `f` to the builder, for conditional chains.
    pub fn apply(self, f: impl FnOnce(Self) -> Self) -> Self {
        f(self)
    }

    pub fn build(self) -> Constraints {
        self.constraints
    }
}

/// Connectivity snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkState {
    pub connected: bool,
    pub metered: bool,
    pub roaming: bool,
}

/// Snapshot of the device conditions constraints are checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceState {
    pub network: NetworkState,
    pub battery_low: bool,
    pub charging: bool,
    pub idle: bool,
    pub storage_low: bool,
}

/// Source of the current device conditions.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait DeviceMonitor: Send + Sync {
    fn current_state(&self) -> DeviceState;
}

/// A device monitor that always reports the same state.
///
/// The daemon uses it with the `[device]` section of the config file.
#[derive(Debug, Clone)]
pub struct StaticDeviceMonitor {
    state: DeviceState,
}

impl StaticDeviceMonitor {
    pub fn new(state: DeviceState) -> Self {
        Self { state }
    }
}

impl DeviceMonitor for StaticDeviceMonitor {
    fn current_state(&self) -> DeviceState {
        self.state
    }
}

/// Capability queries about the platform, injected wherever a configuration
/// depends on what the platform supports.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait PlatformCapabilities: Send + Sync {
    /// Platform API level.
    fn sdk_level(&self) -> u32;

    fn supports_device_idle(&self) -> bool {
        self.sdk_level() >= DEVICE_IDLE_MIN_SDK
    }
}

/// Capabilities derived from a fixed API level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkLevel(pub u32);

impl PlatformCapabilities for SdkLevel {
    fn sdk_level(&self) -> u32 {
        self.0
    }
}
